//! External encoder process
//!
//! The recorder never touches encoded bytes. It launches an encoder that reads the
//! virtual camera device and writes the container file, then stops it with SIGTERM so the
//! encoder can finalize the container. If the process ignores the signal it is killed.

use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use crate::config::Config;

/// Error type for encoder process operations
#[derive(Debug, thiserror::Error)]
pub enum EncoderError {
    #[error("Failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, EncoderError>;

/// Builds the command line that records into `output`
pub trait EncoderLauncher: Send + Sync {
    fn command(&self, output: &Path) -> Command;
}

/// `ffmpeg -f v4l2 ... -i <virtual camera> -c:v <codec> -b:v <bitrate> <output>`
#[derive(Debug, Clone)]
pub struct FfmpegLauncher {
    pub program: String,
    pub input_device: String,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub codec: String,
    pub bitrate: String,
}

impl FfmpegLauncher {
    pub fn from_config(config: &Config) -> Self {
        Self {
            program: config.encoder_program.clone(),
            input_device: config.virtual_device.clone(),
            width: config.resolution.width,
            height: config.resolution.height,
            fps: config.fps,
            codec: config.encoder_codec.clone(),
            bitrate: config.encoder_bitrate.clone(),
        }
    }

    /// Arguments without the program name
    pub fn args(&self, output: &Path) -> Vec<String> {
        vec![
            "-hide_banner".into(),
            "-loglevel".into(),
            "error".into(),
            "-f".into(),
            "v4l2".into(),
            "-framerate".into(),
            self.fps.to_string(),
            "-video_size".into(),
            format!("{}x{}", self.width, self.height),
            "-i".into(),
            self.input_device.clone(),
            "-c:v".into(),
            self.codec.clone(),
            "-b:v".into(),
            self.bitrate.clone(),
            "-y".into(),
            output.to_string_lossy().into_owned(),
        ]
    }
}

impl EncoderLauncher for FfmpegLauncher {
    fn command(&self, output: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(self.args(output));
        cmd
    }
}

/// A running encoder
#[derive(Debug)]
pub struct EncoderProcess {
    child: Child,
    output: PathBuf,
    exit: Option<ExitStatus>,
}

impl EncoderProcess {
    /// Launch the encoder writing to `output`. Its stdio is discarded.
    pub fn spawn(launcher: &dyn EncoderLauncher, output: &Path) -> Result<Self> {
        let mut cmd = launcher.command(output);
        let program = cmd.get_program().to_string_lossy().into_owned();
        cmd.stdin(Stdio::null()).stdout(Stdio::null()).stderr(Stdio::null());

        let child = cmd.spawn().map_err(|source| EncoderError::Spawn { program, source })?;
        log::info!("[Encoder] Started pid {} -> {}", child.id(), output.display());

        Ok(Self {
            child,
            output: output.to_path_buf(),
            exit: None,
        })
    }

    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Ask the encoder to finish its file and exit
    pub fn terminate(&mut self) -> Result<()> {
        if self.exit.is_some() {
            return Ok(());
        }
        #[cfg(unix)]
        {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            match kill(Pid::from_raw(self.child.id() as i32), Signal::SIGTERM) {
                Ok(()) => {
                    log::debug!("[Encoder] Sent SIGTERM to pid {}", self.child.id());
                    Ok(())
                }
                // Already gone; try_exit will reap it
                Err(nix::errno::Errno::ESRCH) => Ok(()),
                Err(e) => Err(EncoderError::Io(std::io::Error::from(e))),
            }
        }
        #[cfg(not(unix))]
        {
            self.child.kill()?;
            Ok(())
        }
    }

    /// Non-blocking exit check
    pub fn try_exit(&mut self) -> Result<Option<ExitStatus>> {
        if let Some(status) = self.exit {
            return Ok(Some(status));
        }
        let status = self.child.try_wait()?;
        if let Some(status) = status {
            log::info!("[Encoder] pid {} exited with {}", self.child.id(), status);
            self.exit = Some(status);
        }
        Ok(status)
    }

    /// Force-kill and reap
    pub fn kill(&mut self) -> Result<ExitStatus> {
        if let Some(status) = self.exit {
            return Ok(status);
        }
        log::warn!("[Encoder] Killing pid {}", self.child.id());
        // Fails only if the process already exited, which wait() handles
        let _ = self.child.kill();
        let status = self.child.wait()?;
        self.exit = Some(status);
        Ok(status)
    }
}
