//! Recording state machine
//!
//! `Idle -> Starting -> Active -> Stopping -> (Relocating -> Idle | Idle)`, plus `Failed`.
//!
//! Every transition happens under the session mutex. `start`/`stop` return immediately;
//! encoder exit and relocation completion are picked up by `poll`, which the frame
//! pipeline calls once per tick.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::Utc;
use parking_lot::Mutex;

use super::{RecordingError, RecordingEvent, RecordingSession, RecordingStatus, Result, SessionInfo};
use crate::encoding::{ContainerFormat, EncoderLauncher, EncoderProcess};
use crate::notifications::format_elapsed;
use crate::storage::layout::staging_path;
use crate::storage::{FileRelocator, OutputLayout, RelocationProgress};

/// Fixed recording parameters
#[derive(Debug, Clone)]
pub struct RecorderSettings {
    pub container: ContainerFormat,
    /// Local scratch directory; `None` writes straight to the final path
    pub staging_root: Option<PathBuf>,
    /// How long to wait for the encoder after SIGTERM before killing it
    pub stop_timeout: Duration,
}

pub struct RecordingController {
    session: Mutex<RecordingSession>,
    launcher: Box<dyn EncoderLauncher>,
    relocator: FileRelocator,
    layout: OutputLayout,
    settings: RecorderSettings,
}

impl RecordingController {
    pub fn new(
        launcher: Box<dyn EncoderLauncher>,
        relocator: FileRelocator,
        layout: OutputLayout,
        settings: RecorderSettings,
    ) -> Self {
        Self {
            session: Mutex::new(RecordingSession::new()),
            launcher,
            relocator,
            layout,
            settings,
        }
    }

    pub fn layout(&self) -> &OutputLayout {
        &self.layout
    }

    pub fn info(&self) -> SessionInfo {
        self.session.lock().info()
    }

    pub fn status(&self) -> RecordingStatus {
        self.session.lock().status
    }

    pub fn is_recording(&self) -> bool {
        self.status() == RecordingStatus::Active
    }

    pub fn relocation(&self) -> Option<RelocationProgress> {
        self.relocator.progress()
    }

    /// Last failed relocation, until a later one succeeds
    pub fn last_relocation_failure(&self) -> Option<RelocationProgress> {
        self.relocator.last_failure()
    }

    /// When the current recording started, while recording
    pub fn started_instant(&self) -> Option<Instant> {
        let session = self.session.lock();
        match session.status {
            RecordingStatus::Active => session.started_instant,
            _ => None,
        }
    }

    /// `HH:MM:SS` since start while recording, `--:--:--` otherwise
    pub fn elapsed_label(&self) -> String {
        let session = self.session.lock();
        match (session.status, session.started_instant) {
            (RecordingStatus::Active, Some(started)) => format_elapsed(started.elapsed()),
            _ => "--:--:--".to_string(),
        }
    }

    /// Launch the encoder. Rejected unless Idle or Failed.
    pub fn start(&self) -> Result<SessionInfo> {
        {
            let mut session = self.session.lock();
            if session.status.is_busy() {
                return Err(RecordingError::AlreadyRecording);
            }
            session.status = RecordingStatus::Starting;
        }

        // Path setup and spawn run unlocked; Starting keeps other callers out
        let launched = self.launch();

        let mut session = self.session.lock();
        match launched {
            Ok((encoder, final_path, staging)) => {
                log::info!("[Recording] Started -> {}", final_path.display());
                session.status = RecordingStatus::Active;
                session.encoder = Some(encoder);
                session.final_path = Some(final_path);
                session.staging_path = staging;
                session.started_at = Some(Utc::now());
                session.started_instant = Some(Instant::now());
                session.ended_at = None;
                session.stop_requested_at = None;
                session.last_error = None;
                Ok(session.info())
            }
            Err(e) => {
                log::error!("[Recording] Failed to start: {}", e);
                session.status = RecordingStatus::Failed;
                session.encoder = None;
                session.last_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    fn launch(&self) -> Result<(EncoderProcess, PathBuf, Option<PathBuf>)> {
        let ext = self.settings.container.extension();
        let final_path = self.layout.next_video_path(ext)?;

        let staging = match &self.settings.staging_root {
            Some(root) => {
                std::fs::create_dir_all(root)?;
                let path = staging_path(root, Utc::now().timestamp(), ext);
                remove_stale(&path)?;
                Some(path)
            }
            None => None,
        };

        let target = staging.as_deref().unwrap_or(&final_path);
        let encoder = EncoderProcess::spawn(self.launcher.as_ref(), target)?;
        Ok((encoder, final_path, staging))
    }

    /// Ask the encoder to finish. Rejected unless Active.
    pub fn stop(&self) -> Result<SessionInfo> {
        let mut session = self.session.lock();
        if session.status != RecordingStatus::Active {
            return Err(RecordingError::NotRecording);
        }

        if let Some(encoder) = session.encoder.as_mut() {
            if let Err(e) = encoder.terminate() {
                log::warn!("[Recording] SIGTERM failed, killing encoder: {}", e);
                if let Err(e) = encoder.kill() {
                    log::error!("[Recording] Failed to kill encoder: {}", e);
                }
            }
        }
        session.status = RecordingStatus::Stopping;
        session.stop_requested_at = Some(Instant::now());
        session.ended_at = Some(Utc::now());
        log::info!("[Recording] Stopping");
        Ok(session.info())
    }

    /// Advance time-driven transitions. Never blocks on the encoder except for the
    /// reap right after a forced kill.
    pub fn poll(&self) -> Option<RecordingEvent> {
        let mut session = self.session.lock();
        match session.status {
            RecordingStatus::Active => {
                let exited = session.encoder.as_mut().and_then(|e| check_exit(e));
                let status = exited?;
                log::error!("[Recording] Encoder exited unexpectedly with {}", status);
                session.status = RecordingStatus::Failed;
                session.encoder = None;
                session.ended_at = Some(Utc::now());
                session.last_error = Some(format!("encoder exited unexpectedly ({})", status));
                Some(RecordingEvent::EncoderExited { status: Some(status) })
            }
            RecordingStatus::Stopping => {
                let timeout = self.settings.stop_timeout;
                let waited = session
                    .stop_requested_at
                    .map(|t| t.elapsed())
                    .unwrap_or_default();

                if let Some(encoder) = session.encoder.as_mut() {
                    if check_exit(encoder).is_none() {
                        if waited < timeout {
                            return None;
                        }
                        log::warn!(
                            "[Recording] Encoder did not exit within {:?} of SIGTERM, killing",
                            timeout
                        );
                        if let Err(e) = encoder.kill() {
                            log::error!("[Recording] Failed to kill encoder: {}", e);
                        }
                    }
                }
                session.encoder = None;
                self.finish_stop(&mut session)
            }
            RecordingStatus::Relocating => {
                if self.relocator.is_busy() {
                    return None;
                }
                session.status = RecordingStatus::Idle;
                match self.relocator.progress() {
                    Some(p) if p.error.is_some() => {
                        let error = p.error.unwrap_or_default();
                        session.last_error = Some(error.clone());
                        Some(RecordingEvent::RelocationFailed { error })
                    }
                    Some(p) => Some(RecordingEvent::RelocationFinished {
                        destination: p.destination,
                    }),
                    None => None,
                }
            }
            _ => None,
        }
    }

    fn finish_stop(&self, session: &mut RecordingSession) -> Option<RecordingEvent> {
        let Some(final_path) = session.final_path.clone() else {
            session.status = RecordingStatus::Idle;
            return None;
        };

        let Some(staged) = session.staging_path.clone() else {
            log::info!("[Recording] Saved {}", final_path.display());
            session.status = RecordingStatus::Idle;
            return Some(RecordingEvent::Saved { path: final_path });
        };

        match self.relocator.relocate(&staged, &final_path) {
            Ok(()) => {
                session.status = RecordingStatus::Relocating;
                Some(RecordingEvent::RelocationStarted {
                    destination: final_path,
                })
            }
            Err(e) => {
                log::error!("[Recording] Could not queue relocation: {}", e);
                session.status = RecordingStatus::Failed;
                session.last_error = Some(e.to_string());
                Some(RecordingEvent::RelocationFailed {
                    error: e.to_string(),
                })
            }
        }
    }

    /// Stop the relocation worker after its current job
    pub fn shutdown(&self) {
        self.relocator.shutdown();
    }
}

fn check_exit(encoder: &mut EncoderProcess) -> Option<std::process::ExitStatus> {
    match encoder.try_exit() {
        Ok(status) => status,
        Err(e) => {
            log::warn!("[Recording] Could not query encoder: {}", e);
            None
        }
    }
}

fn remove_stale(path: &Path) -> std::io::Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            log::debug!("[Recording] Removed stale staging file {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}
