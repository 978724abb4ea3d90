// Command surface
//
// `Appliance` is the cloneable handle an HTTP layer (or anything else) drives. Every
// command returns promptly: recording transitions complete in the pipeline's tick and
// the encoder is never waited on here.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::{Config, Resolution};
use crate::devices::DeviceError;
use crate::notifications;
use crate::pipeline::{Backends, Metadata, Orchestrator, PreviewStream};
use crate::recording::{RecordingError, RecordingStatus, SessionInfo};
use crate::video::{encode_jpeg, VideoError};

/// JPEG quality for saved pictures
const PICTURE_QUALITY: u8 = 95;

/// Error type for commands
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error(transparent)]
    Recording(#[from] RecordingError),

    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error(transparent)]
    Video(#[from] VideoError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CommandError>;

#[derive(Clone)]
pub struct Appliance {
    orchestrator: Arc<Orchestrator>,
}

impl Appliance {
    /// Build the pipeline and start relaying
    pub fn launch(config: Config, backends: Backends) -> Result<Self> {
        let orchestrator = Orchestrator::new(config, backends)?;
        orchestrator.start()?;
        orchestrator.refresh_stats();
        Ok(Self { orchestrator })
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    // ========================================================================
    // Recording
    // ========================================================================

    pub fn start_recording(&self) -> Result<SessionInfo> {
        let duration = self.orchestrator.message_duration();
        match self.orchestrator.recorder().start() {
            Ok(info) => {
                self.orchestrator.ui().notify(notifications::recording_started(duration));
                Ok(info)
            }
            Err(RecordingError::AlreadyRecording) => Err(RecordingError::AlreadyRecording.into()),
            Err(e) => {
                self.orchestrator.ui().notify(notifications::recording_start_failed(duration));
                Err(e.into())
            }
        }
    }

    pub fn stop_recording(&self) -> Result<SessionInfo> {
        let info = self.orchestrator.recorder().stop()?;
        let length = match (info.started_at, info.ended_at) {
            (Some(start), Some(end)) => (end - start).to_std().unwrap_or_default(),
            _ => Duration::ZERO,
        };
        self.orchestrator.ui().notify(notifications::recording_stopped(
            length,
            self.orchestrator.message_duration(),
        ));
        Ok(info)
    }

    pub fn recording_state(&self) -> SessionInfo {
        self.orchestrator.recorder().info()
    }

    // ========================================================================
    // Pictures and preview
    // ========================================================================

    /// Save the latest raw frame (or the placeholder) as a JPEG under pictures/
    pub fn take_picture(&self) -> Result<(PathBuf, u64)> {
        let duration = self.orchestrator.message_duration();
        match self.save_picture() {
            Ok(saved) => {
                log::info!("[Picture] Saved {} ({} bytes)", saved.0.display(), saved.1);
                self.orchestrator.ui().notify(notifications::picture_saved(duration));
                Ok(saved)
            }
            Err(e) => {
                log::error!("[Picture] Failed: {}", e);
                self.orchestrator.ui().notify(notifications::picture_error(duration));
                Err(e)
            }
        }
    }

    fn save_picture(&self) -> Result<(PathBuf, u64)> {
        let resolution = self.orchestrator.config().resolution;
        let frame = self
            .orchestrator
            .latest_raw()
            .resized(resolution.width, resolution.height);
        let jpeg = encode_jpeg(&frame, PICTURE_QUALITY)?;

        let path = self.orchestrator.recorder().layout().next_picture_path()?;
        std::fs::write(&path, &jpeg)?;
        Ok((path, jpeg.len() as u64))
    }

    /// Full-size composited frame at preview quality
    pub fn latest_composited_jpeg(&self) -> Result<Vec<u8>> {
        let (frame, _) = self.orchestrator.latest_composited();
        Ok(encode_jpeg(&frame, self.orchestrator.config().preview_quality)?)
    }

    /// Independent preview stream; create and poll it on a tokio runtime
    pub fn preview_stream(&self) -> PreviewStream {
        PreviewStream::new(Arc::clone(&self.orchestrator))
    }

    /// Step the preview to the next larger size (wraps to the smallest)
    pub fn increase_preview_resolution(&self) -> Resolution {
        self.orchestrator.step_preview_resolution(true)
    }

    /// Step the preview to the next smaller size (wraps to the largest)
    pub fn decrease_preview_resolution(&self) -> Resolution {
        self.orchestrator.step_preview_resolution(false)
    }

    // ========================================================================
    // Status
    // ========================================================================

    pub fn get_metadata(&self) -> Metadata {
        self.orchestrator.metadata()
    }

    /// Flip the stats block on the overlay; returns the new setting
    pub fn toggle_stats_overlay(&self) -> bool {
        self.orchestrator.ui().toggle_stats()
    }

    pub fn spawn_stats_refresher(&self) -> tokio::task::JoinHandle<()> {
        self.orchestrator.spawn_stats_refresher()
    }

    // ========================================================================
    // Shutdown
    // ========================================================================

    /// Stop an active recording (waiting for the encoder, bounded), stop the pipeline,
    /// then let a running relocation finish.
    pub fn shutdown(&self) {
        let recorder = self.orchestrator.recorder();
        if recorder.status() == RecordingStatus::Active {
            if let Err(e) = recorder.stop() {
                log::warn!("[Shutdown] Could not stop recording: {}", e);
            }
        }

        // The stop timeout plus a margin for the forced kill
        let limit = Duration::from_secs(self.orchestrator.config().encoder_stop_timeout_secs)
            + Duration::from_secs(2);
        let started = Instant::now();
        while recorder.status() == RecordingStatus::Stopping && started.elapsed() < limit {
            // The tick thread may already be gone, so drive the state machine here
            recorder.poll();
            std::thread::sleep(Duration::from_millis(50));
        }

        self.orchestrator.stop();
        recorder.shutdown();
        log::info!("[Shutdown] Complete");
    }
}
