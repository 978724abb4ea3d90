// Recording lifecycle

pub mod controller;

pub use controller::{RecorderSettings, RecordingController};

use std::path::PathBuf;
use std::process::ExitStatus;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::encoding::encoder::EncoderError;
use crate::encoding::EncoderProcess;
use crate::storage::RelocationError;

/// Error type for recording commands
#[derive(Debug, thiserror::Error)]
pub enum RecordingError {
    #[error("A recording is already in progress")]
    AlreadyRecording,

    #[error("Not recording")]
    NotRecording,

    #[error("Encoder failed to start: {0}")]
    EncoderSpawnFailed(#[from] EncoderError),

    #[error("Output path error: {0}")]
    Output(#[from] std::io::Error),

    #[error("Relocation failed: {0}")]
    Relocation(#[from] RelocationError),
}

pub type Result<T> = std::result::Result<T, RecordingError>;

/// Where the session is in its lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RecordingStatus {
    /// Ready to record
    Idle,
    /// Encoder being launched
    Starting,
    /// Encoder running
    Active,
    /// SIGTERM sent, waiting for the encoder to exit
    Stopping,
    /// Moving the staged file to its final location
    Relocating,
    /// Last start failed or the encoder died; a new start is allowed
    Failed,
}

impl RecordingStatus {
    /// States in which `start` is rejected
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            RecordingStatus::Starting
                | RecordingStatus::Active
                | RecordingStatus::Stopping
                | RecordingStatus::Relocating
        )
    }
}

/// The single recording session. Only the controller mutates it, under its mutex.
#[derive(Debug)]
pub struct RecordingSession {
    pub status: RecordingStatus,
    pub encoder: Option<EncoderProcess>,
    pub staging_path: Option<PathBuf>,
    pub final_path: Option<PathBuf>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub started_instant: Option<Instant>,
    pub stop_requested_at: Option<Instant>,
    pub last_error: Option<String>,
}

impl RecordingSession {
    pub fn new() -> Self {
        Self {
            status: RecordingStatus::Idle,
            encoder: None,
            staging_path: None,
            final_path: None,
            started_at: None,
            ended_at: None,
            started_instant: None,
            stop_requested_at: None,
            last_error: None,
        }
    }

    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            status: self.status,
            started_at: self.started_at,
            ended_at: self.ended_at,
            staging_path: self.staging_path.clone(),
            final_path: self.final_path.clone(),
            last_error: self.last_error.clone(),
        }
    }
}

impl Default for RecordingSession {
    fn default() -> Self {
        Self::new()
    }
}

/// Read-only copy of the session for callers
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SessionInfo {
    pub status: RecordingStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub staging_path: Option<PathBuf>,
    pub final_path: Option<PathBuf>,
    pub last_error: Option<String>,
}

impl SessionInfo {
    pub fn is_recording(&self) -> bool {
        self.status == RecordingStatus::Active
    }
}

/// Transitions the pipeline reports to the user
#[derive(Debug, Clone)]
pub enum RecordingEvent {
    /// Encoder died while recording
    EncoderExited { status: Option<ExitStatus> },
    /// Encoder finished writing the final file
    Saved { path: PathBuf },
    /// Encoder finished the staged file, relocation queued
    RelocationStarted { destination: PathBuf },
    RelocationFinished { destination: PathBuf },
    RelocationFailed { error: String },
}
