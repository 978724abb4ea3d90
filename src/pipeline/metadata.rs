// Status report for the command surface

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::Orchestrator;
use crate::recording::RecordingStatus;
use crate::storage::{RelocationProgress, UsageStats};

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RelocationReport {
    pub complete: bool,
    pub total_bytes: u64,
    pub moved_bytes: u64,
    pub error: Option<String>,
    pub target_path: Option<PathBuf>,
}

impl RelocationReport {
    /// Report for the current job, carrying the last failure's error until a job
    /// succeeds. No job yet reads as a finished empty one.
    pub fn from_jobs(
        current: Option<RelocationProgress>,
        last_failure: Option<RelocationProgress>,
    ) -> Self {
        let earlier_error = last_failure.and_then(|f| f.error);
        match current {
            Some(p) => Self {
                complete: p.done,
                total_bytes: p.total_bytes,
                moved_bytes: p.moved_bytes,
                error: p.error.or(earlier_error),
                target_path: Some(p.destination),
            },
            None => Self {
                complete: true,
                total_bytes: 0,
                moved_bytes: 0,
                error: earlier_error,
                target_path: None,
            },
        }
    }
}

/// Snapshot of everything a status page shows
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Metadata {
    pub recording: bool,
    pub state: RecordingStatus,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub fps: u32,
    pub resolution: String,
    pub preview_resolution: String,
    pub storage_usage: UsageStats,
    pub memory_usage: UsageStats,
    pub relocation: RelocationReport,
    pub camera_connected: bool,
    pub camera_device: String,
    pub root: PathBuf,
    pub last_error: Option<String>,
}

impl Metadata {
    pub fn collect(orchestrator: &Orchestrator) -> Self {
        let config = orchestrator.config();
        let session = orchestrator.recorder().info();
        let ui = orchestrator.ui().snapshot();

        let relocation = RelocationReport::from_jobs(
            orchestrator.recorder().relocation(),
            orchestrator.recorder().last_relocation_failure(),
        );

        Self {
            recording: session.is_recording(),
            state: session.status,
            start_time: session.started_at,
            end_time: session.ended_at,
            fps: config.fps,
            resolution: config.resolution.to_string(),
            preview_resolution: orchestrator.preview_resolution().to_string(),
            storage_usage: ui.storage,
            memory_usage: ui.memory,
            relocation,
            camera_connected: ui.camera_connected,
            camera_device: ui.camera_device,
            root: orchestrator.recorder().layout().root().to_path_buf(),
            last_error: session.last_error,
        }
    }

    /// JSON body for a status endpoint
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
