// On-screen notifications

use std::path::Path;
use std::time::Duration;

use crate::pipeline::ui_state::{MessageKind, TransientMessage};
use crate::recording::RecordingEvent;

pub fn recording_started(duration: Duration) -> TransientMessage {
    TransientMessage::new("RECORDING STARTED", MessageKind::Info, duration)
}

pub fn recording_start_failed(duration: Duration) -> TransientMessage {
    TransientMessage::new("RECORDING FAILED TO START", MessageKind::Error, duration)
}

pub fn recording_stopped(length: Duration, duration: Duration) -> TransientMessage {
    let text = format!("RECORDING STOPPED ({})", format_duration(length.as_secs_f64()));
    TransientMessage::new(text, MessageKind::Info, duration)
}

pub fn picture_saved(duration: Duration) -> TransientMessage {
    TransientMessage::new("PICTURE SAVED", MessageKind::Info, duration)
}

pub fn picture_error(duration: Duration) -> TransientMessage {
    TransientMessage::new("PICTURE SAVE ERROR", MessageKind::Error, duration)
}

pub fn camera_lost(device: &str, duration: Duration) -> TransientMessage {
    TransientMessage::new(format!("CAMERA LOST: {}", device), MessageKind::Error, duration)
}

pub fn camera_restored(device: &str, duration: Duration) -> TransientMessage {
    TransientMessage::new(format!("CAMERA RESTORED: {}", device), MessageKind::Info, duration)
}

/// Message for a recorder transition, if it deserves one
pub fn for_recording_event(event: &RecordingEvent, duration: Duration) -> Option<TransientMessage> {
    let msg = match event {
        RecordingEvent::EncoderExited { .. } => {
            TransientMessage::new("RECORDING ERROR: ENCODER EXITED", MessageKind::Error, duration)
        }
        RecordingEvent::Saved { path } => {
            TransientMessage::new(format!("SAVED {}", file_label(path)), MessageKind::Info, duration)
        }
        // The relocation banner covers the copy itself
        RecordingEvent::RelocationStarted { .. } => return None,
        RecordingEvent::RelocationFinished { destination } => {
            TransientMessage::new(format!("SAVED {}", file_label(destination)), MessageKind::Info, duration)
        }
        RecordingEvent::RelocationFailed { .. } => {
            TransientMessage::new("SAVE FAILED, FILE KEPT LOCALLY", MessageKind::Error, duration)
        }
    };
    Some(msg)
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_uppercase())
        .unwrap_or_default()
}

/// `HH:MM:SS`, hours not capped at 24
pub fn format_elapsed(elapsed: Duration) -> String {
    let total_secs = elapsed.as_secs();
    let hours = total_secs / 3600;
    let mins = (total_secs % 3600) / 60;
    let secs = total_secs % 60;
    format!("{:02}:{:02}:{:02}", hours, mins, secs)
}

/// Format duration as human-readable string
pub fn format_duration(secs: f64) -> String {
    let total_secs = secs as u64;
    let hours = total_secs / 3600;
    let mins = (total_secs % 3600) / 60;
    let secs = total_secs % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, mins, secs)
    } else {
        format!("{}:{:02}", mins, secs)
    }
}
