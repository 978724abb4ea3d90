// Shared UI state read by the compositor
//
// Fields the overlay reads together are always written together under one lock, and the
// compositor works on a cloned snapshot so it never holds the lock while drawing.

use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::storage::{RelocationProgress, UsageStats};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Info,
    Error,
}

/// Short-lived text shown on the overlay
#[derive(Debug, Clone, PartialEq)]
pub struct TransientMessage {
    pub text: String,
    pub kind: MessageKind,
    pub expires_at: Instant,
}

impl TransientMessage {
    pub fn new(text: impl Into<String>, kind: MessageKind, duration: Duration) -> Self {
        Self {
            text: text.into(),
            kind,
            expires_at: Instant::now() + duration,
        }
    }

    pub fn is_visible(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// Everything the overlay needs for one frame
#[derive(Debug, Clone)]
pub struct UiSnapshot {
    /// When this snapshot was taken
    pub now: Instant,
    pub booted_at: Instant,
    pub is_recording: bool,
    pub recording_started_at: Option<Instant>,
    pub elapsed_label: String,
    pub transient_message: Option<TransientMessage>,
    pub storage: UsageStats,
    pub memory: UsageStats,
    pub relocation: Option<RelocationProgress>,
    pub show_stats: bool,
    pub camera_connected: bool,
    pub camera_device: String,
    pub resolution: (u32, u32),
}

impl UiSnapshot {
    pub fn new(camera_device: &str, resolution: (u32, u32), show_stats: bool) -> Self {
        let now = Instant::now();
        Self {
            now,
            booted_at: now,
            is_recording: false,
            recording_started_at: None,
            elapsed_label: "--:--:--".to_string(),
            transient_message: None,
            storage: UsageStats::default(),
            memory: UsageStats::default(),
            relocation: None,
            show_stats,
            camera_connected: false,
            camera_device: camera_device.to_string(),
            resolution,
        }
    }

    pub fn uptime(&self) -> Duration {
        self.now.saturating_duration_since(self.booted_at)
    }

    /// Message still on screen at `now`
    pub fn visible_message(&self) -> Option<&TransientMessage> {
        self.transient_message
            .as_ref()
            .filter(|m| m.is_visible(self.now))
    }
}

/// The one lock around the snapshot
pub struct SharedUiState {
    inner: Mutex<UiSnapshot>,
}

impl SharedUiState {
    pub fn new(initial: UiSnapshot) -> Self {
        Self {
            inner: Mutex::new(initial),
        }
    }

    /// Consistent copy, stamped with the current instant
    pub fn snapshot(&self) -> UiSnapshot {
        let mut snap = self.inner.lock().clone();
        snap.now = Instant::now();
        snap
    }

    /// Apply several field changes in one critical section
    pub fn update<F: FnOnce(&mut UiSnapshot)>(&self, f: F) {
        f(&mut self.inner.lock());
    }

    /// Replace the transient message
    pub fn notify(&self, message: TransientMessage) {
        log::info!("[UI] {}", message.text);
        self.inner.lock().transient_message = Some(message);
    }

    pub fn toggle_stats(&self) -> bool {
        let mut inner = self.inner.lock();
        inner.show_stats = !inner.show_stats;
        inner.show_stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_expires() {
        let ui = SharedUiState::new(UiSnapshot::new("/dev/video0", (640, 480), false));
        ui.notify(TransientMessage::new("PICTURE SAVED", MessageKind::Info, Duration::from_millis(30)));

        assert_eq!(ui.snapshot().visible_message().unwrap().text, "PICTURE SAVED");
        std::thread::sleep(Duration::from_millis(50));
        assert!(ui.snapshot().visible_message().is_none());
    }

    #[test]
    fn update_is_atomic_across_fields() {
        let ui = SharedUiState::new(UiSnapshot::new("/dev/video0", (640, 480), false));
        ui.update(|s| {
            s.is_recording = true;
            s.elapsed_label = "00:00:01".into();
        });
        let snap = ui.snapshot();
        assert!(snap.is_recording);
        assert_eq!(snap.elapsed_label, "00:00:01");
        assert!(ui.toggle_stats());
        assert!(!ui.toggle_stats());
    }
}
