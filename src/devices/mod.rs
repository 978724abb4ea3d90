// Capture and virtual-camera device adapters
//
// The pipeline only talks to the traits here. The GStreamer backends live in
// `gst_source` / `gst_sink`; tests plug in in-memory fakes.

pub mod enumeration;
pub mod gst_sink;
pub mod gst_source;
pub mod health;
pub mod pacing;

pub use enumeration::candidate_devices;
pub use gst_sink::GstSinkBackend;
pub use gst_source::GstSourceBackend;
pub use health::{DeviceRecovery, ReadHealth};
pub use pacing::FramePacer;

use serde::Serialize;

use crate::video::{ChannelOrder, Frame, SinkFormat};

/// Error type for device operations
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("Device {device} unavailable: {reason}")]
    Unavailable { device: String, reason: String },

    #[error("Read from {device} failed: {reason}")]
    ReadFailed { device: String, reason: String },

    #[error("Send to {device} failed: {reason}")]
    SendFailed { device: String, reason: String },

    #[error("Device {device} delivered {actual_width}x{actual_height}, expected {width}x{height}")]
    FormatMismatch {
        device: String,
        width: u32,
        height: u32,
        actual_width: u32,
        actual_height: u32,
    },
}

pub type Result<T> = std::result::Result<T, DeviceError>;

impl DeviceError {
    pub fn unavailable(device: &str, reason: impl ToString) -> Self {
        DeviceError::Unavailable {
            device: device.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn read_failed(device: &str, reason: impl ToString) -> Self {
        DeviceError::ReadFailed {
            device: device.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn send_failed(device: &str, reason: impl ToString) -> Self {
        DeviceError::SendFailed {
            device: device.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Frame geometry and rate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FrameFormat {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl FrameFormat {
    pub fn new(width: u32, height: u32, fps: u32) -> Self {
        Self { width, height, fps }
    }
}

impl std::fmt::Display for FrameFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}@{}", self.width, self.height, self.fps)
    }
}

/// An opened device: what was asked for and what the driver agreed to
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceHandle {
    pub device: String,
    pub requested: FrameFormat,
    pub negotiated: FrameFormat,
}

impl DeviceHandle {
    pub fn new(device: impl Into<String>, requested: FrameFormat) -> Self {
        Self {
            device: device.into(),
            requested,
            negotiated: requested,
        }
    }
}

/// A live capture device
pub trait FrameSource: Send {
    fn handle(&self) -> &DeviceHandle;

    /// Next frame, blocking at most about one frame interval
    fn read(&mut self) -> Result<Frame>;

    /// Ask the device for a different format without reopening the handle
    fn reconfigure(&mut self, format: FrameFormat) -> Result<()>;

    fn close(&mut self);
}

/// Opens capture devices
pub trait SourceBackend: Send + Sync {
    fn open(&self, device: &str, format: FrameFormat) -> Result<Box<dyn FrameSource>>;

    /// Paths to probe while waiting for a camera, in priority order
    fn candidates(&self, preferred: &str, exclude: &str, count: u32) -> Vec<String> {
        candidate_devices(preferred, exclude, count)
    }
}

/// A live output device. `send` blocks until the next pacing slot.
pub trait FrameSink: Send {
    fn handle(&self) -> &DeviceHandle;

    /// Channel order the device consumes
    fn channel_order(&self) -> ChannelOrder;

    fn send(&mut self, frame: &Frame) -> Result<()>;

    fn close(&mut self);

    /// Exact format every frame must have before `send`
    fn format(&self) -> SinkFormat {
        let negotiated = self.handle().negotiated;
        SinkFormat {
            width: negotiated.width,
            height: negotiated.height,
            order: self.channel_order(),
        }
    }
}

/// Opens output devices
pub trait SinkBackend: Send + Sync {
    fn open(&self, device: &str, format: FrameFormat) -> Result<Box<dyn FrameSink>>;
}
