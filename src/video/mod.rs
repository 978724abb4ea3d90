// Frame buffers and pixel conversion
//
// Frames are immutable once produced: the pixel bytes live behind an `Arc`, so handing the
// latest frame to the preview streamer or the picture command is a pointer copy.
// Capture devices deliver BGR; the virtual camera wants RGB. `prepare_for_sink` is the one
// place where that conversion (and resize-to-fit) happens.

pub mod jpeg;

pub use jpeg::encode_jpeg;

use std::sync::Arc;

use image::imageops::{self, FilterType};
use image::RgbImage;

/// Bytes per pixel for every frame in the pipeline
pub const CHANNELS: usize = 3;

/// Channel order of a packed 24-bit frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelOrder {
    /// Blue, green, red (what the capture pipeline produces)
    Bgr,
    /// Red, green, blue (what the virtual camera consumes)
    Rgb,
}

impl ChannelOrder {
    /// Reorder an RGB triple into this channel order
    pub fn pack(self, rgb: [u8; 3]) -> [u8; 3] {
        match self {
            ChannelOrder::Rgb => rgb,
            ChannelOrder::Bgr => [rgb[2], rgb[1], rgb[0]],
        }
    }
}

/// Error type for frame operations
#[derive(Debug, thiserror::Error)]
pub enum VideoError {
    #[error("Frame buffer is {actual} bytes, expected {expected} for {width}x{height}")]
    InvalidBuffer {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },

    #[error("Frame has zero size")]
    EmptyFrame,

    #[error("Image encoding failed: {0}")]
    Encode(#[from] image::ImageError),
}

pub type Result<T> = std::result::Result<T, VideoError>;

/// A packed 24-bit frame
#[derive(Clone)]
pub struct Frame {
    width: u32,
    height: u32,
    order: ChannelOrder,
    data: Arc<[u8]>,
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("order", &self.order)
            .finish()
    }
}

impl Frame {
    /// Wrap packed pixel bytes, checking the buffer matches the dimensions
    pub fn new(width: u32, height: u32, order: ChannelOrder, data: Vec<u8>) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(VideoError::EmptyFrame);
        }
        let expected = width as usize * height as usize * CHANNELS;
        if data.len() != expected {
            return Err(VideoError::InvalidBuffer {
                width,
                height,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            order,
            data: data.into(),
        })
    }

    /// A frame filled with one color (given as RGB)
    pub fn solid(width: u32, height: u32, order: ChannelOrder, rgb: [u8; 3]) -> Self {
        let px = order.pack(rgb);
        let count = width.max(1) as usize * height.max(1) as usize;
        let mut data = Vec::with_capacity(count * CHANNELS);
        for _ in 0..count {
            data.extend_from_slice(&px);
        }
        Self {
            width: width.max(1),
            height: height.max(1),
            order,
            data: data.into(),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn order(&self) -> ChannelOrder {
        self.order
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Pixel at (x, y) as RGB regardless of storage order
    pub fn rgb_at(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = (y as usize * self.width as usize + x as usize) * CHANNELS;
        let px = [self.data[i], self.data[i + 1], self.data[i + 2]];
        Some(match self.order {
            ChannelOrder::Rgb => px,
            ChannelOrder::Bgr => [px[2], px[1], px[0]],
        })
    }

    /// Same picture in the requested channel order
    pub fn with_order(&self, order: ChannelOrder) -> Frame {
        if order == self.order {
            return self.clone();
        }
        let mut data = self.data.to_vec();
        for px in data.chunks_exact_mut(CHANNELS) {
            px.swap(0, 2);
        }
        Frame {
            width: self.width,
            height: self.height,
            order,
            data: data.into(),
        }
    }

    /// Scale to exactly `width` x `height`, keeping the channel order
    pub fn resized(&self, width: u32, height: u32) -> Frame {
        if (width, height) == (self.width, self.height) || width == 0 || height == 0 {
            return self.clone();
        }
        // The resampler is channel-agnostic, so the bytes go through as-is.
        let Some(src) = RgbImage::from_raw(self.width, self.height, self.data.to_vec()) else {
            return self.clone();
        };
        let scaled = imageops::resize(&src, width, height, FilterType::Triangle);
        Frame {
            width,
            height,
            order: self.order,
            data: scaled.into_raw().into(),
        }
    }

    /// Copy out as an RGB image (for encoding)
    pub fn to_rgb_image(&self) -> RgbImage {
        let rgb = self.with_order(ChannelOrder::Rgb);
        // Dimensions were validated at construction
        RgbImage::from_raw(rgb.width, rgb.height, rgb.data.to_vec())
            .unwrap_or_else(|| RgbImage::new(rgb.width, rgb.height))
    }

    /// Take the pixel bytes for mutation (copies if shared)
    pub fn into_bytes(self) -> Vec<u8> {
        self.data.to_vec()
    }
}

/// What the sink device was opened with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SinkFormat {
    pub width: u32,
    pub height: u32,
    pub order: ChannelOrder,
}

/// Convert a pipeline frame into exactly what the sink accepts:
/// sink channel order and sink resolution.
pub fn prepare_for_sink(frame: &Frame, format: &SinkFormat) -> Frame {
    frame
        .with_order(format.order)
        .resized(format.width, format.height)
}
