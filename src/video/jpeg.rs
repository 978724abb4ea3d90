// JPEG encoding for preview chunks and saved pictures

use image::codecs::jpeg::JpegEncoder;
use image::ColorType;

use super::{Frame, Result};

/// Encode a frame as baseline JPEG. `quality` is clamped to 1..=100.
pub fn encode_jpeg(frame: &Frame, quality: u8) -> Result<Vec<u8>> {
    let rgb = frame.to_rgb_image();
    let mut buf = Vec::with_capacity(rgb.as_raw().len() / 8);
    let mut encoder = JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100));
    encoder.encode(rgb.as_raw(), rgb.width(), rgb.height(), ColorType::Rgb8)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::video::ChannelOrder;

    #[test]
    fn produces_jpeg_with_frame_dimensions() {
        let frame = Frame::solid(40, 30, ChannelOrder::Bgr, [10, 20, 30]);
        let bytes = encode_jpeg(&frame, 80).unwrap();

        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
        assert_eq!(&bytes[bytes.len() - 2..], &[0xFF, 0xD9]);

        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (40, 30));
    }
}
