// Live preview for remote viewers
//
// Each stream paces itself with its own interval and only reads the latest composited
// frame, so a slow viewer never holds up the pipeline; it just sees fewer frames.
// The output size is looked up per frame, so stepping the preview resolution applies to
// streams that are already open.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval, Interval, MissedTickBehavior};

use super::Orchestrator;
use crate::video::{encode_jpeg, Result};

/// Multipart boundary the chunks are framed with
pub const BOUNDARY: &str = "frame";

/// `Content-Type` for a response carrying `next_chunk` output
pub fn content_type() -> String {
    format!("multipart/x-mixed-replace; boundary={}", BOUNDARY)
}

pub struct PreviewStream {
    orchestrator: Arc<Orchestrator>,
    ticker: Interval,
    quality: u8,
}

impl PreviewStream {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        let config = orchestrator.config();
        let fps = config.preview_fps.max(1);
        let quality = config.preview_quality;

        let mut ticker = interval(Duration::from_secs_f64(1.0 / fps as f64));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        Self {
            orchestrator,
            ticker,
            quality,
        }
    }

    /// Next JPEG at the current preview resolution, waiting for the stream's next slot
    pub async fn next_jpeg(&mut self) -> Result<Vec<u8>> {
        self.ticker.tick().await;
        let (frame, _) = self.orchestrator.latest_composited();
        let size = self.orchestrator.preview_resolution();
        encode_jpeg(&frame.resized(size.width, size.height), self.quality)
    }

    /// Next frame framed as one multipart part
    pub async fn next_chunk(&mut self) -> Result<Vec<u8>> {
        let jpeg = self.next_jpeg().await?;
        Ok(multipart_chunk(&jpeg))
    }
}

/// `--frame\r\nContent-Type: image/jpeg\r\n\r\n<jpeg>\r\n`
pub fn multipart_chunk(jpeg: &[u8]) -> Vec<u8> {
    let header = format!("--{}\r\nContent-Type: image/jpeg\r\n\r\n", BOUNDARY);
    let mut chunk = Vec::with_capacity(header.len() + jpeg.len() + 2);
    chunk.extend_from_slice(header.as_bytes());
    chunk.extend_from_slice(jpeg);
    chunk.extend_from_slice(b"\r\n");
    chunk
}
