// V4L2 capture through GStreamer
//
// Pipeline: v4l2src -> videoconvert -> videoscale -> videorate -> capsfilter(BGR) -> appsink
//
// The appsink keeps at most two buffers and drops the rest, so a slow tick always gets
// the newest frame rather than a backlog.

use std::sync::Arc;
use std::time::{Duration, Instant};

use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;
use parking_lot::Mutex;

use super::{DeviceError, DeviceHandle, FrameFormat, FrameSource, Result, SourceBackend};
use crate::gstreamer_init::init_gstreamer_env;
use crate::video::{ChannelOrder, Frame, CHANNELS};

/// How long a device-monitor scan is reused between recovery rounds
const ENUMERATION_TTL: Duration = Duration::from_secs(30);

/// Opens `v4l2src` capture pipelines
#[derive(Debug, Default, Clone)]
pub struct GstSourceBackend {
    enumerated: Arc<Mutex<Option<(Instant, Vec<String>)>>>,
}

impl GstSourceBackend {
    pub fn new() -> Self {
        init_gstreamer_env();
        Self::default()
    }

    fn enumerated_paths(&self) -> Vec<String> {
        let mut cache = self.enumerated.lock();
        if let Some((at, paths)) = cache.as_ref() {
            if at.elapsed() < ENUMERATION_TTL {
                return paths.clone();
            }
        }
        let paths = super::enumeration::enumerate_capture_paths();
        *cache = Some((Instant::now(), paths.clone()));
        paths
    }
}

impl SourceBackend for GstSourceBackend {
    fn open(&self, device: &str, format: FrameFormat) -> Result<Box<dyn FrameSource>> {
        Ok(Box::new(GstCapture::open(device, format)?))
    }

    fn candidates(&self, preferred: &str, exclude: &str, count: u32) -> Vec<String> {
        let mut out = super::candidate_devices(preferred, exclude, count);
        for path in self.enumerated_paths() {
            if path != exclude && !out.contains(&path) {
                out.push(path);
            }
        }
        out
    }
}

fn bgr_caps(format: FrameFormat) -> gst::Caps {
    gst::Caps::builder("video/x-raw")
        .field("format", gst_video::VideoFormat::Bgr.to_str())
        .field("width", format.width as i32)
        .field("height", format.height as i32)
        .field("framerate", gst::Fraction::new(format.fps.max(1) as i32, 1))
        .build()
}

/// Drain the bus and return the first error, if any
fn bus_error(pipeline: &gst::Pipeline) -> Option<String> {
    let bus = pipeline.bus()?;
    let mut first = None;
    while let Some(msg) = bus.pop_filtered(&[gst::MessageType::Error, gst::MessageType::Eos]) {
        match msg.view() {
            gst::MessageView::Error(err) => {
                let src = err.src().map(|s| s.name().to_string()).unwrap_or_default();
                log::debug!("[Capture] Bus error from '{}': {} ({:?})", src, err.error(), err.debug());
                first.get_or_insert_with(|| format!("{}: {}", src, err.error()));
            }
            gst::MessageView::Eos(_) => {
                first.get_or_insert_with(|| "end of stream".to_string());
            }
            _ => {}
        }
    }
    first
}

/// A running capture pipeline
pub struct GstCapture {
    handle: DeviceHandle,
    pipeline: gst::Pipeline,
    capsfilter: gst::Element,
    appsink: gst_app::AppSink,
    pull_timeout: gst::ClockTime,
    closed: bool,
}

impl GstCapture {
    pub fn open(device: &str, format: FrameFormat) -> Result<Self> {
        let fail = |reason: String| DeviceError::unavailable(device, reason);

        let pipeline = gst::Pipeline::new();

        let source = gst::ElementFactory::make("v4l2src")
            .property("device", device)
            .build()
            .map_err(|e| fail(format!("Failed to create v4l2src: {}", e)))?;
        let convert = gst::ElementFactory::make("videoconvert")
            .build()
            .map_err(|e| fail(format!("Failed to create videoconvert: {}", e)))?;
        let scale = gst::ElementFactory::make("videoscale")
            .build()
            .map_err(|e| fail(format!("Failed to create videoscale: {}", e)))?;
        let rate = gst::ElementFactory::make("videorate")
            .property("drop-only", true)
            .build()
            .map_err(|e| fail(format!("Failed to create videorate: {}", e)))?;
        let capsfilter = gst::ElementFactory::make("capsfilter")
            .property("caps", bgr_caps(format))
            .build()
            .map_err(|e| fail(format!("Failed to create capsfilter: {}", e)))?;

        let appsink = gst_app::AppSink::builder()
            .name("sink")
            .max_buffers(2)
            .drop(true)
            .sync(false)
            .build();

        pipeline
            .add_many([&source, &convert, &scale, &rate, &capsfilter, appsink.upcast_ref()])
            .map_err(|e| fail(format!("Failed to add elements: {}", e)))?;
        gst::Element::link_many([&source, &convert, &scale, &rate, &capsfilter, appsink.upcast_ref()])
            .map_err(|e| fail(format!("Failed to link pipeline: {}", e)))?;

        if let Err(e) = pipeline.set_state(gst::State::Playing) {
            let detail = bus_error(&pipeline).unwrap_or_else(|| e.to_string());
            let _ = pipeline.set_state(gst::State::Null);
            return Err(fail(detail));
        }

        let (state_result, _, _) = pipeline.state(Some(gst::ClockTime::from_seconds(5)));
        if state_result.is_err() {
            let detail = bus_error(&pipeline).unwrap_or_else(|| "pipeline failed to start".into());
            let _ = pipeline.set_state(gst::State::Null);
            return Err(fail(detail));
        }

        let interval_ms = 1000 / format.fps.max(1) as u64;
        let pull_timeout = gst::ClockTime::from_mseconds((interval_ms * 2).max(100));

        log::info!("[Capture] Opened {} at {}", device, format);

        Ok(Self {
            handle: DeviceHandle::new(device, format),
            pipeline,
            capsfilter,
            appsink,
            pull_timeout,
            closed: false,
        })
    }

    fn copy_frame(&mut self, sample: &gst::Sample) -> Result<Frame> {
        let device = self.handle.device.clone();
        let caps = sample
            .caps()
            .ok_or_else(|| DeviceError::read_failed(&device, "sample without caps"))?;
        let info = gst_video::VideoInfo::from_caps(caps)
            .map_err(|e| DeviceError::read_failed(&device, e))?;
        let buffer = sample
            .buffer()
            .ok_or_else(|| DeviceError::read_failed(&device, "sample without buffer"))?;
        let map = buffer
            .map_readable()
            .map_err(|e| DeviceError::read_failed(&device, e))?;

        let width = info.width();
        let height = info.height();
        let row_bytes = width as usize * CHANNELS;
        let stride = info.stride()[0].max(0) as usize;
        let offset = info.offset()[0];

        let data = copy_rows(map.as_slice(), offset, stride, row_bytes, height as usize)
            .ok_or_else(|| DeviceError::read_failed(&device, "empty or short buffer"))?;

        if self.handle.negotiated.width != width || self.handle.negotiated.height != height {
            log::info!("[Capture] {} negotiated {}x{}", device, width, height);
            self.handle.negotiated.width = width;
            self.handle.negotiated.height = height;
        }
        if info.fps().denom() > 0 && info.fps().numer() > 0 {
            self.handle.negotiated.fps = (info.fps().numer() / info.fps().denom()) as u32;
        }

        Frame::new(width, height, ChannelOrder::Bgr, data)
            .map_err(|e| DeviceError::read_failed(&device, e))
    }
}

/// Pack `rows` rows of `row_bytes` out of a strided plane. `None` for an empty frame or
/// a plane too short for its declared layout.
fn copy_rows(
    src: &[u8],
    offset: usize,
    stride: usize,
    row_bytes: usize,
    rows: usize,
) -> Option<Vec<u8>> {
    if rows == 0 || row_bytes == 0 || stride < row_bytes {
        return None;
    }
    let needed = stride
        .checked_mul(rows - 1)?
        .checked_add(row_bytes)?
        .checked_add(offset)?;
    if src.len() < needed {
        return None;
    }

    let mut data = Vec::with_capacity(row_bytes * rows);
    for row in 0..rows {
        let start = offset + row * stride;
        data.extend_from_slice(&src[start..start + row_bytes]);
    }
    Some(data)
}

impl FrameSource for GstCapture {
    fn handle(&self) -> &DeviceHandle {
        &self.handle
    }

    fn read(&mut self) -> Result<Frame> {
        if self.closed {
            return Err(DeviceError::read_failed(&self.handle.device, "closed"));
        }
        if let Some(err) = bus_error(&self.pipeline) {
            return Err(DeviceError::read_failed(&self.handle.device, err));
        }
        if self.appsink.is_eos() {
            return Err(DeviceError::read_failed(&self.handle.device, "end of stream"));
        }

        match self.appsink.try_pull_sample(self.pull_timeout) {
            Some(sample) => self.copy_frame(&sample),
            None => Err(DeviceError::read_failed(&self.handle.device, "timed out")),
        }
    }

    fn reconfigure(&mut self, format: FrameFormat) -> Result<()> {
        log::info!("[Capture] Reconfiguring {} to {}", self.handle.device, format);

        // v4l2 only renegotiates cleanly from READY
        let device = self.handle.device.clone();
        self.pipeline
            .set_state(gst::State::Ready)
            .map_err(|e| DeviceError::unavailable(&device, e))?;
        self.capsfilter.set_property("caps", bgr_caps(format));
        self.pipeline
            .set_state(gst::State::Playing)
            .map_err(|e| DeviceError::unavailable(&device, e))?;

        self.handle.requested = format;
        let interval_ms = 1000 / format.fps.max(1) as u64;
        self.pull_timeout = gst::ClockTime::from_mseconds((interval_ms * 2).max(100));
        std::thread::sleep(Duration::from_millis(50));
        Ok(())
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let _ = self.pipeline.set_state(gst::State::Null);
        log::info!("[Capture] Closed {}", self.handle.device);
    }
}

impl Drop for GstCapture {
    fn drop(&mut self) {
        self.close();
    }
}
