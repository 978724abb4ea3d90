// Virtual camera output through GStreamer
//
// Pipeline: appsrc(RGB) -> videoconvert -> v4l2sink
//
// The sink device is usually a v4l2loopback node that the encoder and any video-call
// client read from.

use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;

use super::{DeviceError, DeviceHandle, FrameFormat, FramePacer, FrameSink, Result, SinkBackend};
use crate::gstreamer_init::init_gstreamer_env;
use crate::video::{ChannelOrder, Frame};

/// Opens `v4l2sink` output pipelines
#[derive(Debug, Default, Clone)]
pub struct GstSinkBackend;

impl GstSinkBackend {
    pub fn new() -> Self {
        init_gstreamer_env();
        Self
    }
}

impl SinkBackend for GstSinkBackend {
    fn open(&self, device: &str, format: FrameFormat) -> Result<Box<dyn FrameSink>> {
        Ok(Box::new(GstLoopback::open(device, format)?))
    }
}

pub struct GstLoopback {
    handle: DeviceHandle,
    pipeline: gst::Pipeline,
    appsrc: gst_app::AppSrc,
    pacer: FramePacer,
    closed: bool,
}

impl GstLoopback {
    pub fn open(device: &str, format: FrameFormat) -> Result<Self> {
        let fail = |reason: String| DeviceError::unavailable(device, reason);

        let pipeline = gst::Pipeline::new();

        let caps = gst::Caps::builder("video/x-raw")
            .field("format", gst_video::VideoFormat::Rgb.to_str())
            .field("width", format.width as i32)
            .field("height", format.height as i32)
            .field("framerate", gst::Fraction::new(format.fps.max(1) as i32, 1))
            .build();

        let appsrc = gst_app::AppSrc::builder()
            .name("src")
            .caps(&caps)
            .format(gst::Format::Time)
            .is_live(true)
            .do_timestamp(true)
            .build();

        let convert = gst::ElementFactory::make("videoconvert")
            .build()
            .map_err(|e| fail(format!("Failed to create videoconvert: {}", e)))?;
        let sink = gst::ElementFactory::make("v4l2sink")
            .property("device", device)
            .property("sync", false)
            .build()
            .map_err(|e| fail(format!("Failed to create v4l2sink: {}", e)))?;

        pipeline
            .add_many([appsrc.upcast_ref(), &convert, &sink])
            .map_err(|e| fail(format!("Failed to add elements: {}", e)))?;
        gst::Element::link_many([appsrc.upcast_ref(), &convert, &sink])
            .map_err(|e| fail(format!("Failed to link pipeline: {}", e)))?;

        if let Err(e) = pipeline.set_state(gst::State::Playing) {
            let _ = pipeline.set_state(gst::State::Null);
            return Err(fail(e.to_string()));
        }

        // A missing loopback node surfaces as an error on the bus once the sink opens it
        if let Some(bus) = pipeline.bus() {
            if let Some(msg) =
                bus.timed_pop_filtered(gst::ClockTime::from_mseconds(500), &[gst::MessageType::Error])
            {
                if let gst::MessageView::Error(err) = msg.view() {
                    let reason = err.error().to_string();
                    let _ = pipeline.set_state(gst::State::Null);
                    return Err(fail(reason));
                }
            }
        }

        log::info!("[Sink] Opened {} at {}", device, format);

        Ok(Self {
            handle: DeviceHandle::new(device, format),
            pipeline,
            appsrc,
            pacer: FramePacer::new(format.fps),
            closed: false,
        })
    }
}

impl FrameSink for GstLoopback {
    fn handle(&self) -> &DeviceHandle {
        &self.handle
    }

    fn channel_order(&self) -> ChannelOrder {
        ChannelOrder::Rgb
    }

    fn send(&mut self, frame: &Frame) -> Result<()> {
        if self.closed {
            return Err(DeviceError::send_failed(&self.handle.device, "closed"));
        }
        let want = self.handle.negotiated;
        if frame.dimensions() != (want.width, want.height) {
            return Err(DeviceError::FormatMismatch {
                device: self.handle.device.clone(),
                width: want.width,
                height: want.height,
                actual_width: frame.width(),
                actual_height: frame.height(),
            });
        }

        let data = frame.with_order(ChannelOrder::Rgb).into_bytes();
        let buffer = gst::Buffer::from_mut_slice(data);
        let pushed = self.appsrc.push_buffer(buffer);

        self.pacer.wait();

        pushed
            .map(|_| ())
            .map_err(|e| DeviceError::send_failed(&self.handle.device, format!("{:?}", e)))
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let _ = self.appsrc.end_of_stream();
        let _ = self.pipeline.set_state(gst::State::Null);
        log::info!("[Sink] Closed {}", self.handle.device);
    }
}

impl Drop for GstLoopback {
    fn drop(&mut self) {
        self.close();
    }
}
