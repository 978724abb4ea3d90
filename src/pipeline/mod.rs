//! Frame pipeline orchestrator
//!
//! One dedicated thread runs the tick loop: read the camera, refresh the UI snapshot,
//! composite the overlay for preview consumers, and relay the raw frame to the virtual
//! camera. The thread exclusively owns both device handles. Everything else (commands,
//! preview streams, the stats refresher) only sees the shared state here.
//!
//! When the camera stops delivering, the loop keeps feeding the sink with a labeled
//! placeholder and probes for a camera until one comes back.

pub mod metadata;
pub mod preview;
pub mod ui_state;

pub use metadata::Metadata;
pub use preview::PreviewStream;
pub use ui_state::{SharedUiState, UiSnapshot};

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};

use crate::config::{Config, Resolution};
use crate::devices::{
    DeviceError, DeviceRecovery, FrameFormat, FrameSink, FrameSource, ReadHealth, SinkBackend,
    SourceBackend,
};
use crate::encoding::EncoderLauncher;
use crate::notifications;
use crate::overlay;
use crate::recording::{RecorderSettings, RecordingController};
use crate::storage::{FileRelocator, OutputLayout, StatsProbe};
use crate::video::{prepare_for_sink, Frame};

/// How often storage and memory usage are refreshed
pub const STATS_INTERVAL: Duration = Duration::from_secs(1);

/// Device backends and the encoder launcher the pipeline is built from
pub struct Backends {
    pub source: Arc<dyn SourceBackend>,
    pub sink: Arc<dyn SinkBackend>,
    pub encoder: Box<dyn EncoderLauncher>,
}

/// Most recent frames, swapped whole on every tick
#[derive(Default)]
pub struct LatestFrames {
    pub raw: Option<Frame>,
    pub composited: Option<Frame>,
    pub sequence: u64,
}

pub struct Orchestrator {
    config: Config,
    ui: SharedUiState,
    latest: RwLock<LatestFrames>,
    recorder: RecordingController,
    source_backend: Arc<dyn SourceBackend>,
    sink_backend: Arc<dyn SinkBackend>,
    running: AtomicBool,
    worker: Mutex<Option<JoinHandle<()>>>,
    stats: Mutex<StatsProbe>,
    placeholder: Mutex<Option<(String, Frame)>>,
    preview_step: AtomicUsize,
}

impl Orchestrator {
    pub fn new(config: Config, backends: Backends) -> crate::recording::Result<Arc<Self>> {
        let layout = OutputLayout::new(&config.output_root);
        layout.ensure_tree()?;

        let recorder = RecordingController::new(
            backends.encoder,
            FileRelocator::new()?,
            layout,
            RecorderSettings {
                container: config.container,
                staging_root: config.staging_dir(),
                stop_timeout: Duration::from_secs(config.encoder_stop_timeout_secs),
            },
        );

        let ui = SharedUiState::new(UiSnapshot::new(
            &config.camera_device,
            (config.resolution.width, config.resolution.height),
            config.show_stats_overlay,
        ));

        Ok(Arc::new(Self {
            config,
            ui,
            latest: RwLock::new(LatestFrames::default()),
            recorder,
            source_backend: backends.source,
            sink_backend: backends.sink,
            running: AtomicBool::new(false),
            worker: Mutex::new(None),
            stats: Mutex::new(StatsProbe::new()),
            placeholder: Mutex::new(None),
            preview_step: AtomicUsize::new(0),
        }))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn ui(&self) -> &SharedUiState {
        &self.ui
    }

    pub fn recorder(&self) -> &RecordingController {
        &self.recorder
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn format(&self) -> FrameFormat {
        FrameFormat::new(
            self.config.resolution.width,
            self.config.resolution.height,
            self.config.fps,
        )
    }

    pub fn message_duration(&self) -> Duration {
        Duration::from_secs(self.config.message_duration_secs)
    }

    /// Size preview streams currently scale to
    pub fn preview_resolution(&self) -> Resolution {
        let steps = &self.config.preview_resolutions;
        if steps.is_empty() {
            return self.config.resolution;
        }
        steps[self.preview_step.load(Ordering::Acquire) % steps.len()]
    }

    /// Move to the next (or previous) preview size, wrapping at either end
    pub fn step_preview_resolution(&self, forward: bool) -> Resolution {
        let len = self.config.preview_resolutions.len();
        if len > 0 {
            let _ = self
                .preview_step
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |i| {
                    let i = i % len;
                    Some(if forward { (i + 1) % len } else { (i + len - 1) % len })
                });
        }
        let resolution = self.preview_resolution();
        log::info!("[Preview] Resolution set to {}", resolution);
        resolution
    }

    /// Open the devices and start the tick thread.
    ///
    /// A missing virtual camera is fatal. A missing camera is not: the pipeline starts on
    /// placeholders and waits for one.
    pub fn start(self: &Arc<Self>) -> Result<(), DeviceError> {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            return Ok(());
        }

        let format = self.format();
        let sink = self.sink_backend.open(&self.config.virtual_device, format)?;

        let source = match self.source_backend.open(&self.config.camera_device, format) {
            Ok(source) => {
                self.ui.update(|s| s.camera_connected = true);
                Some(source)
            }
            Err(e) => {
                log::warn!("[Pipeline] Camera not available at startup: {}", e);
                None
            }
        };

        self.running.store(true, Ordering::Release);
        let this = Arc::clone(self);
        let handle = std::thread::Builder::new()
            .name("frame-pipeline".into())
            .spawn(move || this.run_loop(sink, source))
            .map_err(|e| DeviceError::unavailable("frame-pipeline", e))?;
        *worker = Some(handle);

        log::info!("[Pipeline] Started at {}", format);
        Ok(())
    }

    fn run_loop(&self, mut sink: Box<dyn FrameSink>, mut source: Option<Box<dyn FrameSource>>) {
        let format = self.format();
        let mut health = ReadHealth::new(self.config.max_failed_reads);
        let mut recovery = DeviceRecovery::new(
            &self.config.camera_device,
            &self.config.virtual_device,
            self.config.probe_device_count,
            Duration::from_secs(self.config.recovery_poll_secs),
        );
        let mut device = source
            .as_ref()
            .map(|s| s.handle().device.clone())
            .unwrap_or_else(|| self.config.camera_device.clone());
        let mut last_raw: Option<Frame> = None;
        let mut reconfigured = false;
        let mut send_failures: u64 = 0;

        if source.is_none() {
            recovery.arm();
        }

        while self.running.load(Ordering::Acquire) {
            let mut frame = None;

            if let Some(src) = source.as_mut() {
                match src.read() {
                    Ok(f) => {
                        health.record_success();
                        frame = Some(f);
                    }
                    Err(e) => {
                        log::debug!("[Pipeline] {}", e);
                        if health.record_failure() {
                            log::warn!(
                                "[Pipeline] {} failed {} reads in a row, waiting for a camera",
                                device,
                                health.failures()
                            );
                            src.close();
                            source = None;
                            last_raw = None;
                            health.reset();
                            recovery.set_preferred(&device);
                            recovery.arm();
                            self.ui.update(|s| s.camera_connected = false);
                            self.ui
                                .notify(notifications::camera_lost(&device, self.message_duration()));
                        } else {
                            // Brief hiccup: repeat the last good frame
                            frame = last_raw.clone();
                        }
                    }
                }
            } else if let Some(recovered) = recovery.poll(&self.source_backend, format) {
                device = recovered.source.handle().device.clone();
                source = Some(recovered.source);
                frame = Some(recovered.first_frame);
                reconfigured = false;
                health.reset();
                let label = device.clone();
                self.ui.update(|s| {
                    s.camera_connected = true;
                    s.camera_device = label;
                });
                self.ui
                    .notify(notifications::camera_restored(&device, self.message_duration()));
            }

            if let (Some(f), Some(src)) = (frame.as_ref(), source.as_mut()) {
                if f.dimensions() != (format.width, format.height) && !reconfigured {
                    reconfigured = true;
                    if let Err(e) = src.reconfigure(format) {
                        log::warn!("[Pipeline] Could not reconfigure {}: {}", device, e);
                    }
                }
            }

            if let Some(f) = frame.as_ref() {
                last_raw = Some(f.clone());
            }
            let raw = frame.unwrap_or_else(|| self.placeholder_for(&device));

            let out = self.tick(raw, sink.format());
            if let Err(e) = sink.send(&out) {
                send_failures += 1;
                if send_failures == 1 || send_failures % 100 == 0 {
                    log::warn!("[Pipeline] Sink send failed ({} so far): {}", send_failures, e);
                }
            }
        }

        if let Some(mut src) = source {
            src.close();
        }
        sink.close();
        log::info!("[Pipeline] Stopped");
    }

    /// One pass of the per-frame work between read and send. Returns the frame to relay.
    fn tick(&self, raw: Frame, sink_format: crate::video::SinkFormat) -> Frame {
        if let Some(event) = self.recorder.poll() {
            if let Some(msg) = notifications::for_recording_event(&event, self.message_duration()) {
                self.ui.notify(msg);
            }
        }

        let relocation = self.recorder.relocation();
        let is_recording = self.recorder.is_recording();
        let elapsed_label = self.recorder.elapsed_label();
        let started = self.recorder.started_instant();
        self.ui.update(|s| {
            s.is_recording = is_recording;
            s.elapsed_label = elapsed_label;
            s.recording_started_at = started;
            s.relocation = relocation;
        });

        let snapshot = self.ui.snapshot();
        let composited = overlay::compose(&raw, &snapshot);
        let out = prepare_for_sink(&raw, &sink_format);

        let mut latest = self.latest.write();
        latest.raw = Some(raw);
        latest.composited = Some(composited);
        latest.sequence += 1;

        out
    }

    fn placeholder_for(&self, device: &str) -> Frame {
        let mut cache = self.placeholder.lock();
        if let Some((label, frame)) = cache.as_ref() {
            if label == device {
                return frame.clone();
            }
        }
        let (w, h) = (self.config.resolution.width, self.config.resolution.height);
        let frame = overlay::placeholder(w, h, device);
        *cache = Some((device.to_string(), frame.clone()));
        frame
    }

    /// Latest raw camera frame, or the placeholder when there is none
    pub fn latest_raw(&self) -> Frame {
        if let Some(frame) = self.latest.read().raw.clone() {
            return frame;
        }
        let device = self.ui.snapshot().camera_device;
        self.placeholder_for(&device)
    }

    /// Latest frame with the overlay, or the placeholder before the first tick
    pub fn latest_composited(&self) -> (Frame, u64) {
        let latest = self.latest.read();
        if let Some(frame) = latest.composited.clone() {
            return (frame, latest.sequence);
        }
        drop(latest);
        let device = self.ui.snapshot().camera_device;
        (self.placeholder_for(&device), 0)
    }

    /// Update storage and memory usage shown on the overlay and in metadata
    pub fn refresh_stats(&self) {
        let (storage, memory) = {
            let mut probe = self.stats.lock();
            let storage = probe.storage_for(self.recorder.layout().root());
            (storage, probe.memory())
        };
        self.ui.update(|s| {
            s.storage = storage;
            s.memory = memory;
        });
    }

    /// Refresh stats every second on the current tokio runtime until shutdown
    pub fn spawn_stats_refresher(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(STATS_INTERVAL);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if !this.is_running() {
                    break;
                }
                let worker = Arc::clone(&this);
                if tokio::task::spawn_blocking(move || worker.refresh_stats())
                    .await
                    .is_err()
                {
                    log::error!("[Stats] Refresh panicked");
                }
            }
            log::debug!("[Stats] Refresher stopped");
        })
    }

    pub fn metadata(&self) -> Metadata {
        Metadata::collect(self)
    }

    /// Stop the tick thread and release both devices
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                log::error!("[Pipeline] Tick thread panicked");
            }
        }
    }
}
