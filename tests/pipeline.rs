// End-to-end pipeline tests against in-memory devices

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use lenscast::commands::{Appliance, CommandError};
use lenscast::config::{Config, Resolution};
use lenscast::devices::{
    DeviceError, DeviceHandle, FrameFormat, FramePacer, FrameSink, FrameSource, SinkBackend,
    SourceBackend,
};
use lenscast::encoding::EncoderLauncher;
use lenscast::pipeline::Backends;
use lenscast::recording::{RecordingError, RecordingStatus};
use lenscast::video::{ChannelOrder, Frame};

const CAMERA: &str = "/dev/fakecam";
const LOOPBACK: &str = "/dev/fakesink";
const WIDTH: u32 = 160;
const HEIGHT: u32 = 120;
const FPS: u32 = 20;

// ============================================================================
// Fake devices
// ============================================================================

struct FakeCamera {
    handle: DeviceHandle,
    connected: Arc<AtomicBool>,
    pacer: FramePacer,
    size: (u32, u32),
}

impl FrameSource for FakeCamera {
    fn handle(&self) -> &DeviceHandle {
        &self.handle
    }

    fn read(&mut self) -> lenscast::devices::Result<Frame> {
        self.pacer.wait();
        if !self.connected.load(Ordering::SeqCst) {
            return Err(DeviceError::read_failed(CAMERA, "unplugged"));
        }
        Ok(Frame::solid(self.size.0, self.size.1, ChannelOrder::Bgr, [10, 200, 30]))
    }

    fn reconfigure(&mut self, _format: FrameFormat) -> lenscast::devices::Result<()> {
        Ok(())
    }

    fn close(&mut self) {}
}

/// How the fake camera behaves
#[derive(Debug, Clone, Copy)]
struct CameraOptions {
    present: bool,
    /// Every open attempt takes this long, found or not
    open_delay: Duration,
    /// Size of delivered frames, whatever was requested
    size: (u32, u32),
}

impl CameraOptions {
    fn present(present: bool) -> Self {
        Self {
            present,
            open_delay: Duration::ZERO,
            size: (WIDTH, HEIGHT),
        }
    }
}

struct FakeCameraBackend {
    connected: Arc<AtomicBool>,
    open_delay: Duration,
    size: (u32, u32),
}

impl SourceBackend for FakeCameraBackend {
    fn open(
        &self,
        device: &str,
        format: FrameFormat,
    ) -> lenscast::devices::Result<Box<dyn FrameSource>> {
        std::thread::sleep(self.open_delay);
        if device != CAMERA || !self.connected.load(Ordering::SeqCst) {
            return Err(DeviceError::unavailable(device, "no such device"));
        }
        Ok(Box::new(FakeCamera {
            handle: DeviceHandle::new(device, format),
            connected: Arc::clone(&self.connected),
            pacer: FramePacer::new(format.fps),
            size: self.size,
        }))
    }

    fn candidates(&self, _preferred: &str, _exclude: &str, _count: u32) -> Vec<String> {
        vec![CAMERA.to_string()]
    }
}

#[derive(Debug, Clone, Copy)]
struct Sent {
    width: u32,
    height: u32,
    order: ChannelOrder,
    at: Instant,
}

struct FakeLoopback {
    handle: DeviceHandle,
    sent: Arc<Mutex<Vec<Sent>>>,
    pacer: FramePacer,
}

impl FrameSink for FakeLoopback {
    fn handle(&self) -> &DeviceHandle {
        &self.handle
    }

    fn channel_order(&self) -> ChannelOrder {
        ChannelOrder::Rgb
    }

    fn send(&mut self, frame: &Frame) -> lenscast::devices::Result<()> {
        self.sent.lock().push(Sent {
            width: frame.width(),
            height: frame.height(),
            order: frame.order(),
            at: Instant::now(),
        });
        self.pacer.wait();
        Ok(())
    }

    fn close(&mut self) {}
}

struct FakeLoopbackBackend {
    sent: Arc<Mutex<Vec<Sent>>>,
}

impl SinkBackend for FakeLoopbackBackend {
    fn open(
        &self,
        device: &str,
        format: FrameFormat,
    ) -> lenscast::devices::Result<Box<dyn FrameSink>> {
        Ok(Box::new(FakeLoopback {
            handle: DeviceHandle::new(device, format),
            sent: Arc::clone(&self.sent),
            pacer: FramePacer::new(format.fps),
        }))
    }
}

/// Writes a few bytes to its output, then idles until SIGTERM
struct ShellEncoder;

impl EncoderLauncher for ShellEncoder {
    fn command(&self, output: &Path) -> std::process::Command {
        let mut cmd = std::process::Command::new("sh");
        cmd.arg("-c")
            .arg("trap 'exit 0' TERM; printf 'frames' > \"$1\"; while true; do sleep 0.05; done")
            .arg("encoder")
            .arg(output);
        cmd
    }
}

// ============================================================================
// Harness
// ============================================================================

struct Rig {
    appliance: Appliance,
    connected: Arc<AtomicBool>,
    sent: Arc<Mutex<Vec<Sent>>>,
    root: PathBuf,
    _dir: tempfile::TempDir,
}

impl Rig {
    fn launch(camera_present: bool) -> Self {
        Self::launch_with(CameraOptions::present(camera_present))
    }

    fn launch_with(camera: CameraOptions) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("output");

        let config = Config {
            resolution: Resolution::new(WIDTH, HEIGHT),
            fps: FPS,
            camera_device: CAMERA.to_string(),
            virtual_device: LOOPBACK.to_string(),
            output_root: root.clone(),
            staging_root: dir.path().join("staging"),
            max_failed_reads: 10,
            recovery_poll_secs: 1,
            encoder_stop_timeout_secs: 5,
            preview_resolutions: vec![Resolution::new(40, 30), Resolution::new(80, 60)],
            ..Config::default()
        };

        let connected = Arc::new(AtomicBool::new(camera.present));
        let sent = Arc::new(Mutex::new(Vec::new()));
        let backends = Backends {
            source: Arc::new(FakeCameraBackend {
                connected: Arc::clone(&connected),
                open_delay: camera.open_delay,
                size: camera.size,
            }),
            sink: Arc::new(FakeLoopbackBackend {
                sent: Arc::clone(&sent),
            }),
            encoder: Box::new(ShellEncoder),
        };

        let appliance = Appliance::launch(config, backends).unwrap();
        Self {
            appliance,
            connected,
            sent,
            root,
            _dir: dir,
        }
    }

    fn wait_for(&self, what: &str, timeout: Duration, mut check: impl FnMut(&Self) -> bool) {
        let deadline = Instant::now() + timeout;
        while !check(self) {
            assert!(Instant::now() < deadline, "timed out waiting for {}", what);
            std::thread::sleep(Duration::from_millis(20));
        }
    }

    fn camera_connected(&self) -> bool {
        self.appliance.get_metadata().camera_connected
    }

    /// Assert the loopback got a steady stream of full-size frames since `from`
    fn assert_steady_since(&self, from: usize) {
        let sent = self.sent.lock();
        assert!(sent.len() > from + 5, "only {} frames", sent.len() - from);
        for pair in sent[from..].windows(2) {
            let gap = pair[1].at - pair[0].at;
            assert!(gap < Duration::from_millis(250), "gap of {:?}", gap);
            assert_eq!((pair[1].width, pair[1].height), (WIDTH, HEIGHT));
        }
    }
}

impl Drop for Rig {
    fn drop(&mut self) {
        self.appliance.shutdown();
    }
}

// ============================================================================
// Relay
// ============================================================================

#[test]
fn relays_frames_in_sink_format() {
    let rig = Rig::launch(true);
    rig.wait_for("frames", Duration::from_secs(5), |r| r.sent.lock().len() >= 10);

    for sent in rig.sent.lock().iter() {
        assert_eq!((sent.width, sent.height), (WIDTH, HEIGHT));
        assert_eq!(sent.order, ChannelOrder::Rgb);
    }
    assert!(rig.camera_connected());
}

#[test]
fn keeps_relaying_placeholders_through_disconnect_and_recovers() {
    let rig = Rig::launch(true);
    rig.wait_for("frames", Duration::from_secs(5), |r| r.sent.lock().len() >= 5);

    rig.connected.store(false, Ordering::SeqCst);
    rig.wait_for("camera loss", Duration::from_secs(5), |r| !r.camera_connected());

    // The loopback keeps getting frames while nothing is plugged in
    let before = rig.sent.lock().len();
    std::thread::sleep(Duration::from_millis(800));
    rig.assert_steady_since(before);

    rig.connected.store(true, Ordering::SeqCst);
    rig.wait_for("recovery", Duration::from_secs(5), |r| r.camera_connected());
    assert_eq!(rig.appliance.get_metadata().camera_device, CAMERA);
}

#[test]
fn slow_device_opens_do_not_stall_the_loopback() {
    let rig = Rig::launch_with(CameraOptions {
        open_delay: Duration::from_millis(600),
        ..CameraOptions::present(true)
    });
    rig.wait_for("frames", Duration::from_secs(5), |r| r.sent.lock().len() >= 5);

    rig.connected.store(false, Ordering::SeqCst);
    rig.wait_for("camera loss", Duration::from_secs(5), |r| !r.camera_connected());

    // Spans at least one search round, each open taking 600ms
    let before = rig.sent.lock().len();
    std::thread::sleep(Duration::from_millis(1500));
    rig.assert_steady_since(before);

    rig.connected.store(true, Ordering::SeqCst);
    rig.wait_for("recovery", Duration::from_secs(8), |r| r.camera_connected());
}

#[test]
fn oversized_camera_frames_are_scaled_for_the_loopback() {
    let rig = Rig::launch_with(CameraOptions {
        size: (WIDTH * 2, HEIGHT * 2),
        ..CameraOptions::present(true)
    });
    rig.wait_for("frames", Duration::from_secs(5), |r| r.sent.lock().len() >= 10);

    for sent in rig.sent.lock().iter() {
        assert_eq!((sent.width, sent.height), (WIDTH, HEIGHT));
        assert_eq!(sent.order, ChannelOrder::Rgb);
    }
    assert!(rig.camera_connected());

    let jpeg = rig.appliance.latest_composited_jpeg().unwrap();
    let decoded = image::load_from_memory(&jpeg).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (WIDTH * 2, HEIGHT * 2));
}

#[test]
fn starts_without_a_camera() {
    let rig = Rig::launch(false);
    rig.wait_for("placeholder frames", Duration::from_secs(5), |r| {
        r.sent.lock().len() >= 5
    });
    assert!(!rig.camera_connected());

    rig.connected.store(true, Ordering::SeqCst);
    rig.wait_for("camera", Duration::from_secs(5), |r| r.camera_connected());
}

// ============================================================================
// Commands
// ============================================================================

#[test]
fn picture_without_camera_is_a_placeholder_jpeg() {
    let rig = Rig::launch(false);

    let (path, size) = rig.appliance.take_picture().unwrap();
    assert!(path.starts_with(rig.root.join("pictures")));
    assert_eq!(path.extension().and_then(|e| e.to_str()), Some("jpg"));
    assert_eq!(std::fs::metadata(&path).unwrap().len(), size);

    let decoded = image::open(&path).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (WIDTH, HEIGHT));
}

#[test]
fn preview_frame_is_a_jpeg() {
    let rig = Rig::launch(true);
    rig.wait_for("frames", Duration::from_secs(5), |r| r.sent.lock().len() >= 3);

    let jpeg = rig.appliance.latest_composited_jpeg().unwrap();
    assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
}

#[tokio::test]
async fn preview_stream_serves_downscaled_chunks() {
    let rig = Rig::launch(true);
    let mut stream = rig.appliance.preview_stream();

    let chunk = stream.next_chunk().await.unwrap();
    assert!(chunk.starts_with(b"--frame\r\nContent-Type: image/jpeg\r\n\r\n"));

    let jpeg = stream.next_jpeg().await.unwrap();
    let decoded = image::load_from_memory(&jpeg).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (40, 30));
}

#[tokio::test]
async fn preview_resolution_steps_and_wraps() {
    let rig = Rig::launch(true);
    let mut stream = rig.appliance.preview_stream();

    assert_eq!(rig.appliance.increase_preview_resolution(), Resolution::new(80, 60));
    let decoded = image::load_from_memory(&stream.next_jpeg().await.unwrap()).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (80, 60));
    assert_eq!(rig.appliance.get_metadata().preview_resolution, "80x60");

    // Past the largest wraps to the smallest, and back down again
    assert_eq!(rig.appliance.increase_preview_resolution(), Resolution::new(40, 30));
    assert_eq!(rig.appliance.decrease_preview_resolution(), Resolution::new(80, 60));
    assert_eq!(rig.appliance.decrease_preview_resolution(), Resolution::new(40, 30));

    let decoded = image::load_from_memory(&stream.next_jpeg().await.unwrap()).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (40, 30));
}

#[cfg(unix)]
#[test]
fn record_and_stop_saves_into_the_dated_tree() {
    let rig = Rig::launch(true);

    assert!(matches!(
        rig.appliance.stop_recording(),
        Err(CommandError::Recording(RecordingError::NotRecording))
    ));

    let info = rig.appliance.start_recording().unwrap();
    assert_eq!(info.status, RecordingStatus::Active);
    assert!(matches!(
        rig.appliance.start_recording(),
        Err(CommandError::Recording(RecordingError::AlreadyRecording))
    ));

    let metadata = rig.appliance.get_metadata();
    assert!(metadata.recording);
    assert!(metadata.start_time.is_some());

    std::thread::sleep(Duration::from_millis(300));
    rig.appliance.stop_recording().unwrap();

    // The tick thread drives the session back to idle
    rig.wait_for("recording to finish", Duration::from_secs(10), |r| {
        r.appliance.recording_state().status == RecordingStatus::Idle
    });

    let path = rig.appliance.recording_state().final_path.unwrap();
    assert!(path.starts_with(rig.root.join("videos")));
    assert!(std::fs::metadata(&path).unwrap().len() > 0);

    let month_dir = path.parent().unwrap().file_name().unwrap().to_str().unwrap();
    assert!(month_dir[month_dir.len() - 4..].chars().all(|c| c.is_ascii_digit()));
    let name = path.file_name().unwrap().to_str().unwrap();
    assert!(name.contains("__") && name.ends_with(".avi"), "{}", name);

    let metadata = rig.appliance.get_metadata();
    assert!(!metadata.recording);
    assert!(metadata.end_time.is_some());
}

#[test]
fn metadata_reports_configuration() {
    let rig = Rig::launch(true);
    let metadata = rig.appliance.get_metadata();

    assert!(!metadata.recording);
    assert_eq!(metadata.state, RecordingStatus::Idle);
    assert_eq!(metadata.fps, FPS);
    assert_eq!(metadata.resolution, "160x120");
    assert_eq!(metadata.root, rig.root);
    assert!(metadata.relocation.complete);
    assert!(metadata.relocation.target_path.is_none());

    let shown = rig.appliance.toggle_stats_overlay();
    assert_ne!(shown, rig.appliance.toggle_stats_overlay());
}
