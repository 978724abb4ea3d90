// Capture health tracking and wait-for-device recovery

use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, SendError, TryRecvError};

use super::{FrameFormat, FrameSource, SourceBackend};
use crate::video::Frame;

/// Counts consecutive read failures. Any successful read resets the count.
#[derive(Debug)]
pub struct ReadHealth {
    threshold: u32,
    consecutive_failures: u32,
}

impl ReadHealth {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold: threshold.max(1),
            consecutive_failures: 0,
        }
    }

    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
    }

    /// Record a failure; true once the threshold is reached
    pub fn record_failure(&mut self) -> bool {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.consecutive_failures >= self.threshold
    }

    pub fn failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn reset(&mut self) {
        self.consecutive_failures = 0;
    }
}

/// A device that came back, with the frame that proved it works
pub struct Recovered {
    pub source: Box<dyn FrameSource>,
    pub first_frame: Frame,
}

/// Periodic search for a usable camera while the pipeline runs on placeholders.
///
/// Opening a device can block for seconds, so each round runs on its own thread and
/// `poll` only collects the result. The caller keeps ticking meanwhile.
#[derive(Debug)]
pub struct DeviceRecovery {
    preferred: String,
    exclude: String,
    scan_count: u32,
    interval: Duration,
    last_round: Option<Instant>,
    pending: Option<Receiver<Option<Recovered>>>,
    attempts: u64,
}

impl DeviceRecovery {
    pub fn new(preferred: &str, exclude: &str, scan_count: u32, interval: Duration) -> Self {
        Self {
            preferred: preferred.to_string(),
            exclude: exclude.to_string(),
            scan_count,
            interval,
            last_round: None,
            pending: None,
            attempts: 0,
        }
    }

    /// Prefer the device that was last working on the next round
    pub fn set_preferred(&mut self, device: &str) {
        self.preferred = device.to_string();
    }

    /// Make the next `poll` start a round immediately
    pub fn arm(&mut self) {
        self.last_round = None;
    }

    pub fn attempts(&self) -> u64 {
        self.attempts
    }

    /// A round is running in the background
    pub fn in_progress(&self) -> bool {
        self.pending.is_some()
    }

    /// Never blocks. Collects a finished round, or starts a new one once the interval
    /// has elapsed. Returns `None` until a round finds a camera.
    pub fn poll(
        &mut self,
        backend: &Arc<dyn SourceBackend>,
        format: FrameFormat,
    ) -> Option<Recovered> {
        if let Some(rx) = self.pending.as_ref() {
            return match rx.try_recv() {
                Ok(result) => {
                    self.pending = None;
                    result
                }
                Err(TryRecvError::Empty) => None,
                Err(TryRecvError::Disconnected) => {
                    log::warn!("[Recovery] Search thread ended without a result");
                    self.pending = None;
                    None
                }
            };
        }

        let now = Instant::now();
        if let Some(last) = self.last_round {
            if now.duration_since(last) < self.interval {
                return None;
            }
        }
        self.last_round = Some(now);
        self.attempts += 1;

        let (tx, rx) = bounded::<Option<Recovered>>(1);
        let backend = Arc::clone(backend);
        let preferred = self.preferred.clone();
        let exclude = self.exclude.clone();
        let count = self.scan_count;
        let round = self.attempts;

        let spawned = std::thread::Builder::new()
            .name("camera-recovery".into())
            .spawn(move || {
                let found =
                    search_round(backend.as_ref(), &preferred, &exclude, count, format, round);
                // Receiver gone means the pipeline stopped mid-round
                if let Err(SendError(Some(mut unused))) = tx.send(found) {
                    unused.source.close();
                }
            });
        match spawned {
            Ok(_) => self.pending = Some(rx),
            Err(e) => log::warn!("[Recovery] Could not start search thread: {}", e),
        }
        None
    }
}

fn search_round(
    backend: &dyn SourceBackend,
    preferred: &str,
    exclude: &str,
    count: u32,
    format: FrameFormat,
    round: u64,
) -> Option<Recovered> {
    let candidates = backend.candidates(preferred, exclude, count);
    log::debug!(
        "[Recovery] Round {} over {} candidate(s)",
        round,
        candidates.len()
    );

    for device in candidates {
        let mut source = match backend.open(&device, format) {
            Ok(source) => source,
            Err(e) => {
                log::trace!("[Recovery] {}", e);
                continue;
            }
        };
        match source.read() {
            Ok(first_frame) => {
                log::info!("[Recovery] Camera available at {}", device);
                return Some(Recovered {
                    source,
                    first_frame,
                });
            }
            Err(e) => {
                log::debug!("[Recovery] {} opened but gave no frame: {}", device, e);
                source.close();
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::devices::{DeviceError, DeviceHandle};
    use crate::video::ChannelOrder;

    /// Takes `open_delay` to open `/dev/video3`; every other path is missing
    struct SlowBackend {
        open_delay: Duration,
    }

    struct StillCamera {
        handle: DeviceHandle,
    }

    impl FrameSource for StillCamera {
        fn handle(&self) -> &DeviceHandle {
            &self.handle
        }

        fn read(&mut self) -> crate::devices::Result<Frame> {
            Ok(Frame::solid(8, 6, ChannelOrder::Bgr, [1, 2, 3]))
        }

        fn reconfigure(&mut self, _format: FrameFormat) -> crate::devices::Result<()> {
            Ok(())
        }

        fn close(&mut self) {}
    }

    impl SourceBackend for SlowBackend {
        fn open(
            &self,
            device: &str,
            format: FrameFormat,
        ) -> crate::devices::Result<Box<dyn FrameSource>> {
            std::thread::sleep(self.open_delay);
            if device != "/dev/video3" {
                return Err(DeviceError::unavailable(device, "no such device"));
            }
            Ok(Box::new(StillCamera {
                handle: DeviceHandle::new(device, format),
            }))
        }

        fn candidates(&self, _preferred: &str, _exclude: &str, _count: u32) -> Vec<String> {
            vec!["/dev/video0".into(), "/dev/video3".into()]
        }
    }

    #[test]
    fn slow_open_does_not_block_poll() {
        let backend: Arc<dyn SourceBackend> = Arc::new(SlowBackend {
            open_delay: Duration::from_millis(300),
        });
        let format = FrameFormat::new(8, 6, 30);
        let mut recovery =
            DeviceRecovery::new("/dev/video0", "/dev/video40", 4, Duration::from_secs(60));
        recovery.arm();

        let deadline = Instant::now() + Duration::from_secs(10);
        let recovered = loop {
            let started = Instant::now();
            let result = recovery.poll(&backend, format);
            assert!(
                started.elapsed() < Duration::from_millis(100),
                "poll blocked for {:?}",
                started.elapsed()
            );
            if let Some(recovered) = result {
                break recovered;
            }
            assert!(Instant::now() < deadline, "camera never found");
            std::thread::sleep(Duration::from_millis(10));
        };

        assert_eq!(recovered.source.handle().device, "/dev/video3");
        assert_eq!(recovered.first_frame.dimensions(), (8, 6));
        assert_eq!(recovery.attempts(), 1);
        assert!(!recovery.in_progress());
    }

    /// Every path is missing
    struct NoCameras;

    impl SourceBackend for NoCameras {
        fn open(
            &self,
            device: &str,
            _format: FrameFormat,
        ) -> crate::devices::Result<Box<dyn FrameSource>> {
            Err(DeviceError::unavailable(device, "no such device"))
        }

        fn candidates(&self, _preferred: &str, _exclude: &str, _count: u32) -> Vec<String> {
            vec!["/dev/video0".into()]
        }
    }

    #[test]
    fn empty_round_waits_for_the_interval() {
        let nothing: Arc<dyn SourceBackend> = Arc::new(NoCameras);
        let working: Arc<dyn SourceBackend> = Arc::new(SlowBackend {
            open_delay: Duration::ZERO,
        });
        let format = FrameFormat::new(8, 6, 30);
        let mut recovery =
            DeviceRecovery::new("/dev/video0", "/dev/video40", 4, Duration::from_secs(60));

        assert!(recovery.poll(&nothing, format).is_none());
        let deadline = Instant::now() + Duration::from_secs(5);
        while recovery.in_progress() {
            assert!(recovery.poll(&nothing, format).is_none());
            assert!(Instant::now() < deadline, "round never finished");
            std::thread::sleep(Duration::from_millis(5));
        }

        // Inside the interval nothing new starts, even with a working backend
        assert!(recovery.poll(&working, format).is_none());
        assert!(!recovery.in_progress());
        assert_eq!(recovery.attempts(), 1);

        recovery.arm();
        assert!(recovery.poll(&working, format).is_none());
        assert!(recovery.in_progress());
        assert_eq!(recovery.attempts(), 2);
    }

    #[test]
    fn trips_only_after_consecutive_failures() {
        let mut health = ReadHealth::new(3);
        assert!(!health.record_failure());
        assert!(!health.record_failure());
        health.record_success();
        assert_eq!(health.failures(), 0);

        assert!(!health.record_failure());
        assert!(!health.record_failure());
        assert!(health.record_failure());
    }
}
