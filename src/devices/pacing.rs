// Frame-rate pacing for the output device

use std::time::{Duration, Instant};

/// Deadline clock that releases one slot per frame interval.
///
/// If the caller falls more than one interval behind, the schedule restarts from now
/// instead of bursting to catch up.
#[derive(Debug)]
pub struct FramePacer {
    interval: Duration,
    next: Option<Instant>,
}

impl FramePacer {
    pub fn new(fps: u32) -> Self {
        Self {
            interval: Duration::from_secs_f64(1.0 / fps.max(1) as f64),
            next: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Sleep until the next slot
    pub fn wait(&mut self) {
        let now = Instant::now();
        let deadline = match self.next {
            Some(deadline) => deadline,
            None => {
                // First frame goes out immediately
                self.next = Some(now + self.interval);
                return;
            }
        };

        if deadline > now {
            std::thread::sleep(deadline - now);
            self.next = Some(deadline + self.interval);
        } else if now - deadline > self.interval {
            self.next = Some(now + self.interval);
        } else {
            self.next = Some(deadline + self.interval);
        }
    }

    pub fn reset(&mut self) {
        self.next = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn holds_the_configured_rate() {
        let mut pacer = FramePacer::new(50);
        let start = Instant::now();
        for _ in 0..6 {
            pacer.wait();
        }
        // First slot is immediate, five more at 20ms each
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(95), "{:?}", elapsed);
        assert!(elapsed < Duration::from_millis(400), "{:?}", elapsed);
    }

    #[test]
    fn resyncs_after_stall() {
        let mut pacer = FramePacer::new(100);
        pacer.wait();
        std::thread::sleep(Duration::from_millis(60));

        // No burst of catch-up frames after the stall
        let start = Instant::now();
        pacer.wait();
        pacer.wait();
        assert!(start.elapsed() >= Duration::from_millis(8));
    }
}
