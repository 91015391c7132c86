use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Trailing window for frame-rate measurement.
pub const FPS_WINDOW: Duration = Duration::from_secs(5);

/// Frame timestamps over the last [`FPS_WINDOW`].
#[derive(Default)]
pub struct FpsCounter {
    frames: VecDeque<Instant>,
}

impl FpsCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, now: Instant) {
        self.frames.push_back(now);
        while let Some(&oldest) = self.frames.front() {
            if now.saturating_duration_since(oldest) > FPS_WINDOW {
                self.frames.pop_front();
            } else {
                break;
            }
        }
    }

    /// Whole frames per second averaged over the window.
    pub fn fps(&self) -> usize {
        self.frames.len() / FPS_WINDOW.as_secs() as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn averages_over_window() {
        let start = Instant::now();
        let mut counter = FpsCounter::new();
        for i in 0..50 {
            counter.record(start + Duration::from_millis(i * 100));
        }
        assert_eq!(counter.fps(), 10);
    }

    #[test]
    fn evicts_old_frames() {
        let start = Instant::now();
        let mut counter = FpsCounter::new();
        for i in 0..25 {
            counter.record(start + Duration::from_millis(i * 200));
        }
        // Long gap: only the newest timestamp survives.
        counter.record(start + Duration::from_secs(60));
        assert_eq!(counter.frames.len(), 1);
        assert_eq!(counter.fps(), 0);
    }
}
