//! Frame timing for the render thread

use std::time::{Duration, Instant};

/// Measures per-frame delta time on the thread that owns it
///
/// The render thread keeps its own `Timer`; nothing about frame timing is
/// shared with the input thread.
#[derive(Debug, Clone)]
pub struct Timer {
    started: Instant,
    last_frame: Instant,
    delta: Duration,
    frame_count: u64,
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

impl Timer {
    /// Create a timer starting now
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            started: now,
            last_frame: now,
            delta: Duration::ZERO,
            frame_count: 0,
        }
    }

    /// Mark the start of a new frame and return the time since the last one
    pub fn tick(&mut self) -> Duration {
        self.tick_at(Instant::now())
    }

    fn tick_at(&mut self, now: Instant) -> Duration {
        self.delta = now.saturating_duration_since(self.last_frame);
        self.last_frame = now;
        self.frame_count += 1;
        self.delta
    }

    /// Duration of the last frame
    pub fn delta(&self) -> Duration {
        self.delta
    }

    /// Duration of the last frame in seconds
    pub fn delta_time(&self) -> f32 {
        self.delta.as_secs_f32()
    }

    /// Time between creation and the most recent tick
    pub fn total_time(&self) -> Duration {
        self.last_frame.saturating_duration_since(self.started)
    }

    /// Number of ticks so far
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Average frames per second since creation
    #[allow(clippy::cast_precision_loss)]
    pub fn average_fps(&self) -> f32 {
        let total = self.total_time().as_secs_f32();
        if total > 0.0 {
            self.frame_count as f32 / total
        } else {
            0.0
        }
    }

    /// Frames per second based on the last frame alone
    pub fn current_fps(&self) -> f32 {
        let delta = self.delta_time();
        if delta > 0.0 {
            1.0 / delta
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timer_creation() {
        let timer = Timer::new();
        assert_eq!(timer.frame_count(), 0);
        assert_eq!(timer.delta(), Duration::ZERO);
        assert!(timer.current_fps().abs() < f32::EPSILON);
    }

    #[test]
    fn test_tick_accumulates() {
        let mut timer = Timer::new();
        let start = timer.last_frame;

        let delta = timer.tick_at(start + Duration::from_millis(16));
        assert_eq!(delta, Duration::from_millis(16));
        timer.tick_at(start + Duration::from_millis(36));

        assert_eq!(timer.frame_count(), 2);
        assert_eq!(timer.delta(), Duration::from_millis(20));
        assert_eq!(timer.total_time(), Duration::from_millis(36));
        assert!((timer.current_fps() - 50.0).abs() < 0.01);
    }

    #[test]
    fn test_clock_going_backwards_saturates() {
        let mut timer = Timer::new();
        let start = timer.last_frame;
        timer.tick_at(start + Duration::from_millis(10));
        let delta = timer.tick_at(start);
        assert_eq!(delta, Duration::ZERO);
    }
}
