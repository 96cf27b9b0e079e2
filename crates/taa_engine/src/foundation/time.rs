//! Time management utilities

use std::time::{Duration, Instant};

/// Frame clock separating wall-clock time from simulation time
///
/// Wall-clock delta is measured every frame. Simulation time only advances
/// while animation is enabled, so pausing freezes the scene without
/// disturbing frame pacing statistics.
pub struct FrameClock {
    last_frame: Instant,
    delta_time: f64,
    sim_time: f64,
    frame_count: u64,
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameClock {
    /// Create a new clock starting now
    pub fn new() -> Self {
        Self {
            last_frame: Instant::now(),
            delta_time: 0.0,
            sim_time: 0.0,
            frame_count: 0,
        }
    }

    /// Advance the clock to `now`
    ///
    /// Returns the wall-clock delta in seconds.
    pub fn tick_at(&mut self, now: Instant, animate: bool) -> f64 {
        let elapsed = now.saturating_duration_since(self.last_frame);
        self.advance(elapsed, animate);
        self.last_frame = now;
        self.delta_time
    }

    /// Advance the clock to the current instant
    pub fn tick(&mut self, animate: bool) -> f64 {
        self.tick_at(Instant::now(), animate)
    }

    /// Advance by an explicit duration (used by deterministic drivers)
    pub fn advance(&mut self, elapsed: Duration, animate: bool) {
        self.delta_time = elapsed.as_secs_f64();
        if animate {
            self.sim_time += self.delta_time;
        }
        self.frame_count += 1;
    }

    /// Restart delta measurement from now
    ///
    /// Called after blocking operations (resize) so the stall is not
    /// reported as a giant frame delta.
    pub fn reset_delta(&mut self) {
        self.last_frame = Instant::now();
    }

    /// Wall-clock seconds spent in the last frame
    pub fn delta_time(&self) -> f64 {
        self.delta_time
    }

    /// Accumulated simulation seconds
    pub fn sim_time(&self) -> f64 {
        self.sim_time
    }

    /// Number of ticks since creation
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Current FPS (based on last frame time)
    pub fn current_fps(&self) -> f64 {
        if self.delta_time > 0.0 {
            1.0 / self.delta_time
        } else {
            0.0
        }
    }
}
