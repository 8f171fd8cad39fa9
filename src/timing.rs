//! Stage timing.

use std::time::Instant;

/// Measures one pipeline stage and logs its duration when finished.
pub struct Timer {
    name: &'static str,
    start: Instant,
}

impl Timer {
    /// Start a new timer with the given stage name.
    pub fn start(name: &'static str) -> Self {
        tracing::debug!(stage = name, "Stage started");
        Self {
            name,
            start: Instant::now(),
        }
    }

    /// Finish the timer and log the elapsed time.
    pub fn finish(self) -> f64 {
        let secs = self.start.elapsed().as_secs_f64();
        if secs >= 60.0 {
            tracing::info!(stage = self.name, "[{:.1}m] {}", secs / 60.0, self.name);
        } else {
            tracing::info!(stage = self.name, "[{:.1}s] {}", secs, self.name);
        }
        secs
    }
}
