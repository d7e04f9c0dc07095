//! Elapsed-time tracking for progress logs

use std::time::{Duration, Instant};

/// Restartable wall-clock timer
#[derive(Debug, Clone, Copy)]
pub struct Stopwatch {
    start: Instant,
}

impl Stopwatch {
    /// Create a stopwatch that starts counting immediately
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Reset the stopwatch to zero
    pub fn start(&mut self) {
        self.start = Instant::now();
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Items per second over the elapsed time; 0.0 before any time has passed
    pub fn rate(&self, count: usize) -> f64 {
        let secs = self.elapsed().as_secs_f64();
        if secs > 0.0 {
            count as f64 / secs
        } else {
            0.0
        }
    }
}

impl Default for Stopwatch {
    fn default() -> Self {
        Self::new()
    }
}
