//! Per-user wait-time strategies applied between task iterations.
//!
//! A [`Pacer`] is owned by a single virtual user and turns the configured
//! [`WaitTime`] into a concrete sleep after each iteration.
//!
//! Constant pacing (and constant throughput, its reciprocal form) measures
//! how long the iteration that just finished took and only sleeps for the
//! remainder of the interval. A slow iteration therefore produces no wait
//! at all rather than a negative one, and the rate never exceeds the cap.

use rand::Rng;
use std::time::{Duration, Instant};

use crate::loadtest::config::WaitTime;

/// Wait-time state for one virtual user.
#[derive(Debug, Clone)]
pub struct Pacer {
    wait_time: WaitTime,
    /// Instant of the previous `next_wait` call.
    last_call: Option<Instant>,
    /// Wait returned by the previous `next_wait` call.
    last_wait: Duration,
}

impl Pacer {
    pub fn new(wait_time: WaitTime) -> Self {
        Self {
            wait_time,
            last_call: None,
            last_wait: Duration::ZERO,
        }
    }

    /// Returns how long to sleep after an iteration that finished at `now`.
    pub fn next_wait<R: Rng + ?Sized>(&mut self, now: Instant, rng: &mut R) -> Duration {
        let wait = match self.wait_time {
            WaitTime::Constant { seconds } => Duration::from_secs_f64(seconds),
            WaitTime::Between { min_secs, max_secs } => {
                if max_secs > min_secs {
                    Duration::from_secs_f64(rng.random_range(min_secs..=max_secs))
                } else {
                    Duration::from_secs_f64(min_secs)
                }
            },
            WaitTime::ConstantPacing { .. } | WaitTime::ConstantThroughput { .. } => {
                let interval = self.wait_time.pacing_interval().unwrap_or_default();
                // Time spent running the iteration that just ended. The first
                // iteration has no predecessor and is never delayed.
                let run_time = match self.last_call {
                    Some(last) => now
                        .saturating_duration_since(last)
                        .saturating_sub(self.last_wait),
                    None => interval,
                };
                interval.saturating_sub(run_time)
            },
        };
        self.last_call = Some(now);
        self.last_wait = wait;
        wait
    }
}
