//! Cover-traffic scheduling: generates `0xFF` frames indistinguishable from
//! real traffic after onion wrapping, at a jittered interval derived from a
//! target rate.
//!
//! Poll-based: callers invoke [`CoverScheduler::poll`] themselves. Here
//! scheduling is driven by the router's own periodic timer tick rather than
//! by an external poller.

use std::time::{Duration, Instant};

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::codec::build_cover_frame;

pub const COVER_MIN_SIZE: usize = 512;
pub const COVER_MAX_SIZE: usize = 2048;
pub const SCHEDULER_TICK: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct CoverConfig {
    pub enabled: bool,
    /// Target cover packets per second.
    pub rate_per_second: f64,
}

impl CoverConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.rate_per_second < 0.0 {
            return Err("rate_per_second cannot be negative".into());
        }
        Ok(())
    }

    /// Mean inter-packet interval for this rate, jittered ±25%.
    fn sampled_interval(&self) -> Duration {
        if self.rate_per_second <= 0.0 {
            return Duration::from_secs(u64::MAX / 2);
        }
        let base_ms = 1000.0 / self.rate_per_second;
        let jitter = rand::thread_rng().gen_range(0.75..=1.25);
        Duration::from_millis((base_ms * jitter) as u64)
    }
}

/// Poll-driven generator: the router ticks this every [`SCHEDULER_TICK`] and
/// calls [`CoverScheduler::poll`] to find out whether it's time to emit.
pub struct CoverScheduler {
    config: CoverConfig,
    next_emission: Instant,
}

impl CoverScheduler {
    pub fn new(config: CoverConfig) -> Self {
        let next_emission = Instant::now() + config.sampled_interval();
        Self {
            config,
            next_emission,
        }
    }

    pub fn set_config(&mut self, config: CoverConfig) {
        self.config = config;
        self.next_emission = Instant::now() + config.sampled_interval();
    }

    pub fn enabled(&self) -> bool {
        self.config.enabled
    }

    /// Returns `Some(frame)` if `now` has passed the scheduled emission
    /// time, and reschedules the next one.
    pub fn poll(&mut self, now: Instant) -> Option<Vec<u8>> {
        if !self.config.enabled || now < self.next_emission {
            return None;
        }
        self.next_emission = now + self.config.sampled_interval();
        let size = rand::thread_rng().gen_range(COVER_MIN_SIZE..=COVER_MAX_SIZE);
        Some(build_cover_frame(size))
    }
}
