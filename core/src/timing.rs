//! Per-hop timing jitter: a uniform delay before every forwarded or
//! originated frame, cover frames included.
//!
//! Kept as its own validated-config primitive, a single uniform
//! distribution — no priority tiers, no exponential mode.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct JitterConfig {
    /// Upper (exclusive) bound of the delay, in milliseconds.
    pub max_ms: u64,
}

impl JitterConfig {
    pub fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

/// Samples a delay uniformly in `[0, max_ms)` milliseconds.
pub fn compute_jitter(config: JitterConfig) -> Duration {
    if config.max_ms == 0 {
        return Duration::ZERO;
    }
    let ms = rand::thread_rng().gen_range(0..config.max_ms);
    Duration::from_millis(ms)
}
