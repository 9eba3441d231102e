//! Runtime configuration.

use serde::{Deserialize, Serialize};

use crate::circuit::CircuitMode;

/// All tunables the core surface exposes. No environment variables or
/// on-disk state are part of this surface — a `CoreConfig` is constructed
/// in-process and handed to `Core::init`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CoreConfig {
    /// Minimum circuit length accepted for user payload.
    pub min_hops: usize,
    /// Maximum circuit length built.
    pub max_hops: usize,
    /// Maximum circuit age before expiry, in milliseconds.
    pub circuit_ttl_ms: u64,
    /// Refresh-check interval, in milliseconds.
    pub circuit_refresh_ms: u64,
    /// Eviction threshold for incomplete handshakes, in milliseconds.
    pub handshake_timeout_ms: u64,
    /// `last_seen` window for candidacy, in milliseconds.
    pub staleness_ms: u64,
    /// Target cover packets per second.
    pub cover_rate: f64,
    /// Master switch for cover traffic generation.
    pub cover_enabled: bool,
    /// Upper bound of the per-hop random delay, in milliseconds.
    pub jitter_max_ms: u64,
    /// Default mode used by `send` when the caller doesn't care.
    pub default_mode: CircuitMode,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            min_hops: 3,
            max_hops: 5,
            circuit_ttl_ms: 600_000,
            circuit_refresh_ms: 300_000,
            handshake_timeout_ms: 5_000,
            staleness_ms: 60_000,
            cover_rate: 2.0,
            cover_enabled: true,
            jitter_max_ms: 100,
            default_mode: CircuitMode::Adaptive,
        }
    }
}

impl CoreConfig {
    /// Checks internal consistency of the tunables.
    pub fn validate(&self) -> Result<(), String> {
        if self.min_hops < 3 {
            return Err("min_hops below the enforced anonymity floor of 3".into());
        }
        if self.max_hops < self.min_hops {
            return Err("max_hops must be >= min_hops".into());
        }
        if self.max_hops > 5 {
            return Err("max_hops above 5 exceeds MAX_ONION_HOPS".into());
        }
        if self.circuit_refresh_ms == 0 {
            return Err("circuit_refresh_ms must be > 0".into());
        }
        if self.circuit_ttl_ms == 0 {
            return Err("circuit_ttl_ms must be > 0".into());
        }
        if self.cover_rate < 0.0 {
            return Err("cover_rate cannot be negative".into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(CoreConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_min_hops_below_floor() {
        let mut cfg = CoreConfig::default();
        cfg.min_hops = 1;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_max_below_min() {
        let mut cfg = CoreConfig::default();
        cfg.min_hops = 4;
        cfg.max_hops = 3;
        assert!(cfg.validate().is_err());
    }
}
