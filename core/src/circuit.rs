//! Circuit manager: builds, caches, refreshes, and expires circuits.
//!
//! Selection samples without replacement from `PeerDirectory::candidates`,
//! generalized to mode-driven hop counts and a minimum-3 anonymity floor.

use std::time::{Duration, Instant};

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::directory::Peer;
use crate::error::CircuitError;

/// User-facing circuit-length preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CircuitMode {
    Fast,
    Adaptive,
    Mix,
}

/// Freshly minted 16-byte circuit id from the CSPRNG.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CircuitId(pub [u8; 16]);

impl CircuitId {
    pub fn random() -> Self {
        let mut bytes = [0u8; 16];
        rand::rngs::OsRng.try_fill(&mut bytes).ok();
        if bytes == [0u8; 16] {
            rand::thread_rng().fill(&mut bytes);
        }
        Self(bytes)
    }
}

impl std::fmt::Display for CircuitId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// An ordered path of 3–5 peers.
#[derive(Debug, Clone)]
pub struct Circuit {
    pub id: CircuitId,
    pub mode: CircuitMode,
    pub hops: Vec<Peer>,
    pub created_at: Instant,
    pub ttl: Duration,
    pub refresh_deadline: Instant,
}

impl Circuit {
    pub fn hop_count(&self) -> usize {
        self.hops.len()
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.created_at) > self.ttl
    }

    pub fn last_hop(&self) -> &Peer {
        self.hops.last().expect("circuits are never built empty")
    }
}

/// Picks the nominal hop count for a mode before the minimum-hops floor is
/// applied: fast=2, adaptive=3, mix=4-5.
fn nominal_hop_count(mode: CircuitMode) -> usize {
    match mode {
        CircuitMode::Fast => 2,
        CircuitMode::Adaptive => 3,
        CircuitMode::Mix => rand::thread_rng().gen_range(4..=5),
    }
}

pub struct CircuitBuilder {
    pub min_hops: usize,
    pub max_hops: usize,
    pub ttl: Duration,
    pub refresh_interval: Duration,
}

impl CircuitBuilder {
    pub fn new(min_hops: usize, max_hops: usize, ttl: Duration, refresh_interval: Duration) -> Self {
        Self {
            min_hops,
            max_hops,
            ttl,
            refresh_interval,
        }
    }

    /// Builds a circuit of `mode`'s nominal hop count, refusing construction
    /// if that count falls below the configured `min_hops` floor or if
    /// there aren't enough eligible candidates.
    pub fn build_circuit(
        &self,
        mode: CircuitMode,
        candidates: &[Peer],
    ) -> Result<Circuit, CircuitError> {
        // The mode's nominal count is capped at `max_hops` (Mix already samples
        // within range) but NOT floored at `min_hops` — a mode whose native
        // hop count undershoots the anonymity floor is refused outright rather
        // than silently inflated.
        let requested = nominal_hop_count(mode).min(self.max_hops);
        if requested < self.min_hops {
            return Err(CircuitError::BelowMinimumHops {
                requested,
                min: self.min_hops,
            });
        }
        if candidates.len() < requested {
            return Err(CircuitError::InsufficientPeers {
                needed: requested,
                available: candidates.len(),
            });
        }

        let mut pool: Vec<&Peer> = candidates.iter().collect();
        pool.shuffle(&mut rand::thread_rng());
        let hops: Vec<Peer> = pool.into_iter().take(requested).cloned().collect();

        let now = Instant::now();
        Ok(Circuit {
            id: CircuitId::random(),
            mode,
            hops,
            created_at: now,
            ttl: self.ttl,
            refresh_deadline: now + self.refresh_interval,
        })
    }
}
