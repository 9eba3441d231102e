//! Peer directory: tracks known peers, handshake state, and liveness.
//!
//! Mutated through a single owner, a `parking_lot::RwLock` guarding the map,
//! so the circuit builder and router can share it without a message queue.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use x25519_dalek::PublicKey;

use crate::error::DirectoryError;

const STATIC_KEY_LEN: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    Pending,
    Completed,
    Failed,
}

/// A discovered participant.
#[derive(Debug, Clone)]
pub struct Peer {
    pub id: String,
    pub substrate_addr: String,
    pub static_public_key: Vec<u8>,
    imported_key: Option<PublicKey>,
    pub last_seen: Instant,
    pub state: HandshakeState,
    pub handshake_opened_at: Instant,
}

impl Peer {
    /// Cached imported key handle — recomputed lazily, correctness does not
    /// depend on it being populated.
    pub fn imported_key(&mut self) -> Option<&PublicKey> {
        if self.imported_key.is_none() && self.static_public_key.len() == STATIC_KEY_LEN {
            let bytes: [u8; STATIC_KEY_LEN] = self.static_public_key.clone().try_into().ok()?;
            self.imported_key = Some(PublicKey::from(bytes));
        }
        self.imported_key.as_ref()
    }
}

#[derive(Default)]
pub struct PeerDirectory {
    peers: RwLock<HashMap<String, Peer>>,
}

impl PeerDirectory {
    pub fn new() -> Self {
        Self {
            peers: RwLock::new(HashMap::new()),
        }
    }

    /// Creates a `Pending` entry. Idempotent — re-inserting an already known
    /// peer id is a no-op on its handshake state.
    pub fn insert(&self, id: impl Into<String>, substrate_addr: impl Into<String>) {
        let id = id.into();
        let mut peers = self.peers.write();
        peers.entry(id.clone()).or_insert_with(|| Peer {
            id,
            substrate_addr: substrate_addr.into(),
            static_public_key: Vec::new(),
            imported_key: None,
            last_seen: Instant::now(),
            state: HandshakeState::Pending,
            handshake_opened_at: Instant::now(),
        });
    }

    /// Transitions `Pending` → `Completed`. Rejects keys shorter than the
    /// curve-expected length and invalidates the cached imported key handle.
    pub fn complete_handshake(&self, id: &str, static_pub: &[u8]) -> Result<(), DirectoryError> {
        if static_pub.len() < STATIC_KEY_LEN {
            return Err(DirectoryError::KeyTooShort);
        }
        let mut peers = self.peers.write();
        let peer = peers
            .get_mut(id)
            .ok_or_else(|| DirectoryError::UnknownPeer(id.to_string()))?;
        peer.static_public_key = static_pub.to_vec();
        peer.imported_key = None;
        peer.state = HandshakeState::Completed;
        peer.last_seen = Instant::now();
        Ok(())
    }

    /// Updates `last_seen` on any received frame.
    pub fn touch(&self, id: &str) {
        if let Some(peer) = self.peers.write().get_mut(id) {
            peer.last_seen = Instant::now();
        }
    }

    pub fn mark_failed(&self, id: &str) {
        if let Some(peer) = self.peers.write().get_mut(id) {
            peer.state = HandshakeState::Failed;
        }
    }

    /// Removes entries with `now - last_seen > staleness_window`, returning
    /// the evicted ids so callers (the circuit builder, the router) can tear
    /// down anything that referenced them.
    pub fn evict_stale(&self, staleness: Duration) -> Vec<String> {
        let mut peers = self.peers.write();
        let now = Instant::now();
        let stale: Vec<String> = peers
            .iter()
            .filter(|(_, p)| now.duration_since(p.last_seen) > staleness)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &stale {
            peers.remove(id);
        }
        stale
    }

    /// Evicts peers that have been `Pending` longer than `timeout`.
    pub fn evict_handshake_timeouts(&self, timeout: Duration) -> Vec<String> {
        let mut peers = self.peers.write();
        let now = Instant::now();
        let timed_out: Vec<String> = peers
            .iter()
            .filter(|(_, p)| {
                p.state == HandshakeState::Pending
                    && now.duration_since(p.handshake_opened_at) > timeout
            })
            .map(|(id, _)| id.clone())
            .collect();
        for id in &timed_out {
            peers.remove(id);
        }
        timed_out
    }

    /// Peers eligible for circuit selection: `Completed`, non-zero public
    /// key, seen within the staleness window.
    pub fn candidates(&self, staleness: Duration) -> Vec<Peer> {
        let peers = self.peers.read();
        let now = Instant::now();
        peers
            .values()
            .filter(|p| {
                p.state == HandshakeState::Completed
                    && !p.static_public_key.is_empty()
                    && now.duration_since(p.last_seen) <= staleness
            })
            .cloned()
            .collect()
    }

    pub fn get(&self, id: &str) -> Option<Peer> {
        self.peers.read().get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.peers.read().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.peers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.read().is_empty()
    }

    /// Removes a single peer outright, returning whether it was present.
    pub fn remove(&self, id: &str) -> bool {
        self.peers.write().remove(id).is_some()
    }

    /// Clears every entry — used by `disconnect()`.
    pub fn clear(&self) {
        self.peers.write().clear();
    }
}
