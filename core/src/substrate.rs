//! Substrate boundary: dynamic dispatch over transports collapsed into a
//! minimal interface.
//!
//! The concrete bidirectional datagram substrate and the rendezvous
//! mechanism by which peers learn each other's addresses are external
//! collaborators — this module only defines the trait boundary plus one
//! in-memory [`LoopbackSubstrate`] that exists purely so this crate's own
//! tests and CLI demo can drive two or more nodes against each other
//! without a real network stack.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubstrateError {
    #[error("peer {0} has no open substrate connection")]
    PeerUnreachable(String),

    #[error("frame exceeds the 65535-byte substrate limit")]
    FrameTooLarge,
}

/// Events the substrate delivers upward into a `Core`'s event loop.
#[derive(Debug, Clone)]
pub enum SubstrateEvent {
    FrameReceived { peer_id: String, bytes: Vec<u8> },
    PeerUp { peer_id: String, addr: String },
    PeerDown { peer_id: String },
}

pub const MAX_FRAME_SIZE: usize = 65_535;

/// Downward interface a `Core` depends on to exchange opaque byte frames
/// with directly connected peers.
#[async_trait]
pub trait Substrate: Send + Sync {
    async fn send_frame(&self, peer_id: &str, bytes: Vec<u8>) -> Result<(), SubstrateError>;
}

/// Shared registry backing an in-process mesh of [`LoopbackSubstrate`]
/// handles — one per simulated node — used by integration tests and the CLI
/// demo binary.
#[derive(Clone, Default)]
pub struct LoopbackNetwork {
    inboxes: Arc<RwLock<HashMap<String, mpsc::UnboundedSender<SubstrateEvent>>>>,
}

impl LoopbackNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new node under `id`, returning its substrate handle (for
    /// sending) and inbox receiver (for the router to poll).
    pub fn register(&self, id: impl Into<String>) -> (LoopbackSubstrate, mpsc::UnboundedReceiver<SubstrateEvent>) {
        let id = id.into();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inboxes.write().insert(id.clone(), tx);
        (
            LoopbackSubstrate {
                self_id: id,
                network: self.clone(),
            },
            rx,
        )
    }

    /// Simulates out-of-band rendezvous: tells each side about the other's
    /// presence so the handshake state machine can begin.
    pub fn link(&self, a_id: &str, a_addr: &str, b_id: &str, b_addr: &str) {
        let inboxes = self.inboxes.read();
        if let Some(tx) = inboxes.get(a_id) {
            let _ = tx.send(SubstrateEvent::PeerUp {
                peer_id: b_id.to_string(),
                addr: b_addr.to_string(),
            });
        }
        if let Some(tx) = inboxes.get(b_id) {
            let _ = tx.send(SubstrateEvent::PeerUp {
                peer_id: a_id.to_string(),
                addr: a_addr.to_string(),
            });
        }
    }

    pub fn unregister(&self, id: &str) {
        self.inboxes.write().remove(id);
    }
}

/// One node's view of the in-memory mesh.
pub struct LoopbackSubstrate {
    self_id: String,
    network: LoopbackNetwork,
}

#[async_trait]
impl Substrate for LoopbackSubstrate {
    async fn send_frame(&self, peer_id: &str, bytes: Vec<u8>) -> Result<(), SubstrateError> {
        if bytes.len() > MAX_FRAME_SIZE {
            return Err(SubstrateError::FrameTooLarge);
        }
        let inboxes = self.network.inboxes.read();
        let tx = inboxes
            .get(peer_id)
            .ok_or_else(|| SubstrateError::PeerUnreachable(peer_id.to_string()))?;
        tx.send(SubstrateEvent::FrameReceived {
            peer_id: self.self_id.clone(),
            bytes,
        })
        .map_err(|_| SubstrateError::PeerUnreachable(peer_id.to_string()))
    }
}
