//! taior-core — an anonymous onion-routing overlay for small, room-scoped
//! messaging.
//!
//! [`Core`] is the single entry point: it owns a session identity, a peer
//! directory, and the forwarding state machine ([`router::Router`]), and
//! drives their periodic maintenance (handshake timeouts, peer staleness,
//! circuit expiry, cover-traffic emission) on a background task. Everything
//! below the substrate boundary — real network transports, peer discovery,
//! rendezvous — is a caller concern; this crate only defines the
//! [`substrate::Substrate`] trait those pieces implement.

pub mod circuit;
pub mod codec;
pub mod config;
pub mod cover;
pub mod crypto;
pub mod directory;
pub mod error;
pub mod identity;
pub mod router;
pub mod substrate;
pub mod timing;

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

pub use circuit::CircuitMode;
pub use config::CoreConfig;
pub use error::CoreError;
pub use identity::Identity;
pub use router::DeliveryCallback;
pub use substrate::Substrate;

use directory::PeerDirectory;
use router::Router;

/// Initializes global tracing exactly once per process (idempotent, safe to
/// call from every `Core::init`).
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init();
}

/// The library's single entry point.
///
/// A fresh session identity is generated on every `init` — nothing persists
/// across restarts; an identity exists only for the lifetime of one running
/// process.
pub struct Core {
    identity: Arc<Identity>,
    router: Arc<Router>,
    maintenance: Mutex<Option<JoinHandle<()>>>,
}

impl Core {
    /// Generates a fresh identity, validates `config`, and starts the
    /// background maintenance task against `substrate`.
    pub fn init(config: CoreConfig, substrate: Arc<dyn Substrate>) -> Result<Self, String> {
        config.validate()?;
        init_tracing();

        let identity = Arc::new(Identity::generate());
        let directory = Arc::new(PeerDirectory::new());
        let router = Arc::new(Router::new(
            identity.clone(),
            directory,
            substrate,
            &config,
        ));

        let maintenance = spawn_maintenance(router.clone());

        tracing::info!(address = identity.address(), "core initialized");

        Ok(Self {
            identity,
            router,
            maintenance: Mutex::new(Some(maintenance)),
        })
    }

    /// This session's address token, opaque and safe to share out of band.
    pub fn address(&self) -> &str {
        self.identity.address()
    }

    /// This session's peer id, the identifier a directly connected peer
    /// should use to refer to this node (e.g. as a destination or next hop).
    pub fn peer_id(&self) -> String {
        self.identity.peer_id()
    }

    /// Registers the callback invoked whenever an onion packet addressed to
    /// this node is fully peeled. The callback receives the delivered
    /// payload and always the literal tag `"anonymous"` — this core never
    /// attributes a delivered message to a last-hop peer id.
    pub fn on_delivery(&self, callback: DeliveryCallback) {
        self.router.set_delivery_callback(callback);
    }

    /// Enables or disables the cover-traffic scheduler and sets its target
    /// rate in packets per second.
    pub fn enable_cover_traffic(&self, enabled: bool, rate_per_second: f64) {
        self.router.set_cover_config(enabled, rate_per_second);
    }

    /// Sends `payload` through a circuit of the given mode, building or
    /// reusing one as needed. Returns the exact bytes handed to the
    /// substrate for the first hop (diagnostic use only).
    pub async fn send(&self, payload: &[u8], mode: CircuitMode) -> Result<Vec<u8>, CoreError> {
        self.router.send(payload, mode).await
    }

    /// Convenience wrapper over [`Core::send`] using the configured default
    /// mode.
    pub async fn send_default(&self, payload: &[u8]) -> Result<Vec<u8>, CoreError> {
        let mode = self.router.default_mode();
        self.router.send(payload, mode).await
    }

    /// Notifies the router that a substrate connection to `peer_id` opened
    /// at `addr`. Registers the peer and sends our own handshake frame.
    pub async fn on_peer_up(&self, peer_id: &str, addr: &str) {
        self.router.on_peer_up(peer_id, addr).await;
    }

    /// Notifies the router that a substrate connection to `peer_id` closed.
    pub fn on_peer_down(&self, peer_id: &str) {
        self.router.on_peer_down(peer_id);
    }

    /// Hands an inbound substrate frame from `peer_id` to the router for
    /// classification and processing.
    pub async fn on_frame(&self, peer_id: &str, bytes: Vec<u8>) {
        self.router.on_frame(peer_id, bytes).await;
    }

    /// Number of peers currently tracked (any handshake state). Exposed only
    /// for test/diagnostic builds.
    #[cfg(any(test, feature = "test-utils"))]
    pub fn peer_count(&self) -> usize {
        self.router.peer_count()
    }

    /// Current handshake state of `peer_id`, if known. Exposed only for
    /// test/diagnostic builds.
    #[cfg(any(test, feature = "test-utils"))]
    pub fn peer_state(&self, peer_id: &str) -> Option<directory::HandshakeState> {
        self.router.peer_state(peer_id)
    }

    /// Stops the maintenance task and clears all router state. A `Core`
    /// instance is not reusable after this call.
    pub fn disconnect(&self) {
        if let Some(handle) = self.maintenance.lock().take() {
            handle.abort();
        }
        self.router.disconnect();
    }
}

impl Drop for Core {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// Spawns the single background task that drives every one of the router's
/// periodic duties (handshake sweep, staleness sweep, circuit expiry, cover
/// tick) as one `tokio::select!` loop over independent timers rather than
/// four separate tasks.
fn spawn_maintenance(router: Arc<Router>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut handshake_tick = tokio::time::interval(Duration::from_secs(1));
        let mut staleness_tick = tokio::time::interval(Duration::from_secs(5));
        let mut circuit_tick = tokio::time::interval(Duration::from_secs(5));
        let mut cover_tick = tokio::time::interval(cover::SCHEDULER_TICK);

        loop {
            tokio::select! {
                _ = handshake_tick.tick() => router.sweep_handshake_timeouts(),
                _ = staleness_tick.tick() => router.sweep_stale_peers(),
                _ = circuit_tick.tick() => router.expire_circuits(),
                _ = cover_tick.tick() => router.tick_cover().await,
            }
        }
    })
}
