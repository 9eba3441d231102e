//! The forwarding state machine — the heart of the core.
//!
//! Every node is simultaneously originator, intermediate hop, and terminal
//! hop; the `Router` below is symmetric over those three roles. It owns no
//! event loop itself — [`crate::Core`] drives the substrate receive loop and
//! the periodic timers (handshake sweep, circuit refresh, cover scheduler,
//! staleness sweep) and calls into this module's methods.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use x25519_dalek::PublicKey;

use crate::circuit::{Circuit, CircuitBuilder, CircuitMode};
use crate::codec::{self, MAGIC_AORP, MAGIC_COVER, MAGIC_HANDSHAKE};
use crate::config::CoreConfig;
use crate::cover::{CoverConfig, CoverScheduler};
use crate::crypto;
use crate::directory::PeerDirectory;
use crate::error::{CircuitError, CoreError};
use crate::identity::{destination_bytes_for, peer_id_from_static_key, Identity};
use crate::substrate::Substrate;
use crate::timing::{compute_jitter, JitterConfig};

/// Invoked when an inbound AORP packet terminates at this node: the
/// delivered payload, and the literal tag `"anonymous"` — this core never
/// reveals the last-hop substrate id to the callback.
pub type DeliveryCallback = Arc<dyn Fn(Vec<u8>, &str) + Send + Sync>;

/// Per-substrate-connection handshake state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Substrate connection exists; we have not yet sent our own `0xBB`.
    Opened,
    /// We have sent our `0xBB`; the peer's has not yet arrived.
    HandshakeSent,
    /// Both sides have exchanged `0xBB` — usable for onion traffic.
    Handshaked,
}

struct Connection {
    state: ConnectionState,
}

/// Prepends the wire-level onion magic ahead of onion-layer bytes.
fn tag_onion(layer_bytes: Vec<u8>) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + layer_bytes.len());
    out.push(MAGIC_AORP);
    out.extend(layer_bytes);
    out
}

fn import_static_key(raw: &[u8]) -> Option<PublicKey> {
    let bytes: [u8; 32] = raw.try_into().ok()?;
    Some(PublicKey::from(bytes))
}

/// The forwarding state machine.
pub struct Router {
    identity: Arc<Identity>,
    directory: Arc<PeerDirectory>,
    substrate: Arc<dyn Substrate>,
    connections: RwLock<HashMap<String, Connection>>,
    circuit_builder: CircuitBuilder,
    active_circuits: Mutex<HashMap<CircuitMode, Circuit>>,
    cover: Mutex<CoverScheduler>,
    jitter: JitterConfig,
    staleness: Duration,
    handshake_timeout: Duration,
    default_mode: CircuitMode,
    delivery: RwLock<Option<DeliveryCallback>>,
    cancelled: AtomicBool,
}

impl Router {
    pub fn new(
        identity: Arc<Identity>,
        directory: Arc<PeerDirectory>,
        substrate: Arc<dyn Substrate>,
        config: &CoreConfig,
    ) -> Self {
        let circuit_builder = CircuitBuilder::new(
            config.min_hops,
            config.max_hops,
            Duration::from_millis(config.circuit_ttl_ms),
            Duration::from_millis(config.circuit_refresh_ms),
        );
        let cover = CoverScheduler::new(CoverConfig {
            enabled: config.cover_enabled,
            rate_per_second: config.cover_rate,
        });
        Self {
            identity,
            directory,
            substrate,
            connections: RwLock::new(HashMap::new()),
            circuit_builder,
            active_circuits: Mutex::new(HashMap::new()),
            cover: Mutex::new(cover),
            jitter: JitterConfig {
                max_ms: config.jitter_max_ms,
            },
            staleness: Duration::from_millis(config.staleness_ms),
            handshake_timeout: Duration::from_millis(config.handshake_timeout_ms),
            default_mode: config.default_mode,
            delivery: RwLock::new(None),
            cancelled: AtomicBool::new(false),
        }
    }

    /// Checked at every suspension point inside `send` so a concurrent
    /// `disconnect` cancels the call instead of letting it run to completion
    /// against now-cleared state.
    fn check_cancelled(&self) -> Result<(), CoreError> {
        if self.cancelled.load(Ordering::Acquire) {
            Err(CoreError::Cancelled)
        } else {
            Ok(())
        }
    }

    pub fn set_delivery_callback(&self, cb: DeliveryCallback) {
        *self.delivery.write() = Some(cb);
    }

    pub fn set_cover_config(&self, enabled: bool, rate: f64) {
        self.cover.lock().set_config(CoverConfig {
            enabled,
            rate_per_second: rate,
        });
    }

    pub fn default_mode(&self) -> CircuitMode {
        self.default_mode
    }

    // ------------------------------------------------------------------
    // Connection lifecycle
    // ------------------------------------------------------------------

    /// A substrate connection opened to `peer_id`: registers the peer as
    /// `Pending` in the directory and immediately sends our own handshake
    /// frame.
    pub async fn on_peer_up(&self, peer_id: &str, addr: &str) {
        self.directory.insert(peer_id, addr);
        self.connections
            .write()
            .insert(peer_id.to_string(), Connection {
                state: ConnectionState::Opened,
            });
        let frame = codec::build_handshake_frame(&self.identity.public_key_bytes());
        match self.substrate.send_frame(peer_id, frame).await {
            Ok(()) => {
                if let Some(conn) = self.connections.write().get_mut(peer_id) {
                    conn.state = ConnectionState::HandshakeSent;
                }
                tracing::debug!(peer_id, "handshake frame sent");
            }
            Err(error) => tracing::warn!(peer_id, %error, "failed to send handshake frame"),
        }
    }

    /// Substrate connection lost: drop the connection record, evict the
    /// peer from the directory, and tear down any circuit that referenced
    /// it.
    pub fn on_peer_down(&self, peer_id: &str) {
        self.connections.write().remove(peer_id);
        self.directory.remove(peer_id);
        self.purge_circuits_referencing(peer_id);
    }

    fn purge_circuits_referencing(&self, peer_id: &str) {
        self.active_circuits
            .lock()
            .retain(|_, circuit| !circuit.hops.iter().any(|p| p.id == peer_id));
    }

    fn connection_state(&self, peer_id: &str) -> Option<ConnectionState> {
        self.connections.read().get(peer_id).map(|c| c.state)
    }

    // ------------------------------------------------------------------
    // Periodic maintenance — called by the Core event loop's timer ticks
    // ------------------------------------------------------------------

    /// Evicts peers `Pending` longer than `handshake_timeout_ms` and tears
    /// down any circuit that referenced them.
    pub fn sweep_handshake_timeouts(&self) {
        for id in self.directory.evict_handshake_timeouts(self.handshake_timeout) {
            tracing::info!(peer_id = %id, "handshake timed out, peer evicted");
            self.connections.write().remove(&id);
            self.purge_circuits_referencing(&id);
        }
    }

    /// Evicts peers unseen for longer than `staleness_ms` and tears down
    /// any circuit that referenced them.
    pub fn sweep_stale_peers(&self) {
        for id in self.directory.evict_stale(self.staleness) {
            tracing::info!(peer_id = %id, "peer stale, evicted");
            self.connections.write().remove(&id);
            self.purge_circuits_referencing(&id);
        }
    }

    /// Expires circuits past TTL. Replacement is lazy: the next `send` or
    /// cover tick rebuilds on demand, so an old circuit is only dropped here,
    /// never proactively replaced ahead of demand — "torn down only after
    /// the new one is usable" is satisfied by construction, since
    /// `acquire_circuit` never removes the cached entry until a fresh one
    /// has successfully replaced it.
    pub fn expire_circuits(&self) {
        let now = Instant::now();
        let mut circuits = self.active_circuits.lock();
        circuits.retain(|mode, circuit| {
            let keep = !circuit.is_expired(now);
            if !keep {
                tracing::info!(circuit_id = %circuit.id, ?mode, "circuit expired");
            }
            keep
        });
    }

    // ------------------------------------------------------------------
    // Inbound dispatch
    // ------------------------------------------------------------------

    pub async fn on_frame(&self, peer_id: &str, bytes: Vec<u8>) {
        if bytes.is_empty() {
            tracing::warn!(peer_id, "dropped empty frame");
            return;
        }
        match bytes[0] {
            MAGIC_HANDSHAKE => self.handle_handshake(peer_id, &bytes[1..]).await,
            MAGIC_COVER => {
                self.directory.touch(peer_id);
                tracing::debug!(peer_id, "dropped cover frame");
            }
            MAGIC_AORP => self.handle_onion(peer_id, &bytes[1..]).await,
            other => tracing::warn!(peer_id, magic = other, "dropped frame with unrecognized magic"),
        }
    }

    async fn handle_handshake(&self, peer_id: &str, static_pub: &[u8]) {
        match self.directory.complete_handshake(peer_id, static_pub) {
            Ok(()) => {
                if let Some(conn) = self.connections.write().get_mut(peer_id) {
                    conn.state = ConnectionState::Handshaked;
                }
                tracing::info!(peer_id, "handshake completed");
            }
            Err(error) => {
                tracing::warn!(peer_id, %error, "handshake rejected, marking peer failed");
                self.directory.mark_failed(peer_id);
            }
        }
    }

    async fn handle_onion(&self, peer_id: &str, layer: &[u8]) {
        self.directory.touch(peer_id);

        let plaintext = match crypto::decrypt_layer(layer, self.identity.secret()) {
            Ok(plaintext) => plaintext,
            Err(error) => {
                tracing::debug!(peer_id, %error, "layer decrypt failed, dropping");
                return;
            }
        };

        let our_destination = destination_bytes_for(&self.identity.peer_id());
        if let Ok(frame) = codec::parse_aorp(&plaintext) {
            if frame.destination == our_destination {
                tracing::debug!(peer_id, "delivering inbound payload");
                self.deliver(frame.payload);
                return;
            }
        }

        match codec::strip_next_hop(&plaintext) {
            Ok((next_hop, inner)) if !next_hop.is_empty() => {
                let next_hop = String::from_utf8_lossy(&next_hop).into_owned();
                self.forward(&next_hop, inner).await;
            }
            _ => tracing::debug!(peer_id, "peeled layer is neither for us nor forwardable, dropping"),
        }
    }

    fn deliver(&self, payload: Vec<u8>) {
        if let Some(cb) = self.delivery.read().as_ref() {
            cb(payload, "anonymous");
        }
    }

    /// Forwards onward ciphertext byte-identical to what was peeled — never
    /// re-encrypted, never modified.
    async fn forward(&self, next_hop: &str, onward_ciphertext: Vec<u8>) {
        self.jitter_sleep().await;
        let wire = tag_onion(onward_ciphertext);
        if let Err(error) = self.substrate.send_frame(next_hop, wire).await {
            tracing::debug!(next_hop, %error, "forward failed, dropping");
        }
    }

    async fn jitter_sleep(&self) {
        let delay = compute_jitter(self.jitter);
        if delay > Duration::ZERO {
            tokio::time::sleep(delay).await;
        }
    }

    // ------------------------------------------------------------------
    // Origination
    // ------------------------------------------------------------------

    /// `send(payload, mode)`. Returns the exact bytes handed to the
    /// substrate, for logging/diagnostic use only.
    pub async fn send(&self, payload: &[u8], mode: CircuitMode) -> Result<Vec<u8>, CoreError> {
        self.check_cancelled()?;
        let circuit = self.acquire_circuit(mode).await?;
        self.check_cancelled()?;

        // The destination must be derived from the terminal hop's own public
        // key, not the directory label we happen to know it by — that label
        // is a substrate-local routing address with no relationship to what
        // the hop computes for its own `identity.peer_id()`.
        let destination_peer_id = peer_id_from_static_key(&circuit.last_hop().static_public_key);
        let destination = destination_bytes_for(&destination_peer_id);
        let has_next = circuit.hop_count() > 1;
        let aorp = codec::build_aorp(payload, &destination, has_next)
            .map_err(|error| CoreError::SendFailed(error.to_string()))?;

        let wire = self
            .wrap_onion(&circuit, aorp)
            .map_err(CoreError::SendFailed)?;

        self.jitter_sleep().await;
        self.check_cancelled()?;
        self.substrate
            .send_frame(&circuit.hops[0].id, wire.clone())
            .await
            .map_err(|error| CoreError::SendFailed(error.to_string()))?;

        Ok(wire)
    }

    /// Wraps `inner` through every hop of `circuit`, innermost (destination)
    /// first, prepending the forward-pointing next-hop field at every layer
    /// above the innermost: the cleartext produced by peeling a layer above
    /// the innermost begins with a 32-byte next-hop peer id.
    fn wrap_onion(&self, circuit: &Circuit, inner: Vec<u8>) -> Result<Vec<u8>, String> {
        let hops = &circuit.hops;
        let n = hops.len();
        let mut buf = inner;
        for i in (0..n).rev() {
            if i + 1 < n {
                buf = codec::wrap_next_hop(hops[i + 1].id.as_bytes(), &buf);
            }
            let pub_key = import_static_key(&hops[i].static_public_key)
                .ok_or_else(|| format!("hop {} has no usable static public key", hops[i].id))?;
            buf = crypto::encrypt_layer(&buf, &pub_key);
        }
        Ok(tag_onion(buf))
    }

    /// Returns the cached active circuit for `mode`, building one if none is
    /// fresh. One synchronous build attempt is allowed; since candidate
    /// availability can legitimately lag a just-completed handshake by a few
    /// milliseconds, that attempt polls for up to `handshake_timeout_ms`
    /// rather than failing on the first insufficient-candidates result —
    /// still a single bounded call, never a background retry loop outliving
    /// this `send`.
    async fn acquire_circuit(&self, mode: CircuitMode) -> Result<Circuit, CoreError> {
        if let Some(circuit) = self.active_circuits.lock().get(&mode) {
            if !circuit.is_expired(Instant::now()) {
                return Ok(circuit.clone());
            }
        }

        let deadline = Instant::now() + self.handshake_timeout;
        loop {
            self.check_cancelled()?;
            let candidates = self.directory.candidates(self.staleness);
            match self.circuit_builder.build_circuit(mode, &candidates) {
                Ok(circuit) => {
                    tracing::info!(circuit_id = %circuit.id, hops = circuit.hop_count(), ?mode, "circuit built");
                    self.active_circuits.lock().insert(mode, circuit.clone());
                    return Ok(circuit);
                }
                Err(CircuitError::BelowMinimumHops { .. }) => {
                    return Err(CoreError::InsufficientAnonymity)
                }
                Err(CircuitError::InsufficientPeers { .. }) if Instant::now() < deadline => {
                    tokio::time::sleep(Duration::from_millis(25)).await;
                }
                Err(_) => return Err(CoreError::NoCircuit),
            }
        }
    }

    // ------------------------------------------------------------------
    // Cover traffic
    // ------------------------------------------------------------------

    /// Called by the Core's periodic timer tick. If the scheduler decides
    /// it's time, addresses a fresh `0xFF` frame to the active circuit's
    /// first hop — reusing circuit selection for routing only; the cover
    /// frame itself is a standalone wire frame and is never onion-wrapped,
    /// so a receiving hop can classify and drop it without attempting a
    /// decrypt (see DESIGN.md for why this reading was chosen over
    /// layer-wrapping the cover body).
    pub async fn tick_cover(&self) {
        let maybe_frame = self.cover.lock().poll(Instant::now());
        let Some(frame) = maybe_frame else {
            return;
        };

        let mode = self.default_mode;
        let circuit = match self.acquire_circuit(mode).await {
            Ok(circuit) => circuit,
            Err(error) => {
                tracing::debug!(%error, "cover tick skipped: no circuit available");
                return;
            }
        };

        self.jitter_sleep().await;
        if let Err(error) = self
            .substrate
            .send_frame(&circuit.hops[0].id, frame)
            .await
        {
            tracing::debug!(%error, "cover frame send failed, suppressed");
        }
    }

    // ------------------------------------------------------------------
    // Test-only introspection (feature `test-utils`)
    // ------------------------------------------------------------------

    #[cfg(any(test, feature = "test-utils"))]
    pub fn peer_count(&self) -> usize {
        self.directory.len()
    }

    #[cfg(any(test, feature = "test-utils"))]
    pub fn peer_state(&self, peer_id: &str) -> Option<crate::directory::HandshakeState> {
        self.directory.get(peer_id).map(|p| p.state)
    }

    // ------------------------------------------------------------------
    // Teardown
    // ------------------------------------------------------------------

    /// Zeroizes nothing itself (the `Identity`'s `Drop` handles its secret)
    /// but drops every piece of mutable state this router holds, and cancels
    /// any `send` call still in flight at one of its `check_cancelled` points
    /// rather than letting it run to completion against now-cleared state.
    pub fn disconnect(&self) {
        self.cancelled.store(true, Ordering::Release);
        self.connections.write().clear();
        self.active_circuits.lock().clear();
        self.directory.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::substrate::LoopbackNetwork;

    fn test_config() -> CoreConfig {
        CoreConfig {
            handshake_timeout_ms: 50,
            staleness_ms: 60_000,
            ..CoreConfig::default()
        }
    }

    async fn handshake_pair(
        network: &LoopbackNetwork,
        a: &Router,
        a_rx: &mut tokio::sync::mpsc::UnboundedReceiver<crate::substrate::SubstrateEvent>,
        b: &Router,
        b_rx: &mut tokio::sync::mpsc::UnboundedReceiver<crate::substrate::SubstrateEvent>,
    ) {
        network.link("a", "addr-a", "b", "addr-b");
        a.on_peer_up("b", "addr-b").await;
        b.on_peer_up("a", "addr-a").await;

        // Drain PeerUp events, then deliver each side's 0xBB to the other.
        while let Ok(event) = a_rx.try_recv() {
            if let crate::substrate::SubstrateEvent::FrameReceived { peer_id, bytes } = event {
                b.on_frame(&peer_id, bytes).await;
            }
        }
        while let Ok(event) = b_rx.try_recv() {
            if let crate::substrate::SubstrateEvent::FrameReceived { peer_id, bytes } = event {
                a.on_frame(&peer_id, bytes).await;
            }
        }
    }

    #[tokio::test]
    async fn handshake_completes_both_directions() {
        let network = LoopbackNetwork::new();
        let (sub_a, mut rx_a) = network.register("a");
        let (sub_b, mut rx_b) = network.register("b");

        let id_a = Arc::new(Identity::generate());
        let id_b = Arc::new(Identity::generate());
        let dir_a = Arc::new(PeerDirectory::new());
        let dir_b = Arc::new(PeerDirectory::new());
        let router_a = Router::new(id_a, dir_a.clone(), Arc::new(sub_a), &test_config());
        let router_b = Router::new(id_b, dir_b.clone(), Arc::new(sub_b), &test_config());

        handshake_pair(&network, &router_a, &mut rx_a, &router_b, &mut rx_b).await;

        assert_eq!(
            dir_a.get("b").unwrap().state,
            crate::directory::HandshakeState::Completed
        );
        assert_eq!(
            dir_b.get("a").unwrap().state,
            crate::directory::HandshakeState::Completed
        );
    }

    #[tokio::test]
    async fn send_without_enough_peers_is_insufficient_anonymity() {
        let network = LoopbackNetwork::new();
        let (sub_a, _rx_a) = network.register("a");
        let id_a = Arc::new(Identity::generate());
        let dir_a = Arc::new(PeerDirectory::new());
        let router_a = Router::new(id_a, dir_a, Arc::new(sub_a), &test_config());

        let err = router_a.send(b"hi", CircuitMode::Fast).await.unwrap_err();
        assert_eq!(err, CoreError::InsufficientAnonymity);
    }

    #[tokio::test]
    async fn disconnect_cancels_a_send_blocked_waiting_for_candidates() {
        let network = LoopbackNetwork::new();
        let (sub_a, _rx_a) = network.register("a");
        let id_a = Arc::new(Identity::generate());
        let dir_a = Arc::new(PeerDirectory::new());
        let mut config = test_config();
        config.handshake_timeout_ms = 5_000;
        let router_a = Arc::new(Router::new(id_a, dir_a, Arc::new(sub_a), &config));

        let sender = {
            let router_a = router_a.clone();
            tokio::spawn(async move { router_a.send(b"hi", CircuitMode::Adaptive).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        router_a.disconnect();

        let result = sender.await.unwrap();
        assert_eq!(result.unwrap_err(), CoreError::Cancelled);
    }

    #[tokio::test]
    async fn send_with_no_candidates_times_out_to_no_circuit() {
        let network = LoopbackNetwork::new();
        let (sub_a, _rx_a) = network.register("a");
        let id_a = Arc::new(Identity::generate());
        let dir_a = Arc::new(PeerDirectory::new());
        let router_a = Router::new(id_a, dir_a, Arc::new(sub_a), &test_config());

        let err = router_a
            .send(b"hi", CircuitMode::Adaptive)
            .await
            .unwrap_err();
        assert_eq!(err, CoreError::NoCircuit);
    }

    /// Builds a directory-shaped `Peer` for `id` carrying `identity`'s real
    /// static public key, so a hand-built `Circuit` can be peeled by the
    /// router that actually owns the matching secret.
    fn fake_hop(id: &str, identity: &Identity) -> crate::directory::Peer {
        let dir = PeerDirectory::new();
        dir.insert(id, "addr");
        dir.complete_handshake(id, &identity.public_key_bytes()).unwrap();
        dir.get(id).unwrap()
    }

    #[tokio::test]
    async fn full_three_hop_round_trip_delivers_and_forwards_untouched() {
        let network = LoopbackNetwork::new();

        let identity_b = Identity::generate();
        let identity_c = Identity::generate();
        let identity_d = Identity::generate();
        let hop_b = fake_hop("b", &identity_b);
        let hop_c = fake_hop("c", &identity_c);
        let hop_d = fake_hop("d", &identity_d);

        let (sub_b, mut rx_b) = network.register("b");
        let (sub_c, mut rx_c) = network.register("c");
        let (sub_d, mut rx_d) = network.register("d");
        let router_b = Router::new(
            Arc::new(identity_b),
            Arc::new(PeerDirectory::new()),
            Arc::new(sub_b),
            &test_config(),
        );
        let router_c = Router::new(
            Arc::new(identity_c),
            Arc::new(PeerDirectory::new()),
            Arc::new(sub_c),
            &test_config(),
        );
        let router_d = Router::new(
            Arc::new(identity_d),
            Arc::new(PeerDirectory::new()),
            Arc::new(sub_d),
            &test_config(),
        );

        let delivered: Arc<Mutex<Option<(Vec<u8>, String)>>> = Arc::new(Mutex::new(None));
        let delivered_clone = delivered.clone();
        router_d.set_delivery_callback(Arc::new(move |payload, tag: &str| {
            *delivered_clone.lock() = Some((payload, tag.to_string()));
        }));

        let circuit = Circuit {
            id: crate::circuit::CircuitId::random(),
            mode: CircuitMode::Adaptive,
            hops: vec![hop_b, hop_c, hop_d],
            created_at: Instant::now(),
            ttl: Duration::from_secs(600),
            refresh_deadline: Instant::now() + Duration::from_secs(300),
        };

        // Destination must be derived from d's real public key, not the
        // directory label "d" it happens to be registered under here.
        let dest = destination_bytes_for(&peer_id_from_static_key(
            &circuit.last_hop().static_public_key,
        ));
        let aorp = codec::build_aorp(b"hello", &dest, true).unwrap();

        // `a`'s view of the circuit is only used to compute the wire bytes;
        // it needs no live router of its own.
        let (sub_a, _rx_a) = network.register("a");
        let dir_a = PeerDirectory::new();
        let router_a = Router::new(Arc::new(Identity::generate()), Arc::new(dir_a), Arc::new(sub_a), &test_config());
        let wire = router_a.wrap_onion(&circuit, aorp).unwrap();
        router_a.substrate.send_frame("b", wire).await.unwrap();

        for _round in 0..4 {
            while let Ok(event) = rx_b.try_recv() {
                if let crate::substrate::SubstrateEvent::FrameReceived { peer_id, bytes } = event {
                    router_b.on_frame(&peer_id, bytes).await;
                }
            }
            while let Ok(event) = rx_c.try_recv() {
                if let crate::substrate::SubstrateEvent::FrameReceived { peer_id, bytes } = event {
                    router_c.on_frame(&peer_id, bytes).await;
                }
            }
            while let Ok(event) = rx_d.try_recv() {
                if let crate::substrate::SubstrateEvent::FrameReceived { peer_id, bytes } = event {
                    router_d.on_frame(&peer_id, bytes).await;
                }
            }
        }

        let (payload, tag) = delivered.lock().clone().expect("d should have delivered");
        assert_eq!(payload, b"hello");
        assert_eq!(tag, "anonymous");
    }
}
