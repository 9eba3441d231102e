//! Two directly connected nodes complete a handshake and become eligible
//! circuit candidates for each other.

use std::sync::Arc;

use taior_core::directory::HandshakeState;
use taior_core::substrate::{LoopbackNetwork, SubstrateEvent};
use taior_core::{Core, CoreConfig};

async fn pump(core: &Core, rx: &mut tokio::sync::mpsc::UnboundedReceiver<SubstrateEvent>) {
    while let Ok(event) = rx.try_recv() {
        match event {
            SubstrateEvent::FrameReceived { peer_id, bytes } => core.on_frame(&peer_id, bytes).await,
            SubstrateEvent::PeerUp { peer_id, addr } => core.on_peer_up(&peer_id, &addr).await,
            SubstrateEvent::PeerDown { peer_id } => core.on_peer_down(&peer_id),
        }
    }
}

#[tokio::test]
async fn handshake_completes_in_both_directions() {
    let network = LoopbackNetwork::new();
    let (sub_a, mut rx_a) = network.register("a");
    let (sub_b, mut rx_b) = network.register("b");

    let core_a = Core::init(CoreConfig::default(), Arc::new(sub_a)).unwrap();
    let core_b = Core::init(CoreConfig::default(), Arc::new(sub_b)).unwrap();

    network.link("a", "addr-a", "b", "addr-b");

    // Drive the rendezvous PeerUp events, then ping-pong the 0xBB frames
    // each side's on_peer_up already queued for the other.
    for _round in 0..4 {
        pump(&core_a, &mut rx_a).await;
        pump(&core_b, &mut rx_b).await;
    }

    assert_eq!(core_a.peer_state("b"), Some(HandshakeState::Completed));
    assert_eq!(core_b.peer_state("a"), Some(HandshakeState::Completed));

    core_a.disconnect();
    core_b.disconnect();
}

#[tokio::test]
async fn handshake_rejects_a_key_that_is_too_short() {
    let network = LoopbackNetwork::new();
    let (sub_a, mut rx_a) = network.register("a");
    let core_a = Core::init(CoreConfig::default(), Arc::new(sub_a)).unwrap();

    core_a.on_peer_up("ghost", "addr").await;
    pump(&core_a, &mut rx_a).await;

    // A malformed handshake frame (magic byte only, no usable key bytes)
    // must be rejected rather than silently accepted.
    core_a.on_frame("ghost", vec![0xBB]).await;
    assert_eq!(core_a.peer_state("ghost"), Some(HandshakeState::Failed));

    core_a.disconnect();
}

#[tokio::test]
async fn unconnected_peer_yields_no_handshake_state() {
    let network = LoopbackNetwork::new();
    let (sub_a, _rx_a) = network.register("a");
    let core_a = Core::init(CoreConfig::default(), Arc::new(sub_a)).unwrap();
    assert_eq!(core_a.peer_state("stranger"), None);
    core_a.disconnect();
}
