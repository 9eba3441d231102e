//! An active circuit with cover traffic enabled eventually emits a `0xFF`
//! frame addressed to the circuit's first hop.

use std::sync::Arc;
use std::time::Duration;

use taior_core::codec::MAGIC_COVER;
use taior_core::substrate::{LoopbackNetwork, SubstrateEvent};
use taior_core::{Core, CoreConfig};

async fn drain(core: &Core, rx: &mut tokio::sync::mpsc::UnboundedReceiver<SubstrateEvent>) -> bool {
    let mut saw_cover = false;
    while let Ok(event) = rx.try_recv() {
        match event {
            SubstrateEvent::FrameReceived { peer_id, bytes } => {
                if bytes.first() == Some(&MAGIC_COVER) {
                    saw_cover = true;
                }
                core.on_frame(&peer_id, bytes).await;
            }
            SubstrateEvent::PeerUp { peer_id, addr } => core.on_peer_up(&peer_id, &addr).await,
            SubstrateEvent::PeerDown { peer_id } => core.on_peer_down(&peer_id),
        }
    }
    saw_cover
}

#[tokio::test]
async fn cover_traffic_eventually_reaches_the_first_hop() {
    let network = LoopbackNetwork::new();

    let (sub_origin, mut rx_origin) = network.register("origin");
    let (sub_b, mut rx_b) = network.register("b");
    let (sub_c, mut rx_c) = network.register("c");
    let (sub_d, mut rx_d) = network.register("d");

    let mut config = CoreConfig::default();
    config.cover_enabled = false; // enabled explicitly below, once linked
    let origin = Core::init(config, Arc::new(sub_origin)).unwrap();
    let b = Core::init(CoreConfig::default(), Arc::new(sub_b)).unwrap();
    let c = Core::init(CoreConfig::default(), Arc::new(sub_c)).unwrap();
    let d = Core::init(CoreConfig::default(), Arc::new(sub_d)).unwrap();

    for (x, y) in [("origin", "b"), ("origin", "c"), ("origin", "d")] {
        network.link(x, "addr", y, "addr");
    }

    for _round in 0..6 {
        drain(&origin, &mut rx_origin).await;
        drain(&b, &mut rx_b).await;
        drain(&c, &mut rx_c).await;
        drain(&d, &mut rx_d).await;
    }

    // A very high rate so the scheduler's jittered interval resolves to a
    // few milliseconds rather than requiring a multi-second real sleep.
    origin.enable_cover_traffic(true, 2000.0);

    let mut saw_cover = false;
    for _tick in 0..40 {
        tokio::time::sleep(Duration::from_millis(50)).await;
        saw_cover |= drain(&origin, &mut rx_origin).await;
        saw_cover |= drain(&b, &mut rx_b).await;
        saw_cover |= drain(&c, &mut rx_c).await;
        saw_cover |= drain(&d, &mut rx_d).await;
        if saw_cover {
            break;
        }
    }

    assert!(saw_cover, "expected at least one 0xFF cover frame within 2s");

    origin.disconnect();
    b.disconnect();
    c.disconnect();
    d.disconnect();
}

#[tokio::test]
async fn cover_traffic_disabled_by_default_config_emits_nothing_until_enabled() {
    let network = LoopbackNetwork::new();
    let (sub_origin, mut rx_origin) = network.register("origin");
    let (sub_b, mut rx_b) = network.register("b");

    let mut config = CoreConfig::default();
    config.cover_enabled = false;
    let origin = Core::init(config, Arc::new(sub_origin)).unwrap();
    let b = Core::init(CoreConfig::default(), Arc::new(sub_b)).unwrap();

    network.link("origin", "addr", "b", "addr");
    for _round in 0..6 {
        drain(&origin, &mut rx_origin).await;
        drain(&b, &mut rx_b).await;
    }

    let mut saw_cover = false;
    for _tick in 0..10 {
        tokio::time::sleep(Duration::from_millis(50)).await;
        saw_cover |= drain(&origin, &mut rx_origin).await;
        saw_cover |= drain(&b, &mut rx_b).await;
    }
    assert!(!saw_cover, "disabled scheduler must never emit");

    origin.disconnect();
    b.disconnect();
}
