//! Loopback demo for the onion-routed messaging core.
//!
//! Spins up an origin node plus a handful of relay nodes over in-process
//! loopback substrates, links them into a star-plus-mesh topology, drives
//! their handshakes to completion, sends one message through a circuit, and
//! prints the delivered payload once it reaches its destination.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use taior_core::substrate::{LoopbackNetwork, SubstrateEvent};
use taior_core::{CircuitMode, Core, CoreConfig};

#[derive(Parser)]
#[command(name = "taior-demo")]
#[command(about = "Demo: send one message through an onion-routed circuit over loopback")]
struct Cli {
    /// Number of relay nodes to spin up (also the circuit's candidate pool size)
    #[arg(short, long, default_value_t = 5)]
    relays: usize,

    /// Circuit mode to route the demo message through
    #[arg(short, long, value_enum, default_value_t = Mode::Adaptive)]
    mode: Mode,

    /// Message to send
    #[arg(short, long, default_value = "hello from the other side")]
    message: String,
}

#[derive(Clone, Copy, ValueEnum)]
enum Mode {
    Fast,
    Adaptive,
    Mix,
}

impl From<Mode> for CircuitMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Fast => CircuitMode::Fast,
            Mode::Adaptive => CircuitMode::Adaptive,
            Mode::Mix => CircuitMode::Mix,
        }
    }
}

/// One demo node plus the receiver half of its loopback inbox.
struct Node {
    name: String,
    core: Core,
    rx: tokio::sync::mpsc::UnboundedReceiver<SubstrateEvent>,
}

/// Pumps every pending substrate event for a node into its `Core`.
async fn pump(node: &mut Node) {
    while let Ok(event) = node.rx.try_recv() {
        match event {
            SubstrateEvent::FrameReceived { peer_id, bytes } => {
                node.core.on_frame(&peer_id, bytes).await
            }
            SubstrateEvent::PeerUp { peer_id, addr } => node.core.on_peer_up(&peer_id, &addr).await,
            SubstrateEvent::PeerDown { peer_id } => node.core.on_peer_down(&peer_id),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    println!("Building a {}-relay loopback network...", cli.relays);
    let network = LoopbackNetwork::new();

    let config = CoreConfig::default();
    let (origin_sub, origin_rx) = network.register("origin");
    let mut origin = Node {
        name: "origin".to_string(),
        core: Core::init(config.clone(), Arc::new(origin_sub))
            .map_err(anyhow::Error::msg)
            .context("failed to initialize origin node")?,
        rx: origin_rx,
    };
    println!("  origin address: {}", origin.core.address());

    let mut relays = Vec::new();
    for i in 0..cli.relays {
        let name = format!("relay-{i}");
        let (sub, rx) = network.register(name.clone());
        let core = Core::init(config.clone(), Arc::new(sub))
            .map_err(anyhow::Error::msg)
            .with_context(|| format!("failed to initialize {name}"))?;
        println!("  {name} address: {}", core.address());
        relays.push(Node { name, core, rx });
    }

    for relay in &relays {
        network.link("origin", "loopback://origin", &relay.name, "loopback://relay");
    }
    for i in 0..relays.len() {
        for j in (i + 1)..relays.len() {
            let (a, b) = (relays[i].name.clone(), relays[j].name.clone());
            network.link(&a, "loopback://relay", &b, "loopback://relay");
        }
    }

    println!("Completing handshakes...");
    for _round in 0..6 {
        pump(&mut origin).await;
        for relay in &mut relays {
            pump(relay).await;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    for relay in &relays {
        relay.core.on_delivery(Arc::new(|payload, tag| {
            println!("  [{tag}] delivered: {:?}", String::from_utf8_lossy(&payload));
        }));
    }

    let mode_name = match cli.mode {
        Mode::Fast => "fast",
        Mode::Adaptive => "adaptive",
        Mode::Mix => "mix",
    };
    println!("Sending message through a {mode_name}-mode circuit: {:?}", cli.message);

    let send_result = origin.core.send(cli.message.as_bytes(), cli.mode.into()).await;
    match send_result {
        Ok(wire_bytes) => println!("  sent {} wire bytes to the first hop", wire_bytes.len()),
        Err(e) => {
            println!("  send failed: {e}");
            return Ok(());
        }
    }

    for _round in 0..20 {
        pump(&mut origin).await;
        for relay in &mut relays {
            pump(relay).await;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }

    println!("Done.");
    origin.core.disconnect();
    for relay in &relays {
        relay.core.disconnect();
    }
    Ok(())
}
