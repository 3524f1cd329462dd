//! # Rollcast Node Runtime
//!
//! Runs a local Rollcast session: several peer nodes over an in-memory swarm,
//! each playing scripted input into one shared channel and simulating it.
//!
//! ## Startup Sequence
//!
//! 1. Initialize telemetry (logging + metrics)
//! 2. Load configuration (defaults, TOML file, environment), validate
//! 3. Assemble `peers` nodes on a fully connected swarm
//! 4. Node 0 creates the channel; every other node joins it
//! 5. Node 0 sets the channel's peer set to all nodes
//! 6. Run for `session_secs` or until Ctrl+C, logging state hashes
//! 7. Shut every node down
//!
//! ## Configuration
//!
//! | Source | Example |
//! |--------|---------|
//! | `--config <path>` / `ROLLCAST_CONFIG` | TOML with `[session]`, `[simulation]`, ... |
//! | `ROLLCAST_PEERS` | `4` |
//! | `ROLLCAST_RATE_MS` | `50` (simulation and sequencer) |
//! | `ROLLCAST_SESSION_SECS` | `30` |
//! | `ROLLCAST_CHANNEL_NAME` | `arena` |

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use node_runtime::adapters::ScriptedInput;
use node_runtime::{PeerNode, RuntimeConfig};
use rollcast_telemetry::{init_telemetry, MetricsHandle, TelemetryConfig};
use rc_06_sequencer::InputSource;
use shared_bus::InMemorySwarm;
use shared_crypto::KeyPair;
use shared_types::{ChannelId, PeerId, SystemTimeSource, TimeSource};

/// A local multi-peer session.
pub struct SessionRuntime {
    config: RuntimeConfig,
    /// Kept so the swarm outlives every node's transport handle.
    swarm: InMemorySwarm,
    nodes: Vec<PeerNode>,
    /// Seeds for each node's scripted input.
    input_seeds: Vec<u64>,
    channel: Option<ChannelId>,
}

impl SessionRuntime {
    /// Create every node. Identities and input scripts derive from the
    /// session seed.
    pub fn new(config: RuntimeConfig) -> Result<Self> {
        let seed = config.session.seed.unwrap_or_else(rand::random);
        let mut rng = StdRng::seed_from_u64(seed);
        let swarm = InMemorySwarm::fully_connected();
        let clock: Arc<dyn TimeSource> = Arc::new(SystemTimeSource);

        let mut nodes = Vec::with_capacity(config.session.peers);
        let mut input_seeds = Vec::with_capacity(config.session.peers);
        for index in 0..config.session.peers {
            let identity = KeyPair::from_seed(rng.gen());
            let peer = PeerId::new(identity.public_key());
            let transport = Arc::new(swarm.join(peer));

            let mut node_config = config.clone();
            node_config.gossip = node_config.gossip.with_display_name(format!("node-{index}"));
            let node = PeerNode::new(node_config, identity, transport, Arc::clone(&clock))
                .with_context(|| format!("assembling node {index}"))?;
            info!(node = index, peer_id = %peer.short(), "Node ready");
            nodes.push(node);
            input_seeds.push(rng.gen());
        }
        info!(seed = seed, peers = nodes.len(), "Session created");
        Ok(Self {
            config,
            swarm,
            nodes,
            input_seeds,
            channel: None,
        })
    }

    fn input_for(&self, index: usize) -> Arc<dyn InputSource> {
        Arc::new(ScriptedInput::new(
            self.input_seeds[index],
            self.config.session.input_hold_ticks,
        ))
    }

    /// Found the channel on node 0 and bring every other node into it.
    pub async fn start(&mut self) -> Result<ChannelId> {
        let Some(founder) = self.nodes.first() else {
            bail!("session has no nodes");
        };
        let channel = founder
            .create_channel(&self.config.session.channel_name, Some(self.input_for(0)))
            .await
            .context("creating channel")?;
        info!(channel = %channel, name = %self.config.session.channel_name, "Channel created");

        for (index, node) in self.nodes.iter().enumerate().skip(1) {
            node.join_channel(channel, Some(self.input_for(index)))
                .await
                .with_context(|| format!("node {index} joining channel"))?;
        }

        let peers: Vec<PeerId> = self.nodes.iter().map(PeerNode::peer_id).collect();
        founder
            .set_peers(channel, peers)
            .await
            .context("setting channel peers")?;

        self.channel = Some(channel);
        info!(
            nodes = self.swarm.node_count(),
            session_secs = self.config.session.session_secs,
            "Session running"
        );
        Ok(channel)
    }

    /// Log every node's latest round and state hash.
    pub fn log_snapshots(&self) {
        let Some(channel) = self.channel else {
            return;
        };
        for (index, node) in self.nodes.iter().enumerate() {
            match node.state_summary(&channel) {
                Some(summary) => info!(
                    node = index,
                    round = summary.round,
                    hash = %&summary.hash[..16],
                    "Snapshot"
                ),
                None => debug!(node = index, "No state yet"),
            }
        }
    }

    /// Shut every node down.
    pub async fn shutdown(&self) {
        info!("Initiating graceful shutdown...");
        for node in &self.nodes {
            node.shutdown().await;
        }
        info!("Shutdown complete");
    }
}

/// Load configuration from an optional file, then the environment.
fn load_config() -> Result<RuntimeConfig> {
    let mut args = std::env::args().skip(1);
    let mut path: Option<PathBuf> = std::env::var("ROLLCAST_CONFIG").ok().map(PathBuf::from);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                let Some(value) = args.next() else {
                    bail!("--config requires a path");
                };
                path = Some(PathBuf::from(value));
            }
            other => warn!(argument = other, "Ignoring unknown argument"),
        }
    }

    let mut config = match &path {
        Some(path) => {
            info!(path = %path.display(), "Loading configuration file");
            RuntimeConfig::from_file(path)?
        }
        None => RuntimeConfig::default(),
    };
    config.apply_overrides(|key| std::env::var(key).ok())?;
    config.validate()?;
    Ok(config)
}

fn log_metrics(metrics: MetricsHandle) {
    match metrics.gather_text() {
        Ok(text) => debug!(metrics = %text, "Final metrics"),
        Err(e) => warn!(error = %e, "Failed to gather metrics"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let telemetry =
        init_telemetry(TelemetryConfig::from_env()).context("initializing telemetry")?;

    let config = load_config().context("loading configuration")?;
    let session_length = Duration::from_secs(config.session.session_secs);

    let mut runtime = SessionRuntime::new(config)?;
    if let Err(e) = runtime.start().await {
        error!(error = %e, "Session failed to start");
        runtime.shutdown().await;
        return Err(e);
    }

    info!("Session is running. Press Ctrl+C to stop.");
    let mut status = tokio::time::interval(Duration::from_secs(1));
    status.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let deadline = tokio::time::sleep(session_length);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = status.tick() => runtime.log_snapshots(),
            _ = &mut deadline => {
                info!("Session time elapsed");
                break;
            }
            result = tokio::signal::ctrl_c() => {
                result.context("waiting for Ctrl+C")?;
                info!("Interrupted");
                break;
            }
        }
    }

    runtime.log_snapshots();
    runtime.shutdown().await;
    log_metrics(telemetry.metrics());
    Ok(())
}
