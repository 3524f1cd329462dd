//! Prometheus metrics for Rollcast peers.
//!
//! All metrics follow the naming convention: `rollcast_<component>_<metric>_<unit>`

use lazy_static::lazy_static;
use prometheus::{
    exponential_buckets, Counter, CounterVec, Encoder, Gauge, Histogram, Opts, Registry,
    TextEncoder,
};

use crate::TelemetryError;

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // =========================================================================
    // MESSAGE LOG METRICS
    // =========================================================================

    /// Chain messages signed and stored locally
    pub static ref MESSAGES_COMMITTED: CounterVec = CounterVec::new(
        Opts::new("rollcast_log_messages_committed_total", "Chain messages committed locally"),
        &["kind"]  // kind: create_channel/input/set_peers
    ).expect("metric creation failed");

    /// Messages accepted from the network
    pub static ref MESSAGES_RECEIVED: CounterVec = CounterVec::new(
        Opts::new("rollcast_log_messages_received_total", "Messages accepted from peers"),
        &["kind"]
    ).expect("metric creation failed");

    /// Messages dropped before storage
    pub static ref MESSAGES_DROPPED: CounterVec = CounterVec::new(
        Opts::new("rollcast_log_messages_dropped_total", "Inbound messages dropped"),
        &["reason"]  // reason: duplicate/self/bad_signature/malformed
    ).expect("metric creation failed");

    /// Signature verification failures (for alerting)
    pub static ref SIGNATURE_FAILURES: Counter = Counter::new(
        "rollcast_log_signature_failures_total",
        "Total signature verification failures"
    ).expect("metric creation failed");

    /// Gap-fill requests sent to peers
    pub static ref GAP_REQUESTS: Counter = Counter::new(
        "rollcast_log_gap_requests_total",
        "Missing-parent range requests sent"
    ).expect("metric creation failed");

    // =========================================================================
    // GOSSIP METRICS
    // =========================================================================

    /// Connected peers across joined channels
    pub static ref PEERS_CONNECTED: Gauge = Gauge::new(
        "rollcast_gossip_peers_connected",
        "Number of currently connected peers"
    ).expect("metric creation failed");

    /// Keep-alives accepted / rejected
    pub static ref KEEPALIVES: CounterVec = CounterVec::new(
        Opts::new("rollcast_gossip_keepalives_total", "Keep-alives processed"),
        &["outcome"]  // outcome: accepted/stale/bad_signature
    ).expect("metric creation failed");

    /// RPC requests that resolved by timeout
    pub static ref RPC_TIMEOUTS: Counter = Counter::new(
        "rollcast_gossip_rpc_timeouts_total",
        "Peer requests resolved empty after timeout"
    ).expect("metric creation failed");

    // =========================================================================
    // SIMULATION METRICS
    // =========================================================================

    /// Rounds stepped through the game module
    pub static ref ROUNDS_SIMULATED: Counter = Counter::new(
        "rollcast_sim_rounds_simulated_total",
        "Rounds applied by the simulation"
    ).expect("metric creation failed");

    /// Replays that started below the previous head
    pub static ref ROLLBACKS: Counter = Counter::new(
        "rollcast_sim_rollbacks_total",
        "Replays that rolled back already simulated rounds"
    ).expect("metric creation failed");

    /// Rollback depth in rounds
    pub static ref ROLLBACK_DEPTH: Histogram = Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "rollcast_sim_rollback_depth_rounds",
            "Rounds re-simulated by a rollback"
        ).buckets(exponential_buckets(1.0, 2.0, 12).expect("bucket layout"))
    ).expect("metric creation failed");

    /// Durable checkpoints written
    pub static ref CHECKPOINTS_PERSISTED: Counter = Counter::new(
        "rollcast_sim_checkpoints_persisted_total",
        "Checkpoints written to durable storage"
    ).expect("metric creation failed");

    /// Cue passes aborted on a gap
    pub static ref CUE_ABORTS: CounterVec = CounterVec::new(
        Opts::new("rollcast_sim_cue_aborts_total", "Cue passes aborted"),
        &["reason"]  // reason: round_gap/state_discontinuity/store/game
    ).expect("metric creation failed");

    // =========================================================================
    // SEQUENCER METRICS
    // =========================================================================

    /// Sequencer tick outcomes
    pub static ref SEQUENCER_TICKS: CounterVec = CounterVec::new(
        Opts::new("rollcast_seq_ticks_total", "Sequencer ticks by outcome"),
        &["outcome"]
    ).expect("metric creation failed");
}

/// Handle onto the registered metrics.
#[derive(Debug, Clone, Copy)]
pub struct MetricsHandle;

impl MetricsHandle {
    /// Encode all metrics as Prometheus text format.
    pub fn gather_text(&self) -> Result<String, TelemetryError> {
        encode_metrics()
    }
}

/// Register all metrics with the global registry.
///
/// Safe to call more than once; already registered collectors are skipped.
pub fn register_metrics() -> Result<MetricsHandle, TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        // Message log
        Box::new(MESSAGES_COMMITTED.clone()),
        Box::new(MESSAGES_RECEIVED.clone()),
        Box::new(MESSAGES_DROPPED.clone()),
        Box::new(SIGNATURE_FAILURES.clone()),
        Box::new(GAP_REQUESTS.clone()),
        // Gossip
        Box::new(PEERS_CONNECTED.clone()),
        Box::new(KEEPALIVES.clone()),
        Box::new(RPC_TIMEOUTS.clone()),
        // Simulation
        Box::new(ROUNDS_SIMULATED.clone()),
        Box::new(ROLLBACKS.clone()),
        Box::new(ROLLBACK_DEPTH.clone()),
        Box::new(CHECKPOINTS_PERSISTED.clone()),
        Box::new(CUE_ABORTS.clone()),
        // Sequencer
        Box::new(SEQUENCER_TICKS.clone()),
    ];

    for metric in metrics {
        match REGISTRY.register(metric) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(TelemetryError::MetricsInit(e.to_string())),
        }
    }

    Ok(MetricsHandle)
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_metrics_twice() {
        assert!(register_metrics().is_ok());
        assert!(register_metrics().is_ok());
    }

    #[test]
    fn test_counter_increment() {
        MESSAGES_COMMITTED.with_label_values(&["input"]).inc();
        assert!(MESSAGES_COMMITTED.with_label_values(&["input"]).get() >= 1.0);
    }

    #[test]
    fn test_gauge_set() {
        PEERS_CONNECTED.set(3.0);
        assert_eq!(PEERS_CONNECTED.get(), 3.0);
    }

    #[test]
    fn test_gather_text_contains_registered_names() {
        let handle = register_metrics().unwrap();
        ROUNDS_SIMULATED.inc();
        let text = handle.gather_text().unwrap();
        assert!(text.contains("rollcast_sim_rounds_simulated_total"));
    }
}
