//! # Rollcast Telemetry
//!
//! Logging and metrics shared by every Rollcast subsystem.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use rollcast_telemetry::{init_telemetry, TelemetryConfig};
//!
//! let _guard = init_telemetry(TelemetryConfig::from_env())?;
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `ROLLCAST_LOG_LEVEL` / `RUST_LOG` | `info` | Log filter |
//! | `ROLLCAST_JSON_LOGS` | `false` | JSON log lines |
//! | `ROLLCAST_CONSOLE_OUTPUT` | `true` | Write logs to stdout |
//! | `ROLLCAST_SERVICE_NAME` | `rollcast` | Service name |

mod config;
mod logging;
pub mod metrics;

pub use config::TelemetryConfig;
pub use logging::init_logging;
pub use metrics::{
    register_metrics, MetricsHandle, CHECKPOINTS_PERSISTED, CUE_ABORTS, GAP_REQUESTS, KEEPALIVES,
    MESSAGES_COMMITTED, MESSAGES_DROPPED, MESSAGES_RECEIVED, PEERS_CONNECTED, ROLLBACKS,
    ROLLBACK_DEPTH, ROUNDS_SIMULATED, RPC_TIMEOUTS, SEQUENCER_TICKS, SIGNATURE_FAILURES,
};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to initialize logging: {0}")]
    LoggingInit(String),

    #[error("Failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Initialize logging and metrics.
///
/// Returns a guard that must be held for the lifetime of the application.
pub fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    let metrics = register_metrics()?;
    init_logging(&config)?;

    tracing::info!(
        service = %config.service_name,
        json_logs = config.json_logs,
        "Telemetry initialized"
    );

    Ok(TelemetryGuard {
        metrics,
        service_name: config.service_name,
    })
}

/// Guard that keeps telemetry active.
pub struct TelemetryGuard {
    metrics: MetricsHandle,
    service_name: String,
}

impl TelemetryGuard {
    pub fn metrics(&self) -> MetricsHandle {
        self.metrics
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        tracing::info!(service = %self.service_name, "Shutting down telemetry...");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_service_name() {
        let config = TelemetryConfig::default();
        assert_eq!(config.service_name, "rollcast");
    }
}
