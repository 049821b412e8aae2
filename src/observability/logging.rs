//! # Structured Logging
//!
//! Subscriber setup plus span helpers shared by the rebuild pipeline and the
//! discovery server.

use crate::config::{AppConfig, ObservabilityConfig};
use crate::errors::{Error, Result};
use tracing_subscriber::{fmt, EnvFilter};

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins over the configured level when set. Returns an error if a
/// global subscriber is already installed.
pub fn init_logging(config: &ObservabilityConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .map_err(|e| Error::config(format!("Invalid log filter '{}': {}", config.log_level, e)))?;

    let builder = fmt::Subscriber::builder().with_env_filter(filter).with_target(true);

    let installed = if config.json_logging {
        tracing::subscriber::set_global_default(builder.json().flatten_event(true).finish())
    } else {
        tracing::subscriber::set_global_default(builder.finish())
    };

    installed.map_err(|e| Error::internal(format!("Failed to install tracing subscriber: {}", e)))
}

/// Create a tracing span for xDS operations
#[macro_export]
macro_rules! xds_span {
    ($operation:expr, $node_id:expr) => {
        tracing::info_span!(
            "xds_operation",
            operation = %$operation,
            node_id = %$node_id,
            operation_id = %uuid::Uuid::new_v4()
        )
    };
    ($operation:expr, $node_id:expr, $($field:tt)*) => {
        tracing::info_span!(
            "xds_operation",
            operation = %$operation,
            node_id = %$node_id,
            operation_id = %uuid::Uuid::new_v4(),
            $($field)*
        )
    };
}

/// Create a tracing span for one configuration rebuild of a fleet
#[macro_export]
macro_rules! rebuild_span {
    ($fleet:expr) => {
        tracing::info_span!(
            "fleet_rebuild",
            fleet = %$fleet,
            rebuild_id = %uuid::Uuid::new_v4(),
            version = tracing::field::Empty
        )
    };
}

/// Log configuration at startup
pub fn log_config_info(config: &AppConfig) {
    tracing::info!(
        xds_address = %config.xds.bind_address(),
        listener = %config.gateway.listener_name,
        listener_port = config.gateway.listener_port,
        route_config = %config.gateway.route_config_name,
        intent_directory = %config.intent.directory.display(),
        poll_interval_seconds = config.intent.poll_interval_seconds,
        metrics_enabled = %config.observability.enable_metrics,
        "fleetplane control plane configuration"
    );
}
