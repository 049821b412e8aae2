//! # Configuration Settings
//!
//! Defines the configuration structure for the fleetplane control plane.

use crate::errors::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use validator::Validate;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate, Default)]
#[serde(default)]
pub struct AppConfig {
    /// xDS server configuration
    #[validate(nested)]
    pub xds: XdsConfig,

    /// Data-plane listener and route naming
    #[validate(nested)]
    pub gateway: GatewayConfig,

    /// Mock-serving upstream
    #[validate(nested)]
    pub mocking: MockingConfig,

    /// Request validation proxy upstream
    #[validate(nested)]
    pub validation: ValidationProxyConfig,

    /// Where fleet intent documents are read from
    #[validate(nested)]
    pub intent: IntentConfig,

    /// Observability configuration
    #[validate(nested)]
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// Validate the entire configuration
    pub fn validate(&self) -> Result<()> {
        Validate::validate(self).map_err(Error::from)?;
        self.validate_custom()?;
        Ok(())
    }

    fn validate_custom(&self) -> Result<()> {
        if self.observability.enable_metrics && self.observability.metrics_port == self.xds.port {
            return Err(Error::config("Metrics and xDS ports cannot be the same"));
        }

        if self.xds.keepalive_timeout_seconds >= self.xds.keepalive_interval_seconds {
            return Err(Error::config(
                "xDS keepalive timeout must be shorter than the keepalive interval",
            ));
        }

        Ok(())
    }
}

/// xDS gRPC server configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct XdsConfig {
    /// Bind address for the discovery server
    #[validate(length(min = 1, message = "Host cannot be empty"))]
    pub host: String,

    /// Bind port for the discovery server
    #[validate(range(min = 1, max = 65535, message = "Port must be between 1 and 65535"))]
    pub port: u16,

    /// HTTP/2 keepalive ping interval
    #[validate(range(min = 1, message = "Keepalive interval must be at least 1 second"))]
    pub keepalive_interval_seconds: u64,

    /// How long to wait for a keepalive ack before closing the connection
    #[validate(range(min = 1, message = "Keepalive timeout must be at least 1 second"))]
    pub keepalive_timeout_seconds: u64,

    /// TCP keepalive applied to accepted sockets
    pub tcp_keepalive_seconds: u64,

    /// Maximum concurrent gRPC streams per connection
    #[validate(range(min = 1, message = "At least one concurrent stream is required"))]
    pub max_concurrent_streams: u32,
}

impl Default for XdsConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 18000,
            keepalive_interval_seconds: 30,
            keepalive_timeout_seconds: 5,
            tcp_keepalive_seconds: 30,
            max_concurrent_streams: 1_000_000,
        }
    }
}

impl XdsConfig {
    /// Get the xDS server bind address
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_secs(self.keepalive_interval_seconds)
    }

    pub fn keepalive_timeout(&self) -> Duration {
        Duration::from_secs(self.keepalive_timeout_seconds)
    }

    /// `None` disables TCP keepalive
    pub fn tcp_keepalive(&self) -> Option<Duration> {
        (self.tcp_keepalive_seconds > 0).then(|| Duration::from_secs(self.tcp_keepalive_seconds))
    }
}

/// Names and addresses baked into every fleet's listener and route configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct GatewayConfig {
    #[validate(length(min = 1, message = "Listener name cannot be empty"))]
    pub listener_name: String,

    #[validate(length(min = 1, message = "Listener address cannot be empty"))]
    pub listener_address: String,

    #[validate(range(min = 1, max = 65535, message = "Port must be between 1 and 65535"))]
    pub listener_port: u16,

    /// Name of the route configuration referenced by the listener over RDS
    #[validate(length(min = 1, message = "Route configuration name cannot be empty"))]
    pub route_config_name: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listener_name: "listener_0".to_string(),
            listener_address: "0.0.0.0".to_string(),
            listener_port: 8080,
            route_config_name: "local_route".to_string(),
        }
    }
}

/// Upstream that serves canned responses for mocked operations
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct MockingConfig {
    #[validate(length(min = 1, message = "Mock server host cannot be empty"))]
    pub host: String,

    #[validate(range(min = 1, max = 65535, message = "Port must be between 1 and 65535"))]
    pub port: u16,
}

impl Default for MockingConfig {
    fn default() -> Self {
        Self { host: "127.0.0.1".to_string(), port: 8090 }
    }
}

/// Shared request validation proxy
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ValidationProxyConfig {
    #[validate(length(min = 1, message = "Validation proxy host cannot be empty"))]
    pub host: String,

    #[validate(range(min = 1, max = 65535, message = "Port must be between 1 and 65535"))]
    pub port: u16,
}

impl Default for ValidationProxyConfig {
    fn default() -> Self {
        Self {
            host: "validation-proxy.fleetplane-system.svc.cluster.local.".to_string(),
            port: 17000,
        }
    }
}

/// Intent document source
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct IntentConfig {
    /// Directory scanned for `*.yaml` / `*.yml` fleet intent files
    pub directory: PathBuf,

    /// Seconds between directory scans
    #[validate(range(min = 1, max = 3600, message = "Poll interval must be between 1 and 3600 seconds"))]
    pub poll_interval_seconds: u64,
}

impl Default for IntentConfig {
    fn default() -> Self {
        Self { directory: PathBuf::from("./intents"), poll_interval_seconds: 5 }
    }
}

impl IntentConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds)
    }
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error) or a full `EnvFilter` directive
    #[validate(length(min = 1, message = "Log level cannot be empty"))]
    pub log_level: String,

    /// Emit logs as JSON lines
    pub json_logging: bool,

    /// Expose Prometheus metrics
    pub enable_metrics: bool,

    /// Port for the Prometheus scrape endpoint
    #[validate(range(min = 1, max = 65535, message = "Port must be between 1 and 65535"))]
    pub metrics_port: u16,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logging: false,
            enable_metrics: false,
            metrics_port: 9090,
        }
    }
}
