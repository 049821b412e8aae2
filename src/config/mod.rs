//! # Configuration Management
//!
//! Layered configuration for the control plane: built-in defaults, an optional
//! YAML/TOML file, then `FLEETPLANE__`-prefixed environment variables
//! (`FLEETPLANE__XDS__PORT=18001`).

pub mod settings;

pub use settings::{
    AppConfig, GatewayConfig, IntentConfig, MockingConfig, ObservabilityConfig,
    ValidationProxyConfig, XdsConfig,
};

use crate::Result;
use std::path::Path;

/// Environment variable prefix for configuration overrides
pub const ENV_PREFIX: &str = "FLEETPLANE";

impl AppConfig {
    /// Load configuration from an optional file plus environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            if !path.exists() {
                return Err(crate::Error::config(format!(
                    "Configuration file {} does not exist",
                    path.display()
                )));
            }
            builder = builder.add_source(config::File::from(path));
        }

        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX).separator("__").try_parsing(true),
        );

        let config: AppConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from the environment only
    pub fn from_env() -> Result<Self> {
        Self::load(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_from_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(
            file,
            "xds:\n  port: 18500\ngateway:\n  listener_port: 10080\nintent:\n  directory: /tmp/fleets\n"
        )
        .unwrap();

        let config = AppConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.xds.port, 18500);
        assert_eq!(config.xds.host, "0.0.0.0");
        assert_eq!(config.gateway.listener_port, 10080);
        assert_eq!(config.intent.directory, std::path::PathBuf::from("/tmp/fleets"));
    }

    #[test]
    fn test_missing_file_is_a_config_error() {
        let err = AppConfig::load(Some(Path::new("/definitely/not/here.yaml"))).unwrap_err();
        assert!(matches!(err, crate::Error::Config(_)));
    }

    #[test]
    fn test_invalid_file_values_fail_validation() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "intent:\n  poll_interval_seconds: 0\n").unwrap();

        assert!(AppConfig::load(Some(file.path())).is_err());
    }
}
