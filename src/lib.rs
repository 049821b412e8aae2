//! # Fleetplane
//!
//! Envoy control plane that compiles declarative routing intent into
//! per-fleet xDS snapshots and serves them over the aggregated discovery
//! service.
//!
//! ## Architecture
//!
//! ```text
//! Intent files → ConfigManager → FleetSnapshotCache → ADS server → Envoy fleets
//!                     ↓
//!      PolicyResolver / RouteSynthesizer / ListenerBuilder
//! ```
//!
//! ## Core Components
//!
//! - **Options**: three-tier option merge and policy resolution per operation
//! - **xDS builders**: path matchers, routes, clusters and the HTTP listener
//! - **Snapshot cache**: one active snapshot per fleet, pushed to every node
//! - **Discovery server**: Tonic-based state-of-the-world ADS

pub mod cli;
pub mod config;
pub mod domain;
pub mod errors;
pub mod observability;
pub mod options;
pub mod services;
pub mod startup;
pub mod utils;
pub mod xds;

// Re-export commonly used types and traits
pub use config::AppConfig;
pub use errors::{Error, Result};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name from Cargo.toml
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
