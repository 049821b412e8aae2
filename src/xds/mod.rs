//! Envoy xDS resource synthesis and distribution
//!
//! Synthesis turns resolved route intent into clusters, one route
//! configuration and one listener per fleet ([`EnvoyConfiguration`] →
//! [`Snapshot`]). Distribution keeps the active snapshot of every fleet in the
//! [`FleetSnapshotCache`] and serves it over ADS ([`DiscoveryServer`]).

pub mod cache;
pub mod cluster;
pub mod configuration;
pub mod listener;
pub mod nodes;
pub mod path_matcher;
pub mod resources;
pub mod route;
pub mod server;
pub mod services;
pub mod snapshot;

pub use cache::FleetSnapshotCache;
pub use cluster::ClusterSpec;
pub use configuration::{EnvoyConfiguration, VirtualHost};
pub use listener::ListenerBuilder;
pub use nodes::{NodeDirectory, NodeRegistration};
pub use path_matcher::PathMatch;
pub use route::{RouteAction, RouteSynthesizer, SynthesizedRoute};
pub use server::DiscoveryServer;
pub use services::FleetAggregatedDiscoveryService;
pub use snapshot::Snapshot;
