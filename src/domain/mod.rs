//! Domain layer
//!
//! Plain data types describing what the control plane is asked to build:
//! fleets, the intent documents for a fleet, and the per-route intents a
//! rebuild derives from them. No envoy-types dependencies live here.

pub mod fleet;
pub mod intent;
pub mod route_intent;
pub mod service;

pub use fleet::FleetId;
pub use intent::{
    AccessLogFormat, AccessLogIntent, ApiIntent, CertificateIntent, FleetIntent, OperationIntent,
    ParamSchema, PathIntent, StaticPathIntent, StaticRouteIntent, TlsIntent,
};
pub use route_intent::{join_route_path, route_name, RouteIntent};
pub use service::ProxiedService;
