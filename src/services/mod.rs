//! Rebuild pipeline services
//!
//! Turning fleet intent into applied snapshots: route intent derivation,
//! the serialized rebuild itself, the validation proxy registry and the
//! intent file loader used by the binary.

pub mod api_routes;
pub mod config_manager;
pub mod intent_loader;
pub mod validation;

pub use config_manager::{BuiltConfiguration, ConfigManager};
pub use intent_loader::{IntentLoader, PendingIntent};
pub use validation::{InMemoryValidationUpdater, ValidationUpdater};
