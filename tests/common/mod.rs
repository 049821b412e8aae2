//! Shared fixtures for integration tests

#![allow(dead_code)]

use std::sync::Arc;

use fleetplane::domain::FleetIntent;
use fleetplane::services::{ConfigManager, InMemoryValidationUpdater};
use fleetplane::xds::FleetSnapshotCache;
use fleetplane::AppConfig;

pub const PETSTORE_INTENT: &str = r#"
fleet:
  name: default
apis:
  - name: petstore
    hosts: ["api.example.com"]
    options:
      upstream:
        host:
          hostname: petstore
          port: 80
    paths:
      /pets/{id}:
        parameters:
          id:
            type: integer
        operations:
          get:
            operation_id: showPetById
      /pets:
        operations:
          get:
            operation_id: listPets
          post:
            operation_id: createPet
"#;

pub fn petstore() -> FleetIntent {
    FleetIntent::from_yaml(PETSTORE_INTENT).expect("fixture intent parses")
}

pub struct ControlPlane {
    pub cache: Arc<FleetSnapshotCache>,
    pub validation: Arc<InMemoryValidationUpdater>,
    pub manager: ConfigManager,
}

pub fn control_plane() -> ControlPlane {
    let cache = Arc::new(FleetSnapshotCache::default());
    let validation = Arc::new(InMemoryValidationUpdater::new());
    let manager = ConfigManager::new(&AppConfig::default(), cache.clone(), validation.clone());
    ControlPlane { cache, validation, manager }
}
