//! Integration tests for the rebuild pipeline: intent in, active snapshot out.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::{control_plane, petstore};
use envoy_types::pb::envoy::config::route::v3::route_match::PathSpecifier;
use fleetplane::domain::{FleetId, FleetIntent, ProxiedService};
use fleetplane::services::{ConfigManager, ValidationUpdater};
use fleetplane::xds::resources::{CLUSTER_TYPE_URL, LISTENER_TYPE_URL, ROUTE_TYPE_URL};
use fleetplane::xds::FleetSnapshotCache;
use fleetplane::{AppConfig, Error};

#[tokio::test]
async fn test_rebuild_activates_snapshot_for_fleet() {
    let plane = control_plane();
    let applied = plane.manager.update_configuration(&petstore()).await.unwrap();

    let active = plane.cache.active("default.default").unwrap();
    assert_eq!(active.version(), applied.version());
    assert_eq!(active.resources(CLUSTER_TYPE_URL).len(), 1);
    assert_eq!(active.resources(ROUTE_TYPE_URL).len(), 1);
    assert_eq!(active.resources(LISTENER_TYPE_URL).len(), 1);
    assert_eq!(plane.cache.fleets(), vec!["default.default".to_string()]);
    assert!(plane.validation.services("default.default").await.is_empty());
}

#[tokio::test]
async fn test_exact_paths_are_matched_before_templated_paths() {
    let plane = control_plane();
    let snapshot = plane.manager.update_configuration(&petstore()).await.unwrap();

    let vhost = &snapshot.route_configuration().virtual_hosts[0];
    assert_eq!(vhost.domains, vec!["api.example.com".to_string()]);

    let kinds: Vec<&str> = vhost
        .routes
        .iter()
        .map(|route| match route.r#match.as_ref().and_then(|m| m.path_specifier.as_ref()) {
            Some(PathSpecifier::Path(_)) => "exact",
            Some(PathSpecifier::SafeRegex(_)) => "regex",
            _ => "other",
        })
        .collect();
    assert_eq!(kinds, vec!["exact", "exact", "regex"]);
    assert_eq!(vhost.routes[2].name, "/pets/{id}-GET");
}

#[tokio::test]
async fn test_failed_rebuild_leaves_fleet_untouched() {
    let plane = control_plane();
    let first = plane.manager.update_configuration(&petstore()).await.unwrap();

    let mut broken = petstore();
    broken.apis[0].hosts = vec!["bad host!".to_string()];
    let err = plane.manager.update_configuration(&broken).await.unwrap_err();

    assert!(err.is_fatal_for_rebuild());
    assert_eq!(plane.cache.active("default.default").unwrap().version(), first.version());
}

#[tokio::test]
async fn test_fleets_are_isolated() {
    let plane = control_plane();
    plane.manager.update_configuration(&petstore()).await.unwrap();

    let mut other = petstore();
    other.fleet = FleetId::new("edge", "prod");
    other.apis[0].paths.shift_remove("/pets/{id}");
    plane.manager.update_configuration(&other).await.unwrap();

    assert_eq!(plane.cache.active("default.default").unwrap().route_count(), 3);
    assert_eq!(plane.cache.active("edge.prod").unwrap().route_count(), 2);
}

#[tokio::test]
async fn test_unknown_fleet_cannot_connect() {
    let plane = control_plane();
    let err = plane.cache.on_node_connect("envoy-1", "missing.default").unwrap_err();
    assert!(matches!(err, Error::UnknownFleet(_)));
}

#[derive(Debug, Default)]
struct RecordingValidation {
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    hostnames: Mutex<Vec<String>>,
}

#[async_trait::async_trait]
impl ValidationUpdater for RecordingValidation {
    async fn update_services(&self, _fleet: &str, services: Vec<ProxiedService>) -> fleetplane::Result<()> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(5)).await;
        if let Some(service) = services.first() {
            self.hostnames.lock().unwrap().push(service.hostname.clone());
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}

fn upstream_intent(index: usize) -> FleetIntent {
    FleetIntent::from_yaml(&format!(
        r#"
fleet:
  name: default
apis:
  - name: petstore
    options:
      upstream:
        host:
          hostname: petstore-{index}
          port: 80
    paths:
      /pets:
        operations:
          get:
            operation_id: listPets
          post:
            operation_id: createPet
            options:
              validation:
                request:
                  enabled: true
"#
    ))
    .unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_rebuilds_are_serialized() {
    let cache = Arc::new(FleetSnapshotCache::default());
    let validation = Arc::new(RecordingValidation::default());
    let manager = Arc::new(ConfigManager::new(&AppConfig::default(), cache.clone(), validation.clone()));

    let rebuilds: Vec<_> = (0..8)
        .map(|index| {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move { manager.update_configuration(&upstream_intent(index)).await })
        })
        .collect();
    for rebuild in rebuilds {
        rebuild.await.unwrap().unwrap();
    }

    assert_eq!(validation.max_in_flight.load(Ordering::SeqCst), 1);

    let hostnames = validation.hostnames.lock().unwrap().clone();
    assert_eq!(hostnames.len(), 8);
    let last = format!("{}-80", hostnames.last().unwrap());
    let active = cache.active("default.default").unwrap();
    assert!(active.clusters().iter().any(|cluster| cluster.name == last));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_nodes_connecting_during_rebuilds_get_the_active_snapshot() {
    let plane = Arc::new(control_plane());
    plane.manager.update_configuration(&petstore()).await.unwrap();

    let rebuilds = {
        let plane = Arc::clone(&plane);
        tokio::spawn(async move {
            for _ in 0..20 {
                plane.manager.update_configuration(&petstore()).await.unwrap();
                tokio::task::yield_now().await;
            }
        })
    };
    let connects = {
        let plane = Arc::clone(&plane);
        tokio::spawn(async move {
            let mut registrations = Vec::new();
            for index in 0..20 {
                let node_id = format!("envoy-{index}");
                registrations.push(plane.cache.on_node_connect(&node_id, "default.default").unwrap());
                tokio::task::yield_now().await;
            }
            registrations
        })
    };

    rebuilds.await.unwrap();
    let registrations = connects.await.unwrap();

    let active = plane.cache.active("default.default").unwrap();
    for registration in &registrations {
        assert_eq!(registration.snapshots.borrow().version(), active.version());
    }
    assert_eq!(plane.cache.nodes_in("default.default").len(), 20);
}
