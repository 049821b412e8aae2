//! Fleet configuration rebuilds
//!
//! A rebuild compiles one [`FleetIntent`] from scratch into a snapshot and
//! applies it. Rebuilds are serialized: only one runs at a time, across all
//! fleets. Any policy, structural or consistency error aborts the rebuild
//! before anything is applied, so the fleet keeps its previous snapshot.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Mutex;
use tracing::{debug, error, info, Instrument};

use super::api_routes::{api_route_intents, openapi_route, static_route_intents};
use super::validation::ValidationUpdater;
use crate::config::{AppConfig, GatewayConfig};
use crate::domain::{FleetIntent, ProxiedService, RouteIntent};
use crate::errors::{Error, Result};
use crate::observability::recorder;
use crate::xds::{EnvoyConfiguration, FleetSnapshotCache, ListenerBuilder, RouteSynthesizer, Snapshot};

/// Snapshot plus the validation proxy services it relies on
#[derive(Debug, Clone)]
pub struct BuiltConfiguration {
    pub snapshot: Snapshot,
    pub proxied_services: Vec<ProxiedService>,
}

#[derive(Debug)]
pub struct ConfigManager {
    gateway: GatewayConfig,
    synthesizer: RouteSynthesizer,
    cache: Arc<FleetSnapshotCache>,
    validation: Arc<dyn ValidationUpdater>,
    rebuild: Mutex<()>,
}

impl ConfigManager {
    pub fn new(
        config: &AppConfig,
        cache: Arc<FleetSnapshotCache>,
        validation: Arc<dyn ValidationUpdater>,
    ) -> Self {
        Self {
            gateway: config.gateway.clone(),
            synthesizer: RouteSynthesizer::from_config(config),
            cache,
            validation,
            rebuild: Mutex::new(()),
        }
    }

    pub fn cache(&self) -> &Arc<FleetSnapshotCache> {
        &self.cache
    }

    /// Compile intent into a snapshot without applying it
    pub fn build(&self, intent: &FleetIntent) -> Result<BuiltConfiguration> {
        intent.validate()?;

        let mut configuration = EnvoyConfiguration::new(self.gateway.route_config_name.clone());
        let mut proxied_services = BTreeMap::new();

        for api in &intent.apis {
            let context = format!("api {}", api.name);
            for host in &api.hosts {
                configuration.add_virtual_host(host);
            }

            for route_intent in api_route_intents(api).map_err(|e| e.context(&context))? {
                self.attach(&mut configuration, &route_intent, &mut proxied_services)?;
            }

            if let Some(route) = openapi_route(api)? {
                for host in &api.hosts {
                    configuration
                        .add_route_to_vhost(host, route.clone())
                        .map_err(|e| e.context(&context))?;
                }
            }
            debug!(api = %api.name, "API route configuration processed");
        }

        for static_route in &intent.static_routes {
            let context = format!("static route {}", static_route.name);
            for host in &static_route.hosts {
                configuration.add_virtual_host(host);
            }
            for route_intent in static_route_intents(static_route).map_err(|e| e.context(&context))? {
                self.attach(&mut configuration, &route_intent, &mut proxied_services)?;
            }
            debug!(static_route = %static_route.name, "Static route configuration processed");
        }

        let listener = ListenerBuilder::new(&self.gateway)
            .with_access_log(intent.access_log.clone())
            .with_tls(intent.tls.clone())
            .build()
            .map_err(|e| e.context(format!("listener {}", self.gateway.listener_name)))?;
        configuration.add_listener(listener);

        Ok(BuiltConfiguration {
            snapshot: configuration.generate_snapshot()?,
            proxied_services: proxied_services.into_values().collect(),
        })
    }

    fn attach(
        &self,
        configuration: &mut EnvoyConfiguration,
        route_intent: &RouteIntent,
        proxied_services: &mut BTreeMap<String, ProxiedService>,
    ) -> Result<()> {
        let synthesized = self.synthesizer.synthesize(route_intent)?;

        for cluster in &synthesized.clusters {
            if !configuration.cluster_exists(&cluster.name) {
                configuration.add_cluster(cluster);
            }
        }

        for vhost in &route_intent.vhosts {
            configuration
                .add_route_to_vhost(vhost, synthesized.for_vhost(vhost))
                .map_err(|e| e.context(route_intent.context()))?;
        }

        if let Some(service) = synthesized.proxied_service {
            proxied_services.entry(service.id.clone()).or_insert(service);
        }
        Ok(())
    }

    /// Rebuild and apply one fleet's configuration.
    ///
    /// Validation proxy services are updated before the snapshot is applied so
    /// the proxy knows an upstream before any route sends traffic to it.
    pub async fn update_configuration(&self, intent: &FleetIntent) -> Result<Arc<Snapshot>> {
        let fleet = intent.fleet.to_string();
        let span = crate::rebuild_span!(fleet);

        async {
            let _guard = self.rebuild.lock().await;
            let started = Instant::now();
            info!("Started updating configuration");

            let outcome = self.rebuild_locked(&fleet, intent).await;
            let elapsed = started.elapsed().as_secs_f64();

            match &outcome {
                Ok(snapshot) => {
                    recorder().record_rebuild(&fleet, true, elapsed);
                    info!(version = %snapshot.version(), "Configuration snapshot deployed for the fleet");
                }
                Err(e) => {
                    recorder().record_rebuild(&fleet, matches!(e, Error::Distribution { .. }), elapsed);
                    error!(error = %e, "Configuration update failed");
                }
            }
            outcome
        }
        .instrument(span)
        .await
    }

    async fn rebuild_locked(&self, fleet: &str, intent: &FleetIntent) -> Result<Arc<Snapshot>> {
        let BuiltConfiguration { snapshot, proxied_services } = self.build(intent)?;
        tracing::Span::current().record("version", snapshot.version());
        info!(
            clusters = snapshot.clusters().len(),
            routes = snapshot.route_count(),
            "Configuration snapshot was generated for the fleet"
        );

        self.validation.update_services(fleet, proxied_services).await?;
        self.cache.apply(fleet, snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::validation::InMemoryValidationUpdater;
    use crate::xds::resources::CLUSTER_TYPE_URL;

    const PETSTORE: &str = r#"
fleet:
  name: default
apis:
  - name: petstore
    options:
      upstream:
        host:
          hostname: petstore
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
      /pets/{id}:
        parameters:
          id:
            type: integer
        operations:
          get:
            operation_id: showPetById
"#;

    fn manager() -> (ConfigManager, Arc<InMemoryValidationUpdater>) {
        let validation = Arc::new(InMemoryValidationUpdater::new());
        let manager = ConfigManager::new(
            &AppConfig::default(),
            Arc::new(FleetSnapshotCache::default()),
            validation.clone(),
        );
        (manager, validation)
    }

    #[test]
    fn shared_upstream_yields_one_cluster() {
        let (manager, _) = manager();
        let built = manager.build(&FleetIntent::from_yaml(PETSTORE).unwrap()).unwrap();

        let names: Vec<&str> = built.snapshot.clusters().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["petstore-80", "validation-proxy.fleetplane-system.svc.cluster.local.-17000"]);
        assert_eq!(built.snapshot.resources(CLUSTER_TYPE_URL).len(), 2);
        assert_eq!(built.snapshot.route_count(), 3);
        assert_eq!(built.proxied_services.len(), 1);
        assert_eq!(built.proxied_services[0].cluster_name, "petstore-80");
    }

    #[test]
    fn rebuilds_are_idempotent() {
        let (manager, _) = manager();
        let intent = FleetIntent::from_yaml(PETSTORE).unwrap();
        let first = manager.build(&intent).unwrap().snapshot;
        let second = manager.build(&intent).unwrap().snapshot;

        assert_ne!(first.version(), second.version());
        assert!(first.same_content(&second));
    }

    #[tokio::test]
    async fn invalid_policy_keeps_previous_snapshot() {
        let (manager, _) = manager();
        let intent = FleetIntent::from_yaml(PETSTORE).unwrap();
        let applied = manager.update_configuration(&intent).await.unwrap();

        let mut broken = intent.clone();
        broken.apis[0].options.redirect = Some(Default::default());
        let err = manager.update_configuration(&broken).await.unwrap_err();

        assert!(err.is_fatal_for_rebuild());
        let active = manager.cache().active("default.default").unwrap();
        assert_eq!(active.version(), applied.version());
    }

    #[tokio::test]
    async fn validation_services_are_published() {
        let (manager, validation) = manager();
        manager.update_configuration(&FleetIntent::from_yaml(PETSTORE).unwrap()).await.unwrap();

        let services = validation.services("default.default").await;
        assert_eq!(services.len(), 1);
        assert_eq!(services[0].hostname, "petstore");
    }

    #[test]
    fn mock_only_operation_builds() {
        let (manager, _) = manager();
        let intent = FleetIntent::from_yaml(
            r#"
fleet:
  name: default
apis:
  - name: drafts
    options:
      mocking:
        enabled: true
    paths:
      /drafts:
        operations:
          get:
            operation_id: listDrafts
"#,
        )
        .unwrap();

        let built = manager.build(&intent).unwrap();
        let names: Vec<&str> = built.snapshot.clusters().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["127.0.0.1-8090"]);
        assert_eq!(built.snapshot.route_count(), 1);
        assert!(built.proxied_services.is_empty());
    }

    #[test]
    fn exact_routes_keep_declaration_order() {
        let (manager, _) = manager();
        let intent = FleetIntent::from_yaml(
            r#"
fleet:
  name: default
apis:
  - name: zoo
    options:
      upstream:
        host:
          hostname: zoo
          port: 80
    paths:
      /zebras:
        operations:
          get:
            operation_id: listZebras
      /apes:
        operations:
          get:
            operation_id: listApes
"#,
        )
        .unwrap();

        let built = manager.build(&intent).unwrap();
        let routes = &built.snapshot.route_configuration().virtual_hosts[0].routes;
        let names: Vec<&str> = routes.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["/zebras-GET", "/apes-GET"]);
    }

    #[test]
    fn duplicate_route_across_apis_is_rejected() {
        let (manager, _) = manager();
        let mut intent = FleetIntent::from_yaml(PETSTORE).unwrap();
        let mut copy = intent.apis[0].clone();
        copy.name = "petstore-copy".into();
        intent.apis.push(copy);

        let err = manager.build(&intent).unwrap_err();
        assert!(matches!(err, Error::Structural(_)));
        assert!(err.to_string().contains("petstore-copy"));
    }
}
