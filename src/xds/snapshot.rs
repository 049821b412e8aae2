//! Immutable, versioned xDS snapshots
//!
//! A snapshot bundles every cluster, the single route configuration and the
//! listener of one fleet. Versions are UUIDv7 strings, so they sort by
//! creation time.

use crate::errors::{Error, Result};
use crate::xds::resources::{
    any_from_message, message_from_any, BuiltResource, CLUSTER_TYPE_URL,
    HTTP_CONNECTION_MANAGER_TYPE_URL, LISTENER_TYPE_URL, ROUTE_TYPE_URL,
};
use chrono::{DateTime, Utc};
use envoy_types::pb::envoy::config::cluster::v3::Cluster;
use envoy_types::pb::envoy::config::listener::v3::{filter, Listener};
use envoy_types::pb::envoy::config::route::v3::{route, route_action::ClusterSpecifier, RouteConfiguration};
use envoy_types::pb::envoy::extensions::filters::network::http_connection_manager::v3::{
    http_connection_manager::RouteSpecifier, HttpConnectionManager,
};
use std::collections::BTreeSet;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct Snapshot {
    version: String,
    created_at: DateTime<Utc>,
    clusters: Vec<Cluster>,
    route_configuration: RouteConfiguration,
    listener: Listener,
}

impl Snapshot {
    /// Bundle resources under a fresh version. Clusters are sorted by name.
    pub fn new(mut clusters: Vec<Cluster>, route_configuration: RouteConfiguration, listener: Listener) -> Self {
        clusters.sort_by(|a, b| a.name.cmp(&b.name));
        Self {
            version: Uuid::now_v7().to_string(),
            created_at: Utc::now(),
            clusters,
            route_configuration,
            listener,
        }
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn clusters(&self) -> &[Cluster] {
        &self.clusters
    }

    pub fn route_configuration(&self) -> &RouteConfiguration {
        &self.route_configuration
    }

    pub fn listener(&self) -> &Listener {
        &self.listener
    }

    pub fn route_count(&self) -> usize {
        self.route_configuration.virtual_hosts.iter().map(|vh| vh.routes.len()).sum()
    }

    /// Packed resources of one type, or empty for types the snapshot does not carry
    pub fn resources(&self, type_url: &str) -> Vec<BuiltResource> {
        match type_url {
            CLUSTER_TYPE_URL => self
                .clusters
                .iter()
                .map(|cluster| BuiltResource {
                    name: cluster.name.clone(),
                    resource: any_from_message(CLUSTER_TYPE_URL, cluster),
                })
                .collect(),
            ROUTE_TYPE_URL => vec![BuiltResource {
                name: self.route_configuration.name.clone(),
                resource: any_from_message(ROUTE_TYPE_URL, &self.route_configuration),
            }],
            LISTENER_TYPE_URL => vec![BuiltResource {
                name: self.listener.name.clone(),
                resource: any_from_message(LISTENER_TYPE_URL, &self.listener),
            }],
            _ => Vec::new(),
        }
    }

    /// Every route's cluster must be bundled and the listener must reference the
    /// bundled route configuration.
    pub fn check_consistency(&self) -> Result<()> {
        let clusters: BTreeSet<&str> = self.clusters.iter().map(|c| c.name.as_str()).collect();

        for vhost in &self.route_configuration.virtual_hosts {
            for route in &vhost.routes {
                let Some(route::Action::Route(action)) = &route.action else {
                    continue;
                };
                if let Some(ClusterSpecifier::Cluster(name)) = &action.cluster_specifier {
                    if !clusters.contains(name.as_str()) {
                        return Err(Error::consistency(format!(
                            "route {} in virtual host {} references missing cluster {}",
                            route.name, vhost.name, name
                        )));
                    }
                }
            }
        }

        for chain in &self.listener.filter_chains {
            for listener_filter in &chain.filters {
                let Some(filter::ConfigType::TypedConfig(any)) = &listener_filter.config_type else {
                    continue;
                };
                if any.type_url != HTTP_CONNECTION_MANAGER_TYPE_URL {
                    continue;
                }
                let hcm: HttpConnectionManager =
                    message_from_any(HTTP_CONNECTION_MANAGER_TYPE_URL, any)?;
                match hcm.route_specifier {
                    Some(RouteSpecifier::Rds(rds)) if rds.route_config_name == self.route_configuration.name => {}
                    Some(RouteSpecifier::Rds(rds)) => {
                        return Err(Error::consistency(format!(
                            "listener {} references route configuration {} but snapshot carries {}",
                            self.listener.name, rds.route_config_name, self.route_configuration.name
                        )));
                    }
                    _ => {
                        return Err(Error::consistency(format!(
                            "listener {} does not discover its routes over RDS",
                            self.listener.name
                        )));
                    }
                }
            }
        }

        Ok(())
    }

    /// Same resources regardless of version
    pub fn same_content(&self, other: &Snapshot) -> bool {
        self.clusters == other.clusters
            && self.route_configuration == other.route_configuration
            && self.listener == other.listener
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GatewayConfig;
    use crate::xds::cluster::ClusterSpec;
    use crate::xds::listener::ListenerBuilder;
    use envoy_types::pb::envoy::config::route::v3::{Route, RouteAction, VirtualHost};

    fn route_to(cluster: &str) -> Route {
        Route {
            name: "/pets-GET".into(),
            action: Some(route::Action::Route(RouteAction {
                cluster_specifier: Some(ClusterSpecifier::Cluster(cluster.into())),
                ..Default::default()
            })),
            ..Default::default()
        }
    }

    fn snapshot(cluster: &str, route_config_name: &str) -> Snapshot {
        let route_configuration = RouteConfiguration {
            name: route_config_name.into(),
            virtual_hosts: vec![VirtualHost {
                name: "*".into(),
                domains: vec!["*".into()],
                routes: vec![route_to(cluster)],
                ..Default::default()
            }],
            ..Default::default()
        };
        Snapshot::new(
            vec![ClusterSpec::plain("petstore", 80).to_envoy_cluster()],
            route_configuration,
            ListenerBuilder::new(&GatewayConfig::default()).build().unwrap(),
        )
    }

    #[test]
    fn consistent_snapshot_passes() {
        let snapshot = snapshot("petstore-80", "local_route");
        snapshot.check_consistency().unwrap();
        assert_eq!(snapshot.route_count(), 1);
        assert_eq!(snapshot.resources(CLUSTER_TYPE_URL).len(), 1);
        assert_eq!(snapshot.resources(ROUTE_TYPE_URL)[0].name, "local_route");
        assert_eq!(snapshot.resources(LISTENER_TYPE_URL)[0].name, "listener_0");
        assert!(snapshot.resources("type.googleapis.com/envoy.config.endpoint.v3.ClusterLoadAssignment").is_empty());
    }

    #[test]
    fn missing_cluster_is_inconsistent() {
        let err = snapshot("ghost-80", "local_route").check_consistency().unwrap_err();
        assert!(matches!(err, Error::Consistency(_)));
        assert!(err.to_string().contains("ghost-80"));
    }

    #[test]
    fn mismatched_route_configuration_is_inconsistent() {
        let err = snapshot("petstore-80", "other_route").check_consistency().unwrap_err();
        assert!(err.to_string().contains("other_route"));
    }

    #[test]
    fn versions_are_unique_and_ordered() {
        let first = snapshot("petstore-80", "local_route");
        let second = snapshot("petstore-80", "local_route");
        assert_ne!(first.version(), second.version());
        assert!(first.version() < second.version());
        assert!(first.same_content(&second));
    }
}
