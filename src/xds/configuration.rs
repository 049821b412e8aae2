//! Per-rebuild configuration model
//!
//! `EnvoyConfiguration` accumulates virtual hosts, de-duplicated clusters and
//! the listener for one fleet during a single rebuild, then turns them into a
//! [`Snapshot`]. It is never reused across rebuilds.

use crate::errors::{Error, Result};
use crate::xds::cluster::ClusterSpec;
use crate::xds::snapshot::Snapshot;
use envoy_types::pb::envoy::config::cluster::v3::Cluster;
use envoy_types::pb::envoy::config::listener::v3::Listener;
use envoy_types::pb::envoy::config::route::v3::{
    route_match::PathSpecifier, Route, RouteConfiguration, VirtualHost as EnvoyVirtualHost,
};
use std::cmp::Reverse;
use std::collections::BTreeMap;
use tracing::debug;

/// A virtual host under construction. Route names are unique within it.
#[derive(Debug, Clone, PartialEq)]
pub struct VirtualHost {
    name: String,
    domains: Vec<String>,
    routes: Vec<Route>,
}

impl VirtualHost {
    /// Virtual host answering for a single domain pattern
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self { domains: vec![name.clone()], name, routes: Vec::new() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn add_route(&mut self, route: Route) -> Result<()> {
        if self.routes.iter().any(|existing| existing.name == route.name) {
            return Err(Error::structural(format!(
                "can't add route {} to vhost {}: route with this name already exists",
                route.name, self.name
            )));
        }
        self.routes.push(route);
        Ok(())
    }

    fn into_envoy(self) -> EnvoyVirtualHost {
        EnvoyVirtualHost {
            name: self.name,
            domains: self.domains,
            routes: order_routes(self.routes),
            ..Default::default()
        }
    }
}

fn specificity(route: &Route) -> (u8, Reverse<usize>) {
    match route.r#match.as_ref().and_then(|m| m.path_specifier.as_ref()) {
        Some(PathSpecifier::Path(_)) => (0, Reverse(0)),
        Some(PathSpecifier::SafeRegex(regex)) => (1, Reverse(regex.regex.len())),
        Some(PathSpecifier::Prefix(prefix)) => (2, Reverse(prefix.len())),
        _ => (3, Reverse(0)),
    }
}

/// Order routes for first-match-wins evaluation.
///
/// Exact paths first in their original order, then regexes by descending
/// source length, then prefixes by descending length. The sort is stable.
pub fn order_routes(mut routes: Vec<Route>) -> Vec<Route> {
    routes.sort_by_key(specificity);
    routes
}

#[derive(Debug, Clone)]
pub struct EnvoyConfiguration {
    route_config_name: String,
    vhosts: BTreeMap<String, VirtualHost>,
    clusters: BTreeMap<String, Cluster>,
    listener: Option<Listener>,
}

impl EnvoyConfiguration {
    pub fn new(route_config_name: impl Into<String>) -> Self {
        Self {
            route_config_name: route_config_name.into(),
            vhosts: BTreeMap::new(),
            clusters: BTreeMap::new(),
            listener: None,
        }
    }

    pub fn add_listener(&mut self, listener: Listener) {
        self.listener = Some(listener);
    }

    /// No-op when a virtual host with this name already exists
    pub fn add_virtual_host(&mut self, name: &str) {
        self.vhosts.entry(name.to_string()).or_insert_with(|| VirtualHost::new(name));
    }

    pub fn virtual_host(&self, name: &str) -> Option<&VirtualHost> {
        self.vhosts.get(name)
    }

    pub fn add_route_to_vhost(&mut self, vhost: &str, route: Route) -> Result<()> {
        let virtual_host = self.vhosts.get_mut(vhost).ok_or_else(|| {
            Error::structural(format!("envoy configuration doesn't have virtual host {}", vhost))
        })?;
        virtual_host.add_route(route)
    }

    pub fn cluster_exists(&self, name: &str) -> bool {
        self.clusters.contains_key(name)
    }

    /// Insert or replace the cluster with the spec's name
    pub fn add_cluster(&mut self, spec: &ClusterSpec) {
        self.clusters.insert(spec.name.clone(), spec.to_envoy_cluster());
    }

    pub fn cluster_count(&self) -> usize {
        self.clusters.len()
    }

    /// Order every virtual host's routes and bundle everything into a snapshot.
    ///
    /// The snapshot is checked for consistency before it is returned.
    pub fn generate_snapshot(self) -> Result<Snapshot> {
        let listener = self
            .listener
            .ok_or_else(|| Error::structural("envoy configuration has no listener"))?;

        let route_configuration = RouteConfiguration {
            name: self.route_config_name,
            virtual_hosts: self.vhosts.into_values().map(VirtualHost::into_envoy).collect(),
            ..Default::default()
        };

        let snapshot = Snapshot::new(self.clusters.into_values().collect(), route_configuration, listener);
        snapshot.check_consistency()?;

        debug!(
            version = %snapshot.version(),
            clusters = snapshot.clusters().len(),
            routes = snapshot.route_count(),
            "Generated snapshot"
        );
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GatewayConfig;
    use crate::xds::listener::ListenerBuilder;
    use envoy_types::pb::envoy::config::route::v3::RouteMatch;
    use envoy_types::pb::envoy::r#type::matcher::v3::RegexMatcher;
    use proptest::prelude::*;

    fn route(name: &str, specifier: PathSpecifier) -> Route {
        Route {
            name: name.to_string(),
            r#match: Some(RouteMatch { path_specifier: Some(specifier), ..Default::default() }),
            ..Default::default()
        }
    }

    fn regex(source: &str) -> PathSpecifier {
        PathSpecifier::SafeRegex(RegexMatcher { regex: source.to_string(), ..Default::default() })
    }

    fn names(routes: &[Route]) -> Vec<&str> {
        routes.iter().map(|r| r.name.as_str()).collect()
    }

    #[test]
    fn orders_exact_then_regex_then_prefix() {
        let ordered = order_routes(vec![
            route("prefix-short", PathSpecifier::Prefix("/a/".into())),
            route("regex-short", regex("/p/([0-9]+)")),
            route("exact-1", PathSpecifier::Path("/pets".into())),
            route("prefix-long", PathSpecifier::Prefix("/a/b/c/".into())),
            route("regex-long", regex("/pets/([0-9]+)/toys")),
            route("exact-2", PathSpecifier::Path("/a".into())),
        ]);

        assert_eq!(
            names(&ordered),
            vec!["exact-1", "exact-2", "regex-long", "regex-short", "prefix-long", "prefix-short"]
        );
    }

    #[test]
    fn duplicate_route_name_is_rejected() {
        let mut config = EnvoyConfiguration::new("local_route");
        config.add_virtual_host("*");
        config.add_route_to_vhost("*", route("/pets-GET", PathSpecifier::Path("/pets".into()))).unwrap();

        let err = config
            .add_route_to_vhost("*", route("/pets-GET", PathSpecifier::Path("/pets".into())))
            .unwrap_err();
        assert!(matches!(err, Error::Structural(_)));
        assert_eq!(config.virtual_host("*").unwrap().routes().len(), 1);
    }

    #[test]
    fn unknown_vhost_is_rejected() {
        let mut config = EnvoyConfiguration::new("local_route");
        let err = config
            .add_route_to_vhost("api.example.com", route("/pets-GET", PathSpecifier::Path("/pets".into())))
            .unwrap_err();
        assert!(err.to_string().contains("api.example.com"));
    }

    #[test]
    fn adding_existing_vhost_keeps_its_routes() {
        let mut config = EnvoyConfiguration::new("local_route");
        config.add_virtual_host("*");
        config.add_route_to_vhost("*", route("/pets-GET", PathSpecifier::Path("/pets".into()))).unwrap();
        config.add_virtual_host("*");
        assert_eq!(config.virtual_host("*").unwrap().routes().len(), 1);
    }

    #[test]
    fn clusters_are_deduplicated_by_name() {
        let mut config = EnvoyConfiguration::new("local_route");
        config.add_cluster(&ClusterSpec::plain("petstore", 80));
        config.add_cluster(&ClusterSpec::plain("petstore", 80));
        config.add_cluster(&ClusterSpec::plain("petstore", 8080));
        assert!(config.cluster_exists("petstore-80"));
        assert_eq!(config.cluster_count(), 2);
    }

    #[test]
    fn snapshot_requires_listener() {
        let err = EnvoyConfiguration::new("local_route").generate_snapshot().unwrap_err();
        assert!(matches!(err, Error::Structural(_)));
    }

    #[test]
    fn snapshot_orders_routes() {
        let mut config = EnvoyConfiguration::new("local_route");
        config.add_listener(ListenerBuilder::new(&GatewayConfig::default()).build().unwrap());
        config.add_virtual_host("*");
        config.add_route_to_vhost("*", route("prefix", PathSpecifier::Prefix("/".into()))).unwrap();
        config.add_route_to_vhost("*", route("exact", PathSpecifier::Path("/pets".into()))).unwrap();

        let snapshot = config.generate_snapshot().unwrap();
        let vhost = &snapshot.route_configuration().virtual_hosts[0];
        assert_eq!(vhost.domains, vec!["*".to_string()]);
        assert_eq!(names(&vhost.routes), vec!["exact", "prefix"]);
    }

    fn any_specifier() -> impl Strategy<Value = PathSpecifier> {
        prop_oneof![
            "/[a-z]{0,12}".prop_map(PathSpecifier::Path),
            "/[a-z]{0,12}".prop_map(|s| regex(&s)),
            "/[a-z]{0,12}/".prop_map(PathSpecifier::Prefix),
        ]
    }

    proptest! {
        #[test]
        fn ordering_invariant_holds(specifiers in prop::collection::vec(any_specifier(), 0..40)) {
            let routes: Vec<Route> = specifiers
                .into_iter()
                .enumerate()
                .map(|(i, s)| route(&i.to_string(), s))
                .collect();
            let exact_before: Vec<String> = routes
                .iter()
                .filter(|r| specificity(r).0 == 0)
                .map(|r| r.name.clone())
                .collect();

            let ordered = order_routes(routes);

            for pair in ordered.windows(2) {
                prop_assert!(specificity(&pair[0]) <= specificity(&pair[1]));
            }
            let exact_after: Vec<String> = ordered
                .iter()
                .filter(|r| specificity(r).0 == 0)
                .map(|r| r.name.clone())
                .collect();
            prop_assert_eq!(exact_before, exact_after);
        }
    }
}
