//! Route synthesis
//!
//! A [`RouteIntent`] becomes exactly one envoy route. The action is chosen by
//! a fixed priority: redirect, then mock, then validate-and-proxy, then a plain
//! proxy to the resolved upstream. Every action shares the same match
//! (compiled path plus `:method` header) and the same per-route CORS, cache
//! header and rate limit configuration.
//!
//! The synthesizer never touches an [`EnvoyConfiguration`](crate::xds::configuration::EnvoyConfiguration);
//! it returns the route together with the clusters it needs, and the caller
//! attaches both.

pub mod cors;
pub mod document;
pub mod methods;
pub mod rate_limit;
pub mod redirect;

use crate::config::AppConfig;
use crate::domain::{ProxiedService, RouteIntent};
use crate::errors::{Error, Result};
use crate::options::{
    EffectivePolicy, RateLimitSpec, RedirectOptions, RewriteRegex, RouteTarget, UpstreamTarget,
};
use crate::utils::hashing;
use crate::xds::cluster::{cluster_name, ClusterSpec};
use crate::xds::path_matcher::PathMatch;
use crate::xds::resources::{CORS_FILTER, LOCAL_RATE_LIMIT_FILTER};
use envoy_types::pb::envoy::config::core::v3::{
    header_value_option::HeaderAppendAction, HeaderValue, HeaderValueOption,
};
use envoy_types::pb::envoy::config::route::v3::{
    route, route_action::{ClusterSpecifier, UpgradeConfig}, RetryPolicy, Route,
    RouteAction as EnvoyRouteAction, RouteMatch,
};
use envoy_types::pb::envoy::r#type::matcher::v3::{RegexMatchAndSubstitute, RegexMatcher};
use envoy_types::pb::google::protobuf::{BoolValue, Duration, UInt32Value};

pub const MOCK_ID_HEADER: &str = "X-Gateway-Mock-ID";
pub const SERVICE_ID_HEADER: &str = "X-Gateway-Service-ID";
pub const OPERATION_ID_HEADER: &str = "X-Gateway-Operation-ID";

const CACHE_CONTROL_HEADER: &str = "Cache-Control";
const WEBSOCKET_UPGRADE: &str = "websocket";
const RETRY_ON: &str = "5xx";

/// A fixed `hostname:port` service the control plane routes to on behalf of a policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceEndpoint {
    pub hostname: String,
    pub port: u32,
}

impl ServiceEndpoint {
    pub fn new(hostname: impl Into<String>, port: u32) -> Self {
        Self { hostname: hostname.into(), port }
    }

    pub fn cluster_name(&self) -> String {
        cluster_name(&self.hostname, self.port)
    }

    fn cluster(&self) -> ClusterSpec {
        ClusterSpec::plain(self.hostname.clone(), self.port)
    }
}

/// The single action a synthesized route performs
#[derive(Debug, Clone, PartialEq)]
pub enum RouteAction {
    Redirect(RedirectOptions),
    Mock { mock_id: String },
    ValidateAndProxy { service_id: String, operation_id: String, upstream: UpstreamTarget },
    Proxy(UpstreamTarget),
}

impl RouteAction {
    /// Pick the action for a route. Redirect beats mock, mock beats validation.
    pub fn select(intent: &RouteIntent) -> Self {
        let policy = &intent.policy;
        match &policy.target {
            RouteTarget::Redirect(redirect) => RouteAction::Redirect(redirect.clone()),
            RouteTarget::Upstream(upstream) if !policy.mock && policy.validate_requests => {
                RouteAction::ValidateAndProxy {
                    service_id: hashing::service_id(&upstream.hostname, upstream.port),
                    operation_id: hashing::operation_id(&intent.method, &intent.declared_path),
                    upstream: upstream.clone(),
                }
            }
            RouteTarget::Upstream(upstream) if !policy.mock => RouteAction::Proxy(upstream.clone()),
            RouteTarget::Upstream(_) | RouteTarget::Mock => RouteAction::Mock {
                mock_id: hashing::mock_id(&intent.path, &intent.method, &intent.operation_id),
            },
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            RouteAction::Redirect(_) => "redirect",
            RouteAction::Mock { .. } => "mock",
            RouteAction::ValidateAndProxy { .. } => "validate",
            RouteAction::Proxy(_) => "proxy",
        }
    }
}

/// A built route plus what it requires from the surrounding configuration
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesizedRoute {
    pub action: RouteAction,
    pub route: Route,
    /// Clusters the route sends traffic to; empty for redirects
    pub clusters: Vec<ClusterSpec>,
    /// Upstream the validation proxy must learn about
    pub proxied_service: Option<ProxiedService>,
    rate_limit: Option<RateLimitSpec>,
    path: String,
    method: String,
    operation_id: String,
}

impl SynthesizedRoute {
    pub fn name(&self) -> &str {
        &self.route.name
    }

    /// The route as attached to one virtual host.
    ///
    /// Rate limit stat prefixes include the host, so each virtual host gets its
    /// own copy of the local rate limit config.
    pub fn for_vhost(&self, vhost: &str) -> Route {
        let mut route = self.route.clone();
        if let Some(spec) = &self.rate_limit {
            let prefix = rate_limit::stat_prefix(vhost, &self.path, &self.method, &self.operation_id);
            route
                .typed_per_filter_config
                .insert(LOCAL_RATE_LIMIT_FILTER.to_string(), rate_limit::rate_limit_per_route(spec, prefix));
        }
        route
    }
}

/// Builds envoy routes from route intents
#[derive(Debug, Clone)]
pub struct RouteSynthesizer {
    mock: ServiceEndpoint,
    validator: ServiceEndpoint,
}

impl RouteSynthesizer {
    pub fn new(mock: ServiceEndpoint, validator: ServiceEndpoint) -> Self {
        Self { mock, validator }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            ServiceEndpoint::new(config.mocking.host.clone(), u32::from(config.mocking.port)),
            ServiceEndpoint::new(config.validation.host.clone(), u32::from(config.validation.port)),
        )
    }

    pub fn synthesize(&self, intent: &RouteIntent) -> Result<SynthesizedRoute> {
        if intent.vhosts.is_empty() {
            return Err(Error::structural("route is not scoped to any virtual host")
                .context(intent.context()));
        }

        let policy = &intent.policy;
        let action = RouteAction::select(intent);

        let mut route = Route {
            name: intent.route_name(),
            r#match: Some(route_match(intent)),
            ..Default::default()
        };

        let mut clusters = Vec::new();
        let mut proxied_service = None;

        match &action {
            RouteAction::Redirect(redirect) => {
                route.action = Some(route::Action::Redirect(redirect::build_redirect(redirect)));
            }
            RouteAction::Mock { mock_id } => {
                route.request_headers_to_add.push(overwrite_header(MOCK_ID_HEADER, mock_id));
                route.action =
                    Some(route::Action::Route(forward(&self.mock.cluster_name(), policy, None, false)));
                clusters.push(self.mock.cluster());
            }
            RouteAction::ValidateAndProxy { service_id, operation_id, upstream } => {
                route.request_headers_to_add.push(overwrite_header(SERVICE_ID_HEADER, service_id));
                route.request_headers_to_add.push(overwrite_header(OPERATION_ID_HEADER, operation_id));
                route.action = Some(route::Action::Route(forward(
                    &self.validator.cluster_name(),
                    policy,
                    upstream.rewrite.as_ref(),
                    policy.websocket,
                )));
                clusters.push(self.validator.cluster());
                proxied_service = Some(ProxiedService {
                    id: service_id.clone(),
                    cluster_name: upstream.cluster_name(),
                    hostname: upstream.hostname.clone(),
                    port: upstream.port,
                });
            }
            RouteAction::Proxy(upstream) => {
                route.action = Some(route::Action::Route(forward(
                    &upstream.cluster_name(),
                    policy,
                    upstream.rewrite.as_ref(),
                    policy.websocket,
                )));
                clusters.push(ClusterSpec::for_upstream(upstream));
            }
        }

        if let Some(cors) = &policy.cors {
            route.typed_per_filter_config.insert(CORS_FILTER.to_string(), cors::cors_per_route(cors));
        }

        if let Some(max_age) = policy.cache_max_age {
            route
                .response_headers_to_add
                .push(overwrite_header(CACHE_CONTROL_HEADER, &format!("max-age={}", max_age)));
        }

        Ok(SynthesizedRoute {
            action,
            route,
            clusters,
            proxied_service,
            rate_limit: policy.rate_limit.clone(),
            path: intent.declared_path.clone(),
            method: intent.method.clone(),
            operation_id: intent.operation_id.clone(),
        })
    }
}

fn route_match(intent: &RouteIntent) -> RouteMatch {
    let path_specifier = PathMatch::compile(&intent.path, &intent.parameters).into_path_specifier();
    let headers = methods::method_matcher(&[intent.method.as_str()], intent.policy.cors.is_some())
        .into_iter()
        .collect();

    RouteMatch { path_specifier: Some(path_specifier), headers, ..Default::default() }
}

fn forward(
    cluster: &str,
    policy: &EffectivePolicy,
    rewrite: Option<&RewriteRegex>,
    websocket: bool,
) -> EnvoyRouteAction {
    let seconds = |value: Option<u32>| {
        value.filter(|v| *v != 0).map(|v| Duration { seconds: i64::from(v), nanos: 0 })
    };

    let mut action = EnvoyRouteAction {
        cluster_specifier: Some(ClusterSpecifier::Cluster(cluster.to_string())),
        timeout: seconds(policy.qos.request_timeout),
        idle_timeout: seconds(policy.qos.idle_timeout),
        regex_rewrite: rewrite.map(|rewrite| RegexMatchAndSubstitute {
            pattern: Some(RegexMatcher { regex: rewrite.pattern.clone(), ..Default::default() }),
            substitution: rewrite.substitution.clone(),
        }),
        ..Default::default()
    };

    if let Some(retries) = policy.qos.retries.filter(|r| *r != 0) {
        action.retry_policy = Some(RetryPolicy {
            retry_on: RETRY_ON.to_string(),
            num_retries: Some(UInt32Value { value: retries }),
            ..Default::default()
        });
    }

    if websocket {
        action.upgrade_configs.push(UpgradeConfig {
            upgrade_type: WEBSOCKET_UPGRADE.to_string(),
            enabled: Some(BoolValue { value: true }),
            ..Default::default()
        });
    }

    action
}

fn overwrite_header(key: &str, value: &str) -> HeaderValueOption {
    HeaderValueOption {
        header: Some(HeaderValue { key: key.to_string(), value: value.to_string(), ..Default::default() }),
        append_action: HeaderAppendAction::OverwriteIfExistsOrAdd as i32,
        ..Default::default()
    }
}
