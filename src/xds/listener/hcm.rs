//! HTTP connection manager construction
//!
//! The router filter is terminal: at most one may be present and it always
//! stays last in the chain, whatever order filters are added in.

use crate::errors::{Error, Result};
use crate::xds::resources::{
    any_from_message, CORS_FILTER, CORS_TYPE_URL, LOCAL_RATE_LIMIT_FILTER, LOCAL_RATE_LIMIT_TYPE_URL,
    ROUTER_FILTER, ROUTER_TYPE_URL,
};
use envoy_types::pb::envoy::config::accesslog::v3::AccessLog;
use envoy_types::pb::envoy::config::core::v3::{
    config_source::ConfigSourceSpecifier, AggregatedConfigSource, ApiVersion, ConfigSource,
};
use envoy_types::pb::envoy::extensions::filters::http::cors::v3::Cors;
use envoy_types::pb::envoy::extensions::filters::http::local_ratelimit::v3::LocalRateLimit;
use envoy_types::pb::envoy::extensions::filters::http::router::v3::Router;
use envoy_types::pb::envoy::extensions::filters::network::http_connection_manager::v3::{
    http_connection_manager::{CodecType, RouteSpecifier},
    http_filter, HttpConnectionManager, HttpFilter, Rds,
};

const STAT_PREFIX: &str = "http";
const LOCAL_RATE_LIMIT_STAT_PREFIX: &str = "http_local_rate_limiter";

/// Route configuration delivered over the same aggregated stream as everything else
pub fn ads_config_source() -> ConfigSource {
    ConfigSource {
        config_source_specifier: Some(ConfigSourceSpecifier::Ads(AggregatedConfigSource::default())),
        resource_api_version: ApiVersion::V3 as i32,
        ..Default::default()
    }
}

pub fn is_router_filter(filter: &HttpFilter) -> bool {
    if filter.name == ROUTER_FILTER {
        return true;
    }
    matches!(
        &filter.config_type,
        Some(http_filter::ConfigType::TypedConfig(any)) if any.type_url == ROUTER_TYPE_URL
    )
}

fn typed_filter<M: prost::Message>(name: &str, type_url: &str, message: &M) -> HttpFilter {
    HttpFilter {
        name: name.to_string(),
        config_type: Some(http_filter::ConfigType::TypedConfig(any_from_message(type_url, message))),
        ..Default::default()
    }
}

#[derive(Debug, Clone)]
pub struct HcmBuilder {
    route_config_name: String,
    http_filters: Vec<HttpFilter>,
    access_log: Vec<AccessLog>,
}

impl HcmBuilder {
    /// Connection manager with the local rate limit, CORS and router filters installed
    pub fn new(route_config_name: impl Into<String>) -> Result<Self> {
        let mut builder = Self::empty(route_config_name);
        builder.add_filter(typed_filter(
            LOCAL_RATE_LIMIT_FILTER,
            LOCAL_RATE_LIMIT_TYPE_URL,
            &LocalRateLimit { stat_prefix: LOCAL_RATE_LIMIT_STAT_PREFIX.to_string(), ..Default::default() },
        ))?;
        builder.add_filter(typed_filter(CORS_FILTER, CORS_TYPE_URL, &Cors::default()))?;
        builder.add_filter(typed_filter(ROUTER_FILTER, ROUTER_TYPE_URL, &Router::default()))?;
        Ok(builder)
    }

    pub fn empty(route_config_name: impl Into<String>) -> Self {
        Self { route_config_name: route_config_name.into(), http_filters: Vec::new(), access_log: Vec::new() }
    }

    /// Append a filter, keeping the router last. A second router is rejected.
    pub fn add_filter(&mut self, filter: HttpFilter) -> Result<()> {
        let adding_router = is_router_filter(&filter);
        let existing_router = self.http_filters.iter().position(is_router_filter);

        match (existing_router, adding_router) {
            (Some(_), true) => Err(Error::structural(
                "cannot add more than one router to a filter chain",
            )),
            (Some(index), false) => {
                self.http_filters.insert(index, filter);
                Ok(())
            }
            (None, _) => {
                self.http_filters.push(filter);
                Ok(())
            }
        }
    }

    pub fn add_access_log(&mut self, access_log: AccessLog) -> &mut Self {
        self.access_log.push(access_log);
        self
    }

    pub fn filter_names(&self) -> Vec<&str> {
        self.http_filters.iter().map(|f| f.name.as_str()).collect()
    }

    pub fn build(&self) -> HttpConnectionManager {
        HttpConnectionManager {
            codec_type: CodecType::Auto as i32,
            stat_prefix: STAT_PREFIX.to_string(),
            route_specifier: Some(RouteSpecifier::Rds(Rds {
                config_source: Some(ads_config_source()),
                route_config_name: self.route_config_name.clone(),
            })),
            http_filters: self.http_filters.clone(),
            access_log: self.access_log.clone(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn named(name: &str) -> HttpFilter {
        HttpFilter { name: name.to_string(), ..Default::default() }
    }

    #[test]
    fn default_chain_ends_with_router() {
        let builder = HcmBuilder::new("local_route").unwrap();
        assert_eq!(
            builder.filter_names(),
            vec!["envoy.filters.http.local_ratelimit", "envoy.filters.http.cors", "envoy.filters.http.router"]
        );

        let hcm = builder.build();
        assert_eq!(hcm.stat_prefix, "http");
        assert_eq!(hcm.codec_type, CodecType::Auto as i32);
        let Some(RouteSpecifier::Rds(rds)) = hcm.route_specifier else {
            panic!("expected RDS");
        };
        assert_eq!(rds.route_config_name, "local_route");
        assert!(matches!(
            rds.config_source.unwrap().config_source_specifier,
            Some(ConfigSourceSpecifier::Ads(_))
        ));
    }

    #[test]
    fn filters_added_later_stay_before_router() {
        let mut builder = HcmBuilder::new("local_route").unwrap();
        builder.add_filter(named("envoy.filters.http.ext_authz")).unwrap();
        assert_eq!(builder.filter_names().last(), Some(&"envoy.filters.http.router"));
        assert_eq!(builder.filter_names()[2], "envoy.filters.http.ext_authz");
    }

    #[test]
    fn second_router_is_rejected() {
        let mut builder = HcmBuilder::new("local_route").unwrap();
        let err = builder.add_filter(named(ROUTER_FILTER)).unwrap_err();
        assert!(matches!(err, Error::Structural(_)));
    }

    #[test]
    fn router_detected_by_type_url() {
        let filter = HttpFilter {
            name: "custom-router".into(),
            config_type: Some(http_filter::ConfigType::TypedConfig(any_from_message(
                ROUTER_TYPE_URL,
                &Router::default(),
            ))),
            ..Default::default()
        };
        assert!(is_router_filter(&filter));
        assert!(!is_router_filter(&named("envoy.filters.http.cors")));
    }
}
