//! Per-route CORS policy

use crate::options::CorsOptions;
use crate::xds::resources::{any_from_message, CORS_POLICY_TYPE_URL};
use envoy_types::pb::envoy::extensions::filters::http::cors::v3::CorsPolicy;
use envoy_types::pb::envoy::r#type::matcher::v3::string_matcher::MatchPattern;
use envoy_types::pb::envoy::r#type::matcher::v3::StringMatcher;
use envoy_types::pb::google::protobuf::{Any, BoolValue};

pub fn build_cors_policy(cors: &CorsOptions) -> CorsPolicy {
    CorsPolicy {
        allow_origin_string_match: cors
            .origins
            .iter()
            .map(|origin| StringMatcher {
                match_pattern: Some(MatchPattern::Exact(origin.clone())),
                ignore_case: false,
            })
            .collect(),
        allow_methods: cors.methods.join(","),
        allow_headers: cors.headers.join(","),
        expose_headers: cors.expose_headers.join(","),
        max_age: cors.max_age.map(|age| age.to_string()).unwrap_or_default(),
        allow_credentials: cors.credentials.map(|value| BoolValue { value }),
        ..Default::default()
    }
}

/// Typed per-filter config for the CORS HTTP filter
pub fn cors_per_route(cors: &CorsOptions) -> Any {
    any_from_message(CORS_POLICY_TYPE_URL, &build_cors_policy(cors))
}
