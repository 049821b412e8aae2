//! Per-route local rate limiting

use crate::options::policy::RateLimitSpec;
use crate::xds::resources::{any_from_message, LOCAL_RATE_LIMIT_TYPE_URL};
use envoy_types::pb::envoy::config::core::v3::RuntimeFractionalPercent;
use envoy_types::pb::envoy::extensions::filters::http::local_ratelimit::v3::LocalRateLimit;
use envoy_types::pb::envoy::r#type::v3::{fractional_percent, FractionalPercent, HttpStatus, TokenBucket};
use envoy_types::pb::google::protobuf::{Any, Duration as ProtoDuration, UInt32Value};

const ENABLED_RUNTIME_KEY: &str = "local_rate_limit_enabled";
const ENFORCED_RUNTIME_KEY: &str = "local_rate_limit_enforced";

/// Stat prefix identifying the limited route
pub fn stat_prefix(host: &str, path: &str, method: &str, operation_id: &str) -> String {
    format!("{}-{}-{}-{}", host, path, method, operation_id)
}

fn fully_enabled(runtime_key: &str) -> RuntimeFractionalPercent {
    RuntimeFractionalPercent {
        runtime_key: runtime_key.to_string(),
        default_value: Some(FractionalPercent {
            numerator: 100,
            denominator: fractional_percent::DenominatorType::Hundred as i32,
        }),
    }
}

pub fn build_local_rate_limit(spec: &RateLimitSpec, stat_prefix: String) -> LocalRateLimit {
    LocalRateLimit {
        stat_prefix,
        status: Some(HttpStatus { code: spec.status_code as i32 }),
        token_bucket: Some(TokenBucket {
            max_tokens: spec.requests_per_unit,
            tokens_per_fill: Some(UInt32Value { value: spec.requests_per_unit }),
            fill_interval: Some(ProtoDuration { seconds: spec.fill_interval_seconds, nanos: 0 }),
        }),
        filter_enabled: Some(fully_enabled(ENABLED_RUNTIME_KEY)),
        filter_enforced: Some(fully_enabled(ENFORCED_RUNTIME_KEY)),
        local_rate_limit_per_downstream_connection: spec.per_connection,
        ..Default::default()
    }
}

/// Typed per-filter config for the local rate limit HTTP filter
pub fn rate_limit_per_route(spec: &RateLimitSpec, stat_prefix: String) -> Any {
    any_from_message(LOCAL_RATE_LIMIT_TYPE_URL, &build_local_rate_limit(spec, stat_prefix))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_bucket_refills_per_unit() {
        let spec = RateLimitSpec {
            requests_per_unit: 10,
            fill_interval_seconds: 60,
            per_connection: true,
            status_code: 429,
        };
        let limit = build_local_rate_limit(&spec, stat_prefix("*", "/pets", "GET", "listPets"));

        assert_eq!(limit.stat_prefix, "*-/pets-GET-listPets");
        let bucket = limit.token_bucket.unwrap();
        assert_eq!(bucket.max_tokens, 10);
        assert_eq!(bucket.tokens_per_fill, Some(UInt32Value { value: 10 }));
        assert_eq!(bucket.fill_interval.unwrap().seconds, 60);
        assert_eq!(limit.status.unwrap().code, 429);
        assert!(limit.local_rate_limit_per_downstream_connection);

        let enabled = limit.filter_enabled.unwrap();
        assert_eq!(enabled.runtime_key, "local_rate_limit_enabled");
        assert_eq!(enabled.default_value.unwrap().numerator, 100);
        assert_eq!(limit.filter_enforced.unwrap().runtime_key, "local_rate_limit_enforced");
    }
}
