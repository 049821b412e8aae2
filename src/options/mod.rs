//! Routing options
//!
//! `SubOptions` is the partially populated option block that may appear at the
//! global, path and operation level of an API intent (and at the global, path
//! and method level of a static route). Every field is optional so that a
//! lower level can leave it to be inherited.
//!
//! - `merge`: the three-tier override merge
//! - `policy`: validation and conversion into an [`EffectivePolicy`]
//! - `resolver`: [`PolicyResolver`], merge then validate per operation

pub mod merge;
pub mod policy;
pub mod resolver;

pub use merge::{merge, resolve};
pub use policy::{EffectivePolicy, RateLimitSpec, RouteTarget, UpstreamTarget};
pub use resolver::PolicyResolver;

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Option block attachable at every level of the intent hierarchy
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default, deny_unknown_fields)]
pub struct SubOptions {
    /// Exclude the path/operation from the generated configuration
    pub disabled: Option<bool>,

    #[validate(nested)]
    pub upstream: Option<UpstreamOptions>,

    #[validate(nested)]
    pub redirect: Option<RedirectOptions>,

    #[validate(nested)]
    pub path: Option<PathOptions>,

    #[validate(nested)]
    pub qos: Option<QosOptions>,

    #[validate(nested)]
    pub cors: Option<CorsOptions>,

    /// Allow websocket upgrades on proxied routes
    pub websocket: Option<bool>,

    pub validation: Option<ValidationOptions>,

    pub mocking: Option<MockingOptions>,

    #[validate(nested)]
    pub rate_limit: Option<RateLimitOptions>,

    pub cache: Option<CacheOptions>,

    pub auth: Option<AuthOptions>,
}

/// Where proxied traffic goes. Exactly one of `host` or `service` must be set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default, deny_unknown_fields)]
pub struct UpstreamOptions {
    #[validate(nested)]
    pub host: Option<UpstreamHost>,

    #[validate(nested)]
    pub service: Option<UpstreamService>,

    /// Regex rewrite applied to the path before proxying
    pub rewrite: Option<RewriteRegex>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct UpstreamHost {
    #[validate(length(min = 1, message = "upstream hostname cannot be empty"))]
    pub hostname: String,

    #[validate(range(min = 1, max = 65535, message = "upstream port must be between 1 and 65535"))]
    pub port: u32,

    /// Originate TLS to the upstream with SNI taken from the request
    #[serde(default)]
    pub tls: bool,
}

/// In-cluster service, addressed as `name.namespace.svc.cluster.local.`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct UpstreamService {
    #[validate(length(min = 1, message = "upstream service name cannot be empty"))]
    pub name: String,

    #[serde(default = "default_namespace")]
    pub namespace: String,

    #[serde(default = "default_service_port")]
    #[validate(range(min = 1, max = 65535, message = "upstream port must be between 1 and 65535"))]
    pub port: u32,
}

fn default_namespace() -> String {
    "default".to_string()
}

fn default_service_port() -> u32 {
    80
}

/// RE2 pattern plus substitution
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RewriteRegex {
    pub pattern: String,
    #[serde(default)]
    pub substitution: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default, deny_unknown_fields)]
pub struct RedirectOptions {
    /// `http` or `https`
    pub scheme_redirect: Option<String>,
    pub host_redirect: Option<String>,
    #[validate(range(min = 1, max = 65535, message = "redirect port must be between 1 and 65535"))]
    pub port_redirect: Option<u32>,
    /// Replaces the whole path; exclusive with `rewrite_regex`
    pub path_redirect: Option<String>,
    pub rewrite_regex: Option<RewriteRegex>,
    /// 301, 302, 303, 307 or 308
    pub response_code: Option<u32>,
    pub strip_query: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default, deny_unknown_fields)]
pub struct PathOptions {
    /// Prepended to every path of the API
    #[validate(custom(function = "validate_path_prefix"))]
    pub prefix: Option<String>,
}

fn validate_path_prefix(prefix: &str) -> Result<(), validator::ValidationError> {
    if prefix.is_empty() || prefix.starts_with('/') {
        Ok(())
    } else {
        let mut error = validator::ValidationError::new("path_prefix");
        error.message = Some("path prefix must begin with /".into());
        Err(error)
    }
}

/// Timeouts and retries. Zero counts as unset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default, deny_unknown_fields)]
pub struct QosOptions {
    #[validate(range(max = 255, message = "retries must be at most 255"))]
    pub retries: Option<u32>,
    /// Seconds
    pub request_timeout: Option<u32>,
    /// Seconds
    pub idle_timeout: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default, deny_unknown_fields)]
pub struct CorsOptions {
    /// Exact origins allowed
    pub origins: Vec<String>,
    pub methods: Vec<String>,
    pub headers: Vec<String>,
    pub expose_headers: Vec<String>,
    pub credentials: Option<bool>,
    #[validate(range(min = 0, message = "CORS max_age must not be negative"))]
    pub max_age: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ValidationOptions {
    pub request: Option<RequestValidationOptions>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RequestValidationOptions {
    pub enabled: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MockingOptions {
    pub enabled: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default, deny_unknown_fields)]
pub struct RateLimitOptions {
    #[validate(range(min = 1, message = "rate limit requests_per_unit must be at least 1"))]
    pub requests_per_unit: u32,
    /// `second`, `minute` or `hour`
    pub unit: String,
    /// Count per downstream connection instead of per proxy instance
    pub per_connection: bool,
    /// Status returned when limited, 429 by default
    pub response_code: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheOptions {
    pub enabled: Option<bool>,
    /// Seconds
    pub max_age: u32,
}

/// External authorization. Carried through merging and validation; the
/// generated configuration does not act on it yet.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuthOptions {
    pub scheme: String,
    pub path_prefix: Option<String>,
    pub auth_upstream: Option<AuthUpstream>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuthUpstream {
    pub host: Option<UpstreamHost>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_nested_options() {
        let yaml = r#"
upstream:
  service:
    name: petstore
qos:
  retries: 3
  request_timeout: 10
cors:
  origins: ["https://example.com"]
  methods: [GET, POST]
  max_age: 86400
rate_limit:
  requests_per_unit: 10
  unit: minute
"#;
        let options: SubOptions = serde_yaml::from_str(yaml).unwrap();
        let service = options.upstream.unwrap().service.unwrap();
        assert_eq!(service.namespace, "default");
        assert_eq!(service.port, 80);
        assert_eq!(options.qos.unwrap().retries, Some(3));
        assert_eq!(options.rate_limit.unwrap().unit, "minute");
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let result = serde_yaml::from_str::<SubOptions>("upstreams: {}");
        assert!(result.is_err());
    }

    #[test]
    fn derive_validation_catches_ranges() {
        let options = SubOptions {
            qos: Some(QosOptions { retries: Some(300), ..Default::default() }),
            path: Some(PathOptions { prefix: Some("api".into()) }),
            ..Default::default()
        };
        let errors = Validate::validate(&options).unwrap_err();
        let rendered = errors.to_string();
        assert!(rendered.contains("retries must be at most 255"));
        assert!(rendered.contains("path prefix must begin with /"));
    }
}
