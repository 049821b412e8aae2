//! Fleet intent documents.
//!
//! A `FleetIntent` is everything needed to rebuild one fleet's configuration:
//! API intents (already extracted from annotated OpenAPI documents), static
//! route intents, listener TLS material and access log settings. The reconcile
//! loop that produces these values lives outside this crate; the binary reads
//! them from YAML files.

use super::FleetId;
use crate::errors::{Error, Result};
use crate::options::SubOptions;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// HTTP methods accepted as operation keys
pub const SUPPORTED_METHODS: &[&str] =
    &["GET", "PUT", "POST", "DELETE", "OPTIONS", "HEAD", "PATCH", "TRACE"];

/// Complete routing intent for one fleet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FleetIntent {
    pub fleet: FleetId,

    /// Evaluated in order; later APIs may not redefine a route of an earlier one
    #[serde(default)]
    pub apis: Vec<ApiIntent>,

    #[serde(default)]
    pub static_routes: Vec<StaticRouteIntent>,

    #[serde(default)]
    pub tls: Option<TlsIntent>,

    #[serde(default)]
    pub access_log: Option<AccessLogIntent>,
}

/// Routing intent derived from one OpenAPI document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApiIntent {
    pub name: String,

    #[serde(default = "default_hosts")]
    pub hosts: Vec<String>,

    /// Document-level options
    #[serde(default)]
    pub options: SubOptions,

    /// Serve the document itself at this path
    #[serde(default)]
    pub openapi_path: Option<String>,

    /// Raw document body returned on `openapi_path`
    #[serde(default)]
    pub openapi_document: Option<String>,

    #[serde(default)]
    /// Kept in document order
    pub paths: IndexMap<String, PathIntent>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PathIntent {
    pub options: SubOptions,
    /// Parameters shared by every operation of the path
    pub parameters: BTreeMap<String, ParamSchema>,
    /// Keyed by HTTP method, case-insensitive
    pub operations: IndexMap<String, OperationIntent>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OperationIntent {
    pub operation_id: String,
    pub parameters: BTreeMap<String, ParamSchema>,
    pub options: SubOptions,
}

/// Path parameter schema: only `type` and `enum` affect matching
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ParamSchema {
    #[serde(rename = "type")]
    pub param_type: Option<String>,

    #[serde(rename = "enum")]
    pub enum_values: Vec<serde_json::Value>,
}

impl ParamSchema {
    pub fn of_type(param_type: &str) -> Self {
        Self { param_type: Some(param_type.to_string()), enum_values: Vec::new() }
    }

    pub fn of_enum<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<serde_json::Value>,
    {
        Self { param_type: None, enum_values: values.into_iter().map(Into::into).collect() }
    }
}

/// Hand-written routes without an OpenAPI document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StaticRouteIntent {
    pub name: String,

    #[serde(default = "default_hosts")]
    pub hosts: Vec<String>,

    #[serde(default)]
    pub options: SubOptions,

    #[serde(default)]
    pub paths: IndexMap<String, StaticPathIntent>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StaticPathIntent {
    pub options: SubOptions,
    /// Keyed by HTTP method, case-insensitive
    pub methods: IndexMap<String, SubOptions>,
}

/// Listener TLS settings shared by every certificate's filter chain
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TlsIntent {
    pub cipher_suites: Vec<String>,
    pub tls_minimum_protocol_version: Option<String>,
    pub tls_maximum_protocol_version: Option<String>,
    pub certificates: Vec<CertificateIntent>,
}

/// PEM encoded certificate chain (leaf first) and private key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CertificateIntent {
    pub cert: String,
    pub key: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessLogFormat {
    #[default]
    Json,
    Text,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AccessLogIntent {
    pub format: AccessLogFormat,
    /// Format string for text logs
    pub text_template: Option<String>,
    /// Key to command-operator map for JSON logs
    pub json_template: Option<BTreeMap<String, String>>,
}

fn default_hosts() -> Vec<String> {
    vec!["*".to_string()]
}

impl FleetIntent {
    /// Parse a YAML intent document
    pub fn from_yaml(document: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(document)?)
    }

    /// Check hosts and methods across the document
    pub fn validate(&self) -> Result<()> {
        for api in &self.apis {
            api.hosts.iter().try_for_each(|h| validate_host(h))
                .map_err(|e| e.context(format!("api {}", api.name)))?;
            for (path, path_intent) in &api.paths {
                for method in path_intent.operations.keys() {
                    validate_method(method).map_err(|e| e.context(format!("api {} {}", api.name, path)))?;
                }
            }
        }

        for route in &self.static_routes {
            route.hosts.iter().try_for_each(|h| validate_host(h))
                .map_err(|e| e.context(format!("static route {}", route.name)))?;
            for (path, path_intent) in &route.paths {
                for method in path_intent.methods.keys() {
                    validate_method(method)
                        .map_err(|e| e.context(format!("static route {} {}", route.name, path)))?;
                }
            }
        }

        Ok(())
    }
}

/// Virtual host domain: `*`, a single leading or trailing wildcard, or a plain host name
pub fn validate_host(host: &str) -> Result<()> {
    let candidate = match host {
        "*" => return Ok(()),
        h if h.len() > 1 && h.starts_with('*') && h.ends_with('*') => {
            return Err(Error::policy(format!(
                "host '{}': wildcards are not supported on both the start and the end of hostname",
                host
            )))
        }
        h if h.starts_with('*') => format!("w{}", &h[1..]),
        h if h.ends_with('*') => format!("{}w", &h[..h.len() - 1]),
        h => h.to_string(),
    };

    let valid = !candidate.is_empty()
        && candidate.len() <= 253
        && candidate.split('.').all(|label| {
            !label.is_empty()
                && label.len() <= 63
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        });

    if valid {
        Ok(())
    } else {
        Err(Error::policy(format!("host '{}' is not a valid domain name", host)))
    }
}

fn validate_method(method: &str) -> Result<()> {
    if SUPPORTED_METHODS.contains(&method.to_ascii_uppercase().as_str()) {
        Ok(())
    } else {
        Err(Error::policy(format!("unsupported HTTP method '{}'", method)))
    }
}
