//! Per-route intent produced on every rebuild.

use super::ParamSchema;
use crate::options::EffectivePolicy;
use std::collections::BTreeMap;

/// One path+method with its merged policy and the virtual hosts it is scoped to
#[derive(Debug, Clone, PartialEq)]
pub struct RouteIntent {
    /// Owning API or static route, for error context
    pub source: String,
    /// Path template as matched, including any configured prefix
    pub path: String,
    /// Path template as declared in the document
    pub declared_path: String,
    /// Upper-case HTTP method
    pub method: String,
    pub operation_id: String,
    pub parameters: BTreeMap<String, ParamSchema>,
    pub vhosts: Vec<String>,
    pub policy: EffectivePolicy,
}

impl RouteIntent {
    /// Route names are unique per virtual host
    pub fn route_name(&self) -> String {
        route_name(&self.path, &self.method)
    }

    /// Human-readable location used to wrap errors
    pub fn context(&self) -> String {
        format!("{} {} {}", self.source, self.path, self.method)
    }
}

/// `path-METHOD`
pub fn route_name(path: &str, method: &str) -> String {
    format!("{}-{}", path, method.to_ascii_uppercase())
}

/// Join a path prefix and a path without doubling or dropping the separator
pub fn join_route_path(prefix: Option<&str>, path: &str) -> String {
    match prefix {
        None | Some("") => path.to_string(),
        Some(prefix) => format!("{}/{}", prefix.trim_end_matches('/'), path.trim_start_matches('/')),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn route_names_uppercase_the_method() {
        assert_eq!(route_name("/pets", "get"), "/pets-GET");
    }

    #[test]
    fn joins_prefix_and_path() {
        assert_eq!(join_route_path(None, "/pets"), "/pets");
        assert_eq!(join_route_path(Some("/api/"), "/pets"), "/api/pets");
        assert_eq!(join_route_path(Some("/api"), "pets/"), "/api/pets/");
        assert_eq!(join_route_path(Some(""), "/pets"), "/pets");
    }
}
