//! Fleet identity
//!
//! A fleet is the group of proxy nodes that share one snapshot. Nodes report
//! it in the `cluster` field of their xDS node metadata, as `name.namespace`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Name/namespace pair identifying a fleet
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FleetId {
    pub name: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
}

fn default_namespace() -> String {
    "default".to_string()
}

impl FleetId {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self { name: name.into(), namespace: namespace.into() }
    }
}

impl fmt::Display for FleetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.name, self.namespace)
    }
}

impl FromStr for FleetId {
    type Err = crate::Error;

    /// Namespaces are DNS labels, so the last dot separates the two parts.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.rsplit_once('.') {
            Some((name, namespace)) if !name.is_empty() && !namespace.is_empty() => {
                Ok(Self::new(name, namespace))
            }
            _ => Err(crate::Error::config(format!(
                "fleet identifier '{}' must have the form name.namespace",
                s
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_and_parse_agree() {
        let fleet = FleetId::new("edge.gateway", "prod");
        assert_eq!(fleet.to_string(), "edge.gateway.prod");
        assert_eq!("edge.gateway.prod".parse::<FleetId>().unwrap(), fleet);
    }

    #[test]
    fn parse_rejects_missing_namespace() {
        assert!("fleet".parse::<FleetId>().is_err());
        assert!(".ns".parse::<FleetId>().is_err());
        assert!("name.".parse::<FleetId>().is_err());
    }

    #[test]
    fn namespace_defaults_when_omitted() {
        let fleet: FleetId = serde_yaml::from_str("name: default").unwrap();
        assert_eq!(fleet.to_string(), "default.default");
    }
}
