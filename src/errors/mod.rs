//! # Error Handling
//!
//! Error taxonomy for the fleetplane control plane, built on `thiserror`.
//!
//! Rebuild failures fall into three fatal categories (policy, structural and
//! consistency) that abort a whole rebuild cycle before anything is applied.
//! Distribution failures happen after a snapshot is already active and are
//! reported without rolling it back.

/// Custom result type for fleetplane operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the fleetplane control plane
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Malformed or contradictory routing options
    #[error("Policy error: {message}{}", at(.context))]
    Policy {
        message: String,
        /// Where the policy came from, e.g. `petstore /pets GET`
        context: Option<String>,
    },

    /// Model construction errors: duplicate routes, unknown virtual hosts,
    /// unresolvable upstreams, unusable certificate material
    #[error("Structural error: {0}")]
    Structural(String),

    /// A generated snapshot is not internally consistent
    #[error("Consistency error: {0}")]
    Consistency(String),

    /// A valid snapshot could not be delivered to one or more nodes
    #[error("Failed to distribute snapshot for fleet {fleet}: {failures}")]
    Distribution { fleet: String, failures: String },

    /// No configuration has been applied for the fleet yet
    #[error("no such {0} Envoy fleet configuration exist")]
    UnknownFleet(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Network transport errors (gRPC)
    #[error("Transport error: {0}")]
    Transport(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Internal server errors
    #[error("Internal error: {0}")]
    Internal(String),
}

fn at(context: &Option<String>) -> String {
    context.as_ref().map(|c| format!(" (at {c})")).unwrap_or_default()
}

impl Error {
    /// Create a new policy error
    pub fn policy<S: Into<String>>(message: S) -> Self {
        Self::Policy { message: message.into(), context: None }
    }

    /// Create a policy error tagged with the route it came from
    pub fn policy_at<S: Into<String>, C: Into<String>>(message: S, context: C) -> Self {
        Self::Policy { message: message.into(), context: Some(context.into()) }
    }

    /// Create a new structural error
    pub fn structural<S: Into<String>>(message: S) -> Self {
        Self::Structural(message.into())
    }

    /// Create a new consistency error
    pub fn consistency<S: Into<String>>(message: S) -> Self {
        Self::Consistency(message.into())
    }

    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config(message.into())
    }

    /// Create a new transport error
    pub fn transport<S: Into<String>>(message: S) -> Self {
        Self::Transport(message.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal(message.into())
    }

    /// Prefix the error message with additional context.
    ///
    /// Only the message-carrying variants are rewritten; the rest pass through.
    pub fn context<S: AsRef<str>>(self, context: S) -> Self {
        let context = context.as_ref();
        match self {
            Self::Policy { message, context: inner } => Self::Policy {
                message,
                context: Some(match inner {
                    Some(inner) => format!("{context}: {inner}"),
                    None => context.to_string(),
                }),
            },
            Self::Structural(message) => Self::Structural(format!("{context}: {message}")),
            Self::Consistency(message) => Self::Consistency(format!("{context}: {message}")),
            Self::Internal(message) => Self::Internal(format!("{context}: {message}")),
            other => other,
        }
    }

    /// Policy, structural and consistency errors abort a rebuild before apply.
    pub fn is_fatal_for_rebuild(&self) -> bool {
        matches!(self, Self::Policy { .. } | Self::Structural(_) | Self::Consistency(_))
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(error: serde_yaml::Error) -> Self {
        Self::Serialization(format!("YAML: {error}"))
    }
}

impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization(format!("JSON: {error}"))
    }
}

impl From<prost::DecodeError> for Error {
    fn from(error: prost::DecodeError) -> Self {
        Self::Serialization(format!("protobuf decode: {error}"))
    }
}

impl From<config::ConfigError> for Error {
    fn from(error: config::ConfigError) -> Self {
        Self::Config(format!("Configuration loading failed: {error}"))
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut messages = Vec::new();
        collect_validation_messages("", &errors, &mut messages);
        Self::Config(format!("Validation failed: {}", messages.join("; ")))
    }
}

/// Flatten nested validation errors into `path.to.field: message` entries
fn collect_validation_messages(prefix: &str, errors: &validator::ValidationErrors, out: &mut Vec<String>) {
    use validator::ValidationErrorsKind;

    let mut fields: Vec<_> = errors.errors().iter().collect();
    fields.sort_by(|a, b| a.0.cmp(b.0));

    for (field, kind) in fields {
        let path = if prefix.is_empty() { field.to_string() } else { format!("{prefix}.{field}") };
        match kind {
            ValidationErrorsKind::Field(field_errors) => {
                let rendered: Vec<String> = field_errors
                    .iter()
                    .map(|e| e.message.as_ref().map_or("invalid value".to_string(), |m| m.to_string()))
                    .collect();
                out.push(format!("{}: {}", path, rendered.join(", ")));
            }
            ValidationErrorsKind::Struct(nested) => collect_validation_messages(&path, nested, out),
            ValidationErrorsKind::List(items) => {
                for (index, nested) in items {
                    collect_validation_messages(&format!("{path}[{index}]"), nested, out);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = Error::structural("can't add route /pets-GET to vhost *");
        assert_eq!(error.to_string(), "Structural error: can't add route /pets-GET to vhost *");

        let error = Error::UnknownFleet("default.default".into());
        assert_eq!(error.to_string(), "no such default.default Envoy fleet configuration exist");
    }

    #[test]
    fn test_policy_context() {
        let error = Error::policy("redirect code 305 is not supported").context("petstore /pets GET");
        match error {
            Error::Policy { ref context, .. } => {
                assert_eq!(context.as_deref(), Some("petstore /pets GET"))
            }
            ref other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(error.to_string(), "Policy error: redirect code 305 is not supported (at petstore /pets GET)");
    }

    #[test]
    fn test_rebuild_fatality() {
        assert!(Error::policy("bad").is_fatal_for_rebuild());
        assert!(Error::structural("bad").is_fatal_for_rebuild());
        assert!(Error::consistency("bad").is_fatal_for_rebuild());
        assert!(!Error::Distribution { fleet: "f.ns".into(), failures: "node".into() }
            .is_fatal_for_rebuild());
    }

    #[test]
    fn test_error_conversions() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let error: Error = io_error.into();
        assert!(matches!(error, Error::Io(_)));

        let yaml_error = serde_yaml::from_str::<Vec<String>>("{").unwrap_err();
        let error: Error = yaml_error.into();
        assert!(matches!(error, Error::Serialization(_)));
    }

    #[test]
    fn test_nested_validation_messages_are_flattened() {
        let mut config = crate::config::AppConfig::default();
        config.gateway.listener_port = 0;
        let error = Error::from(validator::Validate::validate(&config).unwrap_err());
        assert_eq!(
            error.to_string(),
            "Configuration error: Validation failed: gateway.listener_port: Port must be between 1 and 65535"
        );
    }
}
