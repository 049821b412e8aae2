//! Path template compilation.
//!
//! `/pets/{id}` style templates become RE2 regex matches, templates ending in
//! `/` become prefix matches and everything else matches exactly.

use crate::domain::ParamSchema;
use envoy_types::pb::envoy::config::route::v3::route_match::PathSpecifier;
use envoy_types::pb::envoy::r#type::matcher::v3::RegexMatcher;
use regex::{Captures, Regex};
use std::collections::BTreeMap;
use std::sync::LazyLock;

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([A-Za-z0-9_.-]+)\}").expect("placeholder pattern is valid"));

const STRING_CLASS: &str = "([.a-zA-Z0-9-]+)";
const INTEGER_CLASS: &str = "([0-9]+)";
const NUMBER_CLASS: &str = "([0-9]*[.])?[0-9]+";

/// Compiled match predicate for a route path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathMatch {
    Exact(String),
    Prefix(String),
    Regex(String),
}

impl PathMatch {
    /// Compile a template using the declared parameter schemas.
    ///
    /// Parameters with an absent or unrecognised type match as strings.
    pub fn compile(template: &str, parameters: &BTreeMap<String, ParamSchema>) -> Self {
        if PLACEHOLDER.is_match(template) {
            let regex = PLACEHOLDER.replace_all(template, |caps: &Captures<'_>| {
                parameter_pattern(parameters.get(&caps[1]))
            });
            return PathMatch::Regex(regex.into_owned());
        }

        if template.ends_with('/') {
            PathMatch::Prefix(template.to_string())
        } else {
            PathMatch::Exact(template.to_string())
        }
    }

    pub fn into_path_specifier(self) -> PathSpecifier {
        match self {
            PathMatch::Exact(path) => PathSpecifier::Path(path),
            PathMatch::Prefix(prefix) => PathSpecifier::Prefix(prefix),
            PathMatch::Regex(regex) => {
                PathSpecifier::SafeRegex(RegexMatcher { regex, ..Default::default() })
            }
        }
    }
}

fn parameter_pattern(schema: Option<&ParamSchema>) -> String {
    let Some(schema) = schema else {
        return STRING_CLASS.to_string();
    };

    if !schema.enum_values.is_empty() {
        let alternatives: Vec<String> = schema
            .enum_values
            .iter()
            .map(|value| match value {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect();
        return format!("({})", alternatives.join("|"));
    }

    match schema.param_type.as_deref() {
        Some("integer") => INTEGER_CLASS.to_string(),
        Some("number") => NUMBER_CLASS.to_string(),
        _ => STRING_CLASS.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn params(entries: &[(&str, ParamSchema)]) -> BTreeMap<String, ParamSchema> {
        entries.iter().map(|(name, schema)| (name.to_string(), schema.clone())).collect()
    }

    #[test]
    fn integer_parameter() {
        let compiled = PathMatch::compile("/pets/{id}", &params(&[("id", ParamSchema::of_type("integer"))]));
        assert_eq!(compiled, PathMatch::Regex("/pets/([0-9]+)".into()));
    }

    #[test]
    fn enum_parameter() {
        let compiled = PathMatch::compile(
            "/pets/{status}",
            &params(&[("status", ParamSchema::of_enum(["available", "sold"]))]),
        );
        assert_eq!(compiled, PathMatch::Regex("/pets/(available|sold)".into()));
    }

    #[test]
    fn non_string_enum_values_are_stringified() {
        let compiled = PathMatch::compile(
            "/v/{version}",
            &params(&[("version", ParamSchema::of_enum([serde_json::json!(1), serde_json::json!(2)]))]),
        );
        assert_eq!(compiled, PathMatch::Regex("/v/(1|2)".into()));
    }

    #[test]
    fn number_and_string_parameters() {
        let compiled = PathMatch::compile(
            "/items/{name}/price/{amount}",
            &params(&[
                ("name", ParamSchema::of_type("string")),
                ("amount", ParamSchema::of_type("number")),
            ]),
        );
        assert_eq!(
            compiled,
            PathMatch::Regex("/items/([.a-zA-Z0-9-]+)/price/([0-9]*[.])?[0-9]+".into())
        );
    }

    #[test]
    fn unknown_or_missing_types_fall_back_to_string() {
        let compiled = PathMatch::compile(
            "/a/{x}/b/{y}",
            &params(&[("x", ParamSchema::of_type("object"))]),
        );
        assert_eq!(compiled, PathMatch::Regex("/a/([.a-zA-Z0-9-]+)/b/([.a-zA-Z0-9-]+)".into()));
    }

    #[test]
    fn trailing_slash_is_prefix_and_plain_is_exact() {
        assert_eq!(PathMatch::compile("/pets/", &BTreeMap::new()), PathMatch::Prefix("/pets/".into()));
        assert_eq!(PathMatch::compile("/pets", &BTreeMap::new()), PathMatch::Exact("/pets".into()));
    }

    #[test]
    fn specifier_conversion() {
        let spec = PathMatch::Regex("/pets/([0-9]+)".into()).into_path_specifier();
        assert!(matches!(spec, PathSpecifier::SafeRegex(ref m) if m.regex == "/pets/([0-9]+)"));
        assert!(matches!(PathMatch::Exact("/a".into()).into_path_specifier(), PathSpecifier::Path(_)));
        assert!(matches!(PathMatch::Prefix("/a/".into()).into_path_specifier(), PathSpecifier::Prefix(_)));
    }

    proptest! {
        #[test]
        fn integer_templates_match_their_examples(segment in "[a-z]{1,8}", id in 0u32..1_000_000) {
            let template = format!("/{}/{{id}}", segment);
            let compiled = PathMatch::compile(&template, &params(&[("id", ParamSchema::of_type("integer"))]));
            let PathMatch::Regex(pattern) = compiled else {
                panic!("expected a regex match");
            };
            let anchored = Regex::new(&format!("^{}$", pattern)).unwrap();
            let candidate = format!("/{}/{}", segment, id);
            prop_assert!(anchored.is_match(&candidate));
        }
    }
}
