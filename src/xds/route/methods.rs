//! `:method` header matching

use envoy_types::pb::envoy::config::route::v3::header_matcher::HeaderMatchSpecifier;
use envoy_types::pb::envoy::config::route::v3::HeaderMatcher;
use envoy_types::pb::envoy::r#type::matcher::v3::string_matcher::MatchPattern;
use envoy_types::pb::envoy::r#type::matcher::v3::{RegexMatcher, StringMatcher};

const METHOD_HEADER: &str = ":method";

/// Build the method matcher for a route.
///
/// A single method without CORS is an exact match. Several methods, or CORS
/// (which also needs preflight `OPTIONS`), become an anchored alternation.
pub fn method_matcher(methods: &[&str], cors: bool) -> Option<HeaderMatcher> {
    let pattern = match (methods, cors) {
        ([], _) => return None,
        ([method], false) => MatchPattern::Exact(method.to_ascii_uppercase()),
        _ => {
            let mut alternatives: Vec<String> =
                methods.iter().map(|m| format!("^{}$", m.to_ascii_uppercase())).collect();
            if cors {
                alternatives.push("^OPTIONS$".to_string());
            }
            MatchPattern::SafeRegex(RegexMatcher { regex: alternatives.join("|"), ..Default::default() })
        }
    };

    Some(HeaderMatcher {
        name: METHOD_HEADER.to_string(),
        header_match_specifier: Some(HeaderMatchSpecifier::StringMatch(StringMatcher {
            match_pattern: Some(pattern),
            ignore_case: false,
        })),
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern(matcher: HeaderMatcher) -> MatchPattern {
        match matcher.header_match_specifier {
            Some(HeaderMatchSpecifier::StringMatch(m)) => m.match_pattern.unwrap(),
            other => panic!("unexpected specifier {other:?}"),
        }
    }

    #[test]
    fn no_methods_no_matcher() {
        assert!(method_matcher(&[], true).is_none());
    }

    #[test]
    fn single_method_is_exact() {
        let matcher = method_matcher(&["get"], false).unwrap();
        assert_eq!(matcher.name, ":method");
        assert_eq!(pattern(matcher), MatchPattern::Exact("GET".into()));
    }

    #[test]
    fn cors_adds_options_alternative() {
        let matcher = method_matcher(&["GET"], true).unwrap();
        assert_eq!(
            pattern(matcher),
            MatchPattern::SafeRegex(RegexMatcher { regex: "^GET$|^OPTIONS$".into(), ..Default::default() })
        );
    }

    #[test]
    fn several_methods_without_cors() {
        let matcher = method_matcher(&["GET", "HEAD"], false).unwrap();
        assert_eq!(
            pattern(matcher),
            MatchPattern::SafeRegex(RegexMatcher { regex: "^GET$|^HEAD$".into(), ..Default::default() })
        );
    }
}
