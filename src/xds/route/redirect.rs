//! Redirect actions

use crate::options::RedirectOptions;
use envoy_types::pb::envoy::config::route::v3::redirect_action::{
    PathRewriteSpecifier, RedirectResponseCode, SchemeRewriteSpecifier,
};
use envoy_types::pb::envoy::config::route::v3::RedirectAction;
use envoy_types::pb::envoy::r#type::matcher::v3::{RegexMatchAndSubstitute, RegexMatcher};

/// Map an HTTP status to the redirect enumeration; anything unknown becomes 301
pub fn response_code(code: Option<u32>) -> RedirectResponseCode {
    match code {
        Some(302) => RedirectResponseCode::Found,
        Some(303) => RedirectResponseCode::SeeOther,
        Some(307) => RedirectResponseCode::TemporaryRedirect,
        Some(308) => RedirectResponseCode::PermanentRedirect,
        _ => RedirectResponseCode::MovedPermanently,
    }
}

pub fn build_redirect(options: &RedirectOptions) -> RedirectAction {
    let path_rewrite_specifier = match (&options.path_redirect, &options.rewrite_regex) {
        (Some(path), _) => Some(PathRewriteSpecifier::PathRedirect(path.clone())),
        (None, Some(rewrite)) => Some(PathRewriteSpecifier::RegexRewrite(RegexMatchAndSubstitute {
            pattern: Some(RegexMatcher { regex: rewrite.pattern.clone(), ..Default::default() }),
            substitution: rewrite.substitution.clone(),
        })),
        (None, None) => None,
    };

    RedirectAction {
        host_redirect: options.host_redirect.clone().unwrap_or_default(),
        port_redirect: options.port_redirect.unwrap_or(0),
        scheme_rewrite_specifier: options
            .scheme_redirect
            .as_ref()
            .filter(|s| !s.is_empty())
            .map(|s| SchemeRewriteSpecifier::SchemeRedirect(s.clone())),
        path_rewrite_specifier,
        response_code: response_code(options.response_code) as i32,
        strip_query: options.strip_query.unwrap_or(false),
        ..Default::default()
    }
}
