//! Three-tier option merging.
//!
//! `merge(upper, lower)` returns `lower` with every empty field filled from
//! `upper`. Resolving an operation is `merge(merge(global, path), operation)`.
//!
//! | field | rule |
//! |-------|------|
//! | `disabled` | most specific level that sets it |
//! | `upstream`, `redirect` | one routing target: inherited only when the lower level sets neither |
//! | `path.prefix` | most specific non-empty value |
//! | `qos.*` | field by field, zero is empty |
//! | `cors`, `websocket`, `validation`, `mocking`, `rate_limit`, `cache`, `auth` | whole block from the most specific level |

use super::{PathOptions, QosOptions, SubOptions};

/// Fill the empty fields of `lower` from `upper`
pub fn merge(upper: &SubOptions, lower: &SubOptions) -> SubOptions {
    let (upstream, redirect) = if lower.upstream.is_none() && lower.redirect.is_none() {
        (upper.upstream.clone(), upper.redirect.clone())
    } else {
        (lower.upstream.clone(), lower.redirect.clone())
    };

    SubOptions {
        disabled: lower.disabled.or(upper.disabled),
        upstream,
        redirect,
        path: merge_path(upper.path.as_ref(), lower.path.as_ref()),
        qos: merge_qos(upper.qos.as_ref(), lower.qos.as_ref()),
        cors: lower.cors.clone().or_else(|| upper.cors.clone()),
        websocket: lower.websocket.or(upper.websocket),
        validation: lower.validation.clone().or_else(|| upper.validation.clone()),
        mocking: lower.mocking.clone().or_else(|| upper.mocking.clone()),
        rate_limit: lower.rate_limit.clone().or_else(|| upper.rate_limit.clone()),
        cache: lower.cache.clone().or_else(|| upper.cache.clone()),
        auth: lower.auth.clone().or_else(|| upper.auth.clone()),
    }
}

/// Merge global, path and operation levels, most specific last
pub fn resolve(global: &SubOptions, path: &SubOptions, operation: &SubOptions) -> SubOptions {
    merge(&merge(global, path), operation)
}

fn merge_path(upper: Option<&PathOptions>, lower: Option<&PathOptions>) -> Option<PathOptions> {
    let prefix = lower
        .and_then(|p| p.prefix.clone())
        .filter(|p| !p.is_empty())
        .or_else(|| upper.and_then(|p| p.prefix.clone()).filter(|p| !p.is_empty()));

    match (upper, lower) {
        (None, None) => None,
        _ => Some(PathOptions { prefix }),
    }
}

fn merge_qos(upper: Option<&QosOptions>, lower: Option<&QosOptions>) -> Option<QosOptions> {
    fn pick(lower: Option<u32>, upper: Option<u32>) -> Option<u32> {
        lower.filter(|v| *v != 0).or(upper.filter(|v| *v != 0))
    }

    match (upper, lower) {
        (None, None) => None,
        (Some(upper), None) => Some(upper.clone()),
        (None, Some(lower)) => Some(lower.clone()),
        (Some(upper), Some(lower)) => Some(QosOptions {
            retries: pick(lower.retries, upper.retries),
            request_timeout: pick(lower.request_timeout, upper.request_timeout),
            idle_timeout: pick(lower.idle_timeout, upper.idle_timeout),
        }),
    }
}
