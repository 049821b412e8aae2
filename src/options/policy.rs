//! Effective policy: a merged `SubOptions` block that passed validation.

use super::{AuthOptions, CorsOptions, QosOptions, RedirectOptions, RewriteRegex, SubOptions, UpstreamOptions};
use crate::errors::{Error, Result};
use validator::Validate;

const CORS_METHODS: &[&str] = &["GET", "POST", "PUT", "PATCH", "DELETE", "OPTIONS", "HEAD"];
const REDIRECT_CODES: &[u32] = &[301, 302, 303, 307, 308];

/// Where an enabled route sends its traffic
#[derive(Debug, Clone, PartialEq)]
pub enum RouteTarget {
    Upstream(UpstreamTarget),
    Redirect(RedirectOptions),
    /// Served entirely by the mock server; no upstream is configured
    Mock,
}

/// Resolved upstream address plus the optional path rewrite
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamTarget {
    pub hostname: String,
    pub port: u32,
    pub tls: bool,
    pub rewrite: Option<RewriteRegex>,
}

impl UpstreamTarget {
    /// Clusters are keyed by `hostname-port`
    pub fn cluster_name(&self) -> String {
        format!("{}-{}", self.hostname, self.port)
    }

    fn from_options(upstream: &UpstreamOptions) -> Result<Self> {
        match (&upstream.host, &upstream.service) {
            (Some(host), None) => Ok(Self {
                hostname: host.hostname.clone(),
                port: host.port,
                tls: host.tls,
                rewrite: upstream.rewrite.clone(),
            }),
            (None, Some(service)) => Ok(Self {
                hostname: format!("{}.{}.svc.cluster.local.", service.name, service.namespace),
                port: service.port,
                tls: false,
                rewrite: upstream.rewrite.clone(),
            }),
            (Some(_), Some(_)) => Err(Error::policy("upstream host and service are mutually exclusive")),
            (None, None) => Err(Error::policy("upstream must specify either host or service")),
        }
    }
}

/// Local rate limit resolved to token bucket parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitSpec {
    pub requests_per_unit: u32,
    pub fill_interval_seconds: i64,
    pub per_connection: bool,
    pub status_code: u32,
}

/// The fully merged and validated option set for one route
#[derive(Debug, Clone, PartialEq)]
pub struct EffectivePolicy {
    pub target: RouteTarget,
    pub path_prefix: Option<String>,
    pub qos: QosOptions,
    pub cors: Option<CorsOptions>,
    pub websocket: bool,
    pub mock: bool,
    pub validate_requests: bool,
    pub rate_limit: Option<RateLimitSpec>,
    /// `Cache-Control: max-age` in seconds
    pub cache_max_age: Option<u32>,
    pub auth: Option<AuthOptions>,
}

impl EffectivePolicy {
    /// Validate merged options. Disabled routes yield `Ok(None)` without being validated.
    pub fn from_options(options: &SubOptions) -> Result<Option<Self>> {
        if options.disabled.unwrap_or(false) {
            return Ok(None);
        }

        Validate::validate(options).map_err(|e| Error::policy(e.to_string()))?;

        let mock = options.mocking.as_ref().and_then(|m| m.enabled).unwrap_or(false);

        let target = match (&options.upstream, &options.redirect) {
            (Some(_), Some(_)) => {
                return Err(Error::policy("upstream and redirect are mutually exclusive"));
            }
            (None, None) if mock => RouteTarget::Mock,
            (None, None) => {
                return Err(Error::policy("either upstream or redirect must be specified"));
            }
            (Some(upstream), None) => RouteTarget::Upstream(UpstreamTarget::from_options(upstream)?),
            (None, Some(redirect)) => {
                validate_redirect(redirect)?;
                RouteTarget::Redirect(redirect.clone())
            }
        };

        if let Some(cors) = &options.cors {
            validate_cors(cors)?;
        }

        let rate_limit = options.rate_limit.as_ref().map(|rl| {
            let fill_interval_seconds = match rl.unit.as_str() {
                "second" => 1,
                "minute" => 60,
                "hour" => 3600,
                other => {
                    return Err(Error::policy(format!(
                        "unsupported unit '{}', must be second, minute or hour",
                        other
                    )))
                }
            };
            Ok(RateLimitSpec {
                requests_per_unit: rl.requests_per_unit,
                fill_interval_seconds,
                per_connection: rl.per_connection,
                status_code: rl.response_code.filter(|c| *c != 0).unwrap_or(429),
            })
        });
        let rate_limit = rate_limit.transpose()?;

        if let Some(auth) = &options.auth {
            validate_auth(auth)?;
        }

        Ok(Some(Self {
            target,
            path_prefix: options.path.as_ref().and_then(|p| p.prefix.clone()).filter(|p| !p.is_empty()),
            qos: options.qos.clone().unwrap_or_default(),
            cors: options.cors.clone(),
            websocket: options.websocket.unwrap_or(false),
            mock,
            validate_requests: options
                .validation
                .as_ref()
                .and_then(|v| v.request.as_ref())
                .and_then(|r| r.enabled)
                .unwrap_or(false),
            rate_limit,
            cache_max_age: options
                .cache
                .as_ref()
                .filter(|c| c.enabled.unwrap_or(false))
                .map(|c| c.max_age),
            auth: options.auth.clone(),
        }))
    }

    pub fn upstream(&self) -> Option<&UpstreamTarget> {
        match &self.target {
            RouteTarget::Upstream(upstream) => Some(upstream),
            RouteTarget::Redirect(_) | RouteTarget::Mock => None,
        }
    }
}

fn validate_redirect(redirect: &RedirectOptions) -> Result<()> {
    if let Some(scheme) = redirect.scheme_redirect.as_deref() {
        if scheme != "http" && scheme != "https" {
            return Err(Error::policy(format!("redirect scheme '{}' must be http or https", scheme)));
        }
    }

    if let Some(code) = redirect.response_code {
        if !REDIRECT_CODES.contains(&code) {
            return Err(Error::policy(format!(
                "redirect response code {} is not one of 301, 302, 303, 307, 308",
                code
            )));
        }
    }

    if redirect.path_redirect.is_some() && redirect.rewrite_regex.is_some() {
        return Err(Error::policy("redirect path_redirect and rewrite_regex are mutually exclusive"));
    }

    Ok(())
}

fn validate_cors(cors: &CorsOptions) -> Result<()> {
    if let Some(method) = cors.methods.iter().find(|m| !CORS_METHODS.contains(&m.as_str())) {
        return Err(Error::policy(format!("unsupported CORS method '{}'", method)));
    }
    Ok(())
}

fn validate_auth(auth: &AuthOptions) -> Result<()> {
    if let Some(host) = auth.auth_upstream.as_ref().and_then(|u| u.host.as_ref()) {
        if host.hostname.is_empty() || host.port == 0 {
            return Err(Error::policy("auth upstream requires hostname and port"));
        }
    }
    Ok(())
}
