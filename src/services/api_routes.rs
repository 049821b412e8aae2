//! Route intents derived from API and static route documents
//!
//! Every enabled path+method becomes one [`RouteIntent`] carrying its merged
//! policy, compiled path (with any configured prefix) and the hosts it is
//! scoped to. Disabled operations are skipped.

use crate::domain::{join_route_path, ApiIntent, RouteIntent, StaticRouteIntent};
use crate::errors::{Error, Result};
use crate::options::PolicyResolver;
use crate::xds::route::document::document_route;
use envoy_types::pb::envoy::config::route::v3::Route;
use std::collections::BTreeMap;
use tracing::debug;

pub fn api_route_intents(api: &ApiIntent) -> Result<Vec<RouteIntent>> {
    let resolver = PolicyResolver::new(&api.options);
    let mut intents = Vec::new();

    for (path, path_intent) in &api.paths {
        for (method, operation) in &path_intent.operations {
            let method = method.to_ascii_uppercase();
            let location = format!("{} {}", path, method);

            let Some(policy) = resolver
                .resolve(&path_intent.options, &operation.options)
                .map_err(|e| e.context(&location))?
            else {
                debug!(api = %api.name, path = %path, method = %method, "Operation disabled, skipping");
                continue;
            };

            let mut parameters = path_intent.parameters.clone();
            parameters.extend(operation.parameters.clone());

            intents.push(RouteIntent {
                source: api.name.clone(),
                path: join_route_path(policy.path_prefix.as_deref(), path),
                declared_path: path.clone(),
                method,
                operation_id: operation.operation_id.clone(),
                parameters,
                vhosts: api.hosts.clone(),
                policy,
            });
        }
    }

    Ok(intents)
}

/// The route serving the API document, when the API asks for one
pub fn openapi_route(api: &ApiIntent) -> Result<Option<Route>> {
    let Some(path) = api.openapi_path.as_deref().filter(|p| !p.is_empty()) else {
        return Ok(None);
    };
    let body = api.openapi_document.as_deref().ok_or_else(|| {
        Error::policy_at("openapi_path is set but no document was provided", format!("api {}", api.name))
    })?;
    Ok(Some(document_route(path, body)))
}

/// Static routes share the option merge but never mock or validate
pub fn static_route_intents(static_route: &StaticRouteIntent) -> Result<Vec<RouteIntent>> {
    let resolver = PolicyResolver::new(&static_route.options);
    let mut intents = Vec::new();

    for (path, path_intent) in &static_route.paths {
        for (method, options) in &path_intent.methods {
            let method = method.to_ascii_uppercase();
            let location = format!("{} {}", path, method);

            let Some(policy) = resolver
                .resolve(&path_intent.options, options)
                .map_err(|e| e.context(&location))?
            else {
                continue;
            };

            if policy.mock || policy.validate_requests {
                return Err(Error::policy_at(
                    "static routes support only redirect and proxy actions",
                    location,
                ));
            }

            intents.push(RouteIntent {
                source: static_route.name.clone(),
                path: join_route_path(policy.path_prefix.as_deref(), path),
                declared_path: path.clone(),
                method,
                operation_id: String::new(),
                parameters: BTreeMap::new(),
                vhosts: static_route.hosts.clone(),
                policy,
            });
        }
    }

    Ok(intents)
}
