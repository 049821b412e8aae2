//! Route serving an API's own document straight from the proxy

use super::methods::method_matcher;
use crate::domain::route_name;
use envoy_types::pb::envoy::config::core::v3::{
    data_source::Specifier, header_value_option::HeaderAppendAction, DataSource, HeaderValue,
    HeaderValueOption,
};
use envoy_types::pb::envoy::config::route::v3::{
    route, route_match::PathSpecifier, DirectResponseAction, Route, RouteMatch,
};

const CONTENT_TYPE_HEADER: &str = "Content-Type";

/// Path the document is served on, always absolute
pub fn document_path(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    }
}

/// `GET path` answered with a 200 carrying `body`
pub fn document_route(path: &str, body: &str) -> Route {
    let path = document_path(path);
    let content_type = if serde_json::from_str::<serde_json::Value>(body).is_ok() {
        "application/json"
    } else {
        "application/yaml"
    };

    Route {
        name: route_name(&path, "GET"),
        r#match: Some(RouteMatch {
            path_specifier: Some(PathSpecifier::Path(path)),
            headers: method_matcher(&["GET"], false).into_iter().collect(),
            ..Default::default()
        }),
        response_headers_to_add: vec![HeaderValueOption {
            header: Some(HeaderValue {
                key: CONTENT_TYPE_HEADER.to_string(),
                value: content_type.to_string(),
                ..Default::default()
            }),
            append_action: HeaderAppendAction::OverwriteIfExistsOrAdd as i32,
            ..Default::default()
        }],
        action: Some(route::Action::DirectResponse(DirectResponseAction {
            status: 200,
            body: Some(DataSource { specifier: Some(Specifier::InlineString(body.to_string())), ..Default::default() }),
            ..Default::default()
        })),
        ..Default::default()
    }
}
