//! Stdout access logging for the HTTP connection manager

use crate::domain::{AccessLogFormat, AccessLogIntent};
use crate::xds::resources::{any_from_message, STDOUT_ACCESS_LOG, STDOUT_ACCESS_LOG_TYPE_URL};
use envoy_types::pb::envoy::config::{
    accesslog::v3::{access_log::ConfigType as AccessLogConfigType, AccessLog},
    core::v3::{data_source, substitution_format_string, DataSource, SubstitutionFormatString},
};
use envoy_types::pb::envoy::extensions::access_loggers::stream::v3::{
    stdout_access_log, StdoutAccessLog,
};
use envoy_types::pb::google::protobuf::{value::Kind, Struct, Value};

const DEFAULT_JSON_TEMPLATE: &[(&str, &str)] = &[
    ("start_time", "%START_TIME%"),
    ("method", "%REQ(:METHOD)%"),
    ("path", "%REQ(X-ENVOY-ORIGINAL-PATH?:PATH)%"),
    ("protocol", "%PROTOCOL%"),
    ("response_code", "%RESPONSE_CODE%"),
    ("response_flags", "%RESPONSE_FLAGS%"),
    ("response_code_details", "%RESPONSE_CODE_DETAILS%"),
    ("connection_termination_details", "%CONNECTION_TERMINATION_DETAILS%"),
    ("upstream_transport_failure_reason", "%UPSTREAM_TRANSPORT_FAILURE_REASON%"),
    ("bytes_received", "%BYTES_RECEIVED%"),
    ("bytes_sent", "%BYTES_SENT%"),
    ("duration", "%DURATION%"),
    ("upstream_service_time", "%RESP(X-ENVOY-UPSTREAM-SERVICE-TIME)%"),
    ("x_forwarded_for", "%REQ(X-FORWARDED-FOR)%"),
    ("user_agent", "%REQ(USER-AGENT)%"),
    ("request_id", "%REQ(X-REQUEST-ID)%"),
    ("authority", "%REQ(:AUTHORITY)%"),
    ("upstream_host", "%UPSTREAM_HOST%"),
    ("upstream_cluster", "%UPSTREAM_CLUSTER%"),
    ("upstream_local_address", "%UPSTREAM_LOCAL_ADDRESS%"),
    ("downstream_local_address", "%DOWNSTREAM_LOCAL_ADDRESS%"),
    ("downstream_remote_address", "%DOWNSTREAM_REMOTE_ADDRESS%"),
    ("requested_server_name", "%REQUESTED_SERVER_NAME%"),
    ("route_name", "%ROUTE_NAME%"),
];

const DEFAULT_TEXT_TEMPLATE: &str = concat!(
    "[%START_TIME%] \"%REQ(:METHOD)% %REQ(X-ENVOY-ORIGINAL-PATH?:PATH)% %PROTOCOL%\" ",
    "%RESPONSE_CODE% %RESPONSE_FLAGS% %RESPONSE_CODE_DETAILS% %CONNECTION_TERMINATION_DETAILS% ",
    "\"%UPSTREAM_TRANSPORT_FAILURE_REASON%\" %BYTES_RECEIVED% %BYTES_SENT% %DURATION% ",
    "%RESP(X-ENVOY-UPSTREAM-SERVICE-TIME)% \"%REQ(X-FORWARDED-FOR)%\" \"%REQ(USER-AGENT)%\" ",
    "\"%REQ(X-REQUEST-ID)%\" \"%REQ(:AUTHORITY)%\" \"%UPSTREAM_HOST%\" %UPSTREAM_CLUSTER% ",
    "%UPSTREAM_LOCAL_ADDRESS% %DOWNSTREAM_LOCAL_ADDRESS% %DOWNSTREAM_REMOTE_ADDRESS% ",
    "%REQUESTED_SERVER_NAME% %ROUTE_NAME%\n",
);

fn string_struct<'a>(entries: impl Iterator<Item = (&'a str, &'a str)>) -> Struct {
    Struct {
        fields: entries
            .map(|(key, value)| {
                (key.to_string(), Value { kind: Some(Kind::StringValue(value.to_string())) })
            })
            .collect(),
    }
}

fn log_format(intent: &AccessLogIntent) -> SubstitutionFormatString {
    let format = match intent.format {
        AccessLogFormat::Json => {
            let template = match &intent.json_template {
                Some(template) if !template.is_empty() => {
                    string_struct(template.iter().map(|(k, v)| (k.as_str(), v.as_str())))
                }
                _ => string_struct(DEFAULT_JSON_TEMPLATE.iter().copied()),
            };
            substitution_format_string::Format::JsonFormat(template)
        }
        AccessLogFormat::Text => {
            let template = intent
                .text_template
                .as_deref()
                .filter(|t| !t.is_empty())
                .unwrap_or(DEFAULT_TEXT_TEMPLATE);
            substitution_format_string::Format::TextFormatSource(DataSource {
                specifier: Some(data_source::Specifier::InlineString(template.to_string())),
                ..Default::default()
            })
        }
    };

    SubstitutionFormatString { format: Some(format), ..Default::default() }
}

/// Build the stdout access log for a fleet
pub fn build_access_log(intent: &AccessLogIntent) -> AccessLog {
    let stdout = StdoutAccessLog {
        access_log_format: Some(stdout_access_log::AccessLogFormat::LogFormat(log_format(intent))),
    };

    AccessLog {
        name: STDOUT_ACCESS_LOG.to_string(),
        filter: None,
        config_type: Some(AccessLogConfigType::TypedConfig(any_from_message(
            STDOUT_ACCESS_LOG_TYPE_URL,
            &stdout,
        ))),
    }
}
