//! Downstream TLS: protocol parameters and per-certificate SNI filter chains

use crate::domain::{CertificateIntent, TlsIntent};
use crate::errors::{Error, Result};
use crate::xds::resources::{
    any_from_message, DOWNSTREAM_TLS_CONTEXT_TYPE_URL, HTTP_CONNECTION_MANAGER_FILTER,
    TLS_TRANSPORT_SOCKET,
};
use envoy_types::pb::envoy::config::core::v3::{
    data_source, transport_socket, DataSource, TransportSocket,
};
use envoy_types::pb::envoy::config::listener::v3::{filter, Filter, FilterChain, FilterChainMatch};
use envoy_types::pb::envoy::extensions::transport_sockets::tls::v3::{
    tls_parameters::TlsProtocol, CommonTlsContext, DownstreamTlsContext, TlsCertificate, TlsParameters,
};
use envoy_types::pb::google::protobuf::Any;

pub const TLS_TRANSPORT_PROTOCOL: &str = "tls";
pub const RAW_BUFFER_TRANSPORT_PROTOCOL: &str = "raw_buffer";

/// Parse a protocol version name: `TLS_AUTO`, `TLSv1_0` .. `TLSv1_3`
pub fn protocol_version(name: &str) -> Result<TlsProtocol> {
    TlsProtocol::from_str_name(name)
        .ok_or_else(|| Error::policy(format!("unsupported tls protocol version {}", name)))
}

/// Parameters shared by every TLS filter chain of a listener
pub fn tls_parameters(tls: &TlsIntent) -> Result<TlsParameters> {
    let mut params = TlsParameters { cipher_suites: tls.cipher_suites.clone(), ..Default::default() };

    if let Some(min) = tls.tls_minimum_protocol_version.as_deref().filter(|v| !v.is_empty()) {
        params.tls_minimum_protocol_version = protocol_version(min)? as i32;
    }
    if let Some(max) = tls.tls_maximum_protocol_version.as_deref().filter(|v| !v.is_empty()) {
        params.tls_maximum_protocol_version = protocol_version(max)? as i32;
    }

    Ok(params)
}

fn inline(value: &str) -> DataSource {
    DataSource {
        specifier: Some(data_source::Specifier::InlineString(value.to_string())),
        ..Default::default()
    }
}

/// Filter chain terminating TLS for `server_names` with one certificate
pub fn tls_filter_chain(
    certificate: &CertificateIntent,
    server_names: Vec<String>,
    params: &TlsParameters,
    hcm: &Any,
) -> FilterChain {
    let context = DownstreamTlsContext {
        common_tls_context: Some(CommonTlsContext {
            tls_certificates: vec![TlsCertificate {
                certificate_chain: Some(inline(&certificate.cert)),
                private_key: Some(inline(&certificate.key)),
                ..Default::default()
            }],
            tls_params: Some(params.clone()),
            ..Default::default()
        }),
        ..Default::default()
    };

    FilterChain {
        filter_chain_match: Some(FilterChainMatch {
            transport_protocol: TLS_TRANSPORT_PROTOCOL.to_string(),
            server_names,
            ..Default::default()
        }),
        filters: vec![hcm_filter(hcm)],
        transport_socket: Some(TransportSocket {
            name: TLS_TRANSPORT_SOCKET.to_string(),
            config_type: Some(transport_socket::ConfigType::TypedConfig(any_from_message(
                DOWNSTREAM_TLS_CONTEXT_TYPE_URL,
                &context,
            ))),
        }),
        ..Default::default()
    }
}

pub(super) fn hcm_filter(hcm: &Any) -> Filter {
    Filter {
        name: HTTP_CONNECTION_MANAGER_FILTER.to_string(),
        config_type: Some(filter::ConfigType::TypedConfig(hcm.clone())),
    }
}
