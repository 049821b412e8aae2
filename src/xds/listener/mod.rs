//! Gateway listener construction
//!
//! A fleet has exactly one listener. It always carries a plain HTTP filter
//! chain; when certificates are configured it also gets a TLS inspector and
//! one SNI-scoped TLS filter chain per certificate, all sharing the same
//! HTTP connection manager.

pub mod access_log;
pub mod hcm;
pub mod tls;

use crate::config::GatewayConfig;
use crate::domain::{AccessLogIntent, TlsIntent};
use crate::errors::Result;
use crate::utils::certificates::leaf_server_names;
use crate::xds::resources::{
    any_from_message, HTTP_CONNECTION_MANAGER_TYPE_URL, TLS_INSPECTOR_FILTER, TLS_INSPECTOR_TYPE_URL,
};
use envoy_types::pb::envoy::config::core::v3::{
    address::Address as AddressType, socket_address::{PortSpecifier, Protocol}, Address, SocketAddress,
};
use envoy_types::pb::envoy::config::listener::v3::{
    listener_filter, FilterChain, FilterChainMatch, Listener, ListenerFilter,
};
use envoy_types::pb::envoy::extensions::filters::listener::tls_inspector::v3::TlsInspector;
use tracing::debug;

pub use hcm::HcmBuilder;

#[derive(Debug, Clone)]
pub struct ListenerBuilder {
    name: String,
    address: String,
    port: u32,
    route_config_name: String,
    access_log: Option<AccessLogIntent>,
    tls: Option<TlsIntent>,
}

impl ListenerBuilder {
    pub fn new(gateway: &GatewayConfig) -> Self {
        Self {
            name: gateway.listener_name.clone(),
            address: gateway.listener_address.clone(),
            port: u32::from(gateway.listener_port),
            route_config_name: gateway.route_config_name.clone(),
            access_log: None,
            tls: None,
        }
    }

    pub fn with_access_log(mut self, access_log: Option<AccessLogIntent>) -> Self {
        self.access_log = access_log;
        self
    }

    pub fn with_tls(mut self, tls: Option<TlsIntent>) -> Self {
        self.tls = tls;
        self
    }

    pub fn build(&self) -> Result<Listener> {
        let mut hcm = HcmBuilder::new(self.route_config_name.clone())?;
        if let Some(access_log) = &self.access_log {
            hcm.add_access_log(access_log::build_access_log(access_log));
        }
        let hcm_any = any_from_message(HTTP_CONNECTION_MANAGER_TYPE_URL, &hcm.build());

        let mut listener = Listener {
            name: self.name.clone(),
            address: Some(Address {
                address: Some(AddressType::SocketAddress(SocketAddress {
                    protocol: Protocol::Tcp as i32,
                    address: self.address.clone(),
                    port_specifier: Some(PortSpecifier::PortValue(self.port)),
                    ..Default::default()
                })),
            }),
            filter_chains: vec![FilterChain { filters: vec![tls::hcm_filter(&hcm_any)], ..Default::default() }],
            ..Default::default()
        };

        let Some(tls_intent) = self.tls.as_ref().filter(|t| !t.certificates.is_empty()) else {
            return Ok(listener);
        };

        listener.listener_filters.push(ListenerFilter {
            name: TLS_INSPECTOR_FILTER.to_string(),
            config_type: Some(listener_filter::ConfigType::TypedConfig(any_from_message(
                TLS_INSPECTOR_TYPE_URL,
                &TlsInspector::default(),
            ))),
            ..Default::default()
        });
        listener.filter_chains[0].filter_chain_match = Some(FilterChainMatch {
            transport_protocol: tls::RAW_BUFFER_TRANSPORT_PROTOCOL.to_string(),
            ..Default::default()
        });

        let params = tls::tls_parameters(tls_intent)?;
        for certificate in &tls_intent.certificates {
            let server_names = leaf_server_names(&certificate.cert)?;
            debug!(listener = %self.name, server_names = ?server_names, "Adding TLS filter chain");
            listener
                .filter_chains
                .push(tls::tls_filter_chain(certificate, server_names, &params, &hcm_any));
        }

        Ok(listener)
    }
}
