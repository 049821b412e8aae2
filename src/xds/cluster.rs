//! Upstream clusters
//!
//! Every distinct upstream `hostname:port` becomes one LOGICAL_DNS cluster
//! with a single endpoint. Cluster names are `hostname-port`, so two routes
//! pointing at the same upstream always share a cluster.

use crate::options::UpstreamTarget;
use crate::xds::resources::{
    any_from_message, HTTP_PROTOCOL_OPTIONS, HTTP_PROTOCOL_OPTIONS_TYPE_URL, TLS_TRANSPORT_SOCKET,
    UPSTREAM_TLS_CONTEXT_TYPE_URL,
};
use envoy_types::pb::envoy::config::{
    cluster::v3::{
        cluster::{ClusterDiscoveryType, DiscoveryType, DnsLookupFamily, LbPolicy},
        Cluster,
    },
    core::v3::{
        address::Address as AddressType, socket_address::PortSpecifier, transport_socket,
        Address, Http1ProtocolOptions, SocketAddress, TransportSocket, UpstreamHttpProtocolOptions,
    },
    endpoint::v3::{lb_endpoint, ClusterLoadAssignment, Endpoint, LbEndpoint, LocalityLbEndpoints},
};
use envoy_types::pb::envoy::extensions::transport_sockets::tls::v3::{
    CommonTlsContext, UpstreamTlsContext,
};
use envoy_types::pb::envoy::extensions::upstreams::http::v3::{
    http_protocol_options::{explicit_http_config::ProtocolConfig, ExplicitHttpConfig, UpstreamProtocolOptions},
    HttpProtocolOptions,
};
use envoy_types::pb::google::protobuf::Duration;

const CONNECT_TIMEOUT_SECONDS: i64 = 5;

/// Cluster name for an upstream address
pub fn cluster_name(hostname: &str, port: u32) -> String {
    format!("{}-{}", hostname, port)
}

/// Everything needed to emit one upstream cluster
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClusterSpec {
    pub name: String,
    pub hostname: String,
    pub port: u32,
    pub tls: bool,
}

impl ClusterSpec {
    pub fn plain(hostname: impl Into<String>, port: u32) -> Self {
        let hostname = hostname.into();
        Self { name: cluster_name(&hostname, port), hostname, port, tls: false }
    }

    pub fn for_upstream(upstream: &UpstreamTarget) -> Self {
        Self {
            name: upstream.cluster_name(),
            hostname: upstream.hostname.clone(),
            port: upstream.port,
            tls: upstream.tls,
        }
    }

    pub fn to_envoy_cluster(&self) -> Cluster {
        let socket_address = SocketAddress {
            address: self.hostname.clone(),
            port_specifier: Some(PortSpecifier::PortValue(self.port)),
            ..Default::default()
        };

        let lb_endpoint = LbEndpoint {
            host_identifier: Some(lb_endpoint::HostIdentifier::Endpoint(Endpoint {
                address: Some(Address { address: Some(AddressType::SocketAddress(socket_address)) }),
                ..Default::default()
            })),
            ..Default::default()
        };

        let mut cluster = Cluster {
            name: self.name.clone(),
            connect_timeout: Some(Duration { seconds: CONNECT_TIMEOUT_SECONDS, nanos: 0 }),
            cluster_discovery_type: Some(ClusterDiscoveryType::Type(DiscoveryType::LogicalDns as i32)),
            lb_policy: LbPolicy::RoundRobin as i32,
            dns_lookup_family: DnsLookupFamily::V4Only as i32,
            load_assignment: Some(ClusterLoadAssignment {
                cluster_name: self.name.clone(),
                endpoints: vec![LocalityLbEndpoints {
                    lb_endpoints: vec![lb_endpoint],
                    ..Default::default()
                }],
                ..Default::default()
            }),
            ..Default::default()
        };

        if self.tls {
            let tls_context = UpstreamTlsContext {
                common_tls_context: Some(CommonTlsContext::default()),
                sni: self.hostname.clone(),
                ..Default::default()
            };
            cluster.transport_socket = Some(TransportSocket {
                name: TLS_TRANSPORT_SOCKET.to_string(),
                config_type: Some(transport_socket::ConfigType::TypedConfig(any_from_message(
                    UPSTREAM_TLS_CONTEXT_TYPE_URL,
                    &tls_context,
                ))),
            });
            let protocol_options = HttpProtocolOptions {
                upstream_http_protocol_options: Some(UpstreamHttpProtocolOptions {
                    auto_sni: true,
                    ..Default::default()
                }),
                upstream_protocol_options: Some(UpstreamProtocolOptions::ExplicitHttpConfig(
                    ExplicitHttpConfig {
                        protocol_config: Some(ProtocolConfig::HttpProtocolOptions(
                            Http1ProtocolOptions::default(),
                        )),
                    },
                )),
                ..Default::default()
            };
            cluster.typed_extension_protocol_options.insert(
                HTTP_PROTOCOL_OPTIONS.to_string(),
                any_from_message(HTTP_PROTOCOL_OPTIONS_TYPE_URL, &protocol_options),
            );
        }

        cluster
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xds::resources::message_from_any;

    fn endpoint_address(cluster: &Cluster) -> (String, u32) {
        let assignment = cluster.load_assignment.as_ref().unwrap();
        let lb_endpoint = &assignment.endpoints[0].lb_endpoints[0];
        let Some(lb_endpoint::HostIdentifier::Endpoint(endpoint)) = &lb_endpoint.host_identifier else {
            panic!("expected an endpoint");
        };
        let Some(AddressType::SocketAddress(socket)) =
            endpoint.address.as_ref().and_then(|a| a.address.as_ref())
        else {
            panic!("expected a socket address");
        };
        let Some(PortSpecifier::PortValue(port)) = &socket.port_specifier else {
            panic!("expected a port");
        };
        (socket.address.clone(), *port)
    }

    #[test]
    fn plain_cluster_is_logical_dns_round_robin() {
        let cluster = ClusterSpec::plain("petstore.shop.svc.cluster.local.", 80).to_envoy_cluster();

        assert_eq!(cluster.name, "petstore.shop.svc.cluster.local.-80");
        assert_eq!(
            cluster.cluster_discovery_type,
            Some(ClusterDiscoveryType::Type(DiscoveryType::LogicalDns as i32))
        );
        assert_eq!(cluster.lb_policy, LbPolicy::RoundRobin as i32);
        assert_eq!(cluster.dns_lookup_family, DnsLookupFamily::V4Only as i32);
        assert_eq!(cluster.connect_timeout, Some(Duration { seconds: 5, nanos: 0 }));
        assert_eq!(endpoint_address(&cluster), ("petstore.shop.svc.cluster.local.".into(), 80));
        assert!(cluster.transport_socket.is_none());
        assert!(cluster.typed_extension_protocol_options.is_empty());
    }

    #[test]
    fn tls_cluster_sets_sni_and_auto_sni() {
        let upstream = UpstreamTarget {
            hostname: "api.example.com".into(),
            port: 443,
            tls: true,
            rewrite: None,
        };
        let cluster = ClusterSpec::for_upstream(&upstream).to_envoy_cluster();

        assert_eq!(cluster.name, "api.example.com-443");
        let options: HttpProtocolOptions = message_from_any(
            HTTP_PROTOCOL_OPTIONS_TYPE_URL,
            &cluster.typed_extension_protocol_options[HTTP_PROTOCOL_OPTIONS],
        )
        .unwrap();
        assert!(options.upstream_http_protocol_options.unwrap().auto_sni);

        let socket = cluster.transport_socket.unwrap();
        assert_eq!(socket.name, "envoy.transport_sockets.tls");
        let Some(transport_socket::ConfigType::TypedConfig(any)) = socket.config_type else {
            panic!("expected typed config");
        };
        let context: UpstreamTlsContext =
            message_from_any(UPSTREAM_TLS_CONTEXT_TYPE_URL, &any).unwrap();
        assert_eq!(context.sni, "api.example.com");
    }
}
