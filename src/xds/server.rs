//! Discovery gRPC server
//!
//! Serves the aggregated discovery service with HTTP/2 keepalive so that idle
//! Envoy streams survive intermediaries, and closes every open stream when the
//! shutdown signal fires.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use envoy_types::pb::envoy::service::discovery::v3::aggregated_discovery_service_server::AggregatedDiscoveryServiceServer;
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;
use tracing::info;

use crate::config::XdsConfig;
use crate::errors::{Error, Result};
use crate::xds::cache::FleetSnapshotCache;
use crate::xds::services::FleetAggregatedDiscoveryService;

#[derive(Debug, Clone)]
pub struct DiscoveryServer {
    config: XdsConfig,
    service: FleetAggregatedDiscoveryService,
}

impl DiscoveryServer {
    pub fn new(config: XdsConfig, cache: Arc<FleetSnapshotCache>) -> Self {
        Self { config, service: FleetAggregatedDiscoveryService::new(cache) }
    }

    pub fn service(&self) -> &FleetAggregatedDiscoveryService {
        &self.service
    }

    fn builder(&self) -> Server {
        Server::builder()
            .http2_keepalive_interval(Some(self.config.keepalive_interval()))
            .http2_keepalive_timeout(Some(self.config.keepalive_timeout()))
            .tcp_keepalive(self.config.tcp_keepalive())
            .tcp_nodelay(true)
            .max_concurrent_streams(Some(self.config.max_concurrent_streams))
    }

    /// Bind the configured address and serve until `shutdown` resolves
    pub async fn serve<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr: SocketAddr = self
            .config
            .bind_address()
            .parse()
            .map_err(|e| Error::config(format!("Invalid xDS address: {}", e)))?;

        let listener = TcpListener::bind(addr).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::AddrInUse {
                Error::transport(format!(
                    "XDS server failed to bind to {}: Port {} is already in use. Please use a different port or stop the existing service.",
                    addr,
                    addr.port()
                ))
            } else {
                Error::transport(format!("XDS server failed to bind to {}: {}", addr, e))
            }
        })?;

        self.serve_with_listener(listener, shutdown).await
    }

    /// Serve on an already bound listener until `shutdown` resolves
    pub async fn serve_with_listener<F>(self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let local_addr = listener.local_addr()?;
        info!(
            address = %local_addr,
            keepalive_interval = ?self.config.keepalive_interval(),
            keepalive_timeout = ?self.config.keepalive_timeout(),
            max_concurrent_streams = self.config.max_concurrent_streams,
            "XDS server listening"
        );

        let service = self.service.clone();
        let signal = async move {
            shutdown.await;
            info!("Shutting down xDS server");
            service.shutdown_streams();
        };

        self.builder()
            .add_service(AggregatedDiscoveryServiceServer::new(self.service.clone()))
            .serve_with_incoming_shutdown(TcpListenerStream::new(listener), signal)
            .await
            .map_err(|e| Error::transport(format!("XDS server failed: {}", e)))
    }
}
