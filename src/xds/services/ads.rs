use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::watch;
use tokio_stream::Stream;
use tonic::{Request, Response, Status};
use tracing::info;

use envoy_types::pb::envoy::service::discovery::v3::{
    aggregated_discovery_service_server::AggregatedDiscoveryService, DeltaDiscoveryRequest,
    DeltaDiscoveryResponse, DiscoveryRequest, DiscoveryResponse,
};

use crate::xds::cache::FleetSnapshotCache;

/// Aggregated discovery service answering every node from its fleet's snapshot
#[derive(Debug, Clone)]
pub struct FleetAggregatedDiscoveryService {
    cache: Arc<FleetSnapshotCache>,
    shutdown: Arc<watch::Sender<bool>>,
}

impl FleetAggregatedDiscoveryService {
    pub fn new(cache: Arc<FleetSnapshotCache>) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self { cache, shutdown: Arc::new(shutdown) }
    }

    pub fn cache(&self) -> &Arc<FleetSnapshotCache> {
        &self.cache
    }

    /// Ask every open stream to finish
    pub fn shutdown_streams(&self) {
        self.shutdown.send_replace(true);
    }

    /// Serve one stream of requests; shared by the gRPC handler and in-process callers
    pub fn open_stream<S>(&self, requests: S) -> super::stream::ResponseStream
    where
        S: Stream<Item = std::result::Result<DiscoveryRequest, Status>> + Unpin + Send + 'static,
    {
        super::stream::run_stream_loop(self.cache.clone(), requests, self.shutdown.subscribe(), "ads")
    }
}

#[tonic::async_trait]
impl AggregatedDiscoveryService for FleetAggregatedDiscoveryService {
    type StreamAggregatedResourcesStream =
        Pin<Box<dyn Stream<Item = std::result::Result<DiscoveryResponse, Status>> + Send>>;
    type DeltaAggregatedResourcesStream =
        Pin<Box<dyn Stream<Item = std::result::Result<DeltaDiscoveryResponse, Status>> + Send>>;

    async fn stream_aggregated_resources(
        &self,
        request: Request<tonic::Streaming<DiscoveryRequest>>,
    ) -> std::result::Result<Response<Self::StreamAggregatedResourcesStream>, Status> {
        info!(remote_addr = ?request.remote_addr(), "New ADS stream connection established");
        let stream = self.open_stream(request.into_inner());
        Ok(Response::new(Box::pin(stream)))
    }

    async fn delta_aggregated_resources(
        &self,
        _request: Request<tonic::Streaming<DeltaDiscoveryRequest>>,
    ) -> std::result::Result<Response<Self::DeltaAggregatedResourcesStream>, Status> {
        Err(Status::unimplemented("only state-of-the-world ADS is served"))
    }
}
