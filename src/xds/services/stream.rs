//! State-of-the-world ADS stream loop
//!
//! One loop runs per open stream. The first request identifies the node and its
//! fleet (`node.cluster`) and registers it with the [`FleetSnapshotCache`].
//! From then on the loop answers requests from the snapshot the node currently
//! holds and pushes every resource type the node has subscribed to whenever a
//! new snapshot arrives for its fleet.
//!
//! # ACK/NACK
//!
//! - ACK: nonce and version match the last response of that type, no error
//!   detail. Nothing is sent back.
//! - NACK: nonce matches but `error_detail` is set. Logged; the node keeps its
//!   previous configuration until the next snapshot.
//! - A request carrying a nonce older than the last response is stale and
//!   ignored.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio_stream::{wrappers::ReceiverStream, Stream, StreamExt};
use tonic::Status;
use tracing::{debug, error, info, warn, Instrument};

use crate::errors::Error;
use crate::observability::recorder;
use crate::xds::cache::FleetSnapshotCache;
use crate::xds::nodes::NodeRegistration;
use crate::xds::resources::BuiltResource;
use crate::xds::snapshot::Snapshot;
use envoy_types::pb::envoy::config::core::v3::Node;
use envoy_types::pb::envoy::service::discovery::v3::{DiscoveryRequest, DiscoveryResponse};
use uuid::Uuid;

/// Responses produced for one stream
pub type ResponseStream = ReceiverStream<std::result::Result<DiscoveryResponse, Status>>;

/// Last response sent for one resource type
#[derive(Clone, Debug)]
struct LastDiscoverySnapshot {
    version: Arc<str>,
    nonce: Arc<str>,
}

#[derive(Debug, PartialEq, Eq)]
enum RequestKind {
    Ack,
    Nack,
    Stale,
    Fresh,
}

fn classify(request: &DiscoveryRequest, last: Option<&LastDiscoverySnapshot>) -> RequestKind {
    if request.response_nonce.is_empty() {
        return RequestKind::Fresh;
    }
    let Some(last) = last else {
        // Nonce from a previous stream; treat as a new subscription
        return RequestKind::Fresh;
    };
    if request.response_nonce.as_str() != last.nonce.as_ref() {
        return RequestKind::Stale;
    }
    if request.error_detail.is_some() {
        return RequestKind::Nack;
    }
    if request.version_info.as_str() == last.version.as_ref() {
        RequestKind::Ack
    } else {
        RequestKind::Fresh
    }
}

/// Node id and fleet from the handshake
fn node_identity(node: Option<&Node>) -> std::result::Result<(String, String), Status> {
    let node = node.ok_or_else(|| Status::invalid_argument("discovery request carries no node"))?;
    if node.id.is_empty() {
        return Err(Status::invalid_argument("node id is empty"));
    }
    if node.cluster.is_empty() {
        return Err(Status::invalid_argument(format!(
            "node {} has no cluster; it must name its fleet as name.namespace",
            node.id
        )));
    }
    Ok((node.id.clone(), node.cluster.clone()))
}

/// Full state-of-the-world response for one resource type
pub fn build_response(snapshot: &Snapshot, type_url: &str) -> DiscoveryResponse {
    let resources = snapshot.resources(type_url);
    if resources.is_empty() {
        debug!(type_url = %type_url, version = %snapshot.version(), "Snapshot carries no resources of this type");
    }

    DiscoveryResponse {
        version_info: snapshot.version().to_string(),
        resources: resources.into_iter().map(BuiltResource::into_any).collect(),
        canary: false,
        type_url: type_url.to_string(),
        nonce: Uuid::new_v4().to_string(),
        control_plane: None,
        resource_errors: Vec::new(),
    }
}

/// Per-stream state once the node is registered
struct Session {
    node_id: String,
    fleet: String,
    registration: NodeRegistration,
    current: Arc<Snapshot>,
    last_sent: HashMap<String, LastDiscoverySnapshot>,
    subscribed: BTreeSet<String>,
}

impl Session {
    fn respond(&mut self, type_url: &str) -> DiscoveryResponse {
        let response = build_response(&self.current, type_url);
        self.last_sent.insert(
            type_url.to_string(),
            LastDiscoverySnapshot {
                version: Arc::from(response.version_info.as_str()),
                nonce: Arc::from(response.nonce.as_str()),
            },
        );
        response
    }
}

async fn send(
    tx: &mpsc::Sender<std::result::Result<DiscoveryResponse, Status>>,
    response: DiscoveryResponse,
    label: &str,
) -> bool {
    info!(
        type_url = %response.type_url,
        version = %response.version_info,
        nonce = %response.nonce,
        resource_count = response.resources.len(),
        stream = %label,
        "Sending discovery response"
    );
    if tx.send(Ok(response)).await.is_err() {
        error!(stream = %label, "Discovery response receiver dropped");
        return false;
    }
    true
}

async fn snapshot_changed(session: &mut Option<Session>) -> std::result::Result<(), watch::error::RecvError> {
    match session {
        Some(session) => session.registration.snapshots.changed().await,
        None => std::future::pending().await,
    }
}

/// Run the ADS loop for one stream.
///
/// Returns the response stream immediately; the loop itself runs on a spawned
/// task and ends when the client closes the stream, the node is replaced by a
/// newer connection with the same id, or `shutdown` flips to `true`.
pub fn run_stream_loop<S>(
    cache: Arc<FleetSnapshotCache>,
    mut in_stream: S,
    mut shutdown: watch::Receiver<bool>,
    label: &str,
) -> ResponseStream
where
    S: Stream<Item = std::result::Result<DiscoveryRequest, Status>> + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(100);
    let label: Arc<str> = Arc::from(label);

    tokio::spawn(async move {
        let mut session: Option<Session> = None;

        loop {
            tokio::select! {
                result = in_stream.next() => {
                    let request = match result {
                        Some(Ok(request)) => request,
                        Some(Err(e)) => {
                            warn!(stream = %label, "Error receiving discovery request: {}", e);
                            let _ = tx.send(Err(e)).await;
                            break;
                        }
                        None => {
                            info!(stream = %label, "ADS stream ended by client");
                            break;
                        }
                    };

                    if session.is_none() {
                        let (node_id, fleet) = match node_identity(request.node.as_ref()) {
                            Ok(identity) => identity,
                            Err(status) => {
                                warn!(stream = %label, error = %status.message(), "Rejecting discovery stream");
                                let _ = tx.send(Err(status)).await;
                                break;
                            }
                        };
                        match cache.on_node_connect(&node_id, &fleet) {
                            Ok(registration) => {
                                let current = Arc::clone(&registration.snapshots.borrow());
                                session = Some(Session {
                                    node_id,
                                    fleet,
                                    registration,
                                    current,
                                    last_sent: HashMap::new(),
                                    subscribed: BTreeSet::new(),
                                });
                            }
                            Err(e @ Error::UnknownFleet(_)) => {
                                warn!(stream = %label, node_id = %node_id, error = %e, "Node connected before its fleet has a snapshot");
                                let _ = tx.send(Err(Status::unavailable(e.to_string()))).await;
                                break;
                            }
                            Err(e) => {
                                error!(stream = %label, node_id = %node_id, error = %e, "Failed to register node");
                                let _ = tx.send(Err(Status::internal(e.to_string()))).await;
                                break;
                            }
                        }
                    }
                    let Some(active) = session.as_mut() else { break };

                    let span = crate::xds_span!("discovery_request", active.node_id, type_url = %request.type_url, fleet = %active.fleet);
                    let response = async {
                        let kind = classify(&request, active.last_sent.get(&request.type_url));
                        match kind {
                            RequestKind::Ack => {
                                recorder().record_xds_response(&request.type_url, true);
                                debug!(
                                    version = %request.version_info,
                                    nonce = %request.response_nonce,
                                    stream = %label,
                                    "[ACK] Skipping duplicate discovery request"
                                );
                                None
                            }
                            RequestKind::Nack => {
                                recorder().record_xds_response(&request.type_url, false);
                                if let Some(error_detail) = request.error_detail.as_ref() {
                                    warn!(
                                        nonce = %request.response_nonce,
                                        error_code = error_detail.code,
                                        error_message = %error_detail.message,
                                        stream = %label,
                                        "[NACK] Envoy rejected previous response"
                                    );
                                }
                                None
                            }
                            RequestKind::Stale => {
                                debug!(nonce = %request.response_nonce, stream = %label, "Ignoring request with stale nonce");
                                None
                            }
                            RequestKind::Fresh => {
                                active.subscribed.insert(request.type_url.clone());
                                Some(active.respond(&request.type_url))
                            }
                        }
                    }
                    .instrument(span)
                    .await;

                    if let Some(response) = response {
                        if !send(&tx, response, &label).await {
                            break;
                        }
                    }
                }
                changed = snapshot_changed(&mut session) => {
                    let Some(active) = session.as_mut() else { break };
                    if changed.is_err() {
                        info!(stream = %label, node_id = %active.node_id, "Node registration replaced by a newer stream");
                        break;
                    }
                    active.current = Arc::clone(&active.registration.snapshots.borrow_and_update());
                    info!(
                        stream = %label,
                        node_id = %active.node_id,
                        fleet = %active.fleet,
                        version = %active.current.version(),
                        "Pushing snapshot update"
                    );

                    let types: Vec<String> = active.subscribed.iter().cloned().collect();
                    let mut delivered = true;
                    for type_url in types {
                        let response = active.respond(&type_url);
                        if !send(&tx, response, &label).await {
                            delivered = false;
                            break;
                        }
                    }
                    if !delivered {
                        break;
                    }
                }
                signal = shutdown.changed() => {
                    if signal.is_err() || *shutdown.borrow() {
                        info!(stream = %label, "Shutting down ADS stream");
                        break;
                    }
                }
            }
        }

        if let Some(active) = session {
            cache.on_node_disconnect(&active.node_id, active.registration.connection);
        }
    });

    ReceiverStream::new(rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use envoy_types::pb::google::rpc::Status as RpcStatus;

    fn last() -> LastDiscoverySnapshot {
        LastDiscoverySnapshot { version: Arc::from("v1"), nonce: Arc::from("n1") }
    }

    fn request(version: &str, nonce: &str) -> DiscoveryRequest {
        DiscoveryRequest {
            version_info: version.into(),
            response_nonce: nonce.into(),
            ..Default::default()
        }
    }

    #[test]
    fn classifies_requests() {
        assert_eq!(classify(&request("", ""), None), RequestKind::Fresh);
        assert_eq!(classify(&request("v1", "n1"), Some(&last())), RequestKind::Ack);
        assert_eq!(classify(&request("v0", "old"), Some(&last())), RequestKind::Stale);

        let mut nack = request("v0", "n1");
        nack.error_detail = Some(RpcStatus { code: 3, message: "bad route".into(), details: vec![] });
        assert_eq!(classify(&nack, Some(&last())), RequestKind::Nack);
    }

    #[test]
    fn node_without_cluster_is_rejected() {
        let node = Node { id: "envoy-1".into(), ..Default::default() };
        let status = node_identity(Some(&node)).unwrap_err();
        assert_eq!(status.code(), tonic::Code::InvalidArgument);
        assert!(node_identity(None).is_err());
    }
}
