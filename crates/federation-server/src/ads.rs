//! `AggregatedDiscoveryService` implementation.
//!
//! Every accepted stream becomes a subscriber of the [`DiscoveryServer`].
//! The stream's own task is the only writer of its response channel: it
//! answers inbound requests and forwards the responses pushed into the
//! subscriber's outbox.

use federation_proto::discovery::aggregated_discovery_service_server::AggregatedDiscoveryService;
use federation_proto::discovery::{
    DeltaDiscoveryRequest, DeltaDiscoveryResponse, DiscoveryRequest, DiscoveryResponse,
};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tonic::{Request, Response, Status, Streaming};
use tracing::{debug, info, instrument};

use crate::discovery::DiscoveryServer;
use crate::metrics::SubscriberTracker;
use crate::stream::StreamContext;
use crate::subscribers::Subscriber;

/// Response stream returned for each accepted subscriber.
pub type AdsResponseStream = ReceiverStream<Result<DiscoveryResponse, Status>>;

/// gRPC front of the discovery server.
#[derive(Debug, Clone)]
pub struct AdsService {
    server: DiscoveryServer,
}

impl AdsService {
    /// Create the service for `server`.
    pub fn new(server: DiscoveryServer) -> Self {
        Self { server }
    }
}

#[tonic::async_trait]
impl AggregatedDiscoveryService for AdsService {
    type StreamAggregatedResourcesStream = AdsResponseStream;

    #[instrument(skip(self, request), name = "fds_stream")]
    async fn stream_aggregated_resources(
        &self,
        request: Request<Streaming<DiscoveryRequest>>,
    ) -> Result<Response<Self::StreamAggregatedResourcesStream>, Status> {
        if self.server.shutdown_controller().is_shutdown() {
            return Err(Status::unavailable("server is shutting down"));
        }

        let ctx = StreamContext::new(request.remote_addr());
        let mut stream = request.into_inner();
        let (tx, rx) = mpsc::channel(self.server.config().response_buffer_size);

        let cancel = self.server.shutdown_controller().child_token();
        let subscriber = Subscriber::new(ctx.id(), tx.clone(), cancel.clone());
        self.server
            .subscribers()
            .insert(subscriber.clone());

        info!(
            subscriber = %ctx.id(),
            peer = ?ctx.remote_addr(),
            "discovery stream started"
        );

        let server = self.server.clone();
        tokio::spawn(async move {
            let _tracker = SubscriberTracker::new(server.metrics().clone());
            let _operation = server.shutdown_controller().register_operation();

            'stream: loop {
                let responses = tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!(subscriber = %ctx.id(), "subscriber closed");
                        break;
                    }
                    pushed = subscriber.pushed() => pushed,
                    next = stream.next() => {
                        let request = match next {
                            Some(Ok(request)) => request,
                            Some(Err(status)) => {
                                debug!(subscriber = %ctx.id(), error = %status, "stream error");
                                break;
                            }
                            None => break,
                        };
                        match server.handle_request(&ctx, &request) {
                            Some(response) => vec![response],
                            None => continue,
                        }
                    }
                };

                for response in responses {
                    tokio::select! {
                        _ = cancel.cancelled() => break 'stream,
                        sent = tx.send(Ok(response)) => {
                            if sent.is_err() {
                                debug!(subscriber = %ctx.id(), "peer disconnected");
                                break 'stream;
                            }
                            ctx.record_response();
                        }
                    }
                }
            }

            server.subscribers().remove(ctx.id());
            info!(
                subscriber = %ctx.id(),
                duration = ?ctx.duration(),
                requests = ctx.request_count(),
                acks = ctx.ack_count(),
                responses = ctx.response_count(),
                "discovery stream ended"
            );
        });

        Ok(Response::new(ReceiverStream::new(rx)))
    }

    type DeltaAggregatedResourcesStream = ReceiverStream<Result<DeltaDiscoveryResponse, Status>>;

    async fn delta_aggregated_resources(
        &self,
        _request: Request<Streaming<DeltaDiscoveryRequest>>,
    ) -> Result<Response<Self::DeltaAggregatedResourcesStream>, Status> {
        Err(Status::unimplemented(
            "incremental discovery is not supported",
        ))
    }
}
