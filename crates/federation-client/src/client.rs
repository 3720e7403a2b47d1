//! Discovery client for one peer.

use std::collections::HashMap;
use std::sync::Arc;

use federation_core::{FederationError, FederationResult, ResponseHandler};
use federation_proto::discovery::aggregated_discovery_service_client::AggregatedDiscoveryServiceClient;
use federation_proto::discovery::{DiscoveryRequest, DiscoveryResponse};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tonic::transport::{Channel, Endpoint};
use tracing::{debug, info, instrument, trace, warn};

use crate::backoff::Backoff;
use crate::config::ClientConfig;

/// Connects to a peer's discovery server and feeds every received snapshot
/// to the handler registered for its type.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use federation_client::{ClientConfig, DiscoveryClient};
/// use federation_core::{FederationResult, ResponseHandler, TypeUrl};
/// use prost_types::Any;
/// use tokio_util::sync::CancellationToken;
///
/// struct Print;
///
/// #[async_trait::async_trait]
/// impl ResponseHandler for Print {
///     async fn handle(&self, peer: &str, resources: Vec<Any>) -> FederationResult<()> {
///         println!("{peer}: {} resources", resources.len());
///         Ok(())
///     }
/// }
///
/// # async fn run() {
/// let client = DiscoveryClient::new(ClientConfig::new("west", "10.0.0.1:15080"))
///     .handler(TypeUrl::EXPORTED_SERVICE, Arc::new(Print));
/// client.run(CancellationToken::new()).await;
/// # }
/// ```
#[derive(Clone)]
pub struct DiscoveryClient {
    config: ClientConfig,
    handlers: HashMap<String, Arc<dyn ResponseHandler>>,
}

impl std::fmt::Debug for DiscoveryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut types: Vec<&String> = self.handlers.keys().collect();
        types.sort();
        f.debug_struct("DiscoveryClient")
            .field("config", &self.config)
            .field("handlers", &types)
            .finish()
    }
}

impl DiscoveryClient {
    /// Create a client without handlers.
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            handlers: HashMap::new(),
        }
    }

    /// Register the handler for `type_url`.
    #[must_use]
    pub fn handler(mut self, type_url: impl Into<String>, handler: Arc<dyn ResponseHandler>) -> Self {
        self.handlers.insert(type_url.into(), handler);
        self
    }

    /// Client configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Types requested when a stream opens, sorted.
    pub fn initial_type_urls(&self) -> Vec<String> {
        let mut types: Vec<String> = if self.config.initial_type_urls.is_empty() {
            self.handlers.keys().cloned().collect()
        } else {
            self.config.initial_type_urls.clone()
        };
        types.sort();
        types.dedup();
        types
    }

    /// One request per initial type, with empty version and nonce.
    pub fn initial_requests(&self) -> Vec<DiscoveryRequest> {
        self.initial_type_urls()
            .into_iter()
            .map(|type_url| DiscoveryRequest {
                type_url,
                ..Default::default()
            })
            .collect()
    }

    async fn connect(&self) -> FederationResult<AggregatedDiscoveryServiceClient<Channel>> {
        let endpoint = Endpoint::from_shared(self.config.endpoint_uri())
            .map_err(|e| FederationError::transport("invalid discovery address", e))?
            .connect_timeout(self.config.connect_timeout);
        let channel = endpoint
            .connect()
            .await
            .map_err(|e| FederationError::transport(format!("failed to connect to {}", self.config.address), e))?;
        Ok(AggregatedDiscoveryServiceClient::new(channel))
    }

    /// Hand `response` to its type's handler.
    ///
    /// Returns `false` when no handler is registered for the type. Handler
    /// errors are logged and do not end the stream.
    pub async fn dispatch(&self, response: DiscoveryResponse) -> bool {
        let Some(handler) = self.handlers.get(&response.type_url) else {
            warn!(
                peer = %self.config.peer,
                type_url = %response.type_url,
                "no handler for received type"
            );
            return false;
        };

        debug!(
            peer = %self.config.peer,
            type_url = %response.type_url,
            version = %response.version_info,
            resources = response.resources.len(),
            "received snapshot"
        );
        if let Err(error) = handler.handle(&self.config.peer, response.resources).await {
            warn!(
                peer = %self.config.peer,
                type_url = %response.type_url,
                %error,
                "failed to handle snapshot"
            );
        }
        true
    }

    /// Open one stream and process it until it ends or `shutdown` fires.
    ///
    /// Returns `Ok(())` only on shutdown; every other exit is an error for
    /// the caller to retry.
    pub async fn run_once(&self, shutdown: &CancellationToken) -> FederationResult<()> {
        self.stream(shutdown, &mut self.backoff()).await
    }

    /// Reconnect backoff capped at the configured reconnect delay.
    pub fn backoff(&self) -> Backoff {
        Backoff::new(self.config.reconnect_delay)
    }

    /// Like [`run_once`](Self::run_once), resetting `backoff` once the
    /// stream is open.
    #[instrument(skip(self, shutdown, backoff), fields(peer = %self.config.peer, address = %self.config.address))]
    async fn stream(&self, shutdown: &CancellationToken, backoff: &mut Backoff) -> FederationResult<()> {
        let mut client = tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            client = self.connect() => client?,
        };

        let initial = self.initial_requests();
        let (requests, rx) = mpsc::channel(initial.len() + 16);
        for request in initial {
            debug!(type_url = %request.type_url, "requesting initial snapshot");
            requests
                .send(request)
                .await
                .map_err(|_| FederationError::StreamClosed {
                    reason: "request channel closed".into(),
                })?;
        }

        let mut inbound = client
            .stream_aggregated_resources(ReceiverStream::new(rx))
            .await
            .map_err(|status| FederationError::transport("failed to open discovery stream", status))?
            .into_inner();
        backoff.reset();
        info!("discovery stream opened");

        loop {
            let message = tokio::select! {
                _ = shutdown.cancelled() => return Ok(()),
                message = inbound.message() => message,
            };

            let response = match message {
                Ok(Some(response)) => response,
                Ok(None) => {
                    return Err(FederationError::StreamClosed {
                        reason: "server closed the stream".into(),
                    })
                }
                Err(status) => {
                    return Err(FederationError::transport("discovery stream failed", status))
                }
            };

            let ack = DiscoveryRequest {
                version_info: response.version_info.clone(),
                type_url: response.type_url.clone(),
                response_nonce: response.nonce.clone(),
                ..Default::default()
            };
            self.dispatch(response).await;

            trace!(type_url = %ack.type_url, nonce = %ack.response_nonce, "sending ACK");
            if requests.send(ack).await.is_err() {
                return Err(FederationError::StreamClosed {
                    reason: "request stream closed".into(),
                });
            }
        }
    }

    /// Keep a stream to the peer open until `shutdown` fires, reconnecting
    /// with exponential backoff capped at `reconnect_delay` whenever it fails.
    pub async fn run(self, shutdown: CancellationToken) {
        info!(peer = %self.config.peer, address = %self.config.address, "discovery client started");
        let mut backoff = self.backoff();

        loop {
            let delay = match self.stream(&shutdown, &mut backoff).await {
                Ok(()) => break,
                Err(error) => {
                    let delay = backoff.next_delay();
                    warn!(
                        peer = %self.config.peer,
                        %error,
                        attempt = backoff.attempts(),
                        delay = ?delay,
                        "discovery stream lost, reconnecting"
                    );
                    delay
                }
            };

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        info!(peer = %self.config.peer, "discovery client stopped");
    }
}
