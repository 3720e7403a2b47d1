//! The discovery server: subscriber set, snapshot generation and push.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use federation_core::{
    generate_nonce, FederationError, FederationResult, GeneratorRegistry, PushRequest,
    ResourceVersion,
};
use federation_proto::discovery::aggregated_discovery_service_server::AggregatedDiscoveryServiceServer;
use federation_proto::discovery::{ControlPlane, DiscoveryRequest, DiscoveryResponse};
use prost_types::Any;
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::server::Router;
use tonic::transport::Server;
use tracing::{debug, info, trace, warn};

use crate::ads::AdsService;
use crate::builder::DiscoveryServerBuilder;
use crate::config::ServerConfig;
use crate::health::HealthService;
use crate::metrics::{DiscoveryMetrics, GenerateTimer};
use crate::shutdown::ShutdownController;
use crate::stream::StreamContext;
use crate::subscribers::{BroadcastOutcome, SubscriberSet};

/// What a call to [`DiscoveryServer::push`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    /// Nobody is subscribed; nothing was generated.
    NoSubscribers,
    /// No generator is registered for the type and no payload was supplied.
    NoGenerator,
    /// The snapshot was broadcast.
    Broadcast(BroadcastOutcome),
}

/// Federation discovery server.
///
/// Cheap to clone; every clone shares the same subscriber set.
#[derive(Debug, Clone)]
pub struct DiscoveryServer {
    inner: Arc<ServerInner>,
}

#[derive(Debug)]
struct ServerInner {
    registry: Arc<GeneratorRegistry>,
    subscribers: SubscriberSet,
    config: ServerConfig,
    metrics: DiscoveryMetrics,
    shutdown: ShutdownController,
}

impl DiscoveryServer {
    /// Create a new builder for configuring the server.
    pub fn builder() -> DiscoveryServerBuilder {
        DiscoveryServerBuilder::new()
    }

    pub(crate) fn from_parts(
        registry: Arc<GeneratorRegistry>,
        config: ServerConfig,
        shutdown: ShutdownController,
    ) -> Self {
        Self {
            inner: Arc::new(ServerInner {
                registry,
                subscribers: SubscriberSet::new(),
                config,
                metrics: DiscoveryMetrics::new(),
                shutdown,
            }),
        }
    }

    /// Generator registry.
    #[inline]
    pub fn registry(&self) -> &Arc<GeneratorRegistry> {
        &self.inner.registry
    }

    /// Current subscribers.
    #[inline]
    pub fn subscribers(&self) -> &SubscriberSet {
        &self.inner.subscribers
    }

    /// Server configuration.
    #[inline]
    pub fn config(&self) -> &ServerConfig {
        &self.inner.config
    }

    /// Metrics handle.
    #[inline]
    pub fn metrics(&self) -> &DiscoveryMetrics {
        &self.inner.metrics
    }

    /// Shutdown controller governing every stream.
    #[inline]
    pub fn shutdown_controller(&self) -> &ShutdownController {
        &self.inner.shutdown
    }

    /// Run the generator for `type_url`.
    ///
    /// Returns `None` when no generator is registered. A failing generator
    /// is logged and yields an empty snapshot.
    pub fn generate(&self, type_url: &str) -> Option<Vec<Any>> {
        let timer = GenerateTimer::start(&self.inner.metrics, type_url);
        let result = self.inner.registry.generate(type_url)?;
        timer.finish();

        match result {
            Ok(resources) => Some(resources),
            Err(error) => {
                self.inner.metrics.record_generator_error(type_url);
                warn!(type_url, %error, "generator failed, serving empty snapshot");
                Some(Vec::new())
            }
        }
    }

    /// Build a response carrying `resources` with a fresh nonce.
    pub fn response(
        &self,
        type_url: &str,
        version: &ResourceVersion,
        resources: Vec<Any>,
    ) -> DiscoveryResponse {
        DiscoveryResponse {
            version_info: version.to_string(),
            resources,
            type_url: type_url.to_string(),
            nonce: generate_nonce(),
            control_plane: Some(ControlPlane {
                identifier: self.inner.config.control_plane_id.clone(),
            }),
        }
    }

    /// Answer one inbound request.
    ///
    /// A request with an empty version asks for the current snapshot. Any
    /// other request acknowledges a previous response and is not answered,
    /// nor is a request for a type without a generator.
    pub fn handle_request(
        &self,
        ctx: &StreamContext,
        request: &DiscoveryRequest,
    ) -> Option<DiscoveryResponse> {
        if !request.version_info.is_empty() {
            ctx.record_ack();
            trace!(
                subscriber = %ctx.id(),
                type_url = %request.type_url,
                version = %request.version_info,
                nonce = %request.response_nonce,
                "ACK"
            );
            return None;
        }

        ctx.record_request();
        let Some(resources) = self.generate(&request.type_url) else {
            debug!(
                subscriber = %ctx.id(),
                type_url = %request.type_url,
                "no generator for requested type, ignoring"
            );
            return None;
        };

        debug!(
            subscriber = %ctx.id(),
            type_url = %request.type_url,
            resources = resources.len(),
            "sending initial snapshot"
        );
        self.inner.metrics.record_response(&request.type_url);
        Some(self.response(&request.type_url, &ResourceVersion::now(), resources))
    }

    /// Broadcast a snapshot of `request.type_url` to every subscriber.
    ///
    /// With no subscribers the generator is not invoked. A subscriber whose
    /// send fails is closed and removed without affecting the others.
    pub fn push(&self, request: &PushRequest) -> PushOutcome {
        let type_url = request.type_url.as_str();

        if self.inner.subscribers.is_empty() {
            self.inner.metrics.record_push_skipped(type_url);
            debug!(type_url, "no subscribers, skipping push");
            return PushOutcome::NoSubscribers;
        }

        let resources = match &request.resources {
            Some(resources) => resources.clone(),
            None => match self.generate(type_url) {
                Some(resources) => resources,
                None => {
                    debug!(type_url, "no generator for pushed type");
                    return PushOutcome::NoGenerator;
                }
            },
        };

        let version = ResourceVersion::now();
        let outcome = self
            .inner
            .subscribers
            .broadcast(|_| self.response(type_url, &version, resources.clone()));

        self.inner.metrics.record_push(type_url, outcome.delivered);
        self.inner.metrics.record_evictions(outcome.evicted.len());
        info!(
            type_url,
            version = %version,
            resources = resources.len(),
            delivered = outcome.delivered,
            coalesced = outcome.coalesced,
            evicted = outcome.evicted.len(),
            "pushed snapshot"
        );
        PushOutcome::Broadcast(outcome)
    }

    /// Close every subscriber stream.
    pub fn close_all_subscribers(&self) -> usize {
        let closed = self.inner.subscribers.close_all();
        if closed > 0 {
            info!(closed, "closed subscriber streams");
        }
        closed
    }

    async fn build_router(&self) -> (Router, Option<HealthService>) {
        let config = &self.inner.config;
        let mut builder = Server::builder();

        if let Some(interval) = config.keepalive_interval {
            builder = builder.http2_keepalive_interval(Some(interval));
        }
        if let Some(timeout) = config.keepalive_timeout {
            builder = builder.http2_keepalive_timeout(Some(timeout));
        }
        if let Some(max_streams) = config.max_concurrent_streams {
            builder = builder.concurrency_limit_per_connection(max_streams as usize);
        }

        let ads = AggregatedDiscoveryServiceServer::new(AdsService::new(self.clone()));
        let mut router = builder.add_service(ads);

        let health = if config.enable_health {
            let (health, health_svc) = HealthService::new();
            router = router.add_service(health_svc);
            health.set_all_serving().await;
            Some(health)
        } else {
            None
        };

        (router, health)
    }

    fn drain(
        &self,
        signal: impl Future<Output = ()> + Send + 'static,
        health: Option<HealthService>,
    ) -> impl Future<Output = ()> + Send + 'static {
        let server = self.clone();
        async move {
            tokio::select! {
                _ = signal => {}
                _ = server.inner.shutdown.cancelled() => {}
            }
            server.inner.shutdown.trigger();
            server.close_all_subscribers();

            if let Some(health) = health {
                health.set_all_not_serving().await;
            }

            let grace_period = server.inner.config.grace_period;
            info!(grace_period = ?grace_period, "draining connections");
            tokio::time::sleep(grace_period).await;
        }
    }

    /// Listen on `addr` until `signal` resolves or the shutdown controller
    /// fires.
    pub async fn serve_with_shutdown(
        self,
        addr: SocketAddr,
        signal: impl Future<Output = ()> + Send + 'static,
    ) -> FederationResult<()> {
        let (router, health) = self.build_router().await;
        info!(addr = %addr, "federation discovery server listening");
        router
            .serve_with_shutdown(addr, self.drain(signal, health))
            .await
            .map_err(|e| FederationError::transport("discovery server failed", e))
    }

    /// Serve on an already bound listener.
    pub async fn serve_with_listener(
        self,
        listener: TcpListener,
        signal: impl Future<Output = ()> + Send + 'static,
    ) -> FederationResult<()> {
        let (router, health) = self.build_router().await;
        if let Ok(addr) = listener.local_addr() {
            info!(addr = %addr, "federation discovery server listening");
        }
        router
            .serve_with_incoming_shutdown(TcpListenerStream::new(listener), self.drain(signal, health))
            .await
            .map_err(|e| FederationError::transport("discovery server failed", e))
    }
}
