//! Builder for the discovery server.

use std::sync::Arc;
use std::time::Duration;

use federation_core::{FederationError, FederationResult, GeneratorRegistry};

use crate::config::ServerConfig;
use crate::discovery::DiscoveryServer;
use crate::shutdown::ShutdownController;

/// Builder for creating a [`DiscoveryServer`].
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use federation_core::GeneratorRegistry;
/// use federation_server::DiscoveryServer;
///
/// let server = DiscoveryServer::builder()
///     .registry(Arc::new(GeneratorRegistry::new()))
///     .control_plane_id("federation-controller-0")
///     .build()
///     .unwrap();
/// assert!(server.subscribers().is_empty());
/// ```
#[derive(Debug, Default)]
pub struct DiscoveryServerBuilder {
    registry: Option<Arc<GeneratorRegistry>>,
    shutdown: Option<ShutdownController>,
    config: ServerConfig,
}

impl DiscoveryServerBuilder {
    /// Create a new server builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the generator registry. Required.
    pub fn registry(mut self, registry: Arc<GeneratorRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Share a shutdown controller with the rest of the process.
    ///
    /// If not set, the server gets its own.
    pub fn shutdown(mut self, shutdown: ShutdownController) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the per-subscriber response buffer.
    pub fn response_buffer_size(mut self, size: usize) -> Self {
        self.config.response_buffer_size = size;
        self
    }

    /// Set maximum concurrent streams per connection.
    pub fn max_concurrent_streams(mut self, max: u32) -> Self {
        self.config.max_concurrent_streams = Some(max);
        self
    }

    /// Set keepalive interval.
    pub fn keepalive_interval(mut self, interval: Duration) -> Self {
        self.config.keepalive_interval = Some(interval);
        self
    }

    /// Set keepalive timeout.
    pub fn keepalive_timeout(mut self, timeout: Duration) -> Self {
        self.config.keepalive_timeout = Some(timeout);
        self
    }

    /// Set the drain period between NOT_SERVING and transport stop.
    pub fn grace_period(mut self, grace_period: Duration) -> Self {
        self.config.grace_period = grace_period;
        self
    }

    /// Disable the gRPC health service.
    pub fn disable_health(mut self) -> Self {
        self.config.enable_health = false;
        self
    }

    /// Set the `controlPlane.identifier` of every response.
    pub fn control_plane_id(mut self, id: impl Into<String>) -> Self {
        self.config.control_plane_id = id.into();
        self
    }

    /// Build the server.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if no registry was provided or the
    /// response buffer is zero.
    pub fn build(self) -> FederationResult<DiscoveryServer> {
        let registry = self
            .registry
            .ok_or_else(|| FederationError::Configuration("generator registry is required".into()))?;

        if self.config.response_buffer_size == 0 {
            return Err(FederationError::Configuration(
                "response buffer size must be at least 1".into(),
            ));
        }

        Ok(DiscoveryServer::from_parts(
            registry,
            self.config,
            self.shutdown.unwrap_or_default(),
        ))
    }
}
