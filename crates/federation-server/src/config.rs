//! Server configuration.

use std::time::Duration;

/// Configuration for the discovery server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Responses buffered on each subscriber stream. Pushes beyond it wait
    /// in the subscriber outbox, newest per type.
    pub response_buffer_size: usize,
    /// Maximum concurrent streams per connection.
    pub max_concurrent_streams: Option<u32>,
    /// HTTP/2 keepalive interval.
    pub keepalive_interval: Option<Duration>,
    /// HTTP/2 keepalive timeout.
    pub keepalive_timeout: Option<Duration>,
    /// Time between NOT_SERVING and stopping the transport.
    pub grace_period: Duration,
    /// Serve `grpc.health.v1.Health` next to the discovery service.
    pub enable_health: bool,
    /// Reported as `controlPlane.identifier` on every response.
    pub control_plane_id: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            response_buffer_size: 16,
            max_concurrent_streams: Some(100),
            keepalive_interval: Some(Duration::from_secs(30)),
            keepalive_timeout: Some(Duration::from_secs(10)),
            grace_period: Duration::from_secs(5),
            enable_health: true,
            control_plane_id: String::new(),
        }
    }
}
