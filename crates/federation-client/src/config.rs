//! Client configuration.

use std::time::Duration;

/// Default upper bound of the reconnect backoff.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Configuration of one discovery client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Name of the peer, passed to response handlers and logged.
    pub peer: String,
    /// `host:port` of the peer's discovery service.
    pub address: String,
    /// Bound on establishing the connection.
    pub connect_timeout: Duration,
    /// Upper bound of the wait between a failed or closed stream and the
    /// next attempt.
    pub reconnect_delay: Duration,
    /// Types requested when a stream opens; empty means every handled type.
    pub initial_type_urls: Vec<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            peer: String::new(),
            address: String::new(),
            connect_timeout: DEFAULT_RECONNECT_DELAY,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            initial_type_urls: Vec::new(),
        }
    }
}

impl ClientConfig {
    /// Configuration for `peer` at `address` with default timings.
    pub fn new(peer: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            peer: peer.into(),
            address: address.into(),
            ..Default::default()
        }
    }

    /// Set both the connect timeout and the reconnect delay.
    #[must_use]
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self.connect_timeout = delay;
        self
    }

    /// URI of the discovery endpoint.
    pub fn endpoint_uri(&self) -> String {
        if self.address.starts_with("http://") || self.address.starts_with("https://") {
            self.address.clone()
        } else {
            format!("http://{}", self.address)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_uri_adds_scheme() {
        let config = ClientConfig::new("west", "10.0.0.1:15080");
        assert_eq!(config.endpoint_uri(), "http://10.0.0.1:15080");

        let config = ClientConfig::new("west", "http://fds:15080");
        assert_eq!(config.endpoint_uri(), "http://fds:15080");
    }

    #[test]
    fn reconnect_delay_bounds_connect() {
        let config = ClientConfig::new("west", "a:1").with_reconnect_delay(Duration::from_secs(2));
        assert_eq!(config.connect_timeout, Duration::from_secs(2));
        assert_eq!(config.reconnect_delay, Duration::from_secs(2));
    }
}
