//! Subscriber identification and per-stream bookkeeping.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Unique, monotonically increasing identifier of a subscriber stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Generate the next subscriber ID.
    pub fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the numeric value.
    #[inline]
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "subscriber-{}", self.0)
    }
}

/// Context for an accepted discovery stream.
#[derive(Debug)]
pub struct StreamContext {
    id: SubscriberId,
    remote_addr: Option<std::net::SocketAddr>,
    created_at: Instant,
    requests: AtomicU64,
    acks: AtomicU64,
    responses: AtomicU64,
}

impl StreamContext {
    /// Create a context with a fresh subscriber ID.
    pub fn new(remote_addr: Option<std::net::SocketAddr>) -> Self {
        Self {
            id: SubscriberId::next(),
            remote_addr,
            created_at: Instant::now(),
            requests: AtomicU64::new(0),
            acks: AtomicU64::new(0),
            responses: AtomicU64::new(0),
        }
    }

    /// Subscriber ID of this stream.
    #[inline]
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Peer socket address, when the transport exposes it.
    #[inline]
    pub fn remote_addr(&self) -> Option<std::net::SocketAddr> {
        self.remote_addr
    }

    /// Time since the stream was accepted.
    #[inline]
    pub fn duration(&self) -> std::time::Duration {
        self.created_at.elapsed()
    }

    /// Record an initial request.
    pub fn record_request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an ACK.
    pub fn record_ack(&self) {
        self.acks.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a response sent on the stream.
    pub fn record_response(&self) {
        self.responses.fetch_add(1, Ordering::Relaxed);
    }

    /// Initial requests received.
    #[inline]
    pub fn request_count(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    /// ACKs received.
    #[inline]
    pub fn ack_count(&self) -> u64 {
        self.acks.load(Ordering::Relaxed)
    }

    /// Responses sent.
    #[inline]
    pub fn response_count(&self) -> u64 {
        self.responses.load(Ordering::Relaxed)
    }
}
