//! The set of peers currently subscribed to the discovery server.
//!
//! Each subscriber owns the sending half of its stream's response channel,
//! an outbox of pushed responses not yet written to that channel, and a
//! cancellation token that ends the stream's receive loop.
//!
//! Pushes never wait on a peer. They land in the outbox, which keeps only
//! the newest response per type, and the stream's own task moves them onto
//! the channel as the peer reads.

use std::sync::{Arc, Mutex, PoisonError};

use dashmap::DashMap;
use federation_proto::discovery::DiscoveryResponse;
use tokio::sync::{mpsc, Notify};
use tokio_util::sync::CancellationToken;
use tonic::Status;
use tracing::{debug, warn};

use crate::stream::SubscriberId;

/// Sending half of a subscriber's response stream.
pub type ResponseSender = mpsc::Sender<Result<DiscoveryResponse, Status>>;

/// The peer's stream is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriberClosed;

/// How a pushed response was queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Queued {
    /// Appended to the outbox.
    Added,
    /// Replaced an undelivered response of the same type.
    Coalesced,
}

#[derive(Debug, Default)]
struct Outbox {
    pending: Mutex<Vec<DiscoveryResponse>>,
    ready: Notify,
}

/// One connected peer stream.
#[derive(Debug, Clone)]
pub struct Subscriber {
    id: SubscriberId,
    sender: ResponseSender,
    cancel: CancellationToken,
    outbox: Arc<Outbox>,
}

impl Subscriber {
    /// Create a subscriber.
    pub fn new(id: SubscriberId, sender: ResponseSender, cancel: CancellationToken) -> Self {
        Self {
            id,
            sender,
            cancel,
            outbox: Arc::new(Outbox::default()),
        }
    }

    /// Subscriber ID.
    #[inline]
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Token cancelled when the subscriber is closed.
    #[inline]
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Queue a pushed response without waiting.
    ///
    /// An undelivered response of the same type is replaced, since every
    /// response carries the full snapshot of its type.
    pub fn offer(&self, response: DiscoveryResponse) -> Result<Queued, SubscriberClosed> {
        if self.sender.is_closed() || self.cancel.is_cancelled() {
            return Err(SubscriberClosed);
        }

        let queued = {
            let mut pending = self.outbox.pending.lock().unwrap_or_else(PoisonError::into_inner);
            let before = pending.len();
            pending.retain(|queued| queued.type_url != response.type_url);
            let queued = if pending.len() < before {
                Queued::Coalesced
            } else {
                Queued::Added
            };
            pending.push(response);
            queued
        };
        self.outbox.ready.notify_one();
        Ok(queued)
    }

    /// Wait for pushed responses and take them, oldest first.
    ///
    /// Cancel safe: nothing is taken until the wait completes.
    pub async fn pushed(&self) -> Vec<DiscoveryResponse> {
        loop {
            self.outbox.ready.notified().await;
            let pending = std::mem::take(
                &mut *self.outbox.pending.lock().unwrap_or_else(PoisonError::into_inner),
            );
            if !pending.is_empty() {
                return pending;
            }
        }
    }

    /// Cancel the subscriber's stream.
    pub fn close(&self) {
        self.cancel.cancel();
    }
}

/// Result of a broadcast.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastOutcome {
    /// Subscribers that accepted the response.
    pub delivered: usize,
    /// Of those, subscribers where it replaced an undelivered response.
    pub coalesced: usize,
    /// Subscribers removed because their stream is gone.
    pub evicted: Vec<SubscriberId>,
}

/// Concurrent set of subscribers keyed by ID.
///
/// Owned by one discovery server; every mutation is a single map operation.
#[derive(Debug, Clone, Default)]
pub struct SubscriberSet {
    inner: Arc<DashMap<SubscriberId, Subscriber>>,
}

impl SubscriberSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a subscriber.
    pub fn insert(&self, subscriber: Subscriber) {
        debug!(subscriber = %subscriber.id(), "subscriber registered");
        self.inner.insert(subscriber.id(), subscriber);
    }

    /// Remove a subscriber, returning it.
    pub fn remove(&self, id: SubscriberId) -> Option<Subscriber> {
        self.inner.remove(&id).map(|(_, s)| s)
    }

    /// Check if a subscriber is present.
    pub fn contains(&self, id: SubscriberId) -> bool {
        self.inner.contains_key(&id)
    }

    /// Number of subscribers.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Check if there are no subscribers.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Offer `build(id)` to every subscriber.
    ///
    /// A subscriber whose stream is gone is closed and removed; the others
    /// still receive the response. A slow subscriber is never removed. No
    /// map guard is held while offering.
    pub fn broadcast<F>(&self, mut build: F) -> BroadcastOutcome
    where
        F: FnMut(SubscriberId) -> DiscoveryResponse,
    {
        let subscribers: Vec<Subscriber> = self.inner.iter().map(|r| r.value().clone()).collect();

        let mut outcome = BroadcastOutcome::default();
        for subscriber in subscribers {
            match subscriber.offer(build(subscriber.id())) {
                Ok(queued) => {
                    outcome.delivered += 1;
                    if queued == Queued::Coalesced {
                        outcome.coalesced += 1;
                    }
                }
                Err(SubscriberClosed) => {
                    warn!(subscriber = %subscriber.id(), "subscriber stream is gone, removing it");
                    subscriber.close();
                    self.inner.remove(&subscriber.id());
                    outcome.evicted.push(subscriber.id());
                }
            }
        }
        outcome
    }

    /// Close and remove every subscriber.
    pub fn close_all(&self) -> usize {
        let subscribers: Vec<Subscriber> = self.inner.iter().map(|r| r.value().clone()).collect();
        for subscriber in &subscribers {
            subscriber.close();
            self.inner.remove(&subscriber.id());
        }
        subscribers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subscriber(buffer: usize) -> (Subscriber, mpsc::Receiver<Result<DiscoveryResponse, Status>>) {
        let (tx, rx) = mpsc::channel(buffer);
        (
            Subscriber::new(SubscriberId::next(), tx, CancellationToken::new()),
            rx,
        )
    }

    fn response(type_url: &str, nonce: &str) -> DiscoveryResponse {
        DiscoveryResponse {
            type_url: type_url.to_string(),
            nonce: nonce.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn broadcast_reaches_everyone() {
        let set = SubscriberSet::new();
        let (a, _rx_a) = subscriber(4);
        let (b, _rx_b) = subscriber(4);
        set.insert(a.clone());
        set.insert(b.clone());

        let outcome = set.broadcast(|id| response("t", &id.to_string()));
        assert_eq!(outcome.delivered, 2);
        assert!(outcome.evicted.is_empty());

        assert_eq!(a.pushed().await[0].nonce, a.id().to_string());
        assert_eq!(b.pushed().await[0].nonce, b.id().to_string());
    }

    #[test]
    fn failing_subscriber_is_closed_and_removed() {
        let set = SubscriberSet::new();
        let (healthy, _rx_healthy) = subscriber(4);
        let (dead, rx_dead) = subscriber(4);
        let dead_id = dead.id();
        let dead_token = dead.cancellation().clone();
        drop(rx_dead);

        set.insert(healthy);
        set.insert(dead);

        let outcome = set.broadcast(|_| response("t", "n"));
        assert_eq!(outcome.delivered, 1);
        assert_eq!(outcome.evicted, vec![dead_id]);
        assert!(!set.contains(dead_id));
        assert!(dead_token.is_cancelled());
        assert_eq!(set.len(), 1);
    }

    #[tokio::test]
    async fn slow_subscriber_keeps_newest_response_per_type() {
        let set = SubscriberSet::new();
        let (slow, _rx) = subscriber(1);
        let slow_id = slow.id();
        set.insert(slow.clone());

        for i in 0..40 {
            let outcome = set.broadcast(|_| response("a", &i.to_string()));
            assert!(outcome.evicted.is_empty());
        }
        let outcome = set.broadcast(|_| response("b", "b"));
        assert_eq!(outcome.coalesced, 0);
        let outcome = set.broadcast(|_| response("a", "last"));
        assert_eq!(outcome.coalesced, 1);

        assert!(set.contains(slow_id));
        let pushed: Vec<(String, String)> = slow
            .pushed()
            .await
            .into_iter()
            .map(|r| (r.type_url, r.nonce))
            .collect();
        assert_eq!(
            pushed,
            vec![
                ("b".to_string(), "b".to_string()),
                ("a".to_string(), "last".to_string()),
            ]
        );
    }

    #[test]
    fn close_all_cancels_streams() {
        let set = SubscriberSet::new();
        let (a, _rx_a) = subscriber(1);
        let token = a.cancellation().clone();
        set.insert(a.clone());

        assert_eq!(set.close_all(), 1);
        assert!(token.is_cancelled());
        assert!(set.is_empty());
        assert_eq!(a.offer(response("t", "n")), Err(SubscriberClosed));
    }
}
