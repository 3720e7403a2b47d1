//! Push requests and the bounded channel that carries them.
//!
//! Producers (service watch handlers, the import handler, the address
//! resolution watcher) hold a [`PushSender`]; exactly one consumer loop owns
//! the matching [`PushReceiver`].
//!
//! Under [`OverflowPolicy::Coalesce`] a request that finds the queue full is
//! parked beside it instead. At most one request per type is parked, the
//! newest, and the receiver takes parked requests once the queue is empty.

use std::sync::{Arc, Mutex, PoisonError};

use prost_types::Any;
use tokio::sync::{mpsc, Notify};
use tracing::{debug, warn};

use crate::{FederationError, FederationResult, TypeUrl};

/// Request to broadcast a snapshot of one resource type.
#[derive(Debug, Clone, PartialEq)]
pub struct PushRequest {
    /// Resource type to push.
    pub type_url: TypeUrl,
    /// Precomputed payload. `None` asks the consumer to regenerate it.
    pub resources: Option<Vec<Any>>,
}

impl PushRequest {
    /// Push whatever the generator for `type_url` produces at delivery time.
    #[must_use]
    pub fn regenerate(type_url: impl Into<TypeUrl>) -> Self {
        Self {
            type_url: type_url.into(),
            resources: None,
        }
    }

    /// Push a payload that was already computed by the producer.
    #[must_use]
    pub fn with_resources(type_url: impl Into<TypeUrl>, resources: Vec<Any>) -> Self {
        Self {
            type_url: type_url.into(),
            resources: Some(resources),
        }
    }
}

/// What a producer does when the push queue is full.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Wait for the consumer to make room.
    #[default]
    Wait,
    /// Park the request beside the full queue, replacing any parked
    /// request of the same type.
    Coalesce,
}

/// Requests that found the queue full, newest per type.
#[derive(Debug, Default)]
struct Parked {
    requests: Mutex<Vec<PushRequest>>,
    ready: Notify,
}

impl Parked {
    /// Park `request`. Returns `false` when it replaced one of its type.
    fn park(&self, request: PushRequest) -> bool {
        let replaced = {
            let mut requests = self.requests.lock().unwrap_or_else(PoisonError::into_inner);
            let before = requests.len();
            requests.retain(|parked| parked.type_url != request.type_url);
            let replaced = requests.len() < before;
            requests.push(request);
            replaced
        };
        self.ready.notify_one();
        !replaced
    }

    fn take(&self) -> Option<PushRequest> {
        let mut requests = self.requests.lock().unwrap_or_else(PoisonError::into_inner);
        (!requests.is_empty()).then(|| requests.remove(0))
    }

    fn clear(&self) -> usize {
        let mut requests = self.requests.lock().unwrap_or_else(PoisonError::into_inner);
        let count = requests.len();
        requests.clear();
        count
    }
}

/// Create a bounded push channel.
///
/// `name` only labels log lines so the discovery and mesh channels can be
/// told apart.
pub fn push_channel(
    name: &'static str,
    capacity: usize,
    policy: OverflowPolicy,
) -> (PushSender, PushReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let parked = Arc::new(Parked::default());
    (
        PushSender {
            name,
            tx,
            policy,
            parked: parked.clone(),
        },
        PushReceiver { name, rx, parked },
    )
}

/// Producer half of a push channel.
#[derive(Debug, Clone)]
pub struct PushSender {
    name: &'static str,
    tx: mpsc::Sender<PushRequest>,
    policy: OverflowPolicy,
    parked: Arc<Parked>,
}

impl PushSender {
    /// Enqueue a push request according to the channel's overflow policy.
    ///
    /// Returns `Ok(false)` when the request replaced a parked request of the
    /// same type, and [`FederationError::PushChannelClosed`] once the
    /// consumer is gone.
    pub async fn push(&self, request: PushRequest) -> FederationResult<bool> {
        match self.policy {
            OverflowPolicy::Wait => {
                self.tx
                    .send(request)
                    .await
                    .map_err(|_| FederationError::PushChannelClosed)?;
                Ok(true)
            }
            OverflowPolicy::Coalesce => self.try_push(request),
        }
    }

    /// Enqueue without waiting, parking the request if the queue is full.
    pub fn try_push(&self, request: PushRequest) -> FederationResult<bool> {
        match self.tx.try_send(request) {
            Ok(()) => Ok(true),
            Err(mpsc::error::TrySendError::Full(request)) => {
                let type_url = request.type_url.clone();
                let added = self.parked.park(request);
                if !added {
                    warn!(channel = self.name, type_url = %type_url, "push queue full, coalesced request");
                }
                Ok(added)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(FederationError::PushChannelClosed),
        }
    }

    /// Channel label.
    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Whether the consumer has gone away.
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer half of a push channel.
#[derive(Debug)]
pub struct PushReceiver {
    name: &'static str,
    rx: mpsc::Receiver<PushRequest>,
    parked: Arc<Parked>,
}

impl PushReceiver {
    /// Receive the next push request, or `None` once every sender is dropped
    /// and nothing is left.
    ///
    /// Queued requests come first, then parked ones. Cancel safe.
    pub async fn recv(&mut self) -> Option<PushRequest> {
        loop {
            match self.rx.try_recv() {
                Ok(request) => return Some(request),
                Err(mpsc::error::TryRecvError::Disconnected) => return self.parked.take(),
                Err(mpsc::error::TryRecvError::Empty) => {}
            }
            if let Some(request) = self.parked.take() {
                return Some(request);
            }
            tokio::select! {
                request = self.rx.recv() => match request {
                    Some(request) => return Some(request),
                    None => return self.parked.take(),
                },
                _ = self.parked.ready.notified() => {}
            }
        }
    }

    /// Stop accepting requests and discard everything still queued.
    ///
    /// Returns the number of discarded requests.
    pub fn drain(&mut self) -> usize {
        self.rx.close();
        let mut dropped = 0;
        while self.rx.try_recv().is_ok() {
            dropped += 1;
        }
        dropped += self.parked.clear();
        if dropped > 0 {
            debug!(channel = self.name, dropped, "drained push queue");
        }
        dropped
    }

    /// Channel label.
    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }
}
