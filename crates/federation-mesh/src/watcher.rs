//! Periodic re-resolution of peer addresses.

use std::sync::Arc;
use std::time::Duration;

use federation_core::{FederationError, FederationResult, PushRequest, PushSender, Remote, TypeUrl};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::resolve::{resolve_address, AddressResolver, ResolvedAddresses};

/// Default interval between resolution rounds.
pub const DEFAULT_RESOLVE_INTERVAL: Duration = Duration::from_secs(1);

/// Re-resolves every remote address on a fixed interval and asks for
/// WorkloadEntry regeneration whenever the resolved IP set changes.
pub struct AddressWatcher {
    remotes: Vec<Remote>,
    resolver: Arc<dyn AddressResolver>,
    cache: Arc<ResolvedAddresses>,
    push: PushSender,
    interval: Duration,
}

impl std::fmt::Debug for AddressWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AddressWatcher")
            .field("remotes", &self.remotes.len())
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}

impl AddressWatcher {
    /// Create a watcher writing into `cache` and pushing on `push`.
    pub fn new(
        remotes: Vec<Remote>,
        resolver: Arc<dyn AddressResolver>,
        cache: Arc<ResolvedAddresses>,
        push: PushSender,
    ) -> Self {
        Self {
            remotes,
            resolver,
            cache,
            push,
            interval: DEFAULT_RESOLVE_INTERVAL,
        }
    }

    /// Override the resolution interval.
    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Resolve every remote address once and refresh the cache.
    ///
    /// Returns the flattened, sorted, de-duplicated IP set.
    pub async fn resolve_once(&self) -> Vec<String> {
        let mut all = Vec::new();
        for remote in &self.remotes {
            for address in &remote.addresses {
                let ips = resolve_address(self.resolver.as_ref(), address).await;
                self.cache.set(address.clone(), ips.clone());
                all.extend(ips);
            }
        }
        all.sort();
        all.dedup();
        all
    }

    /// One resolution round compared against `previous`.
    ///
    /// Pushes a WorkloadEntry request and returns `true` exactly when the
    /// IP set changed.
    pub async fn tick(&self, previous: &mut Vec<String>) -> FederationResult<bool> {
        let current = self.resolve_once().await;
        if current == *previous {
            return Ok(false);
        }

        info!(previous = ?previous, current = ?current, "peer addresses changed");
        *previous = current;
        self.push
            .push(PushRequest::regenerate(TypeUrl::WORKLOAD_ENTRY))
            .await?;
        Ok(true)
    }

    /// Resolve until `shutdown` fires.
    ///
    /// The first round runs before the ticker starts and never pushes.
    pub async fn run(self, shutdown: CancellationToken) {
        let mut previous = self.resolve_once().await;
        debug!(ips = ?previous, "initial peer address resolution");

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    match self.tick(&mut previous).await {
                        Ok(_) => {}
                        Err(FederationError::PushChannelClosed) => {
                            debug!("push channel closed, stopping address watcher");
                            break;
                        }
                        Err(error) => warn!(%error, "address resolution round failed"),
                    }
                }
            }
        }

        info!("address watcher stopped");
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::net::IpAddr;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use federation_core::{push_channel, OverflowPolicy};

    use super::*;

    /// Returns one scripted answer per lookup, repeating the last one.
    struct Scripted {
        answers: Mutex<VecDeque<Vec<&'static str>>>,
    }

    impl Scripted {
        fn new(answers: Vec<Vec<&'static str>>) -> Self {
            Self {
                answers: Mutex::new(answers.into()),
            }
        }
    }

    #[async_trait]
    impl AddressResolver for Scripted {
        async fn lookup(&self, _host: &str) -> FederationResult<Vec<IpAddr>> {
            let mut answers = self.answers.lock().unwrap();
            let answer = if answers.len() > 1 {
                answers.pop_front().unwrap()
            } else {
                answers.front().cloned().unwrap_or_default()
            };
            Ok(answer.iter().map(|ip| ip.parse().unwrap()).collect())
        }
    }

    fn remote(addresses: &[&str]) -> Remote {
        Remote {
            name: "east".into(),
            addresses: addresses.iter().map(|a| a.to_string()).collect(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn pushes_exactly_on_change() {
        let resolver = Arc::new(Scripted::new(vec![
            vec!["10.0.0.2", "10.0.0.1"],
            // Same set, different order.
            vec!["10.0.0.1", "10.0.0.2"],
            vec!["10.0.0.1", "10.0.0.2"],
            vec!["10.0.0.3"],
        ]));
        let cache = Arc::new(ResolvedAddresses::new());
        let (tx, mut rx) = push_channel("mesh", 8, OverflowPolicy::Wait);
        let watcher = AddressWatcher::new(vec![remote(&["east.example.com"])], resolver, cache.clone(), tx);

        let mut previous = watcher.resolve_once().await;
        assert_eq!(previous, vec!["10.0.0.1", "10.0.0.2"]);

        assert!(!watcher.tick(&mut previous).await.unwrap());
        assert!(!watcher.tick(&mut previous).await.unwrap());
        assert!(watcher.tick(&mut previous).await.unwrap());
        assert_eq!(previous, vec!["10.0.0.3"]);
        assert_eq!(cache.get("east.example.com"), vec!["10.0.0.3"]);

        let request = rx.recv().await.unwrap();
        assert_eq!(request.type_url, TypeUrl::WORKLOAD_ENTRY);
        assert!(request.resources.is_none());
        assert_eq!(rx.drain(), 0);
    }

    #[tokio::test]
    async fn literal_addresses_never_change() {
        let resolver = Arc::new(Scripted::new(vec![vec![]]));
        let (tx, mut rx) = push_channel("mesh", 8, OverflowPolicy::Wait);
        let watcher = AddressWatcher::new(
            vec![remote(&["10.0.0.1"])],
            resolver,
            Arc::new(ResolvedAddresses::new()),
            tx,
        );

        let mut previous = watcher.resolve_once().await;
        for _ in 0..3 {
            assert!(!watcher.tick(&mut previous).await.unwrap());
        }
        assert_eq!(rx.drain(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn run_stops_on_shutdown() {
        let resolver = Arc::new(Scripted::new(vec![vec!["10.0.0.1"], vec!["10.0.0.2"]]));
        let (tx, mut rx) = push_channel("mesh", 8, OverflowPolicy::Wait);
        let watcher = AddressWatcher::new(
            vec![remote(&["east.example.com"])],
            resolver,
            Arc::new(ResolvedAddresses::new()),
            tx,
        )
        .with_interval(Duration::from_secs(1));

        let shutdown = CancellationToken::new();
        let task = tokio::spawn(watcher.run(shutdown.clone()));

        let request = rx.recv().await.unwrap();
        assert_eq!(request.type_url, TypeUrl::WORKLOAD_ENTRY);

        shutdown.cancel();
        task.await.unwrap();
    }
}
