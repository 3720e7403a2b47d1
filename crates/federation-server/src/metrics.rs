//! Metrics for the discovery server.
//!
//! Recorded through the `metrics` facade; the binary decides whether an
//! exporter is installed.
//!
//! - Push fan-out and skip counters per type URL
//! - Generator errors and generation latency
//! - Subscriber gauge and eviction counter

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use metrics::{counter, gauge, histogram};

/// Metrics handle shared by the server, its streams and the coordinator.
#[derive(Debug, Clone)]
pub struct DiscoveryMetrics {
    inner: Arc<DiscoveryMetricsInner>,
}

#[derive(Debug)]
struct DiscoveryMetricsInner {
    subscribers: AtomicU64,
}

impl Default for DiscoveryMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl DiscoveryMetrics {
    /// Create a new metrics instance.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(DiscoveryMetricsInner {
                subscribers: AtomicU64::new(0),
            }),
        }
    }

    /// Record a push fanned out to `delivered` subscribers.
    pub fn record_push(&self, type_url: &str, delivered: usize) {
        counter!("fds_pushes_total", "type_url" => type_url.to_string()).increment(1);
        counter!("fds_responses_total", "type_url" => type_url.to_string())
            .increment(delivered as u64);
    }

    /// Record a push skipped because nobody is subscribed.
    pub fn record_push_skipped(&self, type_url: &str) {
        counter!("fds_push_skipped_total", "type_url" => type_url.to_string()).increment(1);
    }

    /// Record an initial-request response.
    pub fn record_response(&self, type_url: &str) {
        counter!("fds_responses_total", "type_url" => type_url.to_string()).increment(1);
    }

    /// Record a failed generator run.
    pub fn record_generator_error(&self, type_url: &str) {
        counter!("fds_generator_errors_total", "type_url" => type_url.to_string()).increment(1);
    }

    /// Record generation latency.
    pub fn record_generate_duration(&self, type_url: &str, elapsed: Duration) {
        histogram!("fds_generate_duration_seconds", "type_url" => type_url.to_string())
            .record(elapsed.as_secs_f64());
    }

    /// Record subscribers evicted because their stream was gone.
    pub fn record_evictions(&self, count: usize) {
        if count > 0 {
            counter!("fds_subscriber_evictions_total").increment(count as u64);
        }
    }

    /// Record a subscriber joining.
    pub fn subscriber_added(&self) {
        let count = self.inner.subscribers.fetch_add(1, Ordering::Relaxed) + 1;
        gauge!("fds_subscribers").set(count as f64);
    }

    /// Record a subscriber leaving.
    pub fn subscriber_removed(&self) {
        let count = self
            .inner
            .subscribers
            .fetch_sub(1, Ordering::Relaxed)
            .saturating_sub(1);
        gauge!("fds_subscribers").set(count as f64);
    }

    /// Subscribers currently tracked.
    pub fn subscribers(&self) -> u64 {
        self.inner.subscribers.load(Ordering::Relaxed)
    }
}

/// Timer for generator runs.
#[derive(Debug)]
pub struct GenerateTimer<'a> {
    start: Instant,
    type_url: &'a str,
    metrics: &'a DiscoveryMetrics,
}

impl<'a> GenerateTimer<'a> {
    /// Start timing a generator run.
    pub fn start(metrics: &'a DiscoveryMetrics, type_url: &'a str) -> Self {
        Self {
            start: Instant::now(),
            type_url,
            metrics,
        }
    }

    /// Stop the timer and record the latency.
    pub fn finish(self) {
        self.metrics
            .record_generate_duration(self.type_url, self.start.elapsed());
    }
}

/// Keeps the subscriber gauge in step with a stream's lifetime.
#[derive(Debug)]
pub struct SubscriberTracker {
    metrics: DiscoveryMetrics,
}

impl SubscriberTracker {
    /// Count a new subscriber until the tracker is dropped.
    pub fn new(metrics: DiscoveryMetrics) -> Self {
        metrics.subscriber_added();
        Self { metrics }
    }
}

impl Drop for SubscriberTracker {
    fn drop(&mut self) {
        self.metrics.subscriber_removed();
    }
}
