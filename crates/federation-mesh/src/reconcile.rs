//! Reconciler trigger surface.
//!
//! A [`Reconciler`] makes the cluster match the current output of one
//! generator. The [`ReconcilerManager`] runs them on startup and again
//! whenever a push request for their type arrives. Some generators read
//! state that is pushed under another type: a push for that type also
//! reconciles its dependents.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use federation_core::{FederationError, FederationResult, PushReceiver, TypeUrl};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Applies the desired objects of one type to the cluster.
#[async_trait]
pub trait Reconciler: Send + Sync {
    /// Type URL of the objects this reconciler owns.
    fn type_url(&self) -> &str;

    /// Create or update every desired object and delete stale ones.
    async fn reconcile(&self) -> FederationResult<()>;
}

/// Routes mesh push requests to the reconciler of their type.
#[derive(Clone)]
pub struct ReconcilerManager {
    reconcilers: BTreeMap<String, Arc<dyn Reconciler>>,
    dependents: BTreeMap<String, Vec<String>>,
}

impl Default for ReconcilerManager {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ReconcilerManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconcilerManager")
            .field("types", &self.reconcilers.keys().collect::<Vec<_>>())
            .field("dependents", &self.dependents)
            .finish()
    }
}

impl ReconcilerManager {
    /// Create a manager without reconcilers.
    ///
    /// Service entries of imported services carry the resolved gateway
    /// addresses, which change under a workload entry push, so a workload
    /// entry push also reconciles service entries.
    pub fn new() -> Self {
        Self {
            reconcilers: BTreeMap::new(),
            dependents: BTreeMap::new(),
        }
        .with_dependent(TypeUrl::WORKLOAD_ENTRY, TypeUrl::SERVICE_ENTRY)
    }

    /// Also reconcile `dependent` whenever `type_url` is pushed.
    #[must_use]
    pub fn with_dependent(mut self, type_url: &str, dependent: &str) -> Self {
        let dependents = self.dependents.entry(type_url.to_string()).or_default();
        if !dependents.iter().any(|d| d == dependent) {
            dependents.push(dependent.to_string());
        }
        self
    }

    /// Types reconciled by a push for `type_url`: the type itself, then
    /// its dependents.
    pub fn triggered_by<'a>(&'a self, type_url: &'a str) -> Vec<&'a str> {
        let mut types = vec![type_url];
        if let Some(dependents) = self.dependents.get(type_url) {
            types.extend(
                dependents
                    .iter()
                    .map(String::as_str)
                    .filter(|d| *d != type_url),
            );
        }
        types
    }

    /// Register a reconciler, replacing any previous one for its type.
    pub fn register(&mut self, reconciler: Arc<dyn Reconciler>) {
        self.reconcilers
            .insert(reconciler.type_url().to_string(), reconciler);
    }

    /// Builder form of [`register`](Self::register).
    #[must_use]
    pub fn with(mut self, reconciler: Arc<dyn Reconciler>) -> Self {
        self.register(reconciler);
        self
    }

    /// Registered type URLs, sorted.
    pub fn type_urls(&self) -> Vec<&str> {
        self.reconcilers.keys().map(String::as_str).collect()
    }

    /// Number of reconcilers.
    pub fn len(&self) -> usize {
        self.reconcilers.len()
    }

    /// Whether no reconciler is registered.
    pub fn is_empty(&self) -> bool {
        self.reconcilers.is_empty()
    }

    /// Reconcile one type. `None` if no reconciler handles it.
    #[instrument(skip(self))]
    pub async fn reconcile(&self, type_url: &str) -> Option<FederationResult<()>> {
        let reconciler = self.reconcilers.get(type_url)?;
        let result = reconciler.reconcile().await;
        let outcome = if result.is_ok() { "success" } else { "failure" };
        metrics::counter!("fds_reconciles_total", "type_url" => type_url.to_string(), "result" => outcome)
            .increment(1);
        Some(result)
    }

    /// Run every reconciler, continuing past failures.
    ///
    /// # Errors
    ///
    /// One [`FederationError::Reconcile`] naming every failed type.
    pub async fn reconcile_all(&self) -> FederationResult<()> {
        let mut failed_types = Vec::new();
        let mut messages = Vec::new();
        for type_url in self.reconcilers.keys() {
            if let Some(Err(error)) = self.reconcile(type_url).await {
                warn!(type_url = %type_url, %error, "reconcile failed");
                failed_types.push(type_url.clone());
                messages.push(error.to_string());
            }
        }

        if failed_types.is_empty() {
            Ok(())
        } else {
            Err(FederationError::Reconcile {
                type_url: failed_types.join(", "),
                message: messages.join("; "),
            })
        }
    }

    /// Consume push requests until shutdown or until every producer is
    /// gone. Failures are logged and the loop continues.
    pub async fn run(&self, mut receiver: PushReceiver, shutdown: CancellationToken) {
        info!(types = ?self.type_urls(), "reconciler manager started");

        loop {
            let request = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                request = receiver.recv() => match request {
                    Some(request) => request,
                    None => break,
                },
            };

            debug!(type_url = %request.type_url, "received push request");
            for type_url in self.triggered_by(request.type_url.as_str()) {
                match self.reconcile(type_url).await {
                    None => debug!(type_url, "no reconciler for type"),
                    Some(Err(error)) => warn!(type_url, %error, "reconcile failed"),
                    Some(Ok(())) => {}
                }
            }
        }

        receiver.drain();
        info!("reconciler manager stopped");
    }
}
