//! Reacts to local Service changes that affect what is exported.

use std::sync::Arc;

use federation_core::{FederationResult, PushRequest, PushSender, ServiceSet, TypeUrl};
use federation_store::{ExportStore, Service, ServiceCatalog};
use tracing::{debug, info};

/// Keeps the local service catalog current and triggers regeneration of
/// exported services and ingress objects when an exported Service changes.
pub struct ServiceExportEventHandler {
    catalog: Arc<ServiceCatalog>,
    exports: ExportStore,
    discovery: PushSender,
    mesh: PushSender,
    routes: bool,
}

impl std::fmt::Debug for ServiceExportEventHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceExportEventHandler")
            .field("services", &self.catalog.len())
            .field("routes", &self.routes)
            .finish_non_exhaustive()
    }
}

impl ServiceExportEventHandler {
    /// Create a handler.
    ///
    /// `discovery` carries `ExportedService` pushes to peers, `mesh` carries
    /// ingress object pushes to the local reconcilers.
    pub fn new(catalog: Arc<ServiceCatalog>, rules: ServiceSet, discovery: PushSender, mesh: PushSender) -> Self {
        let exports = ExportStore::new(catalog.clone(), rules);
        Self {
            catalog,
            exports,
            discovery,
            mesh,
            routes: false,
        }
    }

    /// Also regenerate OpenShift routes on changes.
    #[must_use]
    pub fn with_routes(mut self, routes: bool) -> Self {
        self.routes = routes;
        self
    }

    /// A Service was created or updated.
    ///
    /// Returns whether pushes were triggered.
    pub async fn apply(&self, service: Service) -> FederationResult<bool> {
        let key = service.key();
        let previous = self.catalog.upsert(service.clone());
        match &previous {
            Some(_) => debug!(service = %key, "service updated"),
            None => debug!(service = %key, "service created"),
        }

        let mut affected = vec![&service];
        if let Some(previous) = previous.as_deref() {
            affected.push(previous);
        }
        self.trigger_if_exported(&affected).await
    }

    /// A Service was deleted.
    pub async fn delete(&self, namespace: &str, name: &str) -> FederationResult<bool> {
        let Some(removed) = self.catalog.remove(namespace, name) else {
            return Ok(false);
        };
        debug!(service = %removed.key(), "service deleted");
        self.trigger_if_exported(&[removed.as_ref()]).await
    }

    /// The full Service list was relisted.
    ///
    /// Pushes when any exported Service appeared, changed or disappeared.
    pub async fn resync(&self, services: Vec<Service>) -> FederationResult<bool> {
        let mut before = self.exports.matching_services()?;
        self.catalog.replace_all(services);
        let mut after = self.exports.matching_services()?;
        before.sort_by_key(Service::key);
        after.sort_by_key(Service::key);
        debug!(services = self.catalog.len(), exported = after.len(), "services resynced");

        if before == after {
            return Ok(false);
        }
        self.push_all().await?;
        Ok(true)
    }

    async fn trigger_if_exported(&self, services: &[&Service]) -> FederationResult<bool> {
        let Some(service) = services.iter().find(|s| self.exports.matches(s)) else {
            return Ok(false);
        };
        info!(service = %service.key(), "exported service changed");
        self.push_all().await?;
        Ok(true)
    }

    async fn push_all(&self) -> FederationResult<()> {
        self.mesh.push(PushRequest::regenerate(TypeUrl::GATEWAY)).await?;
        self.mesh
            .push(PushRequest::regenerate(TypeUrl::ENVOY_FILTER))
            .await?;
        if self.routes {
            self.mesh.push(PushRequest::regenerate(TypeUrl::ROUTE)).await?;
        }
        self.discovery
            .push(PushRequest::regenerate(TypeUrl::EXPORTED_SERVICE))
            .await?;
        Ok(())
    }
}
