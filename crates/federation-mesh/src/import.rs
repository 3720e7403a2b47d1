//! Handler for `ExportedService` snapshots received from peers.

use std::sync::Arc;

use async_trait::async_trait;
use federation_core::{
    decode_any, matches_any, FederationResult, PushRequest, PushSender, ResponseHandler, ServiceSet, TypeUrl,
};
use federation_proto::fds::ExportedService;
use federation_store::ImportedServiceStore;
use prost_types::Any;
use tracing::{debug, info, warn};

/// Types regenerated after every import.
pub const IMPORT_DEPENDENT_TYPES: &[&str] = &[
    TypeUrl::SERVICE_ENTRY,
    TypeUrl::WORKLOAD_ENTRY,
    TypeUrl::DESTINATION_RULE,
];

/// Stores each peer's snapshot and asks for regeneration of everything
/// derived from imported services.
pub struct ImportedServiceHandler {
    store: Arc<ImportedServiceStore>,
    rules: ServiceSet,
    push: PushSender,
}

impl std::fmt::Debug for ImportedServiceHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImportedServiceHandler")
            .field("rules", &self.rules)
            .field("channel", &self.push.name())
            .finish_non_exhaustive()
    }
}

impl ImportedServiceHandler {
    /// Create a handler accepting every valid service.
    pub fn new(store: Arc<ImportedServiceStore>, push: PushSender) -> Self {
        Self {
            store,
            rules: ServiceSet::default(),
            push,
        }
    }

    /// Only accept services matching `rules`. Rules without selectors
    /// accept everything.
    #[must_use]
    pub fn with_rules(mut self, rules: ServiceSet) -> Self {
        self.rules = rules;
        self
    }

    fn accepts(&self, service: &ExportedService) -> bool {
        let selectors = self.rules.label_selectors();
        selectors.is_empty() || matches_any(selectors, &service.labels)
    }

    /// Decode and validate one snapshot. Invalid entries are dropped.
    fn decode(&self, peer: &str, resources: &[Any]) -> Vec<ExportedService> {
        let mut services = Vec::with_capacity(resources.len());
        for resource in resources {
            let service: ExportedService = match decode_any(resource) {
                Ok(service) => service,
                Err(error) => {
                    warn!(peer, %error, "dropping undecodable exported service");
                    continue;
                }
            };
            if service.name.is_empty() || service.namespace.is_empty() {
                warn!(
                    peer,
                    name = %service.name,
                    namespace = %service.namespace,
                    "dropping exported service without name or namespace"
                );
                continue;
            }
            if !self.accepts(&service) {
                debug!(peer, name = %service.name, namespace = %service.namespace, "service not imported");
                continue;
            }
            services.push(service);
        }
        services
    }
}

#[async_trait]
impl ResponseHandler for ImportedServiceHandler {
    async fn handle(&self, peer: &str, resources: Vec<Any>) -> FederationResult<()> {
        let services = self.decode(peer, &resources);
        info!(peer, received = resources.len(), imported = services.len(), "imported services");
        self.store.update(peer, services);

        for type_url in IMPORT_DEPENDENT_TYPES {
            self.push.push(PushRequest::regenerate(*type_url)).await?;
        }
        Ok(())
    }
}
