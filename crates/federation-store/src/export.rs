//! Export rule evaluation over the local services.

use std::collections::HashSet;
use std::sync::Arc;

use federation_core::{matches_any, FederationResult, LabelSelector, ServiceSet};

use crate::service::{Service, ServiceLister};

/// Decides which local services are advertised to peers.
///
/// A pure function of the lister's current contents and the configured
/// rules; nothing is cached between calls.
#[derive(Clone)]
pub struct ExportStore {
    lister: Arc<dyn ServiceLister>,
    rules: ServiceSet,
}

impl std::fmt::Debug for ExportStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExportStore")
            .field("rules", &self.rules)
            .finish_non_exhaustive()
    }
}

impl ExportStore {
    /// Create a store evaluating `rules` against `lister`.
    pub fn new(lister: Arc<dyn ServiceLister>, rules: ServiceSet) -> Self {
        Self { lister, rules }
    }

    /// Selectors in effect.
    pub fn selectors(&self) -> &[LabelSelector] {
        self.rules.label_selectors()
    }

    /// The underlying lister.
    pub fn lister(&self) -> &Arc<dyn ServiceLister> {
        &self.lister
    }

    /// Whether `service` satisfies the export rules.
    pub fn matches(&self, service: &Service) -> bool {
        matches_any(self.selectors(), &service.labels)
    }

    /// Every local service matching at least one selector, each listed once.
    ///
    /// Order follows the lister and is not stable.
    pub fn matching_services(&self) -> FederationResult<Vec<Service>> {
        let mut seen = HashSet::new();
        let mut matched = Vec::new();
        for selector in self.selectors() {
            for service in self.lister.list_matching(selector)? {
                if seen.insert(service.key()) {
                    matched.push(service);
                }
            }
        }
        Ok(matched)
    }
}
