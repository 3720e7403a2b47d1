//! In-memory service catalog.
//!
//! The [`ServiceCatalog`] mirrors the cluster's services, fed by a watch on
//! the Kubernetes API, and serves them through [`ServiceLister`].

use std::sync::Arc;

use dashmap::DashMap;
use federation_core::FederationResult;
use tracing::{debug, trace};

use crate::service::{Service, ServiceKey, ServiceLister};
use crate::stats::StoreStats;

/// Concurrent catalog of local services keyed by `namespace/name`.
///
/// ## Thread Safety
///
/// All operations are thread-safe. The catalog uses `DashMap` internally,
/// which locks at the shard level rather than globally. No reference into
/// the map escapes a method call.
#[derive(Debug)]
pub struct ServiceCatalog {
    services: DashMap<ServiceKey, Arc<Service>>,
    stats: StoreStats,
}

impl Default for ServiceCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceCatalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::with_capacity(64)
    }

    /// Create an empty catalog with a specific initial capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            services: DashMap::with_capacity(capacity),
            stats: StoreStats::new(),
        }
    }

    /// Catalog statistics.
    #[inline]
    pub fn stats(&self) -> &StoreStats {
        &self.stats
    }

    /// Insert or replace a service.
    ///
    /// Returns the previous version, if any.
    pub fn upsert(&self, service: Service) -> Option<Arc<Service>> {
        let key = service.key();
        trace!(service = %key, "upsert service");
        self.stats.record_upsert();
        self.services.insert(key, Arc::new(service))
    }

    /// Remove a service.
    pub fn remove(&self, namespace: &str, name: &str) -> Option<Arc<Service>> {
        let removed = self
            .services
            .remove(&ServiceKey::new(namespace, name))
            .map(|(_, s)| s);
        if removed.is_some() {
            self.stats.record_removal();
            debug!(namespace, name, "removed service");
        }
        removed
    }

    /// Replace the whole catalog, used after an initial list.
    pub fn replace_all(&self, services: impl IntoIterator<Item = Service>) {
        self.services.clear();
        for service in services {
            self.services.insert(service.key(), Arc::new(service));
        }
        debug!(services = self.services.len(), "replaced service catalog");
    }

    /// Check if a service exists.
    pub fn contains(&self, namespace: &str, name: &str) -> bool {
        self.services
            .contains_key(&ServiceKey::new(namespace, name))
    }

    /// Number of services.
    pub fn len(&self) -> usize {
        self.services.len()
    }

    /// Check if the catalog is empty.
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

impl ServiceLister for ServiceCatalog {
    fn list(&self) -> FederationResult<Vec<Service>> {
        self.stats.record_lookup();
        Ok(self
            .services
            .iter()
            .map(|r| Service::clone(r.value()))
            .collect())
    }

    fn get(&self, namespace: &str, name: &str) -> FederationResult<Option<Service>> {
        self.stats.record_lookup();
        // Clone out of the shard guard before returning.
        Ok(self
            .services
            .get(&ServiceKey::new(namespace, name))
            .map(|r| Service::clone(&r)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    use crate::service::ServicePort;

    #[test]
    fn catalog_basic_operations() {
        let catalog = ServiceCatalog::new();
        assert!(catalog.is_empty());

        catalog.upsert(Service::new("a", "ns1").with_port(ServicePort::new("http", 80)));
        assert!(catalog.contains("ns1", "a"));
        assert_eq!(catalog.len(), 1);

        let a = catalog.get("ns1", "a").unwrap().unwrap();
        assert_eq!(a.ports[0].port, 80);
        assert!(catalog.get("ns1", "missing").unwrap().is_none());

        let previous = catalog.upsert(Service::new("a", "ns1").with_label("v", "2"));
        assert!(previous.is_some());
        assert_eq!(catalog.len(), 1);

        assert!(catalog.remove("ns1", "a").is_some());
        assert!(catalog.remove("ns1", "a").is_none());
        assert!(catalog.is_empty());

        assert_eq!(catalog.stats().upserts(), 2);
        assert_eq!(catalog.stats().removals(), 1);
    }

    #[test]
    fn replace_all_discards_previous_services() {
        let catalog = ServiceCatalog::new();
        catalog.upsert(Service::new("old", "ns1"));
        catalog.replace_all(vec![Service::new("a", "ns1"), Service::new("b", "ns2")]);

        assert!(!catalog.contains("ns1", "old"));
        assert_eq!(catalog.len(), 2);
    }

    #[test]
    fn list_matching_filters_by_labels() {
        let catalog = ServiceCatalog::new();
        catalog.upsert(Service::new("a", "ns1").with_label("app", "a"));
        catalog.upsert(Service::new("b", "ns1").with_label("export", "true"));

        let selector = federation_core::LabelSelector::from_labels([("export", "true")]);
        let matched = catalog.list_matching(&selector).unwrap();
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].name, "b");
    }

    #[test]
    fn catalog_concurrent_writes() {
        let catalog = Arc::new(ServiceCatalog::new());
        let mut handles = vec![];

        for i in 0..10 {
            let catalog = Arc::clone(&catalog);
            handles.push(thread::spawn(move || {
                for j in 0..100 {
                    catalog.upsert(Service::new(format!("svc-{j}"), format!("ns-{i}")));
                }
            }));
        }

        for handle in handles {
            handle.join().expect("Thread panicked");
        }

        assert_eq!(catalog.len(), 1000);
    }
}
