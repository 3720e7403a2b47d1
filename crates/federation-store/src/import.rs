//! Services imported from peer meshes.

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use federation_proto::fds::ExportedService;
use tracing::debug;

use crate::stats::StoreStats;

/// An imported service and the peers that export it.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportedService {
    /// Service as published by the first peer (by name) exporting it.
    pub service: ExportedService,
    /// Names of every peer exporting the service, sorted.
    pub peers: Vec<String>,
}

impl ImportedService {
    /// Cluster-local FQDN of the service.
    pub fn hostname(&self) -> String {
        format!(
            "{}.{}.svc.cluster.local",
            self.service.name, self.service.namespace
        )
    }
}

/// Latest snapshot of exported services received from each peer.
///
/// Writers replace one peer's snapshot wholesale under the write lock;
/// readers copy out under the read lock. Nothing returned aliases stored
/// state.
#[derive(Debug, Default)]
pub struct ImportedServiceStore {
    by_peer: RwLock<BTreeMap<String, Vec<ExportedService>>>,
    stats: StoreStats,
}

impl ImportedServiceStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store statistics.
    #[inline]
    pub fn stats(&self) -> &StoreStats {
        &self.stats
    }

    /// Replace everything known from `peer`.
    pub fn update(&self, peer: &str, services: Vec<ExportedService>) {
        let count = services.len();
        let total = {
            let mut guard = self.by_peer.write().unwrap_or_else(PoisonError::into_inner);
            guard.insert(peer.to_string(), services);
            guard.values().map(Vec::len).sum::<usize>()
        };
        self.stats.record_replacement();
        metrics::gauge!("fds_imported_services").set(total as f64);
        debug!(peer, services = count, "updated imported services");
    }

    /// Copy of the snapshot received from `peer`.
    pub fn get(&self, peer: &str) -> Vec<ExportedService> {
        self.stats.record_lookup();
        self.by_peer
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(peer)
            .cloned()
            .unwrap_or_default()
    }

    /// Merged view across peers, sorted by namespace then name.
    pub fn get_all(&self) -> Vec<ImportedService> {
        self.stats.record_lookup();
        let snapshot = self
            .by_peer
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let mut merged: BTreeMap<(String, String), ImportedService> = BTreeMap::new();
        for (peer, services) in snapshot {
            for service in services {
                let key = (service.namespace.clone(), service.name.clone());
                merged
                    .entry(key)
                    .and_modify(|entry| {
                        if !entry.peers.contains(&peer) {
                            entry.peers.push(peer.clone());
                        }
                    })
                    .or_insert_with(|| ImportedService {
                        service,
                        peers: vec![peer.clone()],
                    });
            }
        }
        merged.into_values().collect()
    }

    /// Peers with a snapshot, sorted.
    pub fn peers(&self) -> Vec<String> {
        self.by_peer
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    /// Total services across peers, counting duplicates.
    pub fn len(&self) -> usize {
        self.by_peer
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(Vec::len)
            .sum()
    }

    /// Check if nothing has been imported.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn svc(name: &str, namespace: &str) -> ExportedService {
        ExportedService {
            name: name.to_string(),
            namespace: namespace.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn update_replaces_wholesale() {
        let store = ImportedServiceStore::new();
        store.update("west", vec![svc("a", "ns1"), svc("b", "ns1")]);
        store.update("west", vec![svc("c", "ns2")]);

        let all = store.get_all();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].service.name, "c");
        assert_eq!(all[0].peers, vec!["west".to_string()]);
        assert_eq!(store.stats().replacements(), 2);
    }

    #[test]
    fn merges_across_peers() {
        let store = ImportedServiceStore::new();
        store.update("west", vec![svc("b", "ns1"), svc("a", "ns2")]);
        store.update("north", vec![svc("b", "ns1")]);

        let all = store.get_all();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].hostname(), "b.ns1.svc.cluster.local");
        assert_eq!(all[0].peers, vec!["north".to_string(), "west".to_string()]);
        assert_eq!(all[1].hostname(), "a.ns2.svc.cluster.local");
        assert_eq!(store.len(), 3);
        assert_eq!(store.peers(), vec!["north".to_string(), "west".to_string()]);
    }

    #[test]
    fn returned_copies_do_not_alias_state() {
        let store = ImportedServiceStore::new();
        store.update("west", vec![svc("a", "ns1")]);

        let mut copy = store.get_all();
        copy[0].service.name = "mutated".to_string();
        let mut peer_copy = store.get("west");
        peer_copy.clear();

        assert_eq!(store.get_all()[0].service.name, "a");
        assert_eq!(store.get("west").len(), 1);
    }

    #[test]
    fn readers_never_observe_partial_updates() {
        let store = Arc::new(ImportedServiceStore::new());
        let batch = |n: usize| (0..n).map(|i| svc(&format!("s{i}"), "ns")).collect::<Vec<_>>();
        store.update("west", batch(10));

        let writer = {
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                for round in 0..200 {
                    let size = if round % 2 == 0 { 20 } else { 10 };
                    store.update("west", batch(size));
                }
            })
        };

        for _ in 0..200 {
            let len = store.get_all().len();
            assert!(len == 10 || len == 20, "observed partial snapshot of {len}");
        }
        writer.join().expect("Thread panicked");
    }
}
