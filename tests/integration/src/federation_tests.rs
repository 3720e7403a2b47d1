//! Two meshes federating: one exports, the other imports and derives its
//! mesh objects from what it received.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use federation_core::{decode_any, push_channel, FederationResult, GeneratorRegistry, OverflowPolicy, TypeUrl};
use federation_integration_tests::{
    eventually, exported, federation_config, remote, TestMesh, TestPeer, WAIT,
};
use federation_mesh::{
    register_mesh_generators, ConfigFactory, Reconciler, ReconcilerManager, ResolvedAddresses,
};
use federation_proto::mesh::{ServiceEntry, WorkloadEntry};
use federation_store::{ImportedServiceStore, Service, ServiceCatalog, ServicePort};
use tokio_util::sync::CancellationToken;

/// Records how many objects its generator produced on every run.
struct Recording {
    type_url: &'static str,
    registry: Arc<GeneratorRegistry>,
    runs: Mutex<Vec<usize>>,
}

impl Recording {
    fn new(type_url: &'static str, registry: Arc<GeneratorRegistry>) -> Arc<Self> {
        Arc::new(Self {
            type_url,
            registry,
            runs: Mutex::new(Vec::new()),
        })
    }

    fn runs(&self) -> Vec<usize> {
        self.runs.lock().unwrap().clone()
    }
}

#[async_trait]
impl Reconciler for Recording {
    fn type_url(&self) -> &str {
        self.type_url
    }

    async fn reconcile(&self) -> FederationResult<()> {
        let objects = self.registry.generate(self.type_url).unwrap_or(Ok(Vec::new()))?;
        self.runs.lock().unwrap().push(objects.len());
        Ok(())
    }
}

struct Importer {
    catalog: Arc<ServiceCatalog>,
    registry: Arc<GeneratorRegistry>,
}

/// Mesh `east` importing from `west`, reachable at 192.168.1.10.
fn importer(imports: Arc<ImportedServiceStore>) -> Importer {
    let catalog = Arc::new(ServiceCatalog::new());
    let factory = Arc::new(ConfigFactory::new(
        Arc::new(federation_config("east", vec![remote("west", &["192.168.1.10"])])),
        catalog.clone(),
        imports,
        Arc::new(ResolvedAddresses::new()),
        "federation-discovery-service-east.istio-system.svc.cluster.local",
    ));
    let mut registry = GeneratorRegistry::new();
    register_mesh_generators(&mut registry, factory);
    Importer {
        catalog,
        registry: Arc::new(registry),
    }
}

fn service_entries(registry: &GeneratorRegistry) -> Vec<ServiceEntry> {
    registry
        .generate(TypeUrl::SERVICE_ENTRY)
        .unwrap()
        .unwrap()
        .iter()
        .map(|any| decode_any(any).unwrap())
        .collect()
}

fn workload_entries(registry: &GeneratorRegistry) -> Vec<WorkloadEntry> {
    registry
        .generate(TypeUrl::WORKLOAD_ENTRY)
        .unwrap()
        .unwrap()
        .iter()
        .map(|any| decode_any(any).unwrap())
        .collect()
}

#[tokio::test]
async fn imported_service_without_local_counterpart_becomes_service_entry() {
    let west = TestMesh::start("west").await;
    west.catalog.upsert(exported("b", "ns1"));

    let imports = Arc::new(ImportedServiceStore::new());
    let east = importer(imports.clone());
    let peer = TestPeer::connect_into("west", west.addr, imports);
    peer.wait_for_imports("west", &["ns1/b"]).await;

    let entries = service_entries(&east.registry);
    let imported: Vec<&ServiceEntry> = entries
        .iter()
        .filter(|e| e.spec.as_ref().unwrap().hosts == vec!["b.ns1.svc.cluster.local".to_string()])
        .collect();
    assert_eq!(imported.len(), 1);

    let spec = imported[0].spec.as_ref().unwrap();
    assert_eq!(spec.resolution, "STATIC");
    assert_eq!(spec.location, "MESH_INTERNAL");
    assert_eq!(spec.ports[0].protocol, "HTTP");
    assert_eq!(spec.endpoints.len(), 1);
    assert_eq!(spec.endpoints[0].address, "192.168.1.10");
    assert_eq!(spec.endpoints[0].network, "west-network");
    assert_eq!(spec.endpoints[0].ports.get("http"), Some(&15443));
    assert!(workload_entries(&east.registry).is_empty());

    peer.disconnect().await;
    west.stop().await.unwrap();
}

#[tokio::test]
async fn imported_service_with_local_counterpart_becomes_workload_entries() {
    let west = TestMesh::start("west").await;
    west.catalog.upsert(exported("b", "ns1"));

    let imports = Arc::new(ImportedServiceStore::new());
    let east = importer(imports.clone());
    east.catalog
        .upsert(Service::new("b", "ns1").with_port(ServicePort::new("http", 80)));
    let peer = TestPeer::connect_into("west", west.addr, imports);
    peer.wait_for_imports("west", &["ns1/b"]).await;

    let workloads = workload_entries(&east.registry);
    assert_eq!(workloads.len(), 1);
    let metadata = workloads[0].metadata.as_ref().unwrap();
    assert_eq!(metadata.name, "import-west-b-0");
    assert_eq!(metadata.namespace, "ns1");
    assert_eq!(workloads[0].spec.as_ref().unwrap().address, "192.168.1.10");

    assert!(service_entries(&east.registry)
        .iter()
        .all(|e| e.spec.as_ref().unwrap().hosts != vec!["b.ns1.svc.cluster.local".to_string()]));

    peer.disconnect().await;
    west.stop().await.unwrap();
}

#[tokio::test]
async fn imports_drive_reconcilers() {
    let west = TestMesh::start("west").await;
    west.catalog.upsert(exported("b", "ns1"));

    let imports = Arc::new(ImportedServiceStore::new());
    let east = importer(imports.clone());
    let entries = Recording::new(TypeUrl::SERVICE_ENTRY, east.registry.clone());
    let rules = Recording::new(TypeUrl::DESTINATION_RULE, east.registry.clone());
    let manager = ReconcilerManager::new()
        .with(entries.clone())
        .with(rules.clone());
    manager.reconcile_all().await.unwrap();
    // Only the remote controller entry and rule exist before any import.
    assert_eq!(entries.runs(), vec![1]);
    assert_eq!(rules.runs(), vec![1]);

    let mut peer = TestPeer::connect_into("west", west.addr, imports);
    let (_, idle) = push_channel("idle", 1, OverflowPolicy::Coalesce);
    let requests = std::mem::replace(&mut peer.mesh, idle);
    let shutdown = CancellationToken::new();
    let reconciling = tokio::spawn({
        let shutdown = shutdown.clone();
        async move { manager.run(requests, shutdown).await }
    });

    peer.wait_for_imports("west", &["ns1/b"]).await;
    eventually("reconcile after import", || {
        entries.runs().last() == Some(&2) && rules.runs().last() == Some(&2)
    })
    .await;

    shutdown.cancel();
    tokio::time::timeout(WAIT, reconciling).await.unwrap().unwrap();
    peer.disconnect().await;
    west.stop().await.unwrap();
}
