//! Loopback harness shared by the end-to-end tests.
//!
//! A [`TestMesh`] serves the exported services of an in-memory catalog on
//! `127.0.0.1`, a [`TestPeer`] runs the real discovery client against it
//! and stores what it receives.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use federation_client::{ClientConfig, DiscoveryClient};
use federation_core::{
    push_channel, ControlPlane, FederationConfig, FederationResult, Gateways, GeneratorRegistry, LabelSelector,
    Local, LocalGateway, MeshPeers, OverflowPolicy, PushReceiver, PushRequest, PushSender, Remote, ServiceSet,
    TypeUrl,
};
use federation_mesh::{register_discovery_generators, ConfigFactory, ImportedServiceHandler, ResolvedAddresses};
use federation_server::{DiscoveryServer, PushCoordinator, ShutdownController};
use federation_store::{ImportedServiceStore, Service, ServiceCatalog, ServicePort};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Upper bound for anything a test waits on.
pub const WAIT: Duration = Duration::from_secs(5);

/// Reconnect delay used by test clients.
pub const RECONNECT: Duration = Duration::from_millis(50);

/// Federation config of mesh `local` exporting `export=true` services.
pub fn federation_config(local: &str, remotes: Vec<Remote>) -> FederationConfig {
    FederationConfig {
        mesh_peers: MeshPeers {
            local: Local {
                name: local.to_string(),
                control_plane: ControlPlane {
                    namespace: "istio-system".to_string(),
                },
                gateways: Gateways {
                    ingress: LocalGateway {
                        selector: BTreeMap::from([(
                            "app".to_string(),
                            "federation-ingress-gateway".to_string(),
                        )]),
                        ..Default::default()
                    },
                },
            },
            remotes,
        },
        exported_service_set: ServiceSet::from_selectors(vec![LabelSelector::from_labels([("export", "true")])]),
        imported_service_set: ServiceSet::default(),
    }
}

/// A peer reachable on `addresses`.
pub fn remote(name: &str, addresses: &[&str]) -> Remote {
    Remote {
        name: name.to_string(),
        addresses: addresses.iter().map(|a| a.to_string()).collect(),
        network: format!("{name}-network"),
        ..Default::default()
    }
}

/// Service labelled for export with one `http` port.
pub fn exported(name: &str, namespace: &str) -> Service {
    Service::new(name, namespace)
        .with_label("app", name)
        .with_label("export", "true")
        .with_port(ServicePort::new("http", 80))
}

/// Wait until `condition` holds, panicking after [`WAIT`].
pub async fn eventually(what: &str, condition: impl Fn() -> bool) {
    let polled = tokio::time::timeout(WAIT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(polled.is_ok(), "timed out waiting for {what}");
}

/// A mesh serving its exported services over loopback.
pub struct TestMesh {
    /// Local services.
    pub catalog: Arc<ServiceCatalog>,
    /// The running discovery server.
    pub server: DiscoveryServer,
    /// Producer side of the discovery push channel.
    pub push: PushSender,
    /// Shutdown shared by the server and its coordinator.
    pub shutdown: ShutdownController,
    /// Bound address.
    pub addr: SocketAddr,
    serve: JoinHandle<FederationResult<()>>,
    coordinator: JoinHandle<()>,
}

impl TestMesh {
    /// Start mesh `name` on an ephemeral port.
    pub async fn start(name: &str) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        Self::start_on(name, listener).await
    }

    /// Start mesh `name` on `listener`.
    pub async fn start_on(name: &str, listener: TcpListener) -> Self {
        let addr = listener.local_addr().unwrap();
        let catalog = Arc::new(ServiceCatalog::new());
        let factory = Arc::new(ConfigFactory::new(
            Arc::new(federation_config(name, Vec::new())),
            catalog.clone(),
            Arc::new(ImportedServiceStore::new()),
            Arc::new(ResolvedAddresses::new()),
            format!("federation-discovery-service-{name}.istio-system.svc.cluster.local"),
        ));
        let mut registry = GeneratorRegistry::new();
        register_discovery_generators(&mut registry, factory);

        let shutdown = ShutdownController::new();
        let server = DiscoveryServer::builder()
            .registry(Arc::new(registry))
            .shutdown(shutdown.clone())
            .control_plane_id(format!("federation-controller-{name}"))
            .grace_period(Duration::from_millis(50))
            .build()
            .unwrap();

        let (push, push_rx) = push_channel("fds", 64, OverflowPolicy::Wait);
        let coordinator = tokio::spawn(PushCoordinator::new(server.clone()).run(push_rx, shutdown.clone()));

        let signal = shutdown.clone();
        let serve = tokio::spawn(
            server
                .clone()
                .serve_with_listener(listener, async move { signal.cancelled().await }),
        );

        Self {
            catalog,
            server,
            push,
            shutdown,
            addr,
            serve,
            coordinator,
        }
    }

    /// Ask every subscriber to refresh its exported services.
    pub async fn push_exported_services(&self) {
        self.push
            .push(PushRequest::regenerate(TypeUrl::EXPORTED_SERVICE))
            .await
            .unwrap();
    }

    /// Wait until `count` peers are subscribed.
    pub async fn wait_for_subscribers(&self, count: usize) {
        let server = self.server.clone();
        eventually(&format!("{count} subscribers"), move || server.subscribers().len() == count).await;
    }

    /// Shut down and wait for the server to stop.
    pub async fn stop(self) -> FederationResult<()> {
        self.shutdown.trigger();
        self.coordinator.await.unwrap();
        self.serve.await.unwrap()
    }
}

/// A peer importing from one [`TestMesh`] with the real client.
pub struct TestPeer {
    /// What the peer imported, keyed by source mesh.
    pub imports: Arc<ImportedServiceStore>,
    /// Regeneration requests produced by the import handler.
    pub mesh: PushReceiver,
    shutdown: CancellationToken,
    client: JoinHandle<()>,
}

impl TestPeer {
    /// Connect to `source` at `addr`, storing imports under `source`.
    pub fn connect(source: &str, addr: SocketAddr) -> Self {
        Self::connect_into(source, addr, Arc::new(ImportedServiceStore::new()))
    }

    /// Like [`connect`](Self::connect), sharing an existing store.
    pub fn connect_into(source: &str, addr: SocketAddr, imports: Arc<ImportedServiceStore>) -> Self {
        let (mesh_tx, mesh) = push_channel("mesh", 256, OverflowPolicy::Coalesce);
        let handler = ImportedServiceHandler::new(imports.clone(), mesh_tx);
        let client = DiscoveryClient::new(ClientConfig::new(source, addr.to_string()).with_reconnect_delay(RECONNECT))
            .handler(TypeUrl::EXPORTED_SERVICE, Arc::new(handler));

        let shutdown = CancellationToken::new();
        let client = tokio::spawn(client.run(shutdown.clone()));
        Self {
            imports,
            mesh,
            shutdown,
            client,
        }
    }

    /// Names of the services imported from `source`, as `namespace/name`.
    pub fn imported(&self, source: &str) -> Vec<String> {
        imported_names(&self.imports, source)
    }

    /// Wait until the services imported from `source` are exactly `expected`.
    pub async fn wait_for_imports(&self, source: &str, expected: &[&str]) {
        let imports = self.imports.clone();
        let expected: Vec<String> = expected.iter().map(|s| s.to_string()).collect();
        let source = source.to_string();
        eventually(&format!("imports {expected:?}"), move || {
            imported_names(&imports, &source) == expected
        })
        .await;
    }

    /// Stop the client and wait for it.
    pub async fn disconnect(self) {
        self.shutdown.cancel();
        tokio::time::timeout(WAIT, self.client).await.unwrap().unwrap();
    }
}

fn imported_names(imports: &ImportedServiceStore, source: &str) -> Vec<String> {
    let mut names: Vec<String> = imports
        .get(source)
        .into_iter()
        .map(|s| format!("{}/{}", s.namespace, s.name))
        .collect();
    names.sort();
    names
}
