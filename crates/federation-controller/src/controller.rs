//! Wires every component of the controller under one shutdown controller.

use std::sync::Arc;

use anyhow::{Context, Result};
use federation_client::{ClientConfig, DiscoveryClient};
use federation_core::{push_channel, FederationConfig, GeneratorRegistry, PushSender, TypeUrl};
use federation_mesh::{
    discovery_address, register_discovery_generators, register_mesh_generators, AddressWatcher, ConfigFactory,
    DnsResolver, ImportedServiceHandler, ReconcilerManager, ResolvedAddresses, ServiceExportEventHandler,
};
use federation_server::shutdown::wait_for_signal;
use federation_server::{DiscoveryServer, PushCoordinator, ShutdownController};
use federation_store::{ImportedServiceStore, ServiceCatalog};
use tokio::sync::Notify;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::apply::KubeReconciler;
use crate::args::Args;
use crate::services::watch_services;

/// Run the controller until SIGINT or SIGTERM.
pub async fn run(args: Args) -> Result<()> {
    let config = Arc::new(args.federation_config()?);
    let local = &config.mesh_peers.local;
    info!(
        mesh = %local.name,
        remotes = config.mesh_peers.remotes.len(),
        listen_addr = %args.listen_addr,
        "starting federation controller"
    );

    let shutdown = ShutdownController::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            match wait_for_signal().await {
                Ok(()) => {
                    shutdown.trigger();
                }
                Err(error) => error!(%error, "failed to install signal handlers"),
            }
        }
    });

    let overflow = args.push_overflow.into();
    let (fds_tx, fds_rx) = push_channel("fds", args.push_queue_capacity, overflow);
    let (mesh_tx, mesh_rx) = push_channel("mesh", args.push_queue_capacity, overflow);

    let client = kube::Client::try_default()
        .await
        .context("failed to create Kubernetes client")?;

    let catalog = Arc::new(ServiceCatalog::new());
    let events = ServiceExportEventHandler::new(
        catalog.clone(),
        config.exported_service_set.clone(),
        fds_tx.clone(),
        mesh_tx.clone(),
    )
    .with_routes(local.uses_openshift_router());
    let synced = Arc::new(Notify::new());

    let mut tasks = JoinSet::new();
    tasks.spawn(watch_services(
        client.clone(),
        Arc::new(events),
        synced.clone(),
        shutdown.child_token(),
    ));

    tokio::select! {
        _ = synced.notified() => info!(services = catalog.len(), "local services synced"),
        _ = shutdown.cancelled() => {
            tasks.shutdown().await;
            return Ok(());
        }
    }

    let imports = Arc::new(ImportedServiceStore::new());
    let resolved = Arc::new(ResolvedAddresses::new());
    let factory = Arc::new(ConfigFactory::new(
        config.clone(),
        catalog.clone(),
        imports.clone(),
        resolved.clone(),
        args.controller_service_fqdn.clone(),
    ));

    let mut discovery_registry = GeneratorRegistry::new();
    register_discovery_generators(&mut discovery_registry, factory.clone());
    let mut mesh_registry = GeneratorRegistry::new();
    register_mesh_generators(&mut mesh_registry, factory);
    let mesh_registry = Arc::new(mesh_registry);

    let server = DiscoveryServer::builder()
        .registry(Arc::new(discovery_registry))
        .shutdown(shutdown.clone())
        .control_plane_id(args.pod_name.clone())
        .grace_period(args.grace_period)
        .build()?;
    tasks.spawn(PushCoordinator::new(server.clone()).run(fds_rx, shutdown.clone()));

    let watcher = AddressWatcher::new(
        config.mesh_peers.remotes.clone(),
        Arc::new(DnsResolver),
        resolved,
        mesh_tx.clone(),
    )
    .with_interval(args.resolve_interval);
    watcher.resolve_once().await;
    tasks.spawn(watcher.run(shutdown.child_token()));

    let reconcilers = mesh_registry
        .type_urls()
        .into_iter()
        .fold(ReconcilerManager::new(), |manager, type_url| {
            manager.with(Arc::new(KubeReconciler::new(
                type_url,
                mesh_registry.clone(),
                client.clone(),
            )))
        });
    if let Err(error) = reconcilers.reconcile_all().await {
        warn!(%error, "initial reconcile incomplete");
    }
    let token = shutdown.child_token();
    tasks.spawn(async move { reconcilers.run(mesh_rx, token).await });

    for discovery in discovery_clients(&config, imports, &mesh_tx, &args)? {
        tasks.spawn(discovery.run(shutdown.child_token()));
    }
    drop(fds_tx);
    drop(mesh_tx);

    let signal = shutdown.clone();
    let served = server
        .serve_with_shutdown(args.listen_addr, async move { signal.cancelled().await })
        .await;
    shutdown.trigger();

    while let Some(joined) = tasks.join_next().await {
        if let Err(error) = joined {
            warn!(%error, "task failed");
        }
    }
    info!("federation controller stopped");
    served.context("discovery server failed")
}

/// One discovery client per remote, each storing what it receives in
/// `imports` and requesting regeneration on `mesh`.
fn discovery_clients(
    config: &FederationConfig,
    imports: Arc<ImportedServiceStore>,
    mesh: &PushSender,
    args: &Args,
) -> Result<Vec<DiscoveryClient>> {
    let namespace = config.mesh_peers.local.namespace();
    config
        .mesh_peers
        .remotes
        .iter()
        .map(|remote| {
            let address = discovery_address(remote, namespace)
                .with_context(|| format!("remote {} has no address", remote.name))?;
            let handler = ImportedServiceHandler::new(imports.clone(), mesh.clone())
                .with_rules(config.imported_service_set.clone());
            let client_config = ClientConfig::new(&remote.name, address).with_reconnect_delay(args.reconnect_delay);
            Ok(DiscoveryClient::new(client_config).handler(TypeUrl::EXPORTED_SERVICE, Arc::new(handler)))
        })
        .collect()
}
