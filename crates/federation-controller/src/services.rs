//! Feeds Kubernetes Service events into the export event handler.

use std::sync::Arc;

use federation_mesh::ServiceExportEventHandler;
use federation_store::{Service, ServicePort};
use futures::TryStreamExt;
use k8s_openapi::api::core::v1::Service as KubeService;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::runtime::{watcher, WatchStreamExt};
use kube::{Api, Client, ResourceExt};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Convert a Kubernetes Service into the federation service model.
///
/// Ports with an out-of-range number are skipped. Named target ports are
/// kept as zero.
pub fn convert_service(service: &KubeService) -> Service {
    let ports = service
        .spec
        .as_ref()
        .and_then(|spec| spec.ports.as_ref())
        .map(|ports| {
            ports
                .iter()
                .filter_map(|port| {
                    let number = u32::try_from(port.port).ok()?;
                    let target_port = match &port.target_port {
                        Some(IntOrString::Int(target)) => u32::try_from(*target).unwrap_or(0),
                        Some(IntOrString::String(_)) | None => 0,
                    };
                    Some(ServicePort {
                        name: port.name.clone().unwrap_or_default(),
                        port: number,
                        target_port,
                        protocol: port.protocol.clone().unwrap_or_else(|| "TCP".to_string()),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    Service {
        name: service.name_any(),
        namespace: service.namespace().unwrap_or_default(),
        labels: service.labels().clone(),
        ports,
    }
}

/// Watch every Service in the cluster until shutdown.
///
/// The initial listing is applied as one resync; `synced` is notified once
/// it has been processed.
pub async fn watch_services(
    client: Client,
    handler: Arc<ServiceExportEventHandler>,
    synced: Arc<Notify>,
    shutdown: CancellationToken,
) {
    let api: Api<KubeService> = Api::all(client);
    let stream = watcher(api, watcher::Config::default()).default_backoff();
    tokio::pin!(stream);

    info!("starting service watcher");
    let mut initial: Vec<Service> = Vec::new();

    loop {
        let event = tokio::select! {
            _ = shutdown.cancelled() => break,
            event = stream.try_next() => event,
        };

        let result = match event {
            Ok(Some(watcher::Event::Apply(service))) => handler.apply(convert_service(&service)).await,
            Ok(Some(watcher::Event::Delete(service))) => {
                handler
                    .delete(&service.namespace().unwrap_or_default(), &service.name_any())
                    .await
            }
            Ok(Some(watcher::Event::Init)) => {
                debug!("service watcher relisting");
                initial.clear();
                Ok(false)
            }
            Ok(Some(watcher::Event::InitApply(service))) => {
                initial.push(convert_service(&service));
                Ok(false)
            }
            Ok(Some(watcher::Event::InitDone)) => {
                let services = std::mem::take(&mut initial);
                info!(services = services.len(), "service watcher synced");
                let result = handler.resync(services).await;
                synced.notify_one();
                result
            }
            Ok(None) => break,
            Err(error) => {
                warn!(%error, "service watch failed");
                continue;
            }
        };

        if let Err(error) = result {
            warn!(%error, "failed to handle service event");
        }
    }

    info!("service watcher stopped");
}
