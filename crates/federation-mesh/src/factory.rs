//! Shared inputs of every mesh generator.

use std::collections::BTreeMap;
use std::sync::Arc;

use federation_core::{FederationConfig, FederationResult, IngressType, Local, Remote};
use federation_proto::mesh::ObjectMeta;
use federation_store::{ExportStore, ImportedServiceStore, Service, ServiceLister};

use crate::resolve::ResolvedAddresses;

/// Label carried by every generated object, naming the mesh it belongs to.
pub const PEER_LABEL: &str = "federation.istio-ecosystem.io/peer";

/// Label enabling Istio mTLS on imported endpoints.
pub const TLS_MODE_LABEL: &str = "security.istio.io/tlsMode";

/// Name of the local ingress gateway carrying federation traffic.
pub const INGRESS_GATEWAY_NAME: &str = "federation-ingress-gateway";

/// Name of the federation discovery service.
pub const DISCOVERY_SERVICE_NAME: &str = "federation-discovery-service";

/// Namespace of the federation discovery service.
pub const DISCOVERY_SERVICE_NAMESPACE: &str = "istio-system";

const CLUSTER_DOMAIN: &str = "svc.cluster.local";

/// Builds mesh objects from the federation configuration, local services,
/// imported services and resolved peer addresses.
///
/// Every method reads its inputs at call time; nothing is cached.
pub struct ConfigFactory {
    config: Arc<FederationConfig>,
    exports: ExportStore,
    imports: Arc<ImportedServiceStore>,
    resolved: Arc<ResolvedAddresses>,
    discovery_fqdn: String,
}

impl std::fmt::Debug for ConfigFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigFactory")
            .field("local", &self.config.mesh_peers.local.name)
            .field("remotes", &self.config.mesh_peers.remotes.len())
            .field("discovery_fqdn", &self.discovery_fqdn)
            .finish_non_exhaustive()
    }
}

impl ConfigFactory {
    /// Create a factory.
    ///
    /// `discovery_fqdn` is the FQDN under which peers reach the local
    /// discovery service; it is always exposed on the ingress gateway.
    pub fn new(
        config: Arc<FederationConfig>,
        lister: Arc<dyn ServiceLister>,
        imports: Arc<ImportedServiceStore>,
        resolved: Arc<ResolvedAddresses>,
        discovery_fqdn: impl Into<String>,
    ) -> Self {
        let exports = ExportStore::new(lister, config.exported_service_set.clone());
        Self {
            config,
            exports,
            imports,
            resolved,
            discovery_fqdn: discovery_fqdn.into(),
        }
    }

    /// Federation configuration.
    pub fn config(&self) -> &FederationConfig {
        &self.config
    }

    /// Export rules over the local services.
    pub fn exports(&self) -> &ExportStore {
        &self.exports
    }

    /// Imported services.
    pub fn imports(&self) -> &ImportedServiceStore {
        &self.imports
    }

    /// Resolved peer addresses.
    pub fn resolved(&self) -> &ResolvedAddresses {
        &self.resolved
    }

    /// FQDN of the local discovery service.
    pub fn discovery_fqdn(&self) -> &str {
        &self.discovery_fqdn
    }

    pub(crate) fn local(&self) -> &Local {
        &self.config.mesh_peers.local
    }

    pub(crate) fn remotes(&self) -> &[Remote] {
        &self.config.mesh_peers.remotes
    }

    pub(crate) fn control_plane_namespace(&self) -> &str {
        self.local().namespace()
    }

    /// Metadata of an object owned by `peer`.
    pub(crate) fn metadata(&self, name: impl Into<String>, namespace: impl Into<String>, peer: &str) -> ObjectMeta {
        ObjectMeta {
            name: name.into(),
            namespace: namespace.into(),
            labels: BTreeMap::from([(PEER_LABEL.to_string(), peer.to_string())]),
        }
    }

    /// Metadata of an object describing the local mesh.
    pub(crate) fn local_metadata(&self, name: impl Into<String>, namespace: impl Into<String>) -> ObjectMeta {
        self.metadata(name, namespace, &self.local().name)
    }

    /// The local Service behind `host`, if `host` is a cluster-local name
    /// and the service exists.
    pub(crate) fn local_service(&self, host: &str) -> FederationResult<Option<Service>> {
        match service_name_and_namespace(host) {
            Some((name, namespace)) => self.exports.lister().get(namespace, name),
            None => Ok(None),
        }
    }
}

/// Whether `host` has the shape `<name>.<namespace>.svc.cluster.local`.
pub fn could_be_local(host: &str) -> bool {
    host.split('.').count() == 5 && host.ends_with(CLUSTER_DOMAIN)
}

fn service_name_and_namespace(host: &str) -> Option<(&str, &str)> {
    if !could_be_local(host) {
        return None;
    }
    let mut labels = host.split('.');
    Some((labels.next()?, labels.next()?))
}

/// `<name>.<namespace>.svc.cluster.local`
pub(crate) fn cluster_fqdn(name: &str, namespace: &str) -> String {
    format!("{name}.{namespace}.{CLUSTER_DOMAIN}")
}

/// SNI name routed by the ingress gateway to one port of a service.
pub(crate) fn port_sni(name: &str, namespace: &str, port: u32) -> String {
    format!("{name}-{port}.{namespace}.{CLUSTER_DOMAIN}")
}

/// Host of the local ServiceEntry standing in for a remote's controller.
pub fn remote_controller_host(peer: &str, namespace: &str) -> String {
    cluster_fqdn(&remote_controller_name(peer), namespace)
}

pub(crate) fn remote_controller_name(peer: &str) -> String {
    format!("remote-federation-controller-{peer}")
}

/// `host:port` the discovery client dials to reach `remote`.
///
/// Istio peers are reached through the local ServiceEntry standing in for
/// their controller, so the sidecar originates mTLS. Other peers are dialed
/// directly on their first address and discovery port.
pub fn discovery_address(remote: &Remote, namespace: &str) -> Option<String> {
    match remote.ingress_type {
        IngressType::Istio => Some(format!(
            "{}:{}",
            remote_controller_host(&remote.name, namespace),
            remote.data_plane_port()
        )),
        IngressType::OpenshiftRouter => remote
            .addresses
            .first()
            .map(|address| format!("{address}:{}", remote.discovery_port())),
    }
}
