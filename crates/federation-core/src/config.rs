//! Federation configuration model.
//!
//! Documents are JSON, in the same camelCase shape the federation custom
//! resources use:
//!
//! ```json
//! {
//!   "local": {
//!     "name": "east",
//!     "controlPlane": { "namespace": "istio-system" },
//!     "gateway": { "ingress": { "selector": { "app": "federation-ingress-gateway" } } }
//!   },
//!   "remotes": [
//!     { "name": "west", "addresses": ["10.0.0.1"], "network": "west-network" }
//!   ]
//! }
//! ```

use std::collections::{BTreeMap, HashSet};
use std::net::IpAddr;

use serde::{Deserialize, Serialize};

use crate::{FederationError, FederationResult, LabelSelector};

/// Default port of the ingress gateway's TLS passthrough listener.
pub const DEFAULT_DATA_PLANE_PORT: u32 = 15443;

/// Default port of the federation discovery service.
pub const DEFAULT_DISCOVERY_PORT: u32 = 15080;

/// Data plane and discovery ports of a gateway. Zero means "use the default".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GatewayPorts {
    /// Port carrying cross-mesh mTLS traffic.
    pub data_plane: u32,
    /// Port serving the discovery protocol.
    pub discovery: u32,
}

impl GatewayPorts {
    /// Data plane port, falling back to [`DEFAULT_DATA_PLANE_PORT`].
    pub fn data_plane_port(&self) -> u32 {
        if self.data_plane == 0 {
            DEFAULT_DATA_PLANE_PORT
        } else {
            self.data_plane
        }
    }

    /// Discovery port, falling back to [`DEFAULT_DISCOVERY_PORT`].
    pub fn discovery_port(&self) -> u32 {
        if self.discovery == 0 {
            DEFAULT_DISCOVERY_PORT
        } else {
            self.discovery
        }
    }
}

/// How a mesh exposes its ingress gateway.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IngressType {
    /// Istio ingress gateway with an `AUTO_PASSTHROUGH` server.
    #[default]
    Istio,
    /// OpenShift router with passthrough routes.
    OpenshiftRouter,
}

/// Control plane location of the local mesh.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ControlPlane {
    /// Namespace the federation controller and mesh control plane live in.
    pub namespace: String,
}

/// Local ingress gateway used for federation traffic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LocalGateway {
    /// Workload selector of the gateway pods.
    pub selector: BTreeMap<String, String>,
    /// Ports the gateway listens on.
    pub ports: GatewayPorts,
    /// How the gateway is exposed outside the cluster.
    #[serde(rename = "type")]
    pub ingress_type: IngressType,
}

/// Gateways of the local mesh.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Gateways {
    /// Ingress gateway exposing exported services.
    pub ingress: LocalGateway,
}

/// The local mesh.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Local {
    /// Mesh name, used as the peer label on locally produced objects.
    pub name: String,
    /// Control plane location.
    pub control_plane: ControlPlane,
    /// Gateway settings.
    #[serde(rename = "gateway")]
    pub gateways: Gateways,
}

impl Local {
    /// Namespace holding the control plane.
    pub fn namespace(&self) -> &str {
        &self.control_plane.namespace
    }

    /// Data plane port of the local ingress gateway.
    pub fn data_plane_port(&self) -> u32 {
        self.gateways.ingress.ports.data_plane_port()
    }

    /// Whether the local ingress is exposed through OpenShift routes.
    pub fn uses_openshift_router(&self) -> bool {
        self.gateways.ingress.ingress_type == IngressType::OpenshiftRouter
    }
}

/// A peer mesh.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Remote {
    /// Peer name, unique among remotes.
    pub name: String,
    /// IP literals or hostnames of the peer's ingress.
    pub addresses: Vec<String>,
    /// Network identity of the peer.
    pub network: String,
    /// Locality of the peer's endpoints.
    pub locality: String,
    /// Ingress ports of the peer.
    pub ports: GatewayPorts,
    /// How the peer exposes its ingress.
    pub ingress_type: IngressType,
}

impl Remote {
    /// Data plane port of the peer.
    pub fn data_plane_port(&self) -> u32 {
        self.ports.data_plane_port()
    }

    /// Discovery port of the peer.
    pub fn discovery_port(&self) -> u32 {
        self.ports.discovery_port()
    }

    /// Whether any of the peer's addresses is a literal IP.
    pub fn has_ip_address(&self) -> bool {
        self.addresses.iter().any(|a| a.parse::<IpAddr>().is_ok())
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MeshPeersRepr {
    #[serde(default)]
    local: Local,
    #[serde(default)]
    remotes: Vec<Remote>,
    #[serde(default)]
    remote: Option<Remote>,
}

impl From<MeshPeersRepr> for MeshPeers {
    fn from(repr: MeshPeersRepr) -> Self {
        let mut remotes = repr.remotes;
        if let Some(remote) = repr.remote {
            remotes.push(remote);
        }
        Self {
            local: repr.local,
            remotes,
        }
    }
}

/// The local mesh and every peer it federates with.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "MeshPeersRepr")]
pub struct MeshPeers {
    /// Local mesh settings.
    pub local: Local,
    /// Peer meshes.
    pub remotes: Vec<Remote>,
}

impl MeshPeers {
    /// Parse a JSON document.
    pub fn from_json(json: &str) -> FederationResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| FederationError::Configuration(format!("invalid mesh peers: {e}")))
    }

    /// Look up a remote by name.
    pub fn remote(&self, name: &str) -> Option<&Remote> {
        self.remotes.iter().find(|r| r.name == name)
    }

    /// Whether any remote address is a literal IP.
    ///
    /// When true, every imported endpoint must be resolved statically.
    pub fn any_ip_address(&self) -> bool {
        self.remotes.iter().any(Remote::has_ip_address)
    }

    /// Check every remote, reporting all problems at once.
    pub fn validate(&self) -> FederationResult<()> {
        let mut problems = Vec::new();
        let mut seen = HashSet::new();

        for (idx, remote) in self.remotes.iter().enumerate() {
            if remote.name.is_empty() {
                problems.push(format!("remotes[{idx}]: name is required"));
            } else if !seen.insert(remote.name.as_str()) {
                problems.push(format!("remotes[{idx}]: duplicate name {:?}", remote.name));
            }
            if remote.addresses.is_empty() {
                problems.push(format!("remotes[{idx}]: at least one address is required"));
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(FederationError::Configuration(problems.join("; ")))
        }
    }
}

/// One rule of a service set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServiceRule {
    /// Rule type, `LabelSelector` in practice.
    #[serde(rename = "type")]
    pub rule_type: String,
    /// Selectors; a service matches when any of them does.
    pub label_selectors: Vec<LabelSelector>,
}

/// Rules selecting services to export or import.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServiceSet {
    /// Only the first rule is evaluated.
    pub rules: Vec<ServiceRule>,
}

impl ServiceSet {
    /// Set with a single rule made of `selectors`.
    pub fn from_selectors(selectors: Vec<LabelSelector>) -> Self {
        Self {
            rules: vec![ServiceRule {
                rule_type: "LabelSelector".to_string(),
                label_selectors: selectors,
            }],
        }
    }

    /// Parse a JSON document.
    pub fn from_json(json: &str) -> FederationResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| FederationError::Configuration(format!("invalid service set: {e}")))
    }

    /// Selectors of the first rule, or none.
    pub fn label_selectors(&self) -> &[LabelSelector] {
        self.rules
            .first()
            .map(|r| r.label_selectors.as_slice())
            .unwrap_or(&[])
    }
}

/// Complete federation configuration of one mesh.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FederationConfig {
    /// Local mesh and peers.
    pub mesh_peers: MeshPeers,
    /// Rules for services advertised to peers.
    pub exported_service_set: ServiceSet,
    /// Rules for services accepted from peers.
    pub imported_service_set: ServiceSet,
}

impl FederationConfig {
    /// Validate the peer list.
    pub fn validate(&self) -> FederationResult<()> {
        self.mesh_peers.validate()
    }
}
