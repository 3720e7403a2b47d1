//! Local service model and the lister abstraction over it.

use std::collections::BTreeMap;
use std::fmt;

use federation_core::{FederationResult, LabelSelector};

/// One port of a local service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ServicePort {
    /// Port name, used for protocol detection.
    pub name: String,
    /// Service port number.
    pub port: u32,
    /// Numeric target port, zero when unset or named.
    pub target_port: u32,
    /// Transport protocol as reported by the cluster (`TCP`, `UDP`).
    pub protocol: String,
}

impl ServicePort {
    /// Port with just a name and number.
    pub fn new(name: impl Into<String>, port: u32) -> Self {
        Self {
            name: name.into(),
            port,
            target_port: 0,
            protocol: "TCP".to_string(),
        }
    }

    /// Set the target port.
    #[must_use]
    pub fn with_target_port(mut self, target_port: u32) -> Self {
        self.target_port = target_port;
        self
    }
}

/// A local Kubernetes service as seen by federation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Service {
    /// Service name.
    pub name: String,
    /// Service namespace.
    pub namespace: String,
    /// Service labels.
    pub labels: BTreeMap<String, String>,
    /// Service ports.
    pub ports: Vec<ServicePort>,
}

impl Service {
    /// Service without labels or ports.
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            ..Default::default()
        }
    }

    /// Add a label.
    #[must_use]
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Add a port.
    #[must_use]
    pub fn with_port(mut self, port: ServicePort) -> Self {
        self.ports.push(port);
        self
    }

    /// Catalog key of the service.
    pub fn key(&self) -> ServiceKey {
        ServiceKey::new(&self.namespace, &self.name)
    }

    /// Cluster-local FQDN, e.g. `b.ns1.svc.cluster.local`.
    pub fn fqdn(&self) -> String {
        format!("{}.{}.svc.cluster.local", self.name, self.namespace)
    }
}

/// `namespace/name` key of a service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServiceKey {
    /// Namespace.
    pub namespace: String,
    /// Name.
    pub name: String,
}

impl ServiceKey {
    /// Create a key.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Read access to the local services of the cluster.
///
/// Listing order is not guaranteed to be stable between calls.
pub trait ServiceLister: Send + Sync {
    /// All known services.
    fn list(&self) -> FederationResult<Vec<Service>>;

    /// Look up one service.
    fn get(&self, namespace: &str, name: &str) -> FederationResult<Option<Service>>;

    /// Services whose labels satisfy `selector`.
    fn list_matching(&self, selector: &LabelSelector) -> FederationResult<Vec<Service>> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|s| selector.matches(&s.labels))
            .collect())
    }
}
