//! Renders generated mesh objects as Kubernetes manifests.

use std::collections::BTreeMap;

use federation_core::{decode_any, FederationError, FederationResult, TypeUrl};
use federation_proto::mesh::{
    DestinationRule, EnvoyFilter, Gateway, ObjectMeta, PeerAuthentication, Route, ServiceEntry, WorkloadEntry,
};
use prost_types::Any;
use serde_json::{json, Map, Value};

/// A mesh object ready to be applied to the cluster.
#[derive(Debug, Clone, PartialEq)]
pub struct Manifest {
    /// `group/version`, e.g. `networking.istio.io/v1alpha3`.
    pub api_version: String,
    /// Object kind, e.g. `ServiceEntry`.
    pub kind: String,
    /// Object name.
    pub name: String,
    /// Object namespace.
    pub namespace: String,
    /// Object labels.
    pub labels: BTreeMap<String, String>,
    /// The object spec with unset fields removed.
    pub spec: Value,
}

impl Manifest {
    /// API group. Empty for the core group.
    pub fn group(&self) -> &str {
        self.api_version
            .split_once('/')
            .map_or("", |(group, _)| group)
    }

    /// API version within the group.
    pub fn version(&self) -> &str {
        self.api_version
            .split_once('/')
            .map_or(self.api_version.as_str(), |(_, version)| version)
    }

    /// Lowercase plural resource name.
    pub fn plural(&self) -> String {
        plural(&self.kind)
    }

    /// The full object as JSON.
    pub fn to_json(&self) -> Value {
        json!({
            "apiVersion": self.api_version,
            "kind": self.kind,
            "metadata": {
                "name": self.name,
                "namespace": self.namespace,
                "labels": self.labels,
            },
            "spec": self.spec,
        })
    }
}

/// Lowercase plural of a kind, as used in resource paths.
///
/// ```
/// assert_eq!(federation_mesh::plural("ServiceEntry"), "serviceentries");
/// assert_eq!(federation_mesh::plural("Gateway"), "gateways");
/// ```
pub fn plural(kind: &str) -> String {
    let lower = kind.to_ascii_lowercase();
    match lower.strip_suffix('y') {
        Some(stem) if lower.ends_with("entry") => format!("{stem}ies"),
        _ => format!("{lower}s"),
    }
}

trait MeshObject: prost::Message + Default {
    fn metadata(&self) -> Option<&ObjectMeta>;
    fn spec(&self) -> serde_json::Result<Value>;
}

macro_rules! mesh_object {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl MeshObject for $ty {
                fn metadata(&self) -> Option<&ObjectMeta> {
                    self.metadata.as_ref()
                }

                fn spec(&self) -> serde_json::Result<Value> {
                    serde_json::to_value(&self.spec)
                }
            }
        )+
    };
}

mesh_object!(
    Gateway,
    ServiceEntry,
    WorkloadEntry,
    EnvoyFilter,
    DestinationRule,
    PeerAuthentication,
    Route,
);

fn render<M: MeshObject>(any: &Any, api_version: &str, kind: &str) -> FederationResult<Manifest> {
    let object: M = decode_any(any)?;
    let metadata = object.metadata().cloned().unwrap_or_default();
    if metadata.name.is_empty() {
        return Err(FederationError::generation(&any.type_url, "object has no name"));
    }
    let spec = object.spec().map_err(|e| FederationError::Encoding {
        type_url: any.type_url.clone(),
        message: e.to_string(),
    })?;

    Ok(Manifest {
        api_version: api_version.to_string(),
        kind: kind.to_string(),
        name: metadata.name,
        namespace: metadata.namespace,
        labels: metadata.labels,
        spec: prune(spec).unwrap_or_else(|| Value::Object(Map::new())),
    })
}

/// Decode a generated mesh object into a [`Manifest`].
///
/// # Errors
///
/// [`FederationError::InvalidTypeUrl`] for types that are not applied to
/// the cluster, decoding errors for malformed payloads.
pub fn render_manifest(any: &Any) -> FederationResult<Manifest> {
    let invalid = |reason: &str| FederationError::InvalidTypeUrl {
        type_url: any.type_url.clone(),
        reason: reason.to_string(),
    };
    let (api_version, kind) = any
        .type_url
        .rsplit_once('/')
        .ok_or_else(|| invalid("missing kind"))?;

    match any.type_url.as_str() {
        TypeUrl::GATEWAY => render::<Gateway>(any, api_version, kind),
        TypeUrl::SERVICE_ENTRY => render::<ServiceEntry>(any, api_version, kind),
        TypeUrl::WORKLOAD_ENTRY => render::<WorkloadEntry>(any, api_version, kind),
        TypeUrl::ENVOY_FILTER => render::<EnvoyFilter>(any, api_version, kind),
        TypeUrl::DESTINATION_RULE => render::<DestinationRule>(any, api_version, kind),
        TypeUrl::PEER_AUTHENTICATION => render::<PeerAuthentication>(any, api_version, kind),
        TypeUrl::ROUTE => render::<Route>(any, api_version, kind),
        _ => Err(invalid("not a mesh object")),
    }
}

/// Drop nulls, zeros, empty strings and empty collections so the applied
/// object only carries the fields that were set.
fn prune(value: Value) -> Option<Value> {
    match value {
        Value::Null => None,
        Value::Bool(false) => None,
        Value::Number(n) if n.as_f64() == Some(0.0) => None,
        Value::String(s) if s.is_empty() => None,
        Value::Array(items) => {
            let items: Vec<Value> = items.into_iter().filter_map(prune).collect();
            (!items.is_empty()).then_some(Value::Array(items))
        }
        Value::Object(fields) => {
            let fields: Map<String, Value> = fields
                .into_iter()
                .filter_map(|(k, v)| prune(v).map(|v| (k, v)))
                .collect();
            (!fields.is_empty()).then_some(Value::Object(fields))
        }
        other => Some(other),
    }
}
