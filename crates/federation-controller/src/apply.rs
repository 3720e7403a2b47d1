//! Server-side apply of generated mesh objects.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use federation_core::{FederationError, FederationResult, GeneratorRegistry};
use federation_mesh::{plural, render_manifest, Manifest, Reconciler, PEER_LABEL};
use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams};
use kube::core::{ApiResource, DynamicObject, GroupVersionKind};
use kube::{Client, ResourceExt};
use serde_json::json;
use tracing::{debug, info, instrument, warn};

/// Field manager of every applied object.
pub const FIELD_MANAGER: &str = "federation-controller";

/// Keeps the objects of one type in the cluster equal to the output of its
/// generator. Objects carrying the peer label that are no longer generated
/// are deleted.
pub struct KubeReconciler {
    type_url: String,
    registry: Arc<GeneratorRegistry>,
    client: Client,
}

impl std::fmt::Debug for KubeReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeReconciler")
            .field("type_url", &self.type_url)
            .finish_non_exhaustive()
    }
}

impl KubeReconciler {
    /// Reconciler for `type_url`, generated by `registry`.
    pub fn new(type_url: impl Into<String>, registry: Arc<GeneratorRegistry>, client: Client) -> Self {
        Self {
            type_url: type_url.into(),
            registry,
            client,
        }
    }

    fn desired(&self) -> FederationResult<Vec<Manifest>> {
        let resources = self
            .registry
            .generate(&self.type_url)
            .ok_or_else(|| FederationError::InvalidTypeUrl {
                type_url: self.type_url.clone(),
                reason: "no generator registered".to_string(),
            })??;
        resources.iter().map(render_manifest).collect()
    }

    fn failure(&self, action: &str, namespace: &str, name: &str, error: kube::Error) -> String {
        warn!(type_url = %self.type_url, namespace, name, %error, "failed to {action} object");
        format!("{action} {namespace}/{name}: {error}")
    }
}

#[async_trait]
impl Reconciler for KubeReconciler {
    fn type_url(&self) -> &str {
        &self.type_url
    }

    #[instrument(skip(self), fields(type_url = %self.type_url))]
    async fn reconcile(&self) -> FederationResult<()> {
        let resource = api_resource(&self.type_url)?;
        let desired = self.desired()?;
        let params = PatchParams::apply(FIELD_MANAGER).force();
        let mut failures = Vec::new();

        for manifest in &desired {
            let api: Api<DynamicObject> =
                Api::namespaced_with(self.client.clone(), &manifest.namespace, &resource);
            let object = to_dynamic(manifest, &resource);
            if let Err(error) = api.patch(&manifest.name, &params, &Patch::Apply(&object)).await {
                failures.push(self.failure("apply", &manifest.namespace, &manifest.name, error));
            }
        }

        let all: Api<DynamicObject> = Api::all_with(self.client.clone(), &resource);
        let existing = all
            .list(&ListParams::default().labels(PEER_LABEL))
            .await
            .map_err(|e| FederationError::Reconcile {
                type_url: self.type_url.clone(),
                message: format!("list: {e}"),
            })?;
        let existing = existing
            .items
            .iter()
            .map(|object| (object.namespace().unwrap_or_default(), object.name_any()));

        for (namespace, name) in stale_objects(&desired, existing) {
            let api: Api<DynamicObject> = Api::namespaced_with(self.client.clone(), &namespace, &resource);
            match api.delete(&name, &DeleteParams::default()).await {
                Ok(_) => info!(namespace = %namespace, name = %name, "deleted stale object"),
                Err(kube::Error::Api(response)) if response.code == 404 => {}
                Err(error) => failures.push(self.failure("delete", &namespace, &name, error)),
            }
        }

        if !failures.is_empty() {
            return Err(FederationError::Reconcile {
                type_url: self.type_url.clone(),
                message: failures.join("; "),
            });
        }
        debug!(applied = desired.len(), "objects reconciled");
        Ok(())
    }
}

/// The Kubernetes resource behind a type URL, e.g.
/// `networking.istio.io/v1alpha3/ServiceEntry`.
pub fn api_resource(type_url: &str) -> FederationResult<ApiResource> {
    let invalid = || FederationError::InvalidTypeUrl {
        type_url: type_url.to_string(),
        reason: "expected <group>/<version>/<kind>".to_string(),
    };
    let (api_version, kind) = type_url.rsplit_once('/').ok_or_else(invalid)?;
    let (group, version) = api_version.split_once('/').ok_or_else(invalid)?;
    let gvk = GroupVersionKind::gvk(group, version, kind);
    Ok(ApiResource::from_gvk_with_plural(&gvk, &plural(kind)))
}

/// The object sent with server-side apply.
pub fn to_dynamic(manifest: &Manifest, resource: &ApiResource) -> DynamicObject {
    let mut object = DynamicObject::new(&manifest.name, resource)
        .within(&manifest.namespace)
        .data(json!({ "spec": manifest.spec }));
    object.metadata.labels = Some(manifest.labels.clone());
    object
}

/// `(namespace, name)` of existing objects that are not desired, sorted.
pub fn stale_objects(
    desired: &[Manifest],
    existing: impl IntoIterator<Item = (String, String)>,
) -> Vec<(String, String)> {
    let keep: BTreeSet<(&str, &str)> = desired
        .iter()
        .map(|m| (m.namespace.as_str(), m.name.as_str()))
        .collect();
    let stale: BTreeSet<(String, String)> = existing
        .into_iter()
        .filter(|(namespace, name)| !keep.contains(&(namespace.as_str(), name.as_str())))
        .collect();
    stale.into_iter().collect()
}
