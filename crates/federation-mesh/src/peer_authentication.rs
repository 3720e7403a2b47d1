//! Strict mTLS for the federation controller's own workloads.

use std::collections::BTreeMap;

use federation_proto::mesh::{LabelSelector, MutualTls, PeerAuthentication, PeerAuthenticationSpec};

use crate::factory::ConfigFactory;

impl ConfigFactory {
    /// `fds-strict-mtls` in the control plane namespace.
    pub fn peer_authentications(&self) -> Vec<PeerAuthentication> {
        vec![PeerAuthentication {
            metadata: Some(self.local_metadata("fds-strict-mtls", self.control_plane_namespace())),
            spec: Some(PeerAuthenticationSpec {
                selector: Some(LabelSelector {
                    match_labels: BTreeMap::from([(
                        "app.kubernetes.io/name".to_string(),
                        "federation-controller".to_string(),
                    )]),
                }),
                mtls: Some(MutualTls {
                    mode: "STRICT".into(),
                }),
            }),
        }]
    }
}
