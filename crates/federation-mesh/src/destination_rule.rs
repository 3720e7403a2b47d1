//! mTLS origination towards remote controllers and imported services.

use federation_core::IngressType;
use federation_proto::mesh::{
    ClientTlsSettings, DestinationRule, DestinationRuleSpec, PortSelector, PortTrafficPolicy, TrafficPolicy,
};

use crate::factory::{
    port_sni, remote_controller_host, ConfigFactory, DISCOVERY_SERVICE_NAME, DISCOVERY_SERVICE_NAMESPACE,
};

const ISTIO_MUTUAL: &str = "ISTIO_MUTUAL";

fn istio_mutual(sni: String) -> Option<ClientTlsSettings> {
    Some(ClientTlsSettings {
        mode: ISTIO_MUTUAL.into(),
        sni,
    })
}

impl ConfigFactory {
    /// One rule per remote controller and one per imported service, sorted
    /// by name.
    pub fn destination_rules(&self) -> Vec<DestinationRule> {
        let namespace = self.control_plane_namespace();
        let mut rules = Vec::new();

        for remote in self.remotes() {
            let Some(first_address) = remote.addresses.first() else {
                continue;
            };
            let (host, sni) = match remote.ingress_type {
                IngressType::OpenshiftRouter => (
                    first_address.clone(),
                    port_sni(
                        DISCOVERY_SERVICE_NAME,
                        DISCOVERY_SERVICE_NAMESPACE,
                        remote.discovery_port(),
                    ),
                ),
                IngressType::Istio => (
                    remote_controller_host(&remote.name, namespace),
                    format!("{DISCOVERY_SERVICE_NAME}.{DISCOVERY_SERVICE_NAMESPACE}.svc.cluster.local"),
                ),
            };
            rules.push(DestinationRule {
                metadata: Some(self.metadata(
                    format!("originate-istio-mtls-to-remote-federation-controller-{}", remote.name),
                    namespace,
                    &remote.name,
                )),
                spec: Some(DestinationRuleSpec {
                    host,
                    traffic_policy: Some(TrafficPolicy {
                        tls: istio_mutual(sni),
                        port_level_settings: Vec::new(),
                    }),
                }),
            });
        }

        for imported in self.imports().get_all() {
            let service = &imported.service;
            let owner = imported.peers.first().map_or("", String::as_str);
            rules.push(DestinationRule {
                metadata: Some(self.metadata(
                    format!("originate-istio-mtls-to-{}-{}", service.name, service.namespace),
                    namespace,
                    owner,
                )),
                spec: Some(DestinationRuleSpec {
                    host: imported.hostname(),
                    traffic_policy: Some(TrafficPolicy {
                        tls: None,
                        port_level_settings: service
                            .ports
                            .iter()
                            .map(|port| PortTrafficPolicy {
                                port: Some(PortSelector { number: port.number }),
                                tls: istio_mutual(port_sni(&service.name, &service.namespace, port.number)),
                            })
                            .collect(),
                    }),
                }),
            });
        }

        rules.sort_by(|a, b| name_of(a).cmp(name_of(b)));
        rules
    }
}

fn name_of(rule: &DestinationRule) -> &str {
    rule.metadata.as_ref().map_or("", |m| m.name.as_str())
}
