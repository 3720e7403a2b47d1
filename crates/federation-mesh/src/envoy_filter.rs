//! SNI rewriting filters on the ingress gateway.
//!
//! Peers address an exported port as `<svc>-<port>.<ns>.svc.cluster.local`.
//! Each filter adds that name to the server names of the gateway filter
//! chain that already serves the port's outbound SNI.

use federation_core::FederationResult;
use federation_proto::mesh::{
    EnvoyConfigObjectMatch, EnvoyConfigObjectPatch, EnvoyFilter, EnvoyFilterSpec, FilterChainMatch,
    ListenerMatch, Patch, PatchValue, ServerNamesMatch, WorkloadSelector,
};

use crate::factory::{port_sni, ConfigFactory, DISCOVERY_SERVICE_NAME, DISCOVERY_SERVICE_NAMESPACE};

impl ConfigFactory {
    /// One filter for the discovery service and one per exported service
    /// port, sorted by name.
    pub fn envoy_filters(&self) -> FederationResult<Vec<EnvoyFilter>> {
        let mut filters = vec![self.sni_filter(
            DISCOVERY_SERVICE_NAME,
            DISCOVERY_SERVICE_NAMESPACE,
            self.local().gateways.ingress.ports.discovery_port(),
        )];
        for service in self.exports().matching_services()? {
            for port in &service.ports {
                filters.push(self.sni_filter(&service.name, &service.namespace, port.port));
            }
        }

        filters.sort_by(|a, b| name_of(a).cmp(name_of(b)));
        filters.dedup_by(|a, b| name_of(a) == name_of(b));
        Ok(filters)
    }

    fn sni_filter(&self, service: &str, namespace: &str, port: u32) -> EnvoyFilter {
        let listener = format!("0.0.0.0_{}", self.local().data_plane_port());
        EnvoyFilter {
            metadata: Some(self.local_metadata(
                format!("sni-{service}-{namespace}-{port}"),
                self.control_plane_namespace(),
            )),
            spec: Some(EnvoyFilterSpec {
                workload_selector: Some(WorkloadSelector {
                    labels: self.local().gateways.ingress.selector.clone(),
                }),
                config_patches: vec![EnvoyConfigObjectPatch {
                    apply_to: "FILTER_CHAIN".into(),
                    r#match: Some(EnvoyConfigObjectMatch {
                        listener: Some(ListenerMatch {
                            name: listener,
                            filter_chain: Some(FilterChainMatch {
                                sni: format!("outbound_.{port}_._.{service}.{namespace}.svc.cluster.local"),
                            }),
                        }),
                    }),
                    patch: Some(Patch {
                        operation: "MERGE".into(),
                        value: Some(PatchValue {
                            filter_chain_match: Some(ServerNamesMatch {
                                server_names: vec![port_sni(service, namespace, port)],
                            }),
                        }),
                    }),
                }],
            }),
        }
    }
}

fn name_of(filter: &EnvoyFilter) -> &str {
    filter.metadata.as_ref().map_or("", |m| m.name.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factory::fixtures::{exported_service, Fixture};

    #[test]
    fn one_filter_per_exported_port() {
        let fixture = Fixture::new(vec![]);
        fixture
            .catalog
            .upsert(exported_service("b", "ns1", &[("http", 80), ("grpc", 9090)]));

        let filters = fixture.factory().envoy_filters().unwrap();
        let names: Vec<&str> = filters.iter().map(name_of).collect();
        assert_eq!(
            names,
            vec![
                "sni-b-ns1-80",
                "sni-b-ns1-9090",
                "sni-federation-discovery-service-istio-system-15080",
            ]
        );

        let spec = filters[0].spec.as_ref().unwrap();
        assert_eq!(
            spec.workload_selector.as_ref().unwrap().labels["app"],
            "federation-ingress-gateway"
        );
        let patch = &spec.config_patches[0];
        assert_eq!(patch.apply_to, "FILTER_CHAIN");
        let listener = patch.r#match.as_ref().unwrap().listener.as_ref().unwrap();
        assert_eq!(listener.name, "0.0.0.0_15443");
        assert_eq!(
            listener.filter_chain.as_ref().unwrap().sni,
            "outbound_.80_._.b.ns1.svc.cluster.local"
        );
        let merge = patch.patch.as_ref().unwrap();
        assert_eq!(merge.operation, "MERGE");
        assert_eq!(
            merge.value.as_ref().unwrap().filter_chain_match.as_ref().unwrap().server_names,
            vec!["b-80.ns1.svc.cluster.local"]
        );
    }

    #[test]
    fn discovery_filter_without_exports() {
        let fixture = Fixture::new(vec![]);
        let filters = fixture.factory().envoy_filters().unwrap();
        assert_eq!(filters.len(), 1);
        let sni = filters[0].spec.as_ref().unwrap().config_patches[0]
            .patch
            .as_ref()
            .unwrap()
            .value
            .as_ref()
            .unwrap()
            .filter_chain_match
            .as_ref()
            .unwrap()
            .server_names[0]
            .clone();
        assert_eq!(sni, "federation-discovery-service-15080.istio-system.svc.cluster.local");
    }
}
