//! Ingress gateway exposing exported services to peers.

use federation_core::FederationResult;
use federation_proto::mesh::{Gateway, GatewaySpec, Port, Server, ServerTlsSettings};
use federation_store::Service;

use crate::factory::{ConfigFactory, INGRESS_GATEWAY_NAME};

/// Port name of the gateway's passthrough server.
pub const PASSTHROUGH_PORT_NAME: &str = "tls-passthrough";

impl ConfigFactory {
    /// The federation ingress gateway.
    ///
    /// Hosts are the FQDNs of every exported service plus the discovery
    /// service, sorted so that unchanged inputs yield identical output.
    pub fn ingress_gateway(&self) -> FederationResult<Gateway> {
        let mut hosts: Vec<String> = self
            .exports()
            .matching_services()?
            .iter()
            .map(Service::fqdn)
            .collect();
        hosts.push(self.discovery_fqdn().to_string());
        hosts.sort();
        hosts.dedup();

        let ingress = &self.local().gateways.ingress;
        Ok(Gateway {
            metadata: Some(self.local_metadata(INGRESS_GATEWAY_NAME, self.control_plane_namespace())),
            spec: Some(GatewaySpec {
                selector: ingress.selector.clone(),
                servers: vec![Server {
                    port: Some(Port {
                        number: ingress.ports.data_plane_port(),
                        protocol: "TLS".into(),
                        name: PASSTHROUGH_PORT_NAME.into(),
                        target_port: 0,
                    }),
                    hosts,
                    tls: Some(ServerTlsSettings {
                        mode: "AUTO_PASSTHROUGH".into(),
                    }),
                }],
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use federation_core::FederationResult;
    use federation_store::ServiceLister;
    use prost::Message;

    use super::*;
    use crate::factory::fixtures::{exported_service, Fixture};

    /// Lists services in a different order on every call.
    struct Shuffling {
        services: Vec<Service>,
        calls: std::sync::atomic::AtomicUsize,
    }

    impl ServiceLister for Shuffling {
        fn list(&self) -> FederationResult<Vec<Service>> {
            let n = self
                .calls
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            let mut services = self.services.clone();
            let len = services.len();
            services.rotate_left(n % len.max(1));
            if n % 2 == 1 {
                services.reverse();
            }
            Ok(services)
        }

        fn get(&self, namespace: &str, name: &str) -> FederationResult<Option<Service>> {
            Ok(self
                .services
                .iter()
                .find(|s| s.namespace == namespace && s.name == name)
                .cloned())
        }
    }

    #[test]
    fn gateway_shape() {
        let fixture = Fixture::new(vec![]);
        fixture
            .catalog
            .upsert(exported_service("b", "ns1", &[("http", 80)]));
        fixture.catalog.upsert(Service::new("hidden", "ns1"));

        let gateway = fixture.factory().ingress_gateway().unwrap();
        let metadata = gateway.metadata.unwrap();
        assert_eq!(metadata.name, "federation-ingress-gateway");
        assert_eq!(metadata.namespace, "istio-system");
        assert_eq!(metadata.labels["federation.istio-ecosystem.io/peer"], "west");

        let spec = gateway.spec.unwrap();
        assert_eq!(spec.selector["app"], "federation-ingress-gateway");
        let server = &spec.servers[0];
        let port = server.port.as_ref().unwrap();
        assert_eq!((port.number, port.name.as_str(), port.protocol.as_str()), (15443, "tls-passthrough", "TLS"));
        assert_eq!(server.tls.as_ref().unwrap().mode, "AUTO_PASSTHROUGH");
        assert_eq!(
            server.hosts,
            vec![
                "b.ns1.svc.cluster.local",
                "federation-discovery-service-west.istio-system.svc.cluster.local",
            ]
        );
    }

    #[test]
    fn hosts_are_stable_across_listing_orders() {
        let fixture = Fixture::new(vec![]);
        let lister = Arc::new(Shuffling {
            services: vec![
                exported_service("c", "ns1", &[]),
                exported_service("a", "ns2", &[]),
                exported_service("b", "ns1", &[]),
                exported_service("z", "ns0", &[]),
            ],
            calls: Default::default(),
        });
        let factory = ConfigFactory::new(
            Arc::new(fixture.config.clone()),
            lister,
            fixture.imports.clone(),
            fixture.resolved.clone(),
            "federation-discovery-service-west.istio-system.svc.cluster.local",
        );

        let first = factory.ingress_gateway().unwrap();
        let second = factory.ingress_gateway().unwrap();
        assert_eq!(first.encode_to_vec(), second.encode_to_vec());

        let hosts = &first.spec.unwrap().servers[0].hosts;
        let mut sorted = hosts.clone();
        sorted.sort();
        assert_eq!(hosts, &sorted);
        assert_eq!(hosts.len(), 5);
    }
}
