//! OpenShift passthrough routes to the ingress gateway.

use federation_core::FederationResult;
use federation_proto::mesh::{Route, RoutePort, RouteSpec, RouteTargetReference, TlsConfig};

use crate::factory::{
    port_sni, ConfigFactory, DISCOVERY_SERVICE_NAME, DISCOVERY_SERVICE_NAMESPACE, INGRESS_GATEWAY_NAME,
};
use crate::gateway::PASSTHROUGH_PORT_NAME;

impl ConfigFactory {
    /// One route for the discovery service and one per exported service
    /// port, sorted by name. Empty unless the local ingress is exposed
    /// through the OpenShift router.
    pub fn routes(&self) -> FederationResult<Vec<Route>> {
        if !self.local().uses_openshift_router() {
            return Ok(Vec::new());
        }

        let mut routes = vec![self.route(
            DISCOVERY_SERVICE_NAME,
            DISCOVERY_SERVICE_NAMESPACE,
            self.local().gateways.ingress.ports.discovery_port(),
        )];
        for service in self.exports().matching_services()? {
            for port in &service.ports {
                routes.push(self.route(&service.name, &service.namespace, port.port));
            }
        }

        routes.sort_by(|a, b| name_of(a).cmp(name_of(b)));
        routes.dedup_by(|a, b| name_of(a) == name_of(b));
        Ok(routes)
    }

    fn route(&self, service: &str, namespace: &str, port: u32) -> Route {
        Route {
            metadata: Some(self.local_metadata(
                format!("{service}-{namespace}-{port}-to-{INGRESS_GATEWAY_NAME}"),
                self.control_plane_namespace(),
            )),
            spec: Some(RouteSpec {
                host: port_sni(service, namespace, port),
                to: Some(RouteTargetReference {
                    kind: "Service".into(),
                    name: INGRESS_GATEWAY_NAME.into(),
                }),
                port: Some(RoutePort {
                    target_port: PASSTHROUGH_PORT_NAME.into(),
                }),
                tls: Some(TlsConfig {
                    termination: "passthrough".into(),
                }),
            }),
        }
    }
}

fn name_of(route: &Route) -> &str {
    route.metadata.as_ref().map_or("", |m| m.name.as_str())
}
