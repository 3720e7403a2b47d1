//! Generators backed by a [`ConfigFactory`].

use std::sync::Arc;

use federation_core::{encode_any, FederationResult, Generator, GeneratorRegistry, TypeUrl};
use prost::Message;
use prost_types::Any;

use crate::factory::ConfigFactory;

type Build = fn(&ConfigFactory, &'static str) -> FederationResult<Vec<Any>>;

/// Generator for one type URL, evaluated against the factory on every call.
pub struct FactoryGenerator {
    type_url: &'static str,
    factory: Arc<ConfigFactory>,
    build: Build,
}

impl std::fmt::Debug for FactoryGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FactoryGenerator")
            .field("type_url", &self.type_url)
            .finish_non_exhaustive()
    }
}

impl FactoryGenerator {
    fn new(type_url: &'static str, factory: Arc<ConfigFactory>, build: Build) -> Self {
        Self {
            type_url,
            factory,
            build,
        }
    }
}

impl Generator for FactoryGenerator {
    fn type_url(&self) -> &str {
        self.type_url
    }

    fn generate(&self) -> FederationResult<Vec<Any>> {
        (self.build)(&self.factory, self.type_url)
    }
}

fn encode_all<M: Message>(type_url: &str, messages: &[M]) -> Vec<Any> {
    messages.iter().map(|m| encode_any(type_url, m)).collect()
}

fn exported_services(factory: &ConfigFactory, type_url: &'static str) -> FederationResult<Vec<Any>> {
    Ok(encode_all(type_url, &factory.exported_services()?))
}

fn gateways(factory: &ConfigFactory, type_url: &'static str) -> FederationResult<Vec<Any>> {
    Ok(vec![encode_any(type_url, &factory.ingress_gateway()?)])
}

fn envoy_filters(factory: &ConfigFactory, type_url: &'static str) -> FederationResult<Vec<Any>> {
    Ok(encode_all(type_url, &factory.envoy_filters()?))
}

fn routes(factory: &ConfigFactory, type_url: &'static str) -> FederationResult<Vec<Any>> {
    Ok(encode_all(type_url, &factory.routes()?))
}

fn destination_rules(factory: &ConfigFactory, type_url: &'static str) -> FederationResult<Vec<Any>> {
    Ok(encode_all(type_url, &factory.destination_rules()))
}

fn peer_authentications(factory: &ConfigFactory, type_url: &'static str) -> FederationResult<Vec<Any>> {
    Ok(encode_all(type_url, &factory.peer_authentications()))
}

fn service_entries(factory: &ConfigFactory, type_url: &'static str) -> FederationResult<Vec<Any>> {
    Ok(encode_all(type_url, &factory.service_entries()?))
}

fn workload_entries(factory: &ConfigFactory, type_url: &'static str) -> FederationResult<Vec<Any>> {
    Ok(encode_all(type_url, &factory.workload_entries()?))
}

/// Register the generator served to peer meshes: `ExportedService`.
pub fn register_discovery_generators(registry: &mut GeneratorRegistry, factory: Arc<ConfigFactory>) {
    registry.register(Arc::new(FactoryGenerator::new(
        TypeUrl::EXPORTED_SERVICE,
        factory,
        exported_services,
    )));
}

/// Register the generators of every mesh object applied to the local
/// cluster. `Route` is only registered for OpenShift router ingress.
pub fn register_mesh_generators(registry: &mut GeneratorRegistry, factory: Arc<ConfigFactory>) {
    let mut builders: Vec<(&'static str, Build)> = vec![
        (TypeUrl::GATEWAY, gateways),
        (TypeUrl::ENVOY_FILTER, envoy_filters),
        (TypeUrl::DESTINATION_RULE, destination_rules),
        (TypeUrl::PEER_AUTHENTICATION, peer_authentications),
        (TypeUrl::SERVICE_ENTRY, service_entries),
        (TypeUrl::WORKLOAD_ENTRY, workload_entries),
    ];
    if factory.config().mesh_peers.local.uses_openshift_router() {
        builders.push((TypeUrl::ROUTE, routes));
    }

    for (type_url, build) in builders {
        registry.register(Arc::new(FactoryGenerator::new(type_url, factory.clone(), build)));
    }
}

#[cfg(test)]
mod tests {
    use federation_core::{decode_any, IngressType};
    use federation_proto::fds;
    use federation_store::{Service, ServicePort};

    use super::*;
    use crate::factory::fixtures::{imported, remote, Fixture};

    #[test]
    fn discovery_registry_serves_exported_services() {
        let fixture = Fixture::new(vec![]);
        fixture
            .catalog
            .upsert(Service::new("a", "ns1").with_label("app", "a"));
        fixture.catalog.upsert(
            Service::new("b", "ns1")
                .with_label("app", "b")
                .with_label("export", "true")
                .with_port(ServicePort::new("http", 80)),
        );

        let mut registry = GeneratorRegistry::new();
        register_discovery_generators(&mut registry, Arc::new(fixture.factory()));
        assert_eq!(registry.type_urls(), vec![TypeUrl::EXPORTED_SERVICE]);

        let resources = registry.generate(TypeUrl::EXPORTED_SERVICE).unwrap().unwrap();
        assert_eq!(resources.len(), 1);
        assert_eq!(resources[0].type_url, TypeUrl::EXPORTED_SERVICE);

        let service: fds::ExportedService = decode_any(&resources[0]).unwrap();
        assert_eq!((service.name.as_str(), service.namespace.as_str()), ("b", "ns1"));
        assert_eq!(service.ports[0].protocol, "HTTP");
        assert_eq!(service.labels.len(), 2);
    }

    #[test]
    fn mesh_registry_covers_local_objects() {
        let fixture = Fixture::new(vec![remote("east", &["10.0.0.1"])]);
        fixture.imports.update("east", vec![imported("b", "ns1")]);

        let mut registry = GeneratorRegistry::new();
        register_mesh_generators(&mut registry, Arc::new(fixture.factory()));
        assert!(!registry.contains(TypeUrl::ROUTE));
        assert!(!registry.contains(TypeUrl::EXPORTED_SERVICE));
        assert_eq!(registry.len(), 6);

        for type_url in registry.type_urls() {
            let resources = registry.generate(&type_url).unwrap().unwrap();
            assert!(
                resources.iter().all(|r| r.type_url == type_url),
                "{type_url} carries foreign type URLs"
            );
        }

        let entries = registry.generate(TypeUrl::SERVICE_ENTRY).unwrap().unwrap();
        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn routes_registered_for_openshift_router() {
        let mut fixture = Fixture::new(vec![]);
        fixture.config.mesh_peers.local.gateways.ingress.ingress_type = IngressType::OpenshiftRouter;

        let mut registry = GeneratorRegistry::new();
        register_mesh_generators(&mut registry, Arc::new(fixture.factory()));
        let routes = registry.generate(TypeUrl::ROUTE).unwrap().unwrap();
        assert_eq!(routes.len(), 1);
    }
}
