//! Services advertised to peer meshes.

use federation_core::FederationResult;
use federation_proto::fds;
use federation_store::Service;

use crate::factory::ConfigFactory;
use crate::protocol::detect_protocol;

/// Wire form of a local service.
pub fn to_exported_service(service: &Service) -> fds::ExportedService {
    fds::ExportedService {
        name: service.name.clone(),
        namespace: service.namespace.clone(),
        ports: service
            .ports
            .iter()
            .map(|port| fds::ServicePort {
                name: port.name.clone(),
                number: port.port,
                protocol: detect_protocol(&port.name).to_string(),
                target_port: port.target_port,
            })
            .collect(),
        labels: service.labels.clone(),
    }
}

impl ConfigFactory {
    /// Every local service matching the export rules, sorted by namespace
    /// and name.
    pub fn exported_services(&self) -> FederationResult<Vec<fds::ExportedService>> {
        let mut services = self.exports().matching_services()?;
        services.sort_by_key(Service::key);
        Ok(services.iter().map(to_exported_service).collect())
    }
}
