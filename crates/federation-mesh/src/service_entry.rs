//! ServiceEntries and WorkloadEntries for imported services.
//!
//! An imported service whose name and namespace match an existing local
//! Service is joined to it with WorkloadEntries; anything else gets a
//! ServiceEntry of its own.

use std::collections::BTreeMap;

use federation_core::{FederationResult, IngressType, Remote};
use federation_proto::fds;
use federation_proto::mesh::{Port, ServiceEntry, ServiceEntrySpec, WorkloadEntry, WorkloadEntrySpec};
use federation_store::ImportedService;
use tracing::debug;

use crate::factory::{remote_controller_host, remote_controller_name, ConfigFactory, TLS_MODE_LABEL};
use crate::gateway::PASSTHROUGH_PORT_NAME;

/// Endpoint resolution of a ServiceEntry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Endpoints are IP addresses.
    Static,
    /// Endpoints are hostnames resolved by the proxy.
    Dns,
}

impl Resolution {
    /// Name used in the ServiceEntry spec.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Static => "STATIC",
            Self::Dns => "DNS",
        }
    }
}

fn endpoint_labels(service: &fds::ExportedService) -> BTreeMap<String, String> {
    let mut labels = service.labels.clone();
    labels.insert(TLS_MODE_LABEL.to_string(), "istio".to_string());
    labels
}

/// Every port of the service maps to the peer's data plane port.
fn endpoint_ports(service: &fds::ExportedService, remote: &Remote) -> BTreeMap<String, u32> {
    service
        .ports
        .iter()
        .map(|port| (port.name.clone(), remote.data_plane_port()))
        .collect()
}

fn name_of(metadata: Option<&federation_proto::mesh::ObjectMeta>) -> &str {
    metadata.map_or("", |m| m.name.as_str())
}

impl ConfigFactory {
    /// Resolution shared by every imported ServiceEntry.
    ///
    /// A single IP literal among the peer addresses forces STATIC for all
    /// endpoints, since a ServiceEntry cannot mix resolutions.
    pub fn resolution(&self) -> Resolution {
        if self.config().mesh_peers.any_ip_address() {
            Resolution::Static
        } else {
            Resolution::Dns
        }
    }

    /// Remotes exporting `imported`, in configuration order.
    fn source_remotes<'a>(&'a self, imported: &'a ImportedService) -> impl Iterator<Item = &'a Remote> + 'a {
        self.remotes()
            .iter()
            .filter(move |remote| imported.peers.contains(&remote.name))
    }

    /// ServiceEntries for imported services without a local counterpart,
    /// plus one per remote controller. Sorted by name.
    pub fn service_entries(&self) -> FederationResult<Vec<ServiceEntry>> {
        let resolution = self.resolution();
        let namespace = self.control_plane_namespace();
        let mut entries = Vec::new();

        for imported in self.imports().get_all() {
            let host = imported.hostname();
            if self.local_service(&host)?.is_some() {
                continue;
            }

            let service = &imported.service;
            let labels = endpoint_labels(service);
            let mut endpoints = Vec::new();
            for remote in self.source_remotes(&imported) {
                let addresses = match resolution {
                    Resolution::Static => self.resolved().resolve_all(&remote.addresses),
                    Resolution::Dns => remote.addresses.clone(),
                };
                if addresses.is_empty() {
                    debug!(peer = %remote.name, host = %host, "no resolved addresses for peer yet");
                }
                endpoints.extend(addresses.into_iter().map(|address| WorkloadEntrySpec {
                    address,
                    ports: endpoint_ports(service, remote),
                    labels: labels.clone(),
                    network: remote.network.clone(),
                    locality: remote.locality.clone(),
                }));
            }

            let owner = imported.peers.first().map_or("", String::as_str);
            entries.push(ServiceEntry {
                metadata: Some(self.metadata(host.replace('.', "-"), namespace, owner)),
                spec: Some(ServiceEntrySpec {
                    hosts: vec![host],
                    addresses: Vec::new(),
                    ports: service
                        .ports
                        .iter()
                        .map(|port| Port {
                            number: port.number,
                            protocol: port.protocol.clone(),
                            name: port.name.clone(),
                            target_port: port.target_port,
                        })
                        .collect(),
                    location: "MESH_INTERNAL".into(),
                    resolution: resolution.as_str().into(),
                    endpoints,
                }),
            });
        }

        for remote in self.remotes() {
            if let Some(entry) = self.remote_controller_entry(remote) {
                entries.push(entry);
            }
        }

        entries.sort_by(|a, b| name_of(a.metadata.as_ref()).cmp(name_of(b.metadata.as_ref())));
        Ok(entries)
    }

    /// Entry through which the local discovery client reaches `remote`.
    fn remote_controller_entry(&self, remote: &Remote) -> Option<ServiceEntry> {
        let first_address = remote.addresses.first()?;
        let namespace = self.control_plane_namespace();
        let ports = vec![Port {
            number: remote.data_plane_port(),
            protocol: "TLS".into(),
            name: PASSTHROUGH_PORT_NAME.into(),
            target_port: 0,
        }];

        let spec = match remote.ingress_type {
            IngressType::OpenshiftRouter => ServiceEntrySpec {
                hosts: vec![first_address.clone()],
                addresses: self.resolved().get(first_address),
                ports,
                location: "MESH_EXTERNAL".into(),
                resolution: Resolution::Dns.as_str().into(),
                endpoints: Vec::new(),
            },
            IngressType::Istio => {
                let (resolution, addresses) = if remote.has_ip_address() {
                    (Resolution::Static, self.resolved().resolve_all(&remote.addresses))
                } else {
                    (Resolution::Dns, remote.addresses.clone())
                };
                ServiceEntrySpec {
                    hosts: vec![remote_controller_host(&remote.name, namespace)],
                    addresses: Vec::new(),
                    ports,
                    location: "MESH_EXTERNAL".into(),
                    resolution: resolution.as_str().into(),
                    endpoints: addresses
                        .into_iter()
                        .map(|address| WorkloadEntrySpec {
                            address,
                            network: remote.network.clone(),
                            locality: remote.locality.clone(),
                            ..Default::default()
                        })
                        .collect(),
                }
            }
        };

        Some(ServiceEntry {
            metadata: Some(self.metadata(remote_controller_name(&remote.name), namespace, &remote.name)),
            spec: Some(spec),
        })
    }

    /// WorkloadEntries joining imported endpoints to existing local
    /// Services: one per resolved IP of every source peer.
    ///
    /// Sorted by namespace, then name.
    pub fn workload_entries(&self) -> FederationResult<Vec<WorkloadEntry>> {
        let mut entries = Vec::new();

        for imported in self.imports().get_all() {
            let Some(local) = self.local_service(&imported.hostname())? else {
                continue;
            };

            let service = &imported.service;
            let labels = endpoint_labels(service);
            for remote in self.source_remotes(&imported) {
                let ips = self.resolved().resolve_all(&remote.addresses);
                for (index, ip) in ips.into_iter().enumerate() {
                    entries.push(WorkloadEntry {
                        metadata: Some(self.metadata(
                            format!("import-{}-{}-{index}", remote.name, local.name),
                            local.namespace.clone(),
                            &remote.name,
                        )),
                        spec: Some(WorkloadEntrySpec {
                            address: ip,
                            ports: endpoint_ports(service, remote),
                            labels: labels.clone(),
                            network: remote.network.clone(),
                            locality: remote.locality.clone(),
                        }),
                    });
                }
            }
        }

        entries.sort_by(|a, b| {
            let key = |e: &WorkloadEntry| {
                e.metadata
                    .as_ref()
                    .map(|m| (m.namespace.clone(), m.name.clone()))
                    .unwrap_or_default()
            };
            key(a).cmp(&key(b))
        });
        Ok(entries)
    }
}
