//! # federation-mesh
//!
//! Everything federation derives from the local cluster and from peers:
//!
//! - [`ConfigFactory`] - builds exported services and the mesh objects
//!   (gateway, filters, rules, entries, routes) from the current stores
//! - [`register_discovery_generators`] and [`register_mesh_generators`] -
//!   wire the factory into generator registries
//! - [`ImportedServiceHandler`] - stores peer snapshots and requests
//!   regeneration of dependent objects
//! - [`ServiceExportEventHandler`] - reacts to local Service changes
//! - [`AddressWatcher`] - re-resolves peer addresses and pushes on change
//! - [`ReconcilerManager`] - applies generated objects to the cluster
//!
//! ## Example
//!
//! ```rust
//! use federation_mesh::{could_be_local, detect_protocol};
//!
//! assert_eq!(detect_protocol("http-web"), "HTTP");
//! assert!(could_be_local("reviews.bookinfo.svc.cluster.local"));
//! assert!(!could_be_local("reviews.example.com"));
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(unsafe_code)]
#![warn(missing_docs)]

mod destination_rule;
mod envoy_filter;
mod exported;
mod factory;
mod gateway;
mod generators;
mod import;
mod informer;
mod manifest;
mod peer_authentication;
mod protocol;
mod reconcile;
mod resolve;
mod route;
mod service_entry;
mod watcher;

pub use exported::to_exported_service;
pub use factory::{
    could_be_local, discovery_address, remote_controller_host, ConfigFactory, DISCOVERY_SERVICE_NAME, DISCOVERY_SERVICE_NAMESPACE,
    INGRESS_GATEWAY_NAME, PEER_LABEL, TLS_MODE_LABEL,
};
pub use gateway::PASSTHROUGH_PORT_NAME;
pub use generators::{register_discovery_generators, register_mesh_generators, FactoryGenerator};
pub use import::{ImportedServiceHandler, IMPORT_DEPENDENT_TYPES};
pub use informer::ServiceExportEventHandler;
pub use manifest::{plural, render_manifest, Manifest};
pub use protocol::{detect_protocol, DEFAULT_PROTOCOL};
pub use reconcile::{Reconciler, ReconcilerManager};
pub use resolve::{is_ip, resolve_address, AddressResolver, DnsResolver, ResolvedAddresses};
pub use service_entry::Resolution;
pub use watcher::{AddressWatcher, DEFAULT_RESOLVE_INTERVAL};
