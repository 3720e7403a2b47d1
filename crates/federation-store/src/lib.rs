//! # federation-store
//!
//! Service state consumed by the federation generators:
//!
//! - [`ServiceCatalog`] - DashMap-based mirror of the cluster's services
//! - [`ExportStore`] - Export rule evaluation over a [`ServiceLister`]
//! - [`ImportedServiceStore`] - Per-peer snapshots of imported services
//!
//! ## Key Design Decisions
//!
//! - Listers are synchronous so generators never await while building a snapshot
//! - No `DashMap` reference escapes a method call
//! - Imported snapshots are replaced wholesale and read by copy
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use federation_core::{LabelSelector, ServiceSet};
//! use federation_store::{ExportStore, Service, ServiceCatalog};
//!
//! let catalog = Arc::new(ServiceCatalog::new());
//! catalog.upsert(Service::new("b", "ns1").with_label("export", "true"));
//!
//! let rules = ServiceSet::from_selectors(vec![LabelSelector::from_labels([("export", "true")])]);
//! let exports = ExportStore::new(catalog, rules);
//! assert_eq!(exports.matching_services().unwrap().len(), 1);
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(unsafe_code)]
#![warn(missing_docs)]

mod catalog;
mod export;
mod import;
mod service;
mod stats;

pub use catalog::ServiceCatalog;
pub use export::ExportStore;
pub use import::{ImportedService, ImportedServiceStore};
pub use service::{Service, ServiceKey, ServiceLister, ServicePort};
pub use stats::StoreStats;
