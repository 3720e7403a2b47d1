//! # federation-proto
//!
//! Generated protobuf types for mesh federation:
//!
//! - `envoy::service::discovery::v3` - the aggregated discovery service
//!   (server, client and messages)
//! - `federation::v1alpha1` - the `ExportedService` wire contract
//! - `federation::mesh::v1alpha1` - mesh configuration objects written to
//!   the local cluster

#![allow(clippy::large_enum_variant, clippy::derive_partial_eq_without_eq)]
#![allow(missing_docs)]

include!(concat!(env!("OUT_DIR"), "/mod.rs"));

pub use envoy::service::discovery::v3 as discovery;
pub use federation::mesh::v1alpha1 as mesh;
pub use federation::v1alpha1 as fds;
