//! # federation-core
//!
//! Core types, traits, and error handling shared by the federation crates.
//!
//! - [`FederationError`] - Error taxonomy with gRPC status code mapping
//! - [`TypeUrl`] - The closed set of resource type identifiers
//! - [`PushRequest`] and [`push_channel`] - Bounded push notifications
//! - [`Generator`] and [`GeneratorRegistry`] - Per-type snapshot producers
//! - [`ResponseHandler`] - Consumer of snapshots received from peers
//! - [`MeshPeers`], [`ServiceSet`] - Federation configuration
//! - [`LabelSelector`] - Export and import rule matching
//!
//! ## Example
//!
//! ```rust
//! use federation_core::{push_channel, OverflowPolicy, PushRequest, TypeUrl};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let (tx, mut rx) = push_channel("fds", 8, OverflowPolicy::Wait);
//! tx.push(PushRequest::regenerate(TypeUrl::EXPORTED_SERVICE)).await.unwrap();
//! assert_eq!(rx.recv().await.unwrap().type_url.as_str(), TypeUrl::EXPORTED_SERVICE);
//! # }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod generator;
mod handler;
mod push;
mod selector;
mod type_url;
mod version;

pub use config::{
    ControlPlane, FederationConfig, GatewayPorts, Gateways, IngressType, Local, LocalGateway,
    MeshPeers, Remote, ServiceRule, ServiceSet, DEFAULT_DATA_PLANE_PORT, DEFAULT_DISCOVERY_PORT,
};
pub use error::FederationError;
pub use generator::{decode_any, encode_any, BoxGenerator, Generator, GeneratorRegistry};
pub use handler::ResponseHandler;
pub use push::{push_channel, OverflowPolicy, PushReceiver, PushRequest, PushSender};
pub use selector::{matches_any, LabelSelector, LabelSelectorRequirement, SelectorOperator};
pub use type_url::TypeUrl;
pub use version::{generate_nonce, ResourceVersion};

/// Result type alias using [`FederationError`].
pub type FederationResult<T> = std::result::Result<T, FederationError>;
