//! # federation-server
//!
//! Discovery server of the federation control plane.
//!
//! Peers open one long-lived `StreamAggregatedResources` stream each and
//! become subscribers. The server answers a request with an empty version
//! with the current snapshot of the requested type and broadcasts pushes to
//! every subscriber afterwards.
//!
//! - [`DiscoveryServer`] - Subscriber set, snapshot generation and push
//! - [`DiscoveryServerBuilder`] - Builder for configuring the server
//! - [`PushCoordinator`] - Drains the push channel into the server
//! - [`ShutdownController`] - Process-wide graceful shutdown
//! - gRPC health checking and `metrics` instrumentation
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use federation_core::{push_channel, GeneratorRegistry, OverflowPolicy};
//! use federation_server::{DiscoveryServer, PushCoordinator, ShutdownController};
//!
//! # async fn run() -> federation_core::FederationResult<()> {
//! let shutdown = ShutdownController::new();
//! let server = DiscoveryServer::builder()
//!     .registry(Arc::new(GeneratorRegistry::new()))
//!     .shutdown(shutdown.clone())
//!     .build()?;
//!
//! let (_push_tx, push_rx) = push_channel("fds", 64, OverflowPolicy::Wait);
//! tokio::spawn(PushCoordinator::new(server.clone()).run(push_rx, shutdown.clone()));
//!
//! let signal = shutdown.clone();
//! server
//!     .serve_with_shutdown("0.0.0.0:15080".parse().unwrap(), async move { signal.cancelled().await })
//!     .await
//! # }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(unsafe_code)]
#![warn(missing_docs)]

mod ads;
mod builder;
mod config;
mod coordinator;
mod discovery;
pub mod health;
pub mod metrics;
pub mod shutdown;
mod stream;
mod subscribers;

pub use ads::{AdsResponseStream, AdsService};
pub use builder::DiscoveryServerBuilder;
pub use config::ServerConfig;
pub use coordinator::PushCoordinator;
pub use discovery::{DiscoveryServer, PushOutcome};
pub use health::HealthService;
pub use metrics::DiscoveryMetrics;
pub use shutdown::{OperationGuard, ShutdownController};
pub use stream::{StreamContext, SubscriberId};
pub use subscribers::{BroadcastOutcome, Queued, ResponseSender, Subscriber, SubscriberClosed, SubscriberSet};
