//! # federation-controller
//!
//! The federation controller binary, split into a library so each piece can
//! be tested on its own:
//!
//! - [`args`] - flags and environment, parsed into the federation model
//! - [`telemetry`] - tracing subscriber and Prometheus exporter
//! - [`services`] - Kubernetes Service watcher feeding the local catalog
//! - [`apply`] - server-side apply reconcilers for generated mesh objects
//! - [`controller`] - startup order and graceful shutdown

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod apply;
pub mod args;
pub mod controller;
pub mod services;
pub mod telemetry;

pub use args::Args;
pub use controller::run;
