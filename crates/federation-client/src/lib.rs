//! # federation-client
//!
//! Client side of the federation discovery protocol.
//!
//! A [`DiscoveryClient`] dials one peer, requests the current snapshot of
//! every type it has a handler for, acknowledges each response and hands
//! the resources to the registered [`ResponseHandler`]. [`DiscoveryClient::run`]
//! supervises the stream and reconnects with exponential backoff.
//!
//! [`ResponseHandler`]: federation_core::ResponseHandler

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backoff;
mod client;
mod config;

pub use backoff::{Backoff, DEFAULT_BASE_DELAY, DEFAULT_JITTER, DEFAULT_MULTIPLIER};
pub use client::DiscoveryClient;
pub use config::{ClientConfig, DEFAULT_RECONNECT_DELAY};
