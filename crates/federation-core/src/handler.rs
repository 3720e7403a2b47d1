//! Consumer side of the discovery client.

use async_trait::async_trait;
use prost_types::Any;

use crate::FederationResult;

/// Handles the resources of one type received from a peer.
///
/// Each call carries the complete snapshot the peer sent for the type.
#[async_trait]
pub trait ResponseHandler: Send + Sync {
    /// Process a snapshot received from `peer`.
    async fn handle(&self, peer: &str, resources: Vec<Any>) -> FederationResult<()>;
}
