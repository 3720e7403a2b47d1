//! Push coordinator: the single consumer of the discovery push channel.

use federation_core::PushReceiver;
use tracing::{debug, info};

use crate::discovery::{DiscoveryServer, PushOutcome};
use crate::shutdown::ShutdownController;

/// Forwards queued push requests to the discovery server.
#[derive(Debug, Clone)]
pub struct PushCoordinator {
    server: DiscoveryServer,
}

impl PushCoordinator {
    /// Create a coordinator for `server`.
    pub fn new(server: DiscoveryServer) -> Self {
        Self { server }
    }

    /// Run until shutdown or until every producer is gone.
    ///
    /// Requests still queued at shutdown are discarded.
    pub async fn run(self, mut receiver: PushReceiver, shutdown: ShutdownController) {
        info!(channel = receiver.name(), "push coordinator started");

        loop {
            let request = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                request = receiver.recv() => match request {
                    Some(request) => request,
                    None => break,
                },
            };

            match self.server.push(&request) {
                PushOutcome::Broadcast(_) => {}
                outcome => debug!(type_url = %request.type_url, ?outcome, "push not delivered"),
            }
        }

        receiver.drain();
        info!(channel = receiver.name(), "push coordinator stopped");
    }
}
