//! gRPC health checking for the discovery server.
//!
//! Wraps `tonic-health` so the server can flip every service it hosts to
//! NOT_SERVING before draining.

use std::sync::Arc;
use tokio::sync::Mutex;

use tonic_health::server::HealthReporter;
use tonic_health::ServingStatus;

/// Service names reported by the health service.
pub const SERVICE_NAMES: &[&str] = &[
    "envoy.service.discovery.v3.AggregatedDiscoveryService",
    "federation",
];

/// Health reporter handle.
#[derive(Clone)]
pub struct HealthService {
    reporter: Arc<Mutex<HealthReporter>>,
}

impl std::fmt::Debug for HealthService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthService").finish()
    }
}

impl HealthService {
    /// Create the reporter and the tonic service to mount on the router.
    pub fn new() -> (
        Self,
        tonic_health::pb::health_server::HealthServer<impl tonic_health::pb::health_server::Health>,
    ) {
        let (reporter, service) = tonic_health::server::health_reporter();
        let wrapper = Self {
            reporter: Arc::new(Mutex::new(reporter)),
        };
        (wrapper, service)
    }

    /// Mark every hosted service as serving.
    pub async fn set_all_serving(&self) {
        self.set_all_status(ServingStatus::Serving).await;
    }

    /// Mark every hosted service as not serving.
    pub async fn set_all_not_serving(&self) {
        self.set_all_status(ServingStatus::NotServing).await;
    }

    async fn set_all_status(&self, status: ServingStatus) {
        let mut reporter = self.reporter.lock().await;
        // The empty name is the overall server status.
        reporter.set_service_status("", status).await;
        for service in SERVICE_NAMES {
            reporter.set_service_status(*service, status).await;
        }
    }
}
