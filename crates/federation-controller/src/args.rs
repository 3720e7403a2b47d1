//! Command line and environment configuration.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use federation_core::{FederationConfig, MeshPeers, OverflowPolicy, ServiceSet};

/// Federates services of the local mesh with its peers.
#[derive(Debug, Clone, Parser)]
#[command(name = "federation-controller", version, about, long_about = None)]
pub struct Args {
    /// Local mesh and peers, as JSON.
    #[arg(long, env = "MESH_PEERS")]
    pub mesh_peers: String,

    /// Rules selecting local services exported to peers, as JSON.
    #[arg(long, env = "EXPORTED_SERVICE_SET")]
    pub exported_service_set: String,

    /// Rules selecting services imported from peers, as JSON.
    #[arg(long, env = "IMPORTED_SERVICE_SET")]
    pub imported_service_set: Option<String>,

    /// Address of the discovery server.
    #[arg(long, env = "LISTEN_ADDR", default_value = "0.0.0.0:15080")]
    pub listen_addr: SocketAddr,

    /// FQDN under which peers reach this controller.
    #[arg(long, env = "CONTROLLER_SERVICE_FQDN")]
    pub controller_service_fqdn: String,

    /// Identifier reported as the control plane of every response.
    #[arg(long, env = "POD_NAME", default_value = "federation-controller")]
    pub pod_name: String,

    /// Delay between reconnect attempts to a peer.
    #[arg(long, default_value = "5s", value_parser = parse_duration)]
    pub reconnect_delay: Duration,

    /// Interval between peer address resolutions.
    #[arg(long, default_value = "1s", value_parser = parse_duration)]
    pub resolve_interval: Duration,

    /// Capacity of each push queue.
    #[arg(long, default_value_t = 64)]
    pub push_queue_capacity: usize,

    /// What a producer does when a push queue is full.
    #[arg(long, value_enum, default_value_t = Overflow::Wait)]
    pub push_overflow: Overflow,

    /// Time given to open streams after shutdown starts.
    #[arg(long, default_value = "5s", value_parser = parse_duration)]
    pub grace_period: Duration,

    /// Serve Prometheus metrics on this address.
    #[arg(long, env = "METRICS_ADDR")]
    pub metrics_addr: Option<SocketAddr>,

    /// Log output format.
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

/// Push queue overflow behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Overflow {
    /// Block the producer until there is room.
    Wait,
    /// Keep only the newest overflowing request per type.
    Coalesce,
}

impl From<Overflow> for OverflowPolicy {
    fn from(overflow: Overflow) -> Self {
        match overflow {
            Overflow::Wait => OverflowPolicy::Wait,
            Overflow::Coalesce => OverflowPolicy::Coalesce,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human readable lines.
    Text,
    /// One JSON object per event.
    Json,
}

impl Args {
    /// Parse and validate the federation configuration documents.
    pub fn federation_config(&self) -> Result<FederationConfig> {
        let mesh_peers = MeshPeers::from_json(&self.mesh_peers)?;
        let exported_service_set = ServiceSet::from_json(&self.exported_service_set)?;
        let imported_service_set = self
            .imported_service_set
            .as_deref()
            .map(ServiceSet::from_json)
            .transpose()?
            .unwrap_or_default();

        let config = FederationConfig {
            mesh_peers,
            exported_service_set,
            imported_service_set,
        };
        config.validate().context("invalid mesh peers")?;
        if self.controller_service_fqdn.is_empty() {
            bail!("controller service FQDN must not be empty");
        }
        Ok(config)
    }
}

/// Parse `<n>ms`, `<n>s` or `<n>m`. A bare number is seconds.
fn parse_duration(value: &str) -> Result<Duration, String> {
    let value = value.trim();
    let (digits, unit) = match value.find(|c: char| !c.is_ascii_digit()) {
        Some(idx) => value.split_at(idx),
        None => (value, "s"),
    };
    let amount: u64 = digits
        .parse()
        .map_err(|_| format!("invalid duration {value:?}"))?;
    match unit {
        "ms" => Ok(Duration::from_millis(amount)),
        "s" => Ok(Duration::from_secs(amount)),
        "m" => amount
            .checked_mul(60)
            .map(Duration::from_secs)
            .ok_or_else(|| format!("duration {value:?} is too large")),
        _ => Err(format!("unknown duration unit in {value:?}")),
    }
}
