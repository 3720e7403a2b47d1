//! Peer address resolution and the cache generators read from.

use std::collections::BTreeMap;
use std::net::IpAddr;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use federation_core::{FederationError, FederationResult};
use tracing::{trace, warn};

/// Resolves a hostname to IP addresses.
#[async_trait]
pub trait AddressResolver: Send + Sync {
    /// Look up `host`.
    async fn lookup(&self, host: &str) -> FederationResult<Vec<IpAddr>>;
}

/// System DNS lookup through [`tokio::net::lookup_host`].
#[derive(Debug, Default, Clone, Copy)]
pub struct DnsResolver;

#[async_trait]
impl AddressResolver for DnsResolver {
    async fn lookup(&self, host: &str) -> FederationResult<Vec<IpAddr>> {
        let addrs = tokio::net::lookup_host((host, 0))
            .await
            .map_err(|e| FederationError::resolution(host, e))?;
        Ok(addrs.map(|addr| addr.ip()).collect())
    }
}

/// Whether `address` is an IP literal.
pub fn is_ip(address: &str) -> bool {
    address.parse::<IpAddr>().is_ok()
}

/// Resolve one peer address to sorted, de-duplicated IP strings.
///
/// A literal IP resolves to itself. Lookup failures are logged and yield
/// no addresses.
pub async fn resolve_address(resolver: &dyn AddressResolver, address: &str) -> Vec<String> {
    if is_ip(address) {
        return vec![address.to_string()];
    }

    match resolver.lookup(address).await {
        Ok(ips) => {
            let mut ips: Vec<String> = ips.iter().map(IpAddr::to_string).collect();
            ips.sort();
            ips.dedup();
            trace!(address, ?ips, "resolved peer address");
            ips
        }
        Err(error) => {
            warn!(address, %error, "failed to resolve peer address");
            Vec::new()
        }
    }
}

/// Last resolution result of every peer hostname.
///
/// Written by the address watcher, read by generators that need STATIC
/// endpoints. IP literals are never stored; they resolve to themselves.
#[derive(Debug, Default)]
pub struct ResolvedAddresses {
    by_host: RwLock<BTreeMap<String, Vec<String>>>,
}

impl ResolvedAddresses {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the IPs `host` resolved to.
    pub fn set(&self, host: impl Into<String>, ips: Vec<String>) {
        let host = host.into();
        if is_ip(&host) {
            return;
        }
        self.by_host
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(host, ips);
    }

    /// IPs of `address`: itself for a literal, the cached result otherwise.
    pub fn get(&self, address: &str) -> Vec<String> {
        if is_ip(address) {
            return vec![address.to_string()];
        }
        self.by_host
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(address)
            .cloned()
            .unwrap_or_default()
    }

    /// IPs of every address, in address order.
    pub fn resolve_all<'a>(&self, addresses: impl IntoIterator<Item = &'a String>) -> Vec<String> {
        addresses
            .into_iter()
            .flat_map(|address| self.get(address))
            .collect()
    }

    /// Number of cached hostnames.
    pub fn len(&self) -> usize {
        self.by_host
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether no hostname has been resolved yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Failing;

    #[async_trait]
    impl AddressResolver for Failing {
        async fn lookup(&self, host: &str) -> FederationResult<Vec<IpAddr>> {
            Err(FederationError::resolution(
                host,
                std::io::Error::new(std::io::ErrorKind::NotFound, "no such host"),
            ))
        }
    }

    struct Fixed(Vec<IpAddr>);

    #[async_trait]
    impl AddressResolver for Fixed {
        async fn lookup(&self, _host: &str) -> FederationResult<Vec<IpAddr>> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn literal_ip_resolves_to_itself() {
        assert_eq!(resolve_address(&Failing, "10.0.0.1").await, vec!["10.0.0.1"]);
        assert_eq!(resolve_address(&Failing, "fd00::1").await, vec!["fd00::1"]);
    }

    #[tokio::test]
    async fn lookup_failure_yields_nothing() {
        assert!(resolve_address(&Failing, "b.example.com").await.is_empty());
    }

    #[tokio::test]
    async fn lookup_results_are_sorted_and_unique() {
        let resolver = Fixed(vec![
            "10.0.0.9".parse().unwrap(),
            "10.0.0.2".parse().unwrap(),
            "10.0.0.9".parse().unwrap(),
        ]);
        assert_eq!(
            resolve_address(&resolver, "b.example.com").await,
            vec!["10.0.0.2", "10.0.0.9"]
        );
    }

    #[tokio::test]
    async fn dns_resolver_resolves_localhost() {
        let ips = DnsResolver.lookup("localhost").await.unwrap();
        assert!(ips.iter().any(IpAddr::is_loopback));
    }

    #[test]
    fn cache_passes_literals_through() {
        let cache = ResolvedAddresses::new();
        cache.set("b.example.com", vec!["10.0.0.2".into()]);
        cache.set("10.0.0.1", vec!["ignored".into()]);

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("10.0.0.1"), vec!["10.0.0.1"]);
        assert_eq!(cache.get("b.example.com"), vec!["10.0.0.2"]);
        assert!(cache.get("unknown.example.com").is_empty());

        let addresses = vec!["10.0.0.1".to_string(), "b.example.com".to_string()];
        assert_eq!(cache.resolve_all(&addresses), vec!["10.0.0.1", "10.0.0.2"]);
    }
}
