//! Type URLs of the resource kinds exchanged and generated by federation.

use std::fmt;

/// Type URL wrapper for federation resource kinds.
///
/// Peers must agree on these strings byte-for-byte, so only the constants
/// below are considered known.
///
/// # Example
///
/// ```rust
/// use federation_core::TypeUrl;
///
/// let t = TypeUrl::new(TypeUrl::SERVICE_ENTRY);
/// assert_eq!(t.short_name(), "ServiceEntry");
/// assert!(t.is_known());
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeUrl(String);

impl TypeUrl {
    /// Services exported to peer meshes.
    pub const EXPORTED_SERVICE: &'static str =
        "federation.istio-ecosystem.io/v1alpha1/ExportedService";

    /// Istio Gateway.
    pub const GATEWAY: &'static str = "networking.istio.io/v1alpha3/Gateway";

    /// Istio ServiceEntry.
    pub const SERVICE_ENTRY: &'static str = "networking.istio.io/v1alpha3/ServiceEntry";

    /// Istio WorkloadEntry.
    pub const WORKLOAD_ENTRY: &'static str = "networking.istio.io/v1alpha3/WorkloadEntry";

    /// Istio EnvoyFilter.
    pub const ENVOY_FILTER: &'static str = "networking.istio.io/v1alpha3/EnvoyFilter";

    /// Istio DestinationRule.
    pub const DESTINATION_RULE: &'static str = "networking.istio.io/v1alpha3/DestinationRule";

    /// Istio VirtualService.
    pub const VIRTUAL_SERVICE: &'static str = "networking.istio.io/v1alpha3/VirtualService";

    /// Istio PeerAuthentication.
    pub const PEER_AUTHENTICATION: &'static str = "security.istio.io/v1/PeerAuthentication";

    /// OpenShift Route.
    pub const ROUTE: &'static str = "route.openshift.io/v1/Route";

    /// Every known type URL.
    pub const ALL: &'static [&'static str] = &[
        Self::EXPORTED_SERVICE,
        Self::GATEWAY,
        Self::SERVICE_ENTRY,
        Self::WORKLOAD_ENTRY,
        Self::ENVOY_FILTER,
        Self::DESTINATION_RULE,
        Self::VIRTUAL_SERVICE,
        Self::PEER_AUTHENTICATION,
        Self::ROUTE,
    ];

    /// Create a new type URL from a string.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    /// Get the type URL as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The kind, e.g. `WorkloadEntry` for `networking.istio.io/v1alpha3/WorkloadEntry`.
    #[must_use]
    pub fn short_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    /// The API group and version, e.g. `networking.istio.io/v1alpha3`.
    #[must_use]
    pub fn api_version(&self) -> &str {
        self.0.rsplit_once('/').map(|(head, _)| head).unwrap_or("")
    }

    /// Check whether this is one of the known constants.
    #[must_use]
    pub fn is_known(&self) -> bool {
        Self::ALL.contains(&self.0.as_str())
    }

    /// Consume and return the inner string.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for TypeUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for TypeUrl {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for TypeUrl {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<TypeUrl> for String {
    fn from(t: TypeUrl) -> Self {
        t.0
    }
}

impl AsRef<str> for TypeUrl {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for TypeUrl {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for TypeUrl {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_name() {
        assert_eq!(TypeUrl::new(TypeUrl::EXPORTED_SERVICE).short_name(), "ExportedService");
        assert_eq!(TypeUrl::new(TypeUrl::ROUTE).short_name(), "Route");
    }

    #[test]
    fn test_api_version() {
        assert_eq!(
            TypeUrl::new(TypeUrl::PEER_AUTHENTICATION).api_version(),
            "security.istio.io/v1"
        );
        assert_eq!(TypeUrl::new("Gateway").api_version(), "");
    }

    #[test]
    fn test_is_known() {
        for url in TypeUrl::ALL {
            assert!(TypeUrl::new(*url).is_known());
        }
        assert!(!TypeUrl::new("type.googleapis.com/envoy.config.cluster.v3.Cluster").is_known());
    }
}
