//! Protocol detection from Kubernetes port names.

/// Prefix rules, checked in order; the first match wins.
const PROTOCOLS: &[(&str, &str)] = &[
    ("https", "HTTPS"),
    ("http", "HTTP"),
    ("http2", "HTTP2"),
    ("grpc", "GRPC"),
    ("tls", "TLS"),
    ("mongo", "MONGO"),
];

/// Protocol used when no rule matches.
pub const DEFAULT_PROTOCOL: &str = "TCP";

/// Mesh protocol of a service port, derived from its name.
///
/// A port named `<prefix>` or `<prefix>-<suffix>` gets the protocol of the
/// first matching prefix; anything else is TCP.
///
/// ```rust
/// use federation_mesh::detect_protocol;
///
/// assert_eq!(detect_protocol("http-web"), "HTTP");
/// assert_eq!(detect_protocol("grpc"), "GRPC");
/// assert_eq!(detect_protocol("httpx"), "TCP");
/// ```
pub fn detect_protocol(port_name: &str) -> &'static str {
    PROTOCOLS
        .iter()
        .find(|(prefix, _)| {
            port_name
                .strip_prefix(prefix)
                .is_some_and(|rest| rest.is_empty() || rest.starts_with('-'))
        })
        .map_or(DEFAULT_PROTOCOL, |(_, protocol)| protocol)
}
