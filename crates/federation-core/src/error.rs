//! Error types for federation operations.
//!
//! [`FederationError`] covers every failure mode of the discovery protocol,
//! the stores and the generators, and converts to a gRPC status at the
//! server boundary.

/// Error type for federation discovery and propagation.
///
/// Most variants are recoverable by design: transient I/O tears down one
/// subscriber or one peer connection, data-quality errors drop one object,
/// and generator failures degrade one type URL to an empty snapshot.
///
/// # Example
///
/// ```rust
/// use federation_core::FederationError;
///
/// fn require_namespace(namespace: &str) -> Result<(), FederationError> {
///     if namespace.is_empty() {
///         return Err(FederationError::InvalidImport {
///             reason: "namespace cannot be empty".to_string(),
///         });
///     }
///     Ok(())
/// }
/// ```
#[derive(Debug, thiserror::Error)]
pub enum FederationError {
    /// Type URL is not one of the known resource kinds.
    #[error("invalid type URL: {type_url} - {reason}")]
    InvalidTypeUrl {
        /// The offending type URL.
        type_url: String,
        /// Reason why it was rejected.
        reason: String,
    },

    /// A generator failed to produce its snapshot.
    #[error("failed to generate {type_url}: {message}")]
    Generation {
        /// Type URL of the failing generator.
        type_url: String,
        /// Error message.
        message: String,
        /// Optional underlying error.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Protobuf encoding failed.
    #[error("encoding error for {type_url}: {message}")]
    Encoding {
        /// The type URL being encoded.
        type_url: String,
        /// Error message.
        message: String,
    },

    /// Protobuf decoding failed.
    #[error("decoding error for {type_url}: {message}")]
    Decoding {
        /// The type URL being decoded.
        type_url: String,
        /// Error message.
        message: String,
    },

    /// An imported object failed validation and was dropped.
    #[error("invalid imported object: {reason}")]
    InvalidImport {
        /// Why the object was rejected.
        reason: String,
    },

    /// gRPC transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Optional underlying error.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Discovery stream closed.
    #[error("stream closed: {reason}")]
    StreamClosed {
        /// Reason for stream closure.
        reason: String,
    },

    /// Address lookup failed.
    #[error("failed to resolve '{address}'")]
    Resolution {
        /// Address that failed to resolve.
        address: String,
        /// Underlying lookup error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Listing local services failed.
    #[error("service lister error: {message}")]
    Lister {
        /// Error message.
        message: String,
    },

    /// Applying desired objects to the cluster failed.
    #[error("reconcile of {type_url} failed: {message}")]
    Reconcile {
        /// Type URL being reconciled.
        type_url: String,
        /// Error message.
        message: String,
    },

    /// The push channel has no consumer left.
    #[error("push channel closed")]
    PushChannelClosed,

    /// The controller is shutting down.
    #[error("controller is shutting down")]
    Shutdown,

    /// Unexpected internal error.
    #[error("internal error: {message}")]
    Internal {
        /// Error message.
        message: String,
        /// Optional underlying error.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration error.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl FederationError {
    /// Create an internal error from any error type.
    pub fn internal<E>(message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Internal {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a transport error from any error type.
    pub fn transport<E>(message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Transport {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a resolution error for an address.
    pub fn resolution<E>(address: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Resolution {
            address: address.into(),
            source: Box::new(source),
        }
    }

    /// Create a generation error without an underlying source.
    pub fn generation(type_url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Generation {
            type_url: type_url.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Whether the error only affects a single object or connection.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Transport { .. }
                | Self::StreamClosed { .. }
                | Self::Resolution { .. }
                | Self::InvalidImport { .. }
        )
    }
}

/// Convert to tonic::Status for gRPC responses.
impl From<FederationError> for tonic::Status {
    fn from(err: FederationError) -> Self {
        match &err {
            FederationError::InvalidTypeUrl { .. }
            | FederationError::InvalidImport { .. }
            | FederationError::Decoding { .. } => tonic::Status::invalid_argument(err.to_string()),
            FederationError::Transport { .. }
            | FederationError::StreamClosed { .. }
            | FederationError::Shutdown
            | FederationError::PushChannelClosed => tonic::Status::unavailable(err.to_string()),
            FederationError::Configuration(_) => {
                tonic::Status::failed_precondition(err.to_string())
            }
            FederationError::Generation { .. }
            | FederationError::Encoding { .. }
            | FederationError::Resolution { .. }
            | FederationError::Lister { .. }
            | FederationError::Reconcile { .. }
            | FederationError::Internal { .. } => tonic::Status::internal(err.to_string()),
        }
    }
}
