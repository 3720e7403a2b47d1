//! Resource generators and the registry that dispatches to them.
//!
//! A [`Generator`] turns the current local state into the serialized
//! snapshot of one resource type. The [`GeneratorRegistry`] is built once at
//! startup and keyed by type URL, so new resource kinds plug in without
//! touching the discovery server.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use prost::Message;
use prost_types::Any;

use crate::{FederationError, FederationResult};

/// Produces the full snapshot of one resource type.
///
/// Generators are evaluated at call time and keep no state across calls
/// beyond the stores they were constructed with.
///
/// # Example
///
/// ```rust
/// use federation_core::{Generator, FederationResult, TypeUrl};
/// use prost_types::Any;
///
/// struct Empty;
///
/// impl Generator for Empty {
///     fn type_url(&self) -> &str {
///         TypeUrl::GATEWAY
///     }
///
///     fn generate(&self) -> FederationResult<Vec<Any>> {
///         Ok(vec![])
///     }
/// }
/// ```
pub trait Generator: Send + Sync {
    /// Type URL this generator serves.
    fn type_url(&self) -> &str;

    /// Build the current snapshot.
    fn generate(&self) -> FederationResult<Vec<Any>>;
}

/// Shared handle to a generator.
pub type BoxGenerator = Arc<dyn Generator>;

/// Registration table of generators keyed by type URL.
#[derive(Default, Clone)]
pub struct GeneratorRegistry {
    generators: HashMap<String, BoxGenerator>,
}

impl GeneratorRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a generator, replacing any previous one for the same type.
    ///
    /// Returns the replaced generator, if any.
    pub fn register(&mut self, generator: BoxGenerator) -> Option<BoxGenerator> {
        self.generators
            .insert(generator.type_url().to_string(), generator)
    }

    /// Builder-style [`register`](Self::register).
    #[must_use]
    pub fn with(mut self, generator: BoxGenerator) -> Self {
        self.register(generator);
        self
    }

    /// Look up the generator for a type URL.
    #[must_use]
    pub fn get(&self, type_url: &str) -> Option<&BoxGenerator> {
        self.generators.get(type_url)
    }

    /// Check if a type URL has a generator.
    #[must_use]
    pub fn contains(&self, type_url: &str) -> bool {
        self.generators.contains_key(type_url)
    }

    /// Run the generator for `type_url`.
    ///
    /// Returns `None` when no generator is registered for it.
    pub fn generate(&self, type_url: &str) -> Option<FederationResult<Vec<Any>>> {
        self.generators.get(type_url).map(|g| g.generate())
    }

    /// All registered type URLs, sorted.
    #[must_use]
    pub fn type_urls(&self) -> Vec<&str> {
        let mut urls: Vec<&str> = self.generators.keys().map(String::as_str).collect();
        urls.sort_unstable();
        urls
    }

    /// Number of registered generators.
    #[must_use]
    pub fn len(&self) -> usize {
        self.generators.len()
    }

    /// Check if the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.generators.is_empty()
    }
}

impl fmt::Debug for GeneratorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeneratorRegistry")
            .field("type_urls", &self.type_urls())
            .finish()
    }
}

/// Wrap a message in an `Any` envelope tagged with `type_url`.
pub fn encode_any<M: Message>(type_url: &str, message: &M) -> Any {
    Any {
        type_url: type_url.to_string(),
        value: message.encode_to_vec(),
    }
}

/// Decode the message carried by an `Any` envelope.
pub fn decode_any<M: Message + Default>(any: &Any) -> FederationResult<M> {
    M::decode(any.value.as_slice()).map_err(|e| FederationError::Decoding {
        type_url: any.type_url.clone(),
        message: e.to_string(),
    })
}
