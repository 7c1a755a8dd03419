//! Immutable mapping from logical backend name to backend capability.
//!
//! A [`BackendRegistry`] is assembled once at process start through
//! [`BackendRegistryBuilder`] and then moved into the orchestrator. It exposes
//! no mutation, so concurrent readers need no synchronisation.

use std::collections::BTreeMap;
use std::sync::Arc;

use domain::{BackendName, GenerationBackend};
use thiserror::Error;

/// Fallback order used when the caller names no backend.
pub const DEFAULT_PRIORITY: [&str; 2] = ["openai", "gemini"];

/// Returns [`DEFAULT_PRIORITY`] as backend names.
pub fn default_priority() -> Vec<BackendName> {
    DEFAULT_PRIORITY
        .iter()
        .filter_map(|name| BackendName::new(*name))
        .collect()
}

/// Rejected registry entries.
#[derive(Debug, Error, PartialEq)]
pub enum RegistryError {
    /// The name is empty or not lower-case.
    #[error("invalid backend name '{0}': names must be non-empty and lower-case")]
    InvalidName(String),

    /// The name was registered twice.
    #[error("backend '{0}' registered twice")]
    Duplicate(BackendName),
}

/// Collects backends before the registry is frozen.
#[derive(Default)]
pub struct BackendRegistryBuilder {
    backends: BTreeMap<BackendName, Arc<dyn GenerationBackend>>,
}

impl BackendRegistryBuilder {
    /// Adds `backend` under the logical `name`.
    ///
    /// # Errors
    ///
    /// [`RegistryError::InvalidName`] for empty or non-lower-case names,
    /// [`RegistryError::Duplicate`] if `name` is already present.
    pub fn register(
        mut self,
        name: &str,
        backend: Arc<dyn GenerationBackend>,
    ) -> Result<Self, RegistryError> {
        let key =
            BackendName::new(name).ok_or_else(|| RegistryError::InvalidName(name.to_string()))?;
        if self.backends.contains_key(&key) {
            return Err(RegistryError::Duplicate(key));
        }
        self.backends.insert(key, backend);
        Ok(self)
    }

    /// Freezes the registry.
    pub fn build(self) -> BackendRegistry {
        BackendRegistry {
            backends: self.backends,
        }
    }
}

/// Read-only set of configured backends.
///
/// Backends without credentials are simply absent; there are no disabled
/// entries.
pub struct BackendRegistry {
    backends: BTreeMap<BackendName, Arc<dyn GenerationBackend>>,
}

impl BackendRegistry {
    /// Starts an empty builder.
    pub fn builder() -> BackendRegistryBuilder {
        BackendRegistryBuilder::default()
    }

    /// A registry with no backends.
    pub fn empty() -> Self {
        Self::builder().build()
    }

    /// Looks up a backend by logical name.
    pub fn resolve(&self, name: &str) -> Option<&Arc<dyn GenerationBackend>> {
        self.backends.get(name)
    }

    /// Picks the backend to use when the caller named none.
    ///
    /// The first entry of `priority` present in the registry wins. Backends
    /// missing from `priority` are never picked implicitly, so `None` means
    /// no listed backend is registered.
    pub fn select(
        &self,
        priority: &[BackendName],
    ) -> Option<(&BackendName, &Arc<dyn GenerationBackend>)> {
        priority
            .iter()
            .find_map(|name| self.backends.get_key_value(name.as_str()))
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &BackendName> {
        self.backends.keys()
    }

    /// Number of registered backends.
    pub fn len(&self) -> usize {
        self.backends.len()
    }

    /// `true` if no backend is configured.
    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}

impl std::fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("backends", &self.backends.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{BackendError, Generation, GenerationRequest};

    struct Named(&'static str);

    #[async_trait::async_trait]
    impl GenerationBackend for Named {
        fn name(&self) -> &str {
            self.0
        }

        async fn generate(&self, _: &GenerationRequest) -> Result<Generation, BackendError> {
            Err(BackendError::EmptyResponse)
        }
    }

    fn backend(name: &'static str) -> Arc<dyn GenerationBackend> {
        Arc::new(Named(name))
    }

    #[test]
    fn rejects_invalid_and_duplicate_names() {
        let err = BackendRegistry::builder()
            .register("OpenAI", backend("OpenAI"))
            .err();
        assert_eq!(err, Some(RegistryError::InvalidName("OpenAI".into())));

        let err = BackendRegistry::builder()
            .register("openai", backend("OpenAI"))
            .and_then(|b| b.register("openai", backend("OpenAI")))
            .err();
        assert!(matches!(err, Some(RegistryError::Duplicate(_))));
    }

    #[test]
    fn select_honours_priority_order_only() {
        let registry = BackendRegistry::builder()
            .register("gemini", backend("Gemini"))
            .and_then(|b| b.register("openai", backend("OpenAI")))
            .unwrap()
            .build();
        let (name, _) = registry.select(&default_priority()).unwrap();
        assert_eq!(name.as_str(), "openai");

        let registry = BackendRegistry::builder()
            .register("zeta", backend("Zeta"))
            .and_then(|b| b.register("alpha", backend("Alpha")))
            .unwrap()
            .build();
        assert!(registry.select(&default_priority()).is_none());

        let priority = vec![BackendName::new("zeta").unwrap()];
        let (name, _) = registry.select(&priority).unwrap();
        assert_eq!(name.as_str(), "zeta");

        assert!(BackendRegistry::empty().select(&default_priority()).is_none());
    }
}
