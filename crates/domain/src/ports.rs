//! Port traits implemented by infrastructure crates.
//!
//! The orchestrator only ever talks to its collaborators through these traits.
//! Each is a narrow capability: implementations must be safe to call
//! concurrently from many in-flight requests, since the orchestrator adds no
//! serialisation of its own.

use std::time::Duration;

use async_trait::async_trait;

use crate::{
    BackendError, CacheError, Generation, GenerationRequest, StoreError, User, UserId,
    UsageLogRecord,
};

/// A text-generation provider.
///
/// Implemented by `llm` for each supported API; tests supply their own.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Declared name used for attribution (e.g. `"OpenAI"`).
    fn name(&self) -> &str;

    /// Produces content for `request`.
    async fn generate(&self, request: &GenerationRequest) -> Result<Generation, BackendError>;
}

/// Key-value response cache over opaque strings.
#[async_trait]
pub trait ResponseCache: Send + Sync {
    /// Returns the cached value for `key`, or `None` on a miss.
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Stores `value` under `key` for `ttl`.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError>;
}

/// Append-only usage log plus the requester records it references.
#[async_trait]
pub trait UsageLogStore: Send + Sync {
    /// Appends one record. Ownership of the record moves to the store.
    async fn append(&self, record: UsageLogRecord) -> Result<(), StoreError>;

    /// Registers a new requester with display name `name`.
    async fn create_user(&self, name: &str) -> Result<User, StoreError>;

    /// Looks up a requester. Returns [`StoreError::NotFound`] if absent.
    async fn get_user(&self, id: &UserId) -> Result<User, StoreError>;
}
