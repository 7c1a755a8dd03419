//! Redis-backed response cache.

use std::time::Duration;

use async_trait::async_trait;
use domain::{CacheError, ResponseCache};
use fred::interfaces::KeysInterface;
use fred::prelude::*;
use fred::types::Expiration;
use tracing::info;

use crate::StorageError;

/// Key prefix applied to every cache entry.
pub const DEFAULT_NAMESPACE: &str = "nexus:cache:";

fn map_redis_error(error: RedisError) -> CacheError {
    CacheError(error.to_string())
}

/// [`ResponseCache`] over a Redis connection, using `SET ... EX`.
#[derive(Clone)]
pub struct RedisResponseCache {
    client: RedisClient,
    namespace: String,
}

impl std::fmt::Debug for RedisResponseCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisResponseCache")
            .field("namespace", &self.namespace)
            .finish()
    }
}

impl RedisResponseCache {
    /// Connects to `url` (e.g. `redis://localhost:6379`).
    ///
    /// # Errors
    ///
    /// [`StorageError::Redis`] if the URL is invalid or the connection fails.
    pub async fn connect(url: &str) -> Result<Self, StorageError> {
        let config = RedisConfig::from_url(url).map_err(StorageError::Redis)?;
        let client = RedisClient::new(config, None, None, None);
        client.init().await.map_err(StorageError::Redis)?;
        info!("redis response cache ready");

        Ok(Self {
            client,
            namespace: DEFAULT_NAMESPACE.to_string(),
        })
    }

    /// Replaces the key prefix.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    fn namespaced(&self, key: &str) -> String {
        namespaced_key(&self.namespace, key)
    }
}

fn namespaced_key(namespace: &str, key: &str) -> String {
    format!("{namespace}{key}")
}

/// Redis rejects `EX 0`; sub-second TTLs round up to one second.
fn expiry_seconds(ttl: Duration) -> i64 {
    i64::try_from(ttl.as_secs().max(1)).unwrap_or(i64::MAX)
}

#[async_trait]
impl ResponseCache for RedisResponseCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        self.client
            .get::<Option<String>, _>(self.namespaced(key))
            .await
            .map_err(map_redis_error)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        self.client
            .set::<(), _, _>(
                self.namespaced(key),
                value,
                Some(Expiration::EX(expiry_seconds(ttl))),
                None,
                false,
            )
            .await
            .map_err(map_redis_error)
    }
}
