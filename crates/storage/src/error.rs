//! Setup errors.
//!
//! Per-operation failures are reported through the domain's
//! [`domain::StoreError`] and [`domain::CacheError`]; this type only covers
//! connecting and migrating.

use thiserror::Error;

/// Failure to bring a storage adapter up.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The Postgres pool could not connect.
    #[error("failed to connect to postgres: {0}")]
    Connection(#[source] sqlx::Error),

    /// A schema statement failed.
    #[error("failed to migrate postgres schema: {0}")]
    Migration(#[source] sqlx::Error),

    /// The Redis client could not be configured or connected.
    #[error("failed to connect to redis: {0}")]
    Redis(#[source] fred::error::RedisError),
}
