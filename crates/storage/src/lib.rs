//! Nexus persistence adapters.
//!
//! Implements the [`domain::UsageLogStore`] and [`domain::ResponseCache`]
//! ports: Postgres (via `sqlx`) for the usage log and requester records, Redis
//! (via `fred`) for cached responses, and in-memory variants of both for local
//! runs and tests.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** Connection pooling, schema migration, SQL and key
//! layout live here. The orchestrator never sees them; it only sees the
//! port traits and the collaborator errors they return.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`memory`] | [`MemoryUsageLogStore`], [`MemoryResponseCache`] |
//! | [`postgres`] | [`PostgresUsageLogStore`] and its builder |
//! | [`redis`] | [`RedisResponseCache`] |
//! | [`error`] | [`StorageError`] (connection/setup failures) |

pub mod error;
pub mod memory;
pub mod postgres;
pub mod redis;

pub use error::StorageError;
pub use memory::{MemoryResponseCache, MemoryUsageLogStore, DEFAULT_MAX_ENTRIES};
pub use postgres::{PostgresUsageLogStore, PostgresUsageLogStoreBuilder};
pub use redis::{RedisResponseCache, DEFAULT_NAMESPACE};
