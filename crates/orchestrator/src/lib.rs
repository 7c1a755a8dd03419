//! Nexus request orchestration.
//!
//! This crate owns the core of the gateway: the immutable backend registry,
//! the selection policy, cache-key derivation, the detached work pool that
//! runs fire-and-forget side effects, and the counters describing what was
//! absorbed along the way.
//!
//! ## Architectural Layer
//!
//! **Orchestration layer.** Everything here talks to the outside world through
//! the port traits defined in [`domain`]. Concrete backends, stores and caches
//! are injected by the composition root (`cli`) and mocked in tests.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`registry`] | [`BackendRegistry`], its builder and the default priority |
//! | [`cache_key`] | [`derive_cache_key`] |
//! | [`detached`] | [`DetachedWorkPool`] and its task/overflow types |
//! | [`metrics`] | [`GatewayMetrics`] and [`MetricsSnapshot`] |
//! | [`gateway`] | [`Orchestrator`], [`OrchestratorConfig`], [`IdentityMode`] |

pub mod cache_key;
pub mod detached;
pub mod gateway;
pub mod metrics;
pub mod registry;

pub use cache_key::derive_cache_key;
pub use detached::{
    BoxError, DetachedPoolConfig, DetachedTask, DetachedWorkPool, OverflowPolicy, SubmitOutcome,
    TaskKind,
};
pub use gateway::{
    IdentityMode, Orchestrator, OrchestratorBuilder, OrchestratorConfig, DEFAULT_CACHE_TTL,
};
pub use metrics::{GatewayMetrics, MetricsSnapshot};
pub use registry::{
    default_priority, BackendRegistry, BackendRegistryBuilder, RegistryError, DEFAULT_PRIORITY,
};
