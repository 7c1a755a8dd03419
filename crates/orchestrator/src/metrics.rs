//! Counters describing what the orchestrator absorbed or shed.
//!
//! Cache and detached-write failures never reach callers. These counters are
//! how operators tell "never cached" apart from "cache is down", and notice a
//! usage log that silently stopped landing.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Live counters shared by the orchestrator and its detached pool.
#[derive(Debug, Default)]
pub struct GatewayMetrics {
    requests: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    cache_errors: AtomicU64,
    backend_failures: AtomicU64,
    cache_write_failures: AtomicU64,
    usage_log_failures: AtomicU64,
    detached_completed: AtomicU64,
    detached_dropped: AtomicU64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

impl GatewayMetrics {
    /// Creates a zeroed set of counters.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_request(&self) {
        bump(&self.requests);
    }

    pub(crate) fn record_cache_hit(&self) {
        bump(&self.cache_hits);
    }

    pub(crate) fn record_cache_miss(&self) {
        bump(&self.cache_misses);
    }

    pub(crate) fn record_cache_error(&self) {
        bump(&self.cache_errors);
    }

    pub(crate) fn record_backend_failure(&self) {
        bump(&self.backend_failures);
    }

    pub(crate) fn record_cache_write_failure(&self) {
        bump(&self.cache_write_failures);
    }

    pub(crate) fn record_usage_log_failure(&self) {
        bump(&self.usage_log_failures);
    }

    pub(crate) fn record_detached_completed(&self) {
        bump(&self.detached_completed);
    }

    pub(crate) fn record_detached_dropped(&self) {
        bump(&self.detached_dropped);
    }

    /// Point-in-time copy of every counter.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let read = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        MetricsSnapshot {
            requests: read(&self.requests),
            cache_hits: read(&self.cache_hits),
            cache_misses: read(&self.cache_misses),
            cache_errors: read(&self.cache_errors),
            backend_failures: read(&self.backend_failures),
            cache_write_failures: read(&self.cache_write_failures),
            usage_log_failures: read(&self.usage_log_failures),
            detached_completed: read(&self.detached_completed),
            detached_dropped: read(&self.detached_dropped),
        }
    }
}

/// Serializable copy of [`GatewayMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    /// Requests that entered `process_request`.
    pub requests: u64,
    /// Requests answered from cache.
    pub cache_hits: u64,
    /// Lookups that found nothing (errors excluded).
    pub cache_misses: u64,
    /// Lookups that failed and were treated as misses.
    pub cache_errors: u64,
    /// Backend calls that failed or timed out.
    pub backend_failures: u64,
    /// Detached cache writes that failed.
    pub cache_write_failures: u64,
    /// Detached usage-log appends that failed.
    pub usage_log_failures: u64,
    /// Detached tasks that ran to completion (successfully or not).
    pub detached_completed: u64,
    /// Detached tasks discarded by the overflow policy or after shutdown.
    pub detached_dropped: u64,
}
