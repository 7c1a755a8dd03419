//! In-memory store and cache.
//!
//! Both are process-local and lose their contents on restart. They back the
//! `memory` store/cache settings of the CLI and double as test fixtures.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use domain::{
    CacheError, ResponseCache, StoreError, Timestamp, UsageLogRecord, UsageLogStore, User, UserId,
};
use tracing::trace;
use uuid::Uuid;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// Usage log
// ---------------------------------------------------------------------------

/// [`UsageLogStore`] holding users and records in memory.
#[derive(Debug, Default)]
pub struct MemoryUsageLogStore {
    users: Mutex<HashMap<UserId, User>>,
    records: Mutex<Vec<UsageLogRecord>>,
}

impl MemoryUsageLogStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records appended so far, oldest first.
    pub fn records(&self) -> Vec<UsageLogRecord> {
        lock(&self.records).clone()
    }

    /// Number of registered users.
    pub fn user_count(&self) -> usize {
        lock(&self.users).len()
    }
}

#[async_trait]
impl UsageLogStore for MemoryUsageLogStore {
    async fn append(&self, record: UsageLogRecord) -> Result<(), StoreError> {
        lock(&self.records).push(record);
        Ok(())
    }

    async fn create_user(&self, name: &str) -> Result<User, StoreError> {
        let user = User {
            id: UserId::from_uuid(Uuid::new_v4()),
            name: name.to_string(),
            created_at: Timestamp::now(),
        };
        lock(&self.users).insert(user.id.clone(), user.clone());
        Ok(user)
    }

    async fn get_user(&self, id: &UserId) -> Result<User, StoreError> {
        lock(&self.users)
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }
}

// ---------------------------------------------------------------------------
// Cache
// ---------------------------------------------------------------------------

/// Entry cap of [`MemoryResponseCache::new`].
pub const DEFAULT_MAX_ENTRIES: usize = 10_000;

#[derive(Debug)]
struct Entry {
    value: String,
    inserted_at: Instant,
    expires_at: Instant,
}

impl Entry {
    fn is_fresh(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// [`ResponseCache`] over a concurrent map holding at most `max_entries`.
///
/// Expired entries are dropped when read. When a new key arrives at a full
/// cache, expired entries are purged first and then the oldest insertions
/// are evicted until there is room.
#[derive(Debug)]
pub struct MemoryResponseCache {
    entries: DashMap<String, Entry>,
    max_entries: usize,
}

impl Default for MemoryResponseCache {
    fn default() -> Self {
        Self::with_max_entries(DEFAULT_MAX_ENTRIES)
    }
}

impl MemoryResponseCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// A cache holding at most `max_entries` (clamped to at least 1).
    pub fn with_max_entries(max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            max_entries: max_entries.max(1),
        }
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// Number of stored entries, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn make_room(&self, now: Instant) {
        if self.entries.len() < self.max_entries {
            return;
        }
        self.entries.retain(|_, entry| entry.is_fresh(now));

        while self.entries.len() >= self.max_entries {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|item| item.value().inserted_at)
                .map(|item| item.key().clone());
            match oldest {
                Some(key) => {
                    self.entries.remove(&key);
                    trace!(%key, "evicted oldest cache entry");
                }
                None => break,
            }
        }
    }
}

#[async_trait]
impl ResponseCache for MemoryResponseCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let now = Instant::now();
        if let Some(entry) = self.entries.get(key) {
            if entry.is_fresh(now) {
                return Ok(Some(entry.value.clone()));
            }
        }
        self.entries.remove_if(key, |_, entry| !entry.is_fresh(now));
        Ok(None)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let now = Instant::now();
        let expires_at = now
            .checked_add(ttl)
            .unwrap_or(now + Duration::from_secs(u64::from(u32::MAX)));
        if !self.entries.contains_key(key) {
            self.make_room(now);
        }
        self.entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                inserted_at: now,
                expires_at,
            },
        );
        Ok(())
    }
}
