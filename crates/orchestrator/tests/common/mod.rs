//! In-memory collaborators that record how the orchestrator used them.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use domain::{
    BackendError, BackendName, CacheError, Generation, GenerationBackend, GenerationRequest, StoreError,
    Timestamp, TokenCost, TokenCount, UsageInfo, UsageLogRecord, UsageLogStore, User, UserId,
    ResponseCache,
};
use orchestrator::{
    default_priority, BackendRegistry, DetachedPoolConfig, DetachedWorkPool, GatewayMetrics, IdentityMode,
    Orchestrator, OrchestratorConfig,
};

// ---------------------------------------------------------------------------
// Backend
// ---------------------------------------------------------------------------

pub struct RecordingBackend {
    name: String,
    result: Result<Generation, BackendError>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl RecordingBackend {
    pub fn replying(name: &str, content: &str, usage: Option<UsageInfo>) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            result: Ok(Generation {
                content: content.to_string(),
                usage,
            }),
            delay: None,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn failing(name: &str, error: BackendError) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            result: Err(error),
            delay: None,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn slow(name: &str, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            result: Ok(Generation {
                content: "late".to_string(),
                usage: None,
            }),
            delay: Some(delay),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GenerationBackend for RecordingBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, _request: &GenerationRequest) -> Result<Generation, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.result.clone()
    }
}

// ---------------------------------------------------------------------------
// Cache
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct RecordingCache {
    entries: Mutex<HashMap<String, String>>,
    fail_reads: bool,
    gets: AtomicUsize,
    sets: AtomicUsize,
}

impl RecordingCache {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn broken() -> Arc<Self> {
        Arc::new(Self {
            fail_reads: true,
            ..Self::default()
        })
    }

    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn sets(&self) -> usize {
        self.sets.load(Ordering::SeqCst)
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<_> = self.entries.lock().unwrap().keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl ResponseCache for RecordingCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads {
            return Err(CacheError("connection refused".into()));
        }
        Ok(self.entries.lock().unwrap().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str, _ttl: Duration) -> Result<(), CacheError> {
        self.sets.fetch_add(1, Ordering::SeqCst);
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct RecordingStore {
    users: Mutex<HashMap<UserId, User>>,
    records: Mutex<Vec<UsageLogRecord>>,
    lookups: AtomicUsize,
}

impl RecordingStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Inserts a requester with a fixed id.
    pub fn with_user(self: Arc<Self>, id: &str) -> Arc<Self> {
        let id = UserId::new(id).unwrap();
        self.users.lock().unwrap().insert(
            id.clone(),
            User {
                id,
                name: "fixture".into(),
                created_at: Timestamp::now(),
            },
        );
        self
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    pub fn records(&self) -> Vec<UsageLogRecord> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl UsageLogStore for RecordingStore {
    async fn append(&self, record: UsageLogRecord) -> Result<(), StoreError> {
        self.records.lock().unwrap().push(record);
        Ok(())
    }

    async fn create_user(&self, name: &str) -> Result<User, StoreError> {
        let user = User {
            id: UserId::new(format!("user-{}", self.users.lock().unwrap().len() + 1)).unwrap(),
            name: name.to_string(),
            created_at: Timestamp::now(),
        };
        self.users
            .lock()
            .unwrap()
            .insert(user.id.clone(), user.clone());
        Ok(user)
    }

    async fn get_user(&self, id: &UserId) -> Result<User, StoreError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.users
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Usage reported by the "M" backend in the reference scenario.
pub fn sample_usage() -> UsageInfo {
    UsageInfo {
        prompt_tokens: TokenCount::new(5),
        completion_tokens: TokenCount::new(10),
        total_tokens: TokenCount::new(15),
        cost: TokenCost::new(0.001).unwrap(),
    }
}

pub fn registry(entries: &[(&str, Arc<RecordingBackend>)]) -> BackendRegistry {
    entries
        .iter()
        .try_fold(BackendRegistry::builder(), |builder, (name, backend)| {
            builder.register(name, backend.clone() as Arc<dyn GenerationBackend>)
        })
        .unwrap()
        .build()
}

/// Priority list used by [`config`]: the fixture backend `m` first, then
/// the production defaults.
pub fn test_priority() -> Vec<BackendName> {
    let mut priority = vec![BackendName::new("m").unwrap()];
    priority.extend(default_priority());
    priority
}

pub fn config(identity_mode: IdentityMode) -> OrchestratorConfig {
    OrchestratorConfig {
        identity_mode,
        priority: test_priority(),
        ..OrchestratorConfig::default()
    }
}

pub fn small_pool() -> Arc<DetachedWorkPool> {
    Arc::new(DetachedWorkPool::start(
        DetachedPoolConfig {
            workers: 2,
            capacity: 16,
            ..DetachedPoolConfig::default()
        },
        Arc::new(GatewayMetrics::new()),
    ))
}

pub fn orchestrator(
    registry: BackendRegistry,
    cache: Option<Arc<RecordingCache>>,
    store: Option<Arc<RecordingStore>>,
    config: OrchestratorConfig,
) -> Orchestrator {
    let mut builder = Orchestrator::builder(registry)
        .config(config)
        .detached_pool(small_pool());
    if let Some(cache) = cache {
        builder = builder.cache(cache);
    }
    if let Some(store) = store {
        builder = builder.usage_store(store);
    }
    builder.build()
}

pub fn request(prompt: &str, user: Option<&str>) -> GenerationRequest {
    let request = GenerationRequest::new(prompt).unwrap();
    match user {
        Some(user) => request.with_user(UserId::new(user).unwrap()),
        None => request,
    }
}
