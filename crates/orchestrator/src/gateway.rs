//! The request orchestrator.
//!
//! [`Orchestrator::process_request`] runs the selection policy: identity,
//! cache, backend selection, dispatch, then detached side effects. Each step
//! short-circuits; nothing is retried and no step falls back to another
//! backend.

use std::sync::Arc;
use std::time::{Duration, Instant};

use domain::{
    BackendName, GatewayError, GenerationBackend, GenerationRequest, GenerationResponse,
    Provenance, RecordId, ResponseCache, StoreError, Timestamp, UsageLogRecord, UsageLogStore,
    User, UserId,
};
use tracing::{debug, info, instrument, warn, Span};

use crate::cache_key::derive_cache_key;
use crate::detached::{BoxError, DetachedPoolConfig, DetachedTask, DetachedWorkPool, TaskKind};
use crate::registry::default_priority;
use crate::{BackendRegistry, GatewayMetrics, MetricsSnapshot};

/// Default lifetime of cached responses.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(3600);

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// How strictly the requester identity is enforced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum IdentityMode {
    /// Every request must name a requester known to the store.
    #[default]
    Required,
    /// Anonymous requests are accepted; a named requester must exist.
    VerifyIfPresent,
    /// No identity checks.
    Disabled,
}

/// Tunables of an [`Orchestrator`].
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorConfig {
    /// Identity enforcement.
    pub identity_mode: IdentityMode,
    /// TTL of cache writes.
    pub cache_ttl: Duration,
    /// Upper bound on a single backend call, if any.
    pub dispatch_timeout: Option<Duration>,
    /// Fallback order when the caller names no backend.
    pub priority: Vec<BackendName>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            identity_mode: IdentityMode::Required,
            cache_ttl: DEFAULT_CACHE_TTL,
            dispatch_timeout: None,
            priority: default_priority(),
        }
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Assembles an [`Orchestrator`] from its collaborators.
pub struct OrchestratorBuilder {
    registry: BackendRegistry,
    cache: Option<Arc<dyn ResponseCache>>,
    store: Option<Arc<dyn UsageLogStore>>,
    config: OrchestratorConfig,
    pool: Option<Arc<DetachedWorkPool>>,
}

impl OrchestratorBuilder {
    /// Attaches a response cache.
    pub fn cache(mut self, cache: Arc<dyn ResponseCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Attaches a usage-log store.
    pub fn usage_store(mut self, store: Arc<dyn UsageLogStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Replaces the default configuration.
    pub fn config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    /// Uses an existing detached pool instead of starting a default one.
    pub fn detached_pool(mut self, pool: Arc<DetachedWorkPool>) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Builds the orchestrator.
    ///
    /// Starts a pool with [`DetachedPoolConfig::default`] when none was given,
    /// which requires a running Tokio runtime.
    pub fn build(self) -> Orchestrator {
        let pool = self.pool.unwrap_or_else(|| {
            Arc::new(DetachedWorkPool::start(
                DetachedPoolConfig::default(),
                Arc::new(GatewayMetrics::new()),
            ))
        });
        let metrics = Arc::clone(pool.metrics());

        Orchestrator {
            registry: self.registry,
            cache: self.cache,
            store: self.store,
            config: self.config,
            pool,
            metrics,
        }
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Coordinates backends, cache and usage store for each request.
///
/// Holds no request-scoped mutable state; share it behind an [`Arc`].
pub struct Orchestrator {
    registry: BackendRegistry,
    cache: Option<Arc<dyn ResponseCache>>,
    store: Option<Arc<dyn UsageLogStore>>,
    config: OrchestratorConfig,
    pool: Arc<DetachedWorkPool>,
    metrics: Arc<GatewayMetrics>,
}

impl Orchestrator {
    /// Starts a builder around `registry`.
    pub fn builder(registry: BackendRegistry) -> OrchestratorBuilder {
        OrchestratorBuilder {
            registry,
            cache: None,
            store: None,
            config: OrchestratorConfig::default(),
            pool: None,
        }
    }

    /// Serves one generation request.
    ///
    /// `backend` names a registry entry explicitly; `None` (or an empty
    /// string) lets the priority list decide.
    ///
    /// # Errors
    ///
    /// - [`GatewayError::Identity`] / [`GatewayError::StorageUnavailable`] when
    ///   the requester cannot be verified under the configured [`IdentityMode`].
    /// - [`GatewayError::BackendNotConfigured`] for an unknown explicit name.
    /// - [`GatewayError::NoBackendsConfigured`] when no backend was named and
    ///   none of the priority list is registered.
    /// - [`GatewayError::BackendFailure`] / [`GatewayError::DispatchTimeout`]
    ///   when the chosen backend fails.
    #[instrument(
        skip_all,
        fields(
            requested_backend = backend.unwrap_or_default(),
            user_id = request.user_id().map(UserId::as_str),
            provenance = tracing::field::Empty,
            latency_ms = tracing::field::Empty,
        )
    )]
    pub async fn process_request(
        &self,
        request: GenerationRequest,
        backend: Option<&str>,
    ) -> Result<GenerationResponse, GatewayError> {
        self.metrics.record_request();
        let backend = backend.filter(|name| !name.is_empty());

        self.verify_identity(request.user_id()).await?;

        let cache_key = self
            .cache
            .as_ref()
            .map(|_| derive_cache_key(backend, &request));
        if let (Some(cache), Some(key)) = (&self.cache, &cache_key) {
            if let Some(content) = self.lookup_cache(cache.as_ref(), key).await {
                Span::current().record("provenance", Provenance::CACHE_LABEL);
                return Ok(GenerationResponse {
                    content,
                    usage: None,
                    provenance: Provenance::Cache,
                });
            }
        }

        let (registry_name, chosen): (&str, &Arc<dyn GenerationBackend>) = match backend {
            Some(name) => self
                .registry
                .resolve(name)
                .map(|chosen| (name, chosen))
                .ok_or_else(|| GatewayError::BackendNotConfigured {
                    backend: name.to_string(),
                })?,
            None => self
                .registry
                .select(&self.config.priority)
                .map(|(name, chosen)| (name.as_str(), chosen))
                .ok_or(GatewayError::NoBackendsConfigured)?,
        };
        let label = match chosen.name() {
            "" => registry_name.to_string(),
            declared => declared.to_string(),
        };

        let started = Instant::now();
        let outcome = match self.config.dispatch_timeout {
            Some(after) => match tokio::time::timeout(after, chosen.generate(&request)).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    self.metrics.record_backend_failure();
                    warn!(backend = %label, ?after, "backend call timed out");
                    return Err(GatewayError::DispatchTimeout {
                        backend: label,
                        after,
                    });
                }
            },
            None => chosen.generate(&request).await,
        };
        let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        let generation = match outcome {
            Ok(generation) => generation,
            Err(source) => {
                self.metrics.record_backend_failure();
                warn!(backend = %label, error = %source, "backend call failed");
                return Err(GatewayError::BackendFailure {
                    backend: label,
                    source,
                });
            }
        };

        let span = Span::current();
        span.record("provenance", label.as_str());
        span.record("latency_ms", latency_ms);
        info!(backend = %label, latency_ms, "generation completed");

        if let (Some(cache), Some(key)) = (&self.cache, cache_key) {
            self.submit_cache_write(Arc::clone(cache), key, generation.content.clone());
        }
        if let Some(store) = &self.store {
            let record = UsageLogRecord {
                id: RecordId::new_random(),
                user_id: request.user_id().cloned(),
                prompt: request.prompt().to_string(),
                backend: label.clone(),
                response: generation.content.clone(),
                latency_ms,
                usage: generation.usage.unwrap_or_default(),
                created_at: Timestamp::now(),
            };
            self.submit_usage_log(Arc::clone(store), record);
        }

        Ok(GenerationResponse {
            content: generation.content,
            usage: generation.usage,
            provenance: Provenance::Backend(label),
        })
    }

    /// Registers a new requester.
    ///
    /// # Errors
    ///
    /// [`GatewayError::StorageUnavailable`] without a store,
    /// [`GatewayError::InvalidArgument`] for a blank name,
    /// [`GatewayError::Store`] if the store fails.
    #[instrument(skip(self))]
    pub async fn register_user(&self, name: &str) -> Result<User, GatewayError> {
        let store = self.user_store()?;
        if name.trim().is_empty() {
            return Err(GatewayError::invalid_argument("name is required"));
        }
        let user = store.create_user(name).await?;
        info!(user_id = %user.id, "requester registered");
        Ok(user)
    }

    /// Looks up a registered requester.
    ///
    /// # Errors
    ///
    /// [`GatewayError::StorageUnavailable`] without a store,
    /// [`GatewayError::Store`] (including not-found) otherwise.
    pub async fn lookup_user(&self, id: &UserId) -> Result<User, GatewayError> {
        Ok(self.user_store()?.get_user(id).await?)
    }

    /// The backends this orchestrator dispatches to.
    pub fn registry(&self) -> &BackendRegistry {
        &self.registry
    }

    /// The active configuration.
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Current counter values.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Resolves once all detached side effects submitted so far have run.
    pub async fn wait_idle(&self) {
        self.pool.wait_idle().await;
    }

    /// Shuts the detached pool down; see [`DetachedWorkPool::shutdown`].
    pub async fn shutdown(&self, grace: Duration) -> bool {
        self.pool.shutdown(grace).await
    }

    fn user_store(&self) -> Result<&Arc<dyn UsageLogStore>, GatewayError> {
        self.store
            .as_ref()
            .ok_or(GatewayError::StorageUnavailable {
                what: "user storage",
            })
    }

    async fn verify_identity(&self, user_id: Option<&UserId>) -> Result<(), GatewayError> {
        let user_id = match (self.config.identity_mode, user_id) {
            (IdentityMode::Disabled, _) | (IdentityMode::VerifyIfPresent, None) => return Ok(()),
            (IdentityMode::Required, None) => {
                return Err(GatewayError::Identity {
                    user_id: None,
                    reason: "user_id is required".to_string(),
                })
            }
            (_, Some(user_id)) => user_id,
        };

        let store = self.user_store()?;
        match store.get_user(user_id).await {
            Ok(_) => Ok(()),
            Err(StoreError::NotFound(_)) => Err(GatewayError::Identity {
                user_id: Some(user_id.clone()),
                reason: "user not found".to_string(),
            }),
            Err(error) => Err(GatewayError::Identity {
                user_id: Some(user_id.clone()),
                reason: error.to_string(),
            }),
        }
    }

    /// Returns cached content, treating empty values and errors as misses.
    async fn lookup_cache(&self, cache: &dyn ResponseCache, key: &str) -> Option<String> {
        match cache.get(key).await {
            Ok(Some(content)) if !content.is_empty() => {
                self.metrics.record_cache_hit();
                debug!("cache hit");
                Some(content)
            }
            Ok(_) => {
                self.metrics.record_cache_miss();
                None
            }
            Err(error) => {
                self.metrics.record_cache_error();
                warn!(%error, "cache lookup failed, treating as miss");
                None
            }
        }
    }

    fn submit_cache_write(&self, cache: Arc<dyn ResponseCache>, key: String, content: String) {
        let ttl = self.config.cache_ttl;
        self.pool.submit(DetachedTask::new(TaskKind::CacheWrite, async move {
            cache
                .set(&key, &content, ttl)
                .await
                .map_err(BoxError::from)
        }));
    }

    fn submit_usage_log(&self, store: Arc<dyn UsageLogStore>, record: UsageLogRecord) {
        self.pool.submit(DetachedTask::new(TaskKind::UsageLog, async move {
            store.append(record).await.map_err(BoxError::from)
        }));
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("registry", &self.registry)
            .field("cache", &self.cache.is_some())
            .field("store", &self.store.is_some())
            .field("config", &self.config)
            .field("pool", &self.pool)
            .finish()
    }
}
