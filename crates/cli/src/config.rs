//! Process configuration.
//!
//! Everything is read from environment variables (optionally seeded from a
//! `.env` file by the caller). Parsing is a pure function over a lookup
//! closure, so tests never touch the process environment.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use domain::BackendName;
use llm::{GeminiSettings, OpenAiSettings, Pricing};
use orchestrator::{
    default_priority, DetachedPoolConfig, IdentityMode, OrchestratorConfig, OverflowPolicy,
    DEFAULT_CACHE_TTL,
};
use thiserror::Error;

const DEFAULT_SERVER_ADDR: &str = "0.0.0.0:8080";

/// Invalid or inconsistent configuration.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    /// A variable is set to something that cannot be parsed.
    #[error("{key}={value:?} is invalid: expected {expected}")]
    Invalid {
        key: &'static str,
        value: String,
        expected: &'static str,
    },

    /// A selected feature needs a variable that is not set.
    #[error("{key} must be set when {because}")]
    Missing {
        key: &'static str,
        because: &'static str,
    },
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Which usage-log store to wire in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreSettings {
    Postgres { url: String },
    Memory,
    None,
}

/// Which response cache to wire in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheSettings {
    Redis { url: String },
    Memory { max_entries: usize },
    None,
}

/// Fully parsed process configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct NexusConfig {
    pub server_addr: SocketAddr,
    pub log_format: LogFormat,
    /// OTLP collector endpoint; tracing export is off when `None`.
    pub otlp_endpoint: Option<String>,
    /// Present only when `OPENAI_API_KEY` is set.
    pub openai: Option<OpenAiSettings>,
    /// Present only when `GEMINI_API_KEY` is set.
    pub gemini: Option<GeminiSettings>,
    pub store: StoreSettings,
    pub cache: CacheSettings,
    pub orchestrator: OrchestratorConfig,
    pub detached: DetachedPoolConfig,
}

impl NexusConfig {
    /// Reads the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env { lookup };

        let server_addr = match (env.get("SERVER_ADDR"), env.get("SERVER_PORT")) {
            (Some(addr), _) => parse_value("SERVER_ADDR", &addr, "a socket address")?,
            (None, Some(port)) => {
                let port: u16 = parse_value("SERVER_PORT", &port, "a port number")?;
                SocketAddr::from(([0, 0, 0, 0], port))
            }
            (None, None) => DEFAULT_SERVER_ADDR
                .parse()
                .map_err(|_| invalid("SERVER_ADDR", DEFAULT_SERVER_ADDR, "a socket address"))?,
        };

        let log_format = match env.get("LOG_FORMAT").as_deref() {
            None | Some("pretty") => LogFormat::Pretty,
            Some("json") => LogFormat::Json,
            Some(other) => return Err(invalid("LOG_FORMAT", other, "`pretty` or `json`")),
        };

        let backend_timeout = env
            .positive("BACKEND_TIMEOUT_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(llm::DEFAULT_TIMEOUT);

        let openai = match env.get("OPENAI_API_KEY") {
            Some(key) => {
                let mut settings = OpenAiSettings::new(key)
                    .with_pricing(env.pricing("OPENAI_INPUT_COST_PER_1K", "OPENAI_OUTPUT_COST_PER_1K")?)
                    .with_timeout(backend_timeout);
                if let Some(model) = env.get("OPENAI_MODEL") {
                    settings = settings.with_model(model);
                }
                if let Some(base_url) = env.get("OPENAI_BASE_URL") {
                    settings = settings.with_base_url(base_url);
                }
                Some(settings)
            }
            None => None,
        };

        let gemini = match env.get("GEMINI_API_KEY") {
            Some(key) => {
                let mut settings = GeminiSettings::new(key)
                    .with_pricing(env.pricing("GEMINI_INPUT_COST_PER_1K", "GEMINI_OUTPUT_COST_PER_1K")?)
                    .with_timeout(backend_timeout);
                if let Some(model) = env.get("GEMINI_MODEL") {
                    settings = settings.with_model(model);
                }
                if let Some(base_url) = env.get("GEMINI_BASE_URL") {
                    settings = settings.with_base_url(base_url);
                }
                Some(settings)
            }
            None => None,
        };

        let priority = match env.get("BACKEND_PRIORITY") {
            Some(list) => list
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(|name| {
                    BackendName::new(name).ok_or_else(|| {
                        invalid("BACKEND_PRIORITY", &list, "comma-separated lower-case backend names")
                    })
                })
                .collect::<Result<Vec<_>, _>>()?,
            None => default_priority(),
        };

        let store = match (env.get("STORE_BACKEND").as_deref(), env.database_url()) {
            (Some("postgres"), Some(url)) | (None, Some(url)) => StoreSettings::Postgres { url },
            (Some("postgres"), None) => {
                return Err(ConfigError::Missing {
                    key: "DATABASE_URL",
                    because: "STORE_BACKEND=postgres",
                })
            }
            (Some("memory"), _) => StoreSettings::Memory,
            (Some("none"), _) | (None, None) => StoreSettings::None,
            (Some(other), _) => {
                return Err(invalid("STORE_BACKEND", other, "`postgres`, `memory` or `none`"))
            }
        };

        let cache = match (env.get("CACHE_BACKEND").as_deref(), env.redis_url()) {
            (Some("redis"), Some(url)) | (None, Some(url)) => CacheSettings::Redis { url },
            (Some("redis"), None) => {
                return Err(ConfigError::Missing {
                    key: "REDIS_URL",
                    because: "CACHE_BACKEND=redis",
                })
            }
            (Some("memory"), _) => CacheSettings::Memory {
                max_entries: env
                    .positive("CACHE_MAX_ENTRIES")?
                    .unwrap_or(storage::DEFAULT_MAX_ENTRIES),
            },
            (Some("none"), _) | (None, None) => CacheSettings::None,
            (Some(other), _) => {
                return Err(invalid("CACHE_BACKEND", other, "`redis`, `memory` or `none`"))
            }
        };

        let identity_mode = match env.get("IDENTITY_MODE").as_deref() {
            None | Some("required") => IdentityMode::Required,
            Some("verify_if_present") => IdentityMode::VerifyIfPresent,
            Some("disabled") => IdentityMode::Disabled,
            Some(other) => {
                return Err(invalid(
                    "IDENTITY_MODE",
                    other,
                    "`required`, `verify_if_present` or `disabled`",
                ))
            }
        };

        let orchestrator = OrchestratorConfig {
            identity_mode,
            cache_ttl: env
                .positive("CACHE_TTL_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_CACHE_TTL),
            dispatch_timeout: env.positive("DISPATCH_TIMEOUT_SECS")?.map(Duration::from_secs),
            priority,
        };

        let pool_defaults = DetachedPoolConfig::default();
        let detached = DetachedPoolConfig {
            workers: env.positive("DETACHED_WORKERS")?.unwrap_or(pool_defaults.workers),
            capacity: env
                .positive("DETACHED_QUEUE_CAPACITY")?
                .unwrap_or(pool_defaults.capacity),
            overflow: match env.get("DETACHED_OVERFLOW").as_deref() {
                None | Some("drop_oldest") => OverflowPolicy::DropOldest,
                Some("drop_newest") => OverflowPolicy::DropNewest,
                Some(other) => {
                    return Err(invalid(
                        "DETACHED_OVERFLOW",
                        other,
                        "`drop_oldest` or `drop_newest`",
                    ))
                }
            },
        };

        Ok(Self {
            server_addr,
            log_format,
            otlp_endpoint: env.get("OTEL_EXPORTER_OTLP_ENDPOINT"),
            openai,
            gemini,
            store,
            cache,
            orchestrator,
            detached,
        })
    }
}

// ---------------------------------------------------------------------------
// Lookup helpers
// ---------------------------------------------------------------------------

fn invalid(key: &'static str, value: &str, expected: &'static str) -> ConfigError {
    ConfigError::Invalid {
        key,
        value: value.to_string(),
        expected,
    }
}

fn parse_value<T: FromStr>(key: &'static str, value: &str, expected: &'static str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| invalid(key, value, expected))
}

struct Env<F> {
    lookup: F,
}

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Trimmed value of `key`; blank values count as unset.
    fn get(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    /// A strictly positive integer.
    fn positive<T>(&self, key: &'static str) -> Result<Option<T>, ConfigError>
    where
        T: FromStr + PartialOrd + Default,
    {
        match self.get(key) {
            None => Ok(None),
            Some(value) => {
                let parsed: T = parse_value(key, &value, "a positive integer")?;
                if parsed > T::default() {
                    Ok(Some(parsed))
                } else {
                    Err(invalid(key, &value, "a positive integer"))
                }
            }
        }
    }

    /// A finite, non-negative price; defaults to zero.
    fn price(&self, key: &'static str) -> Result<f64, ConfigError> {
        match self.get(key) {
            None => Ok(0.0),
            Some(value) => match value.parse::<f64>() {
                Ok(price) if price.is_finite() && price >= 0.0 => Ok(price),
                _ => Err(invalid(key, &value, "a non-negative number")),
            },
        }
    }

    fn pricing(&self, input_key: &'static str, output_key: &'static str) -> Result<Pricing, ConfigError> {
        Ok(Pricing::new(self.price(input_key)?, self.price(output_key)?))
    }

    /// `DATABASE_URL`, or a URL assembled from the `DB_*` parts.
    fn database_url(&self) -> Option<String> {
        if let Some(url) = self.get("DATABASE_URL") {
            return Some(url);
        }
        let host = self.get("DB_HOST")?;
        let port = self.get("DB_PORT").unwrap_or_else(|| "5432".to_string());
        let user = self.get("DB_USER").unwrap_or_else(|| "postgres".to_string());
        let name = self.get("DB_NAME").unwrap_or_else(|| "postgres".to_string());
        let credentials = match self.get("DB_PASSWORD") {
            Some(password) => format!("{user}:{password}"),
            None => user,
        };
        Some(format!("postgres://{credentials}@{host}:{port}/{name}"))
    }

    /// `REDIS_URL`, or a URL assembled from `REDIS_ADDR`/`REDIS_PASSWORD`.
    fn redis_url(&self) -> Option<String> {
        if let Some(url) = self.get("REDIS_URL") {
            return Some(url);
        }
        let addr = self.get("REDIS_ADDR")?;
        Some(match self.get("REDIS_PASSWORD") {
            Some(password) => format!("redis://:{password}@{addr}"),
            None => format!("redis://{addr}"),
        })
    }
}
