//! Postgres-backed usage log and requester store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{StoreError, Timestamp, UsageLogRecord, UsageLogStore, User, UserId};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use tracing::{debug, info};
use uuid::Uuid;

use crate::StorageError;

/// Schema statements, applied in order on every start. All are idempotent.
pub const MIGRATION_STATEMENTS_SQL: [&str; 3] = [
    r#"CREATE EXTENSION IF NOT EXISTS "pgcrypto""#,
    r#"CREATE TABLE IF NOT EXISTS users (
        id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
        name TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )"#,
    r#"CREATE TABLE IF NOT EXISTS request_logs (
        id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
        user_id UUID NULL REFERENCES users(id),
        prompt TEXT NOT NULL,
        provider TEXT NOT NULL,
        response TEXT NOT NULL,
        duration_ms BIGINT NOT NULL,
        prompt_tokens BIGINT NOT NULL,
        completion_tokens BIGINT NOT NULL,
        total_tokens BIGINT NOT NULL,
        cost_usd NUMERIC(18,6) NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )"#,
];

const INSERT_REQUEST_LOG_SQL: &str = r#"
    INSERT INTO request_logs
        (id, user_id, prompt, provider, response, duration_ms,
         prompt_tokens, completion_tokens, total_tokens, cost_usd, created_at)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10::float8, $11)
"#;

const INSERT_USER_SQL: &str = "INSERT INTO users (name) VALUES ($1) RETURNING id, name, created_at";

const SELECT_USER_SQL: &str = "SELECT id, name, created_at FROM users WHERE id = $1";

/// Applies [`MIGRATION_STATEMENTS_SQL`].
pub async fn run_migrations(pool: &PgPool) -> Result<(), StorageError> {
    for statement in MIGRATION_STATEMENTS_SQL {
        sqlx::query(statement)
            .execute(pool)
            .await
            .map_err(StorageError::Migration)?;
    }
    Ok(())
}

fn store_error(error: sqlx::Error) -> StoreError {
    StoreError::Backend(error.to_string())
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn user_from_row(row: &PgRow) -> Result<User, StoreError> {
    let id: Uuid = row.try_get("id").map_err(store_error)?;
    let name: String = row.try_get("name").map_err(store_error)?;
    let created_at: DateTime<Utc> = row.try_get("created_at").map_err(store_error)?;
    Ok(User {
        id: UserId::from_uuid(id),
        name,
        created_at: Timestamp::from_utc(created_at),
    })
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Configures the connection pool of a [`PostgresUsageLogStore`].
#[derive(Debug, Clone)]
pub struct PostgresUsageLogStoreBuilder {
    database_url: String,
    max_connections: u32,
    min_connections: u32,
}

impl PostgresUsageLogStoreBuilder {
    pub fn max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections;
        self
    }

    pub fn min_connections(mut self, min_connections: u32) -> Self {
        self.min_connections = min_connections;
        self
    }

    /// Connects and applies the schema.
    ///
    /// # Errors
    ///
    /// [`StorageError::Connection`] if the pool cannot connect,
    /// [`StorageError::Migration`] if a schema statement fails.
    pub async fn build(self) -> Result<PostgresUsageLogStore, StorageError> {
        let pool = PgPoolOptions::new()
            .max_connections(self.max_connections)
            .min_connections(self.min_connections)
            .connect(&self.database_url)
            .await
            .map_err(StorageError::Connection)?;

        run_migrations(&pool).await?;
        info!(max_connections = self.max_connections, "postgres usage store ready");

        Ok(PostgresUsageLogStore { pool })
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// [`UsageLogStore`] over a pooled Postgres connection.
#[derive(Debug, Clone)]
pub struct PostgresUsageLogStore {
    pool: PgPool,
}

impl PostgresUsageLogStore {
    pub fn builder(database_url: impl Into<String>) -> PostgresUsageLogStoreBuilder {
        PostgresUsageLogStoreBuilder {
            database_url: database_url.into(),
            max_connections: 5,
            min_connections: 0,
        }
    }

    /// Wraps an existing pool. The schema is assumed to be migrated.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl UsageLogStore for PostgresUsageLogStore {
    async fn append(&self, record: UsageLogRecord) -> Result<(), StoreError> {
        // Only store-issued ids can satisfy the foreign key.
        let user_id = record.user_id.as_ref().and_then(UserId::to_uuid);
        if record.user_id.is_some() && user_id.is_none() {
            debug!(record_id = %record.id, "requester id is not a UUID, logging without it");
        }

        sqlx::query(INSERT_REQUEST_LOG_SQL)
            .bind(record.id.as_uuid())
            .bind(user_id)
            .bind(&record.prompt)
            .bind(&record.backend)
            .bind(&record.response)
            .bind(to_i64(record.latency_ms))
            .bind(to_i64(record.usage.prompt_tokens.as_u64()))
            .bind(to_i64(record.usage.completion_tokens.as_u64()))
            .bind(to_i64(record.usage.total_tokens.as_u64()))
            .bind(record.usage.cost.as_f64())
            .bind(record.created_at.as_datetime())
            .execute(&self.pool)
            .await
            .map_err(store_error)?;
        Ok(())
    }

    async fn create_user(&self, name: &str) -> Result<User, StoreError> {
        let row = sqlx::query(INSERT_USER_SQL)
            .bind(name)
            .fetch_one(&self.pool)
            .await
            .map_err(store_error)?;
        user_from_row(&row)
    }

    async fn get_user(&self, id: &UserId) -> Result<User, StoreError> {
        let Some(uuid) = id.to_uuid() else {
            return Err(StoreError::NotFound(id.clone()));
        };

        let row = sqlx::query(SELECT_USER_SQL)
            .bind(uuid)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        user_from_row(&row)
    }
}
