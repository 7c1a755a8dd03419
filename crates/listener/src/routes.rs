//! Route table and handlers.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use domain::{GenerationRequest, UserId};
use orchestrator::{MetricsSnapshot, Orchestrator};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::debug;

use crate::dto::{GenerateBody, GenerateReply, HealthReply, RegisterBody, UserReply};
use crate::error::ApiError;

/// Name reported by `GET /health`.
pub const SERVICE_NAME: &str = "nexus";

/// Shared handler state.
#[derive(Debug, Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
}

impl AppState {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self { orchestrator }
    }
}

/// Builds the router with permissive CORS and request tracing.
///
/// Every route answers `OPTIONS` with `200`; any other method not listed for
/// a route gets `405`.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/generate", post(generate).options(preflight))
        .route("/users", post(register_user).options(preflight))
        .route("/health", get(health).options(preflight))
        .route("/metrics", get(metrics).options(preflight))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn preflight() -> StatusCode {
    StatusCode::OK
}

async fn generate(
    State(state): State<AppState>,
    body: Result<Json<GenerateBody>, JsonRejection>,
) -> Result<Json<GenerateReply>, ApiError> {
    let Json(body) = body?;
    let started = Instant::now();

    let mut request = GenerationRequest::new(body.prompt)?;
    if let Some(user_id) = body.user_id.and_then(UserId::new) {
        request = request.with_user(user_id);
    }
    if let Some(temperature) = body.temperature {
        request = request.with_temperature(temperature)?;
    }
    if let Some(max_tokens) = body.max_tokens.filter(|&n| n > 0) {
        request = request.with_max_tokens(max_tokens)?;
    }

    let provider = body.provider.as_deref().filter(|name| !name.is_empty());
    let response = state.orchestrator.process_request(request, provider).await?;

    let processing_time_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    debug!(provider = response.provenance.label(), processing_time_ms, "generate served");
    Ok(Json(GenerateReply::new(response, processing_time_ms)))
}

async fn register_user(
    State(state): State<AppState>,
    body: Result<Json<RegisterBody>, JsonRejection>,
) -> Result<(StatusCode, Json<UserReply>), ApiError> {
    let Json(body) = body?;
    let user = state.orchestrator.register_user(&body.name).await?;
    Ok((StatusCode::CREATED, Json(UserReply::from(user))))
}

async fn health() -> Json<HealthReply> {
    Json(HealthReply {
        status: "healthy",
        service: SERVICE_NAME,
    })
}

async fn metrics(State(state): State<AppState>) -> Json<MetricsSnapshot> {
    Json(state.orchestrator.metrics())
}
