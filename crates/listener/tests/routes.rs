use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use domain::{
    BackendError, BackendName, Generation, GenerationBackend, GenerationRequest, TokenCost, TokenCount,
    UsageInfo,
};
use http_body_util::BodyExt;
use listener::{router, AppState};
use orchestrator::{BackendRegistry, IdentityMode, Orchestrator, OrchestratorConfig};
use serde_json::{json, Value};
use storage::{MemoryResponseCache, MemoryUsageLogStore};
use tower::ServiceExt;

struct Scripted(Result<Generation, BackendError>);

#[async_trait]
impl GenerationBackend for Scripted {
    fn name(&self) -> &str {
        "M"
    }

    async fn generate(&self, _request: &GenerationRequest) -> Result<Generation, BackendError> {
        self.0.clone()
    }
}

fn usage() -> UsageInfo {
    UsageInfo {
        prompt_tokens: TokenCount::new(5),
        completion_tokens: TokenCount::new(10),
        total_tokens: TokenCount::new(15),
        cost: TokenCost::new(0.001).unwrap(),
    }
}

fn app_with(backend: Scripted, identity_mode: IdentityMode) -> (Router, Arc<Orchestrator>) {
    let registry = BackendRegistry::builder()
        .register("m", Arc::new(backend))
        .unwrap()
        .build();
    let orchestrator = Arc::new(
        Orchestrator::builder(registry)
            .cache(Arc::new(MemoryResponseCache::new()))
            .usage_store(Arc::new(MemoryUsageLogStore::new()))
            .config(OrchestratorConfig {
                identity_mode,
                priority: vec![BackendName::new("m").unwrap()],
                ..OrchestratorConfig::default()
            })
            .build(),
    );
    (router(AppState::new(orchestrator.clone())), orchestrator)
}

fn app() -> (Router, Arc<Orchestrator>) {
    app_with(
        Scripted(Ok(Generation {
            content: "hi".into(),
            usage: Some(usage()),
        })),
        IdentityMode::Disabled,
    )
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

#[tokio::test]
async fn generate_returns_content_then_cache_hit_without_usage() {
    let (app, orchestrator) = app();

    let (status, body) = send(&app, post_json("/generate", json!({"prompt": "P"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["content"], "hi");
    assert_eq!(body["provider_used"], "M");
    assert_eq!(body["usage"]["total_tokens"], 15);
    assert_eq!(body["usage"]["cost_usd"], 0.001);

    orchestrator.wait_idle().await;

    let (status, body) = send(&app, post_json("/generate", json!({"prompt": "P"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["provider_used"], "cache");
    assert!(body.get("usage").is_none());
}

#[tokio::test]
async fn get_on_generate_is_method_not_allowed() {
    let (app, _) = app();
    let request = Request::builder()
        .method(Method::GET)
        .uri("/generate")
        .body(Body::empty())
        .unwrap();

    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn options_is_answered_on_every_route() {
    let (app, _) = app();
    for uri in ["/generate", "/users", "/health", "/metrics"] {
        let request = Request::builder()
            .method(Method::OPTIONS)
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK, "OPTIONS {uri}");
    }
}

#[tokio::test]
async fn cors_headers_are_permissive() {
    let (app, _) = app();
    let request = Request::builder()
        .method(Method::GET)
        .uri("/health")
        .header("origin", "http://localhost:5173")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(
        response.headers()["access-control-allow-origin"],
        "*"
    );
}

#[tokio::test]
async fn malformed_json_is_bad_request() {
    let (app, _) = app();
    let request = Request::builder()
        .method(Method::POST)
        .uri("/generate")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();

    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "malformed_body");
}

#[tokio::test]
async fn out_of_range_temperature_is_invalid_argument() {
    let (app, _) = app();

    let (status, body) = send(
        &app,
        post_json("/generate", json!({"prompt": "P", "temperature": 3.0})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_argument");
}

#[tokio::test]
async fn unknown_provider_is_bad_request() {
    let (app, _) = app();

    let (status, body) = send(
        &app,
        post_json("/generate", json!({"prompt": "P", "provider": "nope"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "backend_not_configured");
}

#[tokio::test]
async fn backend_failure_is_bad_gateway() {
    let (app, _) = app_with(
        Scripted(Err(BackendError::EmptyResponse)),
        IdentityMode::Disabled,
    );

    let (status, body) = send(&app, post_json("/generate", json!({"prompt": "P"}))).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"], "backend_failure");
}

#[tokio::test]
async fn registered_user_can_generate_when_identity_is_required() {
    let (app, _) = app_with(
        Scripted(Ok(Generation {
            content: "hi".into(),
            usage: None,
        })),
        IdentityMode::Required,
    );

    let (status, _) = send(&app, post_json("/generate", json!({"prompt": "P"}))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, user) = send(&app, post_json("/users", json!({"name": "alice"}))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(user["name"], "alice");
    let id = user["id"].as_str().unwrap().to_string();

    let (status, body) = send(
        &app,
        post_json("/generate", json!({"prompt": "P", "user_id": id, "max_tokens": 0})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["content"], "hi");
}

#[tokio::test]
async fn health_and_metrics_report_state() {
    let (app, _) = app();
    let get = |uri: &str| {
        Request::builder()
            .method(Method::GET)
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    };

    let (status, body) = send(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "healthy", "service": "nexus"}));

    send(&app, post_json("/generate", json!({"prompt": "P"}))).await;
    let (status, body) = send(&app, get("/metrics")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["requests"], 1);
}
