use domain::{BackendError, GenerationBackend, GenerationRequest};
use httpmock::prelude::*;
use llm::{GeminiBackend, GeminiSettings, Pricing};
use serde_json::json;

const PATH: &str = "/v1beta/models/gemini-2.0-flash-exp:generateContent";

fn backend(server: &MockServer) -> GeminiBackend {
    GeminiBackend::new(
        GeminiSettings::new("test-key")
            .with_base_url(server.url(""))
            .with_pricing(Pricing::new(1.0, 2.0)),
    )
    .unwrap()
}

#[tokio::test]
async fn generate_sends_prompt_and_reads_first_candidate() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST)
            .path(PATH)
            .query_param("key", "test-key")
            .json_body(json!({
                "contents": [{"parts": [{"text": "hi"}]}]
            }));
        then.status(200).json_body(json!({
            "candidates": [
                {"content": {"parts": [{"text": "hel"}, {"text": "lo"}]}, "finishReason": "STOP"}
            ]
        }));
    });

    let generation = backend(&server)
        .generate(&GenerationRequest::new("hi").unwrap())
        .await
        .unwrap();

    mock.assert();
    assert_eq!(generation.content, "hello");
    assert!(generation.usage.is_none());
}

#[tokio::test]
async fn generation_config_and_usage_metadata_are_mapped() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST).path(PATH).json_body(json!({
            "contents": [{"parts": [{"text": "hi"}]}],
            "generationConfig": {"temperature": 1.5, "maxOutputTokens": 32}
        }));
        then.status(200).json_body(json!({
            "candidates": [{"content": {"parts": [{"text": "hello"}]}}],
            "usageMetadata": {
                "promptTokenCount": 1000,
                "candidatesTokenCount": 500,
                "totalTokenCount": 1500
            }
        }));
    });

    let request = GenerationRequest::new("hi")
        .unwrap()
        .with_temperature(1.5)
        .unwrap()
        .with_max_tokens(32)
        .unwrap();
    let generation = backend(&server).generate(&request).await.unwrap();

    mock.assert();
    let usage = generation.usage.unwrap();
    assert_eq!(usage.total_tokens.as_u64(), 1500);
    assert!((usage.cost.as_f64() - 2.0).abs() < 1e-9);
}

#[tokio::test]
async fn no_candidates_is_an_empty_response() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path(PATH);
        then.status(200).json_body(json!({"candidates": []}));
    });

    let err = backend(&server)
        .generate(&GenerationRequest::new("hi").unwrap())
        .await
        .unwrap_err();

    assert_eq!(err, BackendError::EmptyResponse);
}

#[tokio::test]
async fn error_status_is_reported() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path(PATH);
        then.status(403).body("{\"error\":{\"message\":\"bad key\"}}");
    });

    let err = backend(&server)
        .generate(&GenerationRequest::new("hi").unwrap())
        .await
        .unwrap_err();

    assert!(matches!(err, BackendError::Status { status: 403, .. }));
}

#[tokio::test]
async fn model_prefix_is_stripped_from_the_path() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST).path("/v1beta/models/gemini-1.5-pro:generateContent");
        then.status(200).json_body(json!({
            "candidates": [{"content": {"parts": [{"text": "ok"}]}}]
        }));
    });

    let backend = GeminiBackend::new(
        GeminiSettings::new("test-key")
            .with_model("models/gemini-1.5-pro")
            .with_base_url(server.url("")),
    )
    .unwrap();
    backend
        .generate(&GenerationRequest::new("hi").unwrap())
        .await
        .unwrap();

    mock.assert();
}
