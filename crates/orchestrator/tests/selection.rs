mod common;

use std::time::Duration;

use common::*;
use domain::{BackendError, BackendName, GatewayError, Provenance};
use orchestrator::{IdentityMode, OrchestratorConfig};

#[tokio::test]
async fn unknown_explicit_backend_is_rejected_without_dispatch() {
    let openai = RecordingBackend::replying("OpenAI", "hello", None);
    let gateway = orchestrator(
        registry(&[("openai", openai.clone())]),
        None,
        None,
        config(IdentityMode::Disabled),
    );

    let err = gateway
        .process_request(request("hi", None), Some("anthropic"))
        .await
        .unwrap_err();

    assert!(matches!(err, GatewayError::BackendNotConfigured { ref backend } if backend == "anthropic"));
    assert_eq!(openai.calls(), 0);
}

#[tokio::test]
async fn first_priority_backend_present_wins() {
    let openai = RecordingBackend::replying("OpenAI", "from openai", None);
    let gemini = RecordingBackend::replying("Gemini", "from gemini", None);
    let gateway = orchestrator(
        registry(&[("gemini", gemini.clone()), ("openai", openai.clone())]),
        None,
        None,
        config(IdentityMode::Disabled),
    );

    let response = gateway
        .process_request(request("hi", None), None)
        .await
        .unwrap();

    assert_eq!(response.provenance, Provenance::Backend("OpenAI".into()));
    assert_eq!(openai.calls(), 1);
    assert_eq!(gemini.calls(), 0);
}

#[tokio::test]
async fn falls_through_to_next_priority_entry() {
    let gemini = RecordingBackend::replying("Gemini", "from gemini", None);
    let gateway = orchestrator(
        registry(&[("gemini", gemini.clone())]),
        None,
        None,
        config(IdentityMode::Disabled),
    );

    let response = gateway
        .process_request(request("hi", None), None)
        .await
        .unwrap();

    assert_eq!(response.content, "from gemini");
    assert_eq!(response.provenance.label(), "Gemini");
}

#[tokio::test]
async fn empty_backend_name_means_not_given() {
    let openai = RecordingBackend::replying("OpenAI", "hello", None);
    let gateway = orchestrator(
        registry(&[("openai", openai.clone())]),
        None,
        None,
        config(IdentityMode::Disabled),
    );

    let response = gateway
        .process_request(request("hi", None), Some(""))
        .await
        .unwrap();

    assert_eq!(response.provenance.label(), "OpenAI");
}

#[tokio::test]
async fn empty_registry_reports_no_backends() {
    let gateway = orchestrator(
        registry(&[]),
        None,
        None,
        config(IdentityMode::Disabled),
    );

    let err = gateway
        .process_request(request("hi", None), None)
        .await
        .unwrap_err();

    assert!(matches!(err, GatewayError::NoBackendsConfigured));
}

#[tokio::test]
async fn backends_outside_the_priority_list_are_never_chosen() {
    let openai = RecordingBackend::replying("OpenAI", "from openai", None);
    let gateway = orchestrator(
        registry(&[("openai", openai.clone())]),
        None,
        None,
        OrchestratorConfig {
            identity_mode: IdentityMode::Disabled,
            priority: vec![BackendName::new("gemini").unwrap()],
            ..OrchestratorConfig::default()
        },
    );

    let err = gateway
        .process_request(request("hi", None), None)
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::NoBackendsConfigured));
    assert_eq!(openai.calls(), 0);

    let response = gateway
        .process_request(request("hi", None), Some("openai"))
        .await
        .unwrap();
    assert_eq!(response.provenance.label(), "OpenAI");
}

#[tokio::test]
async fn backend_failure_propagates_without_fallback() {
    let openai = RecordingBackend::failing(
        "OpenAI",
        BackendError::Status {
            status: 500,
            body: "boom".into(),
        },
    );
    let gemini = RecordingBackend::replying("Gemini", "unused", None);
    let gateway = orchestrator(
        registry(&[("openai", openai.clone()), ("gemini", gemini.clone())]),
        None,
        None,
        config(IdentityMode::Disabled),
    );

    let err = gateway
        .process_request(request("hi", None), None)
        .await
        .unwrap_err();

    match err {
        GatewayError::BackendFailure { backend, source } => {
            assert_eq!(backend, "OpenAI");
            assert_eq!(source, BackendError::Status { status: 500, body: "boom".into() });
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(openai.calls(), 1);
    assert_eq!(gemini.calls(), 0);
    assert_eq!(gateway.metrics().backend_failures, 1);
}

#[tokio::test]
async fn slow_backend_hits_dispatch_timeout() {
    let slow = RecordingBackend::slow("Slow", Duration::from_secs(5));
    let gateway = orchestrator(
        registry(&[("slow", slow.clone())]),
        None,
        None,
        OrchestratorConfig {
            identity_mode: IdentityMode::Disabled,
            dispatch_timeout: Some(Duration::from_millis(20)),
            ..OrchestratorConfig::default()
        },
    );

    let err = gateway
        .process_request(request("hi", None), Some("slow"))
        .await
        .unwrap_err();

    assert!(matches!(err, GatewayError::DispatchTimeout { ref backend, .. } if backend == "Slow"));
    assert_eq!(err.code(), "dispatch_timeout");
}
