//! Engine-level scenarios against mocked API server and provider.

use std::sync::Arc;
use std::time::Duration;

use assert_json_diff::assert_json_include;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use copilot_core::{Completion, CompletionSpec, CompletionStatus};
use copilot_kube::{CustomObjectsClient, KubeError};
use copilot_operator::{ReconcileEngine, ReconcileError, ReconcileOutcome};
use copilot_provider::CompletionClient;

const TIMEOUT: Duration = Duration::from_secs(5);

fn resource(name: &str, generation: i64, prompt: &str) -> Completion {
    let mut obj = Completion::new(name).with_spec(CompletionSpec {
        user_prompt: Some(prompt.into()),
        max_tokens: None,
    });
    obj.metadata.generation = Some(generation);
    obj.metadata.resource_version = Some("100".into());
    obj
}

fn engine_for(
    api: &MockServer,
    provider: &MockServer,
) -> ReconcileEngine<CustomObjectsClient, CompletionClient> {
    let kube = CustomObjectsClient::new(&api.uri(), None);
    let endpoint = format!("{}/v1/engines/davinci-codex/completions", provider.uri());
    let client = CompletionClient::new(&endpoint, "test-key", TIMEOUT).expect("valid endpoint");
    ReconcileEngine::new(Arc::new(kube), Arc::new(client))
}

#[tokio::test]
async fn fresh_resource_persists_generated_status() {
    let api = MockServer::start().await;
    let provider = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/engines/davinci-codex/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"text": "apiVersion: v1..."}]
        })))
        .expect(1)
        .mount(&provider)
        .await;

    Mock::given(method("PUT"))
        .and(path("/apis/copilot.poc.com/v1/completions/r1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(&api)
        .await;

    let engine = engine_for(&api, &provider);
    let outcome = engine
        .reconcile(resource("r1", 1, "create a pod"))
        .await
        .expect("reconcile should succeed");
    assert_eq!(
        outcome,
        ReconcileOutcome::Updated {
            observed_generation: 2
        }
    );

    // The persisted object carries the whole spec plus the new status.
    let requests = api.received_requests().await.expect("recording enabled");
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).expect("json body");
    assert_json_include!(
        actual: body,
        expected: json!({
            "apiVersion": "copilot.poc.com/v1",
            "kind": "Completion",
            "metadata": {"name": "r1", "generation": 1, "resourceVersion": "100"},
            "spec": {"userPrompt": "create a pod"},
            "status": {"completion": "apiVersion: v1...", "observedGeneration": 2}
        })
    );
}

#[tokio::test]
async fn converged_resource_makes_no_calls() {
    let api = MockServer::start().await;
    let provider = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&provider)
        .await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&api)
        .await;

    let mut obj = resource("r1", 3, "create a pod");
    obj.status = Some(CompletionStatus {
        completion: "old".into(),
        observed_generation: 3,
    });

    let engine = engine_for(&api, &provider);
    let outcome = engine.reconcile(obj).await.expect("no-op reconcile");
    assert_eq!(outcome, ReconcileOutcome::Converged);
}

#[tokio::test]
async fn validation_short_circuit_makes_no_calls() {
    let api = MockServer::start().await;
    let provider = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&provider)
        .await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&api)
        .await;

    let mut obj = resource("r1", 1, "create a pod");
    obj.spec = None;

    let engine = engine_for(&api, &provider);
    let err = engine.reconcile(obj).await.expect_err("must fail validation");
    assert!(matches!(err, ReconcileError::Validation(_)));
}

#[tokio::test]
async fn provider_error_prevents_persist() {
    let api = MockServer::start().await;
    let provider = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
        .expect(1)
        .mount(&provider)
        .await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&api)
        .await;

    let engine = engine_for(&api, &provider);
    let err = engine
        .reconcile(resource("r1", 1, "create a pod"))
        .await
        .expect_err("provider failure must surface");
    assert!(matches!(err, ReconcileError::Provider(_)));
    assert!(err.is_retryable());
    assert!(err.wants_artifact());
}

#[tokio::test]
async fn empty_choices_is_a_provider_error_without_persist() {
    let api = MockServer::start().await;
    let provider = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
        .expect(1)
        .mount(&provider)
        .await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&api)
        .await;

    let engine = engine_for(&api, &provider);
    let err = engine
        .reconcile(resource("r1", 1, "create a pod"))
        .await
        .expect_err("empty choices must surface");
    assert!(matches!(err, ReconcileError::Provider(_)));
}

#[tokio::test]
async fn stale_write_is_rejected_as_conflict() {
    let api = MockServer::start().await;
    let provider = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"text": "apiVersion: v1..."}]
        })))
        .mount(&provider)
        .await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(409))
        .expect(1)
        .mount(&api)
        .await;

    let engine = engine_for(&api, &provider);
    let err = engine
        .reconcile(resource("r1", 1, "create a pod"))
        .await
        .expect_err("conflict must surface");
    assert!(matches!(
        err,
        ReconcileError::Persist(KubeError::Conflict { .. })
    ));
    assert!(!err.is_retryable());
}
