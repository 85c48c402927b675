//! Integration tests for the delivery engine.
//!
//! These tests verify the batch-then-per-record delivery policy and the
//! all-or-nothing success contract against a mock collector.

use std::sync::Arc;

use chrono::Utc;
use codepulse_agent::credentials::{CredentialStore, CREDENTIAL_KEY};
use codepulse_agent::delivery::DeliveryEngine;
use codepulse_agent::host::{MemoryNotifier, MemorySecretStore, Notifier};
use codepulse_agent::notifier::ErrorNotifier;
use codepulse_agent::types::{generate_record_id, ActivityRecord};
use wiremock::matchers::{body_json_string, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// =============================================================================
// Test Helpers
// =============================================================================

/// Creates a test record for the given file.
fn record(file: &str) -> ActivityRecord {
    let end = Utc::now();
    ActivityRecord {
        id: generate_record_id(),
        project_name: "test-project".to_string(),
        language: "rust".to_string(),
        file: file.to_string(),
        time_spent_secs: 42,
        start_time: end - chrono::Duration::seconds(42),
        end_time: end,
        session_id: "ses_testsession".to_string(),
        file_extension: Some("rs".to_string()),
    }
}

/// Creates an engine pointed at the mock server with a stored credential.
fn engine_with_credential(server_uri: &str) -> DeliveryEngine {
    let credentials = Arc::new(CredentialStore::new(Arc::new(
        MemorySecretStore::with_secret(CREDENTIAL_KEY, "test-token"),
    )));
    DeliveryEngine::new(
        server_uri.to_string(),
        format!("{server_uri}/auth"),
        credentials,
    )
}

/// Creates an engine with no stored credential.
fn engine_without_credential(server_uri: &str) -> DeliveryEngine {
    let credentials = Arc::new(CredentialStore::new(Arc::new(MemorySecretStore::new())));
    DeliveryEngine::new(
        server_uri.to_string(),
        format!("{server_uri}/auth"),
        credentials,
    )
}

fn notifier() -> (Arc<MemoryNotifier>, ErrorNotifier) {
    let sink = Arc::new(MemoryNotifier::new());
    let notifier = ErrorNotifier::new(Arc::clone(&sink) as Arc<dyn Notifier>);
    (sink, notifier)
}

// =============================================================================
// Batch Delivery
// =============================================================================

#[tokio::test]
async fn batch_success_delivers_in_one_request() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/activities/batch"))
        .and(header("Authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let engine = engine_with_credential(&server.uri());
    let (sink, mut notifier) = notifier();

    let delivered = engine
        .deliver(&[record("a.rs"), record("b.rs")], &mut notifier)
        .await;

    assert!(delivered);
    assert!(sink.warnings().is_empty());
}

#[tokio::test]
async fn missing_batch_endpoint_falls_back_to_per_record() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/activities/batch"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/activities"))
        .respond_with(ResponseTemplate::new(201))
        .expect(3)
        .mount(&server)
        .await;

    let engine = engine_with_credential(&server.uri());
    let (sink, mut notifier) = notifier();

    let delivered = engine
        .deliver(
            &[record("a.rs"), record("b.rs"), record("c.rs")],
            &mut notifier,
        )
        .await;

    assert!(delivered);
    assert!(sink.warnings().is_empty());
}

#[tokio::test]
async fn batch_server_error_with_successful_fallback_reports_success() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/activities/batch"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/activities"))
        .respond_with(ResponseTemplate::new(200))
        .expect(2)
        .mount(&server)
        .await;

    let engine = engine_with_credential(&server.uri());
    let (sink, mut notifier) = notifier();

    // The fallback outcome governs: every record landed individually, so
    // the batch failure is invisible to the caller.
    let delivered = engine
        .deliver(&[record("a.rs"), record("b.rs")], &mut notifier)
        .await;

    assert!(delivered);
    assert!(sink.warnings().is_empty());
}

// =============================================================================
// All-or-Nothing Contract
// =============================================================================

#[tokio::test]
async fn partial_per_record_failure_reports_failure() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/activities/batch"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    // One of the three per-record requests fails.
    Mock::given(method("POST"))
        .and(path("/activities"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/activities"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let engine = engine_with_credential(&server.uri());
    let (sink, mut notifier) = notifier();

    let delivered = engine
        .deliver(
            &[record("a.rs"), record("b.rs"), record("c.rs")],
            &mut notifier,
        )
        .await;

    assert!(!delivered);
    assert_eq!(sink.warnings().len(), 1);
}

#[tokio::test]
async fn total_failure_warns_once() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let engine = engine_with_credential(&server.uri());
    let (sink, mut notifier) = notifier();

    assert!(!engine.deliver(&[record("a.rs")], &mut notifier).await);
    // A second failing cycle inside the cooldown stays quiet.
    assert!(!engine.deliver(&[record("b.rs")], &mut notifier).await);

    assert_eq!(sink.warnings().len(), 1);
}

// =============================================================================
// Credential Handling
// =============================================================================

#[tokio::test]
async fn missing_credential_skips_network_entirely() {
    let server = MockServer::start().await;

    let engine = engine_without_credential(&server.uri());
    let (sink, mut notifier) = notifier();

    let delivered = engine.deliver(&[record("a.rs")], &mut notifier).await;

    assert!(!delivered);
    assert!(server.received_requests().await.unwrap().is_empty());
    assert_eq!(sink.warnings().len(), 1);
    assert!(sink.warnings()[0].contains("Not logged in"));
}

#[tokio::test]
async fn empty_batch_is_trivially_delivered() {
    let server = MockServer::start().await;

    let engine = engine_with_credential(&server.uri());
    let (sink, mut notifier) = notifier();

    assert!(engine.deliver(&[], &mut notifier).await);
    assert!(server.received_requests().await.unwrap().is_empty());
    assert!(sink.warnings().is_empty());
}

// =============================================================================
// Validation and Project Registration
// =============================================================================

#[tokio::test]
async fn validate_accepts_valid_token() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/auth/validate"))
        .and(header("Authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let engine = engine_with_credential(&server.uri());
    assert!(engine.validate("test-token").await.unwrap());
}

#[tokio::test]
async fn validate_rejects_expired_token() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/auth/validate"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let engine = engine_with_credential(&server.uri());
    assert!(!engine.validate("test-token").await.unwrap());
}

#[tokio::test]
async fn register_project_sends_name_and_ignores_conflict() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/projects"))
        .and(body_json_string(r#"{"name":"test-project"}"#))
        .respond_with(ResponseTemplate::new(409))
        .expect(1)
        .mount(&server)
        .await;

    let engine = engine_with_credential(&server.uri());
    engine.register_project("test-project").await;
}
