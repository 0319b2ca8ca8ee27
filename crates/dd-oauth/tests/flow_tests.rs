//! End-to-end flow tests against fake provider endpoints

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use dd_oauth::{
    CallbackFlowEngine, DeviceFlowEngine, FlowSnapshot, FlowStatus, FlowStore, ProviderAdapter,
    ProviderRegistry,
};
use dd_types::AppError;

const DEVICE_PATH: &str = "/login/device/code";
const TOKEN_PATH: &str = "/login/oauth/access_token";

fn device_registry(server: &MockServer, id: &str) -> Arc<ProviderRegistry> {
    let registry = ProviderRegistry::new();
    registry.register(ProviderAdapter::device(
        id,
        "Test Device Provider",
        &format!("{}{}", server.uri(), DEVICE_PATH),
        &format!("{}{}", server.uri(), TOKEN_PATH),
        "read",
    ));
    Arc::new(registry)
}

fn code_registry(server: &MockServer, id: &str) -> Arc<ProviderRegistry> {
    let registry = ProviderRegistry::new();
    registry.register(ProviderAdapter::code(
        id,
        "Test Code Provider",
        "https://provider.example.com/oauth/authorize",
        &format!("{}/oauth/token", server.uri()),
        "read write",
    ));
    Arc::new(registry)
}

fn device_engine(store: &Arc<FlowStore>, registry: Arc<ProviderRegistry>) -> DeviceFlowEngine {
    DeviceFlowEngine::new(Arc::clone(store), registry)
        .with_interval_floor(Duration::from_millis(50))
}

fn device_init_body(expires_in: u64) -> serde_json::Value {
    json!({
        "device_code": "dc_1",
        "user_code": "ABCD-1234",
        "verification_uri": "https://provider.example.com/activate",
        "expires_in": expires_in,
        "interval": 0
    })
}

async fn mount_device_init(server: &MockServer, expires_in: u64) {
    Mock::given(method("POST"))
        .and(path(DEVICE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(device_init_body(expires_in)))
        .mount(server)
        .await;
}

async fn wait_for_terminal(store: &FlowStore, provider: &str, timeout: Duration) -> FlowSnapshot {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let snapshot = store.snapshot(provider);
        if snapshot.status.is_terminal() || tokio::time::Instant::now() > deadline {
            return snapshot;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}

#[tokio::test]
async fn test_device_start_with_empty_client_id_is_config_error() {
    let server = MockServer::start().await;
    let store = Arc::new(FlowStore::new());
    let engine = device_engine(&store, device_registry(&server, "github"));

    let result = engine.start("github", "").await;
    assert!(matches!(result, Err(AppError::Config(_))));

    // No session, no background task.
    assert_eq!(engine.poll("github").status, FlowStatus::NoFlow);
}

#[tokio::test]
async fn test_device_start_surfaces_provider_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(DEVICE_PATH))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let store = Arc::new(FlowStore::new());
    let engine = device_engine(&store, device_registry(&server, "github"));

    let result = engine.start("github", "cid").await;
    match result {
        Err(AppError::Protocol { status, body }) => {
            assert_eq!(status, 500);
            assert_eq!(body, "boom");
        }
        other => panic!("Expected protocol error, got: {:?}", other),
    }
    assert_eq!(engine.poll("github").status, FlowStatus::NoFlow);
}

#[tokio::test]
async fn test_device_flow_completes_after_pending_polls() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(DEVICE_PATH))
        .and(body_string_contains("client_id=cid"))
        .respond_with(ResponseTemplate::new(200).set_body_json(device_init_body(60)))
        .mount(&server)
        .await;

    // Two pending answers, then the token.
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({"error": "authorization_pending"})),
        )
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .and(body_string_contains("device_code=dc_1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "tok_123",
            "token_type": "bearer"
        })))
        .mount(&server)
        .await;

    let store = Arc::new(FlowStore::new());
    let engine = device_engine(&store, device_registry(&server, "github"));

    let init = engine.start("github", "cid").await.unwrap();
    assert_eq!(init.user_code, "ABCD-1234");
    assert_eq!(init.verification_uri, "https://provider.example.com/activate");
    assert_eq!(engine.poll("github").status, FlowStatus::Pending);

    let snapshot = wait_for_terminal(&store, "github", Duration::from_secs(5)).await;
    assert_eq!(snapshot.status, FlowStatus::Complete);
    assert_eq!(snapshot.token.as_deref(), Some("tok_123"));

    // Terminal snapshots are idempotent.
    assert_eq!(engine.poll("github"), snapshot);
    assert_eq!(engine.poll("github"), snapshot);
}

#[tokio::test]
async fn test_device_flow_slow_down_grows_interval_and_still_expires() {
    let server = MockServer::start().await;
    mount_device_init(&server, 2).await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({"error": "slow_down"})))
        .mount(&server)
        .await;

    let store = Arc::new(FlowStore::new());
    let engine = device_engine(&store, device_registry(&server, "github"));
    engine.start("github", "cid").await.unwrap();

    let initial = store.current("github").unwrap().poll_interval;

    // After the first tick the provider's slow_down must have widened the
    // interval.
    tokio::time::sleep(Duration::from_millis(400)).await;
    let grown = store.current("github").unwrap().poll_interval;
    assert!(grown > initial, "interval did not grow: {:?}", grown);

    // The flow still terminates at its deadline, at most one interval late.
    let snapshot = wait_for_terminal(&store, "github", Duration::from_secs(8)).await;
    assert_eq!(snapshot.status, FlowStatus::Expired);
    assert_eq!(snapshot.token, None);
}

#[tokio::test]
async fn test_device_flow_expires_when_never_authorized() {
    let server = MockServer::start().await;
    mount_device_init(&server, 1).await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({"error": "authorization_pending"})),
        )
        .mount(&server)
        .await;

    let store = Arc::new(FlowStore::new());
    let engine = DeviceFlowEngine::new(Arc::clone(&store), device_registry(&server, "github"))
        .with_interval_floor(Duration::from_millis(200));
    engine.start("github", "cid").await.unwrap();

    let snapshot = wait_for_terminal(&store, "github", Duration::from_secs(4)).await;
    assert_eq!(snapshot.status, FlowStatus::Expired);
    assert_eq!(snapshot.error.as_deref(), Some("Authorization timed out"));
}

#[tokio::test]
async fn test_device_flow_denial_is_terminal_without_token() {
    let server = MockServer::start().await;
    mount_device_init(&server, 60).await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({"error": "access_denied"})))
        .mount(&server)
        .await;

    let store = Arc::new(FlowStore::new());
    let engine = device_engine(&store, device_registry(&server, "github"));
    engine.start("github", "cid").await.unwrap();

    let snapshot = wait_for_terminal(&store, "github", Duration::from_secs(5)).await;
    assert_eq!(snapshot.status, FlowStatus::Denied);
    assert_eq!(snapshot.token, None);
}

#[tokio::test]
async fn test_device_flow_reports_unknown_provider_error() {
    let server = MockServer::start().await;
    mount_device_init(&server, 60).await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "incorrect_client_credentials",
            "error_description": "The client_id is not valid"
        })))
        .mount(&server)
        .await;

    let store = Arc::new(FlowStore::new());
    let engine = device_engine(&store, device_registry(&server, "github"));
    engine.start("github", "cid").await.unwrap();

    let snapshot = wait_for_terminal(&store, "github", Duration::from_secs(5)).await;
    assert_eq!(snapshot.status, FlowStatus::Error);
    assert_eq!(
        snapshot.error.as_deref(),
        Some("incorrect_client_credentials: The client_id is not valid")
    );
}

#[tokio::test]
async fn test_second_start_supersedes_first_flow() {
    let server = MockServer::start().await;

    // First flow would expire almost immediately; the second lives long.
    Mock::given(method("POST"))
        .and(path(DEVICE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(device_init_body(1)))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(DEVICE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(device_init_body(600)))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({"error": "authorization_pending"})),
        )
        .mount(&server)
        .await;

    let store = Arc::new(FlowStore::new());
    let engine = device_engine(&store, device_registry(&server, "github"));

    engine.start("github", "cid").await.unwrap();
    let first_generation = store.current("github").unwrap().generation;

    engine.start("github", "cid").await.unwrap();
    let second_generation = store.current("github").unwrap().generation;
    assert!(second_generation > first_generation);
    assert!(!store.is_current("github", first_generation));
    assert!(store.is_current("github", second_generation));

    // Give the superseded flow's deadline time to pass; its poller must not
    // write an Expired status into the replacement session.
    tokio::time::sleep(Duration::from_millis(1500)).await;
    let snapshot = store.snapshot("github");
    assert_eq!(snapshot.status, FlowStatus::Pending);
    assert_eq!(store.current("github").unwrap().generation, second_generation);
}

#[tokio::test]
async fn test_cancel_ends_pending_device_flow() {
    let server = MockServer::start().await;
    mount_device_init(&server, 600).await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({"error": "authorization_pending"})),
        )
        .mount(&server)
        .await;

    let store = Arc::new(FlowStore::new());
    let engine = device_engine(&store, device_registry(&server, "github"));
    engine.start("github", "cid").await.unwrap();

    assert!(store.cancel("github"));

    let snapshot = store.snapshot("github");
    assert_eq!(snapshot.status, FlowStatus::Error);
    assert_eq!(snapshot.error.as_deref(), Some("authorization cancelled"));
}

#[tokio::test]
async fn test_code_flow_completes_via_callback() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("code=c1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "tok_lin",
            "refresh_token": "ref_1",
            "token_type": "bearer"
        })))
        .mount(&server)
        .await;

    let store = Arc::new(FlowStore::new());
    let engine = CallbackFlowEngine::new(Arc::clone(&store), code_registry(&server, "linear"));

    let start = engine
        .start("linear", "cid", "secret", "http://127.0.0.1:7878/auth/linear/callback")
        .unwrap();
    let state = store.current("linear").unwrap().state_token.unwrap();
    assert!(start.authorize_url.contains(&format!("state={}", state)));
    assert_eq!(engine.poll("linear").status, FlowStatus::Pending);

    engine.handle_callback("linear", "c1", &state).await.unwrap();

    let snapshot = engine.poll("linear");
    assert_eq!(snapshot.status, FlowStatus::Complete);
    assert_eq!(snapshot.token.as_deref(), Some("tok_lin"));
    assert_eq!(
        store.current("linear").unwrap().refresh_token.as_deref(),
        Some("ref_1")
    );
}

#[tokio::test]
async fn test_code_flow_rejects_state_mismatch() {
    let server = MockServer::start().await;
    let store = Arc::new(FlowStore::new());
    let engine = CallbackFlowEngine::new(Arc::clone(&store), code_registry(&server, "linear"));

    engine
        .start("linear", "cid", "secret", "http://127.0.0.1:7878/auth/linear/callback")
        .unwrap();

    let result = engine.handle_callback("linear", "c1", "WRONG").await;
    assert!(matches!(result, Err(AppError::InvalidState(_))));

    // The forged redirect must leave the session untouched.
    assert_eq!(engine.poll("linear").status, FlowStatus::Pending);
    assert_eq!(server.received_requests().await.unwrap().len(), 0);
}

#[tokio::test]
async fn test_code_flow_exchange_failure_is_captured() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "The code has expired"
        })))
        .mount(&server)
        .await;

    let store = Arc::new(FlowStore::new());
    let engine = CallbackFlowEngine::new(Arc::clone(&store), code_registry(&server, "linear"));

    engine
        .start("linear", "cid", "secret", "http://127.0.0.1:7878/auth/linear/callback")
        .unwrap();
    let state = store.current("linear").unwrap().state_token.unwrap();

    let result = engine.handle_callback("linear", "c1", &state).await;
    assert!(matches!(result, Err(AppError::Protocol { status: 400, .. })));

    let snapshot = engine.poll("linear");
    assert_eq!(snapshot.status, FlowStatus::Error);
    assert_eq!(
        snapshot.error.as_deref(),
        Some("invalid_grant: The code has expired")
    );
}
