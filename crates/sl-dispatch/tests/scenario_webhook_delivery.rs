//! Scenario: webhook delivery against a real local endpoint.
//!
//! Covers outcome classification (2xx / 4xx / 5xx / timeout), the attempt
//! bound, and the signature header as seen by an actual receiver.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::Router;
use serde_json::json;
use tokio::sync::Mutex;

use sl_dispatch::{verify_signature, DispatchOptions, WebhookDispatcher, SIGNATURE_HEADER};

async fn spawn_endpoint(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}/hook")
}

fn fast_opts() -> DispatchOptions {
    DispatchOptions {
        max_attempts: 3,
        timeout_ms: 2_000,
        retry_delays_ms: vec![10, 20, 30],
    }
}

#[tokio::test]
async fn retry_then_success_reports_three_attempts() {
    let hits = Arc::new(AtomicUsize::new(0));
    let state = hits.clone();
    let app = Router::new().route(
        "/hook",
        post(move || {
            let state = state.clone();
            async move {
                // 503 twice, then 200.
                if state.fetch_add(1, Ordering::SeqCst) < 2 {
                    StatusCode::SERVICE_UNAVAILABLE
                } else {
                    StatusCode::OK
                }
            }
        }),
    );
    let url = spawn_endpoint(app).await;

    let result = WebhookDispatcher::new()
        .dispatch(&url, &json!({"hello": "world"}), None, &fast_opts())
        .await;

    assert!(result.success);
    assert_eq!(result.attempts, 3);
    assert_eq!(result.status_code, Some(200));
    assert!(result.error.is_none());
    assert_eq!(hits.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn client_error_is_permanent_single_attempt() {
    let hits = Arc::new(AtomicUsize::new(0));
    let state = hits.clone();
    let app = Router::new().route(
        "/hook",
        post(move || {
            let state = state.clone();
            async move {
                state.fetch_add(1, Ordering::SeqCst);
                StatusCode::BAD_REQUEST
            }
        }),
    );
    let url = spawn_endpoint(app).await;

    let result = WebhookDispatcher::new()
        .dispatch(&url, &json!({}), None, &fast_opts())
        .await;

    assert!(!result.success);
    assert_eq!(result.attempts, 1, "4xx must not retry");
    assert_eq!(result.status_code, Some(400));
    assert_eq!(result.error.as_deref(), Some("HTTP 400"));
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn server_errors_exhaust_the_attempt_budget() {
    let hits = Arc::new(AtomicUsize::new(0));
    let state = hits.clone();
    let app = Router::new().route(
        "/hook",
        post(move || {
            let state = state.clone();
            async move {
                state.fetch_add(1, Ordering::SeqCst);
                StatusCode::SERVICE_UNAVAILABLE
            }
        }),
    );
    let url = spawn_endpoint(app).await;

    let result = WebhookDispatcher::new()
        .dispatch(&url, &json!({}), None, &fast_opts())
        .await;

    assert!(!result.success);
    assert_eq!(result.attempts, 3, "exactly max_attempts HTTP attempts");
    assert_eq!(result.status_code, Some(503));
    assert_eq!(result.error.as_deref(), Some("HTTP 503"));
    assert_eq!(hits.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn timeouts_are_distinguishable_from_other_errors() {
    let app = Router::new().route(
        "/hook",
        post(|| async {
            tokio::time::sleep(std::time::Duration::from_millis(500)).await;
            StatusCode::OK
        }),
    );
    let url = spawn_endpoint(app).await;

    let opts = DispatchOptions {
        max_attempts: 1,
        timeout_ms: 50,
        retry_delays_ms: vec![10],
    };
    let result = WebhookDispatcher::new()
        .dispatch(&url, &json!({}), None, &opts)
        .await;

    assert!(!result.success);
    assert_eq!(result.attempts, 1);
    let err = result.error.expect("timeout must surface an error");
    assert!(err.contains("timed out after 50ms"), "got: {err}");
}

#[tokio::test]
async fn signature_header_verifies_at_the_receiver() {
    let captured: Arc<Mutex<Option<(String, String)>>> = Arc::new(Mutex::new(None));
    let state = captured.clone();
    let app = Router::new().route(
        "/hook",
        post(move |headers: HeaderMap, body: String| {
            let state = state.clone();
            async move {
                let sig = headers
                    .get(SIGNATURE_HEADER)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                *state.lock().await = Some((sig, body));
                StatusCode::OK
            }
        }),
    );
    let url = spawn_endpoint(app).await;

    let payload = json!({"streamId": "s1", "matches": {"transactions": []}});
    let result = WebhookDispatcher::new()
        .dispatch(&url, &payload, Some("whsec_abc"), &fast_opts())
        .await;
    assert!(result.success);

    let (signature, body) = captured.lock().await.clone().expect("receiver saw the POST");
    assert!(!signature.is_empty(), "signature header must be present");
    assert!(
        verify_signature(
            "whsec_abc",
            &signature,
            &body,
            300,
            chrono::Utc::now().timestamp()
        ),
        "receiver-side verification must pass on the exact wire bytes"
    );
}

#[tokio::test]
async fn no_secret_means_no_signature_header() {
    let saw_header = Arc::new(AtomicUsize::new(0));
    let state = saw_header.clone();
    let app = Router::new().route(
        "/hook",
        post(move |headers: HeaderMap| {
            let state = state.clone();
            async move {
                if headers.contains_key(SIGNATURE_HEADER) {
                    state.fetch_add(1, Ordering::SeqCst);
                }
                StatusCode::OK
            }
        }),
    );
    let url = spawn_endpoint(app).await;

    let result = WebhookDispatcher::new()
        .dispatch(&url, &json!({}), None, &fast_opts())
        .await;
    assert!(result.success);
    assert_eq!(saw_header.load(Ordering::SeqCst), 0);
}
