//! HTTP routing tests
//!
//! Requests go through the real router with `tower::ServiceExt::oneshot`;
//! no socket is opened.

mod helpers;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use dopa_tracker::api::{create_router, AppContext};
use dopa_tracker::capture::CaptureSource;
use dopa_tracker::db::MemoryCheckpointStore;
use dopa_tracker::Tracker;
use helpers::{build_tracker, fast_settings, ScriptedLedger};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

async fn setup() -> (Router, Arc<Tracker>) {
    let tracker = build_tracker(
        Arc::new(ScriptedLedger::new()),
        Arc::new(MemoryCheckpointStore::new()),
        fast_settings(),
    )
    .await;
    let router = create_router(AppContext {
        tracker: Arc::clone(&tracker),
    });
    (router, tracker)
}

async fn request(
    app: &Router,
    method: Method,
    path: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(path);
    let request = match body {
        Some(json_body) => builder
            .header("content-type", "application/json")
            .body(Body::from(json_body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

#[tokio::test]
async fn test_health() {
    let (app, _) = setup().await;
    let (status, body) = request(&app, Method::GET, "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["module"], "dopa-tracker");
}

#[tokio::test]
async fn test_state_snapshot() {
    let (app, _) = setup().await;
    let (status, body) = request(&app, Method::GET, "/state", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["score"], 0.0);
    assert_eq!(body["settling"], false);
    assert!(body["session"].is_null());
    assert!(body["finance"]["wallet_id"].is_null());
}

#[tokio::test]
async fn test_session_start_and_stop() {
    let (app, tracker) = setup().await;

    let (status, body) = request(
        &app,
        Method::POST,
        "/session/start",
        Some(json!({ "source": "tab-7" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["source"], "tab-7");
    assert!(body["id"].is_string());

    let (status, _) = request(
        &app,
        Method::POST,
        "/session/start",
        Some(json!({ "source": "tab-8" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = request(&app, Method::POST, "/session/stop", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["final_score"].is_number());
    assert!(!tracker.is_active().await);

    let (status, body) = request(&app, Method::POST, "/session/stop", None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["status"].as_str().unwrap().starts_with("error"));
}

#[tokio::test]
async fn test_allowance_endpoints() {
    let (app, tracker) = setup().await;

    let (status, body) = request(
        &app,
        Method::POST,
        "/allowance",
        Some(json!({ "wallet_id": "wallet-a", "amount": 12.5 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["wallet_id"], "wallet-a");
    assert_eq!(body["total_allowance"], 12.5);
    assert_eq!(body["cumulative_settled"], 0.0);

    let (status, _) = request(
        &app,
        Method::POST,
        "/allowance",
        Some(json!({ "wallet_id": "wallet-a", "amount": 0 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        tracker.get_state().await.finance.total_allowance,
        12.5,
        "rejected request leaves the binding alone"
    );

    let (status, body) = request(&app, Method::DELETE, "/allowance", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["wallet_id"].is_null());
}

#[tokio::test]
async fn test_capture_frame_validation() {
    let (app, tracker) = setup().await;

    let pixels = vec![128u8; 4 * 3 * 4];
    let (status, _) = request(
        &app,
        Method::POST,
        "/capture/frame",
        Some(json!({ "width": 4, "height": 3, "rgba": STANDARD.encode(&pixels) })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let frame = tracker.capture().frame().expect("frame stored");
    assert_eq!((frame.width(), frame.height()), (4, 3));

    let (status, body) = request(
        &app,
        Method::POST,
        "/capture/frame",
        Some(json!({ "width": 5, "height": 3, "rgba": STANDARD.encode(&pixels) })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["status"].as_str().unwrap().contains("expected 60 bytes"));

    let (status, _) = request(
        &app,
        Method::POST,
        "/capture/frame",
        Some(json!({ "width": 4, "height": 3, "rgba": "not base64!" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(tracker.capture().frame().is_none());
}

#[tokio::test]
async fn test_capture_spectrum() {
    let (app, tracker) = setup().await;

    let (status, _) = request(
        &app,
        Method::POST,
        "/capture/spectrum",
        Some(json!({ "bins": [] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = request(
        &app,
        Method::POST,
        "/capture/spectrum",
        Some(json!({ "bins": [200, 180, 150, 90] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let spectrum = tracker.capture().spectrum().expect("spectrum stored");
    assert_eq!(spectrum.bins(), &[200, 180, 150, 90]);
}

#[tokio::test]
async fn test_event_stream_content_type() {
    let (app, _) = setup().await;

    let response = app
        .oneshot(
            Request::builder()
                .method(Method::GET)
                .uri("/events")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()["content-type"].to_str().unwrap(),
        "text/event-stream"
    );
}

#[tokio::test]
async fn test_unknown_route_is_404() {
    let (app, _) = setup().await;
    let (status, _) = request(&app, Method::GET, "/playback/state", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
