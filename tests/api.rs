//! API endpoint integration tests

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use coalesce_gateway::api::{self, ApiState, webhooks::SECRET_HEADER};
use tower::ServiceExt;

mod common;
use common::{MockNotifier, advance, scenario_gateway};

/// Build a test API router, returning the notifier to observe flushes
fn build_test_router(secret: Option<&str>) -> (axum::Router, Arc<MockNotifier>) {
    let (gateway, _generator, notifier) = scenario_gateway();
    let state = Arc::new(ApiState::new(Arc::new(gateway), secret.map(ToString::to_string)));
    (api::router(state), notifier)
}

fn webhook(channel: &str, body: &serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(format!("/api/webhooks/{channel}"))
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn test_health_endpoint() {
    let (app, _) = build_test_router(None);

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["status"], "ok");
    assert!(json["version"].is_string());
}

#[tokio::test(start_paused = true)]
async fn test_webhook_buffers_and_reports_status() {
    let (app, notifier) = build_test_router(None);

    let response = app
        .clone()
        .oneshot(webhook(
            "telegram",
            &serde_json::json!({"chat_id": "42", "dispatch_token": "tok", "text": "Hi"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["ok"], true);
    assert_eq!(json["buffered"], 1);
    assert_eq!(json["delay"], "text");

    let response = app
        .clone()
        .oneshot(webhook(
            "telegram",
            &serde_json::json!({"chat_id": "42", "dispatch_token": "tok", "file": {"name": "essay.docx"}}),
        ))
        .await
        .unwrap();
    let json = json_body(response).await;
    assert_eq!(json["buffered"], 2);
    assert_eq!(json["delay"], "file");

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/api/status").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let json = json_body(response).await;
    assert_eq!(json["pending_conversations"], 1);
    assert_eq!(json["armed_timers"], 1);
    assert_eq!(json["text_delay_secs"], 30);
    assert_eq!(json["file_delay_secs"], 120);

    advance(121).await;
    let sent = notifier.sent.lock().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0.as_str(), "tok");
}

#[tokio::test]
async fn test_webhook_rejects_missing_identity() {
    let (app, _) = build_test_router(None);

    let response = app
        .oneshot(webhook(
            "telegram",
            &serde_json::json!({"dispatch_token": "tok", "text": "Hi"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = json_body(response).await;
    assert_eq!(json["ok"], false);
}

#[tokio::test]
async fn test_webhook_secret_enforced() {
    let (app, _) = build_test_router(Some("s3cret"));
    let body = serde_json::json!({"chat_id": "1", "dispatch_token": "tok", "text": "Hi"});

    let response = app.clone().oneshot(webhook("slack", &body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let mut request = webhook("slack", &body);
    request
        .headers_mut()
        .insert(SECRET_HEADER, "s3cret".parse().unwrap());
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_redelivered_event_is_ignored() {
    let (app, _) = build_test_router(None);
    let body = serde_json::json!({
        "event_id": "evt-1",
        "chat_id": "1",
        "dispatch_token": "tok",
        "text": "Hi"
    });

    let first = json_body(app.clone().oneshot(webhook("telegram", &body)).await.unwrap()).await;
    assert_eq!(first["buffered"], 1);

    let second = json_body(app.clone().oneshot(webhook("telegram", &body)).await.unwrap()).await;
    assert_eq!(second["duplicate"], true);

    // Same event id on another channel is a different event
    let other = json_body(app.oneshot(webhook("slack", &body)).await.unwrap()).await;
    assert_eq!(other["buffered"], 1);
}

#[tokio::test]
async fn test_rejected_event_can_be_redelivered() {
    let (app, _) = build_test_router(None);

    let rejected = app
        .clone()
        .oneshot(webhook(
            "telegram",
            &serde_json::json!({"event_id": "evt-9", "dispatch_token": "tok", "text": "Hi"}),
        ))
        .await
        .unwrap();
    assert_eq!(rejected.status(), StatusCode::BAD_REQUEST);

    let retried = json_body(
        app.oneshot(webhook(
            "telegram",
            &serde_json::json!({"event_id": "evt-9", "chat_id": "1", "dispatch_token": "tok", "text": "Hi"}),
        ))
        .await
        .unwrap(),
    )
    .await;
    assert_eq!(retried["duplicate"], serde_json::Value::Null);
    assert_eq!(retried["buffered"], 1);
}
