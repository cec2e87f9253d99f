//! Slack-specific flows from spec.md §4.7/§6: the URL verification
//! handshake, the ±5-minute signature timestamp window, and retry-header
//! propagation onto the delivery record.

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::Utc;
use serde_json::{json, Value};
use tower::ServiceExt;

use common::{build_state, sign_slack, slack_event_body, slack_tenant};
use webhook_orchestrator::model::SlackConditions;

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = http_body_util::BodyExt::collect(response.into_body())
        .await
        .unwrap()
        .to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn url_verification_echoes_challenge_when_signature_is_valid() {
    let state = build_state(true);
    let secret = "slack-secret";
    let tenant = slack_tenant("w1", "user-1", secret, SlackConditions::default());
    state.store.create(tenant).await.unwrap();

    let body = json!({
        "type": "url_verification",
        "challenge": "abc123",
    })
    .to_string()
    .into_bytes();
    let timestamp = Utc::now().timestamp().to_string();
    let signature = sign_slack(secret, &timestamp, &body);

    let app = webhook_orchestrator::app::router(state);
    let request = Request::builder()
        .method("POST")
        .uri("/hooks/slack/w1")
        .header("X-Slack-Request-Timestamp", timestamp)
        .header("X-Slack-Signature", signature)
        .header("content-type", "application/json")
        .body(Body::from(body))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["challenge"], "abc123");
}

#[tokio::test]
async fn stale_timestamp_is_rejected_as_signature_invalid() {
    let state = build_state(true);
    let secret = "slack-secret";
    let tenant = slack_tenant("w1", "user-1", secret, SlackConditions::default());
    state.store.create(tenant).await.unwrap();

    let body = slack_event_body("message", "C123", "U456");
    let stale_timestamp = (Utc::now().timestamp() - 600).to_string();
    let signature = sign_slack(secret, &stale_timestamp, &body);

    let app = webhook_orchestrator::app::router(state);
    let request = Request::builder()
        .method("POST")
        .uri("/hooks/slack/w1")
        .header("X-Slack-Request-Timestamp", stale_timestamp)
        .header("X-Slack-Signature", signature)
        .header("content-type", "application/json")
        .body(Body::from(body))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn matching_event_creates_a_session_and_records_retry_headers() {
    let state = build_state(true);
    let secret = "slack-secret";

    let mut conditions = SlackConditions::default();
    conditions.event_types = vec!["message".to_string()];
    conditions.channel_ids = vec!["C123".to_string()];

    let tenant = slack_tenant("w1", "user-1", secret, conditions);
    state.store.create(tenant).await.unwrap();

    let body = slack_event_body("message", "C123", "U456");
    let timestamp = Utc::now().timestamp().to_string();
    let signature = sign_slack(secret, &timestamp, &body);

    let app = webhook_orchestrator::app::router(state.clone());
    let request = Request::builder()
        .method("POST")
        .uri("/hooks/slack/w1")
        .header("X-Slack-Request-Timestamp", timestamp)
        .header("X-Slack-Signature", signature)
        .header("X-Slack-Retry-Num", "1")
        .header("X-Slack-Retry-Reason", "http_timeout")
        .header("content-type", "application/json")
        .body(Body::from(body))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert!(json["session_id"].is_string());

    let tenant = state.store.get("w1").await.unwrap();
    let delivery = tenant.last_delivery.expect("delivery recorded");
    assert_eq!(delivery.retry_num, Some(1));
    assert_eq!(delivery.retry_reason.as_deref(), Some("http_timeout"));
}

#[tokio::test]
async fn channel_allow_list_excludes_non_matching_channel_from_candidacy() {
    let state = build_state(true);
    let secret = "slack-secret";

    let mut conditions = SlackConditions::default();
    conditions.event_types = vec!["message".to_string()];

    let mut tenant = slack_tenant("w1", "user-1", secret, conditions);
    if let webhook_orchestrator::model::PlatformConfig::Slack(cfg) = &mut tenant.platform {
        cfg.allowed_channel_ids = vec!["C999".to_string()];
    }
    state.store.create(tenant).await.unwrap();

    let body = slack_event_body("message", "C123", "U456");
    let timestamp = Utc::now().timestamp().to_string();
    let signature = sign_slack(secret, &timestamp, &body);

    let app = webhook_orchestrator::app::router(state);
    let request = Request::builder()
        .method("POST")
        .uri("/hooks/slack/w1")
        .header("X-Slack-Request-Timestamp", timestamp)
        .header("X-Slack-Signature", signature)
        .header("content-type", "application/json")
        .body(Body::from(body))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["message"], "no matching webhooks");
}
