//! End-to-end scenario 6 from spec.md §8: dry-running a trigger against a
//! sample event creates no session and records no delivery.

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

use common::{build_state, github_tenant};
use webhook_orchestrator::model::GitHubConditions;

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = http_body_util::BodyExt::collect(response.into_body())
        .await
        .unwrap()
        .to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn dry_run_matches_without_creating_a_session_or_delivery() {
    let state = build_state(true);

    let mut conditions = GitHubConditions::default();
    conditions.events = vec!["pull_request".to_string()];
    conditions.actions = vec!["opened".to_string()];

    let tenant = github_tenant("w1", "user-1", "shared-secret", conditions, 10, false);
    state.store.create(tenant).await.unwrap();

    let app = webhook_orchestrator::app::router(state.clone());
    let request_body = json!({
        "event_type": "pull_request",
        "action": "opened",
        "payload": {
            "action": "opened",
            "repository": {"full_name": "acme/widgets"},
            "pull_request": {
                "number": 9,
                "base": {"ref": "main"},
                "head": {"ref": "feature/y"},
                "draft": false,
            },
            "sender": {"login": "octocat"}
        }
    });
    let request = Request::builder()
        .method("POST")
        .uri("/api/webhooks/w1/trigger")
        .header("content-type", "application/json")
        .body(Body::from(request_body.to_string()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;

    assert_eq!(json["matched"], true);
    assert_eq!(json["trigger_id"], "w1-trigger");
    assert!(json["initial_message"].is_string());

    assert!(state.sessions.list(Some("w1")).await.is_empty());
    assert!(state.store.get("w1").await.unwrap().last_delivery.is_none());
}

#[tokio::test]
async fn dry_run_reports_no_match_for_unrelated_event() {
    let state = build_state(true);

    let mut conditions = GitHubConditions::default();
    conditions.events = vec!["pull_request".to_string()];
    conditions.actions = vec!["opened".to_string()];

    let tenant = github_tenant("w1", "user-1", "shared-secret", conditions, 10, false);
    state.store.create(tenant).await.unwrap();

    let app = webhook_orchestrator::app::router(state.clone());
    let request_body = json!({
        "event_type": "push",
        "action": null,
        "payload": {
            "ref": "refs/heads/main",
            "repository": {"full_name": "acme/widgets"},
            "commits": [],
            "sender": {"login": "octocat"}
        }
    });
    let request = Request::builder()
        .method("POST")
        .uri("/api/webhooks/w1/trigger")
        .header("content-type", "application/json")
        .body(Body::from(request_body.to_string()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;

    assert_eq!(json["matched"], false);
    assert!(json["trigger_id"].is_null());
}
