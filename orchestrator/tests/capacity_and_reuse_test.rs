//! End-to-end scenarios 4-5 from spec.md §8: capacity exhaustion and
//! reuse-by-fingerprint.

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::Value;
use tower::ServiceExt;

use common::{build_state, github_tenant, pr_opened_body, sign_sha256};
use webhook_orchestrator::model::GitHubConditions;

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = http_body_util::BodyExt::collect(response.into_body())
        .await
        .unwrap()
        .to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn pr_request(secret: &str, body: Vec<u8>, delivery_id: &str) -> Request<Body> {
    let signature = sign_sha256(secret, &body);
    Request::builder()
        .method("POST")
        .uri("/hooks/github")
        .header("X-GitHub-Event", "pull_request")
        .header("X-GitHub-Delivery", delivery_id)
        .header("X-Hub-Signature-256", signature)
        .header("content-type", "application/json")
        .body(Body::from(body))
        .unwrap()
}

#[tokio::test]
async fn second_delivery_fails_with_capacity_exhausted_once_cap_reached() {
    let state = build_state(true);
    let secret = "shared-secret";

    let mut conditions = GitHubConditions::default();
    conditions.events = vec!["pull_request".to_string()];

    // max_sessions=1, no reuse: a second PR (different number) must be
    // rejected while the first session is still non-terminal.
    let tenant = github_tenant("w1", "user-1", secret, conditions, 1, false);
    state.store.create(tenant).await.unwrap();

    let app = webhook_orchestrator::app::router(state.clone());
    let first = pr_request(secret, pr_opened_body("acme/widgets", "main", 1), "d1");
    let response = app.clone().oneshot(first).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert!(json["session_id"].is_string());

    let second = pr_request(secret, pr_opened_body("acme/widgets", "main", 2), "d2");
    let response = app.oneshot(second).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert!(json["session_id"].is_null());
    assert!(json["message"].as_str().unwrap().contains("capacity exhausted"));

    let tenant = state.store.get("w1").await.unwrap();
    let delivery = tenant.last_delivery.expect("delivery recorded");
    assert_eq!(delivery.status, webhook_orchestrator::model::DeliveryStatus::Failed);
    assert_eq!(delivery.error.as_deref(), Some("capacity exhausted"));

    let sessions = state.sessions.list(Some("w1")).await;
    assert_eq!(sessions.len(), 1);
}

#[tokio::test]
async fn two_deliveries_for_same_pr_reuse_one_session() {
    let state = build_state(true);
    let secret = "shared-secret";

    let mut conditions = GitHubConditions::default();
    conditions.events = vec!["pull_request".to_string()];

    let tenant = github_tenant("w1", "user-1", secret, conditions, 10, true);
    state.store.create(tenant).await.unwrap();

    let app = webhook_orchestrator::app::router(state.clone());
    let first = pr_request(secret, pr_opened_body("acme/widgets", "main", 42), "d1");
    let response = app.clone().oneshot(first).await.unwrap();
    let first_json = body_json(response).await;
    let first_session_id = first_json["session_id"].as_str().unwrap().to_string();
    assert_eq!(first_json["session_reused"], false);

    let second = pr_request(secret, pr_opened_body("acme/widgets", "main", 42), "d2");
    let response = app.oneshot(second).await.unwrap();
    let second_json = body_json(response).await;
    assert_eq!(second_json["session_id"].as_str().unwrap(), first_session_id);
    assert_eq!(second_json["session_reused"], true);

    let sessions = state.sessions.list(Some("w1")).await;
    assert_eq!(sessions.len(), 1, "only one session should exist for the shared PR");

    let tenant = state.store.get("w1").await.unwrap();
    let delivery = tenant.last_delivery.expect("delivery recorded");
    assert!(delivery.session_reused);
}
