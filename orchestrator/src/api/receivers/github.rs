use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde_json::{json, Value};

use crate::error::{ProxyError, ProxyResult};
use crate::model::Platform;
use crate::payload::parse_github;
use crate::AppState;

use super::{dispatch, select_by_signature};

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// `POST /hooks/github` (spec.md §4.7, §6). Required headers:
/// `X-GitHub-Event`, `X-GitHub-Delivery`; optional `X-Hub-Signature-256`
/// (used for the default signature header — per-tenant configurations may
/// name a different header) and `X-GitHub-Enterprise-Host`.
pub async fn handle(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> ProxyResult<Json<Value>> {
    let event_type = header(&headers, "X-GitHub-Event")
        .ok_or_else(|| ProxyError::BadRequest("missing X-GitHub-Event header".into()))?;
    let delivery_id = header(&headers, "X-GitHub-Delivery")
        .ok_or_else(|| ProxyError::BadRequest("missing X-GitHub-Delivery header".into()))?;
    let enterprise_host = header(&headers, "X-GitHub-Enterprise-Host");

    if event_type == "ping" {
        return Ok(Json(json!({"message": "pong"})));
    }

    let envelope = parse_github(&event_type, &delivery_id, &body)?;

    let candidates = state
        .store
        .find_candidates_for_platform(
            Platform::GitHub,
            enterprise_host.as_deref(),
            &event_type,
            envelope.repository_or_channel().as_deref(),
        )
        .await?;

    if candidates.is_empty() {
        return Ok(Json(json!({"message": "no matching webhooks"})));
    }

    let selected = select_by_signature(&candidates, &body, |tenant| {
        header(&headers, &tenant.signature_header)
    })
    .ok_or(ProxyError::SignatureInvalid)?;

    dispatch(&state, selected, &envelope).await
}
