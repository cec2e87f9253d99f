use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use serde_json::{json, Value};

use crate::error::{ProxyError, ProxyResult};
use crate::model::Platform;
use crate::payload::parse_slack;
use crate::AppState;

use super::dispatch_with_retry;

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// `POST /hooks/slack/:id` (spec.md §4.7, §6). Unlike the GitHub receiver,
/// the tenant is addressed directly by path ID rather than discovered from
/// a candidate set, since Slack's Events API has no equivalent of a
/// repository or enterprise host to narrow on up front.
pub async fn handle(
    State(state): State<Arc<AppState>>,
    Path(tenant_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> ProxyResult<Json<Value>> {
    let timestamp = header(&headers, "X-Slack-Request-Timestamp")
        .ok_or_else(|| ProxyError::BadRequest("missing X-Slack-Request-Timestamp header".into()))?;
    let signature = header(&headers, "X-Slack-Signature")
        .ok_or_else(|| ProxyError::BadRequest("missing X-Slack-Signature header".into()))?;

    let raw: Value = serde_json::from_slice(&body)
        .map_err(|e| ProxyError::BadRequest(format!("invalid JSON body: {e}")))?;

    // The handshake handler is verified against the path tenant directly,
    // bypassing the allow-list candidate check: there is no event type or
    // channel to filter on yet.
    if raw.get("type").and_then(Value::as_str) == Some("url_verification") {
        let tenant = state.store.get(&tenant_id).await?;
        if !crate::signature::verify_slack(&body, &timestamp, &signature, &tenant.secret, chrono::Utc::now()) {
            return Err(ProxyError::SignatureInvalid);
        }
        let challenge = raw.get("challenge").and_then(Value::as_str).unwrap_or_default();
        return Ok(Json(json!({ "challenge": challenge })));
    }

    let envelope = parse_slack(&tenant_id, &body)?;

    let candidate = state
        .store
        .get_candidate(
            &tenant_id,
            Platform::Slack,
            None,
            &envelope.event_type,
            envelope.channel_id.as_deref(),
        )
        .await?;

    let Some(tenant) = candidate else {
        return Ok(Json(json!({"message": "no matching webhooks"})));
    };

    if !crate::signature::verify_slack(&body, &timestamp, &signature, &tenant.secret, chrono::Utc::now()) {
        return Err(ProxyError::SignatureInvalid);
    }

    // Retries are surfaced on the delivery record but not deduplicated
    // (spec.md §9 Open Questions): a retried delivery runs the full
    // matcher → session pipeline again.
    let retry_num = header(&headers, "X-Slack-Retry-Num").and_then(|v| v.parse::<i64>().ok());
    let retry_reason = header(&headers, "X-Slack-Retry-Reason");

    dispatch_with_retry(&state, &tenant, &envelope, retry_num, retry_reason).await
}
