use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use serde_json::{json, Value};

use crate::error::{ProxyError, ProxyResult};
use crate::model::{Platform, SignatureType};
use crate::payload::parse_custom;
use crate::AppState;

use super::dispatch;

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// `POST /hooks/custom/:id` (spec.md §4.7, §6). Free-form JSON from a
/// source with no fixed schema; the tenant's own `signature_header` and
/// `signature_type` determine how the request is authenticated.
pub async fn handle(
    State(state): State<Arc<AppState>>,
    Path(tenant_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> ProxyResult<Json<Value>> {
    let envelope = parse_custom(&tenant_id, &body)?;

    let candidate = state
        .store
        .get_candidate(&tenant_id, Platform::Custom, None, &envelope.event_type, None)
        .await?;

    let Some(tenant) = candidate else {
        return Ok(Json(json!({"message": "no matching webhooks"})));
    };

    let header_value = header(&headers, &tenant.signature_header)
        .ok_or(ProxyError::SignatureInvalid)?;

    let verified = match tenant.signature_type {
        SignatureType::Sha256 | SignatureType::Sha1 => {
            crate::signature::verify(&body, &header_value, &tenant.secret)
        }
        SignatureType::StaticToken => {
            crate::signature::verify_static_token(&header_value, &tenant.secret)
        }
    };
    if !verified {
        return Err(ProxyError::SignatureInvalid);
    }

    dispatch(&state, &tenant, &envelope).await
}
