use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::api::common::Principal;
use crate::api::receivers::match_trigger;
use crate::error::{ProxyError, ProxyResult};
use crate::model::{
    DeliveryRecord, Platform, PlatformConfig, SessionConfig, SignatureType, Tenant, TenantScope,
    TenantStatus, Trigger,
};
use crate::payload::{parse_custom, parse_github, parse_slack};
use crate::AppState;

/// Read model returned by every endpoint except creation/secret
/// regeneration: the raw HMAC secret never round-trips once it has been
/// issued (spec.md §5/§9 "masked-secret projection").
#[derive(Serialize, ToSchema)]
pub struct WebhookView {
    pub id: String,
    pub name: String,
    pub owner_user_id: String,
    pub scope: TenantScope,
    pub status: TenantStatus,
    pub masked_secret: String,
    pub signature_header: String,
    pub signature_type: SignatureType,
    pub platform: PlatformConfig,
    pub triggers: Vec<Trigger>,
    pub default_session_config: SessionConfig,
    pub max_sessions: i64,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
    pub delivery_count: u64,
    pub last_delivery: Option<DeliveryRecord>,
}

impl From<&Tenant> for WebhookView {
    fn from(t: &Tenant) -> Self {
        Self {
            id: t.id.clone(),
            name: t.name.clone(),
            owner_user_id: t.owner_user_id.clone(),
            scope: t.scope.clone(),
            status: t.status,
            masked_secret: t.masked_secret(),
            signature_header: t.signature_header.clone(),
            signature_type: t.signature_type,
            platform: t.platform.clone(),
            triggers: t.triggers.clone(),
            default_session_config: t.default_session_config.clone(),
            max_sessions: t.max_sessions,
            created_at: t.created_at,
            updated_at: t.updated_at,
            delivery_count: t.delivery_count,
            last_delivery: t.last_delivery.clone(),
        }
    }
}

/// Only returned once, immediately after `create`/`regenerate_secret`.
#[derive(Serialize, ToSchema)]
pub struct WebhookSecretView {
    #[serde(flatten)]
    pub webhook: WebhookView,
    pub secret: String,
}

#[derive(Deserialize, ToSchema)]
pub struct CreateWebhookRequest {
    pub name: String,
    pub platform: PlatformConfig,
    #[serde(default)]
    pub signature_header: Option<String>,
    pub signature_type: SignatureType,
    pub triggers: Vec<Trigger>,
    #[serde(default)]
    pub default_session_config: SessionConfig,
    #[serde(default)]
    pub max_sessions: i64,
    pub team_id: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct UpdateWebhookRequest {
    pub name: Option<String>,
    pub status: Option<TenantStatus>,
    pub platform: Option<PlatformConfig>,
    pub signature_header: Option<String>,
    pub signature_type: Option<SignatureType>,
    pub triggers: Option<Vec<Trigger>>,
    pub default_session_config: Option<SessionConfig>,
    pub max_sessions: Option<i64>,
}

#[derive(Deserialize)]
pub struct ListWebhooksQuery {
    pub status: Option<TenantStatus>,
    pub platform: Option<crate::model::Platform>,
    pub scope: Option<String>,
    pub team_id: Option<String>,
}

fn authorize(principal: &Principal, tenant: &Tenant) -> ProxyResult<()> {
    let allowed = match &tenant.scope {
        TenantScope::User => principal.owns_or_admin(&tenant.owner_user_id),
        TenantScope::Team { team_id } => principal.in_team(team_id),
    };
    if allowed {
        Ok(())
    } else {
        Err(ProxyError::Forbidden)
    }
}

#[utoipa::path(
    get,
    path = "/api/webhooks",
    tag = "Webhooks",
    responses((status = 200, description = "List webhooks visible to the caller", body = [WebhookView])),
    security(("bearer_auth" = []))
)]
pub async fn list_webhooks(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Query(query): Query<ListWebhooksQuery>,
) -> ProxyResult<Json<Vec<WebhookView>>> {
    let scope = match query.scope.as_deref() {
        Some("user") => Some("user"),
        Some("team") => Some("team"),
        _ => None,
    };
    let tenants = crate::api::common::list_visible_tenants(
        &state.store,
        &principal,
        query.status,
        scope,
        query.team_id.as_deref(),
        query.platform,
    )
    .await?;
    Ok(Json(tenants.iter().map(WebhookView::from).collect()))
}

#[utoipa::path(
    post,
    path = "/api/webhooks",
    tag = "Webhooks",
    request_body = CreateWebhookRequest,
    responses((status = 200, description = "Webhook created", body = WebhookSecretView)),
    security(("bearer_auth" = []))
)]
pub async fn create_webhook(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Json(req): Json<CreateWebhookRequest>,
) -> ProxyResult<Json<WebhookSecretView>> {
    let now = chrono::Utc::now();
    let mut secret_bytes = [0u8; 32];
    rand::RngCore::fill_bytes(&mut rand::thread_rng(), &mut secret_bytes);
    let secret = hex::encode(secret_bytes);

    let scope = match req.team_id {
        Some(team_id) => {
            if !principal.in_team(&team_id) {
                return Err(ProxyError::Forbidden);
            }
            TenantScope::Team { team_id }
        }
        None => TenantScope::User,
    };

    let tenant = Tenant {
        id: uuid::Uuid::new_v4().to_string(),
        name: req.name,
        owner_user_id: principal.user_id.clone(),
        scope,
        status: TenantStatus::Active,
        secret: secret.clone(),
        signature_header: req
            .signature_header
            .unwrap_or_else(|| state.config.default_signature_header.clone()),
        signature_type: req.signature_type,
        platform: req.platform,
        triggers: req.triggers,
        default_session_config: req.default_session_config,
        max_sessions: req.max_sessions,
        created_at: now,
        updated_at: now,
        delivery_count: 0,
        last_delivery: None,
    };

    let created = state.store.create(tenant).await?;
    Ok(Json(WebhookSecretView {
        webhook: WebhookView::from(&created),
        secret,
    }))
}

#[utoipa::path(
    get,
    path = "/api/webhooks/{id}",
    tag = "Webhooks",
    responses((status = 200, description = "Webhook detail", body = WebhookView)),
    security(("bearer_auth" = []))
)]
pub async fn get_webhook(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<String>,
) -> ProxyResult<Json<WebhookView>> {
    let tenant = state.store.get(&id).await?;
    authorize(&principal, &tenant)?;
    Ok(Json(WebhookView::from(&tenant)))
}

#[utoipa::path(
    put,
    path = "/api/webhooks/{id}",
    tag = "Webhooks",
    request_body = UpdateWebhookRequest,
    responses((status = 200, description = "Webhook updated", body = WebhookView)),
    security(("bearer_auth" = []))
)]
pub async fn update_webhook(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<String>,
    Json(req): Json<UpdateWebhookRequest>,
) -> ProxyResult<Json<WebhookView>> {
    let existing = state.store.get(&id).await?;
    authorize(&principal, &existing)?;

    let updated = state
        .store
        .update(&id, move |t| {
            if let Some(name) = req.name {
                t.name = name;
            }
            if let Some(status) = req.status {
                t.status = status;
            }
            if let Some(platform) = req.platform {
                t.platform = platform;
            }
            if let Some(header) = req.signature_header {
                t.signature_header = header;
            }
            if let Some(sig_type) = req.signature_type {
                t.signature_type = sig_type;
            }
            if let Some(triggers) = req.triggers {
                t.triggers = triggers;
            }
            if let Some(session_config) = req.default_session_config {
                t.default_session_config = session_config;
            }
            if let Some(max_sessions) = req.max_sessions {
                t.max_sessions = max_sessions;
            }
        })
        .await?;
    Ok(Json(WebhookView::from(&updated)))
}

#[utoipa::path(
    delete,
    path = "/api/webhooks/{id}",
    tag = "Webhooks",
    responses((status = 204, description = "Webhook deleted")),
    security(("bearer_auth" = []))
)]
pub async fn delete_webhook(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<String>,
) -> ProxyResult<axum::http::StatusCode> {
    let existing = state.store.get(&id).await?;
    authorize(&principal, &existing)?;
    state.store.delete(&id).await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/api/webhooks/{id}/secret",
    tag = "Webhooks",
    responses((status = 200, description = "Secret regenerated", body = WebhookSecretView)),
    security(("bearer_auth" = []))
)]
pub async fn regenerate_secret(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<String>,
) -> ProxyResult<Json<WebhookSecretView>> {
    let existing = state.store.get(&id).await?;
    authorize(&principal, &existing)?;
    let updated = state.store.regenerate_secret(&id).await?;
    let secret = updated.secret.clone();
    Ok(Json(WebhookSecretView {
        webhook: WebhookView::from(&updated),
        secret,
    }))
}

/// Input to the dry-run trigger endpoint: a sample event to run through the
/// matcher without touching the session manager (spec.md §4.7 "Dry-run
/// path", §8 scenario 6).
#[derive(Deserialize, ToSchema)]
pub struct DryRunTriggerRequest {
    pub event_type: String,
    #[serde(default)]
    pub action: Option<String>,
    pub payload: serde_json::Value,
}

#[derive(Serialize, ToSchema)]
pub struct DryRunTriggerResponse {
    pub matched: bool,
    pub trigger_id: Option<String>,
    pub initial_message: Option<String>,
    pub reuse_message: Option<String>,
    pub reuse_session: bool,
    pub tags: std::collections::HashMap<String, String>,
    pub environment: std::collections::HashMap<String, String>,
}

#[utoipa::path(
    post,
    path = "/api/webhooks/{id}/trigger",
    tag = "Webhooks",
    request_body = DryRunTriggerRequest,
    responses((status = 200, description = "Matcher result for a sample event, with no session created", body = DryRunTriggerResponse)),
    security(("bearer_auth" = []))
)]
pub async fn dry_run_trigger(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<String>,
    Json(req): Json<DryRunTriggerRequest>,
) -> ProxyResult<Json<DryRunTriggerResponse>> {
    let tenant = state.store.get(&id).await?;
    authorize(&principal, &tenant)?;

    let mut payload = req.payload;
    if let (Some(action), Some(obj)) = (&req.action, payload.as_object_mut()) {
        obj.entry("action").or_insert_with(|| serde_json::Value::String(action.clone()));
    }
    let body = serde_json::to_vec(&payload)
        .map_err(|e| ProxyError::Internal(format!("failed to re-encode dry-run payload: {e}")))?;
    let delivery_id = format!("dry-run-{}", uuid::Uuid::new_v4());

    let envelope = match tenant.platform.platform() {
        Platform::GitHub => parse_github(&req.event_type, &delivery_id, &body)?,
        Platform::Slack => parse_slack(&id, &body)?,
        Platform::Custom => parse_custom(&id, &body)?,
    };

    match match_trigger(&tenant, &envelope) {
        Some(matched) => Ok(Json(DryRunTriggerResponse {
            matched: true,
            trigger_id: Some(matched.trigger.id),
            initial_message: Some(matched.initial_message),
            reuse_message: matched.reuse_message,
            reuse_session: matched.reuse_session,
            tags: matched.tags,
            environment: matched.environment,
        })),
        None => Ok(Json(DryRunTriggerResponse {
            matched: false,
            trigger_id: None,
            initial_message: None,
            reuse_message: None,
            reuse_session: false,
            tags: std::collections::HashMap::new(),
            environment: std::collections::HashMap::new(),
        })),
    }
}
