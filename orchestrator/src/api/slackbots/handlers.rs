use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::api::common::Principal;
use crate::api::receivers::match_trigger;
use crate::error::{ProxyError, ProxyResult};
use crate::model::{
    DeliveryRecord, Platform, PlatformConfig, SessionConfig, SignatureType, SlackPlatformConfig,
    Tenant, TenantScope, TenantStatus, Trigger,
};
use crate::payload::parse_slack;
use crate::AppState;

/// Management surface for Slack-bot tenants: the same tenant shape as
/// `api::webhooks`, scoped to `PlatformConfig::Slack` (spec.md §3, §6).
/// Kept as a distinct handler set rather than a query parameter on the
/// webhooks routes because Slack tenants have a different allow-list
/// shape (event types/channel IDs, not repositories) and are addressed
/// by a dedicated `/hooks/slack/:id` receiver path.
#[derive(Serialize, ToSchema)]
pub struct SlackBotView {
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

impl From<&Tenant> for SlackBotView {
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

#[derive(Serialize, ToSchema)]
pub struct SlackBotSecretView {
    #[serde(flatten)]
    pub bot: SlackBotView,
    pub secret: String,
}

#[derive(Deserialize, ToSchema)]
pub struct CreateSlackBotRequest {
    pub name: String,
    #[serde(default)]
    pub slack: SlackPlatformConfig,
    #[serde(default)]
    pub signature_header: Option<String>,
    pub triggers: Vec<Trigger>,
    #[serde(default)]
    pub default_session_config: SessionConfig,
    #[serde(default)]
    pub max_sessions: i64,
    pub team_id: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct UpdateSlackBotRequest {
    pub name: Option<String>,
    pub status: Option<TenantStatus>,
    pub slack: Option<SlackPlatformConfig>,
    pub signature_header: Option<String>,
    pub triggers: Option<Vec<Trigger>>,
    pub default_session_config: Option<SessionConfig>,
    pub max_sessions: Option<i64>,
}

#[derive(Deserialize)]
pub struct ListSlackBotsQuery {
    pub status: Option<TenantStatus>,
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
    path = "/api/slackbots",
    tag = "SlackBots",
    responses((status = 200, description = "List Slack-bot tenants visible to the caller", body = [SlackBotView])),
    security(("bearer_auth" = []))
)]
pub async fn list_slackbots(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Query(query): Query<ListSlackBotsQuery>,
) -> ProxyResult<Json<Vec<SlackBotView>>> {
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
        Some(Platform::Slack),
    )
    .await?;
    Ok(Json(tenants.iter().map(SlackBotView::from).collect()))
}

#[utoipa::path(
    post,
    path = "/api/slackbots",
    tag = "SlackBots",
    request_body = CreateSlackBotRequest,
    responses((status = 200, description = "Slack-bot tenant created", body = SlackBotSecretView)),
    security(("bearer_auth" = []))
)]
pub async fn create_slackbot(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Json(req): Json<CreateSlackBotRequest>,
) -> ProxyResult<Json<SlackBotSecretView>> {
    let now = chrono::Utc::now();
    let secret = crate::store::generate_hex_secret();

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
            .unwrap_or_else(|| "X-Slack-Signature".to_string()),
        signature_type: SignatureType::Sha256,
        platform: PlatformConfig::Slack(req.slack),
        triggers: req.triggers,
        default_session_config: req.default_session_config,
        max_sessions: req.max_sessions,
        created_at: now,
        updated_at: now,
        delivery_count: 0,
        last_delivery: None,
    };

    let created = state.store.create(tenant).await?;
    Ok(Json(SlackBotSecretView {
        bot: SlackBotView::from(&created),
        secret,
    }))
}

#[utoipa::path(
    get,
    path = "/api/slackbots/{id}",
    tag = "SlackBots",
    responses((status = 200, description = "Slack-bot tenant detail", body = SlackBotView)),
    security(("bearer_auth" = []))
)]
pub async fn get_slackbot(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<String>,
) -> ProxyResult<Json<SlackBotView>> {
    let tenant = state.store.get(&id).await?;
    authorize(&principal, &tenant)?;
    Ok(Json(SlackBotView::from(&tenant)))
}

#[utoipa::path(
    put,
    path = "/api/slackbots/{id}",
    tag = "SlackBots",
    request_body = UpdateSlackBotRequest,
    responses((status = 200, description = "Slack-bot tenant updated", body = SlackBotView)),
    security(("bearer_auth" = []))
)]
pub async fn update_slackbot(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<String>,
    Json(req): Json<UpdateSlackBotRequest>,
) -> ProxyResult<Json<SlackBotView>> {
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
            if let Some(slack) = req.slack {
                t.platform = PlatformConfig::Slack(slack);
            }
            if let Some(header) = req.signature_header {
                t.signature_header = header;
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
    Ok(Json(SlackBotView::from(&updated)))
}

#[utoipa::path(
    delete,
    path = "/api/slackbots/{id}",
    tag = "SlackBots",
    responses((status = 204, description = "Slack-bot tenant deleted")),
    security(("bearer_auth" = []))
)]
pub async fn delete_slackbot(
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
    path = "/api/slackbots/{id}/secret",
    tag = "SlackBots",
    responses((status = 200, description = "Secret regenerated", body = SlackBotSecretView)),
    security(("bearer_auth" = []))
)]
pub async fn regenerate_secret(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<String>,
) -> ProxyResult<Json<SlackBotSecretView>> {
    let existing = state.store.get(&id).await?;
    authorize(&principal, &existing)?;
    let updated = state.store.regenerate_secret(&id).await?;
    let secret = updated.secret.clone();
    Ok(Json(SlackBotSecretView {
        bot: SlackBotView::from(&updated),
        secret,
    }))
}

#[derive(Deserialize, ToSchema)]
pub struct DryRunSlackTriggerRequest {
    pub event_type: String,
    pub payload: serde_json::Value,
}

#[derive(Serialize, ToSchema)]
pub struct DryRunSlackTriggerResponse {
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
    path = "/api/slackbots/{id}/trigger",
    tag = "SlackBots",
    request_body = DryRunSlackTriggerRequest,
    responses((status = 200, description = "Matcher result for a sample Slack event, with no session created", body = DryRunSlackTriggerResponse)),
    security(("bearer_auth" = []))
)]
pub async fn dry_run_trigger(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<String>,
    Json(req): Json<DryRunSlackTriggerRequest>,
) -> ProxyResult<Json<DryRunSlackTriggerResponse>> {
    let tenant = state.store.get(&id).await?;
    authorize(&principal, &tenant)?;

    let mut payload = req.payload;
    if let Some(obj) = payload.as_object_mut() {
        obj.entry("type")
            .or_insert_with(|| serde_json::Value::String(req.event_type.clone()));
    }
    let body = serde_json::to_vec(&payload)
        .map_err(|e| ProxyError::Internal(format!("failed to re-encode dry-run payload: {e}")))?;
    let envelope = parse_slack(&id, &body)?;

    match match_trigger(&tenant, &envelope) {
        Some(matched) => Ok(Json(DryRunSlackTriggerResponse {
            matched: true,
            trigger_id: Some(matched.trigger.id),
            initial_message: Some(matched.initial_message),
            reuse_message: matched.reuse_message,
            reuse_session: matched.reuse_session,
            tags: matched.tags,
            environment: matched.environment,
        })),
        None => Ok(Json(DryRunSlackTriggerResponse {
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
