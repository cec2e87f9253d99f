pub mod custom;
pub mod github;
pub mod slack;

use std::collections::HashMap;
use std::sync::Arc;

use axum::Json;
use serde::Serialize;
use serde_json::Value;

use crate::error::ProxyResult;
use crate::matcher;
use crate::model::{DeliveryRecord, DeliveryStatus, Platform, SessionConfig, Tenant, Trigger};
use crate::payload::Envelope;
use crate::session::fingerprint;
use crate::template::{self, TemplateData};
use crate::AppState;

/// JSON body returned by every receiver endpoint for a syntactically valid
/// delivery, whether or not it produced a session (spec.md §4.7 step 9:
/// "always including the tenant ID and matched trigger ID when known").
#[derive(Serialize)]
pub struct DeliveryResponse {
    pub message: String,
    pub tenant_id: Option<String>,
    pub trigger_id: Option<String>,
    pub session_id: Option<String>,
    pub session_reused: Option<bool>,
}

impl DeliveryResponse {
    fn no_match(tenant_id: &str) -> Self {
        Self {
            message: "No matching trigger".to_string(),
            tenant_id: Some(tenant_id.to_string()),
            trigger_id: None,
            session_id: None,
            session_reused: None,
        }
    }
}

/// The inputs a matched trigger renders, shared between the live receiver
/// path and the dry-run management endpoint (spec.md §4.7 "Dry-run path").
pub struct MatchedTriggerInputs {
    pub trigger: Trigger,
    pub tags: HashMap<String, String>,
    pub environment: HashMap<String, String>,
    pub initial_message: String,
    pub reuse_message: Option<String>,
    pub reuse_session: bool,
    pub fingerprint: Option<String>,
}

/// Run the matcher against a tenant's trigger list and, on a hit, render
/// tags/environment/messages for the winning trigger (spec.md §4.3, §4.4).
pub fn match_trigger(tenant: &Tenant, envelope: &Envelope) -> Option<MatchedTriggerInputs> {
    let trigger = matcher::find_match(&tenant.triggers, envelope)?.clone();
    let session_config = trigger
        .session_config
        .clone()
        .unwrap_or_else(|| tenant.default_session_config.clone());

    let tags = build_tags(tenant, &trigger, envelope, &session_config);
    let environment = build_environment(envelope, &session_config);
    let (initial_message, reuse_message) = render_messages(envelope, &session_config);

    let fingerprint = session_config.reuse_session.then(|| {
        fingerprint::compute(
            &tenant.id,
            &trigger.id,
            envelope.repository_or_channel().as_deref(),
            envelope.subject_key().as_deref(),
        )
    });

    Some(MatchedTriggerInputs {
        trigger,
        tags,
        environment,
        initial_message,
        reuse_message,
        reuse_session: session_config.reuse_session,
        fingerprint,
    })
}

fn build_tags(
    tenant: &Tenant,
    trigger: &Trigger,
    envelope: &Envelope,
    session_config: &SessionConfig,
) -> HashMap<String, String> {
    let mut tags = session_config.tags.clone();
    tags.insert("tenant_id".to_string(), tenant.id.clone());
    tags.insert("trigger_id".to_string(), trigger.id.clone());

    match envelope.platform {
        Platform::GitHub => {
            tags.insert("github_event".to_string(), envelope.event_type.clone());
            if let Some(action) = &envelope.action {
                tags.insert("github_action".to_string(), action.clone());
            }
            if let Some(repo) = &envelope.repository {
                tags.insert("repository".to_string(), repo.full_name.clone());
            }
        }
        Platform::Slack => {
            tags.insert("slack_event_type".to_string(), envelope.event_type.clone());
            if let Some(channel) = &envelope.channel_id {
                tags.insert("channel_id".to_string(), channel.clone());
            }
        }
        Platform::Custom => {
            tags.insert("custom_event_type".to_string(), envelope.event_type.clone());
        }
    }
    tags
}

fn build_environment(
    envelope: &Envelope,
    session_config: &SessionConfig,
) -> HashMap<String, String> {
    let mut env = session_config.environment.clone();
    if session_config.mount_payload {
        env.insert(
            "AGENTAPI_PAYLOAD".to_string(),
            envelope.raw_payload.to_string(),
        );
    }
    env
}

fn render_messages(
    envelope: &Envelope,
    session_config: &SessionConfig,
) -> (String, Option<String>) {
    let data = TemplateData::from_envelope(envelope);

    let initial = session_config
        .initial_message_template
        .as_deref()
        .and_then(|tpl| template::render(tpl, &data).ok())
        .unwrap_or_else(|| default_message(envelope));

    let reuse = session_config
        .reuse_message_template
        .as_deref()
        .map(|tpl| template::render(tpl, &data).unwrap_or_else(|_| default_message(envelope)));

    (initial, reuse)
}

fn default_message(envelope: &Envelope) -> String {
    match envelope.platform {
        Platform::GitHub => template::render_default_github(envelope),
        Platform::Slack | Platform::Custom => {
            format!("[{}] event received", envelope.event_type)
        }
    }
}

/// Shared matcher → session-manager → delivery-record pipeline used by
/// every receiver once a tenant has passed signature verification (spec.md
/// §4.7 steps 7-9).
pub(crate) async fn dispatch(
    state: &Arc<AppState>,
    tenant: &Tenant,
    envelope: &Envelope,
) -> ProxyResult<Json<Value>> {
    dispatch_with_retry(state, tenant, envelope, None, None).await
}

/// Slack-specific variant that also records `X-Slack-Retry-Num`/
/// `X-Slack-Retry-Reason` on the resulting delivery record.
pub(crate) async fn dispatch_with_retry(
    state: &Arc<AppState>,
    tenant: &Tenant,
    envelope: &Envelope,
    retry_num: Option<i64>,
    retry_reason: Option<String>,
) -> ProxyResult<Json<Value>> {
    let Some(matched) = match_trigger(tenant, envelope) else {
        record_delivery(
            state,
            tenant,
            envelope.delivery_id.clone(),
            DeliveryStatus::Skipped,
            None,
            None,
            None,
            false,
            retry_num,
            retry_reason,
        )
        .await;
        return Ok(to_json(DeliveryResponse::no_match(&tenant.id)));
    };

    let outcome = state
        .sessions
        .create_or_reuse(
            tenant,
            &tenant.owner_user_id,
            tenant.scope.clone(),
            matched.reuse_session,
            matched.fingerprint,
            matched.tags,
            matched.environment,
            state.config.default_max_sessions,
            Some(matched.initial_message),
        )
        .await;

    match outcome {
        Ok(outcome) => {
            if outcome.reused {
                if let Some(message) = &matched.reuse_message {
                    if let Err(e) = state.sessions.send_message(outcome.session.id, message).await {
                        tracing::warn!(
                            session_id = %outcome.session.id,
                            error = %e,
                            "failed to deliver reuse message to session"
                        );
                    }
                }
            }

            record_delivery(
                state,
                tenant,
                envelope.delivery_id.clone(),
                DeliveryStatus::Processed,
                Some(matched.trigger.id.clone()),
                Some(outcome.session.id.to_string()),
                None,
                outcome.reused,
                retry_num,
                retry_reason,
            )
            .await;

            Ok(to_json(DeliveryResponse {
                message: "processed".to_string(),
                tenant_id: Some(tenant.id.clone()),
                trigger_id: Some(matched.trigger.id.clone()),
                session_id: Some(outcome.session.id.to_string()),
                session_reused: Some(outcome.reused),
            }))
        }
        Err(e) => {
            record_delivery(
                state,
                tenant,
                envelope.delivery_id.clone(),
                DeliveryStatus::Failed,
                Some(matched.trigger.id.clone()),
                None,
                Some(e.to_string()),
                false,
                retry_num,
                retry_reason,
            )
            .await;

            Ok(to_json(DeliveryResponse {
                message: e.to_string(),
                tenant_id: Some(tenant.id.clone()),
                trigger_id: Some(matched.trigger.id.clone()),
                session_id: None,
                session_reused: None,
            }))
        }
    }
}

fn to_json(response: DeliveryResponse) -> Json<Value> {
    Json(serde_json::to_value(response).unwrap_or(Value::Null))
}

/// Every delivery produces exactly one delivery record (spec.md §7). Store
/// errors are logged rather than surfaced, since the outer delivery
/// response has already been decided.
async fn record_delivery(
    state: &Arc<AppState>,
    tenant: &Tenant,
    delivery_id: String,
    status: DeliveryStatus,
    matched_trigger_id: Option<String>,
    session_id: Option<String>,
    error: Option<String>,
    session_reused: bool,
    retry_num: Option<i64>,
    retry_reason: Option<String>,
) {
    let record = DeliveryRecord {
        id: delivery_id,
        received_at: chrono::Utc::now(),
        status,
        matched_trigger_id,
        session_id,
        error,
        session_reused,
        retry_num,
        retry_reason,
    };
    if let Err(e) = state.store.record_delivery(&tenant.id, record).await {
        tracing::error!(tenant_id = %tenant.id, error = %e, "failed to record delivery");
    }
}

/// Select the first candidate tenant whose secret validates the raw body
/// (spec.md §4.7 step 6).
pub(crate) fn select_by_signature<'a>(
    candidates: &'a [Tenant],
    body: &[u8],
    header_lookup: impl Fn(&Tenant) -> Option<String>,
) -> Option<&'a Tenant> {
    candidates.iter().find(|tenant| {
        let Some(header_value) = header_lookup(tenant) else {
            return false;
        };
        match tenant.signature_type {
            crate::model::SignatureType::Sha256 | crate::model::SignatureType::Sha1 => {
                crate::signature::verify(body, &header_value, &tenant.secret)
            }
            crate::model::SignatureType::StaticToken => {
                crate::signature::verify_static_token(&header_value, &tenant.secret)
            }
        }
    })
}
