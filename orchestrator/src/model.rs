use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ProxyError;

/// Which platform a tenant receives events from. The matcher, signature
/// verifier, and receivers are all polymorphic over this tag rather than
/// using deep inheritance (spec.md §9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    GitHub,
    Slack,
    Custom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenantStatus {
    Active,
    Paused,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum TenantScope {
    User,
    Team { team_id: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignatureType {
    Sha256,
    Sha1,
    StaticToken,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GitHubPlatformConfig {
    pub enterprise_host: Option<String>,
    #[serde(default)]
    pub allowed_events: Vec<String>,
    #[serde(default)]
    pub allowed_repositories: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SlackPlatformConfig {
    #[serde(default)]
    pub allowed_event_types: Vec<String>,
    #[serde(default)]
    pub allowed_channel_ids: Vec<String>,
}

/// Platform-specific allow-list configuration carried by a tenant, used by
/// the store's `find_candidates_for_platform` to narrow the candidate set
/// before signature verification (spec.md §4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "platform", rename_all = "snake_case")]
pub enum PlatformConfig {
    GitHub(GitHubPlatformConfig),
    Slack(SlackPlatformConfig),
    Custom,
}

impl PlatformConfig {
    pub fn platform(&self) -> Platform {
        match self {
            PlatformConfig::GitHub(_) => Platform::GitHub,
            PlatformConfig::Slack(_) => Platform::Slack,
            PlatformConfig::Custom => Platform::Custom,
        }
    }
}

/// Per-trigger platform-tagged match conditions (spec.md §3, §4.3).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GitHubConditions {
    #[serde(default)]
    pub events: Vec<String>,
    #[serde(default)]
    pub actions: Vec<String>,
    #[serde(default)]
    pub branches: Vec<String>,
    #[serde(default)]
    pub base_branches: Vec<String>,
    #[serde(default)]
    pub repositories: Vec<String>,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub paths: Vec<String>,
    #[serde(default)]
    pub senders: Vec<String>,
    pub draft: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SlackConditions {
    #[serde(default)]
    pub event_types: Vec<String>,
    #[serde(default)]
    pub channel_ids: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CustomConditions {
    /// Template expression evaluated against the raw payload; a truthy
    /// leaf value means the trigger matches (spec.md §4.3).
    pub template: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "platform", rename_all = "snake_case")]
pub enum Conditions {
    GitHub(GitHubConditions),
    Slack(SlackConditions),
    Custom(CustomConditions),
}

impl Conditions {
    pub fn platform(&self) -> Platform {
        match self {
            Conditions::GitHub(_) => Platform::GitHub,
            Conditions::Slack(_) => Platform::Slack,
            Conditions::Custom(_) => Platform::Custom,
        }
    }
}

/// Default session behavior for a tenant or trigger override (spec.md §3).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default)]
    pub environment: HashMap<String, String>,
    #[serde(default)]
    pub tags: HashMap<String, String>,
    pub initial_message_template: Option<String>,
    pub reuse_message_template: Option<String>,
    #[serde(default)]
    pub session_params: HashMap<String, String>,
    #[serde(default)]
    pub reuse_session: bool,
    #[serde(default)]
    pub mount_payload: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trigger {
    pub id: String,
    pub name: String,
    pub priority: i32,
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub conditions: Conditions,
    pub session_config: Option<SessionConfig>,
    #[serde(default)]
    pub stop_on_match: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Processed,
    Skipped,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryRecord {
    pub id: String,
    pub received_at: DateTime<Utc>,
    pub status: DeliveryStatus,
    pub matched_trigger_id: Option<String>,
    pub session_id: Option<String>,
    pub error: Option<String>,
    #[serde(default)]
    pub session_reused: bool,
    /// Slack's `X-Slack-Retry-Num`/`X-Slack-Retry-Reason`, carried through
    /// for operator visibility. Retries are not deduplicated at the
    /// session layer (spec.md §9 Open Questions).
    #[serde(default)]
    pub retry_num: Option<i64>,
    #[serde(default)]
    pub retry_reason: Option<String>,
}

/// A webhook or Slack-bot tenant. Both share this shape; `platform`
/// distinguishes the receiver protocol (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    pub id: String,
    pub name: String,
    pub owner_user_id: String,
    pub scope: TenantScope,
    pub status: TenantStatus,
    /// Hex-encoded 32-byte HMAC secret. Plaintext at rest here because the
    /// surrounding secret store is the confidentiality boundary (spec.md
    /// §6 "Persisted state").
    pub secret: String,
    pub signature_header: String,
    pub signature_type: SignatureType,
    pub platform: PlatformConfig,
    pub triggers: Vec<Trigger>,
    pub default_session_config: SessionConfig,
    pub max_sessions: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub delivery_count: u64,
    pub last_delivery: Option<DeliveryRecord>,
}

impl Tenant {
    /// `max_sessions <= 0` falls back to the default cap (spec.md §3).
    pub fn effective_max_sessions(&self, default_cap: i64) -> i64 {
        if self.max_sessions <= 0 {
            default_cap
        } else {
            self.max_sessions
        }
    }

    pub fn validate(&self) -> Result<(), ProxyError> {
        if self.id.trim().is_empty() {
            return Err(ProxyError::Validation("tenant id must not be empty".into()));
        }
        if self.name.trim().is_empty() {
            return Err(ProxyError::Validation(
                "tenant name must not be empty".into(),
            ));
        }
        if self.triggers.is_empty() {
            return Err(ProxyError::Validation(
                "tenant must declare at least one trigger".into(),
            ));
        }
        if let TenantScope::Team { team_id } = &self.scope {
            if team_id.trim().is_empty() {
                return Err(ProxyError::Validation(
                    "team scope requires a non-empty team id".into(),
                ));
            }
        }
        if self.max_sessions < 0 {
            return Err(ProxyError::Validation(
                "max_sessions must be >= 0".into(),
            ));
        }
        Ok(())
    }

    /// Redacted view of the secret for responses/logs: `****<last-4>`.
    pub fn masked_secret(&self) -> String {
        mask_secret(&self.secret)
    }
}

pub fn mask_secret(secret: &str) -> String {
    if secret.len() <= 4 {
        "****".to_string()
    } else {
        format!("****{}", &secret[secret.len() - 4..])
    }
}

/// Filter predicates for `TenantStore::list` (spec.md §4.5). `user_id`,
/// `status`, `scope`, and `type` (platform) are AND-combined exact
/// matches; `team_ids` is an OR set.
#[derive(Debug, Clone, Default)]
pub struct TenantFilter {
    pub user_id: Option<String>,
    pub status: Option<TenantStatus>,
    pub scope: Option<&'static str>,
    pub platform: Option<Platform>,
    pub team_ids: Vec<String>,
}

impl TenantFilter {
    pub fn matches(&self, tenant: &Tenant) -> bool {
        if let Some(uid) = &self.user_id {
            if &tenant.owner_user_id != uid {
                return false;
            }
        }
        if let Some(status) = self.status {
            if tenant.status != status {
                return false;
            }
        }
        if let Some(scope) = self.scope {
            let matches_scope = match (&tenant.scope, scope) {
                (TenantScope::User, "user") => true,
                (TenantScope::Team { .. }, "team") => true,
                _ => false,
            };
            if !matches_scope {
                return false;
            }
        }
        if let Some(platform) = self.platform {
            if tenant.platform.platform() != platform {
                return false;
            }
        }
        if !self.team_ids.is_empty() {
            let in_team = match &tenant.scope {
                TenantScope::Team { team_id } => self.team_ids.iter().any(|t| t == team_id),
                TenantScope::User => false,
            };
            if !in_team {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Pending,
    Starting,
    Active,
    Terminating,
    Stopped,
    Failed,
}

impl SessionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionStatus::Stopped | SessionStatus::Failed)
    }

    /// Allowed transitions per the state machine in spec.md §4.6.
    pub fn can_transition_to(self, next: SessionStatus) -> bool {
        use SessionStatus::*;
        matches!(
            (self, next),
            (Pending, Starting)
                | (Starting, Active)
                | (Starting, Failed)
                | (Active, Terminating)
                | (Active, Failed)
                | (Terminating, Stopped)
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub tenant_id: String,
    pub status: SessionStatus,
    pub owner_user_id: String,
    pub scope: TenantScope,
    #[serde(default)]
    pub tags: HashMap<String, String>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub address: Option<String>,
    pub fingerprint: Option<String>,
}

impl Session {
    pub fn transition(&mut self, next: SessionStatus) -> Result<(), ProxyError> {
        if !self.status.can_transition_to(next) {
            return Err(ProxyError::Internal(format!(
                "illegal session transition {:?} -> {:?}",
                self.status, next
            )));
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }
}
