pub mod backend;

use std::sync::Arc;

use chrono::Utc;
use rand::RngCore;
use tokio::sync::RwLock;

use crate::error::ProxyError;
use crate::model::{DeliveryRecord, Platform, Tenant, TenantFilter, TenantStatus};
use backend::SecretBackend;

#[derive(Debug, serde::Serialize, serde::Deserialize, Default)]
struct Registry {
    webhooks: Vec<Tenant>,
}

/// Transactional load/save of the tenant registry over a shared blob-
/// valued key in an external secret store (spec.md §4.5). A process-wide
/// readers-writer lock wraps each logical operation: reads take the
/// shared guard, writes take the exclusive guard and perform
/// load→mutate→save as a single critical section, giving read-modify-
/// write atomicity within this process. Between processes the blob is
/// the sole coordination point — last writer wins (spec.md §9 notes CAS
/// as preferable where the backing store supports it; this backend
/// contract does not, so unconditional overwrite is used).
pub struct TenantStore {
    backend: Arc<dyn SecretBackend>,
    namespace: String,
    key: String,
    lock: RwLock<()>,
}

impl TenantStore {
    pub fn new(backend: Arc<dyn SecretBackend>, namespace: String, key: String) -> Self {
        Self {
            backend,
            namespace,
            key,
            lock: RwLock::new(()),
        }
    }

    async fn load(&self) -> Result<Registry, ProxyError> {
        match self.backend.get_blob(&self.namespace, &self.key).await? {
            None => Ok(Registry::default()),
            Some(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| ProxyError::Internal(format!("corrupt registry blob: {e}"))),
        }
    }

    async fn save(&self, registry: &Registry) -> Result<(), ProxyError> {
        let bytes = serde_json::to_vec(registry)
            .map_err(|e| ProxyError::Internal(format!("failed to encode registry: {e}")))?;
        self.backend.put_blob(&self.namespace, &self.key, bytes).await
    }

    pub async fn create(&self, tenant: Tenant) -> Result<Tenant, ProxyError> {
        tenant.validate()?;
        let _guard = self.lock.write().await;
        let mut registry = self.load().await?;
        if registry.webhooks.iter().any(|t| t.id == tenant.id) {
            return Err(ProxyError::Conflict(format!(
                "tenant {} already exists",
                tenant.id
            )));
        }
        registry.webhooks.push(tenant.clone());
        self.save(&registry).await?;
        Ok(tenant)
    }

    pub async fn get(&self, id: &str) -> Result<Tenant, ProxyError> {
        let _guard = self.lock.read().await;
        let registry = self.load().await?;
        registry
            .webhooks
            .into_iter()
            .find(|t| t.id == id)
            .ok_or_else(|| ProxyError::NotFound(format!("tenant {id} not found")))
    }

    pub async fn list(&self, filter: &TenantFilter) -> Result<Vec<Tenant>, ProxyError> {
        let _guard = self.lock.read().await;
        let registry = self.load().await?;
        Ok(registry
            .webhooks
            .into_iter()
            .filter(|t| filter.matches(t))
            .collect())
    }

    pub async fn update(&self, id: &str, mutate: impl FnOnce(&mut Tenant)) -> Result<Tenant, ProxyError> {
        let _guard = self.lock.write().await;
        let mut registry = self.load().await?;
        let tenant = registry
            .webhooks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| ProxyError::NotFound(format!("tenant {id} not found")))?;
        mutate(tenant);
        tenant.updated_at = Utc::now();
        tenant.validate()?;
        let updated = tenant.clone();
        self.save(&registry).await?;
        Ok(updated)
    }

    pub async fn delete(&self, id: &str) -> Result<(), ProxyError> {
        let _guard = self.lock.write().await;
        let mut registry = self.load().await?;
        let before = registry.webhooks.len();
        registry.webhooks.retain(|t| t.id != id);
        if registry.webhooks.len() == before {
            return Err(ProxyError::NotFound(format!("tenant {id} not found")));
        }
        self.save(&registry).await?;
        Ok(())
    }

    /// Active tenants whose platform allow-lists admit the event's
    /// `(enterprise-host, event, repository/channel)` tuple, or whose
    /// allow-lists are empty (spec.md §4.5).
    pub async fn find_candidates_for_platform(
        &self,
        platform: Platform,
        enterprise_host: Option<&str>,
        event_type: &str,
        repo_or_channel: Option<&str>,
    ) -> Result<Vec<Tenant>, ProxyError> {
        let _guard = self.lock.read().await;
        let registry = self.load().await?;
        Ok(registry
            .webhooks
            .into_iter()
            .filter(|t| t.status == TenantStatus::Active)
            .filter(|t| t.platform.platform() == platform)
            .filter(|t| platform_admits(t, enterprise_host, event_type, repo_or_channel))
            .collect())
    }

    /// Single-tenant counterpart to `find_candidates_for_platform`, used by
    /// receivers that address a tenant directly by path ID (the Slack and
    /// Custom endpoints, spec.md §6 `/hooks/slack/:id`, `/hooks/custom/:id`)
    /// but must still honor the `active` status and allow-list filters that
    /// gate candidacy (spec.md §4.5).
    pub async fn get_candidate(
        &self,
        id: &str,
        platform: Platform,
        enterprise_host: Option<&str>,
        event_type: &str,
        repo_or_channel: Option<&str>,
    ) -> Result<Option<Tenant>, ProxyError> {
        let _guard = self.lock.read().await;
        let registry = self.load().await?;
        Ok(registry
            .webhooks
            .into_iter()
            .find(|t| t.id == id)
            .filter(|t| t.status == TenantStatus::Active)
            .filter(|t| t.platform.platform() == platform)
            .filter(|t| platform_admits(t, enterprise_host, event_type, repo_or_channel)))
    }

    pub async fn regenerate_secret(&self, id: &str) -> Result<Tenant, ProxyError> {
        let new_secret = generate_hex_secret();
        self.update(id, |t| t.secret = new_secret.clone()).await
    }

    pub async fn record_delivery(&self, id: &str, record: DeliveryRecord) -> Result<Tenant, ProxyError> {
        self.update(id, |t| {
            t.delivery_count += 1;
            t.last_delivery = Some(record);
        })
        .await
    }
}

fn platform_admits(
    tenant: &Tenant,
    enterprise_host: Option<&str>,
    event_type: &str,
    repo_or_channel: Option<&str>,
) -> bool {
    use crate::model::PlatformConfig;
    match &tenant.platform {
        PlatformConfig::GitHub(cfg) => {
            let host_ok = match (&cfg.enterprise_host, enterprise_host) {
                (None, _) => true,
                (Some(configured), Some(actual)) => {
                    normalize_host(configured) == normalize_host(actual)
                }
                (Some(_), None) => false,
            };
            let event_ok = cfg.allowed_events.is_empty()
                || cfg.allowed_events.iter().any(|e| e == event_type);
            let repo_ok = cfg.allowed_repositories.is_empty()
                || repo_or_channel
                    .map(|r| {
                        cfg.allowed_repositories
                            .iter()
                            .any(|p| crate::glob_match::repository_matches(p, r))
                    })
                    .unwrap_or(false);
            host_ok && event_ok && repo_ok
        }
        PlatformConfig::Slack(cfg) => {
            let event_ok = cfg.allowed_event_types.is_empty()
                || cfg.allowed_event_types.iter().any(|e| e == event_type);
            let channel_ok = cfg.allowed_channel_ids.is_empty()
                || repo_or_channel
                    .map(|c| cfg.allowed_channel_ids.iter().any(|a| a == c))
                    .unwrap_or(false);
            event_ok && channel_ok
        }
        PlatformConfig::Custom => true,
    }
}

fn normalize_host(host: &str) -> String {
    host.trim().trim_end_matches('/').to_lowercase()
}

pub fn generate_hex_secret() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        GitHubConditions, GitHubPlatformConfig, PlatformConfig, SessionConfig, SignatureType,
        TenantScope, Trigger,
    };
    use backend::InMemorySecretBackend;

    fn sample_tenant(id: &str) -> Tenant {
        Tenant {
            id: id.to_string(),
            name: "demo".to_string(),
            owner_user_id: "user-1".to_string(),
            scope: TenantScope::User,
            status: TenantStatus::Active,
            secret: generate_hex_secret(),
            signature_header: "X-Hub-Signature-256".to_string(),
            signature_type: SignatureType::Sha256,
            platform: PlatformConfig::GitHub(GitHubPlatformConfig::default()),
            triggers: vec![Trigger {
                id: "t1".to_string(),
                name: "t1".to_string(),
                priority: 1,
                enabled: true,
                conditions: crate::model::Conditions::GitHub(GitHubConditions::default()),
                session_config: None,
                stop_on_match: true,
            }],
            default_session_config: SessionConfig::default(),
            max_sessions: 10,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            delivery_count: 0,
            last_delivery: None,
        }
    }

    fn store() -> TenantStore {
        TenantStore::new(
            Arc::new(InMemorySecretBackend::default()),
            "ns".to_string(),
            "agentapi-webhooks".to_string(),
        )
    }

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let store = store();
        store.create(sample_tenant("w1")).await.unwrap();
        let fetched = store.get("w1").await.unwrap();
        assert_eq!(fetched.id, "w1");
    }

    #[tokio::test]
    async fn create_duplicate_fails_with_conflict() {
        let store = store();
        store.create(sample_tenant("w1")).await.unwrap();
        let err = store.create(sample_tenant("w1")).await.unwrap_err();
        assert!(matches!(err, ProxyError::Conflict(_)));
    }

    #[tokio::test]
    async fn get_missing_fails_with_not_found() {
        let store = store();
        let err = store.get("missing").await.unwrap_err();
        assert!(matches!(err, ProxyError::NotFound(_)));
    }

    #[tokio::test]
    async fn update_refreshes_updated_at() {
        let store = store();
        let created = store.create(sample_tenant("w1")).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let updated = store
            .update("w1", |t| t.name = "renamed".to_string())
            .await
            .unwrap();
        assert_eq!(updated.name, "renamed");
        assert!(updated.updated_at > created.updated_at);
    }

    #[tokio::test]
    async fn delete_missing_fails_with_not_found() {
        let store = store();
        let err = store.delete("missing").await.unwrap_err();
        assert!(matches!(err, ProxyError::NotFound(_)));
    }

    #[tokio::test]
    async fn find_candidates_respects_empty_allow_lists() {
        let store = store();
        store.create(sample_tenant("w1")).await.unwrap();
        let candidates = store
            .find_candidates_for_platform(Platform::GitHub, None, "pull_request", Some("acme/widgets"))
            .await
            .unwrap();
        assert_eq!(candidates.len(), 1);
    }

    #[tokio::test]
    async fn find_candidates_excludes_paused_tenants() {
        let store = store();
        let mut tenant = sample_tenant("w1");
        tenant.status = TenantStatus::Paused;
        store.create(tenant).await.unwrap();
        let candidates = store
            .find_candidates_for_platform(Platform::GitHub, None, "pull_request", Some("acme/widgets"))
            .await
            .unwrap();
        assert!(candidates.is_empty());
    }

    #[tokio::test]
    async fn regenerate_secret_changes_value_and_keeps_id() {
        let store = store();
        let created = store.create(sample_tenant("w1")).await.unwrap();
        let updated = store.regenerate_secret("w1").await.unwrap();
        assert_eq!(updated.id, created.id);
        assert_ne!(updated.secret, created.secret);
    }

    #[tokio::test]
    async fn record_delivery_increments_counter() {
        let store = store();
        store.create(sample_tenant("w1")).await.unwrap();
        let updated = store
            .record_delivery(
                "w1",
                DeliveryRecord {
                    id: "d1".to_string(),
                    received_at: Utc::now(),
                    status: crate::model::DeliveryStatus::Processed,
                    matched_trigger_id: Some("t1".to_string()),
                    session_id: Some("s1".to_string()),
                    error: None,
                    session_reused: false,
                    retry_num: None,
                    retry_reason: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.delivery_count, 1);
        assert!(updated.last_delivery.is_some());
    }
}
