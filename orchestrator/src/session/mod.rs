pub mod backend;
pub mod fingerprint;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::ProxyError;
use crate::model::{Session, SessionStatus, Tenant, TenantScope};
use backend::{SessionBackend, SessionHandle, StartParams};

struct SessionEntry {
    session: Session,
    handle: SessionHandle,
    /// Timestamp of the last successful health ping, or of the session's
    /// creation if it has never been pinged yet. Consulted by the
    /// background health monitor to decide when an unresponsive `active`
    /// session has exceeded `ping_timeout` (spec.md §4.6, §5).
    last_ping_at: DateTime<Utc>,
}

/// Owns the live session registry and drives each session's lifecycle
/// state machine (spec.md §4.6). A per-tenant mutex serializes the
/// concurrency-cap check against concurrent reuse/create decisions for
/// the same tenant, while the registry lock only needs to be held for the
/// HashMap mutation itself (spec.md §5 "map-of-mutexes").
pub struct SessionManager {
    backend: Arc<dyn SessionBackend>,
    sessions: RwLock<HashMap<Uuid, SessionEntry>>,
    tenant_locks: RwLock<HashMap<String, Arc<Mutex<()>>>>,
    ping_interval: Duration,
    ping_timeout: Duration,
    bootstrap_timeout: Duration,
    /// Cancelled on proxy shutdown (spec.md §9 "Cancellation plumbing"): the
    /// health monitor loop and an in-flight bootstrap both observe it so
    /// shutdown can interrupt them instead of waiting out a full sleep.
    shutdown: CancellationToken,
}

/// Outcome of a create-or-reuse decision, returned to the receiver so it
/// can pick the right message template (spec.md §4.4, §4.6).
pub struct SessionOutcome {
    pub session: Session,
    pub reused: bool,
}

impl SessionManager {
    pub fn new(
        backend: Arc<dyn SessionBackend>,
        ping_interval: Duration,
        ping_timeout: Duration,
        bootstrap_timeout: Duration,
    ) -> Self {
        Self {
            backend,
            sessions: RwLock::new(HashMap::new()),
            tenant_locks: RwLock::new(HashMap::new()),
            ping_interval,
            ping_timeout,
            bootstrap_timeout,
            shutdown: CancellationToken::new(),
        }
    }

    async fn tenant_lock(&self, tenant_id: &str) -> Arc<Mutex<()>> {
        if let Some(lock) = self.tenant_locks.read().await.get(tenant_id) {
            return lock.clone();
        }
        let mut locks = self.tenant_locks.write().await;
        locks
            .entry(tenant_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn active_count(&self, tenant_id: &str) -> i64 {
        self.sessions
            .read()
            .await
            .values()
            .filter(|e| e.session.tenant_id == tenant_id && !e.session.status.is_terminal())
            .count() as i64
    }

    /// Sessions eligible for fingerprint reuse are limited to `active` and
    /// `starting` (spec.md §4.6): a `terminating` session is already being
    /// torn down and must not be handed back to a new delivery.
    async fn find_by_fingerprint(&self, tenant_id: &str, fingerprint: &str) -> Option<Session> {
        self.sessions
            .read()
            .await
            .values()
            .find(|e| {
                e.session.tenant_id == tenant_id
                    && matches!(e.session.status, SessionStatus::Active | SessionStatus::Starting)
                    && e.session.fingerprint.as_deref() == Some(fingerprint)
            })
            .map(|e| e.session.clone())
    }

    /// Reuse an existing session matching `fingerprint` when the trigger
    /// opts in, otherwise create a new one bounded by the tenant's
    /// effective `max_sessions` cap (spec.md §4.6, §5). The per-tenant
    /// mutex guarantees the cap check and the registry insert are atomic
    /// with respect to other deliveries for the same tenant.
    pub async fn create_or_reuse(
        &self,
        tenant: &Tenant,
        owner_user_id: &str,
        scope: TenantScope,
        reuse_session: bool,
        fingerprint: Option<String>,
        tags: HashMap<String, String>,
        environment: HashMap<String, String>,
        default_max_sessions: i64,
        initial_message: Option<String>,
    ) -> Result<SessionOutcome, ProxyError> {
        let tenant_lock = self.tenant_lock(&tenant.id).await;
        let _guard = tenant_lock.lock().await;

        if reuse_session {
            if let Some(fp) = &fingerprint {
                if let Some(existing) = self.find_by_fingerprint(&tenant.id, fp).await {
                    return Ok(SessionOutcome {
                        session: existing,
                        reused: true,
                    });
                }
            }
        }

        let cap = tenant.effective_max_sessions(default_max_sessions);
        if self.active_count(&tenant.id).await >= cap {
            return Err(ProxyError::CapacityExhausted);
        }

        let id = Uuid::new_v4();
        let now = Utc::now();
        let session = Session {
            id,
            tenant_id: tenant.id.clone(),
            status: SessionStatus::Pending,
            owner_user_id: owner_user_id.to_string(),
            scope,
            tags,
            started_at: now,
            updated_at: now,
            address: None,
            fingerprint,
        };

        self.sessions.write().await.insert(
            id,
            SessionEntry {
                session: session.clone(),
                handle: SessionHandle::Unmanaged,
                last_ping_at: now,
            },
        );

        self.bootstrap(id, tenant.id.clone(), environment, initial_message)
            .await?;

        let session = self
            .sessions
            .read()
            .await
            .get(&id)
            .map(|e| e.session.clone())
            .ok_or_else(|| ProxyError::Internal("session vanished during bootstrap".into()))?;

        Ok(SessionOutcome {
            session,
            reused: false,
        })
    }

    /// Drive `pending -> starting -> {active, failed}` (spec.md §4.6): ask
    /// the backend to start the process, then poll its health endpoint
    /// until the first success or `bootstrap_timeout` elapses.
    async fn bootstrap(
        &self,
        id: Uuid,
        tenant_id: String,
        environment: HashMap<String, String>,
        initial_message: Option<String>,
    ) -> Result<(), ProxyError> {
        self.transition(id, SessionStatus::Starting).await?;

        let started = match self
            .backend
            .start(StartParams {
                session_id: id,
                tenant_id,
                environment,
                initial_message,
            })
            .await
        {
            Ok(started) => started,
            Err(e) => {
                self.transition(id, SessionStatus::Failed).await.ok();
                return Err(e);
            }
        };

        {
            let mut sessions = self.sessions.write().await;
            if let Some(entry) = sessions.get_mut(&id) {
                entry.session.address = Some(started.address.clone());
                entry.handle = started.handle;
            }
        }

        let deadline = tokio::time::Instant::now() + self.bootstrap_timeout;
        loop {
            if self.backend.ping(&started.address).await {
                self.transition(id, SessionStatus::Active).await?;
                if let Some(entry) = self.sessions.write().await.get_mut(&id) {
                    entry.last_ping_at = Utc::now();
                }
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                self.transition(id, SessionStatus::Failed).await.ok();
                return Err(ProxyError::Internal(
                    "session failed to become healthy before bootstrap timeout".into(),
                ));
            }
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    self.transition(id, SessionStatus::Failed).await.ok();
                    return Err(ProxyError::Internal(
                        "proxy shutdown requested during session bootstrap".into(),
                    ));
                }
                _ = tokio::time::sleep(self.ping_interval) => {}
            }
        }
    }

    /// Background loop driving `active -> terminating -> failed` whenever a
    /// session misses every health ping for longer than `ping_timeout`
    /// (spec.md §4.6, §5). Intended to run for the lifetime of the process
    /// as a spawned task; a single unresponsive session never blocks the
    /// sweep of the rest.
    pub async fn run_health_monitor(&self) {
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => return,
                _ = tokio::time::sleep(self.ping_interval) => {}
            }

            let candidates: Vec<(Uuid, String, DateTime<Utc>)> = self
                .sessions
                .read()
                .await
                .values()
                .filter(|e| e.session.status == SessionStatus::Active)
                .filter_map(|e| {
                    e.session
                        .address
                        .clone()
                        .map(|address| (e.session.id, address, e.last_ping_at))
                })
                .collect();

            for (id, address, last_ping_at) in candidates {
                if self.backend.ping(&address).await {
                    if let Some(entry) = self.sessions.write().await.get_mut(&id) {
                        entry.last_ping_at = Utc::now();
                    }
                    continue;
                }

                let unresponsive_for = Utc::now().signed_duration_since(last_ping_at);
                if unresponsive_for.to_std().unwrap_or(Duration::ZERO) < self.ping_timeout {
                    continue;
                }

                tracing::warn!(session_id = %id, "session missed ping_timeout, marking terminating");
                if self.transition(id, SessionStatus::Terminating).await.is_err() {
                    continue;
                }

                let mut sessions = self.sessions.write().await;
                if let Some(entry) = sessions.get_mut(&id) {
                    if let Err(e) = self.backend.cancel(&mut entry.handle).await {
                        tracing::warn!(session_id = %id, error = %e, "failed to cancel unresponsive session");
                    }
                    if let Err(e) = entry.session.transition(SessionStatus::Failed) {
                        tracing::warn!(session_id = %id, error = %e, "failed to transition unresponsive session to failed");
                    }
                }
            }
        }
    }

    async fn transition(&self, id: Uuid, next: SessionStatus) -> Result<(), ProxyError> {
        let mut sessions = self.sessions.write().await;
        let entry = sessions
            .get_mut(&id)
            .ok_or_else(|| ProxyError::NotFound(format!("session {id} not found")))?;
        entry.session.transition(next)
    }

    pub async fn get(&self, id: Uuid) -> Result<Session, ProxyError> {
        self.sessions
            .read()
            .await
            .get(&id)
            .map(|e| e.session.clone())
            .ok_or_else(|| ProxyError::NotFound(format!("session {id} not found")))
    }

    pub async fn list(&self, tenant_id: Option<&str>) -> Vec<Session> {
        self.sessions
            .read()
            .await
            .values()
            .filter(|e| tenant_id.map(|t| e.session.tenant_id == t).unwrap_or(true))
            .map(|e| e.session.clone())
            .collect()
    }

    /// Cancel an active session. Already-terminal sessions are a no-op
    /// (cancelling twice, or cancelling a session that already failed, is
    /// not an error); cancelling a session still bootstrapping is,
    /// because there is no running process yet to tear down cleanly
    /// (spec.md §4.6).
    pub async fn cancel(&self, id: Uuid) -> Result<(), ProxyError> {
        let status = {
            let sessions = self.sessions.read().await;
            sessions
                .get(&id)
                .map(|e| e.session.status)
                .ok_or_else(|| ProxyError::NotFound(format!("session {id} not found")))?
        };

        match status {
            SessionStatus::Stopped | SessionStatus::Failed | SessionStatus::Terminating => {
                return Ok(())
            }
            SessionStatus::Pending | SessionStatus::Starting => {
                return Err(ProxyError::Conflict(
                    "cannot cancel a session that has not become active".into(),
                ))
            }
            SessionStatus::Active => {}
        }

        self.transition(id, SessionStatus::Terminating).await?;

        let mut sessions = self.sessions.write().await;
        if let Some(entry) = sessions.get_mut(&id) {
            self.backend.cancel(&mut entry.handle).await?;
            entry.session.transition(SessionStatus::Stopped)?;
        }
        Ok(())
    }

    /// Deliver an incremental message to a reused session's downstream
    /// agent API (spec.md §4.6). Best-effort from the receiver's point of
    /// view: a failure here does not unwind the reuse decision itself.
    pub async fn send_message(&self, id: Uuid, message: &str) -> Result<(), ProxyError> {
        let address = {
            let sessions = self.sessions.read().await;
            sessions
                .get(&id)
                .and_then(|e| e.session.address.clone())
                .ok_or_else(|| ProxyError::NotFound(format!("session {id} not found")))?
        };
        self.backend.send_message(&address, message).await
    }

    /// Best-effort graceful shutdown: cancel every non-terminal session,
    /// waiting up to `deadline` for the cancellations to land before
    /// abandoning the rest (spec.md §5 "drain on shutdown").
    pub async fn shutdown(&self, deadline: Duration) {
        self.shutdown.cancel();

        let ids: Vec<Uuid> = self
            .sessions
            .read()
            .await
            .values()
            .filter(|e| !e.session.status.is_terminal())
            .map(|e| e.session.id)
            .collect();

        let drain = async {
            for id in ids {
                if let Err(e) = self.cancel(id).await {
                    tracing::warn!(session_id = %id, error = %e, "failed to cancel session during shutdown");
                }
            }
        };

        if tokio::time::timeout(deadline, drain).await.is_err() {
            tracing::warn!("shutdown drain deadline exceeded, abandoning remaining sessions");
        }
    }
}
