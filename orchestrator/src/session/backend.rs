use std::collections::HashSet;
use std::ops::Range;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Child;

use crate::error::ProxyError;

/// Parameters the session manager hands to a backend to provision a new
/// sandboxed agent process (spec.md §4.6).
pub struct StartParams {
    pub session_id: uuid::Uuid,
    pub tenant_id: String,
    pub environment: std::collections::HashMap<String, String>,
    pub initial_message: Option<String>,
}

/// What a backend returns once it has launched (but not yet confirmed
/// healthy) a session.
pub struct StartedSession {
    pub address: String,
    pub handle: SessionHandle,
}

/// Opaque handle a backend uses to cancel a session it started. The local
/// backend wraps a child process and its allocated port; other backends
/// (container orchestration, remote API) would carry their own payload
/// behind the same trait object.
pub enum SessionHandle {
    LocalProcess { child: Child, port: u16 },
    Unmanaged,
}

/// Pluggable provisioning/liveness contract for "a process running
/// elsewhere, locally or in a container" (spec.md §1, §4.6). The session
/// manager drives the state machine; the backend only knows how to start,
/// health-check, and tear down.
#[async_trait]
pub trait SessionBackend: Send + Sync {
    async fn start(&self, params: StartParams) -> Result<StartedSession, ProxyError>;

    /// First successful health probe promotes a session from `starting` to
    /// `active` (spec.md §4.6); subsequent failures beyond
    /// `session_ping_timeout` promote `active` to `failed`.
    async fn ping(&self, address: &str) -> bool;

    /// Deliver an incremental message to an already-running session, used
    /// when a delivery reuses a session instead of creating one (spec.md
    /// §4.6 "apply the reuse_message_template as an incremental message").
    async fn send_message(&self, address: &str, message: &str) -> Result<(), ProxyError>;

    async fn cancel(&self, handle: &mut SessionHandle) -> Result<(), ProxyError>;
}

/// Local-process backend: spawns an agent subprocess bound to a port
/// drawn from a fixed range, polls a `/health`-style endpoint over HTTP
/// for liveness, and kills the child on cancel. Grounded in the pack's
/// daemon/host process-lifecycle idiom (spawn, health-probe, terminate).
pub struct LocalProcessBackend {
    command: String,
    args_template: Vec<String>,
    ports: Mutex<PortPool>,
    client: reqwest::Client,
}

struct PortPool {
    range: Range<u16>,
    in_use: HashSet<u16>,
}

impl PortPool {
    fn new(range: Range<u16>) -> Self {
        Self {
            range,
            in_use: HashSet::new(),
        }
    }

    fn allocate(&mut self) -> Option<u16> {
        let port = self.range.clone().find(|p| !self.in_use.contains(p))?;
        self.in_use.insert(port);
        Some(port)
    }

    fn release(&mut self, port: u16) {
        self.in_use.remove(&port);
    }
}

impl LocalProcessBackend {
    pub fn new(command: String, args_template: Vec<String>, port_range: Range<u16>) -> Self {
        Self {
            command,
            args_template,
            ports: Mutex::new(PortPool::new(port_range)),
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(5))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
        }
    }

    fn allocate_port(&self) -> Result<u16, ProxyError> {
        self.ports
            .lock()
            .map_err(|_| ProxyError::Internal("poisoned port pool lock".into()))?
            .allocate()
            .ok_or_else(|| ProxyError::CapacityExhausted)
    }

    fn release_port(&self, port: u16) {
        if let Ok(mut pool) = self.ports.lock() {
            pool.release(port);
        }
    }
}

#[async_trait]
impl SessionBackend for LocalProcessBackend {
    async fn start(&self, params: StartParams) -> Result<StartedSession, ProxyError> {
        let port = self.allocate_port()?;
        let args: Vec<String> = self
            .args_template
            .iter()
            .map(|a| a.replace("{port}", &port.to_string()).replace(
                "{session_id}",
                &params.session_id.to_string(),
            ))
            .collect();

        let mut command = tokio::process::Command::new(&self.command);
        command.args(&args);
        command.envs(&params.environment);
        command.env("AGENTAPI_SESSION_PORT", port.to_string());
        command.kill_on_drop(true);

        let child = command.spawn().map_err(|e| {
            self.release_port(port);
            ProxyError::Internal(format!("failed to spawn session process: {e}"))
        })?;

        Ok(StartedSession {
            address: format!("http://127.0.0.1:{port}"),
            handle: SessionHandle::LocalProcess { child, port },
        })
    }

    async fn ping(&self, address: &str) -> bool {
        let url = format!("{}/status", address.trim_end_matches('/'));
        match self.client.get(&url).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    async fn send_message(&self, address: &str, message: &str) -> Result<(), ProxyError> {
        let url = format!("{}/message", address.trim_end_matches('/'));
        let resp = self
            .client
            .post(&url)
            .json(&serde_json::json!({"content": message, "type": "user"}))
            .send()
            .await
            .map_err(|e| ProxyError::Internal(format!("failed to reach session API: {e}")))?;
        if !resp.status().is_success() {
            return Err(ProxyError::Internal(format!(
                "session API rejected message with {}",
                resp.status()
            )));
        }
        Ok(())
    }

    async fn cancel(&self, handle: &mut SessionHandle) -> Result<(), ProxyError> {
        match handle {
            SessionHandle::LocalProcess { child, port } => {
                let _ = child.start_kill();
                self.release_port(*port);
                Ok(())
            }
            SessionHandle::Unmanaged => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_pool_does_not_reissue_allocated_ports() {
        let mut pool = PortPool::new(9000..9002);
        let a = pool.allocate().unwrap();
        let b = pool.allocate().unwrap();
        assert_ne!(a, b);
        assert!(pool.allocate().is_none());
    }

    #[test]
    fn port_pool_reissues_after_release() {
        let mut pool = PortPool::new(9000..9001);
        let a = pool.allocate().unwrap();
        pool.release(a);
        let b = pool.allocate().unwrap();
        assert_eq!(a, b);
    }
}
