use std::time::Duration;

/// Resolved configuration for the orchestrator process.
///
/// Loaded once at startup from environment variables (optionally populated
/// by a `.env` file via `dotenvy`), mirroring the teacher's pattern of
/// reading `std::env::var(...).unwrap_or_else(...)` directly into an
/// `AppState`-adjacent struct rather than a config-file DSL — the CLI
/// front-end owns the richer TOML config surface.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_address: String,
    pub default_signature_header: String,
    pub default_max_sessions: i64,
    pub secret_store_namespace: String,
    pub registry_key: String,
    pub session_ping_interval: Duration,
    pub session_ping_timeout: Duration,
    pub session_bootstrap_timeout: Duration,
    pub shutdown_drain_deadline: Duration,
    pub cors_origin: String,
    pub auth_disabled: bool,
    pub jwt_secret: String,
    pub local_mode: bool,
    /// `None` selects the in-process `InMemorySecretBackend` (local/dev);
    /// `Some(url)` selects `HttpSecretBackend` against an external store.
    pub secret_backend_url: Option<String>,
    pub secret_backend_token: Option<String>,
    pub session_command: String,
    pub session_args: Vec<String>,
    pub session_port_range_start: u16,
    pub session_port_range_end: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            default_signature_header: "X-Hub-Signature-256".to_string(),
            default_max_sessions: 10,
            secret_store_namespace: "agentapi".to_string(),
            registry_key: "agentapi-webhooks".to_string(),
            session_ping_interval: Duration::from_secs(10),
            session_ping_timeout: Duration::from_secs(30),
            session_bootstrap_timeout: Duration::from_secs(60),
            shutdown_drain_deadline: Duration::from_secs(15),
            cors_origin: "http://localhost:5173".to_string(),
            auth_disabled: false,
            jwt_secret: "change-me".to_string(),
            local_mode: false,
            secret_backend_url: None,
            secret_backend_token: None,
            session_command: "agentapi".to_string(),
            session_args: vec!["server".to_string(), "--port".to_string(), "{port}".to_string()],
            session_port_range_start: 40000,
            session_port_range_end: 41000,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let bind_address =
            std::env::var("PROXY_BIND_ADDRESS").unwrap_or(defaults.bind_address);
        let default_signature_header = std::env::var("PROXY_DEFAULT_SIGNATURE_HEADER")
            .unwrap_or(defaults.default_signature_header);
        let default_max_sessions = std::env::var("PROXY_DEFAULT_MAX_SESSIONS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.default_max_sessions);
        let secret_store_namespace =
            std::env::var("PROXY_SECRET_NAMESPACE").unwrap_or(defaults.secret_store_namespace);
        let registry_key = std::env::var("PROXY_REGISTRY_KEY").unwrap_or(defaults.registry_key);
        let session_ping_interval = std::env::var("PROXY_SESSION_PING_INTERVAL_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.session_ping_interval);
        let session_ping_timeout = std::env::var("PROXY_SESSION_PING_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.session_ping_timeout);
        let session_bootstrap_timeout = std::env::var("PROXY_SESSION_BOOTSTRAP_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.session_bootstrap_timeout);
        let shutdown_drain_deadline = std::env::var("PROXY_SHUTDOWN_DRAIN_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.shutdown_drain_deadline);
        let cors_origin = std::env::var("CORS_ORIGIN").unwrap_or(defaults.cors_origin);
        let auth_disabled = std::env::var("PROXY_AUTH_DISABLED")
            .map(|v| v.to_lowercase() == "true" || v == "1")
            .unwrap_or(false);
        let jwt_secret = std::env::var("JWT_SECRET").unwrap_or(defaults.jwt_secret);
        let local_mode = std::env::var("PROXY_LOCAL_MODE")
            .map(|v| v.to_lowercase() == "true" || v == "1")
            .unwrap_or(false);
        let secret_backend_url = std::env::var("PROXY_SECRET_BACKEND_URL").ok();
        let secret_backend_token = std::env::var("PROXY_SECRET_BACKEND_TOKEN").ok();
        let session_command = std::env::var("PROXY_SESSION_COMMAND").unwrap_or(defaults.session_command);
        let session_args = std::env::var("PROXY_SESSION_ARGS")
            .ok()
            .map(|s| s.split_whitespace().map(str::to_string).collect())
            .unwrap_or(defaults.session_args);
        let session_port_range_start = std::env::var("PROXY_SESSION_PORT_RANGE_START")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.session_port_range_start);
        let session_port_range_end = std::env::var("PROXY_SESSION_PORT_RANGE_END")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.session_port_range_end);

        Self {
            bind_address,
            default_signature_header,
            default_max_sessions,
            secret_store_namespace,
            registry_key,
            session_ping_interval,
            session_ping_timeout,
            session_bootstrap_timeout,
            shutdown_drain_deadline,
            cors_origin,
            auth_disabled,
            jwt_secret,
            local_mode,
            secret_backend_url,
            secret_backend_token,
            session_command,
            session_args,
            session_port_range_start,
            session_port_range_end,
        }
    }
}
