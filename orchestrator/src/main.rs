use std::sync::Arc;
use std::time::Duration;

use webhook_orchestrator::config::Config;
use webhook_orchestrator::session::backend::LocalProcessBackend;
use webhook_orchestrator::session::SessionManager;
use webhook_orchestrator::store::backend::{HttpSecretBackend, InMemorySecretBackend, SecretBackend};
use webhook_orchestrator::store::TenantStore;
use webhook_orchestrator::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::from_env();

    if config.local_mode {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_target(true)
            .init();
        tracing::info!("starting in local mode: auth and remote secret backend are bypassed");
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .json()
            .init();
    }

    let secret_backend: Arc<dyn SecretBackend> = match &config.secret_backend_url {
        Some(url) => Arc::new(HttpSecretBackend::new(url.clone(), config.secret_backend_token.clone())),
        None => Arc::new(InMemorySecretBackend::default()),
    };
    let store = TenantStore::new(
        secret_backend,
        config.secret_store_namespace.clone(),
        config.registry_key.clone(),
    );

    let session_backend = Arc::new(LocalProcessBackend::new(
        config.session_command.clone(),
        config.session_args.clone(),
        config.session_port_range_start..config.session_port_range_end,
    ));
    let sessions = SessionManager::new(
        session_backend,
        config.session_ping_interval,
        config.session_ping_timeout,
        config.session_bootstrap_timeout,
    );

    let shutdown_drain_deadline = config.shutdown_drain_deadline;
    let bind_address = config.bind_address.clone();

    let state = Arc::new(AppState {
        config,
        store,
        sessions,
    });

    let health_monitor_state = state.clone();
    tokio::task::Builder::new()
        .name("session-health-monitor")
        .spawn(async move {
            health_monitor_state.sessions.run_health_monitor().await;
        })
        .expect("failed to spawn session-health-monitor task");

    let app = webhook_orchestrator::app::router(state.clone());

    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    tracing::info!(address = %bind_address, "orchestrator listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state.clone(), shutdown_drain_deadline))
        .await?;

    Ok(())
}

async fn shutdown_signal(state: Arc<AppState>, drain_deadline: Duration) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received, draining active sessions");
    state.sessions.shutdown(drain_deadline).await;
}
