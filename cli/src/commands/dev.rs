use anyhow::{Context, Result};
use std::process::Stdio;
use tokio::process::Command;

use crate::utils;

/// Run the orchestrator in the foreground with local-mode auth/secrets
/// bypass enabled, streaming its output directly to this terminal.
pub async fn run(bind_address: Option<String>) -> Result<()> {
    let binary = utils::orchestrator_binary_path()?;

    let status = Command::new(&binary)
        .env("PROXY_LOCAL_MODE", "true")
        .env("PROXY_BIND_ADDRESS", bind_address.unwrap_or_else(|| "127.0.0.1:8080".to_string()))
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()
        .await
        .with_context(|| format!("failed to run orchestrator at {binary:?}"))?;

    if !status.success() {
        anyhow::bail!("orchestrator exited with {status}");
    }
    Ok(())
}
