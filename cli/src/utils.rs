use anyhow::{Context, Result};
use std::path::PathBuf;

/// Locate the `orchestrator` binary: alongside this executable first (the
/// common case for an installed release), falling back to `PATH`.
pub fn orchestrator_binary_path() -> Result<PathBuf> {
    let exe = std::env::current_exe().context("failed to resolve current executable path")?;
    let sibling = exe
        .parent()
        .map(|dir| dir.join(if cfg!(windows) { "orchestrator.exe" } else { "orchestrator" }));

    if let Some(path) = sibling {
        if path.exists() {
            return Ok(path);
        }
    }

    Ok(PathBuf::from("orchestrator"))
}
