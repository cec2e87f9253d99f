use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Operator-facing configuration for this front end, persisted as TOML at
/// `~/.webhook-proxy/config.toml`. Mirrors the teacher's `ServerConfig`:
/// a flat struct loaded/saved with `toml`, resolved against `dirs::home_dir`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CliConfig {
    pub orchestrator_url: String,
    /// Bearer token sent on every management-API request. Issued out of
    /// band (the CLI does not mint JWTs itself; it is a REST client, not
    /// an authority).
    #[serde(default)]
    pub api_token: String,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            orchestrator_url: "http://127.0.0.1:8080".to_string(),
            api_token: String::new(),
        }
    }
}

impl CliConfig {
    pub fn config_dir() -> Result<PathBuf> {
        let dir = dirs::home_dir()
            .context("failed to resolve home directory")?
            .join(".webhook-proxy");
        Ok(dir)
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    pub fn pids_dir() -> Result<PathBuf> {
        let dir = Self::config_dir()?.join("pids");
        if !dir.exists() {
            fs::create_dir_all(&dir)?;
        }
        Ok(dir)
    }

    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(&path)?;
        toml::from_str(&content).with_context(|| format!("failed to parse config file: {path:?}"))
    }

    pub fn save(&self) -> Result<()> {
        let dir = Self::config_dir()?;
        fs::create_dir_all(&dir)?;
        let content = toml::to_string_pretty(self)?;
        fs::write(Self::config_path()?, content)?;
        Ok(())
    }
}
