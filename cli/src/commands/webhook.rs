use anyhow::Result;
use colored::Colorize;
use serde_json::Value;

use crate::client::OrchestratorClient;
use crate::config::CliConfig;

pub async fn list() -> Result<()> {
    let client = OrchestratorClient::from_config(&CliConfig::load()?)?;
    let webhooks = client.list_webhooks().await?;
    if webhooks.is_empty() {
        println!("no webhooks configured");
        return Ok(());
    }
    for w in webhooks {
        println!(
            "{}  {}  status={}",
            w.get("id").and_then(Value::as_str).unwrap_or("?").bold(),
            w.get("name").and_then(Value::as_str).unwrap_or("?"),
            w.get("status").and_then(Value::as_str).unwrap_or("?"),
        );
    }
    Ok(())
}

pub async fn get(id: &str) -> Result<()> {
    let client = OrchestratorClient::from_config(&CliConfig::load()?)?;
    let webhook = client.get_webhook(id).await?;
    println!("{}", serde_json::to_string_pretty(&webhook)?);
    Ok(())
}

pub async fn create(from_file: &str) -> Result<()> {
    let body: Value = serde_json::from_str(&std::fs::read_to_string(from_file)?)?;
    let client = OrchestratorClient::from_config(&CliConfig::load()?)?;
    let created = client.create_webhook(body).await?;
    println!("{} webhook created", "ok:".green());
    println!("{}", serde_json::to_string_pretty(&created)?);
    Ok(())
}

pub async fn delete(id: &str) -> Result<()> {
    let client = OrchestratorClient::from_config(&CliConfig::load()?)?;
    client.delete_webhook(id).await?;
    println!("{} webhook {} deleted", "ok:".green(), id);
    Ok(())
}

pub async fn regenerate_secret(id: &str) -> Result<()> {
    let client = OrchestratorClient::from_config(&CliConfig::load()?)?;
    let updated = client.regenerate_webhook_secret(id).await?;
    println!("{}", serde_json::to_string_pretty(&updated)?);
    Ok(())
}
