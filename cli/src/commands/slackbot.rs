use anyhow::Result;
use colored::Colorize;
use serde_json::Value;

use crate::client::OrchestratorClient;
use crate::config::CliConfig;

pub async fn list() -> Result<()> {
    let client = OrchestratorClient::from_config(&CliConfig::load()?)?;
    let bots = client.list_slackbots().await?;
    if bots.is_empty() {
        println!("no Slack bots configured");
        return Ok(());
    }
    for b in bots {
        println!(
            "{}  {}  status={}",
            b.get("id").and_then(Value::as_str).unwrap_or("?").bold(),
            b.get("name").and_then(Value::as_str).unwrap_or("?"),
            b.get("status").and_then(Value::as_str).unwrap_or("?"),
        );
    }
    Ok(())
}

pub async fn create(from_file: &str) -> Result<()> {
    let body: Value = serde_json::from_str(&std::fs::read_to_string(from_file)?)?;
    let client = OrchestratorClient::from_config(&CliConfig::load()?)?;
    let created = client.create_slackbot(body).await?;
    println!("{} Slack bot created", "ok:".green());
    println!("{}", serde_json::to_string_pretty(&created)?);
    Ok(())
}
