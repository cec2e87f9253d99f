mod client;
mod commands;
mod config;
mod utils;

use anyhow::Result;
use clap::{Parser, Subcommand};

use config::CliConfig;

#[derive(Parser)]
#[command(name = "webhook-proxy")]
#[command(about = "Manage the agent-session webhook proxy")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the orchestrator in the background
    Serve {
        #[arg(long)]
        bind: Option<String>,
    },
    /// Stop the background orchestrator
    Stop,
    /// Check whether the orchestrator is running
    Status,
    /// Run the orchestrator in the foreground with local-mode auth bypass
    Dev {
        #[arg(long)]
        bind: Option<String>,
    },
    /// Manage webhook tenants
    Webhook {
        #[command(subcommand)]
        command: WebhookCommands,
    },
    /// Manage Slack-bot tenants
    Slackbot {
        #[command(subcommand)]
        command: SlackbotCommands,
    },
    /// Show or edit the local configuration file
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum WebhookCommands {
    /// List webhooks visible to the configured token
    List,
    /// Show a single webhook's detail
    Get { id: String },
    /// Create a webhook from a JSON request file
    Create {
        #[arg(long)]
        file: String,
    },
    /// Delete a webhook
    Delete { id: String },
    /// Regenerate a webhook's HMAC secret
    RegenerateSecret { id: String },
}

#[derive(Subcommand)]
enum SlackbotCommands {
    /// List Slack-bot tenants visible to the configured token
    List,
    /// Create a Slack-bot tenant from a JSON request file
    Create {
        #[arg(long)]
        file: String,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the resolved configuration
    Show,
    /// Set the orchestrator URL and/or API token
    Set {
        #[arg(long)]
        orchestrator_url: Option<String>,
        #[arg(long)]
        api_token: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { bind } => commands::serve::start(bind).await,
        Commands::Stop => commands::serve::stop().await,
        Commands::Status => commands::serve::status().await,
        Commands::Dev { bind } => commands::dev::run(bind).await,
        Commands::Webhook { command } => match command {
            WebhookCommands::List => commands::webhook::list().await,
            WebhookCommands::Get { id } => commands::webhook::get(&id).await,
            WebhookCommands::Create { file } => commands::webhook::create(&file).await,
            WebhookCommands::Delete { id } => commands::webhook::delete(&id).await,
            WebhookCommands::RegenerateSecret { id } => commands::webhook::regenerate_secret(&id).await,
        },
        Commands::Slackbot { command } => match command {
            SlackbotCommands::List => commands::slackbot::list().await,
            SlackbotCommands::Create { file } => commands::slackbot::create(&file).await,
        },
        Commands::Config { command } => match command {
            ConfigCommands::Show => {
                let config = CliConfig::load()?;
                println!("{}", toml::to_string_pretty(&config)?);
                Ok(())
            }
            ConfigCommands::Set {
                orchestrator_url,
                api_token,
            } => {
                let mut config = CliConfig::load()?;
                if let Some(url) = orchestrator_url {
                    config.orchestrator_url = url;
                }
                if let Some(token) = api_token {
                    config.api_token = token;
                }
                config.save()?;
                println!("configuration saved to {:?}", CliConfig::config_path()?);
                Ok(())
            }
        },
    }
}
