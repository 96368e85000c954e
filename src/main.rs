//! creditagent binary entry point.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use creditagent::config::{Config, DiscordConfig};
use creditagent::discord::{DiscordApi, HttpDiscordClient, command_definitions};
use creditagent::server::{AppState, start_server};

#[derive(Parser, Debug)]
#[command(name = "creditagent", version, about = "Discord credit and help bot")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum Command {
    /// Run the interaction server (default).
    Serve,
    /// Register the slash commands with Discord and exit.
    Register,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("creditagent=info,tower_http=info"));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.with_target(false).init();
    }
}

async fn register(config: &DiscordConfig) -> anyhow::Result<()> {
    let client = HttpDiscordClient::new(
        config.api_base_url.clone(),
        config.application_id.clone(),
        config.bot_token.clone(),
    )?;
    let count = client
        .register_commands(&command_definitions())
        .await
        .context("registering slash commands")?;
    tracing::info!(count, "Registered slash commands");
    Ok(())
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let state = Arc::new(AppState::from_config(&config).await?);

    let addr: SocketAddr = format!("{}:{}", config.http.host, config.http.port)
        .parse()
        .with_context(|| format!("invalid listen address {}:{}", config.http.host, config.http.port))?;
    let (_bound, server) = start_server(addr, state, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for shutdown signal: {}", e);
        }
    })
    .await?;

    server.await.context("server task panicked")?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let loaded = creditagent::bootstrap::load_env();
    init_tracing();
    for path in &loaded {
        tracing::debug!(path = %path.display(), "Loaded env file");
    }

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(Config::from_env()?).await,
        Command::Register => register(&DiscordConfig::resolve()?).await,
    }
}
