mod bot;
mod command;
mod config;
mod context;
mod dispatch;
mod helpers;
mod message;
mod player;
mod publisher;
mod roster;
mod stream;
mod template;
mod token;
mod watcher;

use anyhow::{anyhow, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use bot::Bot;

#[derive(Parser, Debug)]
#[command(version, about = "Template-driven Twitch chat command bot")]
struct Cli {
    /// Path to the settings file.
    #[arg(short, long, default_value = "settings.toml")]
    config: String,
}

fn init_logging(default_filter: &str) -> Result<()> {
    // RUST_LOG wins over the configured filter
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_filter)?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .map_err(|e| anyhow!("couldn't install logger: {e}"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = config::Config::build(&cli.config)?;
    init_logging(&config.bot_cfg.log_filter)?;

    info!("Starting bot...");
    let mut bot = Bot::initialize(config).await?;
    bot.run().await
}
