mod bot;
mod config;
mod platform;
mod shutdown;
mod wol;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::bot::WakeBot;
use crate::config::{AppConfig, DEFAULT_CONFIG_PATH};
use crate::platform::telegram::{self, TelegramClient, FEED_CAPACITY};
use crate::wol::UdpWakeSender;

/// Wake on LAN Telegram bot: helps you with booting your PCs
#[derive(Parser, Debug)]
#[command(name = "wol-tg-bot", version, about)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "WOL_TG_BOT_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Load and validate the configuration, then exit
    #[arg(long)]
    check: bool,

    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_logging(verbose: u8) {
    let default_filter = match verbose {
        0 => "info,wol_tg_bot=debug",
        1 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    init_logging(cli.verbose);

    // Load configuration

    info!("Loading configuration from: {}", cli.config.display());
    let config = AppConfig::load(&cli.config)
        .with_context(|| format!("Failed to load config from {}", cli.config.display()))?;

    let warnings = config.validate();
    info!("Configuration loaded successfully");
    info!("  Machines: {:?}", config.machine_names());
    info!("  Owner: {}", config.bot.owner_id);
    match config.bot.channel_id() {
        Some(id) => info!("  Channel: {} (channel posts and message deletion enabled)", id),
        None => info!("  Channel: none"),
    }

    if cli.check {
        info!("Config check finished with {} warning(s)", warnings.len());
        return Ok(());
    }

    // Connect the Telegram client and the Wake-on-LAN socket
    let config = Arc::new(config);
    let client = TelegramClient::connect(&config.bot.bot_key).await?;
    let waker = UdpWakeSender::bind().await?;

    // Start polling and the dispatch loop, joined by the event feed
    let cancel = CancellationToken::new();
    let (feed_tx, feed_rx) = mpsc::channel(FEED_CAPACITY);

    let poller = tokio::spawn(telegram::run_feed(
        client.bot().clone(),
        feed_tx,
        cancel.clone(),
    ));

    let wake_bot = WakeBot::new(Arc::clone(&config), client, waker);
    let dispatch_cancel = cancel.clone();
    let dispatcher = tokio::spawn(async move { wake_bot.run(feed_rx, dispatch_cancel).await });

    // Block until a shutdown signal arrives
    info!("Bot is running");
    let signal = shutdown::wait_for_signal().await;
    cancel.cancel();
    signal?;

    if let Err(e) = poller.await.context("Telegram poller panicked")? {
        error!("Telegram poller stopped with error: {:#}", e);
    }
    dispatcher.await.context("Dispatch loop panicked")?;

    info!("Bot stopped");
    Ok(())
}
