mod bot;
mod camera;
mod config;
mod oauth;
mod youtube;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::bot::Bot;
use crate::camera::{CameraClient, CameraControl};
use crate::config::Config;
use crate::oauth::ClientSecret;
use crate::youtube::YouTubeClient;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,camerabot=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    info!("Loading configuration from: {}", config_path.display());
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    info!("Configuration loaded successfully");
    info!("  Stream server: {}:{}", config.server.host, config.server.port);
    info!("  Poll interval: {}s", config.bot.poll_interval_secs);

    // Resolve credentials
    let secret = ClientSecret::load(&config.youtube.client_secret_path)?;
    let cache_path = match &config.youtube.token_cache_path {
        Some(path) => path.clone(),
        None => oauth::default_cache_path()?,
    };
    let provider = oauth::provider_for(secret, cache_path);
    let token = provider
        .access_token()
        .await
        .context("Failed to obtain OAuth token")?;

    let youtube = YouTubeClient::new(token);
    let camera = CameraClient::new(&config.server.host, &config.server.port);

    // Resolve the running broadcast and its chat handle
    let broadcast = youtube
        .live_broadcast()
        .await
        .context("Failed to resolve the current broadcast")?;
    let watch_url = broadcast.watch_url();
    info!("Broadcast: {} ({})", broadcast.title, watch_url);

    // Stream server failures are never fatal
    if let Err(e) = camera.announce_broadcast(&watch_url).await {
        warn!("Failed to announce broadcast URL to stream server: {:#}", e);
    }

    let bot = Bot::new(
        camera,
        youtube,
        broadcast.live_chat_id,
        Duration::from_secs(config.bot.poll_interval_secs),
    );

    bot.send_welcome()
        .await
        .context("Failed to send welcome banner")?;

    info!("Bot is starting...");
    bot.run().await
}
