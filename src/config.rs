use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub youtube: YouTubeConfig,
    #[serde(default = "default_bot_config")]
    pub bot: BotConfig,
}

/// Where the stream server listens.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct YouTubeConfig {
    /// Google "installed app" client secret JSON file.
    pub client_secret_path: PathBuf,
    /// Overrides the default `~/.credentials/camerabot.json` token cache.
    #[serde(default)]
    pub token_cache_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BotConfig {
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> String {
    "8081".to_string()
}

fn default_poll_interval_secs() -> u64 {
    5
}

fn default_bot_config() -> BotConfig {
    BotConfig {
        poll_interval_secs: default_poll_interval_secs(),
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }
}
