use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

const YOUTUBE_SCOPE: &str = "https://www.googleapis.com/auth/youtube";
const OOB_REDIRECT: &str = "urn:ietf:wg:oauth:2.0:oob";

/// Google "installed app" client secret, read from the JSON file the API
/// console hands out (`{"installed": {...}}`).
#[derive(Debug, Clone, Deserialize)]
pub struct ClientSecret {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    #[serde(default)]
    pub redirect_uris: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ClientSecretFile {
    installed: ClientSecret,
}

fn default_auth_uri() -> String {
    "https://accounts.google.com/o/oauth2/auth".to_string()
}

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

impl ClientSecret {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read client secret file: {}", path.display()))?;
        let file: ClientSecretFile = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse client secret file: {}", path.display()))?;
        Ok(file.installed)
    }

    fn redirect_uri(&self) -> &str {
        self.redirect_uris
            .first()
            .map(String::as_str)
            .unwrap_or(OOB_REDIRECT)
    }
}

/// An OAuth token as cached on disk between runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredToken {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl StoredToken {
    /// Treats tokens within a minute of expiry as already stale.
    pub fn is_expired(&self) -> bool {
        Utc::now() + Duration::seconds(60) >= self.expires_at
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read token cache: {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse token cache: {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create token cache directory: {}", parent.display())
            })?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write token cache: {}", path.display()))
    }
}

/// Default token cache location: `~/.credentials/camerabot.json`.
pub fn default_cache_path() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory for token cache")?;
    Ok(home.join(".credentials").join("camerabot.json"))
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    expires_in: i64,
}

impl TokenResponse {
    fn into_stored(self, fallback_refresh: Option<String>) -> StoredToken {
        StoredToken {
            access_token: self.access_token,
            refresh_token: self.refresh_token.or(fallback_refresh),
            expires_at: Utc::now() + Duration::seconds(self.expires_in),
        }
    }
}

/// Source of a usable OAuth access token, injected at startup.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn access_token(&self) -> Result<StoredToken>;
}

/// Reads the cached token file, refreshing it when stale.
pub struct CachedTokenProvider {
    http: reqwest::Client,
    secret: ClientSecret,
    cache_path: PathBuf,
}

impl CachedTokenProvider {
    pub fn new(secret: ClientSecret, cache_path: PathBuf) -> Self {
        Self {
            http: reqwest::Client::new(),
            secret,
            cache_path,
        }
    }

    async fn refresh(&self, refresh_token: &str) -> Result<StoredToken> {
        let params = [
            ("client_id", self.secret.client_id.as_str()),
            ("client_secret", self.secret.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ];

        let response = self
            .http
            .post(&self.secret.token_uri)
            .form(&params)
            .send()
            .await
            .context("Failed to send token refresh request")?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            anyhow::bail!("Token refresh failed ({}): {}", status, error_body);
        }

        let decoded: TokenResponse = response
            .json()
            .await
            .context("Failed to parse token refresh response")?;

        Ok(decoded.into_stored(Some(refresh_token.to_string())))
    }
}

#[async_trait]
impl TokenProvider for CachedTokenProvider {
    async fn access_token(&self) -> Result<StoredToken> {
        let cached = StoredToken::load(&self.cache_path)?;
        if !cached.is_expired() {
            return Ok(cached);
        }

        let refresh_token = cached
            .refresh_token
            .as_deref()
            .context("Cached token expired and no refresh token is available")?;

        info!("Cached token expired, refreshing");
        let fresh = self.refresh(refresh_token).await?;
        fresh.save(&self.cache_path)?;
        Ok(fresh)
    }
}

/// Performs the interactive authorization-code exchange on the console and
/// caches the result for future runs.
pub struct InteractiveTokenProvider {
    http: reqwest::Client,
    secret: ClientSecret,
    cache_path: PathBuf,
}

impl InteractiveTokenProvider {
    pub fn new(secret: ClientSecret, cache_path: PathBuf) -> Self {
        Self {
            http: reqwest::Client::new(),
            secret,
            cache_path,
        }
    }

    fn consent_url(&self) -> Result<reqwest::Url> {
        reqwest::Url::parse_with_params(
            &self.secret.auth_uri,
            &[
                ("client_id", self.secret.client_id.as_str()),
                ("redirect_uri", self.secret.redirect_uri()),
                ("response_type", "code"),
                ("scope", YOUTUBE_SCOPE),
                ("access_type", "offline"),
            ],
        )
        .context("Failed to build authorization URL")
    }

    async fn exchange(&self, code: &str) -> Result<StoredToken> {
        let params = [
            ("client_id", self.secret.client_id.as_str()),
            ("client_secret", self.secret.client_secret.as_str()),
            ("code", code),
            ("redirect_uri", self.secret.redirect_uri()),
            ("grant_type", "authorization_code"),
        ];

        let response = self
            .http
            .post(&self.secret.token_uri)
            .form(&params)
            .send()
            .await
            .context("Failed to send authorization code exchange")?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            anyhow::bail!("Authorization code exchange failed ({}): {}", status, error_body);
        }

        let decoded: TokenResponse = response
            .json()
            .await
            .context("Failed to parse authorization code exchange response")?;

        Ok(decoded.into_stored(None))
    }
}

#[async_trait]
impl TokenProvider for InteractiveTokenProvider {
    async fn access_token(&self) -> Result<StoredToken> {
        println!("Open this URL in your browser and authorize the bot:");
        println!("{}", self.consent_url()?);
        println!("Paste the authorization code here and press Enter:");

        let mut code = String::new();
        std::io::stdin()
            .read_line(&mut code)
            .context("Failed to read authorization code from stdin")?;
        let code = code.trim();
        if code.is_empty() {
            anyhow::bail!("No authorization code entered");
        }

        let token = self.exchange(code).await?;
        token.save(&self.cache_path)?;
        info!("Token cached at {}", self.cache_path.display());
        Ok(token)
    }
}

/// Picks the cached provider when a token file already exists, otherwise the
/// interactive one.
pub fn provider_for(secret: ClientSecret, cache_path: PathBuf) -> Box<dyn TokenProvider> {
    if cache_path.exists() {
        Box::new(CachedTokenProvider::new(secret, cache_path))
    } else {
        Box::new(InteractiveTokenProvider::new(secret, cache_path))
    }
}
