use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::oauth::StoredToken;

const API_BASE: &str = "https://www.googleapis.com/youtube/v3";

/// One chat message; only the display text survives past the wire.
#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub text: String,
}

/// One page of chat messages, in provider order, plus the continuation token
/// the next poll must supply verbatim.
#[derive(Debug, Clone)]
pub struct ChatBatch {
    pub next_token: String,
    pub messages: Vec<ChatMessage>,
}

/// The authenticated account's currently running broadcast.
#[derive(Debug, Clone)]
pub struct Broadcast {
    pub video_id: String,
    pub live_chat_id: String,
    pub title: String,
}

impl Broadcast {
    /// Public share URL for the broadcast.
    pub fn watch_url(&self) -> String {
        format!("https://youtu.be/{}", self.video_id)
    }
}

/// Chat operations the dispatcher needs from the provider. Errors propagate;
/// whether they are fatal is decided by the caller.
#[async_trait]
pub trait ChatFeed: Send + Sync {
    /// Fetch messages published since the given continuation token (empty on
    /// the first call).
    async fn next_batch(&self, chat_id: &str, page_token: &str) -> Result<ChatBatch>;

    /// Post a reply into the chat.
    async fn send_message(&self, chat_id: &str, text: &str) -> Result<()>;
}

#[derive(Debug, Deserialize)]
struct BroadcastListResponse {
    #[serde(default)]
    items: Vec<BroadcastResource>,
}

#[derive(Debug, Deserialize)]
struct BroadcastResource {
    id: String,
    snippet: BroadcastSnippet,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BroadcastSnippet {
    #[serde(default)]
    title: String,
    live_chat_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageListResponse {
    next_page_token: Option<String>,
    #[serde(default)]
    items: Vec<MessageResource>,
}

#[derive(Debug, Deserialize)]
struct MessageResource {
    snippet: MessageSnippet,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageSnippet {
    display_message: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InsertMessageRequest<'a> {
    snippet: InsertMessageSnippet<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InsertMessageSnippet<'a> {
    live_chat_id: &'a str,
    #[serde(rename = "type")]
    kind: &'a str,
    text_message_details: TextMessageDetails<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TextMessageDetails<'a> {
    message_text: &'a str,
}

/// YouTube Data API v3 client, scoped to live-chat operations.
pub struct YouTubeClient {
    http: reqwest::Client,
    token: StoredToken,
}

impl YouTubeClient {
    pub fn new(token: StoredToken) -> Self {
        Self {
            http: reqwest::Client::new(),
            token,
        }
    }

    /// Resolve the account's active broadcast and its chat handle.
    pub async fn live_broadcast(&self) -> Result<Broadcast> {
        let url = format!("{}/liveBroadcasts", API_BASE);

        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.token.access_token)
            .query(&[
                ("part", "snippet"),
                ("broadcastStatus", "active"),
                ("broadcastType", "all"),
            ])
            .send()
            .await
            .context("Failed to send liveBroadcasts request")?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            anyhow::bail!("YouTube API error ({}): {}", status, error_body);
        }

        let decoded: BroadcastListResponse = response
            .json()
            .await
            .context("Failed to parse liveBroadcasts response")?;

        let resource = decoded
            .items
            .into_iter()
            .next()
            .context("No active broadcast found for this account")?;

        let live_chat_id = resource
            .snippet
            .live_chat_id
            .context("Active broadcast has no live chat")?;

        Ok(Broadcast {
            video_id: resource.id,
            live_chat_id,
            title: resource.snippet.title,
        })
    }
}

#[async_trait]
impl ChatFeed for YouTubeClient {
    async fn next_batch(&self, chat_id: &str, page_token: &str) -> Result<ChatBatch> {
        let url = format!("{}/liveChat/messages", API_BASE);

        let mut query: Vec<(&str, &str)> = vec![("liveChatId", chat_id), ("part", "snippet")];
        if !page_token.is_empty() {
            query.push(("pageToken", page_token));
        }

        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.token.access_token)
            .query(&query)
            .send()
            .await
            .context("Failed to send liveChat messages request")?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            anyhow::bail!("YouTube API error ({}): {}", status, error_body);
        }

        let decoded: MessageListResponse = response
            .json()
            .await
            .context("Failed to parse liveChat messages response")?;

        debug!("Fetched {} new chat message(s)", decoded.items.len());

        Ok(ChatBatch {
            next_token: decoded.next_page_token.unwrap_or_default(),
            messages: decoded
                .items
                .into_iter()
                .map(|item| ChatMessage {
                    text: item.snippet.display_message.unwrap_or_default(),
                })
                .collect(),
        })
    }

    async fn send_message(&self, chat_id: &str, text: &str) -> Result<()> {
        let url = format!("{}/liveChat/messages", API_BASE);

        let request = InsertMessageRequest {
            snippet: InsertMessageSnippet {
                live_chat_id: chat_id,
                kind: "textMessageEvent",
                text_message_details: TextMessageDetails { message_text: text },
            },
        };

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.token.access_token)
            .query(&[("part", "snippet")])
            .json(&request)
            .send()
            .await
            .context("Failed to send chat reply")?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            anyhow::bail!("YouTube API error ({}): {}", status, error_body);
        }

        Ok(())
    }
}
