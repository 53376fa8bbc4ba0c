//! Discord webhook transport.
//!
//! One batch becomes one webhook execution. Discord's rate limits are
//! respected by reporting, not by waiting: a 429 is logged with its
//! `Retry-After` and the batch is dropped like any other failed send.

use std::time::Duration;

use async_trait::async_trait;
use chat_relay::{FormattedMessage, RelayError, Transport};
use reqwest::header::HeaderMap;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use crate::error::Result;
use crate::http::build_client;

/// Discord's limit for a single embed description.
pub const MAX_EMBED_DESCRIPTION: usize = 4096;
/// Discord's limit for embeds per message.
pub const MAX_EMBEDS: usize = 10;
/// Discord's limit for the combined text of all embeds in a message.
pub const MAX_TOTAL_EMBED_CHARS: usize = 6000;

/// Discord transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscordConfig {
    /// Discord webhook URL.
    pub webhook_url: String,
    /// Username override; the platform name is used when absent.
    #[serde(default)]
    pub username: Option<String>,
    /// Optional avatar URL for the webhook.
    #[serde(default)]
    pub avatar_url: Option<String>,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_timeout() -> u64 {
    30
}

impl DiscordConfig {
    pub fn new(webhook_url: impl Into<String>) -> Self {
        Self {
            webhook_url: webhook_url.into(),
            username: None,
            avatar_url: None,
            timeout_secs: default_timeout(),
        }
    }
}

/// Split a transcript into embed descriptions at line boundaries.
///
/// `reserved` chars of the message total are kept free for other embed
/// text (the footer). Returns the descriptions and the number of lines
/// that did not fit in a single message. Lines longer than one embed are
/// cut.
pub fn split_description(text: &str, reserved: usize) -> (Vec<String>, usize) {
    let lines: Vec<&str> = text.split('\n').collect();
    let mut chunks: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;
    let mut total = reserved;

    for (index, raw) in lines.iter().enumerate() {
        let line: String = raw.chars().take(MAX_EMBED_DESCRIPTION).collect();
        let line_len = line.chars().count();
        let sep = usize::from(!current.is_empty());
        let dropped = lines.len() - index;

        if total + sep + line_len > MAX_TOTAL_EMBED_CHARS {
            return finish(chunks, current, dropped);
        }

        if current_len + sep + line_len > MAX_EMBED_DESCRIPTION {
            if chunks.len() + 1 >= MAX_EMBEDS {
                return finish(chunks, current, dropped);
            }
            chunks.push(std::mem::take(&mut current));
            current.push_str(&line);
            current_len = line_len;
            total += line_len;
            continue;
        }

        if sep == 1 {
            current.push('\n');
        }
        current.push_str(&line);
        current_len += sep + line_len;
        total += sep + line_len;
    }

    finish(chunks, current, 0)
}

fn finish(mut chunks: Vec<String>, current: String, dropped: usize) -> (Vec<String>, usize) {
    if !current.is_empty() {
        chunks.push(current);
    }
    (chunks, dropped)
}

/// Parse the Retry-After duration from a 429 response.
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    // Try Retry-After header first (Discord sets this)
    if let Some(retry_after) = headers.get("Retry-After")
        && let Ok(secs) = retry_after.to_str().ok()?.parse::<f64>()
    {
        return Some(Duration::from_secs_f64(secs));
    }

    // Fallback: try X-RateLimit-Reset-After header
    if let Some(reset_after) = headers.get("X-RateLimit-Reset-After")
        && let Ok(secs) = reset_after.to_str().ok()?.parse::<f64>()
    {
        return Some(Duration::from_secs_f64(secs));
    }

    None
}

/// Sends batches as Discord embeds.
pub struct DiscordTransport {
    config: DiscordConfig,
    client: Client,
}

impl DiscordTransport {
    pub fn new(config: DiscordConfig) -> Result<Self> {
        let client = build_client(Duration::from_secs(config.timeout_secs))?;
        Ok(Self { config, client })
    }

    /// Build the webhook payload for a batch.
    fn build_payload(&self, message: &FormattedMessage) -> serde_json::Value {
        let footer = format!("{} events", message.event_count());
        let (descriptions, dropped) =
            split_description(&message.description, footer.chars().count());
        if dropped > 0 {
            warn!(
                dropped_lines = dropped,
                events = message.event_count(),
                "Batch exceeds Discord message limits, truncating"
            );
        }

        let last = descriptions.len().saturating_sub(1);
        let embeds: Vec<_> = descriptions
            .into_iter()
            .enumerate()
            .map(|(i, description)| {
                let mut embed = json!({
                    "description": description,
                    "color": message.color,
                });
                if i == last {
                    embed["timestamp"] = json!(message.timestamp.to_rfc3339());
                    embed["footer"] = json!({ "text": footer });
                }
                embed
            })
            .collect();

        let mut payload = json!({
            "username": self.config.username.as_deref().unwrap_or(&message.username),
            "embeds": embeds,
        });
        if let Some(avatar_url) = &self.config.avatar_url {
            payload["avatar_url"] = json!(avatar_url);
        }

        payload
    }
}

#[async_trait]
impl Transport for DiscordTransport {
    fn name(&self) -> &'static str {
        "discord"
    }

    async fn send(&self, message: &FormattedMessage) -> chat_relay::Result<()> {
        let payload = self.build_payload(message);

        let response = self
            .client
            .post(&self.config.webhook_url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| RelayError::dispatch(format!("Discord request failed: {}", e)))?;

        let status = response.status();
        if status.is_success() {
            debug!("Discord webhook delivered {} events", message.event_count());
            return Ok(());
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = parse_retry_after(response.headers());
            warn!(?retry_after, "Discord rate limited the webhook");
            return Err(RelayError::dispatch(format!(
                "Discord rate limit hit, retry after {:?}",
                retry_after
            )));
        }

        let body = response.text().await.unwrap_or_default();
        Err(RelayError::dispatch(format!(
            "Discord webhook failed: {} - {}",
            status, body
        )))
    }
}
