//! Generic JSON webhook transport.

use std::time::Duration;

use async_trait::async_trait;
use chat_relay::{FormattedMessage, RelayError, Transport};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::error::Result;
use crate::http::build_client;

/// Webhook transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Endpoint receiving the batches.
    pub url: String,
    /// HTTP method, POST or PUT.
    #[serde(default = "default_method")]
    pub method: String,
    /// Extra request headers.
    #[serde(default)]
    pub headers: Vec<(String, String)>,
    #[serde(default)]
    pub auth: Option<WebhookAuth>,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_method() -> String {
    "POST".to_string()
}

fn default_timeout() -> u64 {
    30
}

impl WebhookConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: default_method(),
            headers: Vec::new(),
            auth: None,
            timeout_secs: default_timeout(),
        }
    }
}

/// Webhook authentication.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WebhookAuth {
    Bearer { token: String },
    Basic { username: String, password: String },
    Header { name: String, value: String },
}

/// Posts each batch as one JSON document.
pub struct WebhookTransport {
    config: WebhookConfig,
    client: Client,
}

impl WebhookTransport {
    pub fn new(config: WebhookConfig) -> Result<Self> {
        let client = build_client(Duration::from_secs(config.timeout_secs))?;
        Ok(Self { config, client })
    }

    fn method(&self) -> Method {
        match self.config.method.to_uppercase().as_str() {
            "PUT" => Method::PUT,
            _ => Method::POST,
        }
    }

    /// Custom headers plus the auth header. Invalid pairs are skipped.
    fn build_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();

        for (name, value) in &self.config.headers {
            insert_header(&mut headers, name, value);
        }

        match &self.config.auth {
            Some(WebhookAuth::Bearer { token }) => {
                if let Ok(value) = HeaderValue::from_str(&format!("Bearer {}", token)) {
                    headers.insert(AUTHORIZATION, value);
                }
            }
            Some(WebhookAuth::Header { name, value }) => insert_header(&mut headers, name, value),
            // applied on the request builder
            Some(WebhookAuth::Basic { .. }) | None => {}
        }

        headers
    }

    fn build_payload(&self, message: &FormattedMessage) -> serde_json::Value {
        json!({
            "username": message.username,
            "color": message.color,
            "description": message.description,
            "timestamp": message.timestamp.to_rfc3339(),
            "event_count": message.event_count(),
            "events": message.events,
        })
    }
}

fn insert_header(headers: &mut HeaderMap, name: &str, value: &str) {
    if let (Ok(name), Ok(value)) = (name.parse::<HeaderName>(), value.parse::<HeaderValue>()) {
        headers.insert(name, value);
    }
}

#[async_trait]
impl Transport for WebhookTransport {
    fn name(&self) -> &'static str {
        "webhook"
    }

    async fn send(&self, message: &FormattedMessage) -> chat_relay::Result<()> {
        let mut request = self
            .client
            .request(self.method(), &self.config.url)
            .headers(self.build_headers())
            .json(&self.build_payload(message));

        if let Some(WebhookAuth::Basic { username, password }) = &self.config.auth {
            request = request.basic_auth(username, Some(password));
        }

        let response = request
            .send()
            .await
            .map_err(|e| RelayError::dispatch(format!("Webhook request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(RelayError::dispatch(format!(
                "Webhook failed: {} - {}",
                status, body
            )));
        }

        debug!("Webhook delivered {} events", message.event_count());
        Ok(())
    }
}
