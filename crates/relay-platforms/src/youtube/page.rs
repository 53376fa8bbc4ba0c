//! YouTube page scraping: live video discovery and live chat items.

use std::sync::LazyLock;

use chat_relay::{EntryMarker, RawEntry, RawLink};
use chrono::DateTime;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use url::Url;

use crate::error::{PlatformError, Result};

static VIDEO_ID_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/watch\?v=([a-zA-Z0-9_-]{11})").unwrap());

static INITIAL_DATA_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?s)(?:window\["ytInitialData"\]|var ytInitialData)\s*=\s*(\{.+?\});\s*</script>"#,
    )
    .unwrap()
});

/// First video id linked from a channel's streams page.
pub fn extract_video_id(html: &str) -> Option<String> {
    VIDEO_ID_REGEX
        .captures(html)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// The `ytInitialData` object embedded in a page.
pub fn extract_initial_data(html: &str) -> Result<Value> {
    let raw = INITIAL_DATA_REGEX
        .captures(html)
        .and_then(|caps| caps.get(1))
        .ok_or_else(|| PlatformError::NotLive("page carries no initial data".to_string()))?;
    Ok(serde_json::from_str(raw.as_str())?)
}

/// Continuation token of the unfiltered "Live chat" view.
///
/// The chat page opens on "Top chat", which hides part of the messages. Its
/// view selector lists "Top chat" first and "Live chat" second.
pub fn live_chat_continuation(data: &Value) -> Option<String> {
    let items = data
        .pointer(
            "/contents/liveChatRenderer/header/liveChatHeaderRenderer/viewSelector\
             /sortFilterSubMenuRenderer/subMenuItems",
        )?
        .as_array()?;
    let item = items.get(1).or(items.last())?;
    item.pointer("/continuation/reloadContinuationData/continuation")?
        .as_str()
        .map(str::to_string)
}

/// Chat items of a live chat page, oldest first.
///
/// A page without a live chat renderer (ended broadcast, premiere, members
/// only) is reported as [`PlatformError::NotLive`].
pub fn parse_chat_items(data: &Value) -> Result<Vec<RawEntry>> {
    let Some(renderer) = data.pointer("/contents/liveChatRenderer") else {
        return Err(PlatformError::NotLive(
            "live chat is not available for this video".to_string(),
        ));
    };

    let mut entries = Vec::new();
    if let Some(actions) = renderer.get("actions").and_then(Value::as_array) {
        for action in actions {
            let Some(item) = action.pointer("/addChatItemAction/item") else {
                continue;
            };
            if let Some(entry) = ChatItem::deserialize(item).ok().and_then(ChatItem::into_entry) {
                entries.push(entry);
            }
        }
    }
    Ok(entries)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChatItem {
    live_chat_text_message_renderer: Option<MessageRenderer>,
    live_chat_paid_message_renderer: Option<MessageRenderer>,
    live_chat_membership_item_renderer: Option<MessageRenderer>,
}

impl ChatItem {
    fn into_entry(self) -> Option<RawEntry> {
        if let Some(renderer) = self.live_chat_paid_message_renderer {
            let amount = renderer
                .purchase_amount_text
                .as_ref()
                .map(|t| t.simple_text.clone())
                .unwrap_or_default();
            return Some(
                renderer
                    .into_entry(|r| r.message.as_ref())
                    .with_marker(EntryMarker::Paid { amount }),
            );
        }
        if let Some(renderer) = self.live_chat_membership_item_renderer {
            return Some(
                renderer
                    .into_entry(|r| r.header_subtext.as_ref())
                    .with_marker(EntryMarker::Membership),
            );
        }
        self.live_chat_text_message_renderer
            .map(|renderer| renderer.into_entry(|r| r.message.as_ref()))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageRenderer {
    id: Option<String>,
    author_name: Option<SimpleText>,
    message: Option<Runs>,
    header_subtext: Option<Runs>,
    purchase_amount_text: Option<SimpleText>,
    timestamp_usec: Option<String>,
}

impl MessageRenderer {
    fn into_entry(self, body: impl Fn(&Self) -> Option<&Runs>) -> RawEntry {
        let (text, links) = match body(&self) {
            Some(runs) => {
                let (text, links) = runs.flatten();
                (Some(text), links)
            }
            None => (None, Vec::new()),
        };

        let mut entry = RawEntry {
            id: self.id,
            author: self.author_name.map(|a| a.simple_text),
            body: text,
            links,
            ..Default::default()
        };
        if let Some(ts) = self
            .timestamp_usec
            .and_then(|t| t.parse::<i64>().ok())
            .and_then(DateTime::from_timestamp_micros)
        {
            entry = entry.with_timestamp(ts);
        }
        entry
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SimpleText {
    simple_text: String,
}

#[derive(Debug, Deserialize)]
struct Runs {
    #[serde(default)]
    runs: Vec<Run>,
}

impl Runs {
    /// Concatenate the runs into a body and collect the linked runs.
    fn flatten(&self) -> (String, Vec<RawLink>) {
        let mut text = String::new();
        let mut links = Vec::new();
        for run in &self.runs {
            if let Some(t) = &run.text {
                text.push_str(t);
                if let Some(url) = run.link_target() {
                    links.push(RawLink::new(t.clone(), url));
                }
            } else if let Some(emoji) = &run.emoji {
                text.push_str(emoji.as_text());
            }
        }
        (text, links)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Run {
    text: Option<String>,
    emoji: Option<Emoji>,
    navigation_endpoint: Option<NavigationEndpoint>,
}

impl Run {
    fn link_target(&self) -> Option<String> {
        let url = &self.navigation_endpoint.as_ref()?.url_endpoint.as_ref()?.url;
        Some(unwrap_redirect(url))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NavigationEndpoint {
    url_endpoint: Option<UrlEndpoint>,
}

#[derive(Debug, Deserialize)]
struct UrlEndpoint {
    url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Emoji {
    #[serde(default)]
    emoji_id: String,
    #[serde(default)]
    shortcuts: Vec<String>,
}

impl Emoji {
    fn as_text(&self) -> &str {
        self.shortcuts.first().map_or(self.emoji_id.as_str(), String::as_str)
    }
}

/// Resolve `youtube.com/redirect?q=...` links to their destination.
fn unwrap_redirect(raw: &str) -> String {
    let Ok(url) = Url::parse(raw) else {
        return raw.to_string();
    };
    if url.path() != "/redirect" {
        return raw.to_string();
    }
    url.query_pairs()
        .find(|(key, _)| key == "q")
        .map(|(_, target)| target.into_owned())
        .unwrap_or_else(|| raw.to_string())
}
