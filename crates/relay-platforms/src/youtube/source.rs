//! YouTube chat source reading the live chat page.

use std::sync::Arc;

use async_trait::async_trait;
use chat_relay::{ChatSource, EntrySnapshot, RawEntry};
use reqwest::Client;
use reqwest::header::COOKIE;
use rustc_hash::FxHashSet;
use tracing::{debug, trace};
use url::Url;

use super::page;
use crate::error::{PlatformError, Result};

pub const YOUTUBE_BASE_URL: &str = "https://www.youtube.com";

/// Pre-accepted consent, keeps EU requests off the consent interstitial.
const CONSENT_COOKIE: &str = "SOCS=CAI";

/// Chat source for a YouTube live broadcast.
///
/// Each retrieval loads the "Live chat" view of the chat page and merges its
/// items, by id, into a transcript that only grows until the next
/// navigation. The page only ever shows a sliding window of recent items;
/// merging keeps positions stable for the entry cursor.
pub struct YoutubeChatSource {
    client: Client,
    video_id: Option<String>,
    /// Continuation of the unfiltered view, picked once per navigation
    live_view: Option<String>,
    transcript: EntrySnapshot,
    seen: FxHashSet<String>,
    location: String,
}

impl YoutubeChatSource {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            video_id: None,
            live_view: None,
            transcript: EntrySnapshot::default(),
            seen: FxHashSet::default(),
            location: String::new(),
        }
    }

    pub fn video_id(&self) -> Option<&str> {
        self.video_id.as_deref()
    }

    /// Live chat page of a video.
    pub fn chat_url(video_id: &str) -> String {
        format!("{YOUTUBE_BASE_URL}/live_chat?v={video_id}")
    }

    /// Streams tab of a channel handle.
    pub fn streams_url(channel: &str) -> String {
        format!(
            "{YOUTUBE_BASE_URL}/@{}/streams",
            channel.trim().trim_start_matches('@')
        )
    }

    /// Live chat page opened on a given view.
    pub fn continuation_url(token: &str) -> Result<Url> {
        let base = format!("{YOUTUBE_BASE_URL}/live_chat");
        Url::parse_with_params(&base, [("continuation", token)]).map_err(invalid_url)
    }

    /// Fetch a chat page. Unless redirected, the location is reported as
    /// `canonical`, whichever view was requested.
    async fn get_page(&mut self, url: Url, canonical: &str) -> Result<String> {
        let response = self
            .client
            .get(url.clone())
            .header(COOKIE, CONSENT_COOKIE)
            .send()
            .await?;

        // Redirects count: a consent or sign-in page is not the chat.
        self.location = reported_location(&url, response.url(), canonical);

        let status = response.status();
        if !status.is_success() {
            return Err(PlatformError::protocol(format!(
                "{} returned {}",
                url, status
            )));
        }
        Ok(response.text().await?)
    }

    /// Load the chat page and merge its items into the transcript.
    async fn load(&mut self) -> Result<usize> {
        let video_id = self
            .video_id
            .clone()
            .ok_or_else(|| PlatformError::connection("no video selected"))?;

        let canonical = Self::chat_url(&video_id);
        let url = match &self.live_view {
            Some(token) => Self::continuation_url(token)?,
            None => Url::parse(&canonical).map_err(invalid_url)?,
        };

        let html = self.get_page(url, &canonical).await?;
        let mut data = page::extract_initial_data(&html)?;

        if self.live_view.is_none() {
            match page::live_chat_continuation(&data) {
                Some(token) => {
                    debug!(%video_id, "Switching to the Live chat view");
                    let html = self
                        .get_page(Self::continuation_url(&token)?, &canonical)
                        .await?;
                    data = page::extract_initial_data(&html)?;
                    self.live_view = Some(token);
                }
                None => debug!(%video_id, "No Live chat view offered, reading Top chat"),
            }
        }

        let items = page::parse_chat_items(&data)?;
        let added = self.merge(items);
        trace!(%video_id, added, total = self.transcript.len(), "Merged chat items");
        Ok(added)
    }

    fn merge(&mut self, items: Vec<RawEntry>) -> usize {
        let mut added = 0;
        for item in items {
            if self.seen.insert(entry_key(&item)) {
                Arc::make_mut(&mut self.transcript).push(item);
                added += 1;
            }
        }
        added
    }

    /// Start a fresh transcript. Items already seen on the same video stay
    /// known, so a reload does not relay the page backlog again.
    fn reset_transcript(&mut self) {
        self.transcript = EntrySnapshot::default();
        self.live_view = None;
    }

    fn select_video(&mut self, video_id: &str) {
        if self.video_id.as_deref() != Some(video_id) {
            self.seen.clear();
            self.video_id = Some(video_id.to_string());
        }
        self.reset_transcript();
    }
}

/// Identity of an item across page loads.
fn reported_location(requested: &Url, landed: &Url, canonical: &str) -> String {
    if landed == requested {
        canonical.to_string()
    } else {
        landed.to_string()
    }
}

fn invalid_url(e: url::ParseError) -> PlatformError {
    PlatformError::protocol(format!("invalid live chat url: {e}"))
}

fn entry_key(entry: &RawEntry) -> String {
    match &entry.id {
        Some(id) => id.clone(),
        None => format!(
            "{}|{}|{}",
            entry.author.as_deref().unwrap_or_default(),
            entry
                .observed_at
                .map(|t| t.timestamp_micros())
                .unwrap_or_default(),
            entry.body.as_deref().unwrap_or_default()
        ),
    }
}

#[async_trait]
impl ChatSource for YoutubeChatSource {
    fn platform(&self) -> &str {
        "youtube"
    }

    fn supports_discovery(&self) -> bool {
        true
    }

    fn location_of(&self, resource_id: &str) -> String {
        Self::chat_url(resource_id)
    }

    async fn fetch_current_entries(&mut self) -> chat_relay::Result<EntrySnapshot> {
        self.load().await?;
        Ok(self.transcript.clone())
    }

    async fn current_location(&mut self) -> chat_relay::Result<String> {
        Ok(self.location.clone())
    }

    async fn navigate_to(&mut self, resource_id: &str) -> chat_relay::Result<()> {
        debug!(video_id = %resource_id, "Opening live chat");
        self.select_video(resource_id);
        self.load().await?;
        Ok(())
    }

    async fn reload(&mut self) -> chat_relay::Result<()> {
        self.reset_transcript();
        self.load().await?;
        Ok(())
    }

    async fn resolve_live_resource_id(
        &mut self,
        channel: &str,
    ) -> chat_relay::Result<Option<String>> {
        let url = Self::streams_url(channel);
        let response = self
            .client
            .get(&url)
            .header(COOKIE, CONSENT_COOKIE)
            .send()
            .await
            .map_err(PlatformError::from)?;
        let html = response.text().await.map_err(PlatformError::from)?;

        let video_id = page::extract_video_id(&html);
        debug!(%channel, ?video_id, "Resolved live video");
        Ok(video_id)
    }
}
