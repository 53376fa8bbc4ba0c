//! Chat source abstraction and per-session state.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::cursor::EntryCursor;
use crate::entry::RawEntry;
use crate::error::Result;
use crate::normalizer::IdentityPolicy;

/// Shared view of a source's full entry list.
///
/// Handing one out is a reference count bump. A source appending to its own
/// copy through [`Arc::make_mut`] only copies the list while a handed-out
/// snapshot is still alive.
pub type EntrySnapshot = Arc<Vec<RawEntry>>;

/// A live chat surface the relay can observe.
///
/// Implementations own the underlying resource handle (page, connection).
/// All methods take `&mut self`: the poll loop is the only caller and never
/// issues two operations on the same source concurrently.
#[async_trait]
pub trait ChatSource: Send {
    /// Platform name, used in logs and notices.
    fn platform(&self) -> &str;

    /// How the platform compares author names.
    fn identity_policy(&self) -> IdentityPolicy {
        IdentityPolicy::Preserve
    }

    /// Whether the live resource has to be discovered from the channel handle.
    ///
    /// Sources returning `false` watch the channel handle itself.
    fn supports_discovery(&self) -> bool {
        false
    }

    /// Canonical location of a resource, comparable with [`ChatSource::current_location`].
    fn location_of(&self, resource_id: &str) -> String;

    /// Full current list of entries, oldest first.
    async fn fetch_current_entries(&mut self) -> Result<EntrySnapshot>;

    /// Where the source is actually pointed right now.
    async fn current_location(&mut self) -> Result<String>;

    /// Point the source at a resource. The entry list starts over.
    async fn navigate_to(&mut self, resource_id: &str) -> Result<()>;

    /// Reload the current resource. The entry list starts over.
    async fn reload(&mut self) -> Result<()>;

    /// Look up the current live resource for a channel handle.
    async fn resolve_live_resource_id(&mut self, channel: &str) -> Result<Option<String>>;

    /// Release the underlying resource.
    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Lifecycle phase of a watched session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Resolving and opening the resource
    Connecting,
    /// Retrieving entries normally
    Watching,
    /// Waiting out a failure or a corrective navigation
    Recovering,
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connecting => f.write_str("connecting"),
            Self::Watching => f.write_str("watching"),
            Self::Recovering => f.write_str("recovering"),
        }
    }
}

/// Mutable state of one watched session, owned by the poll loop.
#[derive(Debug, Clone)]
pub struct SourceState {
    /// Resource the source is supposed to point at (channel or video id)
    pub expected_resource_id: String,
    /// Read position in the current entry list
    pub cursor: EntryCursor,
    /// Last time the location was confirmed
    pub last_verified_at: Option<DateTime<Utc>>,
    /// Last time the session was (re)opened
    pub last_refreshed_at: DateTime<Utc>,
    phase: SessionPhase,
}

impl SourceState {
    pub fn new(expected_resource_id: impl Into<String>) -> Self {
        Self {
            expected_resource_id: expected_resource_id.into(),
            cursor: EntryCursor::new(),
            last_verified_at: None,
            last_refreshed_at: Utc::now(),
            phase: SessionPhase::Connecting,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Consumed entry count of the current session.
    pub fn last_known_position(&self) -> usize {
        self.cursor.position()
    }

    /// Move to another phase, logging actual changes.
    pub fn transition(&mut self, next: SessionPhase) {
        if self.phase == next {
            return;
        }
        match next {
            SessionPhase::Watching => info!(
                resource_id = %self.expected_resource_id,
                "Session {} -> {}", self.phase, next
            ),
            _ => debug!(
                resource_id = %self.expected_resource_id,
                "Session {} -> {}", self.phase, next
            ),
        }
        self.phase = next;
    }

    pub fn mark_verified(&mut self) {
        self.last_verified_at = Some(Utc::now());
    }

    pub fn mark_refreshed(&mut self) {
        let now = Utc::now();
        self.last_refreshed_at = now;
        self.last_verified_at = Some(now);
    }
}
