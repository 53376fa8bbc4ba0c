//! Raw entries as exposed by a chat source.
//!
//! Adapters translate their native representation (rendered chat rows, IRC
//! lines, JSON renderers) into [`RawEntry`] values. Fields are optional on
//! purpose: a malformed row is carried through and rejected by the
//! normalizer rather than aborting the whole retrieval.

use chrono::{DateTime, Utc};

/// A hyperlink embedded in a message body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLink {
    /// Visible link text, as it appears inside the body
    pub text: String,
    /// Link target
    pub href: String,
}

impl RawLink {
    pub fn new(text: impl Into<String>, href: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            href: href.into(),
        }
    }
}

/// Payment or membership marker found on an entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryMarker {
    /// Paid message with its displayed purchase amount
    Paid { amount: String },
    /// Bits attached to a message
    Bits(u64),
    /// Membership announcement
    Membership,
    /// Subscription announcement
    Subscription,
}

/// One chat entry in its source-native shape.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawEntry {
    /// Platform message id, when the source exposes one
    pub id: Option<String>,
    /// Author display name; `None` when the author container was missing
    pub author: Option<String>,
    /// Message body text; `None` when the body container was missing
    pub body: Option<String>,
    /// Links embedded in the body
    pub links: Vec<RawLink>,
    /// Payment/membership markers
    pub markers: Vec<EntryMarker>,
    /// Time the source reports for the entry
    pub observed_at: Option<DateTime<Utc>>,
}

impl RawEntry {
    /// Create a plain chat entry.
    pub fn chat(author: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            author: Some(author.into()),
            body: Some(body.into()),
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_link(mut self, link: RawLink) -> Self {
        self.links.push(link);
        self
    }

    pub fn with_marker(mut self, marker: EntryMarker) -> Self {
        self.markers.push(marker);
        self
    }

    pub fn with_timestamp(mut self, observed_at: DateTime<Utc>) -> Self {
        self.observed_at = Some(observed_at);
        self
    }
}
