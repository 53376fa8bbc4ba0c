//! Raw entry normalization.
//!
//! Turns a [`RawEntry`] into a canonical [`Event`]: classifies it by its
//! payment/membership markers, canonicalizes the author identity and
//! substitutes embedded link text with the link target.

use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::entry::{EntryMarker, RawEntry, RawLink};
use crate::event::Event;

/// Body used for paid messages sent without any text.
pub const EMPTY_DONATION_BODY: &str = "No message";

/// How a source compares author identities.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityPolicy {
    /// Keep the display name as rendered (only surrounding whitespace is trimmed)
    #[default]
    Preserve,
    /// Lower-case the display name, for sources whose handles are case-insensitive
    Lowercase,
}

impl IdentityPolicy {
    /// Canonicalize a display name.
    pub fn canonicalize(&self, name: &str) -> String {
        let trimmed = name.trim();
        match self {
            Self::Preserve => trimmed.to_string(),
            Self::Lowercase => trimmed.to_lowercase(),
        }
    }
}

/// Entry classification, decided by markers before falling back to a plain message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Donation { amount: String },
    Cheer { bits: u64 },
    Membership,
    Subscription,
    Message,
}

/// Classify an entry.
///
/// Precedence: paid marker, bits, membership, subscription, then plain message.
pub fn classify(entry: &RawEntry) -> Classification {
    let mut bits = None;
    let mut membership = false;
    let mut subscription = false;

    for marker in &entry.markers {
        match marker {
            EntryMarker::Paid { amount } => {
                return Classification::Donation {
                    amount: amount.trim().to_string(),
                };
            }
            EntryMarker::Bits(b) => bits = Some(*b),
            EntryMarker::Membership => membership = true,
            EntryMarker::Subscription => subscription = true,
        }
    }

    if let Some(bits) = bits {
        Classification::Cheer { bits }
    } else if membership {
        Classification::Membership
    } else if subscription {
        Classification::Subscription
    } else {
        Classification::Message
    }
}

/// Replace the visible text of each link with its target.
///
/// Links are applied in order, each replacing only the first occurrence of its
/// text. Links with empty text are ignored.
pub fn resolve_links(body: &str, links: &[RawLink]) -> String {
    let mut resolved = body.to_string();
    for link in links {
        if link.text.is_empty() || link.text == link.href {
            continue;
        }
        resolved = resolved.replacen(&link.text, &link.href, 1);
    }
    resolved
}

/// Reason an entry was skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NormalizationSkip {
    /// The author container was absent or blank
    MissingAuthor,
    /// A plain message without its body container
    MissingBody,
}

impl fmt::Display for NormalizationSkip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingAuthor => f.write_str("missing author"),
            Self::MissingBody => f.write_str("missing message body"),
        }
    }
}

/// Converts raw entries into events.
#[derive(Debug, Clone, Default)]
pub struct EventNormalizer {
    policy: IdentityPolicy,
}

impl EventNormalizer {
    pub fn new(policy: IdentityPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> IdentityPolicy {
        self.policy
    }

    /// Normalize an entry, returning `None` for malformed entries.
    pub fn normalize(&self, entry: &RawEntry) -> Option<Event> {
        match self.try_normalize(entry) {
            Ok(event) => Some(event),
            Err(reason) => {
                trace!(id = ?entry.id, %reason, "Skipping malformed entry");
                None
            }
        }
    }

    /// Normalize an entry, reporting why it was skipped.
    pub fn try_normalize(&self, entry: &RawEntry) -> Result<Event, NormalizationSkip> {
        let actor = entry
            .author
            .as_deref()
            .map(|name| self.policy.canonicalize(name))
            .filter(|name| !name.is_empty())
            .ok_or(NormalizationSkip::MissingAuthor)?;

        let body = entry
            .body
            .as_deref()
            .map(|text| resolve_links(text, &entry.links).trim().to_string());

        let event = match classify(entry) {
            Classification::Donation { amount } => Event::donation(
                actor,
                amount,
                body.filter(|b| !b.is_empty())
                    .unwrap_or_else(|| EMPTY_DONATION_BODY.to_string()),
            ),
            Classification::Cheer { bits } => {
                Event::cheer(actor, bits, body.filter(|b| !b.is_empty()))
            }
            Classification::Membership => Event::membership(actor),
            Classification::Subscription => Event::subscription(actor),
            Classification::Message => {
                Event::message(actor, body.ok_or(NormalizationSkip::MissingBody)?)
            }
        };

        Ok(event.with_timestamp(entry.observed_at.unwrap_or_else(Utc::now)))
    }
}
