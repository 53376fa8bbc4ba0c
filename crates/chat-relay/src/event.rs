//! Canonical event types.
//!
//! Every source-specific entry is normalized into an [`Event`] before it is
//! queued for dispatch.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of relayed event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Regular chat message
    Message,
    /// Channel subscription (new, renewed or gifted)
    Subscription,
    /// Bits cheer
    Cheer,
    /// Paid message / donation
    Donation,
    /// New channel member
    MembershipJoin,
    /// Notice generated by the relay itself
    SystemNotice,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Message => "message",
            Self::Subscription => "subscription",
            Self::Cheer => "cheer",
            Self::Donation => "donation",
            Self::MembershipJoin => "membership_join",
            Self::SystemNotice => "system_notice",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Monetary or virtual-currency amount attached to a cheer or a donation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "unit", content = "value", rename_all = "snake_case")]
pub enum Amount {
    /// Twitch bits
    Bits(u64),
    /// Currency amount exactly as displayed by the source (e.g. "$5.00", "¥1,000")
    Currency(String),
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bits(bits) => write!(f, "{bits} bits"),
            Self::Currency(text) => f.write_str(text),
        }
    }
}

/// A normalized chat event.
///
/// Constructed only through the kind-specific constructors, which keep the
/// invariants: `body` is always present for messages and donations, and
/// `amount` is only ever set for cheers and donations. It is serialized for
/// outbound payloads but never deserialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Event {
    kind: EventKind,
    actor: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    amount: Option<Amount>,
    occurred_at: DateTime<Utc>,
}

impl Event {
    /// Create a chat message.
    pub fn message(actor: impl Into<String>, body: impl Into<String>) -> Self {
        Self::new(EventKind::Message, actor.into(), Some(body.into()), None)
    }

    /// Create a subscription notification.
    pub fn subscription(actor: impl Into<String>) -> Self {
        Self::new(EventKind::Subscription, actor.into(), None, None)
    }

    /// Create a cheer. The attached message is optional.
    pub fn cheer(actor: impl Into<String>, bits: u64, body: Option<String>) -> Self {
        Self::new(
            EventKind::Cheer,
            actor.into(),
            body,
            Some(Amount::Bits(bits)),
        )
    }

    /// Create a donation.
    pub fn donation(
        actor: impl Into<String>,
        amount: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self::new(
            EventKind::Donation,
            actor.into(),
            Some(body.into()),
            Some(Amount::Currency(amount.into())),
        )
    }

    /// Create a membership join notification.
    pub fn membership(actor: impl Into<String>) -> Self {
        Self::new(EventKind::MembershipJoin, actor.into(), None, None)
    }

    /// Create a notice emitted by the relay itself.
    pub fn system_notice(text: impl Into<String>) -> Self {
        Self::new(
            EventKind::SystemNotice,
            "relay".to_string(),
            Some(text.into()),
            None,
        )
    }

    fn new(kind: EventKind, actor: String, body: Option<String>, amount: Option<Amount>) -> Self {
        Self {
            kind,
            actor,
            body,
            amount,
            occurred_at: Utc::now(),
        }
    }

    /// Set the time the event occurred at.
    pub fn with_timestamp(mut self, occurred_at: DateTime<Utc>) -> Self {
        self.occurred_at = occurred_at;
        self
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn actor(&self) -> &str {
        &self.actor
    }

    pub fn body(&self) -> Option<&str> {
        self.body.as_deref()
    }

    pub fn amount(&self) -> Option<&Amount> {
        self.amount.as_ref()
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_has_body_and_no_amount() {
        let event = Event::message("alice", "hello");
        assert_eq!(event.kind(), EventKind::Message);
        assert_eq!(event.body(), Some("hello"));
        assert!(event.amount().is_none());
    }

    #[test]
    fn test_cheer_and_donation_carry_amounts() {
        let cheer = Event::cheer("bob", 100, None);
        assert_eq!(cheer.amount(), Some(&Amount::Bits(100)));
        assert!(cheer.body().is_none());

        let donation = Event::donation("carol", "$5.00", "keep it up");
        assert_eq!(
            donation.amount(),
            Some(&Amount::Currency("$5.00".to_string()))
        );
        assert_eq!(donation.body(), Some("keep it up"));
    }

    #[test]
    fn test_membership_and_subscription_are_bare() {
        for event in [Event::membership("dave"), Event::subscription("erin")] {
            assert!(event.body().is_none());
            assert!(event.amount().is_none());
        }
    }

    #[test]
    fn test_amount_display() {
        assert_eq!(Amount::Bits(250).to_string(), "250 bits");
        assert_eq!(Amount::Currency("€2.00".into()).to_string(), "€2.00");
    }

    #[test]
    fn test_serialization_shape() {
        let event = Event::cheer("bob", 5, Some("gg".into()));
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "cheer");
        assert_eq!(json["amount"]["unit"], "bits");
        assert_eq!(json["amount"]["value"], 5);

        let bare = serde_json::to_value(Event::subscription("erin")).unwrap();
        assert!(bare.get("body").is_none());
        assert!(bare.get("amount").is_none());
    }

    #[test]
    fn test_donation_serializes_with_body() {
        let json = serde_json::to_value(Event::donation("carol", "$5.00", "thanks")).unwrap();
        assert_eq!(json["kind"], "donation");
        assert_eq!(json["body"], "thanks");
        assert_eq!(json["amount"]["unit"], "currency");
        assert_eq!(json["amount"]["value"], "$5.00");
        assert!(json["occurred_at"].is_string());
    }
}
