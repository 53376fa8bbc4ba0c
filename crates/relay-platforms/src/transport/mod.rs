//! Outbound transports for relayed batches.

mod discord;
mod webhook;

pub use discord::{
    DiscordConfig, DiscordTransport, MAX_EMBED_DESCRIPTION, MAX_EMBEDS, MAX_TOTAL_EMBED_CHARS,
    split_description,
};
pub use webhook::{WebhookAuth, WebhookConfig, WebhookTransport};
