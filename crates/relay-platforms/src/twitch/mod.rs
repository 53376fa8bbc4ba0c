//! Twitch chat over IRC.

pub mod irc;
mod source;

pub use source::{TWITCH_WS_URL, TwitchChatSource};

use chat_relay::BatchStyle;

/// Twitch brand purple.
pub const TWITCH_COLOR: u32 = 0x9146FF;

/// Presentation of relayed Twitch batches.
pub fn batch_style() -> BatchStyle {
    BatchStyle::new("Twitch", TWITCH_COLOR)
}
