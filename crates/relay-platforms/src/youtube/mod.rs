//! YouTube live chat.

pub mod page;
mod source;

pub use source::{YOUTUBE_BASE_URL, YoutubeChatSource};

use chat_relay::BatchStyle;

/// YouTube red, as used for Discord embeds.
pub const YOUTUBE_COLOR: u32 = 15548997;

/// Presentation of relayed YouTube batches.
pub fn batch_style() -> BatchStyle {
    BatchStyle::new("YouTube", YOUTUBE_COLOR)
}
