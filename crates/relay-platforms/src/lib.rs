//! Platform adapters for chat-relay.
//!
//! Sources read live chat from a streaming platform and expose it as a
//! transcript of [`chat_relay::RawEntry`] values; transports deliver the
//! formatted batches.
//!
//! ## Sources
//!
//! - [`TwitchChatSource`] - anonymous IRC over WebSocket
//! - [`YoutubeChatSource`] - live chat page, with live video discovery
//!
//! ## Transports
//!
//! - [`DiscordTransport`] - Discord webhook embeds
//! - [`WebhookTransport`] - generic JSON webhook

pub mod error;
pub mod http;
pub mod platform;
pub mod transport;
pub mod twitch;
pub mod youtube;

pub use error::{PlatformError, Result};
pub use http::{build_client, install_rustls_provider};
pub use platform::Platform;
pub use transport::{
    DiscordConfig, DiscordTransport, WebhookAuth, WebhookConfig, WebhookTransport,
};
pub use twitch::TwitchChatSource;
pub use youtube::YoutubeChatSource;
