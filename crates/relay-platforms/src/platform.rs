//! Supported chat platforms.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chat_relay::{BatchStyle, ChatSource};
use serde::{Deserialize, Serialize};

use crate::error::{PlatformError, Result};
use crate::http::build_client;
use crate::twitch::{self, TwitchChatSource};
use crate::youtube::{self, YoutubeChatSource};

/// A chat platform with a source adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Twitch,
    Youtube,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Twitch => "twitch",
            Self::Youtube => "youtube",
        }
    }

    /// Presentation of batches relayed from this platform.
    pub fn batch_style(&self) -> BatchStyle {
        match self {
            Self::Twitch => twitch::batch_style(),
            Self::Youtube => youtube::batch_style(),
        }
    }

    /// Create a fresh source for this platform.
    ///
    /// `request_timeout` bounds individual connects and page loads.
    pub fn create_source(&self, request_timeout: Duration) -> Result<Box<dyn ChatSource>> {
        let source: Box<dyn ChatSource> = match self {
            Self::Twitch => {
                Box::new(TwitchChatSource::new().with_connect_timeout(request_timeout))
            }
            Self::Youtube => Box::new(YoutubeChatSource::new(build_client(request_timeout)?)),
        };
        Ok(source)
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = PlatformError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "twitch" => Ok(Self::Twitch),
            "youtube" | "yt" => Ok(Self::Youtube),
            other => Err(PlatformError::protocol(format!(
                "unsupported platform: {other}"
            ))),
        }
    }
}
