use std::path::PathBuf;

use chat_relay::IdentityPolicy;
use clap::{Parser, ValueEnum};
use relay_platforms::Platform;
use serde::{Deserialize, Serialize};

#[derive(Parser, Debug, Clone)]
#[command(
    name = "relay",
    version,
    about = "Relay live chat from Twitch or YouTube to a Discord webhook",
    long_about = "Watches the live chat of one channel and forwards new messages, \
                  subscriptions, cheers, donations and memberships in periodic \
                  batches to a Discord webhook or a generic JSON webhook."
)]
pub struct Args {
    /// Chat platform to read from (twitch, youtube)
    #[arg(short, long, env = "RELAY_PLATFORM")]
    pub platform: Option<Platform>,

    /// Channel to watch (Twitch login or YouTube handle)
    #[arg(short, long, env = "RELAY_CHANNEL")]
    pub channel: Option<String>,

    /// Webhook endpoint receiving the batches
    #[arg(short, long, env = "DISCORD_WEBHOOK_URL", hide_env_values = true)]
    pub webhook_url: Option<String>,

    /// Outbound transport
    #[arg(short, long, env = "RELAY_TRANSPORT", value_enum)]
    pub transport: Option<TransportKind>,

    /// TOML configuration file
    #[arg(long, env = "RELAY_CONFIG")]
    pub config: Option<PathBuf>,

    /// How author names are compared and shown
    #[arg(long, value_enum)]
    pub actor_case: Option<ActorCase>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Discord webhook embeds
    Discord,
    /// Generic JSON webhook
    Webhook,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActorCase {
    /// Keep names as displayed
    Preserve,
    /// Lower-case names
    Lowercase,
}

impl From<ActorCase> for IdentityPolicy {
    fn from(case: ActorCase) -> Self {
        match case {
            ActorCase::Preserve => IdentityPolicy::Preserve,
            ActorCase::Lowercase => IdentityPolicy::Lowercase,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human readable
    Pretty,
    /// One JSON object per line
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_args() {
        let args = Args::try_parse_from([
            "relay",
            "--platform",
            "youtube",
            "--channel",
            "@SomeChannel",
            "--webhook-url",
            "https://discord.com/api/webhooks/1/abc",
            "--actor-case",
            "lowercase",
            "-v",
        ])
        .unwrap();

        assert_eq!(args.platform, Some(Platform::Youtube));
        assert_eq!(args.channel.as_deref(), Some("@SomeChannel"));
        assert_eq!(args.actor_case, Some(ActorCase::Lowercase));
        assert!(args.verbose);
        assert_eq!(args.log_format, LogFormat::Pretty);
    }

    #[test]
    fn test_verbose_conflicts_with_quiet() {
        assert!(Args::try_parse_from(["relay", "-v", "-q"]).is_err());
    }

    #[test]
    fn test_unknown_platform_rejected() {
        assert!(Args::try_parse_from(["relay", "--platform", "myspace"]).is_err());
    }
}
