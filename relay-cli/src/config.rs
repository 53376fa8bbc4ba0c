//! Configuration file and its merge with the command line.
//!
//! Precedence: command line and environment, then the TOML file, then the
//! built-in defaults.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chat_relay::{
    DEFAULT_BACKLOG_WARN_THRESHOLD, IdentityPolicy, PollConfig, Transport, WatchdogConfig,
};
use relay_platforms::{
    DiscordConfig, DiscordTransport, Platform, WebhookAuth, WebhookConfig, WebhookTransport,
};
use serde::Deserialize;
use url::Url;

use crate::cli::{ActorCase, Args, TransportKind};
use crate::error::{CliError, Result};

/// Contents of the TOML configuration file.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub source: SourceSection,
    pub transport: TransportSection,
    pub timing: TimingSection,
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SourceSection {
    pub platform: Option<Platform>,
    pub channel: Option<String>,
    pub actor_case: Option<ActorCase>,
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TransportSection {
    pub kind: Option<TransportKind>,
    pub url: Option<String>,
    /// Discord username override
    pub username: Option<String>,
    pub avatar_url: Option<String>,
    /// Bearer token for the generic webhook
    pub bearer_token: Option<String>,
    /// Extra headers for the generic webhook
    pub headers: BTreeMap<String, String>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TimingSection {
    pub poll_interval_ms: Option<u64>,
    pub flush_interval_ms: Option<u64>,
    pub fetch_timeout_ms: Option<u64>,
    pub timeout_retry_delay_ms: Option<u64>,
    pub backoff_initial_ms: Option<u64>,
    pub backoff_max_ms: Option<u64>,
    pub backoff_multiplier: Option<f64>,
    pub backoff_jitter: Option<bool>,
    pub drift_interval_secs: Option<u64>,
    pub rotation_interval_secs: Option<u64>,
    pub refresh_interval_secs: Option<u64>,
    pub backlog_warn_threshold: Option<usize>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| CliError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| CliError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Timing of the whole pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct Timing {
    pub poll: PollConfig,
    pub watchdog: WatchdogConfig,
    pub flush_interval: Duration,
    pub backlog_warn_threshold: usize,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            poll: PollConfig::default(),
            watchdog: WatchdogConfig::default(),
            flush_interval: Duration::from_secs(5),
            backlog_warn_threshold: DEFAULT_BACKLOG_WARN_THRESHOLD,
        }
    }
}

impl TimingSection {
    fn apply(&self, timing: &mut Timing) {
        let ms = Duration::from_millis;
        let secs = Duration::from_secs;

        if let Some(v) = self.poll_interval_ms {
            timing.poll.poll_interval = ms(v);
        }
        if let Some(v) = self.flush_interval_ms {
            timing.flush_interval = ms(v);
        }
        if let Some(v) = self.fetch_timeout_ms {
            timing.poll.fetch_timeout = ms(v);
        }
        if let Some(v) = self.timeout_retry_delay_ms {
            timing.poll.timeout_retry_delay = ms(v);
        }
        if let Some(v) = self.backoff_initial_ms {
            timing.poll.backoff.initial_delay_ms = v;
        }
        if let Some(v) = self.backoff_max_ms {
            timing.poll.backoff.max_delay_ms = v;
        }
        if let Some(v) = self.backoff_multiplier {
            timing.poll.backoff.backoff_multiplier = v;
        }
        if let Some(v) = self.backoff_jitter {
            timing.poll.backoff.use_jitter = v;
        }
        if let Some(v) = self.drift_interval_secs {
            timing.watchdog.drift_interval = secs(v);
        }
        if let Some(v) = self.rotation_interval_secs {
            timing.watchdog.rotation_interval = secs(v);
        }
        if let Some(v) = self.refresh_interval_secs {
            timing.watchdog.refresh_interval = secs(v);
        }
        if let Some(v) = self.backlog_warn_threshold {
            timing.backlog_warn_threshold = v;
        }
    }
}

/// Resolved transport settings.
#[derive(Debug, Clone)]
pub enum TransportConfig {
    Discord(DiscordConfig),
    Webhook(WebhookConfig),
}

impl TransportConfig {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Discord(_) => "discord",
            Self::Webhook(_) => "webhook",
        }
    }

    pub fn build(&self) -> Result<Arc<dyn Transport>> {
        let transport: Arc<dyn Transport> = match self {
            Self::Discord(config) => Arc::new(DiscordTransport::new(config.clone())?),
            Self::Webhook(config) => Arc::new(WebhookTransport::new(config.clone())?),
        };
        Ok(transport)
    }
}

/// Fully resolved runtime configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub platform: Platform,
    pub channel: String,
    /// Overrides the policy advertised by the source
    pub identity_policy: Option<IdentityPolicy>,
    pub transport: TransportConfig,
    pub timing: Timing,
}

impl AppConfig {
    /// Load the file named by `--config`, if any, and merge it with the arguments.
    pub fn load(args: &Args) -> Result<Self> {
        let file = match &args.config {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };
        Self::merge(args, file)
    }

    pub fn merge(args: &Args, file: FileConfig) -> Result<Self> {
        let platform = args
            .platform
            .or(file.source.platform)
            .unwrap_or(Platform::Twitch);

        let channel = args
            .channel
            .clone()
            .or(file.source.channel)
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or_else(|| {
                CliError::config("no channel given (use --channel or RELAY_CHANNEL)")
            })?;

        let identity_policy = args
            .actor_case
            .or(file.source.actor_case)
            .map(IdentityPolicy::from);

        let url = args
            .webhook_url
            .clone()
            .or(file.transport.url.clone())
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| {
                CliError::config("no webhook URL given (use --webhook-url or DISCORD_WEBHOOK_URL)")
            })?;
        validate_url(&url)?;

        let kind = args
            .transport
            .or(file.transport.kind)
            .unwrap_or(TransportKind::Discord);
        let transport = build_transport_config(kind, url, file.transport);

        let mut timing = Timing::default();
        file.timing.apply(&mut timing);
        validate_timing(&timing)?;

        Ok(Self {
            platform,
            channel,
            identity_policy,
            transport,
            timing,
        })
    }
}

fn build_transport_config(
    kind: TransportKind,
    url: String,
    section: TransportSection,
) -> TransportConfig {
    match kind {
        TransportKind::Discord => {
            let mut config = DiscordConfig::new(url);
            config.username = section.username;
            config.avatar_url = section.avatar_url;
            if let Some(timeout) = section.timeout_secs {
                config.timeout_secs = timeout;
            }
            TransportConfig::Discord(config)
        }
        TransportKind::Webhook => {
            let mut config = WebhookConfig::new(url);
            config.headers = section.headers.into_iter().collect();
            config.auth = section
                .bearer_token
                .map(|token| WebhookAuth::Bearer { token });
            if let Some(timeout) = section.timeout_secs {
                config.timeout_secs = timeout;
            }
            TransportConfig::Webhook(config)
        }
    }
}

fn validate_url(raw: &str) -> Result<()> {
    let url = Url::parse(raw)
        .map_err(|e| CliError::config(format!("invalid webhook URL: {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(CliError::config(format!(
            "webhook URL must be http or https, got {other}"
        ))),
    }
}

fn validate_timing(timing: &Timing) -> Result<()> {
    let periods = [
        ("poll_interval_ms", timing.poll.poll_interval),
        ("flush_interval_ms", timing.flush_interval),
        ("fetch_timeout_ms", timing.poll.fetch_timeout),
        ("drift_interval_secs", timing.watchdog.drift_interval),
        ("rotation_interval_secs", timing.watchdog.rotation_interval),
        ("refresh_interval_secs", timing.watchdog.refresh_interval),
    ];
    if let Some((name, _)) = periods.iter().find(|(_, d)| d.is_zero()) {
        return Err(CliError::config(format!("{name} must be greater than zero")));
    }

    let backoff = &timing.poll.backoff;
    if backoff.initial_delay_ms == 0 || backoff.max_delay_ms < backoff.initial_delay_ms {
        return Err(CliError::config(
            "backoff_max_ms must be at least backoff_initial_ms, which must be positive",
        ));
    }
    if backoff.backoff_multiplier.is_nan() || backoff.backoff_multiplier < 1.0 {
        return Err(CliError::config("backoff_multiplier must be at least 1.0"));
    }
    Ok(())
}
