//! Session drift, rotation and freshness checks.
//!
//! Each check runs against the source handle owned by the poll loop and
//! resets the entry cursor whenever it causes navigation, so the next
//! retrieval starts from the beginning of the new entry list.

use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info};

use crate::error::Result;
use crate::event::Event;
use crate::source::{ChatSource, SessionPhase, SourceState};

/// Periods of the watchdog checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchdogConfig {
    /// How often the source location is verified.
    pub drift_interval: Duration,
    /// How often the live resource is re-resolved.
    pub rotation_interval: Duration,
    /// How often the session is unconditionally reloaded.
    pub refresh_interval: Duration,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            drift_interval: Duration::from_secs(30),
            rotation_interval: Duration::from_secs(5 * 60),
            refresh_interval: Duration::from_secs(12 * 60 * 60),
        }
    }
}

/// What a watchdog check did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchdogAction {
    /// Nothing to correct
    Unchanged,
    /// The source had wandered off and was navigated back
    DriftCorrected { observed: String, expected: String },
    /// A new live resource replaced the previous one
    Rotated { previous: String, current: String },
}

/// Periodic checks guarding a watched session.
#[derive(Debug, Clone)]
pub struct SessionWatchdog {
    config: WatchdogConfig,
    channel: String,
}

impl SessionWatchdog {
    pub fn new(channel: impl Into<String>, config: WatchdogConfig) -> Self {
        Self {
            config,
            channel: channel.into(),
        }
    }

    pub fn config(&self) -> &WatchdogConfig {
        &self.config
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Verify the source points at the expected resource; navigate back if not.
    pub async fn check_drift(
        &self,
        source: &mut dyn ChatSource,
        state: &mut SourceState,
    ) -> Result<WatchdogAction> {
        let expected = source.location_of(&state.expected_resource_id);
        let observed = source.current_location().await?;

        if observed == expected {
            state.mark_verified();
            return Ok(WatchdogAction::Unchanged);
        }

        info!(
            platform = source.platform(),
            %observed,
            %expected,
            "Location changed, navigating back"
        );
        state.transition(SessionPhase::Recovering);
        state.cursor.reset();
        source.navigate_to(&state.expected_resource_id).await?;
        state.mark_verified();

        Ok(WatchdogAction::DriftCorrected { observed, expected })
    }

    /// Re-resolve the live resource and follow it if it changed.
    pub async fn check_rotation(
        &self,
        source: &mut dyn ChatSource,
        state: &mut SourceState,
    ) -> Result<WatchdogAction> {
        let Some(current) = source.resolve_live_resource_id(&self.channel).await? else {
            debug!(channel = %self.channel, "No live resource advertised");
            return Ok(WatchdogAction::Unchanged);
        };

        if current == state.expected_resource_id {
            return Ok(WatchdogAction::Unchanged);
        }

        info!(
            platform = source.platform(),
            channel = %self.channel,
            previous = %state.expected_resource_id,
            %current,
            "New live resource detected"
        );
        let previous = std::mem::replace(&mut state.expected_resource_id, current.clone());
        state.transition(SessionPhase::Recovering);
        state.cursor.reset();
        source.navigate_to(&current).await?;
        state.mark_verified();

        Ok(WatchdogAction::Rotated { previous, current })
    }

    /// Reload the session and describe the refresh as a notice event.
    pub async fn refresh(
        &self,
        source: &mut dyn ChatSource,
        state: &mut SourceState,
    ) -> Result<Event> {
        let age = Utc::now() - state.last_refreshed_at;
        info!(
            platform = source.platform(),
            resource_id = %state.expected_resource_id,
            age_hours = age.num_hours(),
            "Refreshing session"
        );

        state.cursor.reset();
        source.reload().await?;
        state.mark_refreshed();

        Ok(Event::system_notice(format!(
            "Refreshed {} chat session for {} after {}h",
            source.platform(),
            state.expected_resource_id,
            age.num_hours()
        )))
    }
}
