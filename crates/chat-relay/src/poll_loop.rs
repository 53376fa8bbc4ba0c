//! Top-level driver of one watched source.
//!
//! A single task owns the source handle and interleaves the timed retrieval
//! with the watchdog checks, so no two operations ever touch the handle at
//! the same time. Retrieved deltas are normalized and appended to the shared
//! [`BatchAccumulator`]; dispatch happens elsewhere.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, Interval, MissedTickBehavior, interval_at, sleep_until, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::batch::BatchAccumulator;
use crate::error::{RelayError, Result};
use crate::normalizer::{EventNormalizer, IdentityPolicy};
use crate::retry::{Backoff, BackoffPolicy};
use crate::source::{ChatSource, SessionPhase, SourceState};
use crate::watchdog::{SessionWatchdog, WatchdogAction, WatchdogConfig};

/// Retrieval timing.
#[derive(Debug, Clone, PartialEq)]
pub struct PollConfig {
    /// Pause between successful retrievals
    pub poll_interval: Duration,
    /// Upper bound for a single retrieval
    pub fetch_timeout: Duration,
    /// Fixed wait after a timeout or a "not live" answer
    pub timeout_retry_delay: Duration,
    /// Backoff applied to every other failure
    pub backoff: BackoffPolicy,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            fetch_timeout: Duration::from_secs(10),
            timeout_retry_delay: Duration::from_secs(10),
            backoff: BackoffPolicy::default(),
        }
    }
}

/// Counters of one successful retrieval.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollReport {
    /// Entries past the cursor
    pub new_entries: usize,
    /// Events appended to the batch
    pub events: usize,
    /// Malformed entries dropped by the normalizer
    pub skipped: usize,
}

/// Drives retrieval and session upkeep for one source.
pub struct PollLoop {
    source: Box<dyn ChatSource>,
    state: SourceState,
    normalizer: EventNormalizer,
    accumulator: Arc<BatchAccumulator>,
    watchdog: SessionWatchdog,
    config: PollConfig,
    backoff: Backoff,
}

impl PollLoop {
    pub fn new(
        source: Box<dyn ChatSource>,
        channel: impl Into<String>,
        accumulator: Arc<BatchAccumulator>,
        config: PollConfig,
        watchdog: WatchdogConfig,
    ) -> Self {
        let channel = channel.into();
        let normalizer = EventNormalizer::new(source.identity_policy());
        Self {
            source,
            state: SourceState::new(channel.clone()),
            normalizer,
            accumulator,
            watchdog: SessionWatchdog::new(channel, watchdog),
            backoff: Backoff::new(config.backoff.clone()),
            config,
        }
    }

    /// Override the identity policy advertised by the source.
    pub fn with_identity_policy(mut self, policy: IdentityPolicy) -> Self {
        self.normalizer = EventNormalizer::new(policy);
        self
    }

    pub fn state(&self) -> &SourceState {
        &self.state
    }

    pub fn accumulator(&self) -> &Arc<BatchAccumulator> {
        &self.accumulator
    }

    /// Resolve the resource to watch and point the source at it.
    ///
    /// Sources without discovery watch the channel handle itself. A
    /// discovering source with nothing live yields [`RelayError::NotLive`].
    pub async fn connect(&mut self) -> Result<()> {
        let channel = self.watchdog.channel().to_string();
        let resource_id = if self.source.supports_discovery() {
            self.source
                .resolve_live_resource_id(&channel)
                .await?
                .ok_or_else(|| RelayError::not_live(format!("no live broadcast for {channel}")))?
        } else {
            channel
        };

        self.state.expected_resource_id = resource_id;
        self.state.cursor.reset();
        self.source
            .navigate_to(&self.state.expected_resource_id)
            .await?;
        self.state.mark_refreshed();
        self.state.transition(SessionPhase::Watching);

        info!(
            platform = self.source.platform(),
            resource_id = %self.state.expected_resource_id,
            "Watching live chat"
        );
        Ok(())
    }

    /// Retrieve the current entries once and queue the new ones.
    pub async fn poll_once(&mut self) -> Result<PollReport> {
        let entries = match timeout(
            self.config.fetch_timeout,
            self.source.fetch_current_entries(),
        )
        .await
        {
            Ok(result) => result?,
            Err(_) => return Err(RelayError::RetrievalTimeout(self.config.fetch_timeout)),
        };

        let delta = self.state.cursor.delta(entries.as_slice());
        let mut report = PollReport {
            new_entries: delta.len(),
            ..Default::default()
        };

        for entry in delta {
            match self.normalizer.normalize(entry) {
                Some(event) => {
                    self.accumulator.append(event);
                    report.events += 1;
                }
                None => report.skipped += 1,
            }
        }

        Ok(report)
    }

    /// One iteration of the retrieval schedule. Returns the wait before the next one.
    pub async fn poll_tick(&mut self) -> Duration {
        if self.state.phase() == SessionPhase::Connecting {
            return match self.connect().await {
                Ok(()) => {
                    self.backoff.reset();
                    self.config.poll_interval
                }
                Err(e) => self.recover(e),
            };
        }

        match self.poll_once().await {
            Ok(report) => {
                self.state.transition(SessionPhase::Watching);
                self.backoff.reset();
                if report.new_entries > 0 {
                    debug!(
                        new_entries = report.new_entries,
                        events = report.events,
                        skipped = report.skipped,
                        position = self.state.last_known_position(),
                        "Queued new entries"
                    );
                }
                self.config.poll_interval
            }
            Err(e) => self.recover(e),
        }
    }

    /// Log a failure and pick the wait before the next attempt.
    fn recover(&mut self, err: RelayError) -> Duration {
        // Connection attempts stay in Connecting until one succeeds.
        if self.state.phase() != SessionPhase::Connecting {
            self.state.transition(SessionPhase::Recovering);
        }

        if err.is_benign() {
            debug!(
                platform = self.source.platform(),
                delay = ?self.config.timeout_retry_delay,
                "{}", err
            );
            return self.config.timeout_retry_delay;
        }

        let delay = self.backoff.next_delay();
        warn!(
            platform = self.source.platform(),
            attempt = self.backoff.attempt(),
            ?delay,
            "Retrieval failed: {}", err
        );
        delay
    }

    /// Verify the source location, navigating back on drift.
    pub async fn drift_tick(&mut self) -> Option<WatchdogAction> {
        if self.state.phase() == SessionPhase::Connecting {
            return None;
        }
        match self
            .watchdog
            .check_drift(self.source.as_mut(), &mut self.state)
            .await
        {
            Ok(action) => Some(action),
            Err(e) => {
                warn!(platform = self.source.platform(), "Drift check failed: {}", e);
                self.state.transition(SessionPhase::Recovering);
                None
            }
        }
    }

    /// Follow the live resource if it rotated.
    pub async fn rotation_tick(&mut self) -> Option<WatchdogAction> {
        if self.state.phase() == SessionPhase::Connecting || !self.source.supports_discovery() {
            return None;
        }
        match self
            .watchdog
            .check_rotation(self.source.as_mut(), &mut self.state)
            .await
        {
            Ok(action) => Some(action),
            Err(e) => {
                warn!(platform = self.source.platform(), "Rotation check failed: {}", e);
                self.state.transition(SessionPhase::Recovering);
                None
            }
        }
    }

    /// Reload the session and queue the notice describing it.
    pub async fn refresh_tick(&mut self) -> bool {
        if self.state.phase() == SessionPhase::Connecting {
            return false;
        }
        match self
            .watchdog
            .refresh(self.source.as_mut(), &mut self.state)
            .await
        {
            Ok(notice) => {
                self.accumulator.append(notice);
                true
            }
            Err(e) => {
                warn!(platform = self.source.platform(), "Session refresh failed: {}", e);
                self.state.transition(SessionPhase::Recovering);
                false
            }
        }
    }

    /// Run until `cancel` fires, then release the source.
    ///
    /// Whatever the loop is doing when cancelled is abandoned.
    pub async fn run(mut self, cancel: CancellationToken) {
        let watchdog = self.watchdog.config().clone();
        let mut drift = periodic(watchdog.drift_interval);
        let mut rotation = periodic(watchdog.rotation_interval);
        let mut refresh = periodic(watchdog.refresh_interval);
        let mut next_poll = Instant::now();

        info!(
            platform = self.source.platform(),
            channel = %self.watchdog.channel(),
            "Poll loop started"
        );

        loop {
            let stopped = tokio::select! {
                biased;
                _ = cancel.cancelled() => true,
                _ = refresh.tick() => cancel.run_until_cancelled(self.refresh_tick()).await.is_none(),
                _ = rotation.tick() => cancel.run_until_cancelled(self.rotation_tick()).await.is_none(),
                _ = drift.tick() => cancel.run_until_cancelled(self.drift_tick()).await.is_none(),
                _ = sleep_until(next_poll) => {
                    match cancel.run_until_cancelled(self.poll_tick()).await {
                        Some(delay) => {
                            next_poll = Instant::now() + delay;
                            false
                        }
                        None => true,
                    }
                }
            };
            if stopped {
                break;
            }
        }

        if let Err(e) = self.source.close().await {
            warn!(platform = self.source.platform(), "Failed to close source: {}", e);
        }
        info!(
            platform = self.source.platform(),
            pending = self.accumulator.len(),
            "Poll loop stopped"
        );
    }
}

fn periodic(period: Duration) -> Interval {
    let mut interval = interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{EntryMarker, RawEntry};
    use crate::event::EventKind;
    use crate::test_utils::ScriptedSource;

    fn config() -> PollConfig {
        PollConfig {
            backoff: BackoffPolicy {
                use_jitter: false,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn poll_loop(source: &ScriptedSource) -> PollLoop {
        PollLoop::new(
            Box::new(source.clone()),
            "chan",
            Arc::new(BatchAccumulator::default()),
            config(),
            WatchdogConfig::default(),
        )
    }

    fn chat(n: usize) -> impl Iterator<Item = RawEntry> {
        (0..n).map(|i| RawEntry::chat(format!("user{i}"), format!("msg {i}")))
    }

    #[tokio::test]
    async fn test_connect_watches_channel_without_discovery() {
        let source = ScriptedSource::new();
        let mut poll = poll_loop(&source);

        poll.connect().await.unwrap();
        assert_eq!(poll.state().phase(), SessionPhase::Watching);
        assert_eq!(poll.state().expected_resource_id, "chan");
        assert_eq!(source.navigations(), vec!["chan".to_string()]);
    }

    #[tokio::test]
    async fn test_connect_resolves_live_resource() {
        let source = ScriptedSource::with_discovery("video-1");
        let mut poll = poll_loop(&source);

        poll.connect().await.unwrap();
        assert_eq!(poll.state().expected_resource_id, "video-1");
        assert_eq!(source.navigations(), vec!["video-1".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_offline_channel_waits_fixed_delay() {
        let source = ScriptedSource::with_discovery("video-1");
        source.set_live_resource(None);
        let mut poll = poll_loop(&source);

        assert_eq!(poll.poll_tick().await, Duration::from_secs(10));
        assert_eq!(poll.state().phase(), SessionPhase::Connecting);
        assert!(source.navigations().is_empty());

        source.set_live_resource(Some("video-1"));
        assert_eq!(poll.poll_tick().await, Duration::from_millis(500));
        assert_eq!(poll.state().phase(), SessionPhase::Watching);
    }

    #[tokio::test]
    async fn test_three_entries_then_empty_delta() {
        let source = ScriptedSource::new();
        let mut poll = poll_loop(&source);
        poll.connect().await.unwrap();

        source.push_entries(chat(3));
        let report = poll.poll_once().await.unwrap();
        assert_eq!(report.new_entries, 3);
        assert_eq!(report.events, 3);
        assert_eq!(poll.state().last_known_position(), 3);

        let report = poll.poll_once().await.unwrap();
        assert_eq!(report, PollReport::default());
        assert_eq!(poll.accumulator().len(), 3);
    }

    #[tokio::test]
    async fn test_malformed_entries_are_skipped() {
        let source = ScriptedSource::new();
        let mut poll = poll_loop(&source);
        poll.connect().await.unwrap();

        source.push_entries([
            RawEntry::chat("a", "hi"),
            RawEntry::default(),
            RawEntry::chat("b", "bits").with_marker(EntryMarker::Bits(100)),
        ]);
        let report = poll.poll_once().await.unwrap();
        assert_eq!(report.events, 2);
        assert_eq!(report.skipped, 1);

        let kinds: Vec<_> = poll.accumulator().drain().iter().map(|e| e.kind()).collect();
        assert_eq!(kinds, vec![EventKind::Message, EventKind::Cheer]);
    }

    #[tokio::test]
    async fn test_drift_resets_cursor_before_next_delta() {
        let source = ScriptedSource::new();
        let mut poll = poll_loop(&source);
        poll.connect().await.unwrap();
        source.push_entries(chat(3));
        poll.poll_once().await.unwrap();

        source.set_location("scripted://elsewhere");
        let action = poll.drift_tick().await.unwrap();
        assert!(matches!(action, WatchdogAction::DriftCorrected { .. }));
        assert_eq!(source.navigations().last().unwrap(), "chan");
        assert_eq!(poll.state().last_known_position(), 0);

        source.push_entries(chat(2));
        let report = poll.poll_once().await.unwrap();
        assert_eq!(report.new_entries, 2);
    }

    #[tokio::test]
    async fn test_rotation_skipped_without_discovery() {
        let source = ScriptedSource::new();
        let mut poll = poll_loop(&source);
        poll.connect().await.unwrap();

        assert!(poll.rotation_tick().await.is_none());
        assert_eq!(source.navigations().len(), 1);
    }

    #[tokio::test]
    async fn test_refresh_queues_notice() {
        let source = ScriptedSource::new();
        let mut poll = poll_loop(&source);
        poll.connect().await.unwrap();

        assert!(poll.refresh_tick().await);
        assert_eq!(source.reloads(), 1);
        let batch = poll.accumulator().drain();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].kind(), EventKind::SystemNotice);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_retrieval_times_out() {
        let source = ScriptedSource::new();
        let mut poll = poll_loop(&source);
        poll.connect().await.unwrap();

        source.set_fetch_delay(Some(Duration::from_secs(60)));
        let err = poll.poll_once().await.unwrap_err();
        assert!(matches!(err, RelayError::RetrievalTimeout(_)));

        assert_eq!(poll.poll_tick().await, Duration::from_secs(10));
        assert_eq!(poll.state().phase(), SessionPhase::Recovering);
    }

    #[tokio::test]
    async fn test_errors_back_off_then_reset() {
        let source = ScriptedSource::new();
        let mut poll = poll_loop(&source);
        poll.connect().await.unwrap();

        source.fail_next_fetch(RelayError::retrieval("boom"));
        source.fail_next_fetch(RelayError::retrieval("boom"));
        assert_eq!(poll.poll_tick().await, Duration::from_secs(1));
        assert_eq!(poll.poll_tick().await, Duration::from_secs(2));
        assert_eq!(poll.state().phase(), SessionPhase::Recovering);

        assert_eq!(poll.poll_tick().await, Duration::from_millis(500));
        assert_eq!(poll.state().phase(), SessionPhase::Watching);

        source.fail_next_fetch(RelayError::retrieval("boom"));
        assert_eq!(poll.poll_tick().await, Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_identity_policy_override() {
        let source = ScriptedSource::new();
        let mut poll = poll_loop(&source).with_identity_policy(IdentityPolicy::Lowercase);
        poll.connect().await.unwrap();

        source.push_entries([RawEntry::chat("LoudName", "hey")]);
        poll.poll_once().await.unwrap();
        assert_eq!(poll.accumulator().drain()[0].actor(), "loudname");
    }
}
