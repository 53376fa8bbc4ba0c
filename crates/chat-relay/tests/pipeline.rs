//! End-to-end tests of the relay pipeline.
//!
//! These tests run the poll loop and the flush timer together against the
//! scripted source and the recording transport, on tokio's paused clock.

use std::sync::Arc;
use std::time::Duration;

use chat_relay::test_utils::{RecordingTransport, ScriptedSource};
use chat_relay::{
    BackoffPolicy, BatchAccumulator, BatchStyle, Dispatcher, PollConfig, PollLoop, RawEntry,
    RelayError, WatchdogConfig, spawn_flusher,
};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

const FLUSH_PERIOD: Duration = Duration::from_secs(5);

/// A running pipeline plus handles to its doubles.
struct Harness {
    source: ScriptedSource,
    transport: Arc<RecordingTransport>,
    cancel: CancellationToken,
    poll: JoinHandle<()>,
    flusher: JoinHandle<()>,
}

impl Harness {
    fn start(source: ScriptedSource, watchdog: WatchdogConfig) -> Self {
        Self::start_with(source, watchdog, Arc::new(RecordingTransport::default()))
    }

    fn start_with(
        source: ScriptedSource,
        watchdog: WatchdogConfig,
        transport: Arc<RecordingTransport>,
    ) -> Self {
        let accumulator = Arc::new(BatchAccumulator::default());
        let dispatcher = Arc::new(Dispatcher::new(
            transport.clone(),
            BatchStyle::new("Scripted", 0x123456),
        ));
        let cancel = CancellationToken::new();

        let config = PollConfig {
            backoff: BackoffPolicy {
                use_jitter: false,
                ..Default::default()
            },
            ..Default::default()
        };
        let poll_loop = PollLoop::new(
            Box::new(source.clone()),
            "chan",
            accumulator.clone(),
            config,
            watchdog,
        );

        let flusher = spawn_flusher(accumulator, dispatcher, FLUSH_PERIOD, cancel.clone());
        let poll = tokio::spawn(poll_loop.run(cancel.clone()));

        Self {
            source,
            transport,
            cancel,
            poll,
            flusher,
        }
    }

    fn descriptions(&self) -> Vec<String> {
        self.transport
            .messages()
            .into_iter()
            .map(|m| m.description)
            .collect()
    }

    async fn stop(self) {
        self.cancel.cancel();
        self.poll.await.unwrap();
        self.flusher.await.unwrap();
    }
}

fn chat(prefix: &str, n: usize) -> Vec<RawEntry> {
    (0..n)
        .map(|i| RawEntry::chat(format!("{prefix}{i}"), format!("line {i}")))
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_entries_are_relayed_in_one_batch() {
    let harness = Harness::start(ScriptedSource::new(), WatchdogConfig::default());

    sleep(Duration::from_millis(100)).await;
    harness.source.push_entries(chat("user", 3));
    sleep(Duration::from_secs(6)).await;

    assert_eq!(
        harness.descriptions(),
        vec!["user0: line 0\nuser1: line 1\nuser2: line 2".to_string()]
    );

    // Nothing new: further flush ticks stay silent.
    sleep(Duration::from_secs(20)).await;
    assert_eq!(harness.transport.call_count(), 1);

    harness.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_drift_is_corrected_and_new_entries_follow() {
    let harness = Harness::start(ScriptedSource::new(), WatchdogConfig::default());

    sleep(Duration::from_millis(100)).await;
    harness.source.push_entries(chat("a", 3));
    sleep(Duration::from_secs(10)).await;
    assert_eq!(harness.transport.call_count(), 1);

    harness.source.set_location("scripted://somewhere-else");
    sleep(Duration::from_secs(21)).await;
    assert_eq!(
        harness.source.navigations(),
        vec!["chan".to_string(), "chan".to_string()]
    );

    harness.source.push_entries(chat("b", 2));
    sleep(Duration::from_secs(5)).await;

    let descriptions = harness.descriptions();
    assert_eq!(descriptions.len(), 2);
    assert_eq!(descriptions[1], "b0: line 0\nb1: line 1");

    harness.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_rotation_follows_new_broadcast() {
    let watchdog = WatchdogConfig {
        rotation_interval: Duration::from_secs(60),
        ..Default::default()
    };
    let harness = Harness::start(ScriptedSource::with_discovery("video-1"), watchdog);

    sleep(Duration::from_secs(1)).await;
    assert_eq!(harness.source.navigations(), vec!["video-1".to_string()]);

    harness.source.set_live_resource(Some("video-2"));
    sleep(Duration::from_secs(60)).await;
    assert_eq!(
        harness.source.navigations(),
        vec!["video-1".to_string(), "video-2".to_string()]
    );

    harness.source.push_entries(chat("new", 1));
    sleep(Duration::from_secs(5)).await;
    assert_eq!(harness.descriptions(), vec!["new0: line 0".to_string()]);

    harness.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_refresh_emits_notice_through_batch() {
    let watchdog = WatchdogConfig {
        refresh_interval: Duration::from_secs(60),
        ..Default::default()
    };
    let harness = Harness::start(ScriptedSource::new(), watchdog);

    sleep(Duration::from_secs(66)).await;
    assert_eq!(harness.source.reloads(), 1);
    assert_eq!(
        harness.descriptions(),
        vec!["[relay] Refreshed scripted chat session for chan after 0h".to_string()]
    );

    harness.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_hung_retrieval_is_retried_after_fixed_delay() {
    let source = ScriptedSource::new();
    source.set_fetch_delay(Some(Duration::from_secs(60)));
    let harness = Harness::start(source, WatchdogConfig::default());

    // First fetch at 0.5s times out at 10.5s, the retry starts at 20.5s.
    sleep(Duration::from_secs(15)).await;
    assert_eq!(harness.source.fetch_count(), 1);
    sleep(Duration::from_secs(10)).await;
    assert_eq!(harness.source.fetch_count(), 2);

    harness.source.set_fetch_delay(None);
    harness.source.push_entries(chat("late", 1));
    // The fetch in flight still times out at 30.5s; the next one at 40.5s succeeds.
    sleep(Duration::from_secs(25)).await;
    assert_eq!(harness.descriptions(), vec!["late0: line 0".to_string()]);

    harness.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_failures_back_off_exponentially() {
    let source = ScriptedSource::new();
    for _ in 0..3 {
        source.fail_next_fetch(RelayError::retrieval("page crashed"));
    }
    let harness = Harness::start(source, WatchdogConfig::default());

    // Fetches at 0.5s, 1.5s and 3.5s fail; the next one runs at 7.5s.
    sleep(Duration::from_secs(7)).await;
    assert_eq!(harness.source.fetch_count(), 3);
    sleep(Duration::from_secs(1)).await;
    assert_eq!(harness.source.fetch_count(), 4);

    harness.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_failed_dispatch_drops_batch_and_keeps_polling() {
    let transport = Arc::new(RecordingTransport::failing());
    let harness = Harness::start_with(
        ScriptedSource::new(),
        WatchdogConfig::default(),
        transport.clone(),
    );

    sleep(Duration::from_millis(100)).await;
    harness.source.push_entries(chat("lost", 2));
    sleep(Duration::from_secs(6)).await;
    assert_eq!(transport.call_count(), 1);

    transport.set_failing(false);
    harness.source.push_entries(chat("kept", 1));
    sleep(Duration::from_secs(5)).await;

    let descriptions = harness.descriptions();
    assert_eq!(descriptions.len(), 2);
    assert_eq!(descriptions[1], "kept0: line 0");

    harness.stop().await;
}
