//! Batch formatting and dispatch.
//!
//! The flush timer drains the [`BatchAccumulator`] and hands the batch to the
//! [`Dispatcher`], which renders one transcript and makes exactly one send
//! attempt through the configured [`Transport`]. Failed batches are dropped.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::batch::BatchAccumulator;
use crate::error::Result;
use crate::event::{Event, EventKind};

/// Consecutive dispatch failures after which failures are logged as errors.
const FAILURE_ESCALATION_THRESHOLD: u32 = 3;

/// One outbound message describing a whole batch.
#[derive(Debug, Clone, Serialize)]
pub struct FormattedMessage {
    /// Sender name shown by the destination (usually the platform name)
    pub username: String,
    /// Human-readable transcript, one line per event
    pub description: String,
    /// Category color as 0xRRGGBB
    pub color: u32,
    /// Time the batch was formatted
    pub timestamp: DateTime<Utc>,
    /// The events the transcript was rendered from
    pub events: Vec<Event>,
}

impl FormattedMessage {
    pub fn event_count(&self) -> usize {
        self.events.len()
    }
}

/// Outbound destination for formatted batches.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Transport name used in logs.
    fn name(&self) -> &'static str;

    /// Deliver one message. A single attempt; retries are not expected.
    async fn send(&self, message: &FormattedMessage) -> Result<()>;
}

/// Presentation attributes of the outbound message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchStyle {
    pub username: String,
    pub color: u32,
}

impl BatchStyle {
    pub fn new(username: impl Into<String>, color: u32) -> Self {
        Self {
            username: username.into(),
            color,
        }
    }
}

/// Render one transcript line for an event.
pub fn format_line(event: &Event) -> String {
    let actor = event.actor();
    let body = event.body().unwrap_or_default();
    let amount = event.amount().map(ToString::to_string).unwrap_or_default();

    match event.kind() {
        EventKind::Message => format!("{actor}: {body}"),
        EventKind::Subscription => format!("{actor} subscribed"),
        EventKind::Cheer if body.is_empty() => format!("{actor} cheered {amount}"),
        EventKind::Cheer => format!("{actor} cheered {amount}: {body}"),
        EventKind::Donation => format!("{actor} donated {amount}: {body}"),
        EventKind::MembershipJoin => format!("{actor} joined as member"),
        EventKind::SystemNotice => format!("[{actor}] {body}"),
    }
}

/// Render a whole batch, one line per event in batch order.
pub fn format_transcript(events: &[Event]) -> String {
    events.iter().map(format_line).collect::<Vec<_>>().join("\n")
}

/// Result of one flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Nothing to send
    Empty,
    /// The batch was delivered
    Sent(usize),
    /// The transport failed and the batch was dropped
    Dropped(usize),
}

/// Formats batches and sends them through a transport.
pub struct Dispatcher {
    transport: Arc<dyn Transport>,
    style: BatchStyle,
    consecutive_failures: AtomicU32,
}

impl Dispatcher {
    pub fn new(transport: Arc<dyn Transport>, style: BatchStyle) -> Self {
        Self {
            transport,
            style,
            consecutive_failures: AtomicU32::new(0),
        }
    }

    /// Build the outbound message for a batch.
    pub fn format(&self, events: Vec<Event>) -> FormattedMessage {
        FormattedMessage {
            username: self.style.username.clone(),
            description: format_transcript(&events),
            color: self.style.color,
            timestamp: Utc::now(),
            events,
        }
    }

    /// Send a batch. Empty batches never reach the transport.
    pub async fn flush(&self, events: Vec<Event>) -> FlushOutcome {
        if events.is_empty() {
            return FlushOutcome::Empty;
        }

        let count = events.len();
        let message = self.format(events);

        match self.transport.send(&message).await {
            Ok(()) => {
                self.consecutive_failures.store(0, Ordering::Relaxed);
                info!(
                    transport = self.transport.name(),
                    count, "Sent batch of {} events", count
                );
                FlushOutcome::Sent(count)
            }
            Err(e) => {
                let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
                if failures >= FAILURE_ESCALATION_THRESHOLD {
                    error!(
                        transport = self.transport.name(),
                        count, failures, "Dropping batch after dispatch failure: {}", e
                    );
                } else {
                    warn!(
                        transport = self.transport.name(),
                        count, "Dropping batch after dispatch failure: {}", e
                    );
                }
                FlushOutcome::Dropped(count)
            }
        }
    }

    /// Number of failed flushes since the last successful one.
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::Relaxed)
    }
}

/// Spawn the flush timer.
///
/// Each tick drains the accumulator and awaits the dispatch before the next
/// tick, so at most one flush is in flight. The poll path only ever touches
/// the accumulator and is never held up by dispatch. On cancellation the
/// task stops without draining the remaining events.
pub fn spawn_flusher(
    accumulator: Arc<BatchAccumulator>,
    dispatcher: Arc<Dispatcher>,
    period: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(pending = accumulator.len(), "Flusher stopped");
                    break;
                }
                _ = ticker.tick() => {
                    let batch = accumulator.drain();
                    if batch.is_empty() {
                        debug!("No new events to send");
                        continue;
                    }
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            debug!("Abandoning in-flight dispatch on shutdown");
                            break;
                        }
                        _ = dispatcher.flush(batch) => {}
                    }
                }
            }
        }
    })
}
