//! Chat relay: incremental live chat extraction and batched relaying.
//!
//! This crate holds the platform-neutral pipeline that watches a live chat
//! surface, picks up the entries that appeared since the last look, and
//! relays them downstream in timed batches.
//!
//! ## Pipeline
//!
//! - [`ChatSource`] - Trait for platform adapters (page, protocol client)
//! - [`EntryCursor`] - Yields the unseen suffix of a growing entry list
//! - [`EventNormalizer`] - Turns a [`RawEntry`] into a canonical [`Event`]
//! - [`BatchAccumulator`] - Shared queue between the poll path and the flush timer
//! - [`Dispatcher`] - Formats a batch and sends it through a [`Transport`]
//!
//! ## Resilience
//!
//! - [`PollLoop`] - Timed retrieval with timeout and backoff
//! - [`SessionWatchdog`] - Drift, rotation and refresh checks
//! - [`BackoffPolicy`] - Bounded exponential backoff
//!
//! ## Testing
//!
//! - [`test_utils::ScriptedSource`] - Scriptable in-memory source
//! - [`test_utils::RecordingTransport`] - Transport recording every send

pub mod batch;
pub mod cursor;
pub mod dispatcher;
pub mod entry;
pub mod error;
pub mod event;
pub mod normalizer;
pub mod poll_loop;
pub mod retry;
pub mod source;
pub mod test_utils;
pub mod watchdog;

pub use batch::{BatchAccumulator, DEFAULT_BACKLOG_WARN_THRESHOLD};
pub use cursor::EntryCursor;
pub use dispatcher::{
    BatchStyle, Dispatcher, FlushOutcome, FormattedMessage, Transport, format_line,
    format_transcript, spawn_flusher,
};
pub use entry::{EntryMarker, RawEntry, RawLink};
pub use error::{RelayError, Result};
pub use event::{Amount, Event, EventKind};
pub use normalizer::{EventNormalizer, IdentityPolicy, NormalizationSkip, classify, resolve_links};
pub use poll_loop::{PollConfig, PollLoop, PollReport};
pub use retry::{Backoff, BackoffPolicy};
pub use source::{ChatSource, EntrySnapshot, SessionPhase, SourceState};
pub use watchdog::{SessionWatchdog, WatchdogAction, WatchdogConfig};
