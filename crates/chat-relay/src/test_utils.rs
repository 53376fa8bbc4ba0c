//! In-memory source and transport doubles for tests.
//!
//! Both types are cheap handles over shared state, so a test can keep a clone
//! to script and inspect the instance it handed to the pipeline.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::dispatcher::{FormattedMessage, Transport};
use crate::entry::RawEntry;
use crate::error::{RelayError, Result};
use crate::normalizer::IdentityPolicy;
use crate::source::{ChatSource, EntrySnapshot};

#[derive(Debug, Default)]
struct ScriptState {
    entries: EntrySnapshot,
    location: String,
    discovery: bool,
    live_resource: Option<String>,
    fetch_delay: Option<Duration>,
    fetch_errors: VecDeque<RelayError>,
    fail_navigation: bool,
    navigations: Vec<String>,
    reloads: usize,
    fetches: usize,
}

/// Scriptable [`ChatSource`].
///
/// Navigation and reload clear the entry list, like a page load would.
#[derive(Debug, Clone, Default)]
pub struct ScriptedSource {
    state: Arc<Mutex<ScriptState>>,
    policy: IdentityPolicy,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// A source whose live resource is discovered from the channel.
    pub fn with_discovery(live_resource: &str) -> Self {
        let source = Self::default();
        {
            let mut state = source.state.lock();
            state.discovery = true;
            state.live_resource = Some(live_resource.to_string());
        }
        source
    }

    pub fn with_identity_policy(mut self, policy: IdentityPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Append entries to the visible list.
    pub fn push_entries(&self, entries: impl IntoIterator<Item = RawEntry>) {
        Arc::make_mut(&mut self.state.lock().entries).extend(entries);
    }

    /// Replace the visible list.
    pub fn replace_entries(&self, entries: Vec<RawEntry>) {
        self.state.lock().entries = Arc::new(entries);
    }

    /// Move the source somewhere else, as an external redirect would.
    pub fn set_location(&self, location: &str) {
        self.state.lock().location = location.to_string();
    }

    pub fn set_live_resource(&self, resource: Option<&str>) {
        self.state.lock().live_resource = resource.map(str::to_string);
    }

    /// Make every fetch take this long.
    pub fn set_fetch_delay(&self, delay: Option<Duration>) {
        self.state.lock().fetch_delay = delay;
    }

    pub fn fail_next_fetch(&self, error: RelayError) {
        self.state.lock().fetch_errors.push_back(error);
    }

    pub fn fail_next_navigation(&self) {
        self.state.lock().fail_navigation = true;
    }

    pub fn navigations(&self) -> Vec<String> {
        self.state.lock().navigations.clone()
    }

    pub fn reloads(&self) -> usize {
        self.state.lock().reloads
    }

    pub fn fetch_count(&self) -> usize {
        self.state.lock().fetches
    }
}

#[async_trait]
impl ChatSource for ScriptedSource {
    fn platform(&self) -> &str {
        "scripted"
    }

    fn identity_policy(&self) -> IdentityPolicy {
        self.policy
    }

    fn supports_discovery(&self) -> bool {
        self.state.lock().discovery
    }

    fn location_of(&self, resource_id: &str) -> String {
        format!("scripted://{resource_id}")
    }

    async fn fetch_current_entries(&mut self) -> Result<EntrySnapshot> {
        let delay = {
            let mut state = self.state.lock();
            state.fetches += 1;
            state.fetch_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock();
        match state.fetch_errors.pop_front() {
            Some(err) => Err(err),
            None => Ok(state.entries.clone()),
        }
    }

    async fn current_location(&mut self) -> Result<String> {
        Ok(self.state.lock().location.clone())
    }

    async fn navigate_to(&mut self, resource_id: &str) -> Result<()> {
        let location = self.location_of(resource_id);
        let mut state = self.state.lock();
        state.navigations.push(resource_id.to_string());
        if std::mem::take(&mut state.fail_navigation) {
            return Err(RelayError::navigation("scripted navigation failure"));
        }
        state.location = location;
        state.entries = EntrySnapshot::default();
        Ok(())
    }

    async fn reload(&mut self) -> Result<()> {
        let mut state = self.state.lock();
        state.reloads += 1;
        state.entries = EntrySnapshot::default();
        Ok(())
    }

    async fn resolve_live_resource_id(&mut self, _channel: &str) -> Result<Option<String>> {
        Ok(self.state.lock().live_resource.clone())
    }
}

/// [`Transport`] that records every message it is asked to send.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    messages: Mutex<Vec<FormattedMessage>>,
    failing: AtomicBool,
    latency: Option<Duration>,
}

impl RecordingTransport {
    /// A transport that rejects every message.
    pub fn failing() -> Self {
        let transport = Self::default();
        transport.set_failing(true);
        transport
    }

    /// A transport that takes `latency` to answer.
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency: Some(latency),
            ..Default::default()
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of send attempts, failed ones included.
    pub fn call_count(&self) -> usize {
        self.messages.lock().len()
    }

    pub fn messages(&self) -> Vec<FormattedMessage> {
        self.messages.lock().clone()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn send(&self, message: &FormattedMessage) -> Result<()> {
        self.messages.lock().push(message.clone());
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(RelayError::dispatch("recording transport set to fail"));
        }
        Ok(())
    }
}
