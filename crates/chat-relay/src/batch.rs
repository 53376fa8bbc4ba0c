//! Shared event queue between the poll path and the flush timer.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;
use tracing::warn;

use crate::event::Event;

/// Default queue length above which a backlog warning is logged.
pub const DEFAULT_BACKLOG_WARN_THRESHOLD: usize = 1000;

/// Queue of normalized events awaiting dispatch.
///
/// `append` and `drain` only hold the lock for a push or a swap, so the
/// producer never waits on dispatch I/O. The queue is not capped: a backlog
/// crossing the warning threshold is reported once per drain cycle.
#[derive(Debug)]
pub struct BatchAccumulator {
    queue: Mutex<Vec<Event>>,
    warn_threshold: usize,
    backlog_reported: AtomicBool,
    appended: AtomicU64,
    drained: AtomicU64,
}

impl Default for BatchAccumulator {
    fn default() -> Self {
        Self::new(DEFAULT_BACKLOG_WARN_THRESHOLD)
    }
}

impl BatchAccumulator {
    pub fn new(warn_threshold: usize) -> Self {
        Self {
            queue: Mutex::new(Vec::new()),
            warn_threshold,
            backlog_reported: AtomicBool::new(false),
            appended: AtomicU64::new(0),
            drained: AtomicU64::new(0),
        }
    }

    /// Queue an event.
    pub fn append(&self, event: Event) {
        let len = {
            let mut queue = self.queue.lock();
            queue.push(event);
            queue.len()
        };
        self.appended.fetch_add(1, Ordering::Relaxed);

        if len > self.warn_threshold && !self.backlog_reported.swap(true, Ordering::Relaxed) {
            warn!(
                queued = len,
                threshold = self.warn_threshold,
                "Event backlog is growing, dispatch is not keeping up"
            );
        }
    }

    /// Remove and return every queued event, in insertion order.
    pub fn drain(&self) -> Vec<Event> {
        let batch = std::mem::take(&mut *self.queue.lock());
        self.drained.fetch_add(batch.len() as u64, Ordering::Relaxed);
        self.backlog_reported.store(false, Ordering::Relaxed);
        batch
    }

    /// Number of events currently queued.
    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total events appended since creation.
    pub fn total_appended(&self) -> u64 {
        self.appended.load(Ordering::Relaxed)
    }

    /// Total events drained since creation.
    pub fn total_drained(&self) -> u64 {
        self.drained.load(Ordering::Relaxed)
    }
}
