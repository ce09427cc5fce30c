//! FIFO backlog for requests denied admission.
//!
//! Pure state with no internal locking or I/O — the manager owns one
//! instance inside its state lock and drives the drain loop. Each entry
//! carries a oneshot completion so the original caller can observe the
//! eventual drain outcome.

use std::collections::VecDeque;

use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::error::NarrateError;

/// Result delivered to a queued caller once its entry drains (or is
/// discarded).
pub type QueueCompletion = oneshot::Receiver<Result<(), NarrateError>>;

/// One backlogged narration request.
pub struct QueueEntry {
    /// Validated, truncated text.
    pub text: String,

    /// When the entry was enqueued; the drain outcome's latency sample is
    /// measured from here.
    pub enqueued_at: Instant,

    /// Completion side of the caller's receiver.
    pub completion: oneshot::Sender<Result<(), NarrateError>>,
}

impl QueueEntry {
    /// Resolve the caller, ignoring a dropped receiver.
    pub fn complete(self, result: Result<(), NarrateError>) {
        let _ = self.completion.send(result);
    }
}

/// Strict-FIFO backlog.
#[derive(Default)]
pub struct Backlog {
    entries: VecDeque<QueueEntry>,
}

impl Backlog {
    /// Empty backlog.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: VecDeque::new(),
        }
    }

    /// Append a request, returning the caller's completion receiver.
    pub fn push(&mut self, text: String) -> QueueCompletion {
        let (tx, rx) = oneshot::channel();
        self.entries.push_back(QueueEntry {
            text,
            enqueued_at: Instant::now(),
            completion: tx,
        });
        rx
    }

    /// Pop the head entry.
    pub fn pop(&mut self) -> Option<QueueEntry> {
        self.entries.pop_front()
    }

    /// Number of waiting entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is waiting.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Take every entry (global stop), leaving the backlog empty.
    pub fn drain_all(&mut self) -> Vec<QueueEntry> {
        self.entries.drain(..).collect()
    }
}
