//! Scrape progress events and the broadcast event bus
//!
//! Events are fire-and-forget: the job orchestrator emits them as work
//! progresses and any number of subscribers (SSE clients, tests) observe them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Scrape job progress events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ScrapeEvent {
    /// Job accepted and about to authenticate
    JobStarted {
        job_id: Uuid,
        sections: Vec<String>,
        total_items: usize,
        timestamp: DateTime<Utc>,
    },

    /// One (section, id) pair extracted successfully
    ItemCompleted {
        job_id: Uuid,
        section: String,
        source_id: Option<String>,
        records: usize,
        current: usize,
        total: usize,
        timestamp: DateTime<Utc>,
    },

    /// One (section, id) pair failed after retries
    ItemFailed {
        job_id: Uuid,
        section: String,
        source_id: Option<String>,
        message: String,
        current: usize,
        total: usize,
        timestamp: DateTime<Utc>,
    },

    /// Job reached Completed
    JobCompleted {
        job_id: Uuid,
        status: String,
        records: usize,
        errors: usize,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// Job reached Failed
    JobFailed {
        job_id: Uuid,
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// Job stopped on request before finishing its work
    JobCancelled {
        job_id: Uuid,
        current: usize,
        total: usize,
        timestamp: DateTime<Utc>,
    },
}

impl ScrapeEvent {
    /// SSE event name
    pub fn event_type(&self) -> &'static str {
        match self {
            ScrapeEvent::JobStarted { .. } => "JobStarted",
            ScrapeEvent::ItemCompleted { .. } => "ItemCompleted",
            ScrapeEvent::ItemFailed { .. } => "ItemFailed",
            ScrapeEvent::JobCompleted { .. } => "JobCompleted",
            ScrapeEvent::JobFailed { .. } => "JobFailed",
            ScrapeEvent::JobCancelled { .. } => "JobCancelled",
        }
    }

    /// Job this event belongs to
    pub fn job_id(&self) -> Uuid {
        match self {
            ScrapeEvent::JobStarted { job_id, .. }
            | ScrapeEvent::ItemCompleted { job_id, .. }
            | ScrapeEvent::ItemFailed { job_id, .. }
            | ScrapeEvent::JobCompleted { job_id, .. }
            | ScrapeEvent::JobFailed { job_id, .. }
            | ScrapeEvent::JobCancelled { job_id, .. } => *job_id,
        }
    }
}

/// Broadcast bus for [`ScrapeEvent`]s
///
/// Cloning is cheap; all clones share one channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ScrapeEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// Slow subscribers lose the oldest events once `capacity` is exceeded.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<ScrapeEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: ScrapeEvent,
    ) -> Result<usize, broadcast::error::SendError<ScrapeEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: ScrapeEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
