//! Event types and event bus for enrichment run progress
//!
//! Events are broadcast via [`EventBus`] and serialized for SSE transmission.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Candor event types
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum CandorEvent {
    /// A funnel run started
    RunStarted {
        run_id: Uuid,
        /// Candidates entering the first stage (after over-provision truncation)
        candidates: usize,
        /// Stage names in execution order
        stages: Vec<String>,
        timestamp: DateTime<Utc>,
    },

    /// A stage began processing the current candidate set
    StageStarted {
        run_id: Uuid,
        stage: String,
        candidates: usize,
        timestamp: DateTime<Utc>,
    },

    /// A stage finished and its filter was applied
    StageCompleted {
        run_id: Uuid,
        stage: String,
        before: usize,
        after: usize,
        /// Items that errored (non-critical) or were rejected
        failed: usize,
        elapsed_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// Run finished with a summary
    RunCompleted {
        run_id: Uuid,
        survivors: usize,
        /// Stage that eliminated everyone, if the run exited early
        emptied_at: Option<String>,
        elapsed_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// Run aborted on a critical error
    RunFailed {
        run_id: Uuid,
        stage: String,
        kind: String,
        message: String,
        retry_after_secs: u64,
        timestamp: DateTime<Utc>,
    },
}

impl CandorEvent {
    /// Event type name, used as the SSE `event:` field
    pub fn event_type(&self) -> &str {
        match self {
            CandorEvent::RunStarted { .. } => "RunStarted",
            CandorEvent::StageStarted { .. } => "StageStarted",
            CandorEvent::StageCompleted { .. } => "StageCompleted",
            CandorEvent::RunCompleted { .. } => "RunCompleted",
            CandorEvent::RunFailed { .. } => "RunFailed",
        }
    }

    pub fn run_id(&self) -> Uuid {
        match self {
            CandorEvent::RunStarted { run_id, .. }
            | CandorEvent::StageStarted { run_id, .. }
            | CandorEvent::StageCompleted { run_id, .. }
            | CandorEvent::RunCompleted { run_id, .. }
            | CandorEvent::RunFailed { run_id, .. } => *run_id,
        }
    }
}

/// Broadcast event bus
///
/// Cloning shares the underlying channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<CandorEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus buffering `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<CandorEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: CandorEvent,
    ) -> Result<usize, broadcast::error::SendError<CandorEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: CandorEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
