//! Event bus for workflow observability events.
//!
//! Uses [`tokio::sync::broadcast`] for fan-out delivery to multiple
//! subscribers. Emission is fire-and-forget: with no subscribers events
//! are dropped, and a lagging subscriber skips what it missed rather
//! than stalling the emitter.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;

/// An observability event for one workflow.
///
/// Snapshot-shaped payloads (`state`, `report`) are carried as JSON so
/// the bus stays decoupled from the crates that produce them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum WorkflowEvent {
    /// The browser state after a session mutation.
    BrowserState {
        /// The workflow whose session changed.
        workflow_id: String,
        /// Full browser-state snapshot.
        state: Value,
    },
    /// A new plan version was appended.
    PlanUpdated {
        /// The workflow whose plan changed.
        workflow_id: String,
        /// The new version number.
        version: u32,
    },
    /// A node finished executing (any terminal status).
    NodeExecuted {
        /// The workflow being executed.
        workflow_id: String,
        /// The execution run.
        execution_id: String,
        /// The per-node report entry.
        report: Value,
    },
    /// An execution run began.
    ExecutionStarted {
        /// The workflow being executed.
        workflow_id: String,
        /// The execution run.
        execution_id: String,
    },
    /// An execution run reached a terminal state.
    ExecutionFinished {
        /// The workflow that was executed.
        workflow_id: String,
        /// The execution run.
        execution_id: String,
        /// Terminal status (`completed`, `failed`, `cancelled`).
        status: String,
        /// Wall-clock duration of the run.
        duration: Duration,
    },
}

impl WorkflowEvent {
    /// The workflow this event belongs to.
    #[must_use]
    pub fn workflow_id(&self) -> &str {
        match self {
            Self::BrowserState { workflow_id, .. }
            | Self::PlanUpdated { workflow_id, .. }
            | Self::NodeExecuted { workflow_id, .. }
            | Self::ExecutionStarted { workflow_id, .. }
            | Self::ExecutionFinished { workflow_id, .. } => workflow_id,
        }
    }

    /// The wire name of this event (`browser_state`, `plan_updated`, ...).
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::BrowserState { .. } => "browser_state",
            Self::PlanUpdated { .. } => "plan_updated",
            Self::NodeExecuted { .. } => "node_executed",
            Self::ExecutionStarted { .. } => "execution_started",
            Self::ExecutionFinished { .. } => "execution_finished",
        }
    }
}

/// Broadcast-based event bus.
pub struct EventBus {
    sender: broadcast::Sender<WorkflowEvent>,
    emitted: AtomicU64,
}

impl EventBus {
    /// Create a bus with the given channel capacity.
    ///
    /// When the channel is full the oldest events are dropped; lagging
    /// subscribers observe the gap and continue.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            emitted: AtomicU64::new(0),
        }
    }

    /// Emit an event to every active subscriber.
    pub fn emit(&self, event: WorkflowEvent) {
        self.emitted.fetch_add(1, Ordering::Relaxed);
        // No active receivers is fine.
        let _ = self.sender.send(event);
    }

    /// Subscribe to events emitted from now on.
    pub fn subscribe(&self) -> EventSubscriber {
        EventSubscriber {
            receiver: self.sender.subscribe(),
        }
    }

    /// Total events emitted since creation.
    #[must_use]
    pub fn total_emitted(&self) -> u64 {
        self.emitted.load(Ordering::Relaxed)
    }

    /// Number of active subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Subscription handle for receiving events from the [`EventBus`].
pub struct EventSubscriber {
    receiver: broadcast::Receiver<WorkflowEvent>,
}

impl EventSubscriber {
    /// Receive the next event, waiting asynchronously.
    ///
    /// Lag (missed events due to buffer overflow) is skipped silently;
    /// `None` means the bus has been dropped.
    pub async fn recv(&mut self) -> Option<WorkflowEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Try to receive an event without blocking.
    pub fn try_recv(&mut self) -> Option<WorkflowEvent> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    }
}
