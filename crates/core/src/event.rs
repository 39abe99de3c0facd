//! Domain event system: decoupled observation of the agent loop.
//!
//! The loop publishes an event at every state transition. Subscribers
//! (the CLI's progress printer, tests) react without tight coupling.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// A human message was accepted and a turn began
    TurnStarted {
        session_id: String,
        content_preview: String,
        timestamp: DateTime<Utc>,
    },

    /// The model answered or requested tools
    ModelResponded {
        session_id: String,
        iteration: usize,
        tool_calls: usize,
        timestamp: DateTime<Utc>,
    },

    /// A tool call resolved (successfully or not)
    ToolExecuted {
        session_id: String,
        tool_name: String,
        success: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// The turn paused for a human decision
    ApprovalRequested {
        session_id: String,
        tool_names: Vec<String>,
        timestamp: DateTime<Utc>,
    },

    /// The turn reached its terminal state
    TurnCompleted {
        session_id: String,
        iterations: usize,
        model_failed: bool,
        timestamp: DateTime<Utc>,
    },
}

/// A broadcast-based event bus for domain events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: DomainEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
