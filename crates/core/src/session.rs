//! Session domain types and the storage backend trait.
//!
//! A session is the ordered message history of one conversation plus the
//! loop's control flags, keyed by an opaque identifier supplied by the
//! caller (CLI flag, URL path segment, ...).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StoreError;
use crate::message::{AssistantBody, Message};
use crate::tool::ToolCall;

/// Unique identifier for a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    /// A fresh random identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A conversation: ordered history plus control flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,

    /// Append-only history; the system message is always first.
    pub messages: Vec<Message>,

    /// Set while a tool request waits for an explicit human decision.
    #[serde(default)]
    pub awaiting_approval: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    /// Create a session seeded with the system message.
    pub fn new(id: SessionId, system_prompt: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            messages: vec![Message::system(system_prompt)],
            awaiting_approval: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Add messages to the end of the history.
    pub fn extend(&mut self, messages: impl IntoIterator<Item = Message>) {
        self.messages.extend(messages);
        self.updated_at = Utc::now();
    }

    /// The trailing assistant tool calls that have no result yet.
    ///
    /// Non-empty only while a gate is open or after a turn was cancelled
    /// between the tool request and its results.
    pub fn pending_calls(&self) -> &[ToolCall] {
        match self.messages.last() {
            Some(Message::Assistant {
                body: AssistantBody::ToolCalls(calls),
            }) => calls,
            _ => &[],
        }
    }

    /// The text of the most recent assistant answer, if any.
    pub fn last_answer(&self) -> Option<&str> {
        self.messages.iter().rev().find_map(|m| match m {
            Message::Assistant {
                body: AssistantBody::Answer(text),
            } => Some(text.as_str()),
            _ => None,
        })
    }

    /// Rough token estimate for the whole history.
    pub fn estimated_tokens(&self) -> usize {
        self.messages.iter().map(Message::estimated_tokens).sum()
    }

    /// Check the structural history invariant.
    ///
    /// - a system message may only appear first
    /// - every tool-requesting assistant message is followed by exactly one
    ///   tool message per call, in call order, with matching identifiers
    /// - call identifiers are unique within their assistant message
    /// - tool messages never appear outside such a block
    ///
    /// A trailing tool request with no results at all is accepted (see
    /// [`Session::pending_calls`]); a partially resolved one is not.
    pub fn validate(&self) -> Result<(), String> {
        let messages = &self.messages;
        let mut i = 0;
        while i < messages.len() {
            match &messages[i] {
                Message::System { .. } if i != 0 => {
                    return Err(format!("system message at position {i}"));
                }
                Message::Tool { call_id, .. } => {
                    return Err(format!(
                        "tool result '{call_id}' at position {i} has no matching request"
                    ));
                }
                Message::Assistant {
                    body: AssistantBody::ToolCalls(calls),
                } => {
                    if calls.is_empty() {
                        return Err(format!("empty tool request at position {i}"));
                    }
                    let mut seen = std::collections::HashSet::new();
                    for call in calls {
                        if !seen.insert(call.id.as_str()) {
                            return Err(format!("duplicate call id '{}' at position {i}", call.id));
                        }
                    }
                    if i + 1 == messages.len() {
                        // Pending tail: requested but not yet dispatched.
                        return Ok(());
                    }
                    for (offset, call) in calls.iter().enumerate() {
                        let pos = i + 1 + offset;
                        match messages.get(pos) {
                            Some(Message::Tool { call_id, .. }) if *call_id == call.id => {}
                            Some(Message::Tool { call_id, .. }) => {
                                return Err(format!(
                                    "tool result '{call_id}' at position {pos} does not match request '{}'",
                                    call.id
                                ));
                            }
                            _ => {
                                return Err(format!(
                                    "tool call '{}' requested at position {i} was never resolved",
                                    call.id
                                ));
                            }
                        }
                    }
                    i += calls.len();
                }
                _ => {}
            }
            i += 1;
        }
        Ok(())
    }
}

/// An opaque, serializable copy of a session's state at one point in time.
///
/// Produced by checkpointing and consumed by restore, possibly on a
/// different store instance or process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    source: SessionId,
    messages: Vec<Message>,
    awaiting_approval: bool,
    taken_at: DateTime<Utc>,
}

impl Snapshot {
    /// Capture the current state of `session`.
    pub fn capture(session: &Session) -> Self {
        Self {
            source: session.id.clone(),
            messages: session.messages.clone(),
            awaiting_approval: session.awaiting_approval,
            taken_at: Utc::now(),
        }
    }

    /// The session the snapshot was taken from.
    pub fn source(&self) -> &SessionId {
        &self.source
    }

    pub fn taken_at(&self) -> DateTime<Utc> {
        self.taken_at
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Materialize the snapshot as session `id`, validating the history.
    pub fn into_session(self, id: SessionId) -> Result<Session, StoreError> {
        let now = Utc::now();
        let session = Session {
            id,
            messages: self.messages,
            awaiting_approval: self.awaiting_approval,
            created_at: self.taken_at,
            updated_at: now,
        };
        session
            .validate()
            .map_err(|reason| StoreError::InvalidHistory {
                session: session.id.to_string(),
                reason,
            })?;
        Ok(session)
    }
}

/// Persistence for sessions.
///
/// Implementations: in-memory (for tests and ephemeral use), JSON files,
/// SQLite. A `save` must be all-or-nothing: a reader never observes a
/// partially written session.
#[async_trait]
pub trait SessionBackend: Send + Sync {
    /// The backend name (e.g., "memory", "file", "sqlite").
    fn name(&self) -> &str;

    /// Load a session, or `None` if it was never saved.
    async fn load(&self, id: &SessionId) -> Result<Option<Session>, StoreError>;

    /// Insert or replace a session.
    async fn save(&self, session: &Session) -> Result<(), StoreError>;

    /// Identifiers of all stored sessions.
    async fn list(&self) -> Result<Vec<SessionId>, StoreError>;
}
