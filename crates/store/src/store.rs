//! The conversation state store.
//!
//! [`SessionStore`] adds seeding, checkpoint/restore and per-session
//! serialization on top of a raw [`SessionBackend`].

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};
use toolwright_core::error::StoreError;
use toolwright_core::message::Message;
use toolwright_core::session::{Session, SessionBackend, SessionId, Snapshot};
use tracing::debug;

/// Exclusive access to one session for the lifetime of the guard.
pub type SessionGuard = OwnedMutexGuard<()>;

/// Session persistence shared by every caller of the agent loop.
///
/// Mutating operations assume the caller holds [`SessionStore::lock`] for
/// the session; the lock is not re-entrant, so these methods never take it
/// themselves.
pub struct SessionStore {
    backend: Arc<dyn SessionBackend>,
    system_prompt: String,
    locks: Mutex<HashMap<SessionId, Arc<Mutex<()>>>>,
}

impl SessionStore {
    pub fn new(backend: Arc<dyn SessionBackend>, system_prompt: impl Into<String>) -> Self {
        Self {
            backend,
            system_prompt: system_prompt.into(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Serialize turns on one session. Different ids never contend.
    pub async fn lock(&self, id: &SessionId) -> SessionGuard {
        let mutex = {
            let mut locks = self.locks.lock().await;
            // Forget sessions nobody holds or waits on
            locks.retain(|_, mutex| Arc::strong_count(mutex) > 1);
            Arc::clone(locks.entry(id.clone()).or_default())
        };
        mutex.lock_owned().await
    }

    #[cfg(test)]
    async fn tracked_locks(&self) -> usize {
        self.locks.lock().await.len()
    }

    /// Fetch a session, creating and persisting a seeded one if unknown.
    pub async fn get(&self, id: &SessionId) -> Result<Session, StoreError> {
        if let Some(session) = self.backend.load(id).await? {
            return Ok(session);
        }
        let session = Session::new(id.clone(), self.system_prompt.clone());
        self.backend.save(&session).await?;
        debug!(session = %id, "Created session");
        Ok(session)
    }

    /// Fetch a session without creating it.
    pub async fn find(&self, id: &SessionId) -> Result<Option<Session>, StoreError> {
        self.backend.load(id).await
    }

    /// Append whole messages in one save and return the updated session.
    pub async fn append(
        &self,
        id: &SessionId,
        messages: Vec<Message>,
    ) -> Result<Session, StoreError> {
        let mut session = self.get(id).await?;
        let count = messages.len();
        session.extend(messages);
        self.backend.save(&session).await?;
        debug!(session = %id, appended = count, total = session.messages.len(), "Appended messages");
        Ok(session)
    }

    /// Set or clear the approval gate flag.
    pub async fn set_awaiting_approval(
        &self,
        id: &SessionId,
        awaiting: bool,
    ) -> Result<Session, StoreError> {
        let mut session = self.get(id).await?;
        if session.awaiting_approval != awaiting {
            session.awaiting_approval = awaiting;
            session.updated_at = chrono::Utc::now();
            self.backend.save(&session).await?;
        }
        Ok(session)
    }

    /// Capture an existing session.
    pub async fn checkpoint(&self, id: &SessionId) -> Result<Snapshot, StoreError> {
        let session = self
            .backend
            .load(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        Ok(Snapshot::capture(&session))
    }

    /// Replace session `id` with the snapshot's state.
    pub async fn restore(&self, id: &SessionId, snapshot: Snapshot) -> Result<Session, StoreError> {
        let source = snapshot.source().clone();
        let session = snapshot.into_session(id.clone())?;
        self.backend.save(&session).await?;
        debug!(session = %id, from = %source, messages = session.messages.len(), "Restored session");
        Ok(session)
    }

    /// Identifiers of all stored sessions.
    pub async fn list(&self) -> Result<Vec<SessionId>, StoreError> {
        self.backend.list().await
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("backend", &self.backend.name())
            .finish()
    }
}
