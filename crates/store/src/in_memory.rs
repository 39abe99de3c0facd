//! In-memory backend: useful for testing and ephemeral sessions.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use toolwright_core::error::StoreError;
use toolwright_core::session::{Session, SessionBackend, SessionId};

/// An in-memory backend that keeps sessions in a map.
/// Everything is lost when the process exits.
#[derive(Clone, Default)]
pub struct InMemoryBackend {
    sessions: Arc<RwLock<HashMap<SessionId, Session>>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionBackend for InMemoryBackend {
    fn name(&self) -> &str {
        "memory"
    }

    async fn load(&self, id: &SessionId) -> Result<Option<Session>, StoreError> {
        Ok(self.sessions.read().await.get(id).cloned())
    }

    async fn save(&self, session: &Session) -> Result<(), StoreError> {
        self.sessions
            .write()
            .await
            .insert(session.id.clone(), session.clone());
        Ok(())
    }

    async fn list(&self) -> Result<Vec<SessionId>, StoreError> {
        let mut ids: Vec<SessionId> = self.sessions.read().await.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}
