//! Conversation state store and session backends for Toolwright.

pub mod file_backend;
pub mod in_memory;
pub mod store;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use file_backend::FileBackend;
pub use in_memory::InMemoryBackend;
pub use store::{SessionGuard, SessionStore};

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteBackend;

use std::sync::Arc;
use toolwright_config::StoreConfig;
use toolwright_core::error::StoreError;
use toolwright_core::session::SessionBackend;

/// Open the backend named in the `[store]` section.
pub async fn open_backend(config: &StoreConfig) -> Result<Arc<dyn SessionBackend>, StoreError> {
    match config.backend.as_str() {
        "memory" => Ok(Arc::new(InMemoryBackend::new())),
        "file" => Ok(Arc::new(FileBackend::new(config.resolved_path()))),
        #[cfg(feature = "sqlite")]
        "sqlite" => {
            let path = config.resolved_path();
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    StoreError::Storage(format!("Failed to create {}: {e}", parent.display()))
                })?;
            }
            let backend = SqliteBackend::new(&format!("sqlite://{}", path.display())).await?;
            Ok(Arc::new(backend))
        }
        other => Err(StoreError::Storage(format!(
            "store backend '{other}' is not available in this build"
        ))),
    }
}
