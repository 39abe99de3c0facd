//! File-based session backend: one pretty-printed JSON file per session.
//!
//! Storage location: `~/.toolwright/sessions/<id>.json` by default.
//! Files are human-inspectable and can be copied between machines.
//!
//! A save writes `<id>.json.tmp` and renames it over the target, so a
//! reader sees either the old or the new session, never a torn write.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use toolwright_core::error::StoreError;
use toolwright_core::session::{Session, SessionBackend, SessionId};
use tracing::{debug, warn};

/// A directory of JSON session files.
pub struct FileBackend {
    dir: PathBuf,
}

impl FileBackend {
    /// Create a backend rooted at `dir`. The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        debug!(dir = %dir.display(), "File session backend ready");
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: &SessionId) -> PathBuf {
        self.dir.join(format!("{}.json", encode_id(id.as_str())))
    }
}

/// Session ids are opaque, so escape anything that isn't safe in a file name.
fn encode_id(id: &str) -> String {
    let mut out = String::with_capacity(id.len());
    for byte in id.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}

fn decode_id(name: &str) -> Option<String> {
    let bytes = name.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = name.get(i + 1..i + 3)?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}

fn storage_error(context: &str, path: &Path, e: std::io::Error) -> StoreError {
    StoreError::Storage(format!("{context} {}: {e}", path.display()))
}

#[async_trait]
impl SessionBackend for FileBackend {
    fn name(&self) -> &str {
        "file"
    }

    async fn load(&self, id: &SessionId) -> Result<Option<Session>, StoreError> {
        let path = self.path_for(id);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(storage_error("Failed to read", &path, e)),
        };

        let session = serde_json::from_str(&content).map_err(|e| StoreError::Serialization {
            session: id.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Some(session))
    }

    async fn save(&self, session: &Session) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| storage_error("Failed to create session directory", &self.dir, e))?;

        let json =
            serde_json::to_string_pretty(session).map_err(|e| StoreError::Serialization {
                session: session.id.to_string(),
                reason: e.to_string(),
            })?;

        let path = self.path_for(&session.id);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| storage_error("Failed to write", &tmp, e))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| storage_error("Failed to replace", &path, e))?;

        debug!(session = %session.id, messages = session.messages.len(), "Session saved to file");
        Ok(())
    }

    async fn list(&self) -> Result<Vec<SessionId>, StoreError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(storage_error("Failed to list", &self.dir, e)),
        };

        let mut ids = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| storage_error("Failed to list", &self.dir, e))?
        {
            let name = entry.file_name();
            let Some(stem) = name.to_str().and_then(|n| n.strip_suffix(".json")) else {
                continue;
            };
            match decode_id(stem) {
                Some(id) => ids.push(SessionId::from(id)),
                None => warn!(file = %stem, "Skipping session file with undecodable name"),
            }
        }
        ids.sort();
        Ok(ids)
    }
}
