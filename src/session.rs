//! File-backed session persistence.
//!
//! One pretty-printed JSON file per session under `{data_dir}/sessions/`.
//! Updating after every log line and stage transition makes execution
//! progress crash-visible; re-running a session is safe because content
//! admission is guarded by hash dedup, not by the session record.

use anyhow::{Context, Result};
use chrono::Utc;
use std::path::{Path, PathBuf};

use crate::canon::{load_index, INDEX_FILENAME};
use crate::models::Session;

#[derive(Debug, Clone)]
pub struct SessionStore {
    dir: PathBuf,
}

impl SessionStore {
    /// Open a store rooted at `{data_dir}/sessions`, creating it if needed.
    pub fn open(data_dir: impl AsRef<Path>) -> Result<Self> {
        let dir = data_dir.as_ref().join("sessions");
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create session dir: {}", dir.display()))?;
        Ok(SessionStore { dir })
    }

    fn path(&self, session_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", session_id))
    }

    /// Persist a new session. If a `canon_path` was supplied, the existing
    /// index there is loaded once to seed deduplication during execution.
    pub fn create(&self, mut session: Session) -> Result<Session> {
        if let Some(canon_path) = &session.canon_path {
            session.existing_index = load_index(&canon_path.join(INDEX_FILENAME))?;
        }
        self.write(&session)?;
        Ok(session)
    }

    pub fn get(&self, session_id: &str) -> Result<Option<Session>> {
        let path = self.path(session_id);
        if !path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read session: {}", path.display()))?;
        let session = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse session: {}", path.display()))?;
        Ok(Some(session))
    }

    /// Persist `session`, bumping its `updated_at` timestamp.
    pub fn update(&self, session: &mut Session) -> Result<()> {
        session.updated_at = Utc::now();
        self.write(session)
    }

    pub fn list(&self) -> Result<Vec<Session>> {
        let mut sessions = Vec::new();
        let mut paths: Vec<PathBuf> = std::fs::read_dir(&self.dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .collect();
        paths.sort();
        for path in paths {
            let raw = std::fs::read_to_string(&path)?;
            let session = serde_json::from_str(&raw)
                .with_context(|| format!("failed to parse session: {}", path.display()))?;
            sessions.push(session);
        }
        Ok(sessions)
    }

    pub fn delete(&self, session_id: &str) -> Result<bool> {
        let path = self.path(session_id);
        if path.exists() {
            std::fs::remove_file(&path)?;
            return Ok(true);
        }
        Ok(false)
    }

    fn write(&self, session: &Session) -> Result<()> {
        let path = self.path(&session.id);
        let json = serde_json::to_string_pretty(session)?;
        std::fs::write(&path, json)
            .with_context(|| format!("failed to write session: {}", path.display()))?;
        Ok(())
    }
}
