//! Durable session record.
//!
//! One small JSON document holding the conversation id, invite URL and
//! watermark. Loading never fails (anything unreadable is treated as "no
//! prior session"); saving is write-to-temp-then-rename so a crash mid-write
//! leaves the previous record intact.

use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, error, warn};

use crate::models::session::{PersistedState, Session};
use crate::{AppError, Result};

/// File-backed store for a single [`PersistedState`].
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    /// Store backed by `path`; nothing is touched until the first save.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the record.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the persisted session, or an empty one on any failure.
    #[must_use]
    pub fn load(&self) -> Session {
        match self.try_load() {
            Ok(Some(state)) => {
                debug!(path = %self.path.display(), "session state loaded");
                Session::from(state)
            }
            Ok(None) => {
                debug!(path = %self.path.display(), "no session state on disk");
                Session::default()
            }
            Err(err) => {
                warn!(path = %self.path.display(), %err, "ignoring unreadable session state");
                Session::default()
            }
        }
    }

    /// Persist `session`, logging instead of failing.
    ///
    /// The write and fsync run on the blocking pool; the caller resumes once
    /// the record is in place, so successive saves land in call order.
    pub async fn save(&self, session: &Session) {
        let path = self.path.clone();
        let state = session.to_persisted();
        let outcome = tokio::task::spawn_blocking(move || write_record(&path, &state))
            .await
            .unwrap_or_else(|e| Err(AppError::Io(format!("session state writer failed: {e}"))));
        if let Err(err) = outcome {
            error!(path = %self.path.display(), %err, "failed to persist session state");
        }
    }

    /// Read and parse the record.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Io`] for read failures other than "not found" and
    /// [`AppError::Protocol`] for invalid JSON.
    pub fn try_load(&self) -> Result<Option<PersistedState>> {
        let raw = match std::fs::read(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        serde_json::from_slice(&raw)
            .map(Some)
            .map_err(|e| AppError::Protocol(format!("invalid session state: {e}")))
    }

    /// Serialise `session` and atomically replace the record.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Io`] when the directory cannot be created or the
    /// file cannot be written or renamed.
    pub fn try_save(&self, session: &Session) -> Result<()> {
        write_record(&self.path, &session.to_persisted())
    }
}

fn write_record(path: &Path, state: &PersistedState) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&parent)?;

    let bytes = serde_json::to_vec_pretty(state)
        .map_err(|e| AppError::Protocol(format!("failed to serialise session state: {e}")))?;

    let mut tmp = NamedTempFile::new_in(&parent)?;
    tmp.write_all(&bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)
        .map_err(|e| AppError::Io(format!("failed to replace session state: {e}")))?;
    Ok(())
}
