//! Durable single-record state store
//!
//! Persists exactly one [`RuntimeState`] as JSON at a configured path.
//! Writes go to a `.tmp` sibling in the same directory, are fsynced, and
//! are then renamed over the target, so a reader sees either the previous
//! complete file or the next one.
//!
//! The store guarantees atomicity of a single write only. It does not
//! serialize concurrent writers: route all writes through
//! [`StateService`](crate::core::service::StateService) or a single owner.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::warn;

use crate::core::state::RuntimeState;

/// Errors for state store operations
#[derive(Debug, Error)]
pub enum StoreError {
    /// Storage directory cannot be created or the path is unusable
    #[error("Path error: {0}")]
    Path(String),

    /// On-disk content does not parse into a valid RuntimeState
    #[error("Corrupt state: {0}")]
    CorruptState(String),

    /// Write, flush, rename or read failure
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// State rejected before any I/O
    #[error("Validation error: {0}")]
    Validation(String),

    /// Read-modify-write requested before any state was persisted
    #[error("No runtime state has been persisted yet")]
    Missing,
}

/// File-backed store for the bot's runtime state
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
    tmp_path: PathBuf,
}

impl StateStore {
    /// Create a store for `path`, creating its parent directories if needed
    ///
    /// # Errors
    /// - `StoreError::Path` if the directory cannot be created, or if the
    ///   path has no file name or already uses the `.tmp` extension
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();

        if path.file_name().is_none() {
            return Err(StoreError::Path(format!(
                "state path '{}' has no file name",
                path.display()
            )));
        }

        // The staging file would be the target itself
        if path.extension().is_some_and(|ext| ext == "tmp") {
            return Err(StoreError::Path(format!(
                "state path '{}' cannot use the .tmp extension",
                path.display()
            )));
        }

        if let Some(parent) = non_empty_parent(&path) {
            fs::create_dir_all(parent).map_err(|e| {
                StoreError::Path(format!("cannot create directory '{}': {}", parent.display(), e))
            })?;
        }

        let tmp_path = path.with_extension("tmp");
        Ok(Self { path, tmp_path })
    }

    /// Target path of the persisted record
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Staging path used during writes; never valid state
    pub fn tmp_path(&self) -> &Path {
        &self.tmp_path
    }

    /// Atomically replace the persisted state
    ///
    /// Validates, writes and fsyncs the `.tmp` sibling, then renames it
    /// over the target. The target path is never written directly.
    ///
    /// # Errors
    /// Any error means the rename did not happen and the previous record is
    /// still the one on disk. A directory sync failure after the rename is
    /// only logged.
    pub fn write(&self, state: &RuntimeState) -> Result<(), StoreError> {
        self.stage(state)?;
        self.commit()
    }

    /// Read the persisted state
    ///
    /// # Returns
    /// - `Ok(None)` if no state file exists yet
    /// - `Err(StoreError::CorruptState)` if the file is incomplete or invalid
    pub fn read(&self) -> Result<Option<RuntimeState>, StoreError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::Io(e)),
        };

        let state: RuntimeState = serde_json::from_slice(&bytes).map_err(|e| {
            StoreError::CorruptState(format!("{}: {}", self.path.display(), e))
        })?;

        state.validate().map_err(|e| {
            StoreError::CorruptState(format!("{}: {}", self.path.display(), e))
        })?;

        Ok(Some(state))
    }

    /// Write the serialized state to the staging file and fsync it
    pub(crate) fn stage(&self, state: &RuntimeState) -> Result<(), StoreError> {
        state.validate()?;

        let mut payload = serde_json::to_vec_pretty(state).map_err(io::Error::other)?;
        payload.push(b'\n');

        let result = File::create(&self.tmp_path).and_then(|mut file| {
            file.write_all(&payload)?;
            file.flush()?;
            file.sync_all()
        });

        if let Err(e) = result {
            // Leftover staging content is never read, removal is best-effort
            let _ = fs::remove_file(&self.tmp_path);
            return Err(StoreError::Io(e));
        }

        Ok(())
    }

    fn commit(&self) -> Result<(), StoreError> {
        self.commit_with(sync_dir)
    }

    /// Rename the staging file over the target, then sync its directory
    ///
    /// After the rename readers already see the new record, so a failed
    /// directory sync is logged and the write still counts as committed.
    fn commit_with<S>(&self, sync: S) -> Result<(), StoreError>
    where
        S: FnOnce(&Path) -> io::Result<()>,
    {
        fs::rename(&self.tmp_path, &self.path)?;
        if let Err(e) = sync(&self.path) {
            warn!(
                path = %self.path.display(),
                error = %e,
                "Directory sync failed after rename, record is committed"
            );
        }
        Ok(())
    }
}

fn non_empty_parent(path: &Path) -> Option<&Path> {
    path.parent().filter(|p| !p.as_os_str().is_empty())
}

#[cfg(unix)]
fn sync_dir(path: &Path) -> io::Result<()> {
    let dir = non_empty_parent(path).unwrap_or_else(|| Path::new("."));
    File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
fn sync_dir(_path: &Path) -> io::Result<()> {
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
