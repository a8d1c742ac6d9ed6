//! Project-scoped exclusivity lock.
//!
//! A filesystem lock (`<project_root>/.procwarden.lock`, flock on Unix,
//! `LockFileEx` on Windows) decides whether an invocation becomes the owning
//! supervisor or degrades to an IPC client. Acquisition is non-blocking:
//! losing the race is an answer, not an error.
//!
//! The owner holds the exclusive lock for the lifetime of its process.
//! Non-owners probe liveness by taking (and immediately releasing) a shared
//! lock on a fresh handle; the probe fails exactly when some process holds
//! the exclusive lock. The owner never re-probes its own file — `is_locked`
//! short-circuits on `owner` to avoid self-deadlock.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use fs4::fs_std::FileExt;

use crate::{AppError, Result};

/// Exclusive ownership gate for one project root.
#[derive(Debug)]
pub struct ProjectLock {
    path: PathBuf,
    handle: Option<File>,
    owner: bool,
}

impl ProjectLock {
    /// Create a lock keyed by the given lock-file path.
    ///
    /// No file-system activity happens until acquisition or probing.
    #[must_use]
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            handle: None,
            owner: false,
        }
    }

    /// Try to become the owner. Non-blocking.
    ///
    /// Returns `Ok(false)` when another process already holds the exclusive
    /// lock; the caller should degrade to client behavior rather than fail.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Lock` if the lock file cannot be opened.
    pub fn acquire_exclusive(&mut self) -> Result<bool> {
        if self.owner {
            return Ok(true);
        }
        let file = self.open()?;
        let acquired = file
            .try_lock_exclusive()
            .map_err(|err| AppError::Lock(format!("exclusive lock failed: {err}")))?;
        if acquired {
            self.handle = Some(file);
            self.owner = true;
        }
        Ok(acquired)
    }

    /// Whether some process (including this one) holds the exclusive lock.
    ///
    /// The owner answers from its own flag without touching the file. Other
    /// processes take a shared lock on a fresh handle and release it before
    /// returning, so probing never perturbs lock state.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Lock` if the lock file cannot be opened.
    pub fn is_locked(&self) -> Result<bool> {
        if self.owner {
            return Ok(true);
        }
        let file = self.open()?;
        let shared = FileExt::try_lock_shared(&file)
            .map_err(|err| AppError::Lock(format!("shared probe failed: {err}")))?;
        if shared {
            FileExt::unlock(&file)
                .map_err(|err| AppError::Lock(format!("probe release failed: {err}")))?;
        }
        Ok(!shared)
    }

    /// Whether this instance won the exclusive acquisition.
    #[must_use]
    pub fn is_owner(&self) -> bool {
        self.owner
    }

    /// Release ownership and remove the lock file.
    ///
    /// A no-op for non-owners. Removal of the file is best-effort; the lock
    /// itself is released by dropping the handle.
    pub fn release(&mut self) {
        if let Some(file) = self.handle.take() {
            let _ = FileExt::unlock(&file);
        }
        if self.owner {
            let _ = std::fs::remove_file(&self.path);
        }
        self.owner = false;
    }

    fn open(&self) -> Result<File> {
        OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)
            .map_err(|err| {
                AppError::Lock(format!(
                    "cannot open lock file '{}': {err}",
                    self.path.display()
                ))
            })
    }
}

impl Drop for ProjectLock {
    fn drop(&mut self) {
        self.release();
    }
}
