//! Polling change monitor for watched files and directory subtrees.
//!
//! Keeps a snapshot of last-seen modification times keyed by absolute file
//! path. Each [`Monitor::tick`] rescans every watch entry, fires the
//! `on_create` / `on_modify` / `on_delete` callbacks for differences against
//! the snapshot, and then sweeps the snapshot for files that no longer
//! exist. Registration seeds the snapshot, so the first tick after `add` is
//! quiet on an unchanged tree.
//!
//! The snapshot is keyed by file path, not directory identity: a directory
//! removed and recreated with identical contents still surfaces per-file
//! create events, and a file that vanished on one tick and reappeared on a
//! later one is a create even when its timestamp went backwards.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::warn;

use crate::{AppError, Result};

/// Callback invoked with the absolute path of a changed file.
pub type ChangeCallback = Box<dyn Fn(&Path) + Send>;

#[derive(Debug)]
struct WatchEntry {
    path: PathBuf,
    ext: Option<String>,
    is_file: bool,
}

/// Snapshot-comparison file monitor.
#[derive(Default)]
pub struct Monitor {
    watched: Vec<WatchEntry>,
    snapshot: HashMap<PathBuf, SystemTime>,
    /// Fired for every file first seen after registration.
    pub on_create: Option<ChangeCallback>,
    /// Fired for every file whose modification time changed.
    pub on_modify: Option<ChangeCallback>,
    /// Fired for every snapshot entry whose file disappeared.
    pub on_delete: Option<ChangeCallback>,
}

impl Monitor {
    /// Create an empty monitor with no callbacks registered.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a file or directory subtree to watch.
    ///
    /// Directory watches may carry an extension filter (leading dot and
    /// case are ignored). Existing files are seeded into the snapshot so
    /// they do not fire create events on the next tick.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Watch` when `path` is neither an existing file
    /// nor an existing directory.
    pub fn add(&mut self, path: &Path, ext: Option<&str>) -> Result<()> {
        if path.is_file() {
            if let Some(mtime) = mtime_of(path) {
                self.snapshot.insert(path.to_path_buf(), mtime);
            }
            self.watched.push(WatchEntry {
                path: path.to_path_buf(),
                ext: None,
                is_file: true,
            });
            return Ok(());
        }

        if !path.is_dir() {
            return Err(AppError::Watch(format!(
                "path '{}' is not a valid file or directory",
                path.display()
            )));
        }

        let ext = ext.map(|e| e.trim_start_matches('.').to_ascii_lowercase());
        for (file, mtime) in scan_dir(path, ext.as_deref()) {
            self.snapshot.insert(file, mtime);
        }
        self.watched.push(WatchEntry {
            path: path.to_path_buf(),
            ext,
            is_file: false,
        });
        Ok(())
    }

    /// Perform one polling pass over every watch entry.
    ///
    /// Fires callbacks for all creations and modifications detected since
    /// the previous tick, then sweeps the snapshot and fires deletions for
    /// files that no longer exist.
    pub fn tick(&mut self) {
        for entry in &self.watched {
            if entry.is_file {
                let mtime = mtime_of(&entry.path);
                match (self.snapshot.get(&entry.path), mtime) {
                    (None, Some(current)) => {
                        fire(self.on_create.as_ref(), &entry.path);
                        self.snapshot.insert(entry.path.clone(), current);
                    }
                    (Some(&previous), Some(current)) => {
                        if previous != current {
                            fire(self.on_modify.as_ref(), &entry.path);
                            self.snapshot.insert(entry.path.clone(), current);
                        }
                    }
                    (Some(_), None) => {
                        fire(self.on_delete.as_ref(), &entry.path);
                        self.snapshot.remove(&entry.path);
                    }
                    (None, None) => {}
                }
                continue;
            }

            for (file, current) in scan_dir(&entry.path, entry.ext.as_deref()) {
                match self.snapshot.get(&file) {
                    None => fire(self.on_create.as_ref(), &file),
                    Some(&previous) if previous != current => {
                        fire(self.on_modify.as_ref(), &file);
                    }
                    Some(_) => {}
                }
                self.snapshot.insert(file, current);
            }
        }

        let gone: Vec<PathBuf> = self
            .snapshot
            .keys()
            .filter(|path| !path.exists())
            .cloned()
            .collect();
        for path in gone {
            fire(self.on_delete.as_ref(), &path);
            self.snapshot.remove(&path);
        }
    }

    /// Number of files currently tracked in the snapshot.
    #[must_use]
    pub fn tracked_files(&self) -> usize {
        self.snapshot.len()
    }
}

fn fire(callback: Option<&ChangeCallback>, path: &Path) {
    if let Some(cb) = callback {
        cb(path);
    }
}

fn mtime_of(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|meta| meta.modified()).ok()
}

/// List all files under `dir` (recursively), honoring the extension filter.
fn scan_dir(dir: &Path, ext: Option<&str>) -> Vec<(PathBuf, SystemTime)> {
    let pattern = format!("{}/**/*", dir.display());
    let paths = match glob::glob(&pattern) {
        Ok(paths) => paths,
        Err(err) => {
            warn!(dir = %dir.display(), %err, "invalid watch pattern, skipping scan");
            return Vec::new();
        }
    };

    let mut files = Vec::new();
    for entry in paths.flatten() {
        if !entry.is_file() {
            continue;
        }
        if let Some(wanted) = ext {
            let matches = entry
                .extension()
                .is_some_and(|e| e.to_string_lossy().eq_ignore_ascii_case(wanted));
            if !matches {
                continue;
            }
        }
        if let Some(mtime) = mtime_of(&entry) {
            files.push((entry, mtime));
        }
    }
    files
}
