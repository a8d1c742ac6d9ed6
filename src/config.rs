//! Global configuration parsing, validation, and IPC-name derivation.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::{AppError, Result};

/// Worker-process launch settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct WorkerConfig {
    /// Worker executable (resolved via `PATH` or an absolute path).
    pub command: String,
    /// Arguments passed to the worker executable.
    #[serde(default)]
    pub args: Vec<String>,
}

/// One file or directory subtree registered with the change monitor.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct WatchEntryConfig {
    /// File or directory path, relative to the project root unless absolute.
    pub path: PathBuf,
    /// Optional extension filter for directory watches (e.g. `"rs"`).
    #[serde(default)]
    pub ext: Option<String>,
}

/// Source-change watching settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct WatchConfig {
    /// Whether file watching (and reload-on-change) is enabled.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Watched files and directory subtrees.
    #[serde(default)]
    pub entries: Vec<WatchEntryConfig>,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            entries: Vec::new(),
        }
    }
}

fn default_true() -> bool {
    true
}

/// Configurable interval values (milliseconds) for the supervisor loops.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct TimeoutConfig {
    /// Pause after sending the worker its `stop` token.
    #[serde(default = "default_stop_grace_ms")]
    pub stop_grace_ms: u64,
    /// Additional wait before escalating to an interrupt signal.
    #[serde(default = "default_stop_wait_ms")]
    pub stop_wait_ms: u64,
    /// Wait after the interrupt before force-killing the worker.
    #[serde(default = "default_kill_grace_ms")]
    pub kill_grace_ms: u64,
    /// Settle window after a reload before a coalesced follow-up runs.
    #[serde(default = "default_reload_settle_ms")]
    pub reload_settle_ms: u64,
    /// Interval between monitor ticks and worker-exit checks.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            stop_grace_ms: default_stop_grace_ms(),
            stop_wait_ms: default_stop_wait_ms(),
            kill_grace_ms: default_kill_grace_ms(),
            reload_settle_ms: default_reload_settle_ms(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

fn default_stop_grace_ms() -> u64 {
    100
}

fn default_stop_wait_ms() -> u64 {
    1000
}

fn default_kill_grace_ms() -> u64 {
    5000
}

fn default_reload_settle_ms() -> u64 {
    2000
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_project_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_listen() -> String {
    "http://127.0.0.1:8008".into()
}

fn default_workers() -> u32 {
    1
}

fn default_daemon_log() -> PathBuf {
    PathBuf::from("procwarden.log")
}

/// Global configuration parsed from `procwarden.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Project root; keys the lock file and the control-channel name.
    #[serde(default = "default_project_root")]
    pub project_root: PathBuf,
    /// Listen address handed to the worker process.
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Worker-internal concurrency hint handed to the worker process.
    #[serde(default = "default_workers")]
    pub workers: u32,
    /// Explicit IPC socket name; derived from the project root when absent.
    #[serde(default)]
    pub ipc_name: Option<String>,
    /// Log file used when the server is started with `--daemon`,
    /// relative to the project root unless absolute.
    #[serde(default = "default_daemon_log")]
    pub daemon_log: PathBuf,
    /// Worker launch settings.
    pub worker: WorkerConfig,
    /// Source-change watching settings.
    #[serde(default)]
    pub watch: WatchConfig,
    /// Interval configuration for stop/reload/poll loops.
    #[serde(default)]
    pub timeouts: TimeoutConfig,
}

impl GlobalConfig {
    /// Parse configuration from a TOML string and validate it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` on invalid TOML or failed validation.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or is invalid.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("cannot read config '{}': {err}", path.display())))?;
        Self::from_toml_str(&raw)
    }

    /// Canonicalize the project root and check launch prerequisites.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` when the project root is not a directory
    /// or the worker command is empty.
    pub fn validate(&mut self) -> Result<()> {
        self.project_root = self.project_root.canonicalize().map_err(|err| {
            AppError::Config(format!(
                "project_root '{}' is not a valid directory: {err}",
                self.project_root.display()
            ))
        })?;
        if self.worker.command.trim().is_empty() {
            return Err(AppError::Config("worker.command must not be empty".into()));
        }
        Ok(())
    }

    /// Effective control-channel socket name for this project.
    ///
    /// Derived deterministically from the canonical project root so that
    /// every invocation against the same project resolves the same name.
    #[must_use]
    pub fn channel_name(&self) -> String {
        if let Some(ref name) = self.ipc_name {
            return name.clone();
        }
        let digest = Sha256::digest(self.project_root.to_string_lossy().as_bytes());
        let hex: String = digest.iter().take(6).map(|b| format!("{b:02x}")).collect();
        format!("procwarden-{hex}")
    }

    /// Control-channel socket name for one worker session.
    ///
    /// Derivable from the session id alone so the worker can bind its own
    /// channel from the `WARDEN_SESSION_ID` environment variable.
    #[must_use]
    pub fn session_channel_name(session_id: &str) -> String {
        format!("procwarden-s-{session_id}")
    }

    /// Absolute path of a watch entry, resolved against the project root.
    #[must_use]
    pub fn resolve_watch_path(&self, entry: &WatchEntryConfig) -> PathBuf {
        if entry.path.is_absolute() {
            entry.path.clone()
        } else {
            self.project_root.join(&entry.path)
        }
    }

    /// Absolute path of the daemon log file.
    #[must_use]
    pub fn daemon_log_path(&self) -> PathBuf {
        if self.daemon_log.is_absolute() {
            self.daemon_log.clone()
        } else {
            self.project_root.join(&self.daemon_log)
        }
    }

    /// Lock file path for this project.
    #[must_use]
    pub fn lock_path(&self) -> PathBuf {
        self.project_root.join(".procwarden.lock")
    }
}
