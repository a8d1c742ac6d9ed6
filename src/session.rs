//! Worker-session wrapper around one spawned application process.
//!
//! Each session owns a `tokio::process::Child` spawned with
//! `kill_on_drop(true)`, a stripped environment plus a safe inherited
//! allowlist, and relay tasks that forward the worker's stdout/stderr lines
//! to the supervisor's log. The session's control channel is named after
//! its id so the worker can bind it from `WARDEN_SESSION_ID` alone.
//!
//! Stopping is a graduated ladder: a `stop` token over the session channel,
//! a short grace wait, a longer wait, an interrupt signal, and only then a
//! hard kill. The ladder reports which rung ended the process so callers
//! can verify the interrupt was never sent to a worker that exited on its
//! own.

use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{GlobalConfig, TimeoutConfig};
use crate::ipc::{client as ipc_client, CommandToken};
use crate::{AppError, Result};

/// Environment variables inherited by the spawned worker process.
///
/// Everything else from the supervisor's environment is stripped via
/// `env_clear()` before the child is launched; the `WARDEN_*` contract
/// variables are injected explicitly.
pub const ALLOWED_ENV_VARS: &[&str] = &[
    "PATH",
    "HOME",
    "RUST_LOG",
    // Windows-specific variables.
    "USERPROFILE",
    "SystemRoot",
    "TEMP",
    "TMP",
    "USERNAME",
    "APPDATA",
    "LOCALAPPDATA",
    "COMSPEC",
];

/// Observed worker-process state.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SessionStatus {
    /// The child process is alive.
    Running,
    /// The child process has exited.
    Exited,
}

/// Which rung of the graceful-stop ladder ended the process.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum StopOutcome {
    /// The worker exited on its own after the `stop` token.
    Graceful,
    /// The worker exited after the interrupt signal.
    Interrupted,
    /// The worker had to be force-killed.
    Killed,
}

/// One spawned application-worker process.
#[derive(Debug)]
pub struct WorkerSession {
    id: String,
    channel_name: String,
    child: Child,
    exit_status: Option<ExitStatus>,
}

impl WorkerSession {
    /// Spawn a fresh worker process from the configured startup payload.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Session` if the process fails to spawn.
    pub fn launch(config: &GlobalConfig) -> Result<Self> {
        let id = Uuid::new_v4().simple().to_string();
        let channel_name = GlobalConfig::session_channel_name(&id);

        let mut cmd = Command::new(&config.worker.command);
        cmd.args(&config.worker.args);

        // Strip inherited environment, then inject only the safe allowlist.
        cmd.env_clear();
        for &key in ALLOWED_ENV_VARS {
            if let Ok(val) = std::env::var(key) {
                cmd.env(key, val);
            }
        }

        cmd.env("WARDEN_PROJECT_ROOT", &config.project_root)
            .env("WARDEN_SESSION_ID", &id)
            .env("WARDEN_LISTEN", &config.listen)
            .env("WARDEN_WORKERS", config.workers.to_string())
            .env("WARDEN_WATCH", if config.watch.enabled { "1" } else { "0" })
            .current_dir(&config.project_root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|err| AppError::Session(format!("failed to spawn worker: {err}")))?;

        if let Some(stdout) = child.stdout.take() {
            spawn_stdout_relay(stdout, id.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            spawn_stderr_relay(stderr, id.clone());
        }

        info!(
            session_id = %id,
            pid = child.id().unwrap_or(0),
            command = %config.worker.command,
            "worker session launched"
        );

        Ok(Self {
            id,
            channel_name,
            child,
            exit_status: None,
        })
    }

    /// Session identifier (also the worker's channel-name suffix).
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Control-channel name the worker was told to bind.
    #[must_use]
    pub fn channel_name(&self) -> &str {
        &self.channel_name
    }

    /// OS process id, when the child has not been reaped yet.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    /// Poll the child without blocking.
    pub fn status(&mut self) -> SessionStatus {
        if self.exit_status.is_some() {
            return SessionStatus::Exited;
        }
        match self.child.try_wait() {
            Ok(Some(status)) => {
                self.exit_status = Some(status);
                SessionStatus::Exited
            }
            Ok(None) => SessionStatus::Running,
            Err(err) => {
                warn!(session_id = %self.id, %err, "failed to poll worker status");
                SessionStatus::Exited
            }
        }
    }

    /// Human-readable description of the recorded exit status.
    #[must_use]
    pub fn exit_status_text(&self) -> String {
        self.exit_status.map_or_else(
            || "status unknown".to_owned(),
            |status| {
                if status.success() {
                    "exited normally (code 0)".to_owned()
                } else {
                    status.code().map_or_else(
                        || "terminated by signal".to_owned(),
                        |code| format!("exited with code {code}"),
                    )
                }
            },
        )
    }

    /// Deliver an interrupt signal to the worker process.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Session` when the process is already reaped or
    /// signal delivery fails.
    #[cfg(unix)]
    pub fn send_interrupt(&mut self) -> Result<()> {
        let pid = self
            .child
            .id()
            .ok_or_else(|| AppError::Session("worker already reaped".into()))?;
        let pid = i32::try_from(pid)
            .map_err(|err| AppError::Session(format!("pid out of range: {err}")))?;
        nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid), nix::sys::signal::Signal::SIGINT)
            .map_err(|err| AppError::Session(format!("failed to signal worker: {err}")))
    }

    /// Deliver an interrupt to the worker process.
    ///
    /// Signals are unavailable on this platform; the kill request is the
    /// closest equivalent.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Session` when the kill request fails.
    #[cfg(not(unix))]
    pub fn send_interrupt(&mut self) -> Result<()> {
        self.child
            .start_kill()
            .map_err(|err| AppError::Session(format!("failed to signal worker: {err}")))
    }

    /// Run the graduated stop ladder against this session.
    ///
    /// 1. Best-effort `stop` token over the session channel (a worker that
    ///    never bound its channel is treated as not listening).
    /// 2. Wait `stop_grace_ms`; a worker that exited is a graceful stop.
    /// 3. Wait `stop_wait_ms` more; if still alive, send the interrupt.
    /// 4. Wait `kill_grace_ms` for the interrupt to land; force-kill after.
    pub async fn graceful_stop(&mut self, timeouts: &TimeoutConfig) -> StopOutcome {
        if let Err(err) = ipc_client::send_token(&self.channel_name, CommandToken::Stop).await {
            debug!(session_id = %self.id, %err, "worker not listening on session channel");
        }

        tokio::time::sleep(Duration::from_millis(timeouts.stop_grace_ms)).await;
        if self.status() == SessionStatus::Exited {
            info!(session_id = %self.id, "worker stopped gracefully");
            return StopOutcome::Graceful;
        }

        tokio::time::sleep(Duration::from_millis(timeouts.stop_wait_ms)).await;
        if self.status() == SessionStatus::Exited {
            info!(session_id = %self.id, "worker stopped gracefully");
            return StopOutcome::Graceful;
        }

        if let Err(err) = self.send_interrupt() {
            warn!(session_id = %self.id, %err, "interrupt delivery failed");
        }

        let kill_grace = Duration::from_millis(timeouts.kill_grace_ms);
        match tokio::time::timeout(kill_grace, self.child.wait()).await {
            Ok(Ok(status)) => {
                self.exit_status = Some(status);
                info!(session_id = %self.id, "worker stopped after interrupt");
                StopOutcome::Interrupted
            }
            Ok(Err(err)) => {
                warn!(session_id = %self.id, %err, "error waiting for worker exit");
                StopOutcome::Interrupted
            }
            Err(_) => {
                warn!(
                    session_id = %self.id,
                    "worker did not exit within grace period, forcing kill"
                );
                if let Err(err) = self.child.kill().await {
                    warn!(session_id = %self.id, %err, "failed to force-kill worker");
                }
                StopOutcome::Killed
            }
        }
    }
}

fn spawn_stdout_relay(stdout: ChildStdout, session_id: String) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stdout).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            info!(session_id = %session_id, "{line}");
        }
    });
}

fn spawn_stderr_relay(stderr: ChildStderr, session_id: String) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            warn!(session_id = %session_id, "{line}");
        }
    });
}
