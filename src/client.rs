//! Client-side command behaviors.
//!
//! Every invocation that is not the owning supervisor goes through here:
//! probe the project lock to learn whether an owner exists, then deliver
//! the command token over the control channel. Commands against a stopped
//! server are no-ops reported to the caller, never errors.

use serde_json::Value;

use crate::config::GlobalConfig;
use crate::ipc::{client as ipc_client, CommandToken};
use crate::lock::ProjectLock;
use crate::Result;

/// Result of a status query.
#[derive(Debug)]
pub enum ServerStatus {
    /// No process holds the exclusive project lock.
    NotRunning,
    /// The lock is held; `detail` carries the owner's snapshot when the
    /// control channel answered.
    Running {
        /// Live snapshot from the owner, if reachable over IPC.
        detail: Option<Value>,
    },
}

/// Whether some process holds the exclusive lock for this project.
///
/// Probes with a shared lock that is released immediately; the probe never
/// mutates lock state.
///
/// # Errors
///
/// Returns `AppError::Lock` if the lock file cannot be opened.
pub fn server_is_running(config: &GlobalConfig) -> Result<bool> {
    ProjectLock::new(&config.lock_path()).is_locked()
}

async fn send(config: &GlobalConfig, token: CommandToken) -> Result<bool> {
    if !server_is_running(config)? {
        return Ok(false);
    }
    ipc_client::send_command(&config.channel_name(), token).await?;
    Ok(true)
}

/// Send `stop` to the running owner.
///
/// Returns `Ok(false)` when no server is running — stopping a stopped
/// server is a no-op.
///
/// # Errors
///
/// Returns `AppError::Ipc` when a running owner cannot be reached.
pub async fn stop(config: &GlobalConfig) -> Result<bool> {
    send(config, CommandToken::Stop).await
}

/// Send `reload` to the running owner.
///
/// # Errors
///
/// Returns `AppError::Ipc` when a running owner cannot be reached.
pub async fn reload(config: &GlobalConfig) -> Result<bool> {
    send(config, CommandToken::Reload).await
}

/// Send `restart` to the running owner.
///
/// # Errors
///
/// Returns `AppError::Ipc` when a running owner cannot be reached.
pub async fn restart(config: &GlobalConfig) -> Result<bool> {
    send(config, CommandToken::Restart).await
}

/// Query server liveness, enriched with the owner's snapshot when the
/// control channel is reachable. Channel failures degrade to the bare
/// lock-probe answer.
///
/// # Errors
///
/// Returns `AppError::Lock` if the lock file cannot be opened.
pub async fn status(config: &GlobalConfig) -> Result<ServerStatus> {
    if !server_is_running(config)? {
        return Ok(ServerStatus::NotRunning);
    }
    let detail = ipc_client::query_status(&config.channel_name()).await.ok();
    Ok(ServerStatus::Running { detail })
}
