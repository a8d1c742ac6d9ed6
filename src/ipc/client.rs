//! Client-side control-channel access.
//!
//! Connects to a named socket, sends one JSON-line request, and (for
//! request/response exchanges) reads one JSON-line reply. Worker-session
//! channels additionally get a fire-and-forget token send used by the
//! graceful-stop ladder, where the worker may not be listening at all.

use interprocess::local_socket::tokio::{prelude::*, Stream};
use interprocess::local_socket::GenericNamespaced;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::ipc::channel::IpcResponse;
use crate::ipc::CommandToken;
use crate::{AppError, Result};

async fn connect(ipc_name: &str) -> Result<Stream> {
    let name = ipc_name
        .to_ns_name::<GenericNamespaced>()
        .map_err(|err| AppError::Ipc(format!("invalid ipc socket name '{ipc_name}': {err}")))?;
    Stream::connect(name)
        .await
        .map_err(|err| AppError::Ipc(format!("cannot connect to '{ipc_name}': {err}")))
}

async fn request(ipc_name: &str, command: &str) -> Result<serde_json::Value> {
    let stream = connect(ipc_name).await?;
    let (reader, mut writer) = stream.split();

    let mut request_line = serde_json::json!({ "command": command }).to_string();
    request_line.push('\n');
    writer
        .write_all(request_line.as_bytes())
        .await
        .map_err(|err| AppError::Ipc(format!("send failed: {err}")))?;

    let mut buf_reader = BufReader::new(reader);
    let mut response_line = String::new();
    buf_reader
        .read_line(&mut response_line)
        .await
        .map_err(|err| AppError::Ipc(format!("receive failed: {err}")))?;

    let response: IpcResponse = serde_json::from_str(response_line.trim())
        .map_err(|err| AppError::Ipc(format!("invalid response: {err}")))?;

    if response.ok {
        Ok(response.data.unwrap_or(serde_json::Value::Null))
    } else {
        Err(AppError::Ipc(
            response.error.unwrap_or_else(|| "unknown error".into()),
        ))
    }
}

/// Send a command token to a running owner and wait for the acknowledgement.
///
/// # Errors
///
/// Returns `AppError::Ipc` on connection or protocol failure, or when the
/// owner rejects the command.
pub async fn send_command(ipc_name: &str, token: CommandToken) -> Result<serde_json::Value> {
    request(ipc_name, token.as_str()).await
}

/// Fetch the owner's live status snapshot.
///
/// # Errors
///
/// Returns `AppError::Ipc` on connection or protocol failure.
pub async fn query_status(ipc_name: &str) -> Result<serde_json::Value> {
    request(ipc_name, "status").await
}

/// Fire-and-forget token delivery for worker-session channels.
///
/// No reply is awaited; the connection is flushed and dropped. Callers are
/// expected to treat a returned error as "the remote is not listening" and
/// move on.
///
/// # Errors
///
/// Returns `AppError::Ipc` when the channel cannot be reached or written.
pub async fn send_token(ipc_name: &str, token: CommandToken) -> Result<()> {
    let stream = connect(ipc_name).await?;
    let (_reader, mut writer) = stream.split();

    let mut request_line = serde_json::json!({ "command": token.as_str() }).to_string();
    request_line.push('\n');
    writer
        .write_all(request_line.as_bytes())
        .await
        .map_err(|err| AppError::Ipc(format!("send failed: {err}")))?;
    writer
        .flush()
        .await
        .map_err(|err| AppError::Ipc(format!("flush failed: {err}")))?;
    Ok(())
}
