//! Owner-side control channel.
//!
//! Listens on a named pipe (Windows) or Unix domain socket (Linux/macOS)
//! using the `interprocess` crate. Accepts line-delimited JSON commands and
//! pushes the recognized tokens into a bounded queue that the supervisor
//! drains in arrival order — a command sent after the channel exists but
//! before the supervisor blocks in `recv()` is buffered, not lost.
//!
//! ## Protocol
//!
//! Request (one JSON object per line):
//! ```json
//! {"command": "stop"}
//! {"command": "reload"}
//! {"command": "restart"}
//! {"command": "status"}
//! ```
//!
//! Response (one JSON object per line):
//! ```json
//! {"ok": true, "data": { ... } }
//! {"ok": false, "error": "unknown command"}
//! ```
//!
//! `status` is answered inline from the shared status snapshot and never
//! enters the command queue; it is a pure query with no state transition.

use interprocess::local_socket::{tokio::prelude::*, GenericNamespaced, ListenerOptions};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::ipc::CommandToken;
use crate::supervisor::StatusHandle;
use crate::{AppError, Result};

/// Commands buffered between the accept loop and the supervisor.
const COMMAND_QUEUE_DEPTH: usize = 32;

/// Inbound IPC request.
#[derive(Debug, Deserialize)]
pub(crate) struct IpcRequest {
    /// Command verb.
    pub command: String,
}

/// Outbound IPC response.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct IpcResponse {
    /// Whether the command succeeded.
    pub ok: bool,
    /// Payload on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    /// Error message on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl IpcResponse {
    pub(crate) fn success(data: serde_json::Value) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    pub(crate) fn error(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Handle to the owner-side listener and its accept task.
///
/// Dropping (or [`close`](Self::close)-ing) the channel cancels the accept
/// loop and releases the socket name.
#[derive(Debug)]
pub struct ControlChannel {
    name: String,
    ct: CancellationToken,
    accept_task: tokio::task::JoinHandle<()>,
}

impl ControlChannel {
    /// Bind the listener and spawn the accept loop.
    ///
    /// Returns the channel handle and the receiving end of the buffered
    /// command queue.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Ipc` if the socket name is invalid or the
    /// listener cannot be created (typically: name already in use).
    pub fn create(name: &str, status: StatusHandle) -> Result<(Self, mpsc::Receiver<CommandToken>)> {
        let listener_name = name
            .to_ns_name::<GenericNamespaced>()
            .map_err(|err| AppError::Ipc(format!("invalid ipc socket name '{name}': {err}")))?;

        let listener = ListenerOptions::new()
            .name(listener_name)
            .create_tokio()
            .map_err(|err| AppError::Ipc(format!("failed to create ipc listener: {err}")))?;

        info!(ipc_name = %name, "control channel listening");

        let (tx, rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);
        let ct = CancellationToken::new();
        let accept_ct = ct.clone();

        let accept_task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = accept_ct.cancelled() => {
                        info!("control channel shutting down");
                        break;
                    }
                    accept_result = listener.accept() => {
                        match accept_result {
                            Ok(stream) => {
                                let tx = tx.clone();
                                let status = StatusHandle::clone(&status);
                                tokio::spawn(handle_connection(stream, tx, status));
                            }
                            Err(err) => {
                                warn!(%err, "control channel accept failed");
                            }
                        }
                    }
                }
            }
        });

        Ok((
            Self {
                name: name.to_owned(),
                ct,
                accept_task,
            },
            rx,
        ))
    }

    /// Socket name this channel is bound to.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Tear the channel down: stop accepting and release the socket name.
    pub fn close(self) {
        self.ct.cancel();
        self.accept_task.abort();
    }
}

/// Handle a single client connection.
async fn handle_connection(
    stream: interprocess::local_socket::tokio::Stream,
    tx: mpsc::Sender<CommandToken>,
    status: StatusHandle,
) {
    let (reader, mut writer) = stream.split();
    let mut buf_reader = BufReader::new(reader);
    let mut line = String::new();

    loop {
        line.clear();
        match buf_reader.read_line(&mut line).await {
            Ok(0) => break, // EOF
            Ok(_) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }

                let response = match serde_json::from_str::<IpcRequest>(trimmed) {
                    Ok(request) => dispatch_command(&request, &tx, &status).await,
                    Err(err) => IpcResponse::error(format!("invalid json: {err}")),
                };

                let mut response_line = serde_json::to_string(&response).unwrap_or_else(|_| {
                    r#"{"ok":false,"error":"serialization failed"}"#.to_owned()
                });
                response_line.push('\n');

                if let Err(err) = writer.write_all(response_line.as_bytes()).await {
                    warn!(%err, "failed to write ipc response");
                    break;
                }
            }
            Err(err) => {
                warn!(%err, "ipc read error");
                break;
            }
        }
    }

    debug!("ipc connection closed");
}

/// Route one request: queries are answered inline, commands are queued.
async fn dispatch_command(
    request: &IpcRequest,
    tx: &mpsc::Sender<CommandToken>,
    status: &StatusHandle,
) -> IpcResponse {
    if request.command == "status" {
        let snapshot = status
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone();
        return match serde_json::to_value(&snapshot) {
            Ok(data) => IpcResponse::success(data),
            Err(err) => IpcResponse::error(format!("status serialization failed: {err}")),
        };
    }

    let Some(token) = CommandToken::parse(&request.command) else {
        return IpcResponse::error(format!("unknown command: {}", request.command));
    };

    if tx.send(token).await.is_err() {
        return IpcResponse::error("supervisor is shutting down");
    }

    info!(command = %token, "command accepted");
    IpcResponse::success(serde_json::json!({ "accepted": token.as_str() }))
}
