#![forbid(unsafe_code)]

//! `procwarden` — process-supervision daemon.
//!
//! Keeps one long-running application worker alive, restarts it on crash,
//! reloads it when watched source files change, and accepts
//! `stop`/`reload`/`restart`/`status` commands over a named local IPC
//! socket. The first invocation to win the project lock becomes the owning
//! supervisor; every other invocation degrades to an IPC client.

pub mod client;
pub mod config;
pub mod errors;
pub mod ipc;
pub mod lock;
pub mod monitor;
pub mod session;
pub mod supervisor;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
