//! Error types shared across the application.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all domain failure modes.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// Project lock acquisition or probe failure.
    Lock(String),
    /// Control-channel (IPC) communication failure.
    Ipc(String),
    /// Worker-session spawn, signal, or lifecycle failure.
    Session(String),
    /// Change-monitor registration or scan failure.
    Watch(String),
    /// File-system or I/O operation failure.
    Io(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Lock(msg) => write!(f, "lock: {msg}"),
            Self::Ipc(msg) => write!(f, "ipc: {msg}"),
            Self::Session(msg) => write!(f, "session: {msg}"),
            Self::Watch(msg) => write!(f, "watch: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
