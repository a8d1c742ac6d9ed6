//! Local IPC layer — the control channel between clients and the owner.
//!
//! A named pipe (Windows) or Unix domain socket (Linux/macOS) carries
//! line-delimited JSON commands from client invocations to the owning
//! supervisor, and status/acknowledgement replies back. Worker sessions get
//! their own channel, named after the session id, over which the supervisor
//! delivers `stop`/`reload` tokens.

pub mod channel;
pub mod client;

/// Command tokens understood by the supervisor's control channel.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum CommandToken {
    /// Gracefully stop the worker and shut the supervisor down.
    Stop,
    /// Recycle the worker session (new first, then old) with coalescing.
    Reload,
    /// Stop the current worker session and launch a fresh one.
    Restart,
}

impl CommandToken {
    /// Wire representation of the token.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stop => "stop",
            Self::Reload => "reload",
            Self::Restart => "restart",
        }
    }

    /// Parse a wire token; `None` for anything unknown.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "stop" => Some(Self::Stop),
            "reload" => Some(Self::Reload),
            "restart" => Some(Self::Restart),
            _ => None,
        }
    }
}

impl std::fmt::Display for CommandToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
