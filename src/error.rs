//! Error types for a single client session.

use std::io;

/// Everything that can end a session iteration early.
///
/// None of these stop the server: the session loop logs them and goes back
/// to accepting. Setup failures (bind/listen) are not represented here; they
/// surface from the binary as `anyhow` errors.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("incorrect command verb {0:?}")]
    IncorrectCommand(String),

    #[error("file not found: {0}")]
    FileNotFound(String),

    #[error("cannot read {name}: {source}")]
    Unreadable {
        name: String,
        #[source]
        source: io::Error,
    },

    #[error("invalid data port {0:?}")]
    InvalidPort(String),

    #[error("cannot resolve {host}:{port}")]
    Resolve { host: String, port: u16 },

    #[error("data connection to {target} failed: {source}")]
    Connect {
        target: String,
        #[source]
        source: io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl SessionError {
    /// Whether the client was already told about this failure over the
    /// control connection.
    pub fn is_client_visible(&self) -> bool {
        matches!(
            self,
            SessionError::IncorrectCommand(_)
                | SessionError::FileNotFound(_)
                | SessionError::Unreadable { .. }
        )
    }

    /// Short label used in logs and the transfer log.
    pub fn kind(&self) -> &'static str {
        match self {
            SessionError::IncorrectCommand(_) => "protocol",
            SessionError::FileNotFound(_) | SessionError::Unreadable { .. } => "resource",
            SessionError::InvalidPort(_)
            | SessionError::Resolve { .. }
            | SessionError::Connect { .. }
            | SessionError::Io(_) => "connectivity",
        }
    }
}
