//! Error types for terminal control

use std::io;

use thiserror::Error;

/// Result alias used across the crate
pub type Result<T, E = TermError> = std::result::Result<T, E>;

/// Everything that can go wrong while driving the terminal.
///
/// All of these are fatal: the caller clears the screen, restores the
/// terminal and exits with status 1.
#[derive(Debug, Error)]
pub enum TermError {
    /// Reading the current terminal attributes failed
    #[error("tcgetattr: {0}")]
    TerminalQuery(#[source] io::Error),

    /// Installing terminal attributes failed, on entry or on restore
    #[error("tcsetattr: {0}")]
    TerminalApply(#[source] io::Error),

    /// Reading or writing the terminal failed
    #[error("{op}: {source}")]
    Io {
        op: &'static str,
        #[source]
        source: io::Error,
    },

    /// Neither the direct query nor the cursor probe produced a size
    #[error("window size: {0}")]
    Geometry(String),

    /// Raw mode was already entered once in this process
    #[error("terminal context already used in this process")]
    AlreadyActive,

    /// Config file could not be read or parsed
    #[error("config: {0}")]
    Config(String),
}

/// A fatal error, plus the restore failure hit while shutting down after it
#[derive(Debug, Error)]
#[error("{cause}")]
pub struct Fatal {
    #[source]
    pub cause: TermError,
    pub restore: Option<TermError>,
}

impl From<TermError> for Fatal {
    fn from(cause: TermError) -> Self {
        Self {
            cause,
            restore: None,
        }
    }
}

impl TermError {
    pub(crate) fn read(source: io::Error) -> Self {
        Self::Io { op: "read", source }
    }

    pub(crate) fn write(source: io::Error) -> Self {
        Self::Io { op: "write", source }
    }
}
