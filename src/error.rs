use std::backtrace::Backtrace;
use std::error::Error as StdError;
use std::fmt;
use std::io;

use crate::driver::CliError;

/// Unified error type for the analysis driver.
///
/// Per-action failures (a failed prerequisite, an ill-typed package, a run
/// callback returning an error) are deliberately *not* represented here;
/// they are bound to their action and surfaced through the reporter. This
/// type covers the failures that abort the whole invocation.
#[derive(Debug)]
pub enum Error {
    Io(io::Error),
    Cli(CliError),
    Config {
        message: String,
    },
    Loader {
        message: String,
    },
    Transport {
        message: String,
    },
    Internal {
        message: String,
        backtrace: Option<Backtrace>,
    },
}

/// Convenience result alias used across the driver.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Construct a configuration error (duplicate analysis name, cyclic
    /// requires, malformed fact type, flag conflict).
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Construct a loader error (package failed to load or resolve).
    pub fn loader(message: impl Into<String>) -> Self {
        Self::Loader {
            message: message.into(),
        }
    }

    /// Construct a transport error (malformed or unreadable fact data).
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Construct an internal driver error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
            backtrace: capture_backtrace(),
        }
    }

    /// Return the captured backtrace, if any.
    pub fn backtrace(&self) -> Option<&Backtrace> {
        match self {
            Error::Internal { backtrace, .. } => backtrace.as_ref(),
            _ => None,
        }
    }
}

fn capture_backtrace() -> Option<Backtrace> {
    if cfg!(debug_assertions) {
        Some(Backtrace::force_capture())
    } else {
        None
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(err) => write!(f, "I/O error: {err}"),
            Error::Cli(err) => write!(f, "{err}"),
            Error::Config { message } => write!(f, "configuration error: {message}"),
            Error::Loader { message } => write!(f, "load error: {message}"),
            Error::Transport { message } => write!(f, "fact transport error: {message}"),
            Error::Internal { message, .. } => write!(f, "internal error: {message}"),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            Error::Cli(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(error: io::Error) -> Self {
        Error::Io(error)
    }
}

impl From<CliError> for Error {
    fn from(error: CliError) -> Self {
        Error::Cli(error)
    }
}
