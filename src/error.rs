//! Error types for the request lifecycle.
//!
//! Every terminal failure a caller sees is a [`RequestError`]. Each variant
//! maps onto one of three [`ErrorKind`]s, which drive retry decisions in the
//! execution engine:
//!
//! | Kind | Variants | Retried |
//! |------|----------|---------|
//! | `server` | [`RequestError::Server`] | yes, until the budget is spent |
//! | `logic` | [`RequestError::Logic`] | never |
//! | `fail` | [`RequestError::Transport`], [`RequestError::MissingAdapter`] | transport only |

use std::fmt;

use serde_json::Value;
use thiserror::Error;

/// Coarse classification of a [`RequestError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The transport returned a status outside `[200, 300)`.
    Server,
    /// The response parsed, but its business code is not a success code.
    Logic,
    /// Transport-level failure or misconfiguration.
    Fail,
}

impl ErrorKind {
    /// Returns the stable lowercase label used in logs and CLI output.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Server => "server",
            Self::Logic => "logic",
            Self::Fail => "fail",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classified errors produced while executing a request.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RequestError {
    /// Non-2xx HTTP status.
    #[error("server error: HTTP {status_code}")]
    Server {
        /// The status code returned by the transport.
        status_code: u16,
    },

    /// Business-level failure reported inside a 2xx response body.
    #[error("{message}")]
    Logic {
        /// Message derived from the response payload or the configured fallback.
        message: String,
        /// The canonical business code, `None` when the payload carried none.
        retcode: Option<Value>,
    },

    /// The adapter rejected the attempt (network error, abort, timeout).
    #[error("request failed: {message}")]
    Transport {
        /// Reason reported by the adapter.
        message: String,
    },

    /// No adapter was configured for the request.
    #[error("request failed: no transport adapter configured")]
    MissingAdapter,
}

impl RequestError {
    /// Creates a server error.
    pub fn server(status_code: u16) -> Self {
        Self::Server { status_code }
    }

    /// Creates a logic error carrying the canonical business code.
    pub fn logic(message: impl Into<String>, retcode: Option<Value>) -> Self {
        Self::Logic {
            message: message.into(),
            retcode,
        }
    }

    /// Creates a transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Returns the error's kind.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Server { .. } => ErrorKind::Server,
            Self::Logic { .. } => ErrorKind::Logic,
            Self::Transport { .. } | Self::MissingAdapter => ErrorKind::Fail,
        }
    }

    /// Returns the HTTP status code for server errors.
    #[must_use]
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Server { status_code } => Some(*status_code),
            _ => None,
        }
    }

    /// Returns the business code for logic errors.
    #[must_use]
    pub fn retcode(&self) -> Option<&Value> {
        match self {
            Self::Logic { retcode, .. } => retcode.as_ref(),
            _ => None,
        }
    }

    /// Whether another attempt may succeed where this one failed.
    ///
    /// Logic errors are business answers and a missing adapter is a
    /// configuration error; neither changes on retry.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Server { .. } | Self::Transport { .. })
    }
}
