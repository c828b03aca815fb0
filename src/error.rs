//! Unified error type.

use std::fmt;

use http::StatusCode;

/// The part of a request a bind operation decodes.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Part {
    Body,
    Query,
    Path,
}

impl fmt::Display for Part {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Body  => "body",
            Self::Query => "query",
            Self::Path  => "path",
        })
    }
}

/// The error type returned by switchboard's fallible operations.
///
/// Handler-facing variants ([`Decode`](Error::Decode),
/// [`Serialize`](Error::Serialize), [`Status`](Error::Status),
/// [`Handler`](Error::Handler)) travel back up the middleware chain and are
/// turned into a response by the engine's error handler. The remaining
/// variants surface infrastructure failures: binding, shutdown, config.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The listener could not bind. Raised inside `start`, which normally
    /// runs on its own task, so it is logged rather than returned to the
    /// supervisor that launched it.
    #[error("bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// A request part could not be decoded into the requested shape.
    #[error("decode {part}: {message}")]
    Decode { part: Part, message: String },

    /// A response value could not be encoded.
    #[error("serialize: {0}")]
    Serialize(String),

    /// A handler rejected the request with a specific HTTP status.
    #[error("{message}")]
    Status { status: StatusCode, message: String },

    /// Any other failure signalled by a handler or middleware.
    #[error(transparent)]
    Handler(Box<dyn std::error::Error + Send + Sync>),

    #[error("server already started")]
    AlreadyStarted,

    #[error("server did not stop within the shutdown deadline")]
    ShutdownTimeout,

    #[error("config: {0}")]
    Config(String),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// A handler failure carrying an HTTP status.
    ///
    /// Codes outside `100..=999` become `500`.
    pub fn status(code: u16, message: impl Into<String>) -> Self {
        Self::Status {
            status: StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            message: message.into(),
        }
    }

    /// Wraps an arbitrary error as a handler failure.
    pub fn handler(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Handler(err.into())
    }

    pub(crate) fn decode(part: Part, err: impl fmt::Display) -> Self {
        Self::Decode { part, message: err.to_string() }
    }

    /// The HTTP status the default error handler answers with.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Decode { .. } => StatusCode::BAD_REQUEST,
            Self::Status { status, .. } => *status,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
