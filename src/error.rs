//! Error types for static file delivery
//!
//! `ServeError` is the failure taxonomy of the request pipeline. `ErrorContext` is the
//! loggable record of one failure: numeric code, message, optional detail and the source
//! location that raised it.

use std::io;
use std::panic::Location;

use thiserror::Error;

/// Numeric code for socket failures (outside the HTTP status range)
pub const CODE_SOCKET_ERROR: u16 = 1001;

/// Failures raised while serving a request
#[derive(Debug, Error)]
pub enum ServeError {
    /// The request path failed validation
    #[error("path rejected: {reason}")]
    PathRejected { reason: String },

    /// The file does not exist under the document root
    #[error("file not found: {0}")]
    NotFound(String),

    /// Reading the file failed or produced an unexpected size
    #[error("internal error: {0}")]
    Internal(String),

    /// Connection reset or aborted; may succeed on retry
    #[error("transient socket error: {0}")]
    SocketTransient(#[source] io::Error),

    /// Non-retryable send failure, or retries exhausted
    #[error("socket error after {sent} bytes: {source}")]
    SocketFatal {
        sent: usize,
        #[source]
        source: io::Error,
    },
}

impl ServeError {
    /// Numeric code used in logs and, for HTTP failures, as the status code
    pub const fn code(&self) -> u16 {
        match self {
            Self::PathRejected { .. } => 403,
            Self::NotFound(_) => 404,
            Self::Internal(_) => 500,
            Self::SocketTransient(_) | Self::SocketFatal { .. } => CODE_SOCKET_ERROR,
        }
    }

    /// Whether an I/O error from the transport is worth retrying
    pub fn is_transient(err: &io::Error) -> bool {
        matches!(
            err.kind(),
            io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionAborted
        )
    }
}

/// A logged failure with the location that produced it
#[derive(Debug, Clone)]
pub struct ErrorContext {
    pub code: u16,
    pub message: String,
    pub detail: Option<String>,
    pub location: &'static Location<'static>,
}

impl ErrorContext {
    #[track_caller]
    pub fn new(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            detail: None,
            location: Location::caller(),
        }
    }

    #[track_caller]
    pub fn with_detail(code: u16, message: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            detail: Some(detail.into()),
            location: Location::caller(),
        }
    }

    #[track_caller]
    pub fn from_error(err: &ServeError) -> Self {
        Self {
            code: err.code(),
            message: err.to_string(),
            detail: None,
            location: Location::caller(),
        }
    }
}
