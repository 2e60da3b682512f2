//! Client-level errors
//!
//! Every failure reaching the caller of `Client::request` is one of the
//! variants below. Errors from the HTTP/1.1 engine, the HTTP/2 session and
//! the TLS layer are folded in with `From` so `?` works across layers.

use crate::connection::ConnectionState;
use crate::http;
use crate::http::h2;

/// Result type for client operations
pub type Result<T> = std::result::Result<T, Error>;

/// Client errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// DNS, TCP or TLS handshake failure; no connection was created
    #[error("connection to {origin} failed: {reason}")]
    Connection { origin: String, reason: String },

    /// The peer's traffic does not match the protocol negotiated by ALPN
    #[error("protocol mismatch: {0}")]
    ProtocolMismatch(String),

    /// Malformed response, stream reset, or transport closed mid-request
    #[error("request failed: {0}")]
    Request(#[from] RequestError),

    /// An operation exceeded its deadline
    #[error("operation timed out")]
    Timeout,

    #[error("invalid URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Cause of a [`Error::Request`]
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("HTTP/1.1: {0}")]
    Http1(http::Error),

    #[error("HTTP/2: {0}")]
    Http2(h2::Error),

    #[error("connection is {0:?} and cannot carry this request")]
    NotReady(ConnectionState),
}

impl Error {
    /// Whether the connection that produced this error must be evicted
    ///
    /// After a failed HTTP/1.1 exchange the byte stream position is unknown,
    /// so any HTTP/1.1 error is fatal. On HTTP/2 only a single stream reset
    /// leaves the session usable.
    pub fn is_fatal_for_connection(&self) -> bool {
        match self {
            Error::Timeout | Error::ProtocolMismatch(_) | Error::Connection { .. } => true,
            Error::Request(RequestError::Http1(_)) => true,
            Error::Request(RequestError::Http2(e)) => e.is_session_fatal(),
            Error::Request(RequestError::NotReady(_)) => false,
            Error::InvalidUrl { .. } | Error::Config(_) => false,
        }
    }

    /// Whether this is a timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout)
    }

    pub(crate) fn invalid_url(url: &str, reason: impl Into<String>) -> Self {
        Error::InvalidUrl {
            url: url.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<http::Error> for Error {
    fn from(e: http::Error) -> Self {
        match e {
            http::Error::Timeout => Error::Timeout,
            other => Error::Request(RequestError::Http1(other)),
        }
    }
}

impl From<h2::Error> for Error {
    fn from(e: h2::Error) -> Self {
        match e {
            e if e.is_timeout() => Error::Timeout,
            h2::Error::ProtocolMismatch(seen) => Error::ProtocolMismatch(format!(
                "ALPN selected h2 but the peer answered with {:?}",
                seen
            )),
            other => Error::Request(RequestError::Http2(other)),
        }
    }
}
