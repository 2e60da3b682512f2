//! Protocol dispatch
//!
//! The single branch point of the client: which request path a transport
//! uses, decided from the protocol that transport negotiated. Callers pass
//! the live transport's ALPN result every time, never a value remembered
//! from an earlier connection to the same host.

use crate::http::tls::Alpn;
use crate::result::HttpVersion;
use std::fmt;

/// Request path for a transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    /// Sequential keep-alive exchanges
    Http1,
    /// Multiplexed streams over one session
    Http2,
}

impl Route {
    pub fn http_version(&self) -> HttpVersion {
        match self {
            Route::Http1 => HttpVersion::Http11,
            Route::Http2 => HttpVersion::Http2,
        }
    }

    /// Whether several requests may be in flight at once
    pub fn is_multiplexed(&self) -> bool {
        matches!(self, Route::Http2)
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Route::Http1 => f.write_str("http/1.1"),
            Route::Http2 => f.write_str("h2"),
        }
    }
}

/// Pick the request path for a negotiated protocol
///
/// `h2` selects HTTP/2. Anything else, including no ALPN at all, falls back
/// to HTTP/1.1.
pub fn route(negotiated: Option<&Alpn>) -> Route {
    match negotiated {
        Some(Alpn::H2) => Route::Http2,
        Some(Alpn::Http11) | Some(Alpn::Other(_)) | None => Route::Http1,
    }
}
