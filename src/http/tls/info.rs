//! Handshake results
//!
//! A [`TlsInfo`] is captured once, right after the handshake completes, and
//! never refreshed. In particular the negotiated ALPN protocol is fixed for
//! the lifetime of the transport.

use openssl::ssl::{NameType, SslRef};
use std::fmt;

/// An ALPN protocol identifier selected by the server
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Alpn {
    /// `h2` - HTTP/2 over TLS
    H2,
    /// `http/1.1`
    Http11,
    /// Any other identifier the server chose from our list
    Other(String),
}

impl Alpn {
    /// Interpret the raw protocol bytes from the handshake
    pub fn from_wire(proto: &[u8]) -> Self {
        match proto {
            b"h2" => Alpn::H2,
            b"http/1.1" => Alpn::Http11,
            other => Alpn::Other(String::from_utf8_lossy(other).into_owned()),
        }
    }

    /// The protocol identifier as sent on the wire
    pub fn as_str(&self) -> &str {
        match self {
            Alpn::H2 => "h2",
            Alpn::Http11 => "http/1.1",
            Alpn::Other(name) => name,
        }
    }
}

impl fmt::Display for Alpn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Negotiated TLS parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsInfo {
    /// Negotiated TLS version (e.g., "TLSv1.3")
    pub version: String,

    /// Negotiated cipher suite
    pub cipher: String,

    /// SNI servername sent by the client
    pub servername: Option<String>,

    /// Negotiated ALPN protocol, `None` when the server selected none
    pub alpn: Option<Alpn>,
}

impl TlsInfo {
    /// Snapshot an SSL connection after its handshake
    pub fn from_ssl(ssl: &SslRef) -> Self {
        TlsInfo {
            version: ssl.version_str().to_string(),
            cipher: ssl
                .current_cipher()
                .map(|c| c.name().to_string())
                .unwrap_or_else(|| "<undef>".to_string()),
            servername: ssl.servername(NameType::HOST_NAME).map(|s| s.to_string()),
            alpn: ssl.selected_alpn_protocol().map(Alpn::from_wire),
        }
    }

    /// Negotiated protocol as a string, if any
    pub fn alpn_str(&self) -> Option<&str> {
        self.alpn.as_ref().map(Alpn::as_str)
    }
}
