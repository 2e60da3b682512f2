//! HTTP engines used by the multiplexing client
//!
//! Both request paths run on top of the same transport abstraction:
//!
//! - `SessionOps` trait defines operations (poll, read, write, close)
//! - `HttpSession` adds a per-operation deadline on top of any `SessionOps`
//! - `&mut S` is itself a `SessionOps`, so a path can borrow a cached
//!   transport for the duration of one request without taking ownership
//!
//! The HTTP/1.1 path lives in [`client`], the HTTP/2 session in [`h2`], and
//! the TLS transport both of them borrow in [`tls`].
//!
//! # Examples
//!
//! ```no_run
//! use alpnmux::http::{client, HttpSession, Method, Http1Request};
//! use alpnmux::http::session::FdSessionOps;
//! use std::net::TcpStream;
//!
//! let stream = TcpStream::connect("127.0.0.1:8080").unwrap();
//! let mut transport = FdSessionOps::new(stream);
//! let mut session = HttpSession::new(&mut transport);
//!
//! let request = Http1Request::new(Method::Get, "/", "localhost");
//! let response = client::exchange(&mut session, &request).unwrap();
//! assert_eq!(response.status().code(), 200);
//! ```

pub mod chunked;
pub mod client;
pub mod h2;
pub mod headers;
pub mod message;
pub mod parser;
pub mod session;
pub mod tls;

pub use client::Http1Request;
pub use headers::Headers;
pub use message::{HttpResponse, Method, Status, Version};
pub use parser::ResponseParser;
pub use session::{HttpSession, PollEvents, SessionOps};

/// Result type for HTTP operations
pub type Result<T> = std::result::Result<T, Error>;

/// HTTP operation errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid HTTP version: {0}")]
    InvalidVersion(String),

    #[error("Invalid HTTP method: {0}")]
    InvalidMethod(String),

    #[error("Invalid HTTP status: {0}")]
    InvalidStatus(String),

    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    #[error("More than {0} header fields")]
    TooManyHeaders(usize),

    #[error("Invalid chunk size: {0}")]
    InvalidChunkSize(String),

    #[error("Incomplete message")]
    Incomplete,

    #[error("Timeout")]
    Timeout,

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Protocol error: {0}")]
    Protocol(String),
}

/// Maximum number of header fields accepted in a response
pub const MAX_HEADERS: usize = 128;

/// Default HTTPS port
pub const DEFAULT_HTTPS_PORT: u16 = 443;

/// CRLF line ending
pub const CRLF: &str = "\r\n";
