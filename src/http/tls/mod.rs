//! TLS transport for the request paths
//!
//! Every connection the client opens is TLS with ALPN. The pieces:
//!
//! 1. [`TlsConfig`] holds the OpenSSL context: ALPN offer list, version range
//!    and certificate verification mode
//! 2. [`TlsTransport`] is one established connection; it implements
//!    `SessionOps` so both request paths can borrow it
//! 3. [`TlsInfo`] is the handshake snapshot, including the negotiated
//!    [`Alpn`] protocol that decides which path a connection takes
//!
//! # Examples
//!
//! ```no_run
//! use alpnmux::http::tls::{Alpn, TlsConfig, TlsVersion};
//! use std::net::TcpStream;
//!
//! let tls_config = TlsConfig::client()
//!     .version_range(TlsVersion::Tls12, TlsVersion::Tls13)
//!     .alpn(&["h2", "http/1.1"])
//!     .verify_peer(true)
//!     .build()
//!     .unwrap();
//!
//! let tcp_stream = TcpStream::connect("example.com:443").unwrap();
//! let transport = tls_config.connect(tcp_stream, Some("example.com")).unwrap();
//! assert_eq!(transport.negotiated_protocol(), Some(&Alpn::H2));
//! ```

pub mod builtin_cert;
pub mod config;
pub mod info;
pub mod transport;

pub use config::{ClientConfigBuilder, ServerConfigBuilder, TlsConfig, TlsError, TlsVersion};
pub use info::{Alpn, TlsInfo};
pub use transport::TlsTransport;

/// Result type for TLS operations
pub type Result<T> = std::result::Result<T, TlsError>;
