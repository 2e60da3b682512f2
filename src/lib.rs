//! alpnmux - single-socket HTTP/1.1 + HTTP/2 client driven by ALPN
//!
//! The client opens exactly one TLS connection per `host:port`, reads the
//! protocol the server picked during the handshake, and sends every later
//! request for that origin over the same socket: sequential keep-alive
//! exchanges when HTTP/1.1 was negotiated, multiplexed streams when `h2` was.
//!
//! # Examples
//!
//! ```no_run
//! use alpnmux::{Client, ClientConfig, RequestOptions};
//!
//! let mut client = Client::new(ClientConfig::builder().build()?)?;
//!
//! let first = client.get("https://example.com/")?;
//! let second = client.request("https://example.com/about", RequestOptions::default())?;
//!
//! println!("{} over HTTP/{}", first.status_code, first.http_version);
//! assert_eq!(client.cached_connection_count(), 1);
//! # let _ = second;
//! client.close_all();
//! # Ok::<(), alpnmux::Error>(())
//! ```

pub mod cache;
pub mod client;
pub mod config;
pub mod connection;
pub mod connector;
pub mod dispatch;
pub mod error;
pub mod http;
pub mod origin;
pub mod result;

pub use cache::{ConnectionCache, Lease};
pub use client::Client;
pub use config::{CertVerification, ClientConfig, ClientConfigBuilder, RequestOptions};
pub use connection::{CachedConnection, Channel, ConnectionState, OutboundRequest, Pending};
pub use connector::Connector;
pub use dispatch::{route, Route};
pub use error::{Error, RequestError, Result};
pub use http::Method;
pub use origin::Origin;
pub use result::{HttpVersion, RequestResult};
