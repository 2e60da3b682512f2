//! HTTP/2 client engine
//!
//! A blocking HTTP/2 implementation that runs over a borrowed transport.
//! [`H2Session`] owns the protocol state of one connection (HPACK tables,
//! streams, SETTINGS and flow-control windows) while the connection cache
//! keeps ownership of the TLS socket itself.
//!
//! ## Features
//!
//! - **Frame handling**: every RFC 7540 frame type is parsed; PRIORITY and
//!   extension frames are ignored, PUSH_PROMISE is refused (push is disabled)
//! - **Stream multiplexing**: several streams can be opened before any
//!   response is awaited; frames for other streams are buffered per stream
//! - **HPACK compression**: via the `hpack` crate, decoded strictly in wire order
//! - **Flow control**: connection and stream windows, WINDOW_UPDATE at half
//! - **GOAWAY**: streams above the peer's last stream ID fail, the session
//!   refuses new streams
//!
//! # Examples
//!
//! ```no_run
//! use alpnmux::http::h2::{H2Request, H2SessionBuilder};
//! use alpnmux::http::tls::{TlsConfig, TlsTransport};
//! use alpnmux::http::{HttpSession, Method};
//! use std::net::TcpStream;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let tls_config = TlsConfig::client()
//!     .alpn(&["h2"])
//!     .verify_peer(false)
//!     .build()?;
//!
//! let tcp = TcpStream::connect("example.com:443")?;
//! let mut transport = TlsTransport::connect(tcp, &tls_config, Some("example.com"))?;
//! let mut io = HttpSession::new(&mut transport);
//!
//! let mut session = H2SessionBuilder::new("example.com").handshake(&mut io)?;
//! let a = session.start_request(&mut io, &H2Request::new(Method::Get, "/a"))?;
//! let b = session.start_request(&mut io, &H2Request::new(Method::Get, "/b"))?;
//!
//! println!("{}", session.await_response(&mut io, a)?.status);
//! println!("{}", session.await_response(&mut io, b)?.status);
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod error;
pub mod flow_control;
pub mod frames;
pub mod session;
pub mod settings;
pub mod stream;

pub use error::{Error, ErrorCode, Result};
pub use frames::{Frame, FrameFlags, FrameType};
pub use session::{H2Request, H2Session, H2SessionBuilder};
pub use settings::{Settings, SettingsBuilder};
pub use stream::{H2Response, H2Stream, StreamId, StreamState};

/// HTTP/2 connection preface that must be sent by clients
///
/// From RFC 7540 Section 3.5:
/// "PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n"
pub const CONNECTION_PREFACE: &[u8] = b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n";

/// Default initial window size (65535 bytes)
pub const DEFAULT_INITIAL_WINDOW_SIZE: u32 = 65535;

/// Default maximum frame size (16384 bytes)
pub const DEFAULT_MAX_FRAME_SIZE: u32 = 16384;

/// Default header table size (4096 bytes)
pub const DEFAULT_HEADER_TABLE_SIZE: u32 = 4096;

/// Maximum stream ID value (2^31 - 1)
pub const MAX_STREAM_ID: u32 = 0x7FFFFFFF;

/// Stream ID 0 (connection-level)
pub const CONNECTION_STREAM_ID: u32 = 0;
