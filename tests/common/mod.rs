//! Threaded TLS mock server for integration tests
//!
//! Accepts TLS 1.2 connections with the built-in certificate, selects an
//! ALPN protocol from a configurable list, counts completed handshakes, and
//! answers HTTP/1.1 or HTTP/2 depending on what was negotiated.
//!
//! Special paths:
//! - `/slow`  waits 500 ms before answering
//! - `/close` answers with `Connection: close` and hangs up (HTTP/1.1)
//! - `/bye`   answers normally, then hangs up without notice (HTTP/1.1)
//! - `/reset` is refused with RST_STREAM (HTTP/2)
//! - `/stall` sends the first bytes of a TLS record, then nothing (HTTP/1.1)
//! - `/trickle` sends its response one byte every 40 ms (HTTP/1.1)
//! - `/extra` follows its response with stray bytes (HTTP/1.1)
//! - `/drain` is answered after a GOAWAY that still covers its stream (HTTP/2)
//! - `/gather*` is held until [`GATHER`] such streams are open, then all are
//!   answered newest first (HTTP/2)

#![allow(dead_code)]

use alpnmux::http::h2::codec::FrameCodec;
use alpnmux::http::h2::frames::{DataFrame, GoawayFrame, HeadersFrame, PingFrame, RstStreamFrame, SettingsFrame};
use alpnmux::http::h2::{ErrorCode, FrameType, SettingsBuilder, CONNECTION_PREFACE};
use alpnmux::http::tls::{Alpn, TlsConfig, TlsTransport, TlsVersion};
use alpnmux::http::HttpSession;
use bytes::Bytes;
use std::collections::HashMap;
use std::io::Write;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

pub const BODY: &str = "Hello from mock HTTPS server!";

/// Number of `/gather` streams the HTTP/2 responder waits for
pub const GATHER: usize = 5;

/// Route client logs to the test output; `RUST_LOG=alpnmux=trace` for frames
pub fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "alpnmux=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init();
}

type Io<'a> = HttpSession<&'a mut TlsTransport>;

/// One request seen by the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Seen {
    /// Handshake number of the connection it arrived on (1-based)
    pub connection: usize,
    pub protocol: &'static str,
    pub method: String,
    pub path: String,
}

#[derive(Default)]
struct Shared {
    handshakes: AtomicUsize,
    seen: Mutex<Vec<Seen>>,
    shutdown: AtomicBool,
}

/// Mock server configuration
pub struct MockServerBuilder {
    alpn: Vec<String>,
    http1_only: bool,
}

impl MockServerBuilder {
    /// Protocols the server will select from, in its own preference order
    pub fn alpn(mut self, protocols: &[&str]) -> Self {
        self.alpn = protocols.iter().map(|p| p.to_string()).collect();
        self
    }

    /// Speak HTTP/1.1 whatever ALPN selected
    pub fn http1_only(mut self) -> Self {
        self.http1_only = true;
        self
    }

    pub fn start(self) -> MockServer {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let config = TlsConfig::server()
            .version(TlsVersion::Tls12)
            .alpn(self.alpn.as_slice())
            .build()
            .unwrap();
        let shared = Arc::new(Shared::default());
        let http1_only = self.http1_only;

        let accept_shared = shared.clone();
        thread::spawn(move || {
            for tcp in listener.incoming() {
                if accept_shared.shutdown.load(Ordering::SeqCst) {
                    break;
                }
                let Ok(tcp) = tcp else { continue };
                let config = config.clone();
                let shared = accept_shared.clone();
                thread::spawn(move || serve(tcp, &config, &shared, http1_only));
            }
        });

        MockServer { addr, shared }
    }
}

/// Running mock server; stops accepting when dropped
pub struct MockServer {
    addr: SocketAddr,
    shared: Arc<Shared>,
}

impl MockServer {
    pub fn builder() -> MockServerBuilder {
        MockServerBuilder {
            alpn: vec!["h2".to_string(), "http/1.1".to_string()],
            http1_only: false,
        }
    }

    /// Server selecting from `protocols`
    pub fn start(protocols: &[&str]) -> Self {
        Self::builder().alpn(protocols).start()
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn url(&self, path: &str) -> String {
        format!("https://127.0.0.1:{}{}", self.addr.port(), path)
    }

    /// Completed TLS handshakes
    pub fn handshakes(&self) -> usize {
        self.shared.handshakes.load(Ordering::SeqCst)
    }

    /// Requests seen so far, in arrival order
    pub fn seen(&self) -> Vec<Seen> {
        self.shared.seen.lock().unwrap().clone()
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.shared.shutdown.store(true, Ordering::SeqCst);
        // Unblock the accept loop
        let _ = TcpStream::connect(self.addr);
    }
}

fn serve(tcp: TcpStream, config: &TlsConfig, shared: &Shared, http1_only: bool) {
    let Ok(mut transport) = config.accept(tcp) else {
        return;
    };
    let connection = shared.handshakes.fetch_add(1, Ordering::SeqCst) + 1;
    let negotiated = transport.negotiated_protocol().cloned();

    let mut io = HttpSession::with_timeout(&mut transport, Some(Duration::from_secs(60)));
    match negotiated {
        Some(Alpn::H2) if !http1_only => serve_h2(&mut io, shared, connection),
        _ => serve_http1(&mut io, shared, connection),
    }
}

fn record(shared: &Shared, connection: usize, protocol: &'static str, method: &str, path: &str) {
    shared.seen.lock().unwrap().push(Seen {
        connection,
        protocol,
        method: method.to_string(),
        path: path.to_string(),
    });
}

fn response_body(path: &str) -> String {
    format!("{} path={}", BODY, path)
}

fn serve_http1(io: &mut Io<'_>, shared: &Shared, connection: usize) {
    let mut buf: Vec<u8> = Vec::new();
    let mut chunk = [0u8; 4096];

    loop {
        let head_end = loop {
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
            match io.read(&mut chunk) {
                Ok(0) | Err(_) => return,
                Ok(n) => buf.extend_from_slice(&chunk[..n]),
            }
        };

        let head = String::from_utf8_lossy(&buf[..head_end]).into_owned();
        let mut request_line = head.lines().next().unwrap_or("").split_whitespace();
        let method = request_line.next().unwrap_or("").to_string();
        let path = request_line.next().unwrap_or("").to_string();
        let content_length = head
            .lines()
            .filter_map(|line| line.split_once(':'))
            .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
            .and_then(|(_, value)| value.trim().parse::<usize>().ok())
            .unwrap_or(0);

        while buf.len() < head_end + content_length {
            match io.read(&mut chunk) {
                Ok(0) | Err(_) => return,
                Ok(n) => buf.extend_from_slice(&chunk[..n]),
            }
        }
        buf.drain(..head_end + content_length);

        record(shared, connection, "http/1.1", &method, &path);

        if path == "/slow" {
            thread::sleep(Duration::from_millis(500));
        }
        if path == "/stall" {
            // Application-data record header announcing 64 bytes, then 3 of them
            let mut tcp = io.get_ref().tcp_stream();
            let _ = tcp.write_all(&[0x17, 0x03, 0x03, 0x00, 0x40, 1, 2, 3]);
            thread::sleep(Duration::from_secs(3));
            return;
        }

        let body = response_body(&path);
        let close = path == "/close";
        let mut response = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: {}\r\n{}\r\n{}",
            body.len(),
            if close { "Connection: close\r\n" } else { "" },
            body
        );
        if path == "/extra" {
            response.push_str("HTTP/1.1 500 Internal Server Error\r\nContent-Length: 0\r\n\r\n");
        }

        if path == "/trickle" {
            for byte in response.as_bytes() {
                if io.write_all(std::slice::from_ref(byte)).is_err() {
                    return;
                }
                thread::sleep(Duration::from_millis(40));
            }
        } else if io.write_all(response.as_bytes()).is_err() {
            return;
        }

        if close || path == "/bye" {
            return;
        }
    }
}

fn serve_h2(io: &mut Io<'_>, shared: &Shared, connection: usize) {
    let mut preface = [0u8; 24];
    if io.read_exact(&mut preface).is_err() || preface != CONNECTION_PREFACE {
        return;
    }

    let Ok(settings) = SettingsBuilder::new().max_concurrent_streams(100).build() else {
        return;
    };
    if io
        .write_all(&FrameCodec::encode_settings_frame(&SettingsFrame::new(settings)))
        .is_err()
    {
        return;
    }

    let mut decoder = hpack::Decoder::new();
    let mut encoder = hpack::Encoder::new();
    // Streams whose request body is still arriving
    let mut open: HashMap<u32, (String, String)> = HashMap::new();
    let mut held: Vec<(u32, String, String)> = Vec::new();

    loop {
        let Ok(frame) = FrameCodec::read_frame(io, 16384) else {
            return;
        };

        let outcome = match frame.frame_type() {
            Some(FrameType::Settings) if !frame.flags.is_ack() => {
                io.write_all(&FrameCodec::encode_settings_frame(&SettingsFrame::ack()))
            }
            Some(FrameType::Ping) if !frame.flags.is_ack() => match frame.ping() {
                Ok(ping) => io.write_all(&FrameCodec::encode_ping_frame(&PingFrame::ack(ping.data))),
                Err(_) => return,
            },
            Some(FrameType::Headers) => {
                let Ok(block) = frame.content() else { return };
                let Ok(fields) = decoder.decode(&block) else { return };
                let pseudo = |name: &[u8]| {
                    fields
                        .iter()
                        .find(|(n, _)| n.as_slice() == name)
                        .map(|(_, v)| String::from_utf8_lossy(v).into_owned())
                        .unwrap_or_default()
                };
                let method = pseudo(b":method");
                let path = pseudo(b":path");

                if frame.flags.is_end_stream() {
                    let request = (frame.stream_id, method, path);
                    on_h2_request(io, &mut encoder, shared, connection, &mut held, request)
                } else {
                    open.insert(frame.stream_id, (method, path));
                    Ok(())
                }
            }
            Some(FrameType::Data) if frame.flags.is_end_stream() => match open.remove(&frame.stream_id) {
                Some((method, path)) => {
                    let request = (frame.stream_id, method, path);
                    on_h2_request(io, &mut encoder, shared, connection, &mut held, request)
                }
                None => Ok(()),
            },
            Some(FrameType::Goaway) => return,
            _ => Ok(()),
        };

        if outcome.is_err() {
            return;
        }
    }
}

fn on_h2_request(
    io: &mut Io<'_>,
    encoder: &mut hpack::Encoder<'static>,
    shared: &Shared,
    connection: usize,
    held: &mut Vec<(u32, String, String)>,
    (stream_id, method, path): (u32, String, String),
) -> alpnmux::http::Result<()> {
    if !path.starts_with("/gather") {
        return respond_h2(io, encoder, shared, connection, stream_id, &method, &path);
    }

    held.push((stream_id, method, path));
    if held.len() < GATHER {
        return Ok(());
    }
    while let Some((stream_id, method, path)) = held.pop() {
        respond_h2(io, encoder, shared, connection, stream_id, &method, &path)?;
    }
    Ok(())
}

fn respond_h2(
    io: &mut Io<'_>,
    encoder: &mut hpack::Encoder<'static>,
    shared: &Shared,
    connection: usize,
    stream_id: u32,
    method: &str,
    path: &str,
) -> alpnmux::http::Result<()> {
    record(shared, connection, "h2", method, path);

    if path == "/reset" {
        let rst = RstStreamFrame {
            stream_id,
            error_code: ErrorCode::RefusedStream,
        };
        return io.write_all(&FrameCodec::encode_rst_stream_frame(&rst));
    }
    if path == "/slow" {
        thread::sleep(Duration::from_millis(500));
    }
    if path == "/drain" {
        let goaway = GoawayFrame::new(stream_id, ErrorCode::NoError, Bytes::new());
        io.write_all(&FrameCodec::encode_goaway_frame(&goaway))?;
    }

    let body = response_body(path);
    let length = body.len().to_string();
    let block = encoder.encode(vec![
        (&b":status"[..], &b"200"[..]),
        (&b"content-type"[..], &b"text/plain"[..]),
        (&b"content-length"[..], length.as_bytes()),
    ]);

    io.write_all(&FrameCodec::encode_headers_frame(&HeadersFrame::new(
        stream_id,
        Bytes::from(block),
        false,
        true,
    )))?;
    io.write_all(&FrameCodec::encode_data_frame(&DataFrame::new(
        stream_id,
        Bytes::from(body),
        true,
    )))
}
