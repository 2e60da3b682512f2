//! HTTP/2 client session
//!
//! An [`H2Session`] is the multiplexing state for one TLS transport: HPACK
//! tables, the stream table, both sides' SETTINGS and the connection-level
//! flow-control windows. It never owns the transport. Every call borrows an
//! `HttpSession` over it, so the connection cache stays the single owner of
//! the socket and the session is dropped together with it.
//!
//! Requests are multiplexed by opening several streams with
//! [`start_request`](H2Session::start_request) before awaiting any of them.
//! While [`await_response`](H2Session::await_response) waits for one stream,
//! frames for every other stream are applied to that stream's buffers, so
//! nothing read off the wire is lost.

use super::codec::{FrameCodec, FRAME_HEADER_SIZE};
use super::error::{Error, ErrorCode, Result};
use super::flow_control::FlowControl;
use super::frames::*;
use super::settings::{Settings, SettingsBuilder};
use super::stream::{H2Response, StreamId, StreamManager};
use super::{CONNECTION_PREFACE, CONNECTION_STREAM_ID, DEFAULT_INITIAL_WINDOW_SIZE};
use crate::http::{Headers, HttpSession, Method, SessionOps};
use bytes::Bytes;

/// Headers that are meaningless or forbidden in HTTP/2 (RFC 7540 8.1.2.2)
const CONNECTION_SPECIFIC: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-connection",
    "transfer-encoding",
    "upgrade",
    "host",
];

/// A request to be sent on a new stream
#[derive(Debug, Clone)]
pub struct H2Request {
    pub method: Method,
    /// Path including query string
    pub path: String,
    pub headers: Headers,
    pub body: Vec<u8>,
}

impl H2Request {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        H2Request {
            method,
            path: path.into(),
            headers: Headers::new(),
            body: Vec::new(),
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }
}

/// Header block being assembled from HEADERS + CONTINUATION frames
struct PendingBlock {
    stream_id: StreamId,
    block: Vec<u8>,
    end_stream: bool,
}

/// HTTP/2 client session bound to one transport
pub struct H2Session {
    streams: StreamManager,
    flow_control: FlowControl,
    encoder: hpack::Encoder<'static>,
    decoder: hpack::Decoder<'static>,
    local_settings: Settings,
    remote_settings: Settings,
    authority: String,
    user_agent: Option<String>,
    pending_block: Option<PendingBlock>,
    goaway: Option<(StreamId, ErrorCode)>,
    closed: bool,
}

impl H2Session {
    /// Perform the handshake with default settings
    pub fn handshake<S: SessionOps>(io: &mut HttpSession<S>, authority: impl Into<String>) -> Result<Self> {
        H2SessionBuilder::new(authority).handshake(io)
    }

    /// Whether new streams can be opened
    pub fn is_open(&self) -> bool {
        !self.closed && self.goaway.is_none()
    }

    /// GOAWAY received from the peer, if any
    pub fn goaway(&self) -> Option<(StreamId, ErrorCode)> {
        self.goaway
    }

    /// Settings announced by the peer
    pub fn remote_settings(&self) -> &Settings {
        &self.remote_settings
    }

    /// Settings we announced
    pub fn local_settings(&self) -> &Settings {
        &self.local_settings
    }

    /// Streams opened and not yet completed
    pub fn active_streams(&self) -> usize {
        self.streams.active_stream_count()
    }

    /// Send one request and wait for its response
    pub fn request<S: SessionOps>(&mut self, io: &mut HttpSession<S>, request: &H2Request) -> Result<H2Response> {
        let stream_id = self.start_request(io, request)?;
        self.await_response(io, stream_id)
    }

    /// Open a stream and send the request on it without waiting
    pub fn start_request<S: SessionOps>(&mut self, io: &mut HttpSession<S>, request: &H2Request) -> Result<StreamId> {
        if let Some((last_stream_id, code)) = self.goaway {
            return Err(Error::GoAway { last_stream_id, code });
        }
        if self.closed {
            return Err(Error::SessionClosed);
        }

        let stream_id = self.streams.create_stream(
            self.remote_settings.get_initial_window_size(),
            self.local_settings.get_initial_window_size(),
        )?;

        let result = self.send_request(io, stream_id, request);
        self.fail_session_on(result)?;

        tracing::trace!(stream_id, method = request.method.as_str(), path = %request.path, "h2 stream opened");
        Ok(stream_id)
    }

    /// Wait until the stream's response is complete
    ///
    /// Frames for other streams read meanwhile are buffered on those streams.
    pub fn await_response<S: SessionOps>(&mut self, io: &mut HttpSession<S>, stream_id: StreamId) -> Result<H2Response> {
        loop {
            let stream = self
                .streams
                .get_stream(stream_id)
                .ok_or(Error::StreamNotFound(stream_id))?;

            if stream.is_finished() {
                let stream = self
                    .streams
                    .remove_stream(stream_id)
                    .ok_or(Error::StreamNotFound(stream_id))?;
                return match (stream.into_response(), self.goaway) {
                    (Err(Error::StreamReset { .. }), Some((last_stream_id, code)))
                        if stream_id > last_stream_id =>
                    {
                        Err(Error::GoAway { last_stream_id, code })
                    }
                    (result, _) => result,
                };
            }

            if self.closed {
                return Err(Error::SessionClosed);
            }

            let result = self.read_and_process(io);
            self.fail_session_on(result)?;
        }
    }

    /// Send GOAWAY and mark the session closed
    pub fn close<S: SessionOps>(&mut self, io: &mut HttpSession<S>) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let goaway = GoawayFrame::new(0, ErrorCode::NoError, Bytes::new());
        io.write_all(&FrameCodec::encode_goaway_frame(&goaway))?;
        Ok(())
    }

    fn fail_session_on<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            if e.is_session_fatal() {
                tracing::debug!(error = %e, "h2 session failed");
                self.closed = true;
            }
        }
        result
    }

    fn send_request<S: SessionOps>(&mut self, io: &mut HttpSession<S>, stream_id: StreamId, request: &H2Request) -> Result<()> {
        let authority = request
            .headers
            .get("host")
            .unwrap_or(&self.authority)
            .to_string();

        let mut fields: Vec<(String, String)> = vec![
            (":method".to_string(), request.method.as_str().to_string()),
            (":scheme".to_string(), "https".to_string()),
            (":authority".to_string(), authority),
            (":path".to_string(), request.path.clone()),
        ];
        if let Some(agent) = &self.user_agent {
            if !request.headers.contains("user-agent") {
                fields.push(("user-agent".to_string(), agent.clone()));
            }
        }
        for (name, value) in request.headers.iter() {
            if !CONNECTION_SPECIFIC.contains(&name) {
                fields.push((name.to_string(), value.to_string()));
            }
        }
        if !request.body.is_empty() && !request.headers.contains("content-length") {
            fields.push(("content-length".to_string(), request.body.len().to_string()));
        }

        let block = self
            .encoder
            .encode(fields.iter().map(|(n, v)| (n.as_bytes(), v.as_bytes())));

        let end_stream = request.body.is_empty();
        self.streams
            .get_stream_mut(stream_id)
            .ok_or(Error::StreamNotFound(stream_id))?
            .send_headers(end_stream)?;

        let max_frame = self.remote_settings.get_max_frame_size() as usize;
        let mut fragments = block.chunks(max_frame);
        let first = fragments.next().unwrap_or(&[]);
        let mut rest = fragments.peekable();

        let headers = HeadersFrame::new(stream_id, Bytes::copy_from_slice(first), end_stream, rest.peek().is_none());
        io.write_all(&FrameCodec::encode_headers_frame(&headers))?;
        while let Some(fragment) = rest.next() {
            let continuation = ContinuationFrame {
                stream_id,
                header_block: Bytes::copy_from_slice(fragment),
                end_headers: rest.peek().is_none(),
            };
            io.write_all(&FrameCodec::encode_continuation_frame(&continuation))?;
        }

        if !end_stream {
            self.send_body(io, stream_id, &request.body)?;
        }
        Ok(())
    }

    fn send_body<S: SessionOps>(&mut self, io: &mut HttpSession<S>, stream_id: StreamId, body: &[u8]) -> Result<()> {
        let max_frame = self.remote_settings.get_max_frame_size() as usize;
        let mut offset = 0;

        while offset < body.len() {
            let stream_window = self
                .streams
                .get_stream(stream_id)
                .ok_or(Error::StreamNotFound(stream_id))?
                .flow_control()
                .send_window()
                .size();
            let window = stream_window.min(self.flow_control.send_window().size());

            if window <= 0 {
                // Blocked on flow control; the peer's WINDOW_UPDATE opens it.
                self.read_and_process(io)?;
                let stream = self
                    .streams
                    .get_stream(stream_id)
                    .ok_or(Error::StreamNotFound(stream_id))?;
                if stream.reset_code().is_some() || stream.is_finished() {
                    return Ok(());
                }
                continue;
            }

            let len = (body.len() - offset).min(max_frame).min(window as usize);
            let end_stream = offset + len == body.len();

            self.flow_control.consume_send_window(len);
            self.streams
                .get_stream_mut(stream_id)
                .ok_or(Error::StreamNotFound(stream_id))?
                .send_data(len, end_stream)?;

            let data = DataFrame::new(stream_id, Bytes::copy_from_slice(&body[offset..offset + len]), end_stream);
            io.write_all(&FrameCodec::encode_data_frame(&data))?;
            offset += len;
        }
        Ok(())
    }

    fn read_and_process<S: SessionOps>(&mut self, io: &mut HttpSession<S>) -> Result<()> {
        let frame = FrameCodec::read_frame(io, self.local_settings.get_max_frame_size())?;
        self.process_frame(io, frame)
    }

    fn process_frame<S: SessionOps>(&mut self, io: &mut HttpSession<S>, frame: Frame) -> Result<()> {
        let frame_type = frame.frame_type();
        tracing::trace!(
            frame = frame_type.map(|t| t.name()).unwrap_or("UNKNOWN"),
            stream_id = frame.stream_id,
            len = frame.payload.len(),
            "h2 frame received"
        );

        if let Some(pending) = &self.pending_block {
            if frame_type != Some(FrameType::Continuation) || frame.stream_id != pending.stream_id {
                return Err(Error::Protocol(format!(
                    "expected CONTINUATION for stream {}",
                    pending.stream_id
                )));
            }
        }

        match frame_type {
            Some(FrameType::Data) => self.on_data(io, &frame),
            Some(FrameType::Headers) => {
                if frame.stream_id == CONNECTION_STREAM_ID {
                    return Err(Error::Protocol("HEADERS on stream 0".to_string()));
                }
                self.pending_block = Some(PendingBlock {
                    stream_id: frame.stream_id,
                    block: frame.content()?.to_vec(),
                    end_stream: frame.flags.is_end_stream(),
                });
                if frame.flags.is_end_headers() {
                    self.finish_header_block()?;
                }
                Ok(())
            }
            Some(FrameType::Continuation) => {
                let pending = self.pending_block.as_mut().ok_or_else(|| {
                    Error::Protocol("CONTINUATION without open header block".to_string())
                })?;
                pending.block.extend_from_slice(&frame.payload);
                if frame.flags.is_end_headers() {
                    self.finish_header_block()?;
                }
                Ok(())
            }
            Some(FrameType::RstStream) => {
                let rst = frame.rst_stream()?;
                tracing::warn!(stream_id = rst.stream_id, code = %rst.error_code, "h2 stream reset by peer");
                if let Some(stream) = self.streams.get_stream_mut(rst.stream_id) {
                    stream.reset(rst.error_code);
                }
                Ok(())
            }
            Some(FrameType::Settings) => {
                if frame.stream_id != CONNECTION_STREAM_ID {
                    return Err(Error::Protocol("SETTINGS on non-zero stream".to_string()));
                }
                if frame.flags.is_ack() {
                    return Ok(());
                }
                self.apply_remote_settings(&frame.payload)?;
                io.write_all(&FrameCodec::encode_settings_frame(&SettingsFrame::ack()))?;
                Ok(())
            }
            Some(FrameType::Ping) => {
                let ping = frame.ping()?;
                if !ping.ack {
                    io.write_all(&FrameCodec::encode_ping_frame(&PingFrame::ack(ping.data)))?;
                }
                Ok(())
            }
            Some(FrameType::Goaway) => {
                let goaway = frame.goaway()?;
                tracing::debug!(
                    last_stream_id = goaway.last_stream_id,
                    code = %goaway.error_code,
                    "h2 GOAWAY received"
                );
                self.goaway = Some((goaway.last_stream_id, goaway.error_code));
                // Streams the peer never processed cannot complete
                for stream in self.streams.streams_mut() {
                    if stream.id() > goaway.last_stream_id && !stream.is_finished() {
                        stream.reset(ErrorCode::RefusedStream);
                    }
                }
                Ok(())
            }
            Some(FrameType::WindowUpdate) => {
                let update = frame.window_update()?;
                if update.stream_id == CONNECTION_STREAM_ID {
                    self.flow_control.increase_send_window(update.size_increment)?;
                } else if let Some(stream) = self.streams.get_stream_mut(update.stream_id) {
                    stream.flow_control_mut().increase_send_window(update.size_increment)?;
                }
                Ok(())
            }
            Some(FrameType::PushPromise) => Err(Error::Protocol(
                "PUSH_PROMISE received with push disabled".to_string(),
            )),
            // PRIORITY and extension frames carry nothing we act on
            Some(FrameType::Priority) | None => Ok(()),
        }
    }

    fn on_data<S: SessionOps>(&mut self, io: &mut HttpSession<S>, frame: &Frame) -> Result<()> {
        if frame.stream_id == CONNECTION_STREAM_ID {
            return Err(Error::Protocol("DATA on stream 0".to_string()));
        }

        let flow_len = frame.payload.len();
        self.flow_control.consume_recv_window(flow_len)?;

        let content = frame.content()?;
        let mut stream_update = None;
        if let Some(stream) = self.streams.get_stream_mut(frame.stream_id) {
            if stream.reset_code().is_none() {
                stream.flow_control_mut().consume_recv_window(flow_len)?;
                stream.receive_data(&content, frame.flags.is_end_stream())?;
                if !frame.flags.is_end_stream() {
                    stream_update = stream.flow_control().should_send_window_update();
                }
            }
        }

        if let Some(increment) = self.flow_control.should_send_window_update() {
            self.flow_control.release_recv_window(increment)?;
            let update = WindowUpdateFrame::new(CONNECTION_STREAM_ID, increment);
            io.write_all(&FrameCodec::encode_window_update_frame(&update))?;
        }
        if let Some(increment) = stream_update {
            if let Some(stream) = self.streams.get_stream_mut(frame.stream_id) {
                stream.flow_control_mut().release_recv_window(increment)?;
            }
            let update = WindowUpdateFrame::new(frame.stream_id, increment);
            io.write_all(&FrameCodec::encode_window_update_frame(&update))?;
        }
        Ok(())
    }

    fn finish_header_block(&mut self) -> Result<()> {
        let Some(pending) = self.pending_block.take() else {
            return Ok(());
        };

        // Always decode: the HPACK table must see every block in order.
        let fields = self
            .decoder
            .decode(&pending.block)
            .map_err(|e| Error::Compression(format!("HPACK decode error: {:?}", e)))?;

        let mut status = None;
        let mut headers = Headers::new();
        for (name, value) in fields {
            let name = String::from_utf8_lossy(&name).into_owned();
            let value = String::from_utf8_lossy(&value).into_owned();
            if name == ":status" {
                let code = value
                    .parse::<u16>()
                    .map_err(|_| Error::Protocol(format!("invalid :status {:?}", value)))?;
                status = Some(code);
            } else if !name.starts_with(':') {
                headers.insert(name, value);
            }
        }

        match self.streams.get_stream_mut(pending.stream_id) {
            Some(stream) if stream.reset_code().is_none() => {
                stream.receive_head(status, headers, pending.end_stream)
            }
            _ => Ok(()),
        }
    }

    fn apply_remote_settings(&mut self, payload: &[u8]) -> Result<()> {
        let settings = Settings::decode(payload)?;

        if let Some(new_size) = settings.initial_window_size {
            for stream in self.streams.streams_mut() {
                stream.flow_control_mut().send_window_mut().update_initial_size(new_size)?;
            }
        }
        if settings.max_concurrent_streams.is_some() {
            self.streams
                .set_max_concurrent_streams(settings.max_concurrent_streams);
        }

        self.remote_settings.merge(&settings);
        Ok(())
    }
}

/// HTTP/2 session builder
pub struct H2SessionBuilder {
    authority: String,
    user_agent: Option<String>,
    settings: SettingsBuilder,
    connection_window: u32,
}

impl H2SessionBuilder {
    /// Start a builder for requests to `authority` ("host" or "host:port")
    pub fn new(authority: impl Into<String>) -> Self {
        H2SessionBuilder {
            authority: authority.into(),
            user_agent: None,
            settings: SettingsBuilder::new()
                .enable_push(false)
                .initial_window_size(DEFAULT_INITIAL_WINDOW_SIZE),
            connection_window: DEFAULT_INITIAL_WINDOW_SIZE,
        }
    }

    /// Default `user-agent` for requests that do not set one
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    /// Per-stream receive window we announce
    pub fn initial_window_size(mut self, size: u32) -> Self {
        self.settings = self.settings.initial_window_size(size);
        self
    }

    /// Largest frame payload we accept
    pub fn max_frame_size(mut self, size: u32) -> Self {
        self.settings = self.settings.max_frame_size(size);
        self
    }

    /// Connection-level receive window (raised with WINDOW_UPDATE after the
    /// handshake)
    pub fn connection_window_size(mut self, size: u32) -> Self {
        self.connection_window = size.max(DEFAULT_INITIAL_WINDOW_SIZE);
        self
    }

    /// Send the preface and SETTINGS, then wait for the peer's SETTINGS
    ///
    /// A first frame other than SETTINGS means the peer is not speaking
    /// HTTP/2 and fails with [`Error::ProtocolMismatch`].
    pub fn handshake<S: SessionOps>(self, io: &mut HttpSession<S>) -> Result<H2Session> {
        let local_settings = self.settings.build()?;

        io.write_all(CONNECTION_PREFACE)?;
        io.write_all(&FrameCodec::encode_settings_frame(&SettingsFrame::new(
            local_settings.clone(),
        )))?;

        let mut header = [0u8; FRAME_HEADER_SIZE];
        io.read_exact(&mut header)?;
        let (kind, flags, stream_id, length) = FrameCodec::decode_header(&header);

        if kind != FrameType::Settings.as_u8() || flags.is_ack() || stream_id != CONNECTION_STREAM_ID {
            return Err(Error::ProtocolMismatch(
                String::from_utf8_lossy(&header).into_owned(),
            ));
        }
        if length > local_settings.get_max_frame_size() as usize {
            return Err(Error::FrameSize(format!("initial SETTINGS length {}", length)));
        }

        let mut payload = vec![0u8; length];
        io.read_exact(&mut payload)?;

        let mut session = H2Session {
            streams: StreamManager::new(),
            flow_control: FlowControl::with_initial_sizes(DEFAULT_INITIAL_WINDOW_SIZE, DEFAULT_INITIAL_WINDOW_SIZE),
            encoder: hpack::Encoder::new(),
            decoder: hpack::Decoder::new(),
            local_settings,
            remote_settings: Settings::new(),
            authority: self.authority,
            user_agent: self.user_agent,
            pending_block: None,
            goaway: None,
            closed: false,
        };

        session.apply_remote_settings(&payload)?;
        io.write_all(&FrameCodec::encode_settings_frame(&SettingsFrame::ack()))?;

        let extra = self.connection_window - DEFAULT_INITIAL_WINDOW_SIZE;
        if extra > 0 {
            session.flow_control.release_recv_window(extra)?;
            let update = WindowUpdateFrame::new(CONNECTION_STREAM_ID, extra);
            io.write_all(&FrameCodec::encode_window_update_frame(&update))?;
        }

        tracing::debug!(
            max_concurrent_streams = ?session.remote_settings.get_max_concurrent_streams(),
            "h2 session established"
        );
        Ok(session)
    }
}
