//! HTTP/2 stream management
//!
//! Client-side streams as defined in RFC 7540 Section 5.1. Each stream
//! buffers its own response (decoded head and body) so frames
//! can be demultiplexed in any order.

use super::error::{Error, ErrorCode, Result};
use super::flow_control::FlowControl;
use super::MAX_STREAM_ID;
use crate::http::Headers;
use std::collections::HashMap;

/// Stream ID type
pub type StreamId = u32;

/// Stream state as defined in RFC 7540 Section 5.1
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// No frames have been sent/received
    Idle,
    /// Both sides can send frames
    Open,
    /// We can't send, they can
    HalfClosedLocal,
    /// They can't send, we can
    HalfClosedRemote,
    Closed,
}

impl StreamState {
    /// Check if stream can send data
    pub fn can_send(&self) -> bool {
        matches!(self, StreamState::Open | StreamState::HalfClosedRemote)
    }

    /// Check if stream can receive data
    pub fn can_receive(&self) -> bool {
        matches!(self, StreamState::Open | StreamState::HalfClosedLocal)
    }

    /// Check if stream is closed
    pub fn is_closed(&self) -> bool {
        matches!(self, StreamState::Closed)
    }
}

/// A completed response read off one stream
#[derive(Debug, Clone)]
pub struct H2Response {
    pub stream_id: StreamId,
    pub status: u16,
    /// Regular headers; pseudo-headers are stripped
    pub headers: Headers,
    pub body: Vec<u8>,
}

/// HTTP/2 stream
#[derive(Debug)]
pub struct H2Stream {
    id: StreamId,
    state: StreamState,
    flow_control: FlowControl,
    head: Option<(u16, Headers)>,
    body: Vec<u8>,
    reset: Option<ErrorCode>,
}

impl H2Stream {
    /// Create a new stream with specified window sizes
    pub fn new(id: StreamId, send_window: u32, recv_window: u32) -> Self {
        H2Stream {
            id,
            state: StreamState::Idle,
            flow_control: FlowControl::with_initial_sizes(send_window, recv_window),
            head: None,
            body: Vec::new(),
            reset: None,
        }
    }

    pub fn id(&self) -> StreamId {
        self.id
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn flow_control(&self) -> &FlowControl {
        &self.flow_control
    }

    pub fn flow_control_mut(&mut self) -> &mut FlowControl {
        &mut self.flow_control
    }

    /// Accumulated body
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Error code if the peer reset this stream
    pub fn reset_code(&self) -> Option<ErrorCode> {
        self.reset
    }

    /// The response is complete or the stream was reset
    pub fn is_finished(&self) -> bool {
        self.reset.is_some()
            || (self.head.is_some()
                && matches!(self.state, StreamState::HalfClosedRemote | StreamState::Closed))
    }

    /// Prepare to send HEADERS
    pub fn send_headers(&mut self, end_stream: bool) -> Result<()> {
        self.state = match (self.state, end_stream) {
            (StreamState::Idle, false) => StreamState::Open,
            (StreamState::Idle, true) => StreamState::HalfClosedLocal,
            (state, _) => {
                return Err(Error::Protocol(format!(
                    "Cannot send HEADERS on stream {} in state {:?}",
                    self.id, state
                )))
            }
        };
        Ok(())
    }

    /// Prepare to send DATA; returns how many bytes the stream window allows
    pub fn send_data(&mut self, data_len: usize, end_stream: bool) -> Result<usize> {
        if !self.state.can_send() {
            return Err(Error::Protocol(format!(
                "Cannot send DATA on stream {} in state {:?}",
                self.id, self.state
            )));
        }

        let sendable = self.flow_control.consume_send_window(data_len);

        if end_stream && sendable == data_len {
            self.state = match self.state {
                StreamState::Open => StreamState::HalfClosedLocal,
                _ => StreamState::Closed,
            };
        }

        Ok(sendable)
    }

    /// Store a decoded header block
    ///
    /// Interim (1xx) responses are dropped and a second block after the final
    /// head is treated as trailers and ignored.
    pub fn receive_head(&mut self, status: Option<u16>, headers: Headers, end_stream: bool) -> Result<()> {
        if !self.state.can_receive() {
            return Err(Error::Protocol(format!(
                "HEADERS on stream {} in state {:?}",
                self.id, self.state
            )));
        }

        if self.head.is_none() {
            let status = status.ok_or_else(|| {
                Error::Protocol(format!("response on stream {} without :status", self.id))
            })?;
            if !(100..200).contains(&status) {
                self.head = Some((status, headers));
            }
        }

        if end_stream {
            self.remote_closed();
        }
        Ok(())
    }

    /// Process incoming DATA payload
    ///
    /// Flow control is accounted by the caller on the full frame length,
    /// padding included.
    pub fn receive_data(&mut self, data: &[u8], end_stream: bool) -> Result<()> {
        if !self.state.can_receive() || self.head.is_none() {
            return Err(Error::Protocol(format!(
                "DATA on stream {} in state {:?}",
                self.id, self.state
            )));
        }

        self.body.extend_from_slice(data);

        if end_stream {
            self.remote_closed();
        }
        Ok(())
    }

    fn remote_closed(&mut self) {
        self.state = match self.state {
            StreamState::Open => StreamState::HalfClosedRemote,
            _ => StreamState::Closed,
        };
    }

    /// Peer reset the stream
    pub fn reset(&mut self, code: ErrorCode) {
        self.state = StreamState::Closed;
        self.reset = Some(code);
        self.body.clear();
    }

    /// Close the stream
    pub fn close(&mut self) {
        self.state = StreamState::Closed;
    }

    /// Turn a finished stream into its response
    pub fn into_response(self) -> Result<H2Response> {
        if let Some(code) = self.reset {
            return Err(Error::StreamReset {
                stream_id: self.id,
                code,
            });
        }
        let (status, headers) = self.head.ok_or_else(|| {
            Error::Protocol(format!("stream {} ended without response headers", self.id))
        })?;
        Ok(H2Response {
            stream_id: self.id,
            status,
            headers,
            body: self.body,
        })
    }
}

/// Stream manager
///
/// Owns all client-initiated streams of one session.
#[derive(Debug)]
pub struct StreamManager {
    streams: HashMap<StreamId, H2Stream>,
    next_stream_id: StreamId,
    max_concurrent_streams: Option<u32>,
}

impl StreamManager {
    /// Create a new stream manager (client streams use odd IDs)
    pub fn new() -> Self {
        StreamManager {
            streams: HashMap::new(),
            next_stream_id: 1,
            max_concurrent_streams: None,
        }
    }

    /// Set maximum concurrent streams (from peer SETTINGS)
    pub fn set_max_concurrent_streams(&mut self, max: Option<u32>) {
        self.max_concurrent_streams = max;
    }

    /// Get next stream ID (without incrementing)
    pub fn peek_next_stream_id(&self) -> StreamId {
        self.next_stream_id
    }

    /// Highest stream ID handed out so far (0 if none)
    pub fn last_stream_id(&self) -> StreamId {
        self.next_stream_id.saturating_sub(2)
    }

    /// Allocate next stream ID and create stream
    pub fn create_stream(&mut self, send_window: u32, recv_window: u32) -> Result<StreamId> {
        if let Some(max) = self.max_concurrent_streams {
            if self.active_stream_count() >= max as usize {
                return Err(Error::TooManyStreams);
            }
        }
        if self.next_stream_id > MAX_STREAM_ID {
            return Err(Error::TooManyStreams);
        }

        let stream_id = self.next_stream_id;
        self.next_stream_id += 2;

        self.streams
            .insert(stream_id, H2Stream::new(stream_id, send_window, recv_window));

        Ok(stream_id)
    }

    pub fn get_stream(&self, stream_id: StreamId) -> Option<&H2Stream> {
        self.streams.get(&stream_id)
    }

    pub fn get_stream_mut(&mut self, stream_id: StreamId) -> Option<&mut H2Stream> {
        self.streams.get_mut(&stream_id)
    }

    pub fn remove_stream(&mut self, stream_id: StreamId) -> Option<H2Stream> {
        self.streams.remove(&stream_id)
    }

    /// Streams not yet closed
    pub fn active_stream_count(&self) -> usize {
        self.streams
            .values()
            .filter(|s| !s.state().is_closed())
            .count()
    }

    pub fn streams_mut(&mut self) -> impl Iterator<Item = &mut H2Stream> {
        self.streams.values_mut()
    }
}

impl Default for StreamManager {
    fn default() -> Self {
        Self::new()
    }
}
