//! HTTP/2 frame types (RFC 7540 Section 6)
//!
//! [`Frame`] is a raw frame as read off the wire. The typed frames below are
//! either built for sending or parsed out of a raw frame's payload.

use super::error::{Error, ErrorCode, Result};
use super::settings::Settings;
use super::stream::StreamId;
use bytes::Bytes;
use std::fmt;

/// HTTP/2 frame types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameType {
    Data = 0x0,
    Headers = 0x1,
    Priority = 0x2,
    RstStream = 0x3,
    Settings = 0x4,
    PushPromise = 0x5,
    Ping = 0x6,
    Goaway = 0x7,
    WindowUpdate = 0x8,
    Continuation = 0x9,
}

impl FrameType {
    /// Convert frame type to u8
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Create frame type from u8; extension types are `None`
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0x0 => Some(FrameType::Data),
            0x1 => Some(FrameType::Headers),
            0x2 => Some(FrameType::Priority),
            0x3 => Some(FrameType::RstStream),
            0x4 => Some(FrameType::Settings),
            0x5 => Some(FrameType::PushPromise),
            0x6 => Some(FrameType::Ping),
            0x7 => Some(FrameType::Goaway),
            0x8 => Some(FrameType::WindowUpdate),
            0x9 => Some(FrameType::Continuation),
            _ => None,
        }
    }

    /// Get frame type name
    pub fn name(&self) -> &'static str {
        match self {
            FrameType::Data => "DATA",
            FrameType::Headers => "HEADERS",
            FrameType::Priority => "PRIORITY",
            FrameType::RstStream => "RST_STREAM",
            FrameType::Settings => "SETTINGS",
            FrameType::PushPromise => "PUSH_PROMISE",
            FrameType::Ping => "PING",
            FrameType::Goaway => "GOAWAY",
            FrameType::WindowUpdate => "WINDOW_UPDATE",
            FrameType::Continuation => "CONTINUATION",
        }
    }
}

impl fmt::Display for FrameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:x})", self.name(), self.as_u8())
    }
}

/// HTTP/2 frame flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameFlags(u8);

impl FrameFlags {
    /// END_STREAM flag (0x1)
    pub const END_STREAM: u8 = 0x1;

    /// ACK flag (0x1) - used for SETTINGS and PING
    pub const ACK: u8 = 0x1;

    /// END_HEADERS flag (0x4)
    pub const END_HEADERS: u8 = 0x4;

    /// PADDED flag (0x8)
    pub const PADDED: u8 = 0x8;

    /// PRIORITY flag (0x20)
    pub const PRIORITY: u8 = 0x20;

    pub fn empty() -> Self {
        FrameFlags(0)
    }

    pub fn from_u8(flags: u8) -> Self {
        FrameFlags(flags)
    }

    pub fn as_u8(&self) -> u8 {
        self.0
    }

    pub fn set(&mut self, flag: u8) {
        self.0 |= flag;
    }

    pub fn is_set(&self, flag: u8) -> bool {
        (self.0 & flag) != 0
    }

    pub fn is_end_stream(&self) -> bool {
        self.is_set(Self::END_STREAM)
    }

    pub fn is_ack(&self) -> bool {
        self.is_set(Self::ACK)
    }

    pub fn is_end_headers(&self) -> bool {
        self.is_set(Self::END_HEADERS)
    }

    pub fn is_padded(&self) -> bool {
        self.is_set(Self::PADDED)
    }

    pub fn is_priority(&self) -> bool {
        self.is_set(Self::PRIORITY)
    }
}

/// A frame as received from the peer
#[derive(Debug, Clone)]
pub struct Frame {
    /// Raw type byte; see [`Frame::frame_type`]
    pub kind: u8,
    pub flags: FrameFlags,
    pub stream_id: StreamId,
    pub payload: Bytes,
}

impl Frame {
    pub fn new(kind: u8, flags: FrameFlags, stream_id: StreamId, payload: Bytes) -> Self {
        Frame {
            kind,
            flags,
            stream_id,
            payload,
        }
    }

    /// Known frame type, `None` for extension frames (which are ignored)
    pub fn frame_type(&self) -> Option<FrameType> {
        FrameType::from_u8(self.kind)
    }

    /// DATA or HEADERS payload with padding and priority fields removed
    pub fn content(&self) -> Result<Bytes> {
        let mut payload = self.payload.clone();

        let pad_len = if self.flags.is_padded() {
            if payload.is_empty() {
                return Err(Error::FrameSize("PADDED frame without pad length".to_string()));
            }
            let pad = payload[0] as usize;
            payload = payload.slice(1..);
            pad
        } else {
            0
        };

        if self.frame_type() == Some(FrameType::Headers) && self.flags.is_priority() {
            if payload.len() < 5 {
                return Err(Error::FrameSize("HEADERS priority block truncated".to_string()));
            }
            payload = payload.slice(5..);
        }

        if pad_len > payload.len() {
            return Err(Error::Protocol(format!(
                "padding {} exceeds payload {}",
                pad_len,
                payload.len()
            )));
        }
        Ok(payload.slice(..payload.len() - pad_len))
    }

    fn fixed_u32(&self, offset: usize) -> Result<u32> {
        let bytes = self
            .payload
            .get(offset..offset + 4)
            .ok_or_else(|| Error::FrameSize(format!("{} payload too short", self.name())))?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn name(&self) -> &'static str {
        self.frame_type().map(|t| t.name()).unwrap_or("UNKNOWN")
    }

    /// Parse a RST_STREAM payload
    pub fn rst_stream(&self) -> Result<RstStreamFrame> {
        Ok(RstStreamFrame {
            stream_id: self.stream_id,
            error_code: ErrorCode::from_u32(self.fixed_u32(0)?),
        })
    }

    /// Parse a GOAWAY payload
    pub fn goaway(&self) -> Result<GoawayFrame> {
        Ok(GoawayFrame {
            last_stream_id: self.fixed_u32(0)? & 0x7FFF_FFFF,
            error_code: ErrorCode::from_u32(self.fixed_u32(4)?),
            debug_data: self.payload.slice(8..),
        })
    }

    /// Parse a WINDOW_UPDATE payload
    pub fn window_update(&self) -> Result<WindowUpdateFrame> {
        if self.payload.len() != 4 {
            return Err(Error::FrameSize("WINDOW_UPDATE must be 4 bytes".to_string()));
        }
        Ok(WindowUpdateFrame {
            stream_id: self.stream_id,
            size_increment: self.fixed_u32(0)? & 0x7FFF_FFFF,
        })
    }

    /// Parse a PING payload
    pub fn ping(&self) -> Result<PingFrame> {
        let data: [u8; 8] = self
            .payload
            .as_ref()
            .try_into()
            .map_err(|_| Error::FrameSize("PING must be 8 bytes".to_string()))?;
        Ok(PingFrame {
            ack: self.flags.is_ack(),
            data,
        })
    }
}

/// DATA frame (RFC 7540 Section 6.1)
#[derive(Debug, Clone)]
pub struct DataFrame {
    pub stream_id: StreamId,
    pub data: Bytes,
    pub end_stream: bool,
}

impl DataFrame {
    pub fn new(stream_id: StreamId, data: Bytes, end_stream: bool) -> Self {
        DataFrame {
            stream_id,
            data,
            end_stream,
        }
    }
}

/// HEADERS frame (RFC 7540 Section 6.2)
#[derive(Debug, Clone)]
pub struct HeadersFrame {
    pub stream_id: StreamId,
    pub header_block: Bytes,
    pub end_stream: bool,
    pub end_headers: bool,
}

impl HeadersFrame {
    pub fn new(stream_id: StreamId, header_block: Bytes, end_stream: bool, end_headers: bool) -> Self {
        HeadersFrame {
            stream_id,
            header_block,
            end_stream,
            end_headers,
        }
    }
}

/// CONTINUATION frame (RFC 7540 Section 6.10)
#[derive(Debug, Clone)]
pub struct ContinuationFrame {
    pub stream_id: StreamId,
    pub header_block: Bytes,
    pub end_headers: bool,
}

/// RST_STREAM frame (RFC 7540 Section 6.4)
#[derive(Debug, Clone, Copy)]
pub struct RstStreamFrame {
    pub stream_id: StreamId,
    pub error_code: ErrorCode,
}

/// SETTINGS frame (RFC 7540 Section 6.5)
#[derive(Debug, Clone)]
pub struct SettingsFrame {
    pub ack: bool,
    pub settings: Settings,
}

impl SettingsFrame {
    pub fn new(settings: Settings) -> Self {
        SettingsFrame {
            ack: false,
            settings,
        }
    }

    pub fn ack() -> Self {
        SettingsFrame {
            ack: true,
            settings: Settings::default(),
        }
    }
}

/// PING frame (RFC 7540 Section 6.7)
#[derive(Debug, Clone, Copy)]
pub struct PingFrame {
    pub ack: bool,
    pub data: [u8; 8],
}

impl PingFrame {
    pub fn new(data: [u8; 8]) -> Self {
        PingFrame { ack: false, data }
    }

    pub fn ack(data: [u8; 8]) -> Self {
        PingFrame { ack: true, data }
    }
}

/// GOAWAY frame (RFC 7540 Section 6.8)
#[derive(Debug, Clone)]
pub struct GoawayFrame {
    pub last_stream_id: StreamId,
    pub error_code: ErrorCode,
    pub debug_data: Bytes,
}

impl GoawayFrame {
    pub fn new(last_stream_id: StreamId, error_code: ErrorCode, debug_data: Bytes) -> Self {
        GoawayFrame {
            last_stream_id,
            error_code,
            debug_data,
        }
    }
}

/// WINDOW_UPDATE frame (RFC 7540 Section 6.9)
#[derive(Debug, Clone, Copy)]
pub struct WindowUpdateFrame {
    /// Stream ID (0 for connection-level)
    pub stream_id: StreamId,
    pub size_increment: u32,
}

impl WindowUpdateFrame {
    pub fn new(stream_id: StreamId, size_increment: u32) -> Self {
        WindowUpdateFrame {
            stream_id,
            size_increment,
        }
    }
}
