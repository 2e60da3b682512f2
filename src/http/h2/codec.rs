//! HTTP/2 frame encoding and decoding
//!
//! Encoders produce complete frames (9-byte header plus payload) ready to be
//! written. `read_frame` pulls exactly one frame off a session.

use super::error::{Error, Result};
use super::frames::*;
use super::stream::StreamId;
use crate::http::{HttpSession, SessionOps};
use bytes::{BufMut, Bytes, BytesMut};

/// HTTP/2 frame header size (9 bytes)
pub const FRAME_HEADER_SIZE: usize = 9;

/// Frame codec for encoding/decoding HTTP/2 frames
pub struct FrameCodec;

impl FrameCodec {
    /// Encode a frame header
    pub fn encode_header(
        frame_type: FrameType,
        flags: FrameFlags,
        stream_id: StreamId,
        length: usize,
    ) -> [u8; FRAME_HEADER_SIZE] {
        let mut header = [0u8; FRAME_HEADER_SIZE];

        // Length (24 bits, big-endian)
        header[0] = ((length >> 16) & 0xFF) as u8;
        header[1] = ((length >> 8) & 0xFF) as u8;
        header[2] = (length & 0xFF) as u8;

        header[3] = frame_type.as_u8();
        header[4] = flags.as_u8();

        // Stream ID (31 bits, reserved bit is 0)
        header[5..9].copy_from_slice(&(stream_id & 0x7FFF_FFFF).to_be_bytes());

        header
    }

    /// Decode a frame header into (type byte, flags, stream id, length)
    pub fn decode_header(bytes: &[u8; FRAME_HEADER_SIZE]) -> (u8, FrameFlags, StreamId, usize) {
        let length = ((bytes[0] as usize) << 16) | ((bytes[1] as usize) << 8) | (bytes[2] as usize);
        let stream_id = u32::from_be_bytes([bytes[5] & 0x7F, bytes[6], bytes[7], bytes[8]]);

        (bytes[3], FrameFlags::from_u8(bytes[4]), stream_id, length)
    }

    fn frame(frame_type: FrameType, flags: FrameFlags, stream_id: StreamId, payload: &[u8]) -> Bytes {
        let mut buf = BytesMut::with_capacity(FRAME_HEADER_SIZE + payload.len());
        buf.put_slice(&Self::encode_header(frame_type, flags, stream_id, payload.len()));
        buf.put_slice(payload);
        buf.freeze()
    }

    /// Encode a DATA frame
    pub fn encode_data_frame(frame: &DataFrame) -> Bytes {
        let mut flags = FrameFlags::empty();
        if frame.end_stream {
            flags.set(FrameFlags::END_STREAM);
        }
        Self::frame(FrameType::Data, flags, frame.stream_id, &frame.data)
    }

    /// Encode a HEADERS frame
    pub fn encode_headers_frame(frame: &HeadersFrame) -> Bytes {
        let mut flags = FrameFlags::empty();
        if frame.end_stream {
            flags.set(FrameFlags::END_STREAM);
        }
        if frame.end_headers {
            flags.set(FrameFlags::END_HEADERS);
        }
        Self::frame(FrameType::Headers, flags, frame.stream_id, &frame.header_block)
    }

    /// Encode a CONTINUATION frame
    pub fn encode_continuation_frame(frame: &ContinuationFrame) -> Bytes {
        let mut flags = FrameFlags::empty();
        if frame.end_headers {
            flags.set(FrameFlags::END_HEADERS);
        }
        Self::frame(FrameType::Continuation, flags, frame.stream_id, &frame.header_block)
    }

    /// Encode a SETTINGS frame (stream 0, empty payload when ACK)
    pub fn encode_settings_frame(frame: &SettingsFrame) -> Bytes {
        let mut payload = BytesMut::new();
        let flags = if frame.ack {
            FrameFlags::from_u8(FrameFlags::ACK)
        } else {
            frame.settings.encode_into(&mut payload);
            FrameFlags::empty()
        };
        Self::frame(FrameType::Settings, flags, 0, &payload)
    }

    /// Encode a PING frame
    pub fn encode_ping_frame(frame: &PingFrame) -> Bytes {
        let flags = if frame.ack {
            FrameFlags::from_u8(FrameFlags::ACK)
        } else {
            FrameFlags::empty()
        };
        Self::frame(FrameType::Ping, flags, 0, &frame.data)
    }

    /// Encode a GOAWAY frame
    pub fn encode_goaway_frame(frame: &GoawayFrame) -> Bytes {
        let mut payload = BytesMut::with_capacity(8 + frame.debug_data.len());
        payload.put_u32(frame.last_stream_id & 0x7FFF_FFFF);
        payload.put_u32(frame.error_code.as_u32());
        payload.put_slice(&frame.debug_data);
        Self::frame(FrameType::Goaway, FrameFlags::empty(), 0, &payload)
    }

    /// Encode a WINDOW_UPDATE frame
    pub fn encode_window_update_frame(frame: &WindowUpdateFrame) -> Bytes {
        let increment = (frame.size_increment & 0x7FFF_FFFF).to_be_bytes();
        Self::frame(FrameType::WindowUpdate, FrameFlags::empty(), frame.stream_id, &increment)
    }

    /// Encode a RST_STREAM frame
    pub fn encode_rst_stream_frame(frame: &RstStreamFrame) -> Bytes {
        let code = frame.error_code.as_u32().to_be_bytes();
        Self::frame(FrameType::RstStream, FrameFlags::empty(), frame.stream_id, &code)
    }

    /// Read one frame, rejecting payloads above `max_frame_size`
    pub fn read_frame<S: SessionOps>(session: &mut HttpSession<S>, max_frame_size: u32) -> Result<Frame> {
        let mut header = [0u8; FRAME_HEADER_SIZE];
        session.read_exact(&mut header)?;

        let (kind, flags, stream_id, payload_len) = Self::decode_header(&header);

        if payload_len > max_frame_size as usize {
            return Err(Error::FrameSize(format!(
                "Frame payload too large: {} > {}",
                payload_len, max_frame_size
            )));
        }

        let mut payload = vec![0u8; payload_len];
        session.read_exact(&mut payload)?;

        Ok(Frame::new(kind, flags, stream_id, Bytes::from(payload)))
    }
}
