//! HTTP/1.1 response parsing
//!
//! [`ResponseParser`] is fed raw bytes as they arrive and yields a response
//! once the head and the whole body have been seen. Body framing follows the
//! usual precedence: bodiless statuses and HEAD first, then
//! `Transfer-Encoding: chunked`, then `Content-Length`, and finally
//! read-until-close.

use super::chunked::{find_crlf, ChunkedDecoder};
use super::{Error, Headers, HttpResponse, Result, Status, Version, MAX_HEADERS};

/// Parse HTTP response status line
///
/// Format: VERSION STATUS REASON\r\n
/// Example: HTTP/1.1 200 OK\r\n
pub fn parse_status_line(line: &str) -> Result<(Version, Status, String)> {
    let parts: Vec<&str> = line.splitn(3, ' ').collect();

    if parts.len() < 2 {
        return Err(Error::Parse(format!(
            "Invalid status line: expected at least 2 parts, got {}",
            parts.len()
        )));
    }

    let version = Version::from_str(parts[0])?;
    let status = Status::parse(parts[1])
        .map_err(|_| Error::Parse(format!("Invalid status code: {}", parts[1])))?;
    let reason = if parts.len() == 3 {
        parts[2].to_string()
    } else {
        status.reason_phrase().to_string()
    };

    Ok((version, status, reason))
}

/// How the body of the response being parsed is delimited
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    Empty,
    Length(usize),
    Chunked,
    UntilClose,
}

#[derive(Debug)]
enum ParserState {
    StatusLine,
    Headers,
    Body(BodyKind),
    Complete,
}

/// HTTP response parser
#[derive(Debug)]
pub struct ResponseParser {
    state: ParserState,
    buffer: Vec<u8>,
    head_request: bool,
    response: Option<HttpResponse>,
    headers: Headers,
    head: Option<(Version, Status, String)>,
    body: Vec<u8>,
    chunked: ChunkedDecoder,
}

impl ResponseParser {
    /// Create a new response parser
    pub fn new() -> Self {
        ResponseParser {
            state: ParserState::StatusLine,
            buffer: Vec::new(),
            head_request: false,
            response: None,
            headers: Headers::new(),
            head: None,
            body: Vec::new(),
            chunked: ChunkedDecoder::new(),
        }
    }

    /// Create a parser for the response to a HEAD request (never has a body)
    pub fn for_head_request() -> Self {
        ResponseParser {
            head_request: true,
            ..Self::new()
        }
    }

    /// Feed data to the parser
    ///
    /// Returns Ok(Some(response)) when a complete response is parsed,
    /// Ok(None) if more data is needed, or Err on parse error.
    pub fn parse(&mut self, data: &[u8]) -> Result<Option<HttpResponse>> {
        self.buffer.extend_from_slice(data);

        loop {
            let progressed = match self.state {
                ParserState::StatusLine => self.parse_status_line()?,
                ParserState::Headers => self.parse_headers()?,
                ParserState::Body(kind) => self.parse_body(kind)?,
                ParserState::Complete => return Ok(self.response.take()),
            };
            if !progressed {
                return Ok(None);
            }
        }
    }

    /// Signal that the peer closed the connection
    ///
    /// Completes a read-until-close body; any other unfinished message is an
    /// error.
    pub fn finish(&mut self) -> Result<HttpResponse> {
        match self.state {
            ParserState::Body(BodyKind::UntilClose) => {
                self.body.append(&mut self.buffer);
                self.complete(true);
                self.response.take().ok_or(Error::Incomplete)
            }
            ParserState::Complete => self.response.take().ok_or(Error::Incomplete),
            _ => Err(Error::ConnectionClosed),
        }
    }

    /// Bytes received beyond the end of the parsed response
    pub fn leftover(&self) -> &[u8] {
        &self.buffer
    }

    fn parse_status_line(&mut self) -> Result<bool> {
        let Some(crlf_pos) = find_crlf(&self.buffer) else {
            return Ok(false);
        };
        let line = String::from_utf8_lossy(&self.buffer[..crlf_pos]).to_string();
        self.buffer.drain(..crlf_pos + 2);

        self.head = Some(parse_status_line(&line)?);
        self.state = ParserState::Headers;
        Ok(true)
    }

    fn parse_headers(&mut self) -> Result<bool> {
        let Some(crlf_pos) = find_crlf(&self.buffer) else {
            return Ok(false);
        };

        if crlf_pos > 0 {
            let line = String::from_utf8_lossy(&self.buffer[..crlf_pos]).to_string();
            self.buffer.drain(..crlf_pos + 2);
            let (name, value) = Headers::parse_header_line(&line)?;
            if self.headers.len() >= MAX_HEADERS {
                return Err(Error::TooManyHeaders(MAX_HEADERS));
            }
            self.headers.insert(name, value);
            return Ok(true);
        }

        // Empty line marks end of headers
        self.buffer.drain(..2);

        let status = self.head.as_ref().map(|(_, s, _)| *s).ok_or(Error::Incomplete)?;
        if status.is_informational() {
            // Interim response; the final one follows on the same transport.
            self.head = None;
            self.headers = Headers::new();
            self.state = ParserState::StatusLine;
            return Ok(true);
        }

        self.state = ParserState::Body(self.body_kind(status)?);
        Ok(true)
    }

    fn body_kind(&self, status: Status) -> Result<BodyKind> {
        if self.head_request || status.forbids_body() {
            return Ok(BodyKind::Empty);
        }

        if self.headers.has_token("transfer-encoding", "chunked") {
            return Ok(BodyKind::Chunked);
        }

        if let Some(cl_str) = self.headers.get("content-length") {
            let content_length = cl_str
                .trim()
                .parse::<usize>()
                .map_err(|_| Error::Parse(format!("Invalid Content-Length: {}", cl_str)))?;
            return Ok(if content_length == 0 {
                BodyKind::Empty
            } else {
                BodyKind::Length(content_length)
            });
        }

        Ok(BodyKind::UntilClose)
    }

    fn parse_body(&mut self, kind: BodyKind) -> Result<bool> {
        match kind {
            BodyKind::Empty => {
                self.complete(false);
                Ok(true)
            }
            BodyKind::Length(len) => {
                let needed = len - self.body.len();
                let take = needed.min(self.buffer.len());
                self.body.extend(self.buffer.drain(..take));
                if self.body.len() == len {
                    self.complete(false);
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            BodyKind::Chunked => {
                let (consumed, done) = self.chunked.decode(&self.buffer, &mut self.body)?;
                self.buffer.drain(..consumed);
                if done {
                    self.complete(false);
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            BodyKind::UntilClose => {
                self.body.append(&mut self.buffer);
                Ok(false)
            }
        }
    }

    fn complete(&mut self, close_delimited: bool) {
        if let Some((version, status, reason)) = self.head.take() {
            let mut response =
                HttpResponse::new(version, status, reason, std::mem::take(&mut self.headers));
            response.set_body(std::mem::take(&mut self.body), close_delimited);
            self.response = Some(response);
        }
        self.state = ParserState::Complete;
    }
}

impl Default for ResponseParser {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_status_line() {
        let (version, status, reason) = parse_status_line("HTTP/1.1 200 OK").unwrap();
        assert_eq!(version, Version::Http11);
        assert_eq!(status.code(), 200);
        assert_eq!(reason, "OK");

        let (version, status, reason) = parse_status_line("HTTP/1.0 404").unwrap();
        assert_eq!(version, Version::Http10);
        assert_eq!(status.code(), 404);
        assert_eq!(reason, "Not Found");

        assert!(parse_status_line("garbage").is_err());
    }

    #[test]
    fn test_response_parser_content_length() {
        let mut parser = ResponseParser::new();

        let data = b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nHello";
        let resp = parser.parse(data).unwrap().unwrap();

        assert_eq!(resp.status().code(), 200);
        assert_eq!(resp.body(), b"Hello");
        assert_eq!(resp.headers().get("Content-Length"), Some("5"));
        assert!(resp.keeps_alive());
    }

    #[test]
    fn test_response_parser_incremental() {
        let mut parser = ResponseParser::new();

        assert!(parser.parse(b"HTTP/1.1 ").unwrap().is_none());
        assert!(parser.parse(b"200 OK\r\n").unwrap().is_none());
        assert!(parser.parse(b"Content-Type: text/plain\r\n").unwrap().is_none());
        assert!(parser.parse(b"Content-Length: 4\r\n\r\n").unwrap().is_none());
        assert!(parser.parse(b"Te").unwrap().is_none());
        let resp = parser.parse(b"st").unwrap().unwrap();

        assert_eq!(resp.body(), b"Test");
        assert_eq!(resp.headers().get("content-type"), Some("text/plain"));
    }

    #[test]
    fn test_response_parser_chunked() {
        let mut parser = ResponseParser::new();
        assert!(parser
            .parse(b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n5\r\nHel")
            .unwrap()
            .is_none());
        let resp = parser.parse(b"lo\r\n1\r\n!\r\n0\r\n\r\n").unwrap().unwrap();
        assert_eq!(resp.body(), b"Hello!");
    }

    #[test]
    fn test_response_parser_skips_interim() {
        let mut parser = ResponseParser::new();
        let resp = parser
            .parse(b"HTTP/1.1 100 Continue\r\n\r\nHTTP/1.1 201 Created\r\nContent-Length: 2\r\n\r\nok")
            .unwrap()
            .unwrap();
        assert_eq!(resp.status().code(), 201);
        assert_eq!(resp.body(), b"ok");
    }

    #[test]
    fn test_response_parser_no_content() {
        let mut parser = ResponseParser::new();
        let resp = parser
            .parse(b"HTTP/1.1 204 No Content\r\nContent-Length: 10\r\n\r\n")
            .unwrap()
            .unwrap();
        assert!(resp.body().is_empty());
    }

    #[test]
    fn test_response_parser_head_request() {
        let mut parser = ResponseParser::for_head_request();
        let resp = parser
            .parse(b"HTTP/1.1 200 OK\r\nContent-Length: 100\r\n\r\n")
            .unwrap()
            .unwrap();
        assert!(resp.body().is_empty());
        assert!(parser.leftover().is_empty());
    }

    #[test]
    fn test_response_parser_until_close() {
        let mut parser = ResponseParser::new();
        assert!(parser.parse(b"HTTP/1.1 200 OK\r\n\r\npart one, ").unwrap().is_none());
        assert!(parser.parse(b"part two").unwrap().is_none());
        let resp = parser.finish().unwrap();
        assert_eq!(resp.body(), b"part one, part two");
        assert!(!resp.keeps_alive());
    }

    #[test]
    fn test_premature_close_is_error() {
        let mut parser = ResponseParser::new();
        assert!(parser
            .parse(b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\nshort")
            .unwrap()
            .is_none());
        assert!(matches!(parser.finish(), Err(Error::ConnectionClosed)));
    }

    #[test]
    fn test_too_many_headers_is_error() {
        let mut raw = String::from("HTTP/1.1 200 OK\r\n");
        for i in 0..MAX_HEADERS + 2 {
            raw.push_str(&format!("X-H{}: v\r\n", i));
        }
        raw.push_str("Content-Length: 5\r\n\r\nhello");

        let mut parser = ResponseParser::new();
        assert!(matches!(
            parser.parse(raw.as_bytes()),
            Err(Error::TooManyHeaders(MAX_HEADERS))
        ));
    }

    #[test]
    fn test_headers_at_limit_keep_late_framing() {
        let mut raw = String::from("HTTP/1.1 200 OK\r\n");
        for i in 0..MAX_HEADERS - 1 {
            raw.push_str(&format!("X-H{}: v\r\n", i));
        }
        raw.push_str("Content-Length: 5\r\n\r\nhello");

        let mut parser = ResponseParser::new();
        let resp = parser.parse(raw.as_bytes()).unwrap().unwrap();
        assert_eq!(resp.body(), b"hello");
        assert_eq!(resp.headers().len(), MAX_HEADERS);
    }
}
