//! HTTP/1.1 request path
//!
//! One request/response exchange over a borrowed transport. The transport is
//! left open afterwards: `Connection: keep-alive` is always sent and closing
//! the socket is the connection cache's decision, not this module's.
//!
//! HTTP/1.1 cannot interleave exchanges on one socket. Nothing here locks;
//! callers serialize by holding `&mut` to the session for the whole call.

use super::{Headers, HttpResponse, HttpSession, Method, ResponseParser, Result, SessionOps, CRLF};

/// Read buffer size for response data
const READ_CHUNK: usize = 8192;

/// An HTTP/1.1 request ready to be written to a transport
#[derive(Debug, Clone)]
pub struct Http1Request {
    method: Method,
    path: String,
    headers: Headers,
    body: Vec<u8>,
}

impl Http1Request {
    /// Create a request with `Host` and `Connection: keep-alive` set
    pub fn new(method: Method, path: impl Into<String>, host: impl Into<String>) -> Self {
        let mut headers = Headers::new();
        headers.insert("Host", host);
        headers.insert("Connection", "keep-alive");

        Http1Request {
            method,
            path: path.into(),
            headers,
            body: Vec::new(),
        }
    }

    /// Add a header; `Host` and `Connection` replace the defaults
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        if name.eq_ignore_ascii_case("host") || name.eq_ignore_ascii_case("connection") {
            self.headers.set(name, value);
        } else {
            self.headers.insert(name, value);
        }
        self
    }

    /// Set the request body; `Content-Length` is derived from it
    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Request method
    pub fn method(&self) -> Method {
        self.method
    }

    /// Request target
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Request headers
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Serialize to wire format
    pub fn to_wire(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(256 + self.body.len());

        buf.extend_from_slice(self.method.as_str().as_bytes());
        buf.push(b' ');
        buf.extend_from_slice(self.path.as_bytes());
        buf.extend_from_slice(b" HTTP/1.1");
        buf.extend_from_slice(CRLF.as_bytes());

        for (name, value) in self.headers.iter() {
            if name == "content-length" {
                continue;
            }
            buf.extend_from_slice(name.as_bytes());
            buf.extend_from_slice(b": ");
            buf.extend_from_slice(value.as_bytes());
            buf.extend_from_slice(CRLF.as_bytes());
        }

        let needs_length = !self.body.is_empty()
            || matches!(self.method, Method::Post | Method::Put | Method::Patch);
        if needs_length {
            buf.extend_from_slice(format!("content-length: {}", self.body.len()).as_bytes());
            buf.extend_from_slice(CRLF.as_bytes());
        }

        buf.extend_from_slice(CRLF.as_bytes());
        buf.extend_from_slice(&self.body);

        buf
    }
}

/// Send one request and read the complete response
///
/// The body is fully drained before returning, whatever its framing.
pub fn exchange<S: SessionOps>(
    session: &mut HttpSession<S>,
    request: &Http1Request,
) -> Result<HttpResponse> {
    session.write_all(&request.to_wire())?;

    let mut parser = if request.method == Method::Head {
        ResponseParser::for_head_request()
    } else {
        ResponseParser::new()
    };

    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        let n = session.read(&mut buf)?;
        if n == 0 {
            return parser.finish();
        }

        if let Some(mut response) = parser.parse(&buf[..n])? {
            let surplus = parser.leftover().len();
            if surplus > 0 {
                tracing::warn!(extra = surplus, "unsolicited bytes after HTTP/1.1 response");
                response.set_surplus(surplus);
            }
            return Ok(response);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::session::FdSessionOps;
    use crate::http::Error;
    use std::io::{Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::thread;

    fn read_head(stream: &mut TcpStream) -> String {
        let mut data = Vec::new();
        let mut byte = [0u8; 1];
        while !data.ends_with(b"\r\n\r\n") {
            if stream.read(&mut byte).unwrap() == 0 {
                break;
            }
            data.push(byte[0]);
        }
        String::from_utf8(data).unwrap()
    }

    #[test]
    fn test_request_wire_format() {
        let request = Http1Request::new(Method::Post, "/submit?x=1", "example.com")
            .header("X-Trace", "abc")
            .body("hi");
        let wire = String::from_utf8(request.to_wire()).unwrap();

        assert!(wire.starts_with("POST /submit?x=1 HTTP/1.1\r\n"));
        assert!(wire.contains("host: example.com\r\n"));
        assert!(wire.contains("connection: keep-alive\r\n"));
        assert!(wire.contains("x-trace: abc\r\n"));
        assert!(wire.ends_with("content-length: 2\r\n\r\nhi"));
    }

    #[test]
    fn test_host_header_override() {
        let request = Http1Request::new(Method::Get, "/", "a").header("Host", "b");
        assert_eq!(request.headers().get_all("host"), vec!["b"]);
    }

    #[test]
    fn test_sequential_exchanges_reuse_socket() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            for body in ["one", "two", "three"] {
                let head = read_head(&mut stream);
                assert!(head.contains("connection: keep-alive"));
                write!(stream, "HTTP/1.1 200 OK\r\nContent-Length: {}\r\n\r\n{}", body.len(), body)
                    .unwrap();
            }
        });

        let mut transport = FdSessionOps::new(TcpStream::connect(addr).unwrap());
        for expected in ["one", "two", "three"] {
            let mut session = HttpSession::new(&mut transport);
            let request = Http1Request::new(Method::Get, "/", "localhost");
            let response = exchange(&mut session, &request).unwrap();
            assert_eq!(response.body(), expected.as_bytes());
        }

        handle.join().unwrap();
    }

    #[test]
    fn test_chunked_response_is_drained() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            read_head(&mut stream);
            stream
                .write_all(b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n3\r\nabc\r\n")
                .unwrap();
            stream.flush().unwrap();
            thread::sleep(std::time::Duration::from_millis(50));
            stream.write_all(b"3\r\ndef\r\n0\r\n\r\n").unwrap();
        });

        let mut transport = FdSessionOps::new(TcpStream::connect(addr).unwrap());
        let mut session = HttpSession::new(&mut transport);
        let response = exchange(&mut session, &Http1Request::new(Method::Get, "/", "h")).unwrap();
        assert_eq!(response.body(), b"abcdef");

        handle.join().unwrap();
    }

    #[test]
    fn test_truncated_response_is_error() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            read_head(&mut stream);
            stream
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 50\r\n\r\nshort")
                .unwrap();
        });

        let mut transport = FdSessionOps::new(TcpStream::connect(addr).unwrap());
        let mut session = HttpSession::new(&mut transport);
        let result = exchange(&mut session, &Http1Request::new(Method::Get, "/", "h"));
        assert!(matches!(result, Err(Error::ConnectionClosed)));

        handle.join().unwrap();
    }

    #[test]
    fn test_stray_bytes_rule_out_reuse() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            read_head(&mut stream);
            stream
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nokHTTP/1.1 500 Oops\r\n")
                .unwrap();
        });

        let mut transport = FdSessionOps::new(TcpStream::connect(addr).unwrap());
        let mut session = HttpSession::new(&mut transport);
        let response = exchange(&mut session, &Http1Request::new(Method::Get, "/", "h")).unwrap();

        assert_eq!(response.body(), b"ok");
        assert!(response.surplus() > 0);
        assert!(!response.keeps_alive());

        handle.join().unwrap();
    }
}
