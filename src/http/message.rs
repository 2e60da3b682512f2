//! HTTP message types
//!
//! Core request/response vocabulary shared by the HTTP/1.1 and HTTP/2 paths.

use super::{Error, Headers, Result};
use std::fmt;

/// HTTP methods
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Method {
    #[default]
    Get,
    Head,
    Post,
    Put,
    Delete,
    Options,
    Patch,
}

impl Method {
    /// Parse method from string
    pub fn from_str(s: &str) -> Result<Self> {
        match s {
            "GET" => Ok(Method::Get),
            "HEAD" => Ok(Method::Head),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "DELETE" => Ok(Method::Delete),
            "OPTIONS" => Ok(Method::Options),
            "PATCH" => Ok(Method::Patch),
            _ => Err(Error::InvalidMethod(s.to_string())),
        }
    }

    /// Convert method to string
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Options => "OPTIONS",
            Method::Patch => "PATCH",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// HTTP/1.x version found on a status line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Version {
    Http10,
    #[default]
    Http11,
}

impl Version {
    /// Parse version from string
    pub fn from_str(s: &str) -> Result<Self> {
        match s {
            "HTTP/1.0" => Ok(Version::Http10),
            "HTTP/1.1" => Ok(Version::Http11),
            _ => Err(Error::InvalidVersion(s.to_string())),
        }
    }

    /// Convert version to string
    pub fn as_str(&self) -> &'static str {
        match self {
            Version::Http10 => "HTTP/1.0",
            Version::Http11 => "HTTP/1.1",
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// HTTP status code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Status {
    code: u16,
}

impl Status {
    /// Create a new status code
    pub fn new(code: u16) -> Result<Self> {
        if (100..600).contains(&code) {
            Ok(Status { code })
        } else {
            Err(Error::InvalidStatus(code.to_string()))
        }
    }

    /// Parse a status code from its decimal text (`:status` or status line)
    pub fn parse(s: &str) -> Result<Self> {
        let code = s
            .trim()
            .parse::<u16>()
            .map_err(|_| Error::InvalidStatus(s.to_string()))?;
        Self::new(code)
    }

    /// Get the numeric status code
    pub fn code(&self) -> u16 {
        self.code
    }

    /// Get the standard reason phrase
    pub fn reason_phrase(&self) -> &'static str {
        match self.code {
            100 => "Continue",
            101 => "Switching Protocols",
            200 => "OK",
            201 => "Created",
            202 => "Accepted",
            204 => "No Content",
            206 => "Partial Content",
            301 => "Moved Permanently",
            302 => "Found",
            304 => "Not Modified",
            400 => "Bad Request",
            401 => "Unauthorized",
            403 => "Forbidden",
            404 => "Not Found",
            405 => "Method Not Allowed",
            408 => "Request Timeout",
            421 => "Misdirected Request",
            429 => "Too Many Requests",
            500 => "Internal Server Error",
            502 => "Bad Gateway",
            503 => "Service Unavailable",
            504 => "Gateway Timeout",
            _ => "Unknown",
        }
    }

    /// 1xx
    pub fn is_informational(&self) -> bool {
        (100..200).contains(&self.code)
    }

    /// Responses that never carry a body regardless of framing headers
    pub fn forbids_body(&self) -> bool {
        self.is_informational() || self.code == 204 || self.code == 304
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code, self.reason_phrase())
    }
}

/// A fully received HTTP/1.x response
#[derive(Debug, Clone)]
pub struct HttpResponse {
    version: Version,
    status: Status,
    reason: String,
    headers: Headers,
    body: Vec<u8>,
    /// Body was delimited by the peer closing the connection
    close_delimited: bool,
    /// Bytes the peer sent past the end of this response
    surplus: usize,
}

impl HttpResponse {
    pub(crate) fn new(version: Version, status: Status, reason: String, headers: Headers) -> Self {
        HttpResponse {
            version,
            status,
            reason,
            headers,
            body: Vec::new(),
            close_delimited: false,
            surplus: 0,
        }
    }

    /// Get the HTTP version from the status line
    pub fn version(&self) -> Version {
        self.version
    }

    /// Get the status
    pub fn status(&self) -> Status {
        self.status
    }

    /// Get the reason phrase sent by the server
    pub fn reason(&self) -> &str {
        &self.reason
    }

    /// Get the headers
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Get the body
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub(crate) fn set_body(&mut self, body: Vec<u8>, close_delimited: bool) {
        self.body = body;
        self.close_delimited = close_delimited;
    }

    /// Number of bytes received after the end of this response
    pub fn surplus(&self) -> usize {
        self.surplus
    }

    pub(crate) fn set_surplus(&mut self, surplus: usize) {
        self.surplus = surplus;
    }

    /// Consume the response, returning headers and body
    pub fn into_parts(self) -> (Status, Headers, Vec<u8>) {
        (self.status, self.headers, self.body)
    }

    /// Whether the transport may carry another request after this response
    ///
    /// Stray bytes after the response leave the stream position unknown, so
    /// they rule reuse out as well.
    pub fn keeps_alive(&self) -> bool {
        if self.close_delimited || self.surplus > 0 || self.headers.has_token("connection", "close") {
            return false;
        }
        match self.version {
            Version::Http11 => true,
            Version::Http10 => self.headers.has_token("connection", "keep-alive"),
        }
    }
}
