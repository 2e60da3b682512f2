//! Protocol-independent response

use crate::http::h2::H2Response;
use crate::http::tls::Alpn;
use crate::http::HttpResponse;
use std::collections::HashMap;
use std::fmt;

/// HTTP version a response was received with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpVersion {
    Http11,
    Http2,
}

impl HttpVersion {
    /// "1.1" or "2.0"
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpVersion::Http11 => "1.1",
            HttpVersion::Http2 => "2.0",
        }
    }
}

impl fmt::Display for HttpVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A complete response, normalized across HTTP/1.1 and HTTP/2
#[derive(Debug, Clone)]
pub struct RequestResult {
    pub status_code: u16,
    /// Lowercased names; a repeated header keeps its last value
    pub headers: HashMap<String, String>,
    pub body: String,
    pub http_version: HttpVersion,
    /// ALPN protocol of the transport the response arrived on
    pub alpn_protocol: Option<String>,
}

impl RequestResult {
    pub(crate) fn from_http1(response: HttpResponse, alpn: Option<&Alpn>) -> Self {
        let (status, headers, body) = response.into_parts();
        RequestResult {
            status_code: status.code(),
            headers: headers
                .iter()
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .collect(),
            body: String::from_utf8_lossy(&body).into_owned(),
            http_version: HttpVersion::Http11,
            alpn_protocol: alpn.map(|a| a.as_str().to_string()),
        }
    }

    pub(crate) fn from_h2(response: H2Response, alpn: Option<&Alpn>) -> Self {
        RequestResult {
            status_code: response.status,
            headers: response
                .headers
                .iter()
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .collect(),
            body: String::from_utf8_lossy(&response.body).into_owned(),
            http_version: HttpVersion::Http2,
            alpn_protocol: alpn.map(|a| a.as_str().to_string()),
        }
    }

    /// Header value by case-insensitive name
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// 2xx status
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::Headers;

    #[test]
    fn test_h2_result_last_wins() {
        let mut headers = Headers::new();
        headers.insert("x-dup", "first");
        headers.insert("x-dup", "second");
        headers.insert("content-type", "text/plain");

        let response = H2Response {
            stream_id: 1,
            status: 200,
            headers,
            body: b"Hello".to_vec(),
        };
        let result = RequestResult::from_h2(response, Some(&Alpn::H2));

        assert_eq!(result.status_code, 200);
        assert_eq!(result.http_version.to_string(), "2.0");
        assert_eq!(result.alpn_protocol.as_deref(), Some("h2"));
        assert_eq!(result.header("X-Dup"), Some("second"));
        assert_eq!(result.body, "Hello");
        assert!(result.is_success());
    }

    #[test]
    fn test_version_strings() {
        assert_eq!(HttpVersion::Http11.as_str(), "1.1");
        assert_eq!(HttpVersion::Http2.as_str(), "2.0");
    }
}
