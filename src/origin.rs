//! URL handling
//!
//! Requests are keyed by [`Origin`]: the host and port a TLS connection is
//! made to. Only `https` URLs are accepted.

use crate::error::{Error, Result};
use crate::http::DEFAULT_HTTPS_PORT;
use std::fmt;
use url::{Host, Url};

/// Connection cache key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Origin {
    /// Host name or IP literal, without IPv6 brackets
    host: String,
    port: u16,
}

impl Origin {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Origin {
            host: host.into(),
            port,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Value for `Host` / `:authority`; the port is omitted when it is 443
    pub fn authority(&self) -> String {
        let host = self.bracketed_host();
        if self.port == DEFAULT_HTTPS_PORT {
            host
        } else {
            format!("{}:{}", host, self.port)
        }
    }

    fn bracketed_host(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.bracketed_host(), self.port)
    }
}

/// A parsed request URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub origin: Origin,
    /// Path plus query string, never empty
    pub path: String,
}

impl Target {
    /// Parse an `https://` URL
    pub fn parse(input: &str) -> Result<Self> {
        let url = Url::parse(input).map_err(|e| Error::invalid_url(input, e.to_string()))?;

        if url.scheme() != "https" {
            return Err(Error::invalid_url(
                input,
                format!("unsupported scheme {:?}, only https is supported", url.scheme()),
            ));
        }

        let host = match url.host() {
            Some(Host::Domain(name)) => name.to_string(),
            Some(Host::Ipv4(addr)) => addr.to_string(),
            Some(Host::Ipv6(addr)) => addr.to_string(),
            None => return Err(Error::invalid_url(input, "missing host")),
        };
        let port = url.port().unwrap_or(DEFAULT_HTTPS_PORT);

        let mut path = url.path().to_string();
        if path.is_empty() {
            path.push('/');
        }
        if let Some(query) = url.query() {
            path.push('?');
            path.push_str(query);
        }

        Ok(Target {
            origin: Origin::new(host, port),
            path,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_default_port() {
        let target = Target::parse("https://Example.com/test").unwrap();
        assert_eq!(target.origin, Origin::new("example.com", 443));
        assert_eq!(target.origin.to_string(), "example.com:443");
        assert_eq!(target.origin.authority(), "example.com");
        assert_eq!(target.path, "/test");
    }

    #[test]
    fn test_parse_port_and_query() {
        let target = Target::parse("https://127.0.0.1:8443/a/b?x=1&y=2").unwrap();
        assert_eq!(target.origin.host(), "127.0.0.1");
        assert_eq!(target.origin.port(), 8443);
        assert_eq!(target.origin.authority(), "127.0.0.1:8443");
        assert_eq!(target.path, "/a/b?x=1&y=2");

        assert_eq!(Target::parse("https://localhost").unwrap().path, "/");
    }

    #[test]
    fn test_parse_ipv6() {
        let target = Target::parse("https://[::1]:9000/").unwrap();
        assert_eq!(target.origin.host(), "::1");
        assert_eq!(target.origin.to_string(), "[::1]:9000");
    }

    #[test]
    fn test_rejects_non_https() {
        assert!(matches!(
            Target::parse("http://example.com/"),
            Err(Error::InvalidUrl { .. })
        ));
        assert!(Target::parse("not a url").is_err());
    }
}
