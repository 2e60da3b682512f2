//! Client configuration
//!
//! Everything security-relevant (offered protocols, certificate checks, TLS
//! versions) is fixed when the client is built. Per-request knobs live in
//! [`RequestOptions`].

use crate::error::{Error, Result};
use crate::http::tls::{TlsConfig, TlsVersion};
use crate::http::Method;
use std::path::PathBuf;
use std::time::Duration;

/// Default protocols offered during the TLS handshake, in preference order
pub const DEFAULT_ALPN: &[&str] = &["h2", "http/1.1"];

/// Default TCP connect + TLS handshake deadline
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default per-request read/write deadline
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// How server certificates are checked
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CertVerification {
    /// Accept any certificate (test harness use)
    #[default]
    TrustAll,
    /// Verify the chain against the PEM bundle at this path and check the
    /// host name
    CaFile(PathBuf),
}

/// Client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    alpn_protocols: Vec<String>,
    verification: CertVerification,
    connect_timeout: Duration,
    request_timeout: Option<Duration>,
    tls_versions: Option<(TlsVersion, TlsVersion)>,
    user_agent: String,
}

impl ClientConfig {
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }

    pub fn alpn_protocols(&self) -> &[String] {
        &self.alpn_protocols
    }

    pub fn verification(&self) -> &CertVerification {
        &self.verification
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// Build the TLS client context for this configuration
    pub(crate) fn tls_config(&self) -> Result<TlsConfig> {
        let mut builder = TlsConfig::client().alpn(self.alpn_protocols.as_slice());

        if let Some((min, max)) = self.tls_versions {
            builder = builder.version_range(min, max);
        }
        builder = match &self.verification {
            CertVerification::TrustAll => builder.verify_peer(false),
            CertVerification::CaFile(path) => builder.ca_file(path.clone()),
        };

        builder.build().map_err(|e| Error::Config(e.to_string()))
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            alpn_protocols: DEFAULT_ALPN.iter().map(|p| p.to_string()).collect(),
            verification: CertVerification::TrustAll,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            request_timeout: Some(DEFAULT_REQUEST_TIMEOUT),
            tls_versions: None,
            user_agent: concat!("alpnmux/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Builder for [`ClientConfig`]
#[derive(Debug, Clone, Default)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    /// Protocols to offer, in preference order
    pub fn alpn_protocols<S: AsRef<str>>(mut self, protocols: &[S]) -> Self {
        self.config.alpn_protocols = protocols.iter().map(|p| p.as_ref().to_string()).collect();
        self
    }

    pub fn verification(mut self, verification: CertVerification) -> Self {
        self.config.verification = verification;
        self
    }

    /// Shorthand for `verification(CertVerification::CaFile(path))`
    pub fn ca_file(self, path: impl Into<PathBuf>) -> Self {
        self.verification(CertVerification::CaFile(path.into()))
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Default deadline for each read and write of a request; `None` waits
    /// forever
    pub fn request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    pub fn tls_version_range(mut self, min: TlsVersion, max: TlsVersion) -> Self {
        self.config.tls_versions = Some((min, max));
        self
    }

    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.config.user_agent = agent.into();
        self
    }

    pub fn build(self) -> Result<ClientConfig> {
        let config = self.config;

        if config.alpn_protocols.is_empty() {
            return Err(Error::Config("at least one ALPN protocol is required".to_string()));
        }
        if let Some(bad) = config
            .alpn_protocols
            .iter()
            .find(|p| p.is_empty() || p.len() > 255)
        {
            return Err(Error::Config(format!("invalid ALPN protocol name {:?}", bad)));
        }
        if config.connect_timeout.is_zero() {
            return Err(Error::Config("connect timeout must be non-zero".to_string()));
        }
        if let Some((min, max)) = config.tls_versions {
            if min > max {
                return Err(Error::Config(format!(
                    "TLS version range is empty: {:?} > {:?}",
                    min, max
                )));
            }
        }

        Ok(config)
    }
}

/// Per-request options
#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub method: Method,
    /// Extra headers, sent in order
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    /// Keep the connection in the cache for later requests
    pub reuse_connection: bool,
    /// Open a new connection even if a live one is cached
    pub force_fresh: bool,
    /// Overrides the client's request timeout
    pub timeout: Option<Duration>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        RequestOptions {
            method: Method::Get,
            headers: Vec::new(),
            body: Vec::new(),
            reuse_connection: true,
            force_fresh: false,
            timeout: None,
        }
    }
}

impl RequestOptions {
    pub fn new() -> Self {
        RequestOptions::default()
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn reuse_connection(mut self, reuse: bool) -> Self {
        self.reuse_connection = reuse;
        self
    }

    pub fn force_fresh(mut self, fresh: bool) -> Self {
        self.force_fresh = fresh;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::builder().build().unwrap();
        assert_eq!(config.alpn_protocols(), &["h2", "http/1.1"]);
        assert_eq!(config.verification(), &CertVerification::TrustAll);
        assert_eq!(config.connect_timeout(), Duration::from_secs(10));
        assert_eq!(config.request_timeout(), Some(Duration::from_secs(10)));
        assert!(config.user_agent().starts_with("alpnmux/"));

        let options = RequestOptions::default();
        assert_eq!(options.method, Method::Get);
        assert!(options.reuse_connection);
        assert!(!options.force_fresh);
    }

    #[test]
    fn test_validation() {
        let empty: &[&str] = &[];
        assert!(matches!(
            ClientConfig::builder().alpn_protocols(empty).build(),
            Err(Error::Config(_))
        ));
        assert!(ClientConfig::builder().alpn_protocols(&[""]).build().is_err());
        assert!(ClientConfig::builder()
            .connect_timeout(Duration::ZERO)
            .build()
            .is_err());
        assert!(ClientConfig::builder()
            .tls_version_range(TlsVersion::Tls13, TlsVersion::Tls12)
            .build()
            .is_err());
    }

    #[test]
    fn test_tls_config_carries_alpn() {
        let config = ClientConfig::builder()
            .alpn_protocols(&["http/1.1"])
            .build()
            .unwrap();
        let tls = config.tls_config().unwrap();
        assert_eq!(tls.alpn_protocols(), &["http/1.1"]);
        assert!(!tls.verifies_peer());
    }

    #[test]
    fn test_missing_ca_file_is_config_error() {
        let config = ClientConfig::builder()
            .ca_file("/nonexistent/ca.pem")
            .build()
            .unwrap();
        assert!(matches!(config.tls_config(), Err(Error::Config(_))));
    }
}
