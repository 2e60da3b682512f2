//! TLS configuration
//!
//! Client settings are collected by a plain builder and turned into an
//! OpenSSL context only in `build()`, so every OpenSSL failure surfaces as a
//! `TlsError` instead of a panic. The ALPN list and the certificate
//! verification mode are fixed once the context is built.

use openssl::ssl::{AlpnError, SslContext, SslContextBuilder, SslMethod, SslVerifyMode, SslVersion};
use std::path::PathBuf;

/// TLS version
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TlsVersion {
    /// TLS 1.2
    Tls12,
    /// TLS 1.3
    Tls13,
}

impl TlsVersion {
    /// Parse TLS version from string (case-insensitive)
    pub fn from_str(s: &str) -> Result<Self, TlsError> {
        match s.to_uppercase().as_str() {
            "TLSV1.2" | "TLS1.2" => Ok(TlsVersion::Tls12),
            "TLSV1.3" | "TLS1.3" => Ok(TlsVersion::Tls13),
            _ => Err(TlsError::InvalidVersion(s.to_string())),
        }
    }

    /// Get OpenSSL protocol version constant
    pub fn to_openssl_version(&self) -> SslVersion {
        match self {
            TlsVersion::Tls12 => SslVersion::TLS1_2,
            TlsVersion::Tls13 => SslVersion::TLS1_3,
        }
    }
}

/// TLS errors
#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error("OpenSSL error: {0}")]
    OpenSsl(#[from] openssl::error::ErrorStack),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TLS version: {0}")]
    InvalidVersion(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Certificate error: {0}")]
    Certificate(String),

    #[error("Handshake failed: {0}")]
    HandshakeFailed(String),
}

/// Encode protocol names in ALPN wire format (length-prefixed)
pub fn encode_alpn(protocols: &[String]) -> Result<Vec<u8>, TlsError> {
    let mut alpn_bytes = Vec::new();
    for proto in protocols {
        if proto.is_empty() || proto.len() > 255 {
            return Err(TlsError::InvalidConfig(format!(
                "ALPN protocol name must be 1..=255 bytes: {:?}",
                proto
            )));
        }
        alpn_bytes.push(proto.len() as u8);
        alpn_bytes.extend_from_slice(proto.as_bytes());
    }
    Ok(alpn_bytes)
}

/// TLS configuration (immutable after building)
#[derive(Clone)]
pub struct TlsConfig {
    pub(crate) ctx: SslContext,
    pub(crate) is_server: bool,
    pub(crate) verify_peer: bool,
    pub(crate) alpn: Vec<String>,
}

impl TlsConfig {
    /// Create a new client configuration builder
    pub fn client() -> ClientConfigBuilder {
        ClientConfigBuilder::new()
    }

    /// Create a new server configuration builder
    pub fn server() -> ServerConfigBuilder {
        ServerConfigBuilder::new()
    }

    /// Protocols offered (client) or accepted (server), in preference order
    pub fn alpn_protocols(&self) -> &[String] {
        &self.alpn
    }

    /// Whether the peer certificate is verified
    pub fn verifies_peer(&self) -> bool {
        self.verify_peer
    }

    /// Connect to a server with TLS (client-side)
    pub fn connect(
        &self,
        stream: std::net::TcpStream,
        servername: Option<&str>,
    ) -> Result<super::TlsTransport, TlsError> {
        if self.is_server {
            return Err(TlsError::InvalidConfig(
                "Cannot use server config for client connection".to_string(),
            ));
        }
        super::TlsTransport::connect(stream, self, servername)
    }

    /// Accept a client connection with TLS (server-side)
    pub fn accept(&self, stream: std::net::TcpStream) -> Result<super::TlsTransport, TlsError> {
        if !self.is_server {
            return Err(TlsError::InvalidConfig(
                "Cannot use client config for server accept".to_string(),
            ));
        }
        super::TlsTransport::accept(stream, self)
    }
}

/// Client configuration builder
#[derive(Debug, Clone)]
pub struct ClientConfigBuilder {
    alpn: Vec<String>,
    verify_peer: bool,
    ca_file: Option<PathBuf>,
    min_version: Option<TlsVersion>,
    max_version: Option<TlsVersion>,
}

impl ClientConfigBuilder {
    fn new() -> Self {
        ClientConfigBuilder {
            alpn: Vec::new(),
            verify_peer: false,
            ca_file: None,
            min_version: None,
            max_version: None,
        }
    }

    /// Set TLS version (both min and max)
    pub fn version(self, version: TlsVersion) -> Self {
        self.version_range(version, version)
    }

    /// Set TLS version range
    pub fn version_range(mut self, min: TlsVersion, max: TlsVersion) -> Self {
        self.min_version = Some(min);
        self.max_version = Some(max);
        self
    }

    /// Set ALPN protocols in preference order
    pub fn alpn<S: AsRef<str>>(mut self, protocols: &[S]) -> Self {
        self.alpn = protocols.iter().map(|p| p.as_ref().to_string()).collect();
        self
    }

    /// Enable/disable peer certificate and hostname verification
    pub fn verify_peer(mut self, verify: bool) -> Self {
        self.verify_peer = verify;
        self
    }

    /// Trust anchors for verification (implies `verify_peer(true)`)
    pub fn ca_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.ca_file = Some(path.into());
        self.verify_peer = true;
        self
    }

    /// Build the TLS configuration
    pub fn build(self) -> Result<TlsConfig, TlsError> {
        if self.alpn.is_empty() {
            return Err(TlsError::InvalidConfig(
                "at least one ALPN protocol must be offered".to_string(),
            ));
        }

        let mut ctx_builder = SslContextBuilder::new(SslMethod::tls_client())?;

        if let Some(min) = self.min_version {
            ctx_builder.set_min_proto_version(Some(min.to_openssl_version()))?;
        }
        if let Some(max) = self.max_version {
            ctx_builder.set_max_proto_version(Some(max.to_openssl_version()))?;
        }

        ctx_builder.set_alpn_protos(&encode_alpn(&self.alpn)?)?;

        if self.verify_peer {
            match &self.ca_file {
                Some(path) => ctx_builder.set_ca_file(path).map_err(|e| {
                    TlsError::Certificate(format!("Failed to load CA file {}: {}", path.display(), e))
                })?,
                None => ctx_builder.set_default_verify_paths()?,
            }
            ctx_builder.set_verify(SslVerifyMode::PEER);
        } else {
            ctx_builder.set_verify(SslVerifyMode::NONE);
        }

        Ok(TlsConfig {
            ctx: ctx_builder.build(),
            is_server: false,
            verify_peer: self.verify_peer,
            alpn: self.alpn,
        })
    }
}

/// Server configuration builder
///
/// Used by test fixtures that need a TLS peer with a controllable ALPN
/// choice.
pub struct ServerConfigBuilder {
    alpn: Vec<String>,
    min_version: Option<TlsVersion>,
    max_version: Option<TlsVersion>,
}

impl ServerConfigBuilder {
    fn new() -> Self {
        ServerConfigBuilder {
            alpn: Vec::new(),
            min_version: None,
            max_version: None,
        }
    }

    /// Set TLS version (both min and max)
    pub fn version(mut self, version: TlsVersion) -> Self {
        self.min_version = Some(version);
        self.max_version = Some(version);
        self
    }

    /// Protocols the server is willing to select
    ///
    /// The first client-offered protocol found in this list wins. An empty
    /// list disables ALPN on the server, so no protocol is negotiated.
    pub fn alpn<S: AsRef<str>>(mut self, protocols: &[S]) -> Self {
        self.alpn = protocols.iter().map(|p| p.as_ref().to_string()).collect();
        self
    }

    /// Build the TLS configuration with the built-in certificate
    pub fn build(self) -> Result<TlsConfig, TlsError> {
        use openssl::pkey::PKey;
        use openssl::x509::X509;

        let mut ctx_builder = SslContextBuilder::new(SslMethod::tls_server())?;

        if let Some(min) = self.min_version {
            ctx_builder.set_min_proto_version(Some(min.to_openssl_version()))?;
        }
        if let Some(max) = self.max_version {
            ctx_builder.set_max_proto_version(Some(max.to_openssl_version()))?;
        }

        let cert_pem = super::builtin_cert::BUILTIN_CERT.as_bytes();
        let cert = X509::from_pem(cert_pem)
            .map_err(|e| TlsError::Certificate(format!("Failed to load built-in certificate: {}", e)))?;
        ctx_builder.set_certificate(&cert)?;
        let key = PKey::private_key_from_pem(cert_pem)
            .map_err(|e| TlsError::Certificate(format!("Failed to load built-in private key: {}", e)))?;
        ctx_builder.set_private_key(&key)?;

        if !self.alpn.is_empty() {
            let accepted: Vec<Vec<u8>> = self.alpn.iter().map(|p| p.as_bytes().to_vec()).collect();

            ctx_builder.set_alpn_select_callback(move |_ssl, client_protos| {
                let mut pos = 0;
                while pos < client_protos.len() {
                    let len = client_protos[pos] as usize;
                    pos += 1;
                    if pos + len > client_protos.len() {
                        break;
                    }
                    let offered = &client_protos[pos..pos + len];
                    if accepted.iter().any(|p| p.as_slice() == offered) {
                        return Ok(offered);
                    }
                    pos += len;
                }

                // No overlap: complete the handshake without ALPN
                Err(AlpnError::NOACK)
            });
        }

        Ok(TlsConfig {
            ctx: ctx_builder.build(),
            is_server: true,
            verify_peer: false,
            alpn: self.alpn,
        })
    }
}
