//! TLS connection manager
//!
//! Resolves the origin, connects TCP with a deadline, and runs the TLS
//! handshake with the client's ALPN list. Failures at any step become
//! [`Error::Connection`]; nothing is cached by this module.

use crate::config::ClientConfig;
use crate::connection::CachedConnection;
use crate::error::{Error, Result};
use crate::http::tls::TlsConfig;
use crate::origin::Origin;
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

/// Opens new TLS transports
#[derive(Clone)]
pub struct Connector {
    tls: TlsConfig,
    connect_timeout: Duration,
}

impl Connector {
    pub fn new(tls: TlsConfig, connect_timeout: Duration) -> Self {
        Connector {
            tls,
            connect_timeout,
        }
    }

    /// Build the TLS context described by `config`
    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        Ok(Connector::new(config.tls_config()?, config.connect_timeout()))
    }

    /// Protocols offered in the handshake
    pub fn alpn_protocols(&self) -> &[String] {
        self.tls.alpn_protocols()
    }

    /// Open a connection to `origin` and read its negotiated protocol
    pub fn connect(&self, origin: &Origin) -> Result<CachedConnection> {
        let tcp = self.connect_tcp(origin)?;

        // The handshake shares the connect deadline
        tcp.set_read_timeout(Some(self.connect_timeout))
            .and_then(|_| tcp.set_write_timeout(Some(self.connect_timeout)))
            .map_err(|e| connection_error(origin, e))?;

        let transport = self
            .tls
            .connect(tcp, Some(origin.host()))
            .map_err(|e| connection_error(origin, e))?;

        // From here on every read and write sets its own remaining budget
        let tcp = transport.tcp_stream();
        tcp.set_read_timeout(None)
            .and_then(|_| tcp.set_write_timeout(None))
            .map_err(|e| connection_error(origin, e))?;

        let info = transport.info().clone();
        let conn = CachedConnection::establish(origin.clone(), transport);
        tracing::debug!(
            connection_id = conn.id(),
            origin = %origin,
            alpn = info.alpn_str().unwrap_or("none"),
            version = %info.version,
            cipher = %info.cipher,
            route = %conn.route(),
            "TLS connection established"
        );

        Ok(conn)
    }

    fn connect_tcp(&self, origin: &Origin) -> Result<TcpStream> {
        let addrs: Vec<SocketAddr> = (origin.host(), origin.port())
            .to_socket_addrs()
            .map_err(|e| connection_error(origin, format!("DNS resolution failed: {}", e)))?
            .collect();

        if addrs.is_empty() {
            return Err(connection_error(origin, "DNS resolution returned no addresses"));
        }

        let mut last_error = None;
        for addr in addrs {
            match self.connect_addr(addr) {
                Ok(stream) => return Ok(stream),
                Err(e) => {
                    tracing::debug!(origin = %origin, %addr, error = %e, "TCP connect failed");
                    last_error = Some(e);
                }
            }
        }

        Err(connection_error(
            origin,
            last_error.map_or_else(|| "no address reachable".to_string(), |e| e.to_string()),
        ))
    }

    fn connect_addr(&self, addr: SocketAddr) -> std::io::Result<TcpStream> {
        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
        socket.set_nodelay(true)?;
        socket.connect_timeout(&SockAddr::from(addr), self.connect_timeout)?;
        Ok(socket.into())
    }
}

fn connection_error(origin: &Origin, reason: impl ToString) -> Error {
    Error::Connection {
        origin: origin.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    fn connector() -> Connector {
        let config = ClientConfig::builder()
            .connect_timeout(Duration::from_secs(2))
            .build()
            .unwrap();
        Connector::from_config(&config).unwrap()
    }

    #[test]
    fn test_refused_port_is_connection_error() {
        // Bind then drop to get a port nobody listens on
        let port = TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();

        let result = connector().connect(&Origin::new("127.0.0.1", port));
        match result {
            Err(Error::Connection { origin, .. }) => assert_eq!(origin, format!("127.0.0.1:{}", port)),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("connect should fail"),
        }
    }

    #[test]
    fn test_unresolvable_host() {
        let result = connector().connect(&Origin::new("nonexistent.invalid", 443));
        assert!(matches!(result, Err(Error::Connection { .. })));
    }

    #[test]
    fn test_handshake_failure_is_connection_error() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let handle = std::thread::spawn(move || {
            use std::io::Write;
            let (mut stream, _) = listener.accept().unwrap();
            let _ = stream.write_all(b"HTTP/1.1 400 Bad Request\r\n\r\n");
        });

        let result = connector().connect(&Origin::new("127.0.0.1", port));
        assert!(matches!(result, Err(Error::Connection { .. })));
        handle.join().unwrap();
    }

    #[test]
    fn test_alpn_list_from_config() {
        assert_eq!(connector().alpn_protocols(), &["h2", "http/1.1"]);
    }
}
