//! TLS transport
//!
//! Implements the `SessionOps` trait for TLS connections and owns the
//! liveness and teardown logic the connection cache relies on.

use super::config::{TlsConfig, TlsError};
use super::info::{Alpn, TlsInfo};
use crate::http::session::{io_error, poll_fd, set_socket_timeout, PollEvents, SessionOps};
use crate::http::{Error, Result as HttpResult};
use openssl::ssl::{Ssl, SslStream};
use std::io::{self, Read, Write};
use std::net::{IpAddr, Shutdown, SocketAddr, TcpStream};
use std::os::fd::AsRawFd;
use std::time::Duration;

/// TLS record content type for alerts
const TLS_ALERT_RECORD: u8 = 21;

/// An established TLS connection
///
/// The negotiated protocol is read once from the handshake and never
/// changes. After any I/O failure or [`destroy`](Self::destroy) the transport
/// reports itself unusable.
pub struct TlsTransport {
    stream: SslStream<TcpStream>,
    info: TlsInfo,
    failed: bool,
    destroyed: bool,
}

impl TlsTransport {
    /// Create a client TLS connection (perform handshake)
    pub fn connect(
        tcp_stream: TcpStream,
        config: &TlsConfig,
        servername: Option<&str>,
    ) -> std::result::Result<Self, TlsError> {
        let mut ssl = Ssl::new(&config.ctx)?;

        if let Some(name) = servername {
            match name.parse::<IpAddr>() {
                Ok(ip) => {
                    // SNI carries host names only
                    if config.verify_peer {
                        ssl.param_mut().set_ip(ip)?;
                    }
                }
                Err(_) => {
                    ssl.set_hostname(name)?;
                    if config.verify_peer {
                        ssl.param_mut().set_host(name)?;
                    }
                }
            }
        }

        let ssl_stream = ssl
            .connect(tcp_stream)
            .map_err(|e| TlsError::HandshakeFailed(format!("Connection failed: {}", e)))?;

        let info = TlsInfo::from_ssl(ssl_stream.ssl());

        Ok(TlsTransport {
            stream: ssl_stream,
            info,
            failed: false,
            destroyed: false,
        })
    }

    /// Accept a client connection with TLS (perform handshake)
    pub fn accept(tcp_stream: TcpStream, config: &TlsConfig) -> std::result::Result<Self, TlsError> {
        let ssl = Ssl::new(&config.ctx)?;

        let ssl_stream = ssl
            .accept(tcp_stream)
            .map_err(|e| TlsError::HandshakeFailed(format!("Accept failed: {}", e)))?;

        let info = TlsInfo::from_ssl(ssl_stream.ssl());

        Ok(TlsTransport {
            stream: ssl_stream,
            info,
            failed: false,
            destroyed: false,
        })
    }

    /// Handshake results
    pub fn info(&self) -> &TlsInfo {
        &self.info
    }

    /// Protocol the server selected during the handshake
    pub fn negotiated_protocol(&self) -> Option<&Alpn> {
        self.info.alpn.as_ref()
    }

    /// Remote address
    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.stream.get_ref().peer_addr()
    }

    /// Underlying TCP socket
    pub fn tcp_stream(&self) -> &TcpStream {
        self.stream.get_ref()
    }

    /// Whether `destroy` has run
    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// Whether a read or write has failed
    pub fn failed(&self) -> bool {
        self.failed
    }

    /// Liveness check before reuse
    ///
    /// Usable means: not destroyed, no earlier I/O failure, writable, no
    /// hang-up or error on the socket, and not at end of stream.
    pub fn is_usable(&self) -> bool {
        if self.destroyed || self.failed {
            return false;
        }

        let revents = match poll_fd(
            self.stream.get_ref().as_raw_fd(),
            libc::POLLIN | libc::POLLOUT,
            Some(Duration::ZERO),
        ) {
            Ok(revents) => revents,
            Err(_) => return false,
        };

        if revents & (libc::POLLERR | libc::POLLHUP | libc::POLLNVAL) != 0 {
            return false;
        }
        if revents & libc::POLLOUT == 0 {
            return false;
        }

        if revents & libc::POLLIN != 0 && self.stream.ssl().pending() == 0 {
            // Readable while idle: a TLS record or EOF. An alert record
            // (close_notify included) means the peer is going away.
            let mut first = [0u8; 1];
            match self.stream.get_ref().peek(&mut first) {
                Ok(0) => return false,
                Ok(_) if first[0] == TLS_ALERT_RECORD => return false,
                Ok(_) => {}
                Err(_) => return false,
            }
        }

        true
    }

    /// Whether bytes are waiting to be read right now
    pub fn has_pending_input(&self) -> bool {
        if self.destroyed {
            return false;
        }
        self.stream.ssl().pending() > 0
            || poll_fd(self.stream.get_ref().as_raw_fd(), libc::POLLIN, Some(Duration::ZERO))
                .map_or(false, |revents| revents != 0)
    }

    /// Tear the connection down; safe to call more than once
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        if !self.failed {
            let _ = self.stream.shutdown();
        }
        let _ = self.stream.get_mut().shutdown(Shutdown::Both);
        self.destroyed = true;
    }

    fn io_failure(&mut self, e: io::Error) -> Error {
        // A record cut short by a timeout leaves the TLS stream unusable too
        self.failed = true;
        io_error(e)
    }
}

impl SessionOps for TlsTransport {
    fn poll(&self, events: PollEvents, timeout: Option<Duration>) -> HttpResult<bool> {
        if self.destroyed {
            return Err(Error::ConnectionClosed);
        }

        // Decrypted bytes may already be buffered inside OpenSSL
        if matches!(events, PollEvents::Read | PollEvents::Both) && self.stream.ssl().pending() > 0 {
            return Ok(true);
        }

        let revents = poll_fd(
            self.stream.get_ref().as_raw_fd(),
            events.as_poll_flags(),
            timeout,
        )?;
        Ok(revents != 0)
    }

    fn read(&mut self, buf: &mut [u8]) -> HttpResult<usize> {
        if self.destroyed {
            return Err(Error::ConnectionClosed);
        }
        self.stream.read(buf).map_err(|e| self.io_failure(e))
    }

    fn write(&mut self, buf: &[u8]) -> HttpResult<usize> {
        if self.destroyed {
            return Err(Error::ConnectionClosed);
        }
        self.stream.write(buf).map_err(|e| self.io_failure(e))
    }

    fn flush(&mut self) -> HttpResult<()> {
        if self.destroyed {
            return Err(Error::ConnectionClosed);
        }
        self.stream.flush().map_err(|e| self.io_failure(e))
    }

    fn set_io_timeout(&mut self, timeout: Option<Duration>) -> HttpResult<()> {
        if self.destroyed {
            return Err(Error::ConnectionClosed);
        }
        set_socket_timeout(self.stream.get_ref(), timeout)
    }

    fn close(&mut self) -> HttpResult<()> {
        self.destroy();
        Ok(())
    }
}

impl Drop for TlsTransport {
    fn drop(&mut self) {
        self.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::super::TlsVersion;
    use super::*;
    use std::net::TcpListener;
    use std::thread;

    fn server_config(alpn: &[&str]) -> TlsConfig {
        TlsConfig::server()
            .version(TlsVersion::Tls12)
            .alpn(alpn)
            .build()
            .unwrap()
    }

    fn client_config(alpn: &[&str]) -> TlsConfig {
        TlsConfig::client()
            .version(TlsVersion::Tls12)
            .alpn(alpn)
            .verify_peer(false)
            .build()
            .unwrap()
    }

    #[test]
    fn test_tls_client_server_roundtrip() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = server_config(&["http/1.1"]);

        let server_handle = thread::spawn(move || {
            let (tcp_stream, _) = listener.accept().unwrap();
            let mut tls = server.accept(tcp_stream).unwrap();

            let mut buf = [0u8; 5];
            let n = tls.read(&mut buf).unwrap();
            assert_eq!(&buf[..n], b"Hello");
            tls.write(b"World").unwrap();
            tls.close().unwrap();
        });

        let tcp_stream = TcpStream::connect(addr).unwrap();
        let mut tls = client_config(&["h2", "http/1.1"])
            .connect(tcp_stream, Some("localhost"))
            .unwrap();

        assert_eq!(tls.negotiated_protocol(), Some(&Alpn::Http11));
        assert!(tls.info().version.contains("TLS"));

        tls.write(b"Hello").unwrap();
        let mut buf = [0u8; 5];
        let n = tls.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"World");

        server_handle.join().unwrap();
    }

    #[test]
    fn test_no_alpn_overlap_negotiates_nothing() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = server_config(&["spdy/3"]);

        let server_handle = thread::spawn(move || {
            let (tcp_stream, _) = listener.accept().unwrap();
            let tls = server.accept(tcp_stream).unwrap();
            assert_eq!(tls.negotiated_protocol(), None);
        });

        let tcp_stream = TcpStream::connect(addr).unwrap();
        let tls = client_config(&["h2", "http/1.1"])
            .connect(tcp_stream, Some("localhost"))
            .unwrap();
        assert_eq!(tls.negotiated_protocol(), None);

        server_handle.join().unwrap();
    }

    #[test]
    fn test_liveness_after_peer_close_and_destroy() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = server_config(&["h2"]);
        let (closed_tx, closed_rx) = std::sync::mpsc::channel();

        let server_handle = thread::spawn(move || {
            let (tcp_stream, _) = listener.accept().unwrap();
            let mut tls = server.accept(tcp_stream).unwrap();
            tls.destroy();
            closed_tx.send(()).unwrap();
        });

        let tcp_stream = TcpStream::connect(addr).unwrap();
        let mut tls = client_config(&["h2"])
            .connect(tcp_stream, Some("localhost"))
            .unwrap();

        closed_rx.recv().unwrap();
        server_handle.join().unwrap();
        thread::sleep(Duration::from_millis(50));
        assert!(!tls.is_usable());

        tls.destroy();
        tls.destroy();
        assert!(tls.is_destroyed());
        assert!(matches!(tls.read(&mut [0u8; 1]), Err(Error::ConnectionClosed)));
    }

    #[test]
    fn test_idle_connection_is_usable() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = server_config(&["h2"]);
        let (done_tx, done_rx) = std::sync::mpsc::channel::<()>();

        let server_handle = thread::spawn(move || {
            let (tcp_stream, _) = listener.accept().unwrap();
            let _tls = server.accept(tcp_stream).unwrap();
            let _ = done_rx.recv();
        });

        let tcp_stream = TcpStream::connect(addr).unwrap();
        let tls = client_config(&["h2"])
            .connect(tcp_stream, Some("localhost"))
            .unwrap();
        assert!(tls.is_usable());

        done_tx.send(()).unwrap();
        server_handle.join().unwrap();
    }
}
