//! Session operations abstraction
//!
//! This module provides the session operations pattern that allows the
//! request paths to run over plain TCP (unit tests) and TLS (the client)
//! with the same code.
//!
//! A path never owns the transport it talks over. It wraps a `&mut S` in an
//! [`HttpSession`] for the duration of one call, so the connection cache keeps
//! sole ownership of every socket.

use super::{Error, Result};
use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::os::fd::AsRawFd;
use std::time::{Duration, Instant};

/// Session operations trait
///
/// This trait defines the operations that can be performed on a session,
/// abstracting over plain TCP and TLS connections.
pub trait SessionOps {
    /// Poll the session for events
    ///
    /// Returns true if the session is ready for the requested operation
    fn poll(&self, events: PollEvents, timeout: Option<Duration>) -> Result<bool>;

    /// Read data from the session
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Write data to the session
    fn write(&mut self, buf: &[u8]) -> Result<usize>;

    /// Flush buffered writes
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    /// Bound the next blocking read or write (`None` blocks forever)
    ///
    /// `poll` only says the first byte is there; a transport that needs more
    /// than that to make progress (a TLS record) must also stop waiting here.
    fn set_io_timeout(&mut self, _timeout: Option<Duration>) -> Result<()> {
        Ok(())
    }

    /// Close the session
    fn close(&mut self) -> Result<()>;
}

impl<S: SessionOps + ?Sized> SessionOps for &mut S {
    fn poll(&self, events: PollEvents, timeout: Option<Duration>) -> Result<bool> {
        (**self).poll(events, timeout)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        (**self).read(buf)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        (**self).write(buf)
    }

    fn flush(&mut self) -> Result<()> {
        (**self).flush()
    }

    fn set_io_timeout(&mut self, timeout: Option<Duration>) -> Result<()> {
        (**self).set_io_timeout(timeout)
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}

/// Poll events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollEvents {
    Read,
    Write,
    Both,
}

impl PollEvents {
    pub(crate) fn as_poll_flags(self) -> libc::c_short {
        match self {
            PollEvents::Read => libc::POLLIN,
            PollEvents::Write => libc::POLLOUT,
            PollEvents::Both => libc::POLLIN | libc::POLLOUT,
        }
    }
}

/// Poll a raw descriptor, returning the revents mask (0 on timeout)
pub(crate) fn poll_fd(
    fd: std::os::fd::RawFd,
    events: libc::c_short,
    timeout: Option<Duration>,
) -> Result<libc::c_short> {
    let mut pfd = libc::pollfd {
        fd,
        events,
        revents: 0,
    };

    let timeout_ms = timeout
        .map(|d| d.as_millis().min(i32::MAX as u128) as i32)
        .unwrap_or(-1); // -1 = infinite

    let result = unsafe { libc::poll(&mut pfd as *mut libc::pollfd, 1, timeout_ms) };

    if result < 0 {
        return Err(Error::Io(io::Error::last_os_error()));
    }

    Ok(if result == 0 { 0 } else { pfd.revents })
}

/// Apply `timeout` as both SO_RCVTIMEO and SO_SNDTIMEO
pub(crate) fn set_socket_timeout(stream: &TcpStream, timeout: Option<Duration>) -> Result<()> {
    // A zero duration means "no timeout" to the kernel
    let timeout = timeout.map(|t| t.max(Duration::from_millis(1)));
    stream.set_read_timeout(timeout)?;
    stream.set_write_timeout(timeout)?;
    Ok(())
}

/// HTTP session adding a deadline to every read and write
///
/// The timeout is a budget for the whole session, not for each call: the
/// deadline is fixed when the session is created (or the timeout is reset),
/// and every read and write only gets what is left of it. A peer trickling
/// one byte at a time still runs into the deadline.
pub struct HttpSession<S: SessionOps> {
    session: S,
    timeout: Option<Duration>,
    deadline: Option<Instant>,
}

impl<S: SessionOps> HttpSession<S> {
    /// Create a new HTTP session
    pub fn new(session: S) -> Self {
        Self::with_timeout(session, Some(Duration::from_secs(10)))
    }

    /// Create a session with an explicit timeout (`None` waits forever)
    pub fn with_timeout(session: S, timeout: Option<Duration>) -> Self {
        HttpSession {
            session,
            timeout,
            deadline: timeout.map(|t| Instant::now() + t),
        }
    }

    /// Set the timeout and restart the deadline from now
    pub fn set_timeout(&mut self, timeout: Option<Duration>) {
        self.timeout = timeout;
        self.deadline = timeout.map(|t| Instant::now() + t);
    }

    /// Get the timeout
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Time left before the deadline; `Err(Timeout)` once it has passed
    pub fn remaining(&self) -> Result<Option<Duration>> {
        match self.deadline {
            None => Ok(None),
            Some(deadline) => {
                let left = deadline.saturating_duration_since(Instant::now());
                if left.is_zero() {
                    Err(Error::Timeout)
                } else {
                    Ok(Some(left))
                }
            }
        }
    }

    /// Read data with timeout
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let left = self.ready(PollEvents::Read)?;
        self.session.set_io_timeout(left)?;
        self.session.read(buf)
    }

    /// Write data with timeout
    pub fn write(&mut self, buf: &[u8]) -> Result<usize> {
        let left = self.ready(PollEvents::Write)?;
        self.session.set_io_timeout(left)?;
        self.session.write(buf)
    }

    fn ready(&self, events: PollEvents) -> Result<Option<Duration>> {
        let left = self.remaining()?;
        if !self.session.poll(events, left)? {
            return Err(Error::Timeout);
        }
        // The poll may have used up the budget
        self.remaining()
    }

    /// Write the whole buffer, then flush
    pub fn write_all(&mut self, mut buf: &[u8]) -> Result<()> {
        while !buf.is_empty() {
            let n = self.write(buf)?;
            if n == 0 {
                return Err(Error::ConnectionClosed);
            }
            buf = &buf[n..];
        }
        self.session.flush()
    }

    /// Fill `buf` completely, failing on EOF
    pub fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        let mut read = 0;
        while read < buf.len() {
            let n = self.read(&mut buf[read..])?;
            if n == 0 {
                return Err(Error::ConnectionClosed);
            }
            read += n;
        }
        Ok(())
    }

    /// Close the session
    pub fn close(&mut self) -> Result<()> {
        self.session.close()
    }

    /// Get a reference to the underlying session
    pub fn get_ref(&self) -> &S {
        &self.session
    }

    /// Get a mutable reference to the underlying session
    pub fn get_mut(&mut self) -> &mut S {
        &mut self.session
    }
}

/// Socket timeouts surface as `WouldBlock` or `TimedOut`
pub(crate) fn io_error(e: io::Error) -> Error {
    match e.kind() {
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => Error::Timeout,
        _ => Error::Io(e),
    }
}

/// Plain file descriptor session operations
pub struct FdSessionOps {
    stream: TcpStream,
}

impl FdSessionOps {
    /// Create a new FD session operations from a TCP stream
    pub fn new(stream: TcpStream) -> Self {
        FdSessionOps { stream }
    }

    /// Get a reference to the underlying stream
    pub fn stream(&self) -> &TcpStream {
        &self.stream
    }
}

impl SessionOps for FdSessionOps {
    fn poll(&self, events: PollEvents, timeout: Option<Duration>) -> Result<bool> {
        let revents = poll_fd(self.stream.as_raw_fd(), events.as_poll_flags(), timeout)?;
        Ok(revents != 0)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.stream.read(buf).map_err(io_error)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        self.stream.write(buf).map_err(io_error)
    }

    fn flush(&mut self) -> Result<()> {
        self.stream.flush().map_err(Error::from)
    }

    fn set_io_timeout(&mut self, timeout: Option<Duration>) -> Result<()> {
        set_socket_timeout(&self.stream, timeout)
    }

    fn close(&mut self) -> Result<()> {
        use std::net::Shutdown;
        self.stream
            .shutdown(Shutdown::Both)
            .map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::thread;

    #[test]
    fn test_fd_session_ops() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            stream.write_all(b"Hello").unwrap();
        });

        let stream = TcpStream::connect(addr).unwrap();
        let mut session = FdSessionOps::new(stream);

        assert!(session.poll(PollEvents::Read, Some(Duration::from_secs(1))).unwrap());

        let mut buf = [0u8; 5];
        let n = session.read(&mut buf).unwrap();
        assert_eq!(n, 5);
        assert_eq!(&buf, b"Hello");

        handle.join().unwrap();
    }

    #[test]
    fn test_borrowed_session_leaves_transport_with_owner() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            stream.write_all(b"ab").unwrap();
        });

        let mut transport = FdSessionOps::new(TcpStream::connect(addr).unwrap());

        {
            let mut session = HttpSession::new(&mut transport);
            let mut buf = [0u8; 1];
            session.read_exact(&mut buf).unwrap();
            assert_eq!(&buf, b"a");
        }

        // The borrow ended, the owner can keep using the transport.
        let mut session = HttpSession::new(&mut transport);
        let mut buf = [0u8; 1];
        session.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"b");

        handle.join().unwrap();
    }

    #[test]
    fn test_http_session_timeout() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let _handle = thread::spawn(move || {
            let (_stream, _) = listener.accept().unwrap();
            thread::sleep(Duration::from_secs(2));
        });

        let stream = TcpStream::connect(addr).unwrap();
        let mut session = HttpSession::new(FdSessionOps::new(stream));
        session.set_timeout(Some(Duration::from_millis(100)));

        let mut buf = [0u8; 10];
        let result = session.read(&mut buf);
        assert!(matches!(result.unwrap_err(), Error::Timeout));
    }

    #[test]
    fn test_deadline_covers_trickling_peer() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let _handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            for _ in 0..50 {
                if stream.write_all(b"x").is_err() {
                    return;
                }
                thread::sleep(Duration::from_millis(40));
            }
        });

        let stream = TcpStream::connect(addr).unwrap();
        let mut session = HttpSession::with_timeout(FdSessionOps::new(stream), Some(Duration::from_millis(300)));

        // Every single read succeeds quickly; only the total is too slow
        let started = Instant::now();
        let mut buf = [0u8; 50];
        let result = session.read_exact(&mut buf);

        assert!(matches!(result, Err(Error::Timeout)));
        assert!(started.elapsed() < Duration::from_secs(1), "{:?}", started.elapsed());
        assert!(matches!(session.remaining(), Err(Error::Timeout)));
    }

    #[test]
    fn test_set_timeout_restarts_deadline() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let stream = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let mut session = HttpSession::with_timeout(FdSessionOps::new(stream), Some(Duration::from_millis(20)));

        thread::sleep(Duration::from_millis(40));
        assert!(matches!(session.remaining(), Err(Error::Timeout)));

        session.set_timeout(Some(Duration::from_secs(5)));
        assert!(session.remaining().unwrap().unwrap() > Duration::from_secs(4));

        session.set_timeout(None);
        assert_eq!(session.remaining().unwrap(), None);
    }
}
