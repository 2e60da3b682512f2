//! Cached connections
//!
//! A [`CachedConnection`] is one TLS transport plus whatever protocol state
//! rides on it. The protocol is read from the transport exactly once, when
//! the entry is created, and decides the [`Channel`] variant:
//!
//! ```text
//! Connecting --handshake--> Negotiated(route) --request--> InUse(route)
//!                                  ^                            |
//!                                  +-------- response ----------+
//!           any state --close / fatal error--> Closed
//! ```
//!
//! An HTTP/1.1 channel can never hold an HTTP/2 session, so a session cannot
//! be used on a transport that negotiated something else.

use crate::dispatch::{route, Route};
use crate::error::{Error, RequestError, Result};
use crate::http::client::exchange;
use crate::http::h2::{H2Request, H2Session, H2SessionBuilder, StreamId};
use crate::http::tls::{Alpn, TlsTransport};
use crate::http::{Headers, Http1Request, HttpSession, Method};
use crate::origin::Origin;
use crate::result::RequestResult;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Lifecycle of a cached connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// TCP/TLS handshake in progress
    Connecting,
    /// Protocol known, no request in flight
    Negotiated(Route),
    /// At least one request in flight
    InUse(Route),
    Closed,
}

impl ConnectionState {
    /// Whether moving to `next` is allowed
    ///
    /// `InUse -> InUse` is only legal for multiplexed routes.
    pub fn can_transition(&self, next: &ConnectionState) -> bool {
        use ConnectionState::*;
        match (self, next) {
            (_, Closed) => true,
            (Connecting, Negotiated(_)) => true,
            (Negotiated(a), InUse(b)) | (InUse(a), Negotiated(b)) => a == b,
            (InUse(a), InUse(b)) => a == b && a.is_multiplexed(),
            _ => false,
        }
    }
}

/// A request as handed to a connection
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub method: Method,
    /// Path plus query string
    pub path: String,
    pub headers: Headers,
    pub body: Vec<u8>,
}

/// HTTP/1.1 transport
pub struct Http1Channel {
    transport: TlsTransport,
    /// Cleared when a response said the peer will not take another request
    reusable: bool,
}

/// HTTP/2 transport with its lazily created session
pub struct Http2Channel {
    transport: TlsTransport,
    session: Option<H2Session>,
}

/// Protocol-specific part of a connection
pub enum Channel {
    Http1(Http1Channel),
    Http2(Http2Channel),
}

impl Channel {
    fn transport(&self) -> &TlsTransport {
        match self {
            Channel::Http1(c) => &c.transport,
            Channel::Http2(c) => &c.transport,
        }
    }

    fn transport_mut(&mut self) -> &mut TlsTransport {
        match self {
            Channel::Http1(c) => &mut c.transport,
            Channel::Http2(c) => &mut c.transport,
        }
    }
}

/// A request that has been sent but whose response may not be read yet
#[derive(Debug)]
pub enum Pending {
    /// HTTP/1.1 exchanges complete immediately
    Ready(RequestResult),
    /// HTTP/2 stream awaiting its response
    Stream(StreamId),
}

/// One live transport to one origin
pub struct CachedConnection {
    id: u64,
    origin: Origin,
    channel: Channel,
    state: ConnectionState,
    in_flight: usize,
    requests: u64,
}

impl CachedConnection {
    /// Wrap a freshly handshaken transport
    ///
    /// The negotiated protocol is read here and never again. The handshake is
    /// already complete, so the entry starts out `Negotiated`.
    pub fn establish(origin: Origin, transport: TlsTransport) -> Self {
        let route = route(transport.negotiated_protocol());

        let channel = match route {
            Route::Http1 => Channel::Http1(Http1Channel {
                transport,
                reusable: true,
            }),
            Route::Http2 => Channel::Http2(Http2Channel {
                transport,
                session: None,
            }),
        };

        CachedConnection {
            id: NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
            origin,
            channel,
            state: ConnectionState::Negotiated(route),
            in_flight: 0,
            requests: 0,
        }
    }

    /// Process-unique id, distinct for every transport
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn origin(&self) -> &Origin {
        &self.origin
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    /// Request path chosen from the negotiated protocol
    pub fn route(&self) -> Route {
        match self.channel {
            Channel::Http1(_) => Route::Http1,
            Channel::Http2(_) => Route::Http2,
        }
    }

    /// ALPN protocol the server selected
    pub fn alpn(&self) -> Option<&Alpn> {
        self.channel.transport().negotiated_protocol()
    }

    /// Requests started on this connection
    pub fn request_count(&self) -> u64 {
        self.requests
    }

    /// Whether the HTTP/2 session has been created
    pub fn has_session(&self) -> bool {
        matches!(&self.channel, Channel::Http2(c) if c.session.is_some())
    }

    /// Liveness check before reuse
    pub fn is_usable(&self) -> bool {
        if self.state == ConnectionState::Closed || !self.channel.transport().is_usable() {
            return false;
        }
        match &self.channel {
            // An idle HTTP/1.1 peer has nothing to say; input means it hung up
            Channel::Http1(c) => c.reusable && !c.transport.has_pending_input(),
            Channel::Http2(c) => c.session.as_ref().map_or(true, H2Session::is_open),
        }
    }

    /// Send one request and wait for its response
    pub fn send(&mut self, request: &OutboundRequest, timeout: Option<Duration>) -> Result<RequestResult> {
        let pending = self.begin(request, timeout)?;
        self.complete(pending, timeout)
    }

    /// Send a request without waiting for an HTTP/2 response
    ///
    /// HTTP/1.1 cannot pipeline, so the exchange runs to completion here.
    pub fn begin(&mut self, request: &OutboundRequest, timeout: Option<Duration>) -> Result<Pending> {
        let route = self.route();
        self.enter(ConnectionState::InUse(route))?;
        self.in_flight += 1;
        self.requests += 1;

        let result = match route {
            Route::Http1 => self.exchange_http1(request, timeout).map(Pending::Ready),
            Route::Http2 => self.start_http2(request, timeout).map(Pending::Stream),
        };

        if matches!(result, Ok(Pending::Ready(_))) || result.is_err() {
            self.request_done();
        }
        self.check(result)
    }

    /// Wait for the response of a request started with [`begin`](Self::begin)
    pub fn complete(&mut self, pending: Pending, timeout: Option<Duration>) -> Result<RequestResult> {
        let stream_id = match pending {
            Pending::Ready(result) => return Ok(result),
            Pending::Stream(stream_id) => stream_id,
        };

        let result = self.await_http2(stream_id, timeout);
        self.request_done();
        self.check(result)
    }

    /// Close the session (if any) and destroy the transport
    pub fn close(&mut self) {
        if self.state == ConnectionState::Closed {
            return;
        }

        if let Channel::Http2(channel) = &mut self.channel {
            if let Some(session) = channel.session.as_mut() {
                let mut io = HttpSession::with_timeout(&mut channel.transport, Some(Duration::from_secs(1)));
                if let Err(e) = session.close(&mut io) {
                    tracing::debug!(origin = %self.origin, error = %e, "GOAWAY not sent");
                }
            }
            channel.session = None;
        }

        self.channel.transport_mut().destroy();
        self.state = ConnectionState::Closed;
        tracing::debug!(
            connection_id = self.id,
            origin = %self.origin,
            requests = self.requests,
            "connection closed"
        );
    }

    fn enter(&mut self, next: ConnectionState) -> Result<()> {
        if !self.state.can_transition(&next) {
            return Err(Error::Request(RequestError::NotReady(self.state)));
        }
        self.state = next;
        Ok(())
    }

    fn request_done(&mut self) {
        self.in_flight = self.in_flight.saturating_sub(1);
        if self.in_flight == 0 {
            if let ConnectionState::InUse(route) = self.state {
                self.state = ConnectionState::Negotiated(route);
            }
        }
    }

    /// Close the connection when an error leaves it unusable
    fn check<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            if e.is_fatal_for_connection() {
                tracing::debug!(origin = %self.origin, error = %e, "connection failed");
                self.close();
            }
        }
        result
    }

    fn exchange_http1(&mut self, request: &OutboundRequest, timeout: Option<Duration>) -> Result<RequestResult> {
        let Channel::Http1(channel) = &mut self.channel else {
            return Err(Error::Request(RequestError::NotReady(self.state)));
        };

        let mut http1 = Http1Request::new(request.method, request.path.clone(), self.origin.authority());
        for (name, value) in request.headers.iter() {
            http1 = http1.header(name, value);
        }
        if !request.body.is_empty() {
            http1 = http1.body(request.body.clone());
        }

        let mut io = HttpSession::with_timeout(&mut channel.transport, timeout);
        let response = exchange(&mut io, &http1)?;

        if !response.keeps_alive() {
            tracing::debug!(origin = %self.origin, "peer will not reuse the connection");
            channel.reusable = false;
        }

        let alpn = channel.transport.negotiated_protocol();
        Ok(RequestResult::from_http1(response, alpn))
    }

    fn start_http2(&mut self, request: &OutboundRequest, timeout: Option<Duration>) -> Result<StreamId> {
        let Channel::Http2(channel) = &mut self.channel else {
            return Err(Error::Request(RequestError::NotReady(self.state)));
        };
        let mut io = HttpSession::with_timeout(&mut channel.transport, timeout);

        if channel.session.is_none() {
            tracing::debug!(origin = %self.origin, "starting h2 session");
            let session = H2SessionBuilder::new(self.origin.authority()).handshake(&mut io)?;
            channel.session = Some(session);
        }
        let session = channel
            .session
            .as_mut()
            .ok_or(Error::Request(RequestError::NotReady(self.state)))?;
        // After GOAWAY the earlier streams may still complete, so the
        // transport stays up; only new streams are refused
        if !session.is_open() {
            return Err(Error::Request(RequestError::NotReady(ConnectionState::Closed)));
        }

        let h2 = H2Request {
            method: request.method,
            path: request.path.clone(),
            headers: request.headers.clone(),
            body: request.body.clone(),
        };
        Ok(session.start_request(&mut io, &h2)?)
    }

    fn await_http2(&mut self, stream_id: StreamId, timeout: Option<Duration>) -> Result<RequestResult> {
        let Channel::Http2(channel) = &mut self.channel else {
            return Err(Error::Request(RequestError::NotReady(self.state)));
        };
        let session = channel
            .session
            .as_mut()
            .ok_or(Error::Request(RequestError::NotReady(self.state)))?;

        let mut io = HttpSession::with_timeout(&mut channel.transport, timeout);
        match session.await_response(&mut io, stream_id) {
            Ok(response) => Ok(RequestResult::from_h2(
                response,
                channel.transport.negotiated_protocol(),
            )),
            Err(e) => {
                if !e.is_session_fatal() {
                    tracing::warn!(origin = %self.origin, stream_id, error = %e, "h2 stream failed");
                }
                Err(e.into())
            }
        }
    }
}

impl Drop for CachedConnection {
    fn drop(&mut self) {
        self.close();
    }
}
