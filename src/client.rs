//! Single-socket HTTPS client
//!
//! [`Client`] ties the pieces together: parse the URL, acquire the origin's
//! connection from the cache, let the connection dispatch on its negotiated
//! protocol, and evict the entry when a request leaves it unusable.
//!
//! All methods take `&mut self`. On an HTTP/1.1 connection this is what
//! keeps exchanges strictly sequential. HTTP/2 concurrency comes from
//! [`Client::request_all`], which opens every stream of a batch before
//! reading any response.

use crate::cache::{ConnectionCache, Lease};
use crate::config::{ClientConfig, RequestOptions};
use crate::connection::{CachedConnection, ConnectionState, OutboundRequest, Pending};
use crate::connector::Connector;
use crate::error::{Error, RequestError, Result};
use crate::http::Headers;
use crate::origin::{Origin, Target};
use crate::result::RequestResult;
use std::time::Duration;

/// HTTPS client keeping one connection per origin
pub struct Client {
    config: ClientConfig,
    connector: Connector,
    cache: ConnectionCache,
}

/// A batch entry whose response has not been read yet
enum InFlight {
    Done(Result<RequestResult>),
    Waiting {
        origin: Origin,
        connection_id: u64,
        pending: Pending,
        timeout: Option<Duration>,
        untracked: Option<CachedConnection>,
    },
}

impl Client {
    /// Create a client; the TLS context is built once, here
    pub fn new(config: ClientConfig) -> Result<Self> {
        let connector = Connector::from_config(&config)?;
        Ok(Client {
            config,
            connector,
            cache: ConnectionCache::new(),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// `GET` with default options
    pub fn get(&mut self, url: &str) -> Result<RequestResult> {
        self.request(url, RequestOptions::default())
    }

    /// Send one request and return the complete response
    pub fn request(&mut self, url: &str, options: RequestOptions) -> Result<RequestResult> {
        let target = Target::parse(url)?;
        let request = self.outbound(&target, &options);
        let timeout = self.timeout_for(&options);

        let mut lease = self.cache.acquire(
            &target.origin,
            &self.connector,
            options.force_fresh,
            options.reuse_connection,
        )?;

        let conn = lease.connection();
        tracing::trace!(
            connection_id = conn.id(),
            route = %conn.route(),
            method = request.method.as_str(),
            path = %request.path,
            "sending request"
        );
        let result = conn.send(&request, timeout);

        // An untracked connection is closed when its lease drops
        let cached = lease.is_cached();
        drop(lease);

        if let Err(e) = &result {
            if cached && e.is_fatal_for_connection() {
                self.cache.evict(&target.origin);
            }
        }
        result
    }

    /// Send a batch, multiplexing HTTP/2 requests
    ///
    /// Every HTTP/2 request of the batch is started before any response is
    /// read, so requests sharing an origin run concurrently on one
    /// connection. HTTP/1.1 requests complete one after another. Results are
    /// returned in batch order; one failure does not abort the others.
    pub fn request_all(&mut self, batch: Vec<(&str, RequestOptions)>) -> Vec<Result<RequestResult>> {
        let started: Vec<InFlight> = batch
            .into_iter()
            .map(|(url, options)| self.start(url, options))
            .collect();

        started
            .into_iter()
            .map(|entry| match entry {
                InFlight::Done(result) => result,
                InFlight::Waiting {
                    pending,
                    timeout,
                    untracked: Some(mut conn),
                    ..
                } => {
                    let result = conn.complete(pending, timeout);
                    conn.close();
                    result
                }
                InFlight::Waiting {
                    origin,
                    connection_id,
                    pending,
                    timeout,
                    untracked: None,
                } => self.finish(&origin, connection_id, pending, timeout),
            })
            .collect()
    }

    /// Close every cached connection
    pub fn close_all(&mut self) {
        self.cache.close_all();
    }

    /// Number of origins with a cached connection
    pub fn cached_connection_count(&self) -> usize {
        self.cache.count()
    }

    /// The cached connection for `origin`, if any
    pub fn cached_connection(&self, origin: &Origin) -> Option<&CachedConnection> {
        self.cache.get(origin)
    }

    fn start(&mut self, url: &str, options: RequestOptions) -> InFlight {
        let target = match Target::parse(url) {
            Ok(target) => target,
            Err(e) => return InFlight::Done(Err(e)),
        };
        let request = self.outbound(&target, &options);
        let timeout = self.timeout_for(&options);

        let lease = self.cache.acquire(
            &target.origin,
            &self.connector,
            options.force_fresh,
            options.reuse_connection,
        );
        let mut lease = match lease {
            Ok(lease) => lease,
            Err(e) => return InFlight::Done(Err(e)),
        };

        let conn = lease.connection();
        let connection_id = conn.id();
        let begun = conn.begin(&request, timeout);

        let cached = lease.is_cached();

        let pending = match begun {
            Ok(Pending::Ready(result)) => return InFlight::Done(Ok(result)),
            Ok(pending) => pending,
            Err(e) => {
                drop(lease);
                if cached && e.is_fatal_for_connection() {
                    self.cache.evict(&target.origin);
                }
                return InFlight::Done(Err(e));
            }
        };

        let untracked = match lease {
            Lease::Untracked(conn) => Some(conn),
            Lease::Cached(_) => None,
        };
        InFlight::Waiting {
            origin: target.origin,
            connection_id,
            pending,
            timeout,
            untracked,
        }
    }

    fn finish(
        &mut self,
        origin: &Origin,
        connection_id: u64,
        pending: Pending,
        timeout: Option<Duration>,
    ) -> Result<RequestResult> {
        // The entry may have been replaced after a failure earlier in the batch
        let conn = match self.cache.get_mut(origin) {
            Some(conn) if conn.id() == connection_id => conn,
            _ => return Err(Error::Request(RequestError::NotReady(ConnectionState::Closed))),
        };

        let result = conn.complete(pending, timeout);
        if let Err(e) = &result {
            if e.is_fatal_for_connection() {
                self.cache.evict(origin);
            }
        }
        result
    }

    fn outbound(&self, target: &Target, options: &RequestOptions) -> OutboundRequest {
        let mut headers = Headers::new();
        for (name, value) in &options.headers {
            headers.insert(name.as_str(), value.as_str());
        }
        if !headers.contains("user-agent") {
            headers.insert("user-agent", self.config.user_agent());
        }

        OutboundRequest {
            method: options.method,
            path: target.path.clone(),
            headers,
            body: options.body.clone(),
        }
    }

    fn timeout_for(&self, options: &RequestOptions) -> Option<Duration> {
        options.timeout.or(self.config.request_timeout())
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.close_all();
    }
}
