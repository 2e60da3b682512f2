//! Connection cache
//!
//! At most one [`CachedConnection`] per origin. The cache is the only owner
//! of transports and sessions; request paths borrow an entry for one call
//! and only the cache destroys it.

use crate::connection::CachedConnection;
use crate::connector::Connector;
use crate::error::{Error, Result};
use crate::origin::Origin;
use std::collections::hash_map::Entry;
use std::collections::HashMap;

/// A connection handed out for one request
pub enum Lease<'a> {
    /// Entry owned by the cache
    Cached(&'a mut CachedConnection),
    /// One-off connection the caller must close
    Untracked(CachedConnection),
}

impl Lease<'_> {
    pub fn connection(&mut self) -> &mut CachedConnection {
        match self {
            Lease::Cached(conn) => conn,
            Lease::Untracked(conn) => conn,
        }
    }

    pub fn is_cached(&self) -> bool {
        matches!(self, Lease::Cached(_))
    }
}

/// Origin-keyed connection cache
#[derive(Default)]
pub struct ConnectionCache {
    entries: HashMap<Origin, CachedConnection>,
}

impl ConnectionCache {
    pub fn new() -> Self {
        ConnectionCache::default()
    }

    /// Number of cached origins
    pub fn count(&self) -> usize {
        self.entries.len()
    }

    pub fn contains(&self, origin: &Origin) -> bool {
        self.entries.contains_key(origin)
    }

    pub fn get(&self, origin: &Origin) -> Option<&CachedConnection> {
        self.entries.get(origin)
    }

    pub fn get_mut(&mut self, origin: &Origin) -> Option<&mut CachedConnection> {
        self.entries.get_mut(origin)
    }

    /// Get a connection for `origin`
    ///
    /// A cached entry is reused when it passes the liveness check. Otherwise
    /// a new connection is opened; the dead entry is replaced only once that
    /// succeeds, so a connect failure leaves the cache as it was.
    /// `force_fresh` skips the cached entry. Without `reuse` the new
    /// connection is returned untracked.
    pub fn acquire(
        &mut self,
        origin: &Origin,
        connector: &Connector,
        force_fresh: bool,
        reuse: bool,
    ) -> Result<Lease<'_>> {
        if reuse && !force_fresh {
            let live = self.entries.get(origin).map(CachedConnection::is_usable);
            match live {
                Some(true) => {
                    tracing::debug!(origin = %origin, "reusing cached connection");
                    return self.cached(origin);
                }
                Some(false) => {
                    tracing::debug!(origin = %origin, "cached connection is dead");
                }
                None => {}
            }
        }

        let conn = connector.connect(origin)?;

        if !reuse {
            tracing::debug!(origin = %origin, "using untracked connection");
            return Ok(Lease::Untracked(conn));
        }

        let entry = match self.entries.entry(origin.clone()) {
            Entry::Occupied(mut slot) => {
                tracing::debug!(origin = %origin, "evicting replaced connection");
                let mut old = slot.insert(conn);
                old.close();
                slot.into_mut()
            }
            Entry::Vacant(slot) => slot.insert(conn),
        };
        Ok(Lease::Cached(entry))
    }

    fn cached(&mut self, origin: &Origin) -> Result<Lease<'_>> {
        self.entries
            .get_mut(origin)
            .map(Lease::Cached)
            .ok_or_else(|| Error::Connection {
                origin: origin.to_string(),
                reason: "connection missing from cache".to_string(),
            })
    }

    /// Close and remove the entry for `origin`
    pub fn evict(&mut self, origin: &Origin) -> bool {
        match self.entries.remove(origin) {
            Some(mut conn) => {
                tracing::debug!(origin = %origin, "evicting connection");
                conn.close();
                true
            }
            None => false,
        }
    }

    /// Close every entry and empty the cache
    pub fn close_all(&mut self) {
        for (_, mut conn) in self.entries.drain() {
            conn.close();
        }
    }
}

impl Drop for ConnectionCache {
    fn drop(&mut self) {
        self.close_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use std::net::TcpListener;

    fn connector() -> Connector {
        Connector::from_config(&ClientConfig::default()).unwrap()
    }

    fn dead_origin() -> Origin {
        let port = TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        Origin::new("127.0.0.1", port)
    }

    #[test]
    fn test_empty_cache() {
        let mut cache = ConnectionCache::new();
        assert_eq!(cache.count(), 0);
        assert!(!cache.evict(&Origin::new("example.com", 443)));
        cache.close_all();
        cache.close_all();
        assert_eq!(cache.count(), 0);
    }

    #[test]
    fn test_connect_failure_leaves_cache_unchanged() {
        let mut cache = ConnectionCache::new();
        let origin = dead_origin();

        assert!(matches!(
            cache.acquire(&origin, &connector(), false, true),
            Err(Error::Connection { .. })
        ));
        assert_eq!(cache.count(), 0);
        assert!(!cache.contains(&origin));
    }
}
