//! Hosts we refuse to talk to.

use std::{
    fmt::Debug,
    net::{IpAddr, SocketAddr},
    num::NonZeroUsize,
    sync::{Mutex, PoisonError},
};

use lru::LruCache;
use tracing::debug;

/// Decides which hosts may send us requests, and records bans.
pub trait HostFilter: Debug + Send + Sync {
    /// Returns `true` if requests from `address` should be handled.
    fn allow(&self, address: &SocketAddr) -> bool;

    /// Stop handling requests from the host at `address`.
    fn ban(&self, address: &SocketAddr);
}

/// Default number of banned hosts remembered by a [BanList].
pub const DEFAULT_MAX_BANNED_HOSTS: usize = 1024;

#[derive(Debug)]
/// [HostFilter] banning by IP, forgetting the least recently banned hosts
/// once full.
pub struct BanList {
    banned: Mutex<LruCache<IpAddr, ()>>,
}

impl BanList {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);

        BanList {
            banned: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn is_banned(&self, ip: &IpAddr) -> bool {
        self.banned
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(ip)
    }

    pub fn len(&self) -> usize {
        self.banned
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for BanList {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_BANNED_HOSTS)
    }
}

impl HostFilter for BanList {
    fn allow(&self, address: &SocketAddr) -> bool {
        !self.is_banned(&address.ip())
    }

    fn ban(&self, address: &SocketAddr) {
        debug!(ip = ?address.ip(), "Banning host");

        self.banned
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .put(address.ip(), ());
    }
}
