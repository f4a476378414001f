use std::time::Duration;

use crate::routing_table::MAX_BUCKET_SIZE_K;
use crate::server::database::DatabaseSettings;
use crate::server::host_filter::DEFAULT_MAX_BANNED_HOSTS;
use crate::server::load::SmoothedRequestLoad;
use crate::server::tokens::TOKEN_ROTATE_INTERVAL;

/// Default number of request handling threads.
pub const DEFAULT_WORKERS: usize = 4;

#[derive(Debug, Clone)]
/// Node Configurations
pub struct Config {
    /// Limits of the value database.
    ///
    /// Defaults to [DatabaseSettings::default]
    pub database: DatabaseSettings,
    /// How fast the request load of a key follows the lookup rate.
    ///
    /// Defaults to [SmoothedRequestLoad::default]
    pub request_load: SmoothedRequestLoad,
    /// Replication factor, also the number of contacts returned to node
    /// lookups.
    ///
    /// Defaults to [MAX_BUCKET_SIZE_K]
    pub k: usize,
    /// How often security token secrets rotate.
    ///
    /// Defaults to [TOKEN_ROTATE_INTERVAL]
    pub token_rotate_interval: Duration,
    /// Refuse to store values for keys this node is not among the `k`
    /// closest nodes to.
    ///
    /// Defaults to `false`
    pub store_requires_closest: bool,
    /// Number of request handling threads in a [crate::RequestPool].
    ///
    /// Defaults to [DEFAULT_WORKERS]
    pub workers: usize,
    /// How many banned hosts to remember.
    ///
    /// Defaults to [DEFAULT_MAX_BANNED_HOSTS]
    pub max_banned_hosts: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseSettings::default(),
            request_load: SmoothedRequestLoad::default(),
            k: MAX_BUCKET_SIZE_K,
            token_rotate_interval: TOKEN_ROTATE_INTERVAL,
            store_requires_closest: false,
            workers: DEFAULT_WORKERS,
            max_banned_hosts: DEFAULT_MAX_BANNED_HOSTS,
        }
    }
}
