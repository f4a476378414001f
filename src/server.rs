//! Handling of incoming requests, and the values this node stores.

pub mod database;
pub mod dispatcher;
mod find_node;
mod find_value;
pub mod host_filter;
pub mod load;
mod ping;
mod store;
pub mod tokens;

use std::{
    fmt::Debug,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use crate::common::{Contact, ResponseSpecific};
use crate::config::Config;
use crate::routing_table::RoutingView;
use crate::stats::{NetworkStats, StatsCollector};

use database::ValueDatabase;
use host_filter::{BanList, HostFilter};
use load::RequestLoadPolicy;
use tokens::SecurityTokens;

pub use find_node::{FindNodeRequestHandler, NodeLookupResponder};
pub use find_value::FindValueRequestHandler;
pub use ping::PingRequestHandler;
pub use store::StoreRequestHandler;

/// Handles one kind of request.
pub trait RequestHandler: Debug + Send + Sync {
    type Arguments;

    /// Handle a request from `requester`.
    ///
    /// Returns the response to send back, or `None` to drop the request
    /// silently.
    ///
    /// Handlers never wait on remote peers.
    fn handle_request(
        &self,
        requester: &Contact,
        arguments: Self::Arguments,
    ) -> Option<ResponseSpecific>;
}

#[derive(Debug)]
/// State shared by all request handlers of a node.
pub struct Context {
    pub config: Config,
    pub routing: Arc<dyn RoutingView>,
    pub database: ValueDatabase,
    pub tokens: SecurityTokens,
    pub host_filter: Arc<dyn HostFilter>,
    pub stats: Arc<dyn StatsCollector>,
    bootstrapping: AtomicBool,
}

impl Context {
    pub fn new(config: Config, routing: Arc<dyn RoutingView>) -> Self {
        let host_filter: Arc<dyn HostFilter> = Arc::new(BanList::new(config.max_banned_hosts));

        let database = ValueDatabase::new(config.database)
            .with_host_filter(host_filter.clone())
            .with_request_load_policy(Arc::new(config.request_load));

        Context {
            tokens: SecurityTokens::new(config.token_rotate_interval),
            config,
            routing,
            database,
            host_filter,
            stats: Arc::new(NetworkStats::new()),
            bootstrapping: AtomicBool::new(false),
        }
    }

    pub fn with_stats(mut self, stats: Arc<dyn StatsCollector>) -> Self {
        self.stats = stats;
        self
    }

    pub fn with_host_filter(mut self, host_filter: Arc<dyn HostFilter>) -> Self {
        self.database = self.database.with_host_filter(host_filter.clone());
        self.host_filter = host_filter;
        self
    }

    pub fn with_request_load_policy(mut self, policy: Arc<dyn RequestLoadPolicy>) -> Self {
        self.database = self.database.with_request_load_policy(policy);
        self
    }

    // === Getters ===

    pub fn local_contact(&self) -> Contact {
        self.routing.local_contact()
    }

    /// Returns `true` while the node is joining the network.
    pub fn is_bootstrapping(&self) -> bool {
        self.bootstrapping.load(Ordering::Acquire)
    }

    // === Public Methods ===

    pub fn set_bootstrapping(&self, bootstrapping: bool) {
        self.bootstrapping.store(bootstrapping, Ordering::Release);
    }
}
