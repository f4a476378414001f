//! Diagnostic counters of request handling.

use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};

const COUNTERS: usize = 13;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Counter {
    PingRequests,
    /// Pings ignored while bootstrapping.
    PingsIgnored,
    FindNodeRequests,
    FindValueRequests,
    /// Lookups answered with contacts because nothing matched.
    FindValueMisses,
    StoreRequests,
    /// Store requests without a security token.
    StoreMissingToken,
    /// Store requests with a token not matching the sender's address.
    StoreBadToken,
    StoredValues,
    RejectedValues,
    /// Requests from banned hosts.
    FilteredRequests,
    /// Requests whose handler panicked.
    HandlerFailures,
    /// Responses the transport refused.
    SendFailures,
}

impl Counter {
    pub const ALL: [Counter; COUNTERS] = [
        Counter::PingRequests,
        Counter::PingsIgnored,
        Counter::FindNodeRequests,
        Counter::FindValueRequests,
        Counter::FindValueMisses,
        Counter::StoreRequests,
        Counter::StoreMissingToken,
        Counter::StoreBadToken,
        Counter::StoredValues,
        Counter::RejectedValues,
        Counter::FilteredRequests,
        Counter::HandlerFailures,
        Counter::SendFailures,
    ];

    fn index(&self) -> usize {
        *self as usize
    }
}

/// Receives counter increments from request handlers.
pub trait StatsCollector: Debug + Send + Sync {
    fn increment(&self, counter: Counter);
}

#[derive(Debug, Default)]
/// In memory [StatsCollector], one atomic per [Counter].
pub struct NetworkStats {
    counters: [AtomicU64; COUNTERS],
}

impl NetworkStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, counter: Counter) -> u64 {
        self.counters[counter.index()].load(Ordering::Relaxed)
    }

    /// Current value of every counter.
    pub fn snapshot(&self) -> Vec<(Counter, u64)> {
        Counter::ALL
            .iter()
            .map(|counter| (*counter, self.get(*counter)))
            .collect()
    }
}

impl StatsCollector for NetworkStats {
    fn increment(&self, counter: Counter) {
        self.counters[counter.index()].fetch_add(1, Ordering::Relaxed);
    }
}
