#![doc = include_str!("../README.md")]

// Public modules
mod common;

pub mod config;
mod error;
pub mod pool;
pub mod routing_table;
pub mod server;
pub mod stats;
pub mod transport;

pub use crate::common::*;
pub use bytes::Bytes;
pub use config::Config;
pub use error::{Error, Result};
pub use pool::RequestPool;
pub use routing_table::{RoutingTable, RoutingView};
pub use server::database::{DatabaseSettings, StoreError, ValueBag, ValueDatabase};
pub use server::dispatcher::MessageDispatcher;
pub use server::Context;
pub use stats::{Counter, NetworkStats, StatsCollector};
pub use transport::{ChannelTransport, Transport};
