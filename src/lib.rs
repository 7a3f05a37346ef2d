//! Query Cache - A per-argument result cache for async queries
//!
//! Deduplicates concurrent runs of the same query with the same arguments,
//! keeps the last settled result, evicts it after a configurable lifetime and
//! notifies a host container after every change.

pub mod cache;
pub mod config;
pub mod error;
pub mod host;
pub mod models;
mod tasks;

pub use cache::{
    ArgKey, CacheStats, InFlight, Query, QueryCache, QueryEntry, QueryId, QueryStatus, Refetch,
    Suspense,
};
pub use config::{Config, QueryConfig, QueryOptions};
pub use error::{QueryError, Result};
pub use host::{BroadcastHost, StateHost};
pub use models::{CacheChange, CacheSnapshot, ChangeKind};
