//! Cache Module
//!
//! Per-argument caching of async query results with in-flight deduplication
//! and timed eviction.

mod client;
mod entry;
mod fetch;
mod key;
mod query;
mod stats;
mod store;


// Re-export public types
pub use client::QueryCache;
pub use entry::{InFlight, QueryEntry, QueryStatus, Refetch, Suspense};
pub use key::{ArgKey, SlotKey};
pub use query::{Query, QueryId};
pub use stats::CacheStats;
