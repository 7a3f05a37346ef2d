//! Error types for the query cache
//!
//! Provides unified error handling using thiserror. Failures of the query
//! functions themselves are not represented here: they are stored in the
//! cache entry and handed back to readers verbatim.

use thiserror::Error;

use crate::cache::{ArgKey, QueryId};

// == Query Error Enum ==
/// Unified error type for cache operations.
#[derive(Error, Debug)]
pub enum QueryError {
    /// No entry exists for the query and arguments
    #[error("No cache entry for query {query} with arguments {key}")]
    NotFound { query: QueryId, key: ArgKey },

    /// Arguments could not be turned into a cache key
    #[error("Failed to encode query arguments: {0}")]
    KeyEncoding(#[from] serde_json::Error),

    /// The awaited query run panicked before producing an outcome
    #[error("Query {query} was abandoned for arguments {key} without a result")]
    Abandoned { query: QueryId, key: ArgKey },

    /// A refetch capability outlived the cache that issued it
    #[error("Query cache has been dropped")]
    CacheDropped,

    /// The cache was created outside of a tokio runtime
    #[error("No tokio runtime available: {0}")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),
}

// == Result Type Alias ==
/// Convenience Result type for cache operations.
pub type Result<T> = std::result::Result<T, QueryError>;
