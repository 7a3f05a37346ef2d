//! Change events published by the entry store

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::cache::{ArgKey, QueryId};

/// What happened to a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// A run started and the slot is pending
    Pending,
    /// A pending slot was created without starting a run
    Idle,
    /// A run settled successfully
    Success,
    /// A run settled with a failure
    Error,
    /// A value was written directly by invalidation
    Seeded,
    /// The eviction timer removed the slot
    Expired,
    /// Invalidation removed the slot ahead of a fresh run
    Invalidated,
    /// The slot was removed on request
    Evicted,
    /// The run panicked and the slot was dropped
    Abandoned,
}

impl ChangeKind {
    /// Returns true if the change removed the slot.
    pub fn is_removal(&self) -> bool {
        matches!(
            self,
            ChangeKind::Expired | ChangeKind::Invalidated | ChangeKind::Evicted | ChangeKind::Abandoned
        )
    }
}

/// One committed mutation of the cache.
#[derive(Debug, Clone, Serialize)]
pub struct CacheChange {
    /// Monotonic counter, incremented once per mutation
    pub revision: u64,
    pub query: QueryId,
    pub key: ArgKey,
    pub kind: ChangeKind,
    pub at: DateTime<Utc>,
}

impl CacheChange {
    pub fn new(revision: u64, query: QueryId, key: ArgKey, kind: ChangeKind) -> Self {
        Self {
            revision,
            query,
            key,
            kind,
            at: Utc::now(),
        }
    }
}
