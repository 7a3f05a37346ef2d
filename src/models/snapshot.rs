//! Point-in-time view of the cache contents

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::cache::{ArgKey, QueryId, QueryStatus};

/// State of a single slot at snapshot time.
#[derive(Debug, Clone, Serialize)]
pub struct SlotSnapshot {
    pub query: QueryId,
    pub name: String,
    pub key: ArgKey,
    pub status: QueryStatus,
    pub loading: bool,
    pub updated_at: DateTime<Utc>,
}

/// Every slot in the cache, ordered by query then key.
#[derive(Debug, Clone, Serialize)]
pub struct CacheSnapshot {
    /// Revision of the last mutation included in this snapshot
    pub revision: u64,
    pub taken_at: DateTime<Utc>,
    pub slots: Vec<SlotSnapshot>,
}

impl CacheSnapshot {
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Counts slots currently in the given status.
    pub fn count(&self, status: QueryStatus) -> usize {
        self.slots.iter().filter(|slot| slot.status == status).count()
    }
}
