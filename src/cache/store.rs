//! Entry Store Module
//!
//! Two-level mapping from query identity to argument key to cached entry.
//! Owns every mutation of cached state and publishes one change per mutation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::runtime::Handle;
use tracing::debug;

use crate::cache::entry::ErasedEntry;
use crate::cache::{ArgKey, QueryEntry, QueryId, SlotKey};
use crate::host::StateHost;
use crate::models::{CacheChange, CacheSnapshot, ChangeKind, SlotSnapshot};
use crate::tasks::TimerRegistry;

// == Record ==
/// All entries of one query, keyed by argument key.
pub(crate) struct Record {
    name: Arc<str>,
    entries: HashMap<ArgKey, Box<dyn ErasedEntry>>,
}

impl Record {
    fn new(name: Arc<str>) -> Self {
        Self {
            name,
            entries: HashMap::new(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

// == Entry Store ==
/// Cached state plus the eviction timers that belong to it.
///
/// Every call to [`set_entry`](Self::set_entry) or a successful
/// [`delete_entry`](Self::delete_entry) publishes exactly one
/// [`CacheChange`] after the new state is in place.
pub(crate) struct EntryStore {
    records: HashMap<QueryId, Record>,
    timers: TimerRegistry,
    host: Arc<dyn StateHost>,
    revision: u64,
    next_generation: u64,
}

impl EntryStore {
    // == Constructor ==
    pub(crate) fn new(host: Arc<dyn StateHost>, runtime: Handle) -> Self {
        Self {
            records: HashMap::new(),
            timers: TimerRegistry::new(runtime),
            host,
            revision: 0,
            next_generation: 0,
        }
    }

    /// Allocates the generation for a new write to a slot.
    pub(crate) fn next_generation(&mut self) -> u64 {
        self.next_generation += 1;
        self.next_generation
    }

    // == Get Or Create Record ==
    pub(crate) fn get_or_create_record(&mut self, query: QueryId, name: &Arc<str>) -> &mut Record {
        self.records
            .entry(query)
            .or_insert_with(|| Record::new(name.clone()))
    }

    // == Get Entry ==
    /// Returns a copy of the entry at the slot, if any.
    pub(crate) fn get_entry<T, E>(&self, query: QueryId, key: &ArgKey) -> Option<QueryEntry<T, E>>
    where
        T: Send + Sync + 'static,
        E: Send + Sync + 'static,
    {
        self.records
            .get(&query)?
            .entries
            .get(key)?
            .as_any()
            .downcast_ref::<QueryEntry<T, E>>()
            .cloned()
    }

    // == Set Entry ==
    /// Installs `entry` at the slot, cancelling the slot's eviction timer first.
    pub(crate) fn set_entry<T, E>(
        &mut self,
        query: QueryId,
        name: &Arc<str>,
        key: ArgKey,
        entry: QueryEntry<T, E>,
        kind: ChangeKind,
    ) where
        T: Send + Sync + 'static,
        E: Send + Sync + 'static,
    {
        self.timers.disarm(&SlotKey::new(query, key.clone()));

        debug!(
            query = %name,
            key = %key,
            generation = entry.generation(),
            status = ?entry.status(),
            "Cache entry updated"
        );
        self.get_or_create_record(query, name)
            .entries
            .insert(key.clone(), Box::new(entry));
        self.publish(query, key, kind);
    }

    // == Delete Entry ==
    /// Removes the slot and cancels its timer. Publishes nothing and returns
    /// false if the slot was already empty.
    pub(crate) fn delete_entry(&mut self, query: QueryId, key: &ArgKey, kind: ChangeKind) -> bool {
        self.timers.disarm(&SlotKey::new(query, key.clone()));

        let Some(record) = self.records.get_mut(&query) else {
            return false;
        };
        if record.entries.remove(key).is_none() {
            return false;
        }

        debug!(query = %record.name, key = %key, kind = ?kind, "Cache entry removed");
        if record.entries.is_empty() {
            self.records.remove(&query);
        }
        self.publish(query, key.clone(), kind);
        true
    }

    // == Timers ==
    pub(crate) fn arm_timer<F>(&mut self, slot: SlotKey, generation: u64, delay: Duration, on_fire: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.timers.arm(slot, generation, delay, on_fire);
    }

    pub(crate) fn release_timer(&mut self, slot: &SlotKey, generation: u64) -> bool {
        self.timers.release(slot, generation)
    }

    #[cfg(test)]
    pub(crate) fn timers(&self) -> &TimerRegistry {
        &self.timers
    }

    // == Snapshot ==
    pub(crate) fn snapshot(&self) -> CacheSnapshot {
        let mut slots: Vec<SlotSnapshot> = self
            .records
            .iter()
            .flat_map(|(query, record)| {
                record.entries.iter().map(move |(key, entry)| SlotSnapshot {
                    query: *query,
                    name: record.name.to_string(),
                    key: key.clone(),
                    status: entry.status(),
                    loading: entry.is_loading(),
                    updated_at: entry.updated_at(),
                })
            })
            .collect();
        slots.sort_by(|a, b| (a.query, &a.key).cmp(&(b.query, &b.key)));

        CacheSnapshot {
            revision: self.revision,
            taken_at: Utc::now(),
            slots,
        }
    }

    // == Length ==
    /// Returns the total number of entries across all queries.
    pub(crate) fn len(&self) -> usize {
        self.records.values().map(Record::len).sum()
    }

    pub(crate) fn revision(&self) -> u64 {
        self.revision
    }

    fn publish(&mut self, query: QueryId, key: ArgKey, kind: ChangeKind) {
        self.revision += 1;
        self.host
            .publish(&CacheChange::new(self.revision, query, key, kind));
    }
}
