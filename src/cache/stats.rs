//! Cache Statistics Module
//!
//! Tracks how reads were served and how slots moved through their lifecycle.

use serde::Serialize;

// == Cache Stats ==
/// Counters describing cache activity since creation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Reads answered by an existing entry
    pub hits: u64,
    /// Reads that found no entry
    pub misses: u64,
    /// Query runs started (first fetches and refetches)
    pub fetches: u64,
    /// Runs that settled successfully
    pub successes: u64,
    /// Runs that settled with a failure
    pub failures: u64,
    /// Entries removed by their eviction timer
    pub expirations: u64,
    /// Invalidations applied to existing entries
    pub invalidations: u64,
    /// Current number of entries in the cache
    pub total_entries: usize,
}

impl CacheStats {
    /// Creates a new CacheStats with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    // == Hit Rate ==
    /// Returns hits / (hits + misses), or 0.0 if nothing has been read yet.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    // == Record Hit ==
    /// Counts a read answered by an existing entry.
    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    // == Record Miss ==
    /// Counts a read that found no entry.
    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    // == Record Fetch ==
    /// Counts a started query run.
    pub fn record_fetch(&mut self) {
        self.fetches += 1;
    }

    // == Record Success ==
    /// Counts a run that settled with a value.
    pub fn record_success(&mut self) {
        self.successes += 1;
    }

    // == Record Failure ==
    /// Counts a run that settled with a failure.
    pub fn record_failure(&mut self) {
        self.failures += 1;
    }

    // == Record Expiration ==
    /// Counts an entry removed by its eviction timer.
    pub fn record_expiration(&mut self) {
        self.expirations += 1;
    }

    // == Record Invalidation ==
    /// Counts an invalidation of an existing entry.
    pub fn record_invalidation(&mut self) {
        self.invalidations += 1;
    }

    // == Update Entry Count ==
    /// Stores the entry count observed when the stats were read.
    pub fn set_total_entries(&mut self, count: usize) {
        self.total_entries = count;
    }
}
