//! Query Cache Client
//!
//! The public face of the cache: non-blocking and suspending reads, manual
//! refetch, and invalidation.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tracing::{debug, trace};

use crate::cache::entry::{InFlight, Suspense};
use crate::cache::store::EntryStore;
use crate::cache::{fetch, ArgKey, CacheStats, Query, QueryEntry};
use crate::config::{self, Config, QueryConfig, QueryOptions};
use crate::error::{QueryError, Result};
use crate::host::{BroadcastHost, StateHost};
use crate::models::{CacheChange, CacheSnapshot, ChangeKind};

/// Mutable cache state, guarded by one lock.
pub(crate) struct CacheState {
    pub(crate) store: EntryStore,
    pub(crate) stats: CacheStats,
}

pub(crate) struct CacheInner {
    pub(crate) state: Mutex<CacheState>,
    pub(crate) runtime: Handle,
    pub(crate) defaults: QueryOptions,
}

// == Query Cache ==
/// Per-argument result cache for asynchronous queries.
///
/// Cloning is cheap; clones share the same entries. Query runs and eviction
/// timers are spawned on the tokio runtime the cache was created on.
///
/// ```rust
/// # use query_cache::{Query, QueryCache, QueryOptions};
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> query_cache::Result<()> {
/// let cache = QueryCache::new(QueryOptions::new())?;
/// let double = Query::new(|(n,): (u32,)| async move { Ok::<_, String>(n * 2) });
///
/// let first = cache.query(&double, (15,))?;
/// assert!(first.is_loading());
///
/// let value = cache.fetch(&double, (15,)).await?;
/// assert_eq!(value.as_deref(), Ok(&30));
/// # Ok(())
/// # }
/// ```
pub struct QueryCache<H = BroadcastHost> {
    inner: Arc<CacheInner>,
    host: Arc<H>,
}

impl<H> Clone for QueryCache<H> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            host: self.host.clone(),
        }
    }
}

impl QueryCache<BroadcastHost> {
    // == Constructors ==
    /// Creates a cache on the current tokio runtime, publishing changes to a
    /// [`BroadcastHost`].
    pub fn new(defaults: QueryOptions) -> Result<Self> {
        Ok(Self::with_host(
            defaults,
            BroadcastHost::default(),
            Handle::try_current()?,
        ))
    }

    /// Creates a cache from cache-level configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::with_host(
            config.defaults,
            BroadcastHost::new(config.notify_capacity),
            Handle::try_current()?,
        ))
    }

    /// Subscribes to change notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<CacheChange> {
        self.host.subscribe()
    }
}

impl<H: StateHost> QueryCache<H> {
    /// Creates a cache publishing to `host` and spawning on `runtime`.
    pub fn with_host(defaults: QueryOptions, host: H, runtime: Handle) -> Self {
        let host = Arc::new(host);
        let store = EntryStore::new(host.clone(), runtime.clone());
        Self {
            inner: Arc::new(CacheInner {
                state: Mutex::new(CacheState {
                    store,
                    stats: CacheStats::new(),
                }),
                runtime,
                defaults,
            }),
            host,
        }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    /// Options applied when a call does not override them.
    pub fn defaults(&self) -> &QueryOptions {
        &self.inner.defaults
    }

    fn resolve(&self, options: &QueryOptions) -> QueryConfig {
        config::resolve(&self.inner.defaults, options)
    }

    // == Query ==
    /// Non-blocking read with the cache defaults. See [`query_with`](Self::query_with).
    pub fn query<A, T, E>(&self, query: &Query<A, T, E>, args: A) -> Result<QueryEntry<T, E>>
    where
        A: Serialize + Clone + Send + Sync + 'static,
        T: Send + Sync + 'static,
        E: Send + Sync + 'static,
    {
        self.query_with(query, args, &QueryOptions::default())
    }

    /// Returns the entry for `args` as it currently is.
    ///
    /// A missing entry is created: with `autofetch` a run starts and the
    /// fresh pending entry is returned; without it the entry is idle until
    /// its [`refetch`](QueryEntry::refetch) is called. Readers arriving while
    /// a run is pending share it.
    pub fn query_with<A, T, E>(
        &self,
        query: &Query<A, T, E>,
        args: A,
        options: &QueryOptions,
    ) -> Result<QueryEntry<T, E>>
    where
        A: Serialize + Clone + Send + Sync + 'static,
        T: Send + Sync + 'static,
        E: Send + Sync + 'static,
    {
        let key = ArgKey::encode(&args)?;
        let config = self.resolve(options);

        let mut state = self.inner.state.lock();
        let state = &mut *state;
        state
            .store
            .get_or_create_record(query.id(), &query.shared_name());

        if let Some(entry) = state.store.get_entry::<T, E>(query.id(), &key) {
            trace!(query = %query.name(), key = %key, "Cache hit");
            state.stats.record_hit();
            return Ok(entry);
        }
        state.stats.record_miss();

        let entry = if config.autofetch {
            fetch::run(&self.inner, state, query, args, key, config, None).0
        } else {
            fetch::park(&self.inner, state, query, args, key, config)
        };
        Ok(entry)
    }

    // == Suspense Query ==
    /// Suspending read with the cache defaults. See
    /// [`suspense_query_with`](Self::suspense_query_with).
    pub fn suspense_query<A, T, E>(&self, query: &Query<A, T, E>, args: A) -> Result<Suspense<T, E>>
    where
        A: Serialize + Clone + Send + Sync + 'static,
        T: Send + Sync + 'static,
        E: Send + Sync + 'static,
    {
        self.suspense_query_with(query, args, &QueryOptions::default())
    }

    /// Returns the settled value or failure, or the handle of the pending run.
    ///
    /// After a `Pending` handle completes, calling again yields the settled
    /// outcome. A slot that is missing or idle gets its run started here,
    /// whatever `autofetch` says, since waiting on it could never finish.
    pub fn suspense_query_with<A, T, E>(
        &self,
        query: &Query<A, T, E>,
        args: A,
        options: &QueryOptions,
    ) -> Result<Suspense<T, E>>
    where
        A: Serialize + Clone + Send + Sync + 'static,
        T: Send + Sync + 'static,
        E: Send + Sync + 'static,
    {
        let key = ArgKey::encode(&args)?;

        let mut state = self.inner.state.lock();
        let state = &mut *state;
        state
            .store
            .get_or_create_record(query.id(), &query.shared_name());

        let entry = match state.store.get_entry::<T, E>(query.id(), &key) {
            Some(entry) if !entry.is_idle() => {
                state.stats.record_hit();
                entry
            }
            Some(idle) => {
                debug!(query = %query.name(), key = %key, "Starting idle entry for suspending read");
                state.stats.record_hit();
                let config = *idle.config();
                fetch::run(&self.inner, state, query, args, key, config, None).0
            }
            None => {
                state.stats.record_miss();
                let config = self.resolve(options);
                fetch::run(&self.inner, state, query, args, key, config, None).0
            }
        };
        Ok(entry.into_suspense())
    }

    // == Fetch ==
    /// Awaits the settled outcome with the cache defaults. See
    /// [`fetch_with`](Self::fetch_with).
    pub async fn fetch<A, T, E>(
        &self,
        query: &Query<A, T, E>,
        args: A,
    ) -> Result<std::result::Result<Arc<T>, Arc<E>>>
    where
        A: Serialize + Clone + Send + Sync + 'static,
        T: Send + Sync + 'static,
        E: Send + Sync + 'static,
    {
        self.fetch_with(query, args, &QueryOptions::default()).await
    }

    /// Drives [`suspense_query_with`](Self::suspense_query_with) until the slot
    /// settles. The outer error is a cache error; the inner result is the
    /// query's own outcome.
    ///
    /// Fails with [`QueryError::Abandoned`] if the awaited run panicked. The
    /// query is not invoked again on the caller's behalf.
    pub async fn fetch_with<A, T, E>(
        &self,
        query: &Query<A, T, E>,
        args: A,
        options: &QueryOptions,
    ) -> Result<std::result::Result<Arc<T>, Arc<E>>>
    where
        A: Serialize + Clone + Send + Sync + 'static,
        T: Send + Sync + 'static,
        E: Send + Sync + 'static,
    {
        loop {
            match self.suspense_query_with(query, args.clone(), options)? {
                Suspense::Ready(value) => return Ok(Ok(value)),
                Suspense::Failed(failure) => return Ok(Err(failure)),
                Suspense::Pending(in_flight) => {
                    in_flight.clone().await;
                    if in_flight.abandoned() {
                        return Err(QueryError::Abandoned {
                            query: query.id(),
                            key: ArgKey::encode(&args)?,
                        });
                    }
                }
            }
        }
    }

    // == Refetch ==
    /// Re-runs the query for an existing entry, replacing its state.
    ///
    /// Fails with [`QueryError::NotFound`] if there is no entry for `args`.
    pub fn refetch<A, T, E>(&self, query: &Query<A, T, E>, args: &A) -> Result<InFlight>
    where
        A: Serialize,
        T: Send + Sync + 'static,
        E: Send + Sync + 'static,
    {
        let key = ArgKey::encode(args)?;
        let entry = self
            .inner
            .state
            .lock()
            .store
            .get_entry::<T, E>(query.id(), &key);

        match entry {
            Some(entry) => entry.refetch(),
            None => Err(QueryError::NotFound {
                query: query.id(),
                key,
            }),
        }
    }

    // == Invalidate ==
    /// Replaces an existing entry.
    ///
    /// With `value`, the entry becomes a success holding it and no query runs.
    /// Without, the entry is removed and a fresh run starts immediately.
    /// Does nothing if there is no entry for `args`.
    pub fn invalidate<A, T, E>(&self, query: &Query<A, T, E>, args: A, value: Option<T>) -> Result<()>
    where
        A: Serialize + Clone + Send + Sync + 'static,
        T: Send + Sync + 'static,
        E: Send + Sync + 'static,
    {
        let key = ArgKey::encode(&args)?;

        let mut state = self.inner.state.lock();
        let state = &mut *state;
        let Some(current) = state.store.get_entry::<T, E>(query.id(), &key) else {
            debug!(query = %query.name(), key = %key, "Nothing to invalidate");
            return Ok(());
        };
        let config = *current.config();
        state.stats.record_invalidation();

        match value {
            Some(value) => {
                let generation = state.store.next_generation();
                let seeded = current.seed(Arc::new(value), generation);
                state.store.set_entry(
                    query.id(),
                    &query.shared_name(),
                    key.clone(),
                    seeded,
                    ChangeKind::Seeded,
                );
                fetch::schedule_expiry(&self.inner, state, query, args, key, generation, config);
            }
            None => {
                state
                    .store
                    .delete_entry(query.id(), &key, ChangeKind::Invalidated);
                let config = QueryConfig {
                    autofetch: true,
                    ..config
                };
                fetch::run(&self.inner, state, query, args, key, config, None);
            }
        }
        Ok(())
    }

    // == Evict ==
    /// Removes the entry for `args` without refetching. Returns true if an
    /// entry was removed.
    pub fn evict<A, T, E>(&self, query: &Query<A, T, E>, args: &A) -> Result<bool>
    where
        A: Serialize,
    {
        let key = ArgKey::encode(args)?;
        Ok(self
            .inner
            .state
            .lock()
            .store
            .delete_entry(query.id(), &key, ChangeKind::Evicted))
    }

    // == Peek ==
    /// Returns the entry for `args` without creating it or starting a run.
    pub fn peek<A, T, E>(&self, query: &Query<A, T, E>, args: &A) -> Result<Option<QueryEntry<T, E>>>
    where
        A: Serialize,
        T: Send + Sync + 'static,
        E: Send + Sync + 'static,
    {
        let key = ArgKey::encode(args)?;
        Ok(self.inner.state.lock().store.get_entry(query.id(), &key))
    }

    // == Inspection ==
    pub fn snapshot(&self) -> CacheSnapshot {
        self.inner.state.lock().store.snapshot()
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.inner.state.lock();
        let mut stats = state.stats.clone();
        stats.set_total_entries(state.store.len());
        stats
    }

    /// Number of changes published so far.
    pub fn revision(&self) -> u64 {
        self.inner.state.lock().store.revision()
    }

    /// Returns the number of entries across all queries.
    pub fn len(&self) -> usize {
        self.inner.state.lock().store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<H> std::fmt::Debug for QueryCache<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryCache")
            .field("defaults", &self.inner.defaults)
            .finish_non_exhaustive()
    }
}
