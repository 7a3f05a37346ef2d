//! Fetch Orchestrator
//!
//! Runs query functions and walks their slots through
//! pending → success | error → expired. All functions here expect the caller
//! to hold the cache state lock and never await while holding it.

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Weak};

use futures::FutureExt;
use tracing::{debug, error};

use crate::cache::client::{CacheInner, CacheState};
use crate::cache::entry::{InFlight, Refetch};
use crate::cache::{ArgKey, Query, QueryEntry, SlotKey};
use crate::config::QueryConfig;
use crate::error::QueryError;
use crate::models::ChangeKind;

type Outcome<T, E> = std::thread::Result<Result<T, E>>;

// == Run ==
/// Starts one run of `query` on the slot `(query, key)` and installs the
/// pending entry. Any previous entry at the slot is replaced and its timer
/// cancelled; its run, if still going, is discarded when it settles.
pub(crate) fn run<A, T, E>(
    inner: &Arc<CacheInner>,
    state: &mut CacheState,
    query: &Query<A, T, E>,
    args: A,
    key: ArgKey,
    config: QueryConfig,
    stale: Option<Arc<T>>,
) -> (QueryEntry<T, E>, InFlight)
where
    A: Clone + Send + Sync + 'static,
    T: Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    let generation = state.store.next_generation();
    let weak = Arc::downgrade(inner);
    let refetch = refetch_capability(&weak, query, &args, &key, config);

    // Query function runs inside the task, outside the state lock
    let task = {
        let query = query.clone();
        let key = key.clone();
        inner.runtime.spawn(async move {
            let outcome = AssertUnwindSafe(async { query.call(args.clone()).await })
                .catch_unwind()
                .await;
            let abandoned = outcome.is_err();
            settle(&weak, &query, args, key, generation, config, outcome);
            abandoned
        })
    };
    let in_flight = InFlight::from_task(task);

    debug!(query = %query.name(), key = %key, generation, "Starting query run");
    let entry = QueryEntry::pending(in_flight.clone(), refetch, config, generation, stale);
    state.store.set_entry(
        query.id(),
        &query.shared_name(),
        key,
        entry.clone(),
        ChangeKind::Pending,
    );
    state.stats.record_fetch();

    (entry, in_flight)
}

// == Park ==
/// Installs an idle pending entry without invoking the query. Its refetch
/// capability starts the first run.
pub(crate) fn park<A, T, E>(
    inner: &Arc<CacheInner>,
    state: &mut CacheState,
    query: &Query<A, T, E>,
    args: A,
    key: ArgKey,
    config: QueryConfig,
) -> QueryEntry<T, E>
where
    A: Clone + Send + Sync + 'static,
    T: Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    let generation = state.store.next_generation();
    let refetch = refetch_capability(&Arc::downgrade(inner), query, &args, &key, config);
    let entry = QueryEntry::idle(refetch, config, generation);

    state.store.set_entry(
        query.id(),
        &query.shared_name(),
        key,
        entry.clone(),
        ChangeKind::Idle,
    );
    entry
}

// == Stale Carry ==
/// Value to keep exposing while the slot refetches, if `stale` is enabled.
pub(crate) fn carry_stale<A, T, E>(
    state: &CacheState,
    query: &Query<A, T, E>,
    key: &ArgKey,
    config: QueryConfig,
) -> Option<Arc<T>>
where
    T: Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    if !config.stale {
        return None;
    }
    let current = state.store.get_entry::<T, E>(query.id(), key)?;
    current.value().or_else(|| current.stale_value())
}

// == Schedule Expiry ==
/// Arms the eviction timer of a settled slot.
pub(crate) fn schedule_expiry<A, T, E>(
    inner: &Arc<CacheInner>,
    state: &mut CacheState,
    query: &Query<A, T, E>,
    args: A,
    key: ArgKey,
    generation: u64,
    config: QueryConfig,
) where
    A: Clone + Send + Sync + 'static,
    T: Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    if !config.expires() {
        return;
    }

    let weak = Arc::downgrade(inner);
    let slot = SlotKey::new(query.id(), key.clone());
    let query = query.clone();
    state
        .store
        .arm_timer(slot, generation, config.lifetime, move || {
            expire(&weak, &query, args, key, generation, config);
        });
}

fn refetch_capability<A, T, E>(
    weak: &Weak<CacheInner>,
    query: &Query<A, T, E>,
    args: &A,
    key: &ArgKey,
    config: QueryConfig,
) -> Refetch
where
    A: Clone + Send + Sync + 'static,
    T: Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    let weak = weak.clone();
    let query = query.clone();
    let args = args.clone();
    let key = key.clone();

    Refetch::new(move || {
        let inner = weak.upgrade().ok_or(QueryError::CacheDropped)?;
        let mut state = inner.state.lock();
        let stale = carry_stale(&state, &query, &key, config);
        let (_, in_flight) = run(
            &inner,
            &mut state,
            &query,
            args.clone(),
            key.clone(),
            config,
            stale,
        );
        Ok(in_flight)
    })
}

// == Settle ==
fn settle<A, T, E>(
    weak: &Weak<CacheInner>,
    query: &Query<A, T, E>,
    args: A,
    key: ArgKey,
    generation: u64,
    config: QueryConfig,
    outcome: Outcome<T, E>,
) where
    A: Clone + Send + Sync + 'static,
    T: Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    let Some(inner) = weak.upgrade() else {
        return;
    };
    let mut state = inner.state.lock();

    let current = state
        .store
        .get_entry::<T, E>(query.id(), &key)
        .filter(|entry| entry.generation() == generation);
    let Some(current) = current else {
        debug!(
            query = %query.name(),
            key = %key,
            generation,
            "Discarding result of superseded query run"
        );
        return;
    };

    let (entry, kind) = match outcome {
        Ok(Ok(value)) => {
            state.stats.record_success();
            (current.succeed(Arc::new(value)), ChangeKind::Success)
        }
        Ok(Err(failure)) => {
            state.stats.record_failure();
            (current.fail(Arc::new(failure)), ChangeKind::Error)
        }
        Err(_) => {
            error!(
                query = %query.name(),
                key = %key,
                "Query run panicked, dropping its cache entry"
            );
            state.store.delete_entry(query.id(), &key, ChangeKind::Abandoned);
            return;
        }
    };

    state
        .store
        .set_entry(query.id(), &query.shared_name(), key.clone(), entry, kind);
    schedule_expiry(&inner, &mut state, query, args, key, generation, config);
}

// == Expire ==
fn expire<A, T, E>(
    weak: &Weak<CacheInner>,
    query: &Query<A, T, E>,
    args: A,
    key: ArgKey,
    generation: u64,
    config: QueryConfig,
) where
    A: Clone + Send + Sync + 'static,
    T: Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    let Some(inner) = weak.upgrade() else {
        return;
    };
    let mut state = inner.state.lock();

    let slot = SlotKey::new(query.id(), key.clone());
    if !state.store.release_timer(&slot, generation) {
        // Slot was replaced after this timer fired
        return;
    }

    let stale = carry_stale(&state, query, &key, config);
    if !state.store.delete_entry(query.id(), &key, ChangeKind::Expired) {
        return;
    }
    state.stats.record_expiration();
    debug!(query = %query.name(), key = %key, "Cache entry expired");

    if config.refetch_on_expiry {
        run(&inner, &mut state, query, args, key, config, stale);
    }
}
