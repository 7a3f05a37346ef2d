//! Cache Entry Module
//!
//! Defines the cached state of one query slot and the handles readers use to
//! wait for it or re-run it.

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use chrono::{DateTime, Utc};
use futures::future::{self, BoxFuture, Shared};
use futures::FutureExt;
use serde::Serialize;
use tokio::task::JoinHandle;

use crate::config::QueryConfig;
use crate::error::Result;

// == Query Status ==
/// Lifecycle position of an entry. Exactly one applies at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryStatus {
    Pending,
    Success,
    Error,
}

// == In-Flight Handle ==
/// Cloneable handle on one run of a query. Resolves once that run has written
/// its outcome into the cache (or was discarded), so awaiting it and reading
/// the slot again never starts a second invocation.
#[derive(Clone)]
pub struct InFlight {
    inner: Shared<BoxFuture<'static, bool>>,
}

impl InFlight {
    /// Wraps the task of one run. The task yields true if the run was
    /// abandoned without producing an outcome.
    pub(crate) fn from_task(task: JoinHandle<bool>) -> Self {
        Self {
            inner: task.map(|joined| joined.unwrap_or(true)).boxed().shared(),
        }
    }

    /// A handle that is already complete.
    pub fn settled() -> Self {
        Self {
            inner: future::ready(false).boxed().shared(),
        }
    }

    /// True once the run has finished without an outcome, because the query
    /// panicked or its task was cancelled. False while it is still running.
    pub fn abandoned(&self) -> bool {
        self.inner.peek().copied().unwrap_or(false)
    }
}

impl Future for InFlight {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        self.inner.poll_unpin(cx).map(|_| ())
    }
}

impl fmt::Debug for InFlight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InFlight").finish_non_exhaustive()
    }
}

// == Refetch Capability ==
/// Re-runs the query that produced an entry, with the same arguments, on the
/// same slot.
#[derive(Clone)]
pub struct Refetch(Arc<dyn Fn() -> Result<InFlight> + Send + Sync>);

impl Refetch {
    pub(crate) fn new<F>(run: F) -> Self
    where
        F: Fn() -> Result<InFlight> + Send + Sync + 'static,
    {
        Self(Arc::new(run))
    }

    /// Starts a new run and returns its handle.
    ///
    /// Must not be called from inside a [`StateHost`](crate::StateHost)
    /// callback.
    pub fn run(&self) -> Result<InFlight> {
        (self.0)()
    }
}

impl fmt::Debug for Refetch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Refetch").finish_non_exhaustive()
    }
}

// == Suspense ==
/// Outcome of a suspending read.
#[derive(Debug)]
pub enum Suspense<T, E> {
    /// The query succeeded with this value
    Ready(Arc<T>),
    /// The query is still running; await the handle and read again
    Pending(InFlight),
    /// The query failed with this value
    Failed(Arc<E>),
}

enum EntryState<T, E> {
    Pending { stale: Option<Arc<T>> },
    Success(Arc<T>),
    Error(Arc<E>),
}

impl<T, E> Clone for EntryState<T, E> {
    fn clone(&self) -> Self {
        match self {
            Self::Pending { stale } => Self::Pending {
                stale: stale.clone(),
            },
            Self::Success(value) => Self::Success(value.clone()),
            Self::Error(failure) => Self::Error(failure.clone()),
        }
    }
}

// == Query Entry ==
/// Cached state for one (query, arguments) pair.
pub struct QueryEntry<T, E> {
    state: EntryState<T, E>,
    in_flight: Option<InFlight>,
    refetch: Refetch,
    config: QueryConfig,
    generation: u64,
    updated_at: DateTime<Utc>,
}

impl<T, E> QueryEntry<T, E> {
    // == Constructors ==
    pub(crate) fn pending(
        in_flight: InFlight,
        refetch: Refetch,
        config: QueryConfig,
        generation: u64,
        stale: Option<Arc<T>>,
    ) -> Self {
        Self {
            state: EntryState::Pending { stale },
            in_flight: Some(in_flight),
            refetch,
            config,
            generation,
            updated_at: Utc::now(),
        }
    }

    /// Pending entry with no run behind it; only `refetch` moves it forward.
    pub(crate) fn idle(refetch: Refetch, config: QueryConfig, generation: u64) -> Self {
        Self {
            state: EntryState::Pending { stale: None },
            in_flight: None,
            refetch,
            config,
            generation,
            updated_at: Utc::now(),
        }
    }

    // == Transitions ==
    pub(crate) fn succeed(self, value: Arc<T>) -> Self {
        Self {
            state: EntryState::Success(value),
            updated_at: Utc::now(),
            ..self
        }
    }

    pub(crate) fn fail(self, failure: Arc<E>) -> Self {
        Self {
            state: EntryState::Error(failure),
            updated_at: Utc::now(),
            ..self
        }
    }

    /// Replaces the state with an externally supplied value under a new generation.
    pub(crate) fn seed(self, value: Arc<T>, generation: u64) -> Self {
        Self {
            state: EntryState::Success(value),
            generation,
            updated_at: Utc::now(),
            ..self
        }
    }

    // == Accessors ==
    pub fn status(&self) -> QueryStatus {
        match self.state {
            EntryState::Pending { .. } => QueryStatus::Pending,
            EntryState::Success(_) => QueryStatus::Success,
            EntryState::Error(_) => QueryStatus::Error,
        }
    }

    /// True while a run is in flight for this entry.
    pub fn is_loading(&self) -> bool {
        matches!(self.state, EntryState::Pending { .. }) && self.in_flight.is_some()
    }

    /// True for a pending entry that was created without starting a run.
    pub fn is_idle(&self) -> bool {
        matches!(self.state, EntryState::Pending { .. }) && self.in_flight.is_none()
    }

    pub fn is_success(&self) -> bool {
        matches!(self.state, EntryState::Success(_))
    }

    pub fn is_error(&self) -> bool {
        matches!(self.state, EntryState::Error(_))
    }

    /// The resolved value; only present on success.
    pub fn value(&self) -> Option<Arc<T>> {
        match &self.state {
            EntryState::Success(value) => Some(value.clone()),
            _ => None,
        }
    }

    /// Borrowing variant of [`value`](Self::value).
    pub fn data(&self) -> Option<&T> {
        match &self.state {
            EntryState::Success(value) => Some(value),
            _ => None,
        }
    }

    /// The failure; only present on error.
    pub fn failure(&self) -> Option<Arc<E>> {
        match &self.state {
            EntryState::Error(failure) => Some(failure.clone()),
            _ => None,
        }
    }

    /// Borrowing variant of [`failure`](Self::failure).
    pub fn error(&self) -> Option<&E> {
        match &self.state {
            EntryState::Error(failure) => Some(failure),
            _ => None,
        }
    }

    /// Previous value kept visible while a refetch is pending (`stale` option).
    pub fn stale_value(&self) -> Option<Arc<T>> {
        match &self.state {
            EntryState::Pending { stale } => stale.clone(),
            _ => None,
        }
    }

    /// Handle on the current or most recent run. `None` for idle entries.
    pub fn in_flight(&self) -> Option<&InFlight> {
        self.in_flight.as_ref()
    }

    /// Re-runs the query on this entry's slot.
    pub fn refetch(&self) -> Result<InFlight> {
        self.refetch.run()
    }

    pub fn config(&self) -> &QueryConfig {
        &self.config
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) fn into_suspense(self) -> Suspense<T, E> {
        match self.state {
            EntryState::Success(value) => Suspense::Ready(value),
            EntryState::Error(failure) => Suspense::Failed(failure),
            EntryState::Pending { .. } => {
                Suspense::Pending(self.in_flight.unwrap_or_else(InFlight::settled))
            }
        }
    }
}

impl<T, E> Clone for QueryEntry<T, E> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
            in_flight: self.in_flight.clone(),
            refetch: self.refetch.clone(),
            config: self.config,
            generation: self.generation,
            updated_at: self.updated_at,
        }
    }
}

impl<T, E> fmt::Debug for QueryEntry<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryEntry")
            .field("status", &self.status())
            .field("loading", &self.is_loading())
            .field("generation", &self.generation)
            .field("updated_at", &self.updated_at)
            .finish_non_exhaustive()
    }
}

// == Type-Erased Entry ==
/// Object-safe view of an entry, so entries of different queries can share
/// one store.
pub(crate) trait ErasedEntry: Send + Sync {
    fn status(&self) -> QueryStatus;
    fn is_loading(&self) -> bool;
    fn updated_at(&self) -> DateTime<Utc>;
    fn as_any(&self) -> &dyn Any;
}

impl<T, E> ErasedEntry for QueryEntry<T, E>
where
    T: Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    fn status(&self) -> QueryStatus {
        QueryEntry::status(self)
    }

    fn is_loading(&self) -> bool {
        QueryEntry::is_loading(self)
    }

    fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
