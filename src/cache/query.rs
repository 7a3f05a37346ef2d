//! Query Module
//!
//! Wraps asynchronous functions into cacheable queries with a stable identity.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::Serialize;

static NEXT_QUERY_ID: AtomicU64 = AtomicU64::new(1);

// == Query Id ==
/// Opaque identity of a query. Clones of a [`Query`] share it; separately
/// constructed queries never do, even when built from the same function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct QueryId(u64);

impl QueryId {
    fn next() -> Self {
        Self(NEXT_QUERY_ID.fetch_add(1, Ordering::Relaxed))
    }

    #[cfg(test)]
    pub(crate) fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for QueryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "q{}", self.0)
    }
}

type QueryFn<A, T, E> = dyn Fn(A) -> BoxFuture<'static, Result<T, E>> + Send + Sync;

// == Query ==
/// An asynchronous, argument-parameterized computation whose results can be
/// cached per argument value.
///
/// ```rust
/// # use query_cache::Query;
/// let double = Query::named("double", |(n,): (u32,)| async move {
///     Ok::<_, String>(n * 2)
/// });
/// assert_eq!(double.name(), "double");
/// ```
pub struct Query<A, T, E> {
    id: QueryId,
    name: Arc<str>,
    func: Arc<QueryFn<A, T, E>>,
}

impl<A: 'static, T: 'static, E: 'static> Query<A, T, E> {
    /// Creates an anonymous query; its name is derived from its id.
    pub fn new<F, Fut>(func: F) -> Self
    where
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let id = QueryId::next();
        Self::build(id, Arc::from(id.to_string()), func)
    }

    /// Creates a query with a name used in logs and snapshots.
    pub fn named<F, Fut>(name: impl Into<Arc<str>>, func: F) -> Self
    where
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        Self::build(QueryId::next(), name.into(), func)
    }

    fn build<F, Fut>(id: QueryId, name: Arc<str>, func: F) -> Self
    where
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        Self {
            id,
            name,
            func: Arc::new(move |args| func(args).boxed()),
        }
    }
}

impl<A, T, E> Query<A, T, E> {
    pub fn id(&self) -> QueryId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn shared_name(&self) -> Arc<str> {
        self.name.clone()
    }

    /// Starts one invocation of the underlying function.
    pub(crate) fn call(&self, args: A) -> BoxFuture<'static, Result<T, E>> {
        (self.func)(args)
    }
}

impl<A, T, E> Clone for Query<A, T, E> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            name: self.name.clone(),
            func: self.func.clone(),
        }
    }
}

impl<A, T, E> fmt::Debug for Query<A, T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
