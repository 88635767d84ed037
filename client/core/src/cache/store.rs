//! Query cache store
//!
//! Entries hold a type-erased value, the error of the latest fetch, a stale
//! flag and at most one in-flight fetch. Fetches run as spawned tasks so they
//! complete even when every reader has gone away; readers join them through a
//! shared future.
//!
//! # Ordering
//!
//! Every fetch gets a sequence number and the cache-wide identity epoch at
//! the time it started. On completion:
//!
//! - a fetch from an earlier epoch is discarded and its readers get
//!   [`ClientError::StaleIdentity`]
//! - a fetch older than the last applied one is discarded
//! - a fetch that started before the entry was last invalidated is applied
//!   but leaves the entry stale, and an observed entry is fetched again

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tokio::sync::Notify;

use super::key::{CacheKey, KeyFamily};
use super::state::{QueryState, QueryStatus};
use crate::error::{ClientError, ClientResult};
use crate::models::Timestamp;

type Value = Arc<dyn Any + Send + Sync>;
type Outcome = ClientResult<Value>;
type Loader = Arc<dyn Fn() -> BoxFuture<'static, Outcome> + Send + Sync>;
type InFlight = Shared<BoxFuture<'static, Outcome>>;

struct Fetch {
    seq: u64,
    future: InFlight,
}

#[derive(Default)]
struct Entry {
    data: Option<Value>,
    error: Option<ClientError>,
    stale: bool,
    /// Fetches with a lower sequence number predate the last invalidation
    invalidated_before: u64,
    applied_seq: u64,
    fetch: Option<Fetch>,
    last_fetched_at: Option<Timestamp>,
    observers: usize,
    loader: Option<Loader>,
}

impl Entry {
    fn needs_fetch(&self) -> bool {
        self.fetch.is_none() && (self.stale || (self.data.is_none() && self.error.is_none()))
    }
}

struct Inner {
    entries: HashMap<CacheKey, Entry>,
    epoch: u64,
    next_seq: u64,
}

enum Next {
    Cached(Value),
    Join(InFlight, bool),
    Start,
}

/// Keyed, memoizing cache of remote reads
///
/// Cloning is cheap and every clone shares the same entries. The internal
/// lock is never held across an await.
#[derive(Clone)]
pub struct QueryCache {
    inner: Arc<Mutex<Inner>>,
    changed: Arc<Notify>,
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new()
    }
}

fn erase<T, F, Fut>(loader: F) -> Loader
where
    T: Send + Sync + 'static,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ClientResult<T>> + Send + 'static,
{
    Arc::new(move || {
        let fut = loader();
        async move { fut.await.map(|value| Arc::new(value) as Value) }.boxed()
    })
}

fn downcast<T: Clone + 'static>(key: &CacheKey, value: &Value) -> ClientResult<T> {
    (**value)
        .downcast_ref::<T>()
        .cloned()
        .ok_or_else(|| ClientError::Cache(format!("{key} holds a value of another type")))
}

impl QueryCache {
    /// Empty cache at epoch zero
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                entries: HashMap::new(),
                epoch: 0,
                next_seq: 1,
            })),
            changed: Arc::new(Notify::new()),
        }
    }

    /// Read `key`, fetching through `loader` when there is no usable value
    ///
    /// A fresh value is returned without fetching. A missing, stale or
    /// failed entry is fetched, joining the in-flight fetch if there is one.
    /// `loader` is kept on the entry for refetches triggered by invalidation.
    pub async fn read<T, F, Fut>(&self, key: CacheKey, loader: F) -> ClientResult<T>
    where
        T: Clone + Send + Sync + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ClientResult<T>> + Send + 'static,
    {
        let loader = erase(loader);
        loop {
            let (future, outdated) = {
                let mut inner = self.inner.lock();
                let next = {
                    let entry = inner.entries.entry(key.clone()).or_default();
                    entry.loader = Some(loader.clone());
                    match (&entry.fetch, &entry.data) {
                        (Some(fetch), _) => {
                            Next::Join(fetch.future.clone(), fetch.seq < entry.invalidated_before)
                        }
                        (None, Some(value)) if !entry.stale && entry.error.is_none() => {
                            Next::Cached(value.clone())
                        }
                        _ => Next::Start,
                    }
                };
                match next {
                    Next::Cached(value) => return downcast(&key, &value),
                    Next::Join(future, outdated) => (future, outdated),
                    Next::Start => (self.start_fetch(&mut inner, &key)?, false),
                }
            };

            let outcome = future.await;
            // A fetch that predates an invalidation is not an answer to this read.
            if !outdated {
                return outcome.and_then(|value| downcast(&key, &value));
            }
        }
    }

    /// Start a fetch for `key` if it has no usable value, without waiting
    ///
    /// Failed entries are left alone until they are observed again or
    /// invalidated. Returns whether a fetch was started.
    pub fn ensure<T, F, Fut>(&self, key: CacheKey, loader: F) -> bool
    where
        T: Send + Sync + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ClientResult<T>> + Send + 'static,
    {
        let mut inner = self.inner.lock();
        let entry = inner.entries.entry(key.clone()).or_default();
        entry.loader = Some(erase(loader));
        if entry.needs_fetch() {
            self.start_fetch(&mut inner, &key).is_ok()
        } else {
            false
        }
    }

    /// Current state of `key` without fetching
    #[must_use]
    pub fn peek<T: Clone + 'static>(&self, key: &CacheKey) -> QueryState<T> {
        let inner = self.inner.lock();
        let Some(entry) = inner.entries.get(key) else {
            return QueryState::default();
        };

        let mut error = entry.error.clone();
        let data = match entry.data.as_ref().map(|v| downcast::<T>(key, v)) {
            Some(Ok(value)) => Some(value),
            Some(Err(e)) => {
                error = Some(e);
                None
            }
            None => None,
        };
        let is_fetching = entry.fetch.is_some();
        let status = if is_fetching && data.is_none() {
            QueryStatus::Loading
        } else if error.is_some() {
            QueryStatus::Error
        } else if data.is_some() {
            QueryStatus::Success
        } else {
            QueryStatus::Idle
        };

        QueryState {
            status,
            data,
            error,
            is_fetching,
            is_stale: entry.stale,
            last_fetched_at: entry.last_fetched_at,
        }
    }

    /// Register an observer of `key`
    ///
    /// Observed entries are refetched when invalidated. Observing a failed
    /// entry marks it stale so the next [`ensure`](Self::ensure) retries it.
    #[must_use]
    pub fn observe(&self, key: CacheKey) -> Observer {
        let mut inner = self.inner.lock();
        let entry = inner.entries.entry(key.clone()).or_default();
        entry.observers += 1;
        if entry.error.is_some() && entry.fetch.is_none() {
            entry.stale = true;
        }
        Observer {
            cache: self.clone(),
            key,
        }
    }

    /// Mark every entry whose key satisfies `predicate` as stale
    ///
    /// Observed entries are refetched. Entries are never removed. Returns
    /// the number of entries matched.
    pub fn invalidate(&self, predicate: impl Fn(&CacheKey) -> bool) -> usize {
        let mut inner = self.inner.lock();
        let boundary = inner.next_seq;
        let mut matched = 0;
        let mut refetch = Vec::new();

        for (key, entry) in &mut inner.entries {
            if !predicate(key) {
                continue;
            }
            matched += 1;
            entry.stale = true;
            entry.invalidated_before = boundary;
            if entry.observers > 0 && entry.fetch.is_none() && entry.loader.is_some() {
                refetch.push(key.clone());
            }
        }

        for key in &refetch {
            // Entries were just checked for a loader.
            let _ = self.start_fetch(&mut inner, key);
        }

        tracing::debug!(matched, refetching = refetch.len(), "Invalidated cache entries");
        matched
    }

    /// Invalidate every key that starts with `prefix`
    pub fn invalidate_prefix(&self, prefix: &CacheKey) -> usize {
        self.invalidate(|key| key.starts_with(prefix))
    }

    /// Invalidate every key of `family`
    pub fn invalidate_family(&self, family: KeyFamily) -> usize {
        self.invalidate_prefix(&CacheKey::family_prefix(family))
    }

    /// Current identity epoch
    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.inner.lock().epoch
    }

    /// Start a new identity epoch
    ///
    /// Results of fetches started earlier are discarded when they arrive.
    /// Entries that had such a fetch in flight are marked stale.
    pub fn advance_epoch(&self) -> u64 {
        let mut inner = self.inner.lock();
        inner.epoch += 1;
        for entry in inner.entries.values_mut() {
            if entry.fetch.take().is_some() {
                entry.stale = true;
            }
        }
        tracing::debug!(epoch = inner.epoch, "Cache epoch advanced");
        inner.epoch
    }

    /// Drop every value and error
    ///
    /// Starts a new epoch. Observer counts survive so that later
    /// invalidations still reach live observers.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.epoch += 1;
        inner.entries.retain(|_, entry| entry.observers > 0);
        for entry in inner.entries.values_mut() {
            *entry = Entry {
                observers: entry.observers,
                ..Entry::default()
            };
        }
        tracing::info!(epoch = inner.epoch, retained = inner.entries.len(), "Cache cleared");
        drop(inner);
        self.changed.notify_one();
    }

    /// Whether `key` has an entry
    #[must_use]
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.inner.lock().entries.contains_key(key)
    }

    /// Number of entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Whether the cache has no entries
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of fetches in flight for the current epoch
    #[must_use]
    pub fn fetching_count(&self) -> usize {
        self.inner
            .lock()
            .entries
            .values()
            .filter(|e| e.fetch.is_some())
            .count()
    }

    /// Number of observers of `key`
    #[must_use]
    pub fn observer_count(&self, key: &CacheKey) -> usize {
        self.inner.lock().entries.get(key).map_or(0, |e| e.observers)
    }

    /// Wait until some fetch completes or the cache is cleared
    pub async fn changed(&self) {
        self.changed.notified().await;
    }

    fn start_fetch(&self, inner: &mut Inner, key: &CacheKey) -> ClientResult<InFlight> {
        let loader = inner
            .entries
            .get(key)
            .and_then(|e| e.loader.clone())
            .ok_or_else(|| ClientError::Cache(format!("{key} has no loader")))?;
        let seq = inner.next_seq;
        inner.next_seq += 1;
        let epoch = inner.epoch;

        let cache = self.clone();
        let task_key = key.clone();
        let task = tokio::spawn(async move {
            let outcome = loader().await;
            cache.complete(&task_key, seq, epoch, outcome)
        });
        let future = async move {
            task.await
                .unwrap_or_else(|e| Err(ClientError::Cache(format!("fetch task failed: {e}"))))
        }
        .boxed()
        .shared();

        if let Some(entry) = inner.entries.get_mut(key) {
            entry.fetch = Some(Fetch {
                seq,
                future: future.clone(),
            });
        }
        tracing::debug!(key = %key, seq, epoch, "Fetch started");
        Ok(future)
    }

    fn complete(&self, key: &CacheKey, seq: u64, epoch: u64, outcome: Outcome) -> Outcome {
        let result = {
            let mut inner = self.inner.lock();
            self.apply(&mut inner, key, seq, epoch, outcome)
        };
        self.changed.notify_one();
        result
    }

    fn apply(
        &self,
        inner: &mut Inner,
        key: &CacheKey,
        seq: u64,
        epoch: u64,
        outcome: Outcome,
    ) -> Outcome {
        let current_epoch = inner.epoch;
        let Some(entry) = inner.entries.get_mut(key) else {
            return if epoch == current_epoch {
                outcome
            } else {
                Err(ClientError::StaleIdentity)
            };
        };
        if entry.fetch.as_ref().is_some_and(|f| f.seq == seq) {
            entry.fetch = None;
        }

        if epoch != current_epoch {
            tracing::debug!(key = %key, seq, "Discarded result from a previous identity");
            return Err(ClientError::StaleIdentity);
        }
        if seq < entry.applied_seq {
            tracing::debug!(key = %key, seq, applied = entry.applied_seq, "Discarded superseded result");
            return entry.data.clone().map_or(outcome, Ok);
        }

        entry.applied_seq = seq;
        // Strictly increasing per entry, so a refetch is always observable.
        let now = Timestamp::now();
        entry.last_fetched_at = Some(match entry.last_fetched_at {
            Some(prev) if prev.0 >= now.0 => Timestamp(prev.0 + 1),
            _ => now,
        });
        entry.stale = seq < entry.invalidated_before;
        match &outcome {
            Ok(value) => {
                entry.data = Some(value.clone());
                entry.error = None;
            }
            Err(e) => {
                tracing::debug!(key = %key, error = %e, "Fetch failed");
                entry.error = Some(e.clone());
            }
        }

        if entry.stale && entry.observers > 0 {
            let _ = self.start_fetch(inner, key);
        }
        outcome
    }
}

/// Keeps an entry observed until dropped
pub struct Observer {
    cache: QueryCache,
    key: CacheKey,
}

impl Observer {
    /// Observed key
    #[must_use]
    pub fn key(&self) -> &CacheKey {
        &self.key
    }
}

impl std::fmt::Debug for Observer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observer").field("key", &self.key).finish()
    }
}

impl Drop for Observer {
    fn drop(&mut self) {
        let mut inner = self.cache.inner.lock();
        if let Some(entry) = inner.entries.get_mut(&self.key) {
            entry.observers = entry.observers.saturating_sub(1);
        }
    }
}
