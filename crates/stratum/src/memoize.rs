// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use futures::future::FutureExt;
use parking_lot::Mutex;
use stratum_key::{CacheKey, KeyArgs, derive_key};

use crate::telemetry::{MemoActivity, MemoOperation, MemoTelemetry};
use crate::{MemoBuilder, SharedResult};

/// A memoized function with one flat cache.
///
/// Results are frozen behind an [`Arc`] before they are cached, so every caller with the same
/// arguments receives the same immutable value.
///
/// [`call`](Self::call) caches whatever the function returns, an `Err` included. For fallible
/// functions whose failures should be retried, use [`try_call`](Self::try_call).
///
/// Created by [`memoize`] or [`MemoBuilder::memoize`].
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
///
/// use stratum::memoize;
///
/// let words = memoize(|text: &str| text.split_whitespace().map(str::to_owned).collect::<Vec<_>>());
///
/// let first = words.call("a b c");
/// let second = words.call("a b c");
/// assert!(Arc::ptr_eq(&first, &second));
/// assert_eq!(first.len(), 3);
/// ```
pub struct Memoized<F, T> {
    func: F,
    entries: Mutex<HashMap<CacheKey, Arc<T>>>,
    telemetry: MemoTelemetry,
}

impl<F, T> Memoized<F, T> {
    pub(crate) fn new(func: F, telemetry: MemoTelemetry) -> Self {
        Self {
            func,
            entries: Mutex::new(HashMap::new()),
            telemetry,
        }
    }

    /// Returns the cached result for `args`, computing it on a miss.
    ///
    /// The function runs without holding the cache lock, so it may call other memoized
    /// functions. If two callers miss at once both compute, and the first result stored wins.
    pub fn call<A>(&self, args: A) -> Arc<T>
    where
        A: KeyArgs,
        F: Fn(A) -> T,
    {
        let key = derive_key(&args);
        let cached = self.entries.lock().get(&key).cloned();
        if let Some(value) = cached {
            self.record(MemoOperation::Get, MemoActivity::Hit);
            return value;
        }
        self.record(MemoOperation::Get, MemoActivity::Miss);

        let computed = Arc::new((self.func)(args));
        let value = Arc::clone(self.entries.lock().entry(key).or_insert(computed));
        self.record(MemoOperation::Insert, MemoActivity::Inserted);
        value
    }

    /// Returns a snapshot of the cache.
    pub fn cache(&self) -> HashMap<CacheKey, Arc<T>> {
        self.entries.lock().clone()
    }

    /// Returns the number of cached results.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns `true` if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Forgets every cached result.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Returns the label used in log events.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.telemetry.name()
    }

    fn record(&self, operation: MemoOperation, activity: MemoActivity) {
        if self.telemetry.logs_enabled() {
            self.telemetry.record(operation, activity, 0, self.len());
        }
    }
}

impl<F, V, E> Memoized<F, Result<V, E>> {
    /// Returns the cached result for `args`, computing it on a miss and caching it only if it
    /// is `Ok`.
    ///
    /// # Examples
    ///
    /// ```
    /// use stratum::memoize;
    ///
    /// let parse = memoize(|text: &str| text.parse::<u32>());
    ///
    /// assert!(parse.try_call("x").is_err());
    /// assert!(parse.is_empty());
    /// assert_eq!(*parse.try_call("7"), Ok(7));
    /// assert_eq!(parse.len(), 1);
    /// ```
    pub fn try_call<A>(&self, args: A) -> Arc<Result<V, E>>
    where
        A: KeyArgs,
        F: Fn(A) -> Result<V, E>,
    {
        let key = derive_key(&args);
        let cached = self.entries.lock().get(&key).cloned();
        if let Some(value) = cached {
            self.record(MemoOperation::Get, MemoActivity::Hit);
            return value;
        }
        self.record(MemoOperation::Get, MemoActivity::Miss);

        let computed = Arc::new((self.func)(args));
        if computed.is_err() {
            return computed;
        }
        let value = Arc::clone(self.entries.lock().entry(key).or_insert(computed));
        self.record(MemoOperation::Insert, MemoActivity::Inserted);
        value
    }
}

impl<F, T> Debug for Memoized<F, T> {
    #[cfg_attr(test, mutants::skip)]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Memoized")
            .field("name", &self.telemetry.name())
            .field("entries", &self.len())
            .finish_non_exhaustive()
    }
}

struct Flight<T, E> {
    generation: u64,
    result: SharedResult<Result<T, E>>,
}

struct Flights<T, E> {
    entries: Mutex<HashMap<CacheKey, Flight<T, E>>>,
    next_generation: AtomicU64,
    telemetry: MemoTelemetry,
}

impl<T, E> Flights<T, E> {
    fn evict(&self, key: &CacheKey, generation: u64) {
        let mut entries = self.entries.lock();
        if entries.get(key).is_some_and(|flight| flight.generation == generation) {
            entries.remove(key);
            self.telemetry
                .record(MemoOperation::Evict, MemoActivity::Evicted, 0, entries.len());
        }
    }

    fn record(&self, operation: MemoOperation, activity: MemoActivity) {
        if self.telemetry.logs_enabled() {
            let len = self.entries.lock().len();
            self.telemetry.record(operation, activity, 0, len);
        }
    }
}

/// A memoized asynchronous function with one flat cache.
///
/// The pending result is cached the moment the function is invoked, as a [`SharedResult`]
/// handle. Callers arriving before it resolves await the same computation, so the function
/// runs once per key. A result that resolves to `Err` is evicted so the next call tries
/// again. An `Ok` result stays cached.
///
/// Created by [`memoize_async`] or [`MemoBuilder::memoize_async`].
///
/// # Examples
///
/// ```
/// use stratum::memoize_async;
///
/// let lookup = memoize_async(|id: u32| async move {
///     if id == 0 { Err("no such user") } else { Ok(format!("user-{id}")) }
/// });
///
/// # futures::executor::block_on(async {
/// assert_eq!(lookup.call(7).await, Ok("user-7".to_string()));
/// assert!(lookup.call(0).await.is_err());
/// assert_eq!(lookup.len(), 1, "the failure was evicted");
/// # });
/// ```
pub struct AsyncMemoized<F, T, E> {
    func: F,
    flights: Arc<Flights<T, E>>,
}

impl<F, T, E> AsyncMemoized<F, T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    pub(crate) fn new(func: F, telemetry: MemoTelemetry) -> Self {
        Self {
            func,
            flights: Arc::new(Flights {
                entries: Mutex::new(HashMap::new()),
                next_generation: AtomicU64::new(0),
                telemetry,
            }),
        }
    }

    /// Returns the shared result for `args`, invoking the function on a miss.
    ///
    /// The returned handle resolves to the function's outcome. Dropping it does not cancel the
    /// computation for other holders of the same handle.
    pub fn call<A, Fut>(&self, args: A) -> SharedResult<Result<T, E>>
    where
        A: KeyArgs,
        F: Fn(A) -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let key = derive_key(&args);
        let cached = self.flights.entries.lock().get(&key).map(|flight| flight.result.clone());
        if let Some(result) = cached {
            self.flights.record(MemoOperation::Get, MemoActivity::Hit);
            return result;
        }
        self.flights.record(MemoOperation::Get, MemoActivity::Miss);

        let generation = self.flights.next_generation.fetch_add(1, Ordering::Relaxed);
        let pending = (self.func)(args);
        let flights = Arc::downgrade(&self.flights);
        let evict_key = key.clone();
        let result = settle(pending, flights, evict_key, generation).boxed().shared();

        let result = match self.flights.entries.lock().entry(key) {
            Entry::Occupied(existing) => return existing.get().result.clone(),
            Entry::Vacant(vacant) => vacant
                .insert(Flight {
                    generation,
                    result,
                })
                .result
                .clone(),
        };
        self.flights.record(MemoOperation::Insert, MemoActivity::Inserted);
        result
    }

    /// Returns a snapshot of the cache, pending results included.
    pub fn cache(&self) -> HashMap<CacheKey, SharedResult<Result<T, E>>> {
        self.flights
            .entries
            .lock()
            .iter()
            .map(|(key, flight)| (key.clone(), flight.result.clone()))
            .collect()
    }

    /// Returns the number of cached results.
    pub fn len(&self) -> usize {
        self.flights.entries.lock().len()
    }

    /// Returns `true` if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.flights.entries.lock().is_empty()
    }

    /// Forgets every cached result. Computations already running keep running for their
    /// current holders.
    pub fn clear(&self) {
        self.flights.entries.lock().clear();
    }

    /// Returns the label used in log events.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.flights.telemetry.name()
    }
}

impl<F, T, E> Debug for AsyncMemoized<F, T, E> {
    #[cfg_attr(test, mutants::skip)]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncMemoized")
            .field("name", &self.flights.telemetry.name())
            .field("entries", &self.flights.entries.lock().len())
            .finish_non_exhaustive()
    }
}

async fn settle<T, E, Fut>(pending: Fut, flights: Weak<Flights<T, E>>, key: CacheKey, generation: u64) -> Result<T, E>
where
    Fut: Future<Output = Result<T, E>>,
{
    let outcome = pending.await;
    if outcome.is_err()
        && let Some(flights) = flights.upgrade()
    {
        flights.evict(&key, generation);
    }
    outcome
}

/// Memoizes `func` with a flat cache. See [`Memoized`].
pub fn memoize<A, T, F>(func: F) -> Memoized<F, T>
where
    A: KeyArgs,
    F: Fn(A) -> T,
{
    MemoBuilder::new().memoize(func)
}

/// Memoizes an asynchronous `func` with a flat cache. See [`AsyncMemoized`].
pub fn memoize_async<A, T, E, F, Fut>(func: F) -> AsyncMemoized<F, T, E>
where
    A: KeyArgs,
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
    F: Fn(A) -> Fut,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
{
    MemoBuilder::new().memoize_async(func)
}
