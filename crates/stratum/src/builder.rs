// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Builder for configuring memoized functions.

use stratum_key::KeyArgs;

use crate::memo::share;
use crate::telemetry::MemoTelemetry;
use crate::{AsyncMemoized, Memoized, SharedResult, Transactional, TransactionalMemo};

pub(crate) const DEFAULT_NAME: &str = "memo";

/// Builder for configuring a memoized function.
///
/// The free functions [`memoize`](crate::memoize), [`memoize_async`](crate::memoize_async),
/// [`memoize_with_transaction`](crate::memoize_with_transaction) and
/// [`memoize_with_transaction_async`](crate::memoize_with_transaction_async) use the default
/// configuration. Use the builder to label a cache in logs or to silence it.
///
/// # Examples
///
/// ```
/// use stratum::MemoBuilder;
///
/// let squares = MemoBuilder::new()
///     .name("squares")
///     .logs(false)
///     .memoize(|n: u64| n * n);
///
/// assert_eq!(*squares.call(12), 144);
/// assert_eq!(squares.name(), "squares");
/// ```
#[derive(Clone, Copy, Debug)]
pub struct MemoBuilder {
    name: &'static str,
    logs: bool,
}

impl Default for MemoBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoBuilder {
    /// Creates a builder named `"memo"` with logging enabled.
    #[must_use]
    pub fn new() -> Self {
        Self {
            name: DEFAULT_NAME,
            logs: true,
        }
    }

    /// Sets the label reported as `cache.name` in log events.
    #[must_use]
    pub fn name(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }

    /// Enables or disables log events for this cache.
    ///
    /// Events are emitted through `tracing`, so they are also subject to the subscriber's own
    /// filtering.
    #[must_use]
    pub fn logs(mut self, enabled: bool) -> Self {
        self.logs = enabled;
        self
    }

    /// Memoizes `func` with a flat cache. See [`Memoized`].
    pub fn memoize<A, T, F>(self, func: F) -> Memoized<F, T>
    where
        A: KeyArgs,
        F: Fn(A) -> T,
    {
        Memoized::new(func, self.telemetry())
    }

    /// Memoizes an asynchronous `func` with a flat cache. See [`AsyncMemoized`].
    pub fn memoize_async<A, T, E, F, Fut>(self, func: F) -> AsyncMemoized<F, T, E>
    where
        A: KeyArgs,
        T: Clone + Send + Sync + 'static,
        E: Clone + Send + Sync + 'static,
        F: Fn(A) -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        AsyncMemoized::new(func, self.telemetry())
    }

    /// Memoizes `func` per resource, following the resource's transactions.
    /// See [`TransactionalMemo`].
    pub fn memoize_with_transaction<R, A, V, F>(self, func: F) -> TransactionalMemo<R, F, V>
    where
        A: KeyArgs,
        V: Clone + Send + 'static,
        F: Fn(&Transactional<R>, A) -> V,
    {
        TransactionalMemo::new(func, self.telemetry())
    }

    /// Memoizes an asynchronous `func` per resource, following the resource's transactions.
    /// See [`memoize_with_transaction_async`](crate::memoize_with_transaction_async).
    pub fn memoize_with_transaction_async<R, A, T, F, Fut>(
        self,
        func: F,
    ) -> TransactionalMemo<R, impl Fn(&Transactional<R>, A) -> SharedResult<T>, SharedResult<T>>
    where
        R: Send + Sync + 'static,
        A: KeyArgs,
        T: Clone + Send + Sync + 'static,
        F: Fn(Transactional<R>, A) -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        TransactionalMemo::new(share(func), self.telemetry())
    }

    fn telemetry(self) -> MemoTelemetry {
        MemoTelemetry::new(self.name, self.logs)
    }
}
