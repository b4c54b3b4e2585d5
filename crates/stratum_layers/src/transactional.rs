// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::Debug;
use std::hash::Hash;
use std::ops::Deref;

use crate::{Depth, DepthCounter, Error, LayeredCache};

/// A [`LayeredCache`] that owns its transaction stack.
///
/// Reads and writes go through [`Deref`] to the underlying [`LayeredCache`]. Transactions are
/// opened with [`begin`](Self::begin) and closed with [`commit`](Self::commit) or
/// [`rollback`](Self::rollback), or scoped with [`transaction`](Self::transaction) and
/// [`transaction_async`](Self::transaction_async), which also roll back when the work panics or
/// is dropped before finishing.
///
/// # Examples
///
/// ```
/// use stratum_layers::TransactionalCache;
///
/// let cache = TransactionalCache::new();
/// cache.set("foo", 1);
///
/// let outcome: Result<(), &str> = cache.transaction(|cache| {
///     cache.set("foo", 3);
///     cache.set("bar", 2);
///     Err("nope")
/// });
///
/// assert!(outcome.is_err());
/// assert_eq!(cache.get(&"foo"), Some(1));
/// assert_eq!(cache.get(&"bar"), None);
/// ```
pub struct TransactionalCache<K, V> {
    cache: LayeredCache<K, V, DepthCounter>,
}

impl<K, V> TransactionalCache<K, V>
where
    K: Eq + Hash,
{
    /// Creates an empty cache at the root scope.
    #[must_use]
    pub fn new() -> Self {
        Self {
            cache: LayeredCache::new(DepthCounter::new()),
        }
    }

    /// Opens a transaction and returns the new depth.
    pub fn begin(&self) -> Depth {
        self.cache.depth_source().enter()
    }

    /// Closes the innermost transaction, keeping its writes.
    ///
    /// Returns the number of entries merged into the enclosing scope.
    ///
    /// # Errors
    ///
    /// Returns an error if no transaction is open.
    pub fn commit(&self) -> Result<usize, Error> {
        self.cache
            .depth_source()
            .exit()
            .map_err(|_| Error::no_open_transaction("commit"))?;
        Ok(self.cache.commit())
    }

    /// Closes the innermost transaction, discarding its writes.
    ///
    /// Returns the number of entries discarded.
    ///
    /// # Errors
    ///
    /// Returns an error if no transaction is open.
    pub fn rollback(&self) -> Result<usize, Error> {
        self.cache
            .depth_source()
            .exit()
            .map_err(|_| Error::no_open_transaction("roll back"))?;
        Ok(self.cache.rollback())
    }

    /// Runs `work` inside a transaction.
    ///
    /// The transaction commits if `work` returns `Ok` and rolls back if it returns `Err` or
    /// panics. The outcome of `work` is returned unchanged.
    pub fn transaction<T, E>(&self, work: impl FnOnce(&Self) -> Result<T, E>) -> Result<T, E> {
        let scope = Scope::open(self);
        let outcome = work(self);
        scope.close(outcome.is_ok());
        outcome
    }

    /// Runs the future produced by `work` inside a transaction.
    ///
    /// The transaction commits if the future resolves to `Ok` and rolls back if it resolves to
    /// `Err`, panics, or is dropped before completing.
    pub async fn transaction_async<T, E, Fut>(&self, work: impl FnOnce() -> Fut) -> Result<T, E>
    where
        Fut: Future<Output = Result<T, E>>,
    {
        let scope = Scope::open(self);
        let outcome = work().await;
        scope.close(outcome.is_ok());
        outcome
    }

    fn end(&self, keep: bool) {
        // Unbalanced manual calls inside the scope already closed this level.
        if self.cache.depth_source().exit().is_err() {
            return;
        }

        if keep {
            self.cache.commit();
        } else {
            self.cache.rollback();
        }
    }
}

impl<K, V> Default for TransactionalCache<K, V>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> Deref for TransactionalCache<K, V> {
    type Target = LayeredCache<K, V, DepthCounter>;

    fn deref(&self) -> &Self::Target {
        &self.cache
    }
}

impl<K: Debug, V: Debug> Debug for TransactionalCache<K, V> {
    #[cfg_attr(test, mutants::skip)]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("TransactionalCache").field(&self.cache).finish()
    }
}

/// Open transaction level that rolls back when dropped unclosed.
struct Scope<'a, K: Eq + Hash, V> {
    cache: &'a TransactionalCache<K, V>,
    open: bool,
}

impl<'a, K: Eq + Hash, V> Scope<'a, K, V> {
    fn open(cache: &'a TransactionalCache<K, V>) -> Self {
        cache.begin();
        Self { cache, open: true }
    }

    fn close(mut self, keep: bool) {
        self.open = false;
        self.cache.end(keep);
    }
}

impl<K: Eq + Hash, V> Drop for Scope<'_, K, V> {
    fn drop(&mut self) {
        if self.open {
            self.cache.end(false);
        }
    }
}
