// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::collections::{BTreeMap, HashMap};
use std::fmt::Debug;
use std::marker::PhantomData;
use std::sync::{Arc, Weak};

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use stratum_key::{CacheKey, KeyArgs, derive_key};
use stratum_layers::{DepthCounter, LayerControl, LayeredCache, Layers};

use crate::telemetry::{MemoActivity, MemoOperation, MemoTelemetry};
use crate::transaction::{ResourceId, ResourceState};
use crate::{MemoBuilder, Transactional};

/// A pending or resolved asynchronous result that any number of callers can await.
///
/// Cloning the handle does not restart the computation: every clone observes the same
/// outcome, and the computation keeps going as long as one clone is being polled.
pub type SharedResult<T> = Shared<BoxFuture<'static, T>>;

/// The cache of one memoized function for one resource.
pub(crate) struct MemoLayer<V> {
    cache: LayeredCache<CacheKey, V, DepthCounter>,
    telemetry: MemoTelemetry,
}

impl<V> MemoLayer<V> {
    pub(crate) fn new(depth: DepthCounter, telemetry: MemoTelemetry) -> Self {
        Self {
            cache: LayeredCache::new(depth),
            telemetry,
        }
    }

    fn record(&self, operation: MemoOperation, activity: MemoActivity) {
        if self.telemetry.logs_enabled() {
            self.telemetry.record(operation, activity, self.cache.depth(), self.cache.len());
        }
    }
}

impl<V: Send> LayerControl for MemoLayer<V> {
    fn commit(&self) -> usize {
        let merged = self.cache.commit();
        if merged > 0 {
            self.telemetry
                .record(MemoOperation::Commit, MemoActivity::Committed, self.cache.depth(), merged);
        }
        merged
    }

    fn rollback(&self) -> usize {
        let discarded = self.cache.rollback();
        if discarded > 0 {
            self.telemetry
                .record(MemoOperation::Rollback, MemoActivity::RolledBack, self.cache.depth(), discarded);
        }
        discarded
    }
}

struct Registration<V> {
    resource: Weak<ResourceState>,
    layer: Arc<MemoLayer<V>>,
}

/// A function memoized per resource and per transaction depth.
///
/// Each [`Transactional`] resource the function is called with gets its own [`LayeredCache`],
/// created on first use and registered with the resource. Results computed inside a
/// transaction stay in that transaction's layer: they are promoted when the transaction
/// commits and forgotten when it rolls back, so callers never see values derived from writes
/// that were undone.
///
/// Failures are cached like any other value. A call that fails inside a transaction is
/// discarded together with the transaction.
///
/// Created by [`memoize_with_transaction`], [`memoize_with_transaction_async`] or
/// [`MemoBuilder`].
///
/// # Examples
///
/// ```
/// use std::sync::atomic::{AtomicUsize, Ordering};
///
/// use stratum::{Transactional, TransactionalResource, memoize_with_transaction};
///
/// # struct Database;
/// # impl TransactionalResource for Database {
/// #     type Error = std::io::Error;
/// #     async fn transaction<T, F, Fut>(&self, work: F) -> Result<T, Self::Error>
/// #     where
/// #         T: Send,
/// #         F: FnOnce() -> Fut + Send,
/// #         Fut: Future<Output = Result<T, Self::Error>> + Send,
/// #     {
/// #         work().await
/// #     }
/// # }
/// static CALLS: AtomicUsize = AtomicUsize::new(0);
///
/// let totals = memoize_with_transaction(|_db: &Transactional<Database>, day: u32| {
///     CALLS.fetch_add(1, Ordering::Relaxed);
///     day * 60
/// });
///
/// let db = Transactional::new(Database);
/// assert_eq!(totals.call(&db, 2), 120);
/// assert_eq!(totals.call(&db, 2), 120);
/// assert_eq!(CALLS.load(Ordering::Relaxed), 1);
/// ```
pub struct TransactionalMemo<R, F, V> {
    func: F,
    layers: Mutex<HashMap<ResourceId, Registration<V>>>,
    telemetry: MemoTelemetry,
    _resource: PhantomData<fn(&Transactional<R>)>,
}

impl<R, F, V> TransactionalMemo<R, F, V>
where
    V: Clone + Send + 'static,
{
    pub(crate) fn new(func: F, telemetry: MemoTelemetry) -> Self {
        Self {
            func,
            layers: Mutex::new(HashMap::new()),
            telemetry,
            _resource: PhantomData,
        }
    }

    /// Returns the cached result for `args` on `resource`, computing it on a miss.
    ///
    /// The lookup sees values cached at the resource's current depth and every enclosing one.
    /// On a miss the result is stored at the current depth before it is returned; if another
    /// caller stored a value for the same key first, that value is returned instead.
    pub fn call<A>(&self, resource: &Transactional<R>, args: A) -> V
    where
        A: KeyArgs,
        F: Fn(&Transactional<R>, A) -> V,
    {
        let key = derive_key(&args);
        let layer = self.layer_for(resource);

        if let Some(value) = layer.cache.get(&key) {
            layer.record(MemoOperation::Get, MemoActivity::Hit);
            return value;
        }
        layer.record(MemoOperation::Get, MemoActivity::Miss);

        let value = (self.func)(resource, args);
        let value = layer.cache.get_or_set(key, value);
        layer.record(MemoOperation::Insert, MemoActivity::Inserted);
        value
    }

    /// Returns a snapshot of the layers cached for `resource`, keyed by depth.
    ///
    /// A resource this function was never called with reports a single empty root layer.
    pub fn contents(&self, resource: &Transactional<R>) -> Layers<CacheKey, V> {
        self.layers.lock().get(&resource.id()).map_or_else(
            || BTreeMap::from([(0, HashMap::new())]),
            |registration| registration.layer.cache.contents(),
        )
    }

    /// Returns the label used in log events.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.telemetry.name()
    }

    fn layer_for(&self, resource: &Transactional<R>) -> Arc<MemoLayer<V>> {
        let mut layers = self.layers.lock();
        if let Some(registration) = layers.get(&resource.id()) {
            return Arc::clone(&registration.layer);
        }

        layers.retain(|_, registration| registration.resource.strong_count() > 0);

        let layer = Arc::new(MemoLayer::new(resource.depth_counter().clone(), self.telemetry));
        let control: Weak<dyn LayerControl> = Arc::downgrade(&layer) as Weak<dyn LayerControl>;
        resource.register(control);
        layers.insert(
            resource.id(),
            Registration {
                resource: resource.downgrade(),
                layer: Arc::clone(&layer),
            },
        );
        layer
    }

    #[cfg(test)]
    pub(crate) fn resources(&self) -> usize {
        self.layers.lock().len()
    }
}

impl<R, F, V> Debug for TransactionalMemo<R, F, V> {
    #[cfg_attr(test, mutants::skip)]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionalMemo")
            .field("name", &self.telemetry.name())
            .field("resources", &self.layers.lock().len())
            .finish_non_exhaustive()
    }
}

/// Memoizes `func` per resource, following the resource's transactions.
///
/// See [`TransactionalMemo`]. Uses the default [`MemoBuilder`] configuration.
pub fn memoize_with_transaction<R, A, V, F>(func: F) -> TransactionalMemo<R, F, V>
where
    A: KeyArgs,
    V: Clone + Send + 'static,
    F: Fn(&Transactional<R>, A) -> V,
{
    MemoBuilder::new().memoize_with_transaction(func)
}

/// Memoizes an asynchronous `func` per resource, following the resource's transactions.
///
/// Results are cached as [`SharedResult`] handles the moment `func` is invoked, so callers
/// arriving while the first computation is still running share it instead of starting
/// another. Uses the default [`MemoBuilder`] configuration.
///
/// # Examples
///
/// ```
/// use stratum::{Transactional, TransactionalResource, memoize_with_transaction_async};
///
/// # struct Database;
/// # impl TransactionalResource for Database {
/// #     type Error = std::io::Error;
/// #     async fn transaction<T, F, Fut>(&self, work: F) -> Result<T, Self::Error>
/// #     where
/// #         T: Send,
/// #         F: FnOnce() -> Fut + Send,
/// #         Fut: Future<Output = Result<T, Self::Error>> + Send,
/// #     {
/// #         work().await
/// #     }
/// # }
/// let greeting = memoize_with_transaction_async(|_db: Transactional<Database>, name: String| async move {
///     format!("Hello, {name}")
/// });
///
/// let db = Transactional::new(Database);
/// let first = greeting.call(&db, "World".to_string());
/// let second = greeting.call(&db, "World".to_string());
/// assert!(first.ptr_eq(&second));
/// assert_eq!(futures::executor::block_on(first), "Hello, World");
/// ```
pub fn memoize_with_transaction_async<R, A, T, F, Fut>(
    func: F,
) -> TransactionalMemo<R, impl Fn(&Transactional<R>, A) -> SharedResult<T>, SharedResult<T>>
where
    R: Send + Sync + 'static,
    A: KeyArgs,
    T: Clone + Send + Sync + 'static,
    F: Fn(Transactional<R>, A) -> Fut,
    Fut: Future<Output = T> + Send + 'static,
{
    MemoBuilder::new().memoize_with_transaction_async(func)
}

pub(crate) fn share<R, A, T, F, Fut>(func: F) -> impl Fn(&Transactional<R>, A) -> SharedResult<T>
where
    R: Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
    F: Fn(Transactional<R>, A) -> Fut,
    Fut: Future<Output = T> + Send + 'static,
{
    move |resource: &Transactional<R>, args: A| func(resource.clone(), args).boxed().shared()
}
