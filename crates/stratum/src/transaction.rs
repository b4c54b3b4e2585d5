// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use stratum_layers::{Depth, DepthCounter, LayerControl};

use crate::TransactionalResource;

static NEXT_RESOURCE_ID: AtomicU64 = AtomicU64::new(0);

/// Identifies one [`Transactional`] handle and its clones.
pub(crate) type ResourceId = u64;

/// Depth and cache registry shared by all clones of a [`Transactional`] handle.
pub(crate) struct ResourceState {
    id: ResourceId,
    depth: DepthCounter,
    caches: Mutex<Vec<Weak<dyn LayerControl>>>,
}

impl ResourceState {
    fn new() -> Self {
        Self {
            id: NEXT_RESOURCE_ID.fetch_add(1, Ordering::Relaxed),
            depth: DepthCounter::new(),
            caches: Mutex::new(Vec::new()),
        }
    }

    fn live_caches(&self) -> Vec<Arc<dyn LayerControl>> {
        let mut caches = self.caches.lock();
        caches.retain(|cache| cache.strong_count() > 0);
        caches.iter().filter_map(Weak::upgrade).collect()
    }

    fn end(&self, keep: bool) {
        if self.depth.exit().is_err() {
            tracing::warn!(resource.id = self.id, "transaction ended with no open transaction");
            return;
        }

        for cache in self.live_caches() {
            if keep {
                cache.commit();
            } else {
                cache.rollback();
            }
        }
    }
}

/// A transactional resource bundled with the memoization state that follows it.
///
/// The handle owns the resource, a transaction depth counter, and a registry of every cache
/// created for it by [`TransactionalMemo`](crate::TransactionalMemo). Clones are cheap and share
/// all three, so pass clones into transaction work and memoized functions freely.
///
/// # Examples
///
/// ```
/// use stratum::{Transactional, TransactionalResource};
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
/// # futures::executor::block_on(async {
/// let db = Transactional::new(Database);
///
/// let depth = db.transaction(|| async { Ok(db.depth()) }).await?;
/// assert_eq!(depth, 1);
/// assert_eq!(db.depth(), 0);
/// # Ok::<(), std::io::Error>(())
/// # }).unwrap();
/// ```
pub struct Transactional<R> {
    resource: Arc<R>,
    state: Arc<ResourceState>,
}

impl<R> Transactional<R> {
    /// Wraps `resource` with a fresh depth counter and an empty cache registry.
    pub fn new(resource: R) -> Self {
        Self::from_arc(Arc::new(resource))
    }

    /// Wraps an already shared resource.
    ///
    /// Each call creates a new handle with its own depth and caches, even for the same `Arc`.
    pub fn from_arc(resource: Arc<R>) -> Self {
        Self {
            resource,
            state: Arc::new(ResourceState::new()),
        }
    }

    /// Returns the wrapped resource.
    #[must_use]
    pub fn resource(&self) -> &R {
        &self.resource
    }

    /// Returns the current transaction depth. `0` means no transaction is open.
    #[must_use]
    pub fn depth(&self) -> Depth {
        self.state.depth.depth()
    }

    /// Returns `true` if both handles share the same depth and caches.
    #[must_use]
    pub fn same_handle(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }

    pub(crate) fn id(&self) -> ResourceId {
        self.state.id
    }

    pub(crate) fn depth_counter(&self) -> &DepthCounter {
        &self.state.depth
    }

    pub(crate) fn downgrade(&self) -> Weak<ResourceState> {
        Arc::downgrade(&self.state)
    }

    /// Adds a cache to the set committed and rolled back with this resource's transactions.
    pub(crate) fn register(&self, cache: Weak<dyn LayerControl>) {
        self.state.caches.lock().push(cache);
    }

    #[cfg(test)]
    pub(crate) fn registered(&self) -> usize {
        self.state.caches.lock().len()
    }
}

impl<R: TransactionalResource> Transactional<R> {
    /// Runs `work` in a transaction of the wrapped resource.
    ///
    /// The depth is raised for the duration of the transaction so memoized calls made inside it
    /// write to a new layer. When the resource reports success the layer is merged into the
    /// enclosing scope of every registered cache; on failure it is discarded and the error is
    /// returned unchanged. Dropping the returned future before it completes, or a panic inside
    /// `work`, also discards the layer.
    ///
    /// Work that awaits inside the transaction should own what it uses. Move clones of the
    /// handle, and of any memoized function wrapped in an `Arc`, into the closure.
    ///
    /// # Examples
    ///
    /// ```
    /// use stratum::{Transactional, TransactionalResource};
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
    /// # futures::executor::block_on(async {
    /// let db = Transactional::new(Database);
    ///
    /// let depths = db
    ///     .transaction({
    ///         let db = db.clone();
    ///         move || async move {
    ///             let outer = db.depth();
    ///             let inner = db
    ///                 .transaction({
    ///                     let db = db.clone();
    ///                     move || async move { Ok(db.depth()) }
    ///                 })
    ///                 .await?;
    ///             Ok::<_, std::io::Error>((outer, inner))
    ///         }
    ///     })
    ///     .await?;
    ///
    /// assert_eq!(depths, (1, 2));
    /// assert_eq!(db.depth(), 0);
    /// # Ok::<(), std::io::Error>(())
    /// # }).unwrap();
    /// ```
    ///
    /// # Errors
    ///
    /// Returns whatever error the resource or `work` produced.
    pub async fn transaction<T, F, Fut>(&self, work: F) -> Result<T, R::Error>
    where
        T: Send,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<T, R::Error>> + Send,
    {
        let scope = TransactionScope::enter(&self.state);
        let outcome = self.resource.transaction(work).await;
        scope.finish(outcome.is_ok());
        outcome
    }
}

impl<R> Clone for Transactional<R> {
    fn clone(&self) -> Self {
        Self {
            resource: Arc::clone(&self.resource),
            state: Arc::clone(&self.state),
        }
    }
}

impl<R: Debug> Debug for Transactional<R> {
    #[cfg_attr(test, mutants::skip)]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transactional")
            .field("resource", &self.resource)
            .field("depth", &self.depth())
            .field("caches", &self.state.caches.lock().len())
            .finish()
    }
}

/// Runs `work` in a transaction of `resource`. See [`Transactional::transaction`].
///
/// # Errors
///
/// Returns whatever error the resource or `work` produced.
pub async fn run_transaction<R, T, F, Fut>(resource: &Transactional<R>, work: F) -> Result<T, R::Error>
where
    R: TransactionalResource,
    T: Send,
    F: FnOnce() -> Fut + Send,
    Fut: Future<Output = Result<T, R::Error>> + Send,
{
    resource.transaction(work).await
}

/// One open transaction level. Rolls back if dropped before [`finish`](Self::finish).
struct TransactionScope<'a> {
    state: &'a ResourceState,
    open: bool,
}

impl<'a> TransactionScope<'a> {
    fn enter(state: &'a ResourceState) -> Self {
        state.depth.enter();
        Self { state, open: true }
    }

    fn finish(mut self, keep: bool) {
        self.open = false;
        self.state.end(keep);
    }
}

impl Drop for TransactionScope<'_> {
    fn drop(&mut self) {
        if self.open {
            self.state.end(false);
        }
    }
}
