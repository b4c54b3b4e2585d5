// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::Error;

/// Transaction nesting depth. `0` is the root scope, outside any transaction.
pub type Depth = usize;

/// Supplies the current transaction depth to a [`LayeredCache`](crate::LayeredCache).
pub trait DepthSource: Send + Sync {
    /// Returns the current depth.
    fn depth(&self) -> Depth;
}

impl<F> DepthSource for F
where
    F: Fn() -> Depth + Send + Sync,
{
    fn depth(&self) -> Depth {
        self()
    }
}

/// A shared transaction depth counter.
///
/// Clones share the same counter. The counter never goes below zero: [`DepthCounter::exit`]
/// at the root scope fails instead of wrapping.
///
/// # Examples
///
/// ```
/// use stratum_layers::DepthCounter;
///
/// let depth = DepthCounter::new();
/// let shared = depth.clone();
///
/// assert_eq!(depth.enter(), 1);
/// assert_eq!(shared.depth(), 1);
/// assert_eq!(shared.exit()?, 0);
/// # Ok::<(), stratum_layers::Error>(())
/// ```
#[derive(Clone, Debug, Default)]
pub struct DepthCounter {
    depth: Arc<AtomicUsize>,
}

impl DepthCounter {
    /// Creates a counter at the root scope.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current depth.
    #[must_use]
    pub fn depth(&self) -> Depth {
        self.depth.load(Ordering::Acquire)
    }

    /// Opens a transaction level and returns the new depth.
    pub fn enter(&self) -> Depth {
        self.depth.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Closes the innermost transaction level and returns the new depth.
    ///
    /// # Errors
    ///
    /// Returns an error if no transaction is open.
    pub fn exit(&self) -> Result<Depth, Error> {
        self.depth
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |depth| depth.checked_sub(1))
            .map(|previous| previous - 1)
            .map_err(|_| Error::no_open_transaction("exit"))
    }
}

impl DepthSource for DepthCounter {
    fn depth(&self) -> Depth {
        Self::depth(self)
    }
}
