// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Surrogate tokens for identity-bearing arguments.
//!
//! Reference identity cannot be stored on the object itself, so tokens live in a process-wide
//! side table keyed by allocation address. Each entry keeps a weak reference to the allocation
//! it was issued for; an entry whose allocation has been dropped is never handed out again, so
//! a new allocation reusing the same address always receives a fresh token.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, LazyLock, Weak};

use parking_lot::Mutex;

use crate::CacheKey;

const MIN_PRUNE_THRESHOLD: usize = 64;

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

static REFS: LazyLock<Mutex<RefTable>> = LazyLock::new(|| Mutex::new(RefTable::new()));

fn next_token() -> u64 {
    NEXT_TOKEN.fetch_add(1, Ordering::Relaxed)
}

pub(crate) fn ref_key(token: u64) -> CacheKey {
    CacheKey::prefixed(format_args!("ref{token}"))
}

/// A surrogate identity token.
///
/// Embed an `Identity` in types that should be memoized by reference rather than by
/// content, and forward their [`KeyArg`](crate::KeyArg) implementation to it. Every call to
/// [`Identity::new`] yields a token that no other `Identity` or `Arc` allocation shares.
/// Cloning an `Identity` keeps the token, so clones count as the same reference.
///
/// # Examples
///
/// ```
/// use stratum_key::{CacheKey, Identity, KeyArg, derive_key};
///
/// struct Session {
///     id: Identity,
/// }
///
/// impl KeyArg for Session {
///     fn cache_key(&self) -> CacheKey {
///         self.id.cache_key()
///     }
/// }
///
/// let first = Session { id: Identity::new() };
/// let second = Session { id: Identity::new() };
/// assert_eq!(derive_key(&(&first,)), derive_key(&(&first,)));
/// assert_ne!(derive_key(&(&first,)), derive_key(&(&second,)));
/// ```
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Identity {
    token: u64,
}

impl Identity {
    /// Allocates a fresh identity token.
    #[must_use]
    pub fn new() -> Self {
        Self { token: next_token() }
    }

    /// Returns the key this identity stands for.
    #[must_use]
    pub fn key(&self) -> CacheKey {
        ref_key(self.token)
    }
}

impl Default for Identity {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identity(ref{})", self.token)
    }
}

/// Reports whether the allocation a token was issued for is still alive.
trait Liveness: Send + Sync {
    fn is_alive(&self) -> bool;
}

impl<T: ?Sized + Send + Sync> Liveness for Weak<T> {
    fn is_alive(&self) -> bool {
        self.strong_count() > 0
    }
}

struct RefEntry {
    target: Box<dyn Liveness>,
    token: u64,
}

struct RefTable {
    entries: HashMap<usize, RefEntry>,
    prune_at: usize,
}

impl RefTable {
    fn new() -> Self {
        Self {
            entries: HashMap::new(),
            prune_at: MIN_PRUNE_THRESHOLD,
        }
    }

    fn token_for<T: ?Sized + Send + Sync + 'static>(&mut self, value: &Arc<T>) -> u64 {
        let address = Arc::as_ptr(value).cast::<()>() as usize;
        if let Some(entry) = self.entries.get(&address)
            && entry.target.is_alive()
        {
            return entry.token;
        }

        if self.entries.len() >= self.prune_at {
            self.prune();
        }

        let token = next_token();
        let target: Box<dyn Liveness> = Box::new(Arc::downgrade(value));
        self.entries.insert(address, RefEntry { target, token });
        token
    }

    fn prune(&mut self) {
        self.entries.retain(|_, entry| entry.target.is_alive());
        self.prune_at = (self.entries.len() * 2).max(MIN_PRUNE_THRESHOLD);
    }
}

/// Returns the surrogate token for the allocation behind `value`, issuing one on first sighting.
pub(crate) fn arc_token<T: ?Sized + Send + Sync + 'static>(value: &Arc<T>) -> u64 {
    REFS.lock().token_for(value)
}
