// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::collections::{BTreeMap, HashMap};
use std::fmt::Debug;
use std::hash::Hash;

use parking_lot::Mutex;

use crate::{Depth, DepthCounter, DepthSource};

/// A snapshot of every layer, keyed by depth.
pub type Layers<K, V> = BTreeMap<Depth, HashMap<K, V>>;

/// Ends the innermost layer of a cache without knowing its key or value types.
///
/// Transaction coordinators hold their registered caches as `dyn LayerControl` so that caches
/// of different shapes can be committed or rolled back together.
pub trait LayerControl: Send + Sync {
    /// Merges the layer just above the current depth into the current depth.
    ///
    /// Returns the number of entries merged.
    fn commit(&self) -> usize;

    /// Discards the layer just above the current depth.
    ///
    /// Returns the number of entries discarded.
    fn rollback(&self) -> usize;
}

/// A key-value store with one layer per transaction depth.
///
/// Layer `0` always exists and holds committed entries. Deeper layers are created on first
/// write and removed when their transaction ends. Reads consult layers from the current depth
/// down to `0`, so the innermost write wins.
///
/// Commit and rollback act on the layer at `depth + 1`: the depth source is expected to have
/// been decremented already when the transaction ends.
///
/// # Examples
///
/// ```
/// use stratum_layers::{DepthCounter, LayeredCache};
///
/// let depth = DepthCounter::new();
/// let cache = LayeredCache::new(depth.clone());
///
/// depth.enter();
/// cache.set("hello", "world");
/// depth.exit()?;
///
/// assert_eq!(cache.commit(), 1);
/// assert_eq!(cache.get(&"hello"), Some("world"));
/// # Ok::<(), stratum_layers::Error>(())
/// ```
pub struct LayeredCache<K, V, D = DepthCounter> {
    layers: Mutex<Layers<K, V>>,
    depth: D,
}

impl<K, V, D> LayeredCache<K, V, D>
where
    K: Eq + Hash,
    D: DepthSource,
{
    /// Creates an empty cache that reads its depth from `depth`.
    pub fn new(depth: D) -> Self {
        Self {
            layers: Mutex::new(BTreeMap::from([(0, HashMap::new())])),
            depth,
        }
    }

    /// Returns the depth this cache currently writes at.
    pub fn depth(&self) -> Depth {
        self.depth.depth()
    }

    /// Returns the depth source.
    pub fn depth_source(&self) -> &D {
        &self.depth
    }

    /// Returns the innermost visible value for `key`.
    pub fn get(&self, key: &K) -> Option<V>
    where
        V: Clone,
    {
        let depth = self.depth();
        let layers = self.layers.lock();
        find(&layers, depth, key).cloned()
    }

    /// Returns `true` if `key` is visible from the current depth.
    pub fn contains(&self, key: &K) -> bool {
        let depth = self.depth();
        let layers = self.layers.lock();
        find(&layers, depth, key).is_some()
    }

    /// Stores `value` in the layer of the current depth.
    ///
    /// Returns the value it replaced in that layer, if any. Values in outer layers are shadowed,
    /// not replaced.
    pub fn set(&self, key: K, value: V) -> Option<V> {
        let depth = self.depth();
        self.layers.lock().entry(depth).or_default().insert(key, value)
    }

    /// Returns the visible value for `key`, storing `value` first if there is none.
    ///
    /// The check and the insert happen under one lock, so concurrent callers agree on a single
    /// value.
    pub fn get_or_set(&self, key: K, value: V) -> V
    where
        V: Clone,
    {
        self.get_or_insert_with(key, || value)
    }

    /// Returns the visible value for `key`, storing the result of `make` first if there is none.
    ///
    /// `make` runs while the cache is locked. It must not touch this cache.
    pub fn get_or_insert_with(&self, key: K, make: impl FnOnce() -> V) -> V
    where
        V: Clone,
    {
        let depth = self.depth();
        let mut layers = self.layers.lock();
        if let Some(found) = find(&layers, depth, &key) {
            return found.clone();
        }

        let value = make();
        layers.entry(depth).or_default().insert(key, value.clone());
        value
    }

    /// Removes `key` from the layer of the current depth.
    ///
    /// Outer layers are untouched, so an older committed value may become visible again.
    pub fn invalidate(&self, key: &K) -> Option<V> {
        let depth = self.depth();
        self.layers.lock().get_mut(&depth)?.remove(key)
    }

    /// Removes `key` from the layer of the current depth if it still holds a value matching
    /// `predicate`.
    pub fn invalidate_if(&self, key: &K, predicate: impl FnOnce(&V) -> bool) -> Option<V> {
        let depth = self.depth();
        let mut layers = self.layers.lock();
        let layer = layers.get_mut(&depth)?;
        if predicate(layer.get(key)?) { layer.remove(key) } else { None }
    }

    /// Merges the layer at `depth + 1` into the layer at the current depth.
    ///
    /// Merged entries overwrite entries of the same key. Returns the number of entries merged,
    /// `0` if the layer does not exist.
    pub fn commit(&self) -> usize {
        let depth = self.depth();
        let mut layers = self.layers.lock();
        let Some(committed) = layers.remove(&(depth + 1)) else {
            return 0;
        };

        let merged = committed.len();
        layers.entry(depth).or_default().extend(committed);
        merged
    }

    /// Discards the layer at `depth + 1`.
    ///
    /// Returns the number of entries discarded, `0` if the layer does not exist.
    pub fn rollback(&self) -> usize {
        let depth = self.depth();
        self.layers.lock().remove(&(depth + 1)).map_or(0, |layer| layer.len())
    }

    /// Returns a copy of every layer, keyed by depth.
    pub fn contents(&self) -> Layers<K, V>
    where
        K: Clone,
        V: Clone,
    {
        self.layers.lock().clone()
    }

    /// Returns the number of entries across all layers.
    ///
    /// A key shadowed by a deeper layer is counted once per layer holding it.
    pub fn len(&self) -> usize {
        self.layers.lock().values().map(HashMap::len).sum()
    }

    /// Returns `true` if no layer holds an entry.
    pub fn is_empty(&self) -> bool {
        self.layers.lock().values().all(HashMap::is_empty)
    }

    /// Drops every entry and every transaction layer.
    pub fn clear(&self) {
        let mut layers = self.layers.lock();
        layers.clear();
        layers.insert(0, HashMap::new());
    }
}

impl<K, V> Default for LayeredCache<K, V, DepthCounter>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self::new(DepthCounter::new())
    }
}

impl<K, V, D> LayerControl for LayeredCache<K, V, D>
where
    K: Eq + Hash + Send,
    V: Send,
    D: DepthSource,
{
    fn commit(&self) -> usize {
        Self::commit(self)
    }

    fn rollback(&self) -> usize {
        Self::rollback(self)
    }
}

impl<K, V, D> Debug for LayeredCache<K, V, D>
where
    K: Debug,
    V: Debug,
    D: DepthSource,
{
    #[cfg_attr(test, mutants::skip)]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LayeredCache")
            .field("depth", &self.depth.depth())
            .field("layers", &*self.layers.lock())
            .finish()
    }
}

fn find<'a, K, V>(layers: &'a Layers<K, V>, depth: Depth, key: &K) -> Option<&'a V>
where
    K: Eq + Hash,
{
    layers.range(..=depth).rev().find_map(|(_, layer)| layer.get(key))
}
