// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Transaction-aware cache layers.
//!
//! This crate provides [`LayeredCache`], a key-value store holding one layer per open
//! transaction depth. Writes land in the layer of the current depth and reads scan from the
//! current depth down to the root, so a write made inside a transaction shadows the committed
//! value until the transaction ends. When the transaction ends the layer is either merged into
//! its parent ([`LayeredCache::commit`]) or discarded ([`LayeredCache::rollback`]).
//!
//! The cache does not own its depth. It reads it through a [`DepthSource`], usually a
//! [`DepthCounter`] shared with whatever drives the transactions, so many caches can follow
//! one transaction stack.
//!
//! # Example
//!
//! ```
//! use stratum_layers::{DepthCounter, LayeredCache};
//!
//! let depth = DepthCounter::new();
//! let cache = LayeredCache::new(depth.clone());
//!
//! cache.set("foo", 1);
//!
//! depth.enter();
//! cache.set("foo", 3);
//! cache.set("bar", 2);
//! assert_eq!(cache.get(&"foo"), Some(3));
//!
//! // Leave the transaction first, then discard what it wrote.
//! depth.exit()?;
//! cache.rollback();
//!
//! assert_eq!(cache.get(&"foo"), Some(1));
//! assert_eq!(cache.get(&"bar"), None);
//! # Ok::<(), stratum_layers::Error>(())
//! ```
//!
//! For a cache that drives its own transactions, see [`TransactionalCache`].

mod depth;
pub mod error;
mod layered;
mod transactional;

#[doc(inline)]
pub use depth::{Depth, DepthCounter, DepthSource};
#[doc(inline)]
pub use error::{Error, Result};
#[doc(inline)]
pub use layered::{LayerControl, LayeredCache, Layers};
#[doc(inline)]
pub use transactional::TransactionalCache;
