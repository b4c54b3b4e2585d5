// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Memoization that stays consistent with the transactions of the resource it reads from.
//!
//! Functions that read from a database are often expensive and pure with respect to the
//! database state. Caching their results is only safe if the cache forgets whatever was
//! computed inside a transaction that later rolls back. This crate keeps one cache layer per
//! open transaction and folds it into the enclosing scope on commit or drops it on rollback.
//!
//! # Overview
//!
//! - [`TransactionalResource`] abstracts the native transaction primitive of a resource.
//! - [`Transactional`] wraps a resource with the transaction depth and the registry of caches
//!   that follow it. Run transactions through [`Transactional::transaction`] or
//!   [`run_transaction`].
//! - [`memoize_with_transaction`] and [`memoize_with_transaction_async`] memoize a function
//!   per resource and per transaction depth.
//! - [`memoize`] and [`memoize_async`] memoize a function with a single flat cache, with no
//!   transaction awareness.
//! - [`MemoBuilder`] configures the log label of a cache and whether it logs at all.
//!
//! Arguments are turned into cache keys by [`stratum_key`]. Primitives key by value, plain
//! data by structure, and [`Arc`](std::sync::Arc) or [`Identity`] values by reference.
//!
//! # Example
//!
//! ```
//! use stratum::{Transactional, TransactionalResource, memoize_with_transaction};
//!
//! # struct Database;
//! # impl TransactionalResource for Database {
//! #     type Error = String;
//! #     async fn transaction<T, F, Fut>(&self, work: F) -> Result<T, Self::Error>
//! #     where
//! #         T: Send,
//! #         F: FnOnce() -> Fut + Send,
//! #         Fut: Future<Output = Result<T, Self::Error>> + Send,
//! #     {
//! #         work().await
//! #     }
//! # }
//! let greet = memoize_with_transaction(|_db: &Transactional<Database>, name: &str| format!("Hello, {name}"));
//! let db = Transactional::new(Database);
//!
//! # futures::executor::block_on(async {
//! let outcome: Result<(), String> = db
//!     .transaction(|| async {
//!         greet.call(&db, "World");
//!         Err("abort".to_string())
//!     })
//!     .await;
//!
//! assert!(outcome.is_err());
//! // The greeting computed inside the failed transaction was discarded.
//! assert!(greet.contents(&db)[&0].is_empty());
//! # });
//! ```
//!
//! # Logging
//!
//! Caches emit `tracing` events named `memo.event` with the fields `cache.name`,
//! `cache.operation`, `cache.activity`, `cache.depth` and `cache.entries`. Lookups and
//! inserts are logged at `DEBUG`, evictions and transaction outcomes at `INFO`.
//!
//! # Testing
//!
//! Enable the `test-util` feature for [`testing::MockResource`], a transactional resource
//! that records the transactions it runs and can be told to fail them.

mod builder;
mod memo;
mod memoize;
mod resource;
mod telemetry;
#[cfg(any(feature = "test-util", test))]
#[cfg_attr(docsrs, doc(cfg(feature = "test-util")))]
pub mod testing;
mod transaction;

#[doc(inline)]
pub use builder::MemoBuilder;
#[doc(inline)]
pub use memo::{SharedResult, TransactionalMemo, memoize_with_transaction, memoize_with_transaction_async};
#[doc(inline)]
pub use memoize::{AsyncMemoized, Memoized, memoize, memoize_async};
#[doc(inline)]
pub use resource::TransactionalResource;
#[doc(inline)]
pub use stratum_key::{CacheKey, Identity, KeyArg, KeyArgs, Plain};
#[doc(inline)]
pub use stratum_layers::{Depth, Layers};
#[doc(inline)]
pub use transaction::{Transactional, run_transaction};
