// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Stable memoization keys for heterogeneous argument lists.
//!
//! This crate turns argument tuples into a [`CacheKey`] suitable for looking up memoized
//! results. Each argument is classified by its [`KeyArg`] implementation:
//!
//! - **Primitives** (strings, integers, floats) map to themselves.
//! - **Absent and boolean values** map to four distinct sentinels, so `None`, `()`,
//!   `false`, `0` and `""` never collide.
//! - **Plain data** ([`serde_json::Value`] aggregates and [`Plain`]) is serialized
//!   structurally, preserving field order.
//! - **Identity-bearing values** ([`std::sync::Arc`] and [`Identity`]) receive a surrogate
//!   token on first sighting that is reused for the same reference, so two structurally
//!   equal objects still produce different keys.
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//!
//! use stratum_key::{CacheKey, derive_key};
//!
//! assert_eq!(derive_key(&()), CacheKey::Int(0));
//! assert_eq!(derive_key(&(1,)), CacheKey::Int(1));
//! assert_eq!(derive_key(&("foo", 2, 3)), CacheKey::from(r#"["foo",2,3]"#));
//!
//! struct Project {
//!     name: String,
//! }
//!
//! let a = Arc::new(Project { name: "a".into() });
//! let b = Arc::new(Project { name: "a".into() });
//! assert_eq!(derive_key(&(&a,)), derive_key(&(&a,)));
//! assert_ne!(derive_key(&(&a,)), derive_key(&(&b,)));
//! ```
//!
//! # Order Sensitivity
//!
//! Plain data is serialized in the order its fields or map entries are produced, so two
//! JSON objects holding the same members in a different order produce different keys.
//! Normalize the order before deriving a key if this matters to the caller.

mod arg;
pub mod error;
mod identity;
mod key;
mod plain;

#[doc(inline)]
pub use arg::{KeyArg, KeyArgs, derive_key};
#[doc(inline)]
pub use error::{Error, Result};
#[doc(inline)]
pub use identity::Identity;
#[doc(inline)]
pub use key::{CacheKey, FALSE_KEY, NULL_KEY, TRUE_KEY, UNDEFINED_KEY};
#[doc(inline)]
pub use plain::Plain;
