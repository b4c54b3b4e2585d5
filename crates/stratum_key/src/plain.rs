// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use serde::Serialize;

use crate::{CacheKey, Error, KeyArg, KeyArgs};

/// Plain data keyed by its structural content.
///
/// `Plain` serializes a value to JSON once, when constructed, and uses that text as the key.
/// Two values with equal content in the same order share a key regardless of where they
/// live in memory. Field order is significant.
///
/// # Examples
///
/// ```
/// use serde_json::json;
/// use stratum_key::{CacheKey, Plain, derive_key};
///
/// let range = Plain::new(&json!({ "from": 1, "to": 5 }))?;
/// assert_eq!(derive_key(&(&range,)), CacheKey::from(r#"__{"from":1,"to":5}"#));
/// # Ok::<(), stratum_key::Error>(())
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Plain {
    json: String,
}

impl Plain {
    /// Serializes `value` into its structural form.
    ///
    /// # Errors
    ///
    /// Returns an error if `value` cannot be represented as JSON, such as a map whose keys
    /// are not strings.
    pub fn new<T: Serialize + ?Sized>(value: &T) -> Result<Self, Error> {
        let json = serde_json::to_string(value).map_err(Error::from_message)?;
        Ok(Self { json })
    }

    /// Returns the serialized form.
    #[must_use]
    pub fn as_json(&self) -> &str {
        &self.json
    }
}

impl KeyArg for Plain {
    fn cache_key(&self) -> CacheKey {
        CacheKey::prefixed(&self.json)
    }
}

impl KeyArgs for Plain {
    fn derive(&self) -> CacheKey {
        self.cache_key()
    }
}
