// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Error types for key derivation.

/// An error raised while deriving a cache key.
///
/// Key derivation itself is infallible; this error only surfaces when plain data cannot be
/// serialized into its structural form, for example a map keyed by non-string values.
///
/// # Example
///
/// ```
/// use stratum_key::Error;
///
/// let error = Error::from_message("key must be a string");
/// assert!(error.to_string().contains("key must be a string"));
/// ```
#[ohno::error]
pub struct Error {}

impl Error {
    /// Creates a new error from any type that can be converted to an error.
    pub fn from_message(cause: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::caused_by(cause)
    }
}

/// A specialized [`Result`] type for key derivation.
pub type Result<T> = std::result::Result<T, Error>;
