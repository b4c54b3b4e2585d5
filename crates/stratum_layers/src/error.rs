// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Error types for layer bookkeeping.

/// An error from transaction depth bookkeeping.
///
/// Raised when a transaction is closed that was never opened, which would otherwise drive the
/// depth below zero.
///
/// # Example
///
/// ```
/// use stratum_layers::DepthCounter;
///
/// let depth = DepthCounter::new();
/// let error = depth.exit().expect_err("no transaction is open");
/// assert!(error.to_string().contains("no transaction to exit"));
/// ```
#[ohno::error]
pub struct Error {}

impl Error {
    /// Creates a new error from any type that can be converted to an error.
    pub fn from_message(cause: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::caused_by(cause)
    }

    pub(crate) fn no_open_transaction(action: &str) -> Self {
        Self::caused_by(format!("no transaction to {action}"))
    }
}

/// A specialized [`Result`] type for layer bookkeeping.
pub type Result<T> = std::result::Result<T, Error>;
