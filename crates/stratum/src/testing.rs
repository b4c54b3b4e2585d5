// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Mock transactional resource for testing.
//!
//! This module provides `MockResource`, a [`TransactionalResource`] that records every
//! transaction it runs and supports failure injection for testing rollback paths.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::TransactionalResource;

/// Recorded transaction step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionOp {
    /// A transaction was opened.
    Begin,
    /// A transaction was committed.
    Commit,
    /// A transaction was rolled back.
    Rollback,
}

/// Error produced by [`MockResource`] and by test transaction work.
///
/// # Example
///
/// ```
/// use stratum::testing::MockError;
///
/// let error = MockError::from_message("Rollback");
/// assert!(error.to_string().contains("Rollback"));
/// ```
#[ohno::error]
pub struct MockError {}

impl MockError {
    /// Creates a new error from any type that can be converted to an error.
    pub fn from_message(cause: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::caused_by(cause)
    }
}

type FailPredicate = Box<dyn Fn(&TransactionOp) -> bool + Send + Sync>;

/// A recording mock resource for testing.
///
/// Every transaction records [`TransactionOp::Begin`] followed by [`TransactionOp::Commit`] or
/// [`TransactionOp::Rollback`]. Clones share their recordings.
///
/// # Examples
///
/// ```
/// use stratum::Transactional;
/// use stratum::testing::{MockError, MockResource, TransactionOp};
///
/// # futures::executor::block_on(async {
/// let mock = MockResource::new();
/// let db = Transactional::new(mock.clone());
///
/// db.transaction(|| async { Ok::<_, MockError>(()) }).await?;
///
/// assert_eq!(mock.operations(), vec![TransactionOp::Begin, TransactionOp::Commit]);
/// # Ok::<(), MockError>(())
/// # }).unwrap();
/// ```
///
/// # Failure Injection
///
/// ```
/// use stratum::Transactional;
/// use stratum::testing::{MockError, MockResource, TransactionOp};
///
/// # futures::executor::block_on(async {
/// let mock = MockResource::new();
/// let db = Transactional::new(mock.clone());
///
/// // Work succeeds but the commit itself fails.
/// mock.fail_when(|op| *op == TransactionOp::Commit);
/// assert!(db.transaction(|| async { Ok::<_, MockError>(()) }).await.is_err());
/// assert_eq!(mock.operations(), vec![TransactionOp::Begin, TransactionOp::Rollback]);
/// # });
/// ```
#[derive(Clone, Default)]
pub struct MockResource {
    operations: Arc<Mutex<Vec<TransactionOp>>>,
    fail_when: Arc<Mutex<Option<FailPredicate>>>,
}

impl std::fmt::Debug for MockResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockResource")
            .field("operations", &self.operations)
            .field("fail_when", &self.fail_when.lock().is_some())
            .finish()
    }
}

impl MockResource {
    /// Creates a new mock resource with no recorded operations.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a predicate that determines when a transaction step should fail.
    ///
    /// Failing [`TransactionOp::Begin`] fails the transaction before its work runs. Failing
    /// [`TransactionOp::Commit`] turns a successful transaction into a rolled back one.
    pub fn fail_when<F>(&self, predicate: F)
    where
        F: Fn(&TransactionOp) -> bool + Send + Sync + 'static,
    {
        *self.fail_when.lock() = Some(Box::new(predicate));
    }

    /// Clears the failure predicate, allowing all transactions to succeed.
    pub fn clear_failures(&self) {
        *self.fail_when.lock() = None;
    }

    /// Returns a clone of all recorded operations.
    #[must_use]
    pub fn operations(&self) -> Vec<TransactionOp> {
        self.operations.lock().clone()
    }

    /// Clears all recorded operations.
    pub fn clear_operations(&self) {
        self.operations.lock().clear();
    }

    fn should_fail(&self, op: TransactionOp) -> bool {
        self.fail_when.lock().as_ref().is_some_and(|predicate| predicate(&op))
    }

    fn record(&self, op: TransactionOp) {
        self.operations.lock().push(op);
    }
}

impl TransactionalResource for MockResource {
    type Error = MockError;

    async fn transaction<T, F, Fut>(&self, work: F) -> Result<T, Self::Error>
    where
        T: Send,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<T, Self::Error>> + Send,
    {
        if self.should_fail(TransactionOp::Begin) {
            return Err(MockError::from_message("injected begin failure"));
        }
        self.record(TransactionOp::Begin);

        match work().await {
            Ok(_) if self.should_fail(TransactionOp::Commit) => {
                self.record(TransactionOp::Rollback);
                Err(MockError::from_message("injected commit failure"))
            }
            Ok(value) => {
                self.record(TransactionOp::Commit);
                Ok(value)
            }
            Err(error) => {
                self.record(TransactionOp::Rollback);
                Err(error)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_commit() {
        let mock = MockResource::new();
        let outcome = futures::executor::block_on(mock.transaction(|| async { Ok(1) }));
        assert_eq!(outcome.ok(), Some(1));
        assert_eq!(mock.operations(), vec![TransactionOp::Begin, TransactionOp::Commit]);
    }

    #[test]
    fn records_rollback_and_keeps_error() {
        let mock = MockResource::new();
        let outcome: Result<(), _> =
            futures::executor::block_on(mock.transaction(|| async { Err(MockError::from_message("Rollback")) }));

        let error = outcome.expect_err("work failed");
        assert!(error.to_string().contains("Rollback"));
        assert_eq!(mock.operations(), vec![TransactionOp::Begin, TransactionOp::Rollback]);
    }

    #[test]
    fn begin_failure_skips_work() {
        let mock = MockResource::new();
        mock.fail_when(|op| *op == TransactionOp::Begin);

        let ran = std::sync::atomic::AtomicBool::new(false);
        let outcome = futures::executor::block_on(mock.transaction(|| async {
            ran.store(true, std::sync::atomic::Ordering::Relaxed);
            Ok(())
        }));

        assert!(outcome.is_err());
        assert!(!ran.load(std::sync::atomic::Ordering::Relaxed));
        assert!(mock.operations().is_empty());
    }

    #[test]
    fn clearing_resets_state() {
        let mock = MockResource::new();
        mock.fail_when(|_| true);
        mock.clear_failures();
        futures::executor::block_on(mock.transaction(|| async { Ok::<_, MockError>(()) })).expect("no failures");

        mock.clear_operations();
        assert!(mock.operations().is_empty());
        assert!(format!("{mock:?}").contains("fail_when: false"));
    }
}
