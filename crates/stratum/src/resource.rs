// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

/// A resource with a native transaction primitive, such as a database connection.
///
/// Implementors run `work` inside their own transaction: commit when it resolves to `Ok`,
/// roll back when it resolves to `Err`, and return the outcome unchanged. Wrap the resource
/// in a [`Transactional`](crate::Transactional) handle to keep memoized caches in step with
/// those transactions.
///
/// # Examples
///
/// ```
/// use stratum::TransactionalResource;
///
/// struct Ledger;
///
/// impl TransactionalResource for Ledger {
///     type Error = std::io::Error;
///
///     async fn transaction<T, F, Fut>(&self, work: F) -> Result<T, Self::Error>
///     where
///         T: Send,
///         F: FnOnce() -> Fut + Send,
///         Fut: Future<Output = Result<T, Self::Error>> + Send,
///     {
///         // BEGIN
///         let outcome = work().await;
///         // COMMIT or ROLLBACK depending on `outcome`
///         outcome
///     }
/// }
/// ```
pub trait TransactionalResource: Send + Sync {
    /// The error type produced by the resource and by transaction work.
    type Error: Send;

    /// Runs `work` inside a native transaction.
    fn transaction<T, F, Fut>(&self, work: F) -> impl Future<Output = Result<T, Self::Error>> + Send
    where
        T: Send,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<T, Self::Error>> + Send;
}
