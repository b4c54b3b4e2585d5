// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Integration tests for memoization that follows resource transactions.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use stratum::testing::{MockError, MockResource, TransactionOp};
use stratum::{
    CacheKey, SharedResult, Transactional, TransactionalMemo, memoize_with_transaction,
    memoize_with_transaction_async, run_transaction,
};

static_assertions::assert_impl_all!(Transactional<MockResource>: Send, Sync, Clone);
static_assertions::assert_impl_all!(SharedResult<Result<String, String>>: Send, Sync, Clone);

type Db = Transactional<MockResource>;
type Echo = SharedResult<Result<String, String>>;

/// Memoizes a function that echoes its argument from inside its own transaction.
fn echo(
    executed: Arc<AtomicUsize>,
) -> Arc<TransactionalMemo<MockResource, impl Fn(&Db, String) -> Echo + Send + Sync, Echo>> {
    Arc::new(memoize_with_transaction_async(move |db: Db, value: String| {
        let executed = Arc::clone(&executed);
        async move {
            db.transaction(move || async move {
                executed.fetch_add(1, Ordering::Relaxed);
                Ok(value)
            })
            .await
            .map_err(|error| error.to_string())
        }
    }))
}

fn keys<V>(layer: &HashMap<CacheKey, V>) -> HashSet<CacheKey> {
    layer.keys().cloned().collect()
}

#[tokio::test]
async fn concurrent_calls_share_one_execution() {
    let db = Transactional::new(MockResource::new());
    let executed = Arc::new(AtomicUsize::new(0));
    let memo = memoize_with_transaction_async({
        let executed = Arc::clone(&executed);
        move |db: Db, value: i64| {
            let executed = Arc::clone(&executed);
            async move {
                db.transaction(move || async move {
                    executed.fetch_add(1, Ordering::Relaxed);
                    Ok(value + 10)
                })
                .await
                .map_err(|error| error.to_string())
            }
        }
    });

    let res1 = memo.call(&db, 5);
    let res2 = memo.call(&db, 5);
    let res3 = memo.call(&db, 4);
    let res4 = memo.call(&db, 4);

    assert!(res1.ptr_eq(&res2));
    assert!(res3.ptr_eq(&res4));
    assert!(!res1.ptr_eq(&res3));

    assert_eq!(res1.clone().await, Ok(15));
    assert_eq!(res2.await, Ok(15));
    assert_eq!(res3.clone().await, Ok(14));
    assert_eq!(res4.await, Ok(14));
    assert_eq!(executed.load(Ordering::Relaxed), 2);

    let contents = memo.contents(&db);
    assert_eq!(contents.len(), 1);
    assert!(contents[&0][&CacheKey::Int(5)].ptr_eq(&res1));
    assert!(contents[&0][&CacheKey::Int(4)].ptr_eq(&res3));
}

#[tokio::test]
async fn nested_transaction_commits_into_root() {
    let mock = MockResource::new();
    let db = Transactional::new(mock.clone());
    let executed = Arc::new(AtomicUsize::new(0));
    let memo = echo(Arc::clone(&executed));

    let promise1 = memo.call(&db, "Hello".to_string());
    let value1 = promise1.clone().await;

    let (value2, promise2) = run_transaction(&db, {
        let db = db.clone();
        let memo = Arc::clone(&memo);
        move || async move {
            let promise2 = memo.call(&db, " World".to_string());

            let contents = memo.contents(&db);
            assert_eq!(keys(&contents[&0]), HashSet::from([CacheKey::from("Hello")]));
            assert_eq!(keys(&contents[&1]), HashSet::from([CacheKey::from(" World")]));

            let value2 = promise2.clone().await.map_err(MockError::from_message)?;
            Ok((value2, promise2))
        }
    })
    .await
    .expect("transaction commits");

    let contents = memo.contents(&db);
    assert_eq!(contents.len(), 1, "the transaction layer was merged");
    assert!(contents[&0][&CacheKey::from("Hello")].ptr_eq(&promise1));
    assert!(contents[&0][&CacheKey::from(" World")].ptr_eq(&promise2));

    assert_eq!(value1, Ok("Hello".to_string()));
    assert_eq!(value2, " World");
    assert_eq!(executed.load(Ordering::Relaxed), 2);
    assert_eq!(db.depth(), 0);
    assert_eq!(
        mock.operations(),
        vec![
            // "Hello" outside any transaction
            TransactionOp::Begin,
            TransactionOp::Commit,
            // outer transaction around the " World" call nested inside it
            TransactionOp::Begin,
            TransactionOp::Begin,
            TransactionOp::Commit,
            TransactionOp::Commit,
        ]
    );
}

#[tokio::test]
async fn failed_transaction_discards_its_layer() {
    let db = Transactional::new(MockResource::new());
    let executed = Arc::new(AtomicUsize::new(0));
    let memo = echo(Arc::clone(&executed));

    let promise1 = memo.call(&db, "Hello".to_string());
    assert_eq!(promise1.clone().await, Ok("Hello".to_string()));

    let outcome: Result<(), MockError> = db
        .transaction({
            let db = db.clone();
            let memo = Arc::clone(&memo);
            move || async move {
                let promise2 = memo.call(&db, " World".to_string());
                assert_eq!(promise2.await, Ok(" World".to_string()));
                assert_eq!(memo.contents(&db).len(), 2);
                Err(MockError::from_message("Rollback"))
            }
        })
        .await;

    let error = outcome.expect_err("transaction rolls back");
    assert!(error.to_string().contains("Rollback"), "got: {error}");
    assert_eq!(db.depth(), 0);

    let contents = memo.contents(&db);
    assert_eq!(contents.len(), 1);
    assert_eq!(keys(&contents[&0]), HashSet::from([CacheKey::from("Hello")]));
    assert!(contents[&0][&CacheKey::from("Hello")].ptr_eq(&promise1));

    let before = executed.load(Ordering::Relaxed);
    assert_eq!(memo.call(&db, " World".to_string()).await, Ok(" World".to_string()));
    assert_eq!(
        executed.load(Ordering::Relaxed),
        before + 1,
        "the rolled back result is computed again"
    );
}

#[tokio::test]
async fn sync_memo_follows_nested_transactions() {
    let db = Transactional::new(MockResource::new());
    let executed = Arc::new(AtomicUsize::new(0));
    let minutes = Arc::new(memoize_with_transaction({
        let executed = Arc::clone(&executed);
        move |_: &Db, (day, hours): (u32, u32)| {
            executed.fetch_add(1, Ordering::Relaxed);
            day * 1000 + hours * 60
        }
    }));

    assert_eq!(minutes.call(&db, (1, 2)), 1120);

    let outcome = db
        .transaction({
            let db = db.clone();
            let minutes = Arc::clone(&minutes);
            move || async move {
                assert_eq!(minutes.call(&db, (1, 2)), 1120, "root entries are visible inside");
                assert_eq!(minutes.call(&db, (2, 1)), 2060);

                let inner: Result<(), MockError> = db
                    .transaction({
                        let db = db.clone();
                        let minutes = Arc::clone(&minutes);
                        move || async move {
                            assert_eq!(minutes.call(&db, (3, 1)), 3060);
                            assert_eq!(minutes.contents(&db).len(), 3);
                            Err(MockError::from_message("inner"))
                        }
                    })
                    .await;
                assert!(inner.is_err());
                assert_eq!(minutes.contents(&db).len(), 2, "inner layer was dropped");

                Ok::<_, MockError>(())
            }
        })
        .await;
    assert!(outcome.is_ok());

    let contents = minutes.contents(&db);
    assert_eq!(contents.len(), 1);
    assert_eq!(
        keys(&contents[&0]),
        HashSet::from([CacheKey::from("[1,2]"), CacheKey::from("[2,1]")])
    );
    assert_eq!(executed.load(Ordering::Relaxed), 3);
}

#[tokio::test]
async fn cancelled_transaction_rolls_back() {
    let db = Transactional::new(MockResource::new());
    let memo = Arc::new(memoize_with_transaction(|_: &Db, n: u64| n * 2));
    memo.call(&db, 1);

    let timed_out = tokio::time::timeout(
        Duration::from_millis(10),
        db.transaction({
            let db = db.clone();
            let memo = Arc::clone(&memo);
            move || async move {
                memo.call(&db, 2);
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok::<_, MockError>(())
            }
        }),
    )
    .await;

    assert!(timed_out.is_err());
    assert_eq!(db.depth(), 0);
    let contents = memo.contents(&db);
    assert_eq!(contents.len(), 1);
    assert_eq!(keys(&contents[&0]), HashSet::from([CacheKey::Int(1)]));
}

#[tokio::test]
async fn failed_commit_rolls_back_caches() {
    let mock = MockResource::new();
    let db = Transactional::new(mock.clone());
    let memo = Arc::new(memoize_with_transaction(|_: &Db, n: u64| n + 1));

    mock.fail_when(|op| *op == TransactionOp::Commit);
    let outcome = db
        .transaction({
            let db = db.clone();
            let memo = Arc::clone(&memo);
            move || async move {
                memo.call(&db, 7);
                Ok::<_, MockError>(())
            }
        })
        .await;

    assert!(outcome.is_err(), "work succeeded but the resource failed to commit");
    assert!(memo.contents(&db)[&0].is_empty());
}

#[tokio::test]
async fn resources_have_separate_caches() {
    let first = Transactional::new(MockResource::new());
    let second = Transactional::new(MockResource::new());
    let memo = Arc::new(memoize_with_transaction(|_: &Db, n: u64| n));

    first
        .transaction({
            let db = first.clone();
            let memo = Arc::clone(&memo);
            move || async move {
                memo.call(&db, 1);
                Ok::<_, MockError>(())
            }
        })
        .await
        .expect("commit");

    assert_eq!(memo.contents(&first)[&0].len(), 1);
    assert!(memo.contents(&second)[&0].is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_tasks_share_one_execution() {
    let db = Transactional::new(MockResource::new());
    let executed = Arc::new(AtomicUsize::new(0));
    let memo = Arc::new(memoize_with_transaction_async({
        let executed = Arc::clone(&executed);
        move |_: Db, n: u64| {
            let executed = Arc::clone(&executed);
            async move {
                executed.fetch_add(1, Ordering::Relaxed);
                tokio::time::sleep(Duration::from_millis(5)).await;
                n * 3
            }
        }
    }));

    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let memo = Arc::clone(&memo);
            let db = db.clone();
            tokio::spawn(async move { memo.call(&db, 7).await })
        })
        .collect();

    for task in tasks {
        assert_eq!(task.await.expect("task panicked"), 21);
    }
    assert_eq!(executed.load(Ordering::Relaxed), 1);
}
