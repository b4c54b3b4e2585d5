// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Integration tests for layered and self-transacting caches.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use stratum_layers::{DepthCounter, LayerControl, LayeredCache, TransactionalCache};

static_assertions::assert_impl_all!(LayeredCache<String, Arc<str>>: Send, Sync);
static_assertions::assert_impl_all!(TransactionalCache<String, Arc<str>>: Send, Sync);
static_assertions::assert_impl_all!(DepthCounter: Send, Sync, Clone);
static_assertions::assert_obj_safe!(LayerControl);

#[test]
fn rollback_restores_previous_values() {
    let cache = TransactionalCache::new();
    cache.set("foo", 1);

    let outcome: Result<(), &str> = cache.transaction(|cache| {
        cache.set("foo", 3);
        cache.set("bar", 2);
        assert_eq!(cache.get(&"foo"), Some(3));
        Err("abort")
    });

    assert_eq!(outcome, Err("abort"));
    assert_eq!(cache.get(&"foo"), Some(1));
    assert_eq!(cache.get(&"bar"), None);
    assert_eq!(cache.contents(), BTreeMap::from([(0, HashMap::from([("foo", 1)]))]));
}

#[test]
fn commit_keeps_transaction_values() {
    let cache = TransactionalCache::new();
    cache.set("foo", 1);

    let outcome: Result<i32, ()> = cache.transaction(|cache| {
        cache.set("foo", 3);
        cache.set("bar", 2);
        Ok(7)
    });

    assert_eq!(outcome, Ok(7));
    assert_eq!(cache.get(&"foo"), Some(3));
    assert_eq!(cache.get(&"bar"), Some(2));
    assert_eq!(cache.contents().len(), 1, "only the root layer remains");
}

#[test]
fn nested_rollback_keeps_outer_writes() {
    let cache = TransactionalCache::new();

    let outcome: Result<(), ()> = cache.transaction(|cache| {
        cache.set("outer", 1);
        let inner: Result<(), ()> = cache.transaction(|cache| {
            cache.set("inner", 2);
            Err(())
        });
        assert!(inner.is_err());
        assert_eq!(cache.get(&"inner"), None);
        Ok(())
    });

    assert!(outcome.is_ok());
    assert_eq!(cache.get(&"outer"), Some(1));
    assert_eq!(cache.get(&"inner"), None);
}

#[test]
fn nested_commit_then_outer_rollback_discards_everything() {
    let cache = TransactionalCache::new();

    let outcome: Result<(), ()> = cache.transaction(|cache| {
        let inner: Result<(), ()> = cache.transaction(|cache| {
            cache.set("inner", 2);
            Ok(())
        });
        assert!(inner.is_ok());
        assert_eq!(cache.get(&"inner"), Some(2));
        Err(())
    });

    assert!(outcome.is_err());
    assert!(cache.is_empty());
}

#[test]
fn many_caches_follow_one_counter() {
    let depth = DepthCounter::new();
    let numbers: Arc<LayeredCache<&str, i32>> = Arc::new(LayeredCache::new(depth.clone()));
    let names: Arc<LayeredCache<i32, String>> = Arc::new(LayeredCache::new(depth.clone()));
    let controls: Vec<Arc<dyn LayerControl>> = vec![numbers.clone(), names.clone()];

    depth.enter();
    numbers.set("one", 1);
    names.set(1, "one".to_string());
    depth.exit().expect("open");

    let merged: usize = controls.iter().map(|control| control.commit()).sum();
    assert_eq!(merged, 2);
    assert_eq!(numbers.get(&"one"), Some(1));
    assert_eq!(names.get(&1).as_deref(), Some("one"));
}

#[tokio::test]
async fn async_transaction_commits_on_ok() {
    let cache = TransactionalCache::new();

    let outcome: Result<(), ()> = cache
        .transaction_async(|| async {
            cache.set("foo", 1);
            tokio::time::sleep(Duration::from_millis(1)).await;
            Ok(())
        })
        .await;

    assert!(outcome.is_ok());
    assert_eq!(cache.depth(), 0);
    assert_eq!(cache.get(&"foo"), Some(1));
}

#[tokio::test]
async fn async_transaction_rolls_back_on_err() {
    let cache = TransactionalCache::new();
    cache.set("foo", 1);

    let outcome: Result<(), String> = cache
        .transaction_async(|| async {
            cache.set("foo", 2);
            Err("rollback".to_string())
        })
        .await;

    assert_eq!(outcome.unwrap_err(), "rollback");
    assert_eq!(cache.get(&"foo"), Some(1));
}

#[tokio::test]
async fn cancelled_async_transaction_rolls_back() {
    let cache = TransactionalCache::new();
    cache.set("foo", 1);

    let timed_out = tokio::time::timeout(
        Duration::from_millis(5),
        cache.transaction_async(|| async {
            cache.set("foo", 2);
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok::<_, ()>(())
        }),
    )
    .await;

    assert!(timed_out.is_err());
    assert_eq!(cache.depth(), 0);
    assert_eq!(cache.get(&"foo"), Some(1));
}

#[test]
fn concurrent_get_or_set_agrees_on_one_value() {
    let cache = Arc::new(LayeredCache::<u32, u32>::default());

    let handles: Vec<_> = (0..8)
        .map(|worker| {
            let cache = Arc::clone(&cache);
            std::thread::spawn(move || cache.get_or_set(1, worker))
        })
        .collect();

    let seen: Vec<u32> = handles.into_iter().map(|h| h.join().expect("worker panicked")).collect();
    assert!(seen.windows(2).all(|pair| pair[0] == pair[1]), "got: {seen:?}");
    assert_eq!(cache.len(), 1);
}

#[test]
fn blocking_executor_drives_async_transactions() {
    let cache = TransactionalCache::new();
    let outcome: Result<u8, ()> = futures::executor::block_on(cache.transaction_async(|| async {
        cache.set("foo", 1);
        Ok(1)
    }));

    assert_eq!(outcome, Ok(1));
    assert_eq!(cache.get(&"foo"), Some(1));
}
