// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Demonstrates memoized reads that follow the transactions of a resource.
//!
//! A report total is memoized per day. Totals read inside a transaction that commits are
//! kept, totals read inside a transaction that rolls back are forgotten.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use stratum::testing::{MockError, MockResource};
use stratum::{MemoBuilder, Transactional};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), MockError> {
    let subscriber = tracing_subscriber::fmt().with_max_level(tracing::Level::DEBUG).finish();
    tracing::subscriber::set_global_default(subscriber).map_err(MockError::from_message)?;

    let queries = Arc::new(AtomicUsize::new(0));
    let totals = MemoBuilder::new().name("daily_totals").memoize_with_transaction_async({
        let queries = Arc::clone(&queries);
        move |_db: Transactional<MockResource>, day: u32| {
            let queries = Arc::clone(&queries);
            async move {
                queries.fetch_add(1, Ordering::Relaxed);
                u64::from(day) * 100
            }
        }
    });

    let db = Transactional::new(MockResource::new());

    println!("Monday outside a transaction: {}", totals.call(&db, 1).await);

    db.transaction(|| async {
        println!("Tuesday inside a committed transaction: {}", totals.call(&db, 2).await);
        Ok(())
    })
    .await?;

    let outcome: Result<(), MockError> = db
        .transaction(|| async {
            println!("Wednesday inside a failed transaction: {}", totals.call(&db, 3).await);
            Err(MockError::from_message("ledger rejected the entry"))
        })
        .await;
    println!("Failed transaction: {outcome:?}");

    let cached: Vec<_> = totals.contents(&db)[&0].keys().map(ToString::to_string).collect();
    println!("Cached days: {cached:?}");
    println!("Queries run: {}", queries.load(Ordering::Relaxed));

    Ok(())
}
