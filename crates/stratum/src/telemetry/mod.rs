// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Structured logging for memoized caches.
//!
//! Every cache carries a [`MemoTelemetry`] configured from its builder. When logging is
//! enabled, lookups, inserts, evictions and transaction outcomes are emitted as `tracing`
//! events named `memo.event`.

use stratum_layers::Depth;
use tracing::Level;

#[cfg(test)]
pub(crate) mod attributes;
#[cfg(test)]
pub(crate) mod testing;

/// Label and switches for the events a cache emits.
#[derive(Clone, Copy, Debug)]
pub(crate) struct MemoTelemetry {
    name: &'static str,
    logs: bool,
}

impl MemoTelemetry {
    pub(crate) const fn new(name: &'static str, logs: bool) -> Self {
        Self { name, logs }
    }

    pub(crate) const fn name(&self) -> &'static str {
        self.name
    }

    pub(crate) const fn logs_enabled(&self) -> bool {
        self.logs
    }

    /// Records a cache event.
    ///
    /// `entries` is the number of entries the event concerns: the cache size for lookups and
    /// inserts, the merged or discarded count for commits and rollbacks.
    #[inline]
    pub(crate) fn record(&self, operation: MemoOperation, activity: MemoActivity, depth: Depth, entries: usize) {
        if self.logs {
            Self::emit(self.name, operation, activity, depth, entries);
        }
    }

    fn emit(name: &'static str, operation: MemoOperation, activity: MemoActivity, depth: Depth, entries: usize) {
        let op = operation.as_str();
        let ev = activity.as_str();

        // Tracing level must be constant, so we use a macro to select the appropriate level.
        // Field names must match constants in attributes.rs.
        macro_rules! emit_event {
            ($level:ident) => {
                tracing::$level!(
                    cache.name = name,
                    cache.operation = op,
                    cache.activity = ev,
                    cache.depth = depth,
                    cache.entries = entries,
                    "memo.event"
                )
            };
        }

        if activity.level() == Level::INFO {
            emit_event!(info);
        } else {
            emit_event!(debug);
        }
    }
}

impl Default for MemoTelemetry {
    fn default() -> Self {
        Self::new(crate::builder::DEFAULT_NAME, true)
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum MemoOperation {
    Get,
    Insert,
    Evict,
    Commit,
    Rollback,
}

impl MemoOperation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "memo.get",
            Self::Insert => "memo.insert",
            Self::Evict => "memo.evict",
            Self::Commit => "memo.commit",
            Self::Rollback => "memo.rollback",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum MemoActivity {
    Hit,
    Miss,
    Inserted,
    Evicted,
    Committed,
    RolledBack,
}

impl MemoActivity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hit => "memo.hit",
            Self::Miss => "memo.miss",
            Self::Inserted => "memo.inserted",
            Self::Evicted => "memo.evicted",
            Self::Committed => "memo.committed",
            Self::RolledBack => "memo.rolled_back",
        }
    }

    pub fn level(self) -> Level {
        match self {
            Self::Hit | Self::Miss | Self::Inserted => Level::DEBUG,
            Self::Evicted | Self::Committed | Self::RolledBack => Level::INFO,
        }
    }
}
