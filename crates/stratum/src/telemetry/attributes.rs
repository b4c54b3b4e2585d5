// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Field names of `memo.event` log records.

pub(crate) const CACHE_NAME: &str = "cache.name";

pub(crate) const CACHE_EVENT_NAME: &str = "memo.event";

pub(crate) const CACHE_OPERATION_NAME: &str = "cache.operation";

pub(crate) const CACHE_ACTIVITY_NAME: &str = "cache.activity";

pub(crate) const CACHE_DEPTH_NAME: &str = "cache.depth";

pub(crate) const CACHE_ENTRIES_NAME: &str = "cache.entries";
