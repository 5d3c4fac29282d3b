// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! The metadata store interface (§6) and a node-local reference
//! implementation used by tests and single-process runs.
//!
//! The real store (a key/value service exposing per-task result slots and
//! refcounts) is an external collaborator out of this crate's scope; only
//! its interface is specified here, same as `kasync`'s `Schedule` trait only
//! specifies `spawn`/`wake` without mandating a particular run queue.

use std::any::Any;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashMap;

use crate::id::TaskId;

pub type Value = Arc<dyn Any + Send + Sync>;

/// The per-node key/value service backing published thunk results (§6).
///
/// `set_result` must be idempotent-safe: if two producers race to publish
/// the same `taskid`, only the first publication takes effect and the
/// second observes `has_result() == true` and skips (§5).
pub trait MetadataStore: Send + Sync {
    fn has_result(&self, task: TaskId) -> bool;

    /// # Panics
    ///
    /// Implementations may panic if called without a preceding
    /// `has_result() == true`; callers in this crate always check first.
    fn get_result(&self, task: TaskId) -> Value;

    /// Local-only publication: visible to this executor only.
    fn set_result(&self, task: TaskId, value: Value);

    /// Cluster-visible publication with an initial refcount (§4.5): used
    /// when the producer differs from where the consumer will run.
    fn export_result(&self, task: TaskId, value: Value, initial_refcount: usize);

    /// Decrements the refcount for `task`'s exported result, returning the
    /// new value. Decrementing a never-exported or already-zero refcount is
    /// a caller bug (§5: "over-decrementing is a bug").
    fn decr_resultrefcount(&self, task: TaskId) -> usize;

    /// Clears per-run state. If `dropdb`, nothing (not even persisted
    /// results) is preserved; otherwise published results survive for the
    /// next run to observe via `has_result`.
    fn reset(&self, dropdb: bool);
}

struct Entry {
    value: Value,
    refcount: AtomicUsize,
}

/// An in-process reference [`MetadataStore`], backed by a concurrent hash
/// map. Suitable for single-process test runs and for exercising the
/// scheduler's logic in isolation; a real cluster deployment swaps this for
/// a networked or file-backed service behind the same trait.
#[derive(Default)]
pub struct LocalStore {
    entries: DashMap<TaskId, Entry>,
}

impl LocalStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MetadataStore for LocalStore {
    fn has_result(&self, task: TaskId) -> bool {
        self.entries.contains_key(&task)
    }

    fn get_result(&self, task: TaskId) -> Value {
        self.entries
            .get(&task)
            .unwrap_or_else(|| panic!("get_result({task}) called without a stored result"))
            .value
            .clone()
    }

    fn set_result(&self, task: TaskId, value: Value) {
        self.entries.entry(task).or_insert_with(|| Entry {
            value,
            refcount: AtomicUsize::new(0),
        });
    }

    fn export_result(&self, task: TaskId, value: Value, initial_refcount: usize) {
        self.entries.entry(task).or_insert_with(|| Entry {
            value,
            refcount: AtomicUsize::new(initial_refcount),
        });
    }

    fn decr_resultrefcount(&self, task: TaskId) -> usize {
        let entry = self
            .entries
            .get(&task)
            .unwrap_or_else(|| panic!("decr_resultrefcount({task}) on unknown task"));
        let prev = entry.refcount.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(prev > 0, "over-decremented refcount for {task}");
        prev.saturating_sub(1)
    }

    fn reset(&self, dropdb: bool) {
        if dropdb {
            self.entries.clear();
        }
        // non-dropping reset preserves published results across runs.
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_result_is_idempotent() {
        let store = LocalStore::new();
        let task = TaskId::from_fingerprint(&"t");
        store.set_result(task, Arc::new(1u64));
        store.set_result(task, Arc::new(2u64));
        let v = store.get_result(task);
        assert_eq!(*v.downcast_ref::<u64>().unwrap(), 1);
    }

    #[test]
    fn export_then_decrement_reaches_zero() {
        let store = LocalStore::new();
        let task = TaskId::from_fingerprint(&"t");
        store.export_result(task, Arc::new(1u64), 2);
        assert_eq!(store.decr_resultrefcount(task), 1);
        assert_eq!(store.decr_resultrefcount(task), 0);
    }

    #[test]
    fn reset_without_dropdb_preserves_results() {
        let store = LocalStore::new();
        let task = TaskId::from_fingerprint(&"t");
        store.set_result(task, Arc::new(1u64));
        store.reset(false);
        assert!(store.has_result(task));
        store.reset(true);
        assert!(!store.has_result(task));
    }
}
