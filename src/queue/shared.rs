// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::collections::VecDeque;

use arrayvec::ArrayVec;
use parking_lot::Mutex;

use crate::id::TaskId;

/// Hard upper bound on `share_limit` (§6 default 1024): the fixed-capacity
/// ring buffer backing each executor's shared deque. `share_limit` itself is
/// a runtime-configured soft cap within this hard capacity.
pub const MAX_SHARE_LIMIT: usize = 4096;

/// An executor's bounded, lock-protected shared deque (§4.1).
///
/// All of `push`/`pop_front`/`len` take the lock for their whole duration,
/// never just to snapshot a value: decisions here depend on *absence*
/// (duplicate rejection, empty detection), and a torn read-then-act would
/// silently violate the no-duplicates invariant under concurrent stealers.
/// This mirrors how `kasync`'s `Stealer` holds its target's queue lock for
/// an entire steal operation rather than racing a separate length check
/// against the pop.
pub struct Shared {
    inner: Mutex<ArrayVec<TaskId, MAX_SHARE_LIMIT>>,
    /// The hard `share_limit` capacity (§6), distinct from `help_threshold`:
    /// this bounds how many tasks the ring buffer can physically hold, while
    /// `help_threshold` (owned by [`crate::scheduler::Scheduler`]) is the
    /// lower, advisory watermark `should_share` compares against.
    capacity: usize,
}

impl Shared {
    /// # Panics
    ///
    /// Panics if `capacity` exceeds [`MAX_SHARE_LIMIT`].
    pub fn new(capacity: usize) -> Self {
        assert!(
            capacity <= MAX_SHARE_LIMIT,
            "share_limit {capacity} exceeds hard capacity {MAX_SHARE_LIMIT}"
        );
        Self {
            inner: Mutex::new(ArrayVec::new()),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pushes `task` under the lock, skipping duplicates. Silently drops the
    /// push if the deque is already at `share_limit` capacity: a full shared
    /// deque means peers aren't stealing fast enough, and the caller already
    /// has the task reserved locally as a fallback (§4.2's placement rule
    /// keeps that guarantee). Returns whether the task was actually inserted
    /// (`false` for a duplicate or a full deque), which callers use to drive
    /// `nshared` (§3: "cumulative count of items pushed to `shared`").
    pub fn push(&self, task: TaskId) -> bool {
        let mut guard = self.inner.lock();
        if guard.contains(&task) {
            return false;
        }
        if guard.len() >= self.capacity || guard.is_full() {
            return false;
        }
        // ArrayVec push would panic past MAX_SHARE_LIMIT; the length check
        // above already enforces the (smaller-or-equal) soft limit.
        guard.push(task);
        true
    }

    /// Pops the front task under the lock (a steal). Returns `None` if
    /// empty.
    pub fn pop_front(&self) -> Option<TaskId> {
        let mut guard = self.inner.lock();
        if guard.is_empty() {
            return None;
        }
        Some(guard.remove(0))
    }

    #[cfg(test)]
    pub(crate) fn snapshot(&self) -> VecDeque<TaskId> {
        self.inner.lock().iter().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: u8) -> TaskId {
        TaskId::from_fingerprint(&n)
    }

    #[test]
    fn push_skips_duplicates() {
        let shared = Shared::new(4);
        shared.push(id(1));
        shared.push(id(1));
        assert_eq!(shared.len(), 1);
    }

    #[test]
    fn push_respects_limit() {
        let shared = Shared::new(2);
        shared.push(id(1));
        shared.push(id(2));
        shared.push(id(3));
        assert_eq!(shared.len(), 2);
        assert_eq!(shared.snapshot(), VecDeque::from([id(1), id(2)]));
    }

    #[test]
    fn pop_front_is_fifo() {
        let shared = Shared::new(4);
        shared.push(id(1));
        shared.push(id(2));
        assert_eq!(shared.pop_front(), Some(id(1)));
        assert_eq!(shared.pop_front(), Some(id(2)));
        assert_eq!(shared.pop_front(), None);
    }

    #[test]
    #[should_panic]
    fn limit_above_hard_capacity_panics() {
        Shared::new(MAX_SHARE_LIMIT + 1);
    }
}
