// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! `keep` (§4.2): the unified entry point for inserting work into the
//! scheduler, and the DAG-expansion policy that decides which inputs get
//! reserved locally versus offered to peers.

use std::sync::Arc;

use super::Scheduler;
use crate::id::TaskId;
use crate::thunk::Thunk;

/// The default expansion depth for the external call site (§4.2): one level
/// beyond the initial task.
pub const DEFAULT_DEPTH: i64 = 1;

/// The pure placement rule §9 singles out for a truth-table test.
///
/// Inputs with fewer than two dependents (this parent is their sole
/// consumer) are preferentially kept local, to preserve producer/consumer
/// locality; inputs with two or more dependents are preferentially shared,
/// since their result will likely be wanted elsewhere. Within one
/// expansion, at least one unique-consumer child is guaranteed reserved
/// locally (so the executor never starves itself) unless the shared deque
/// already has enough work queued, in which case subsequent unique-consumer
/// children are also reserved rather than shared.
pub fn is_this_reserved(
    parent_reserved: bool,
    dependents_lt_2: bool,
    reservedforself: bool,
    should_share: bool,
) -> bool {
    if parent_reserved && dependents_lt_2 {
        !reservedforself || !should_share
    } else {
        false
    }
}

impl Scheduler {
    /// `keep(task, depth, isreserved)` (§4.2).
    ///
    /// Returns `true` if the task already has a published result (so no
    /// enqueue/expansion happened), `false` otherwise.
    pub fn keep(&mut self, task: TaskId, depth: i64, isreserved: bool) -> bool {
        self.debug_snapshot("keep:enter");
        if self.store.has_result(task) {
            tracing::trace!(executor = self.name(), %task, "keep: already done");
            return true;
        }

        self.enqueue(task, isreserved);

        let depth = depth - 1;
        let Some(thunk) = self.dag.get(task).cloned() else {
            self.debug_snapshot("keep:exit");
            return false;
        };
        if depth < 0 || self.expanded.contains(&task) {
            self.debug_snapshot("keep:exit");
            return false;
        }

        self.expand_inputs(&thunk, depth, isreserved);
        self.expanded.insert(task);

        self.debug_snapshot("keep:exit");
        false
    }

    fn enqueue(&mut self, task: TaskId, isreserved: bool) {
        if isreserved {
            tracing::trace!(executor = self.name(), %task, "keep: reserve locally");
            self.reserved.enqueue(task);
        } else {
            tracing::trace!(executor = self.name(), %task, "keep: offer to peers");
            if self.shared.push(task) {
                self.nshared.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            }
            if self.is_executor() {
                self.own_pinger.ping();
                for peer in &self.peers {
                    peer.pinger.ping();
                }
            }
        }
    }

    fn expand_inputs(&mut self, thunk: &Arc<Thunk>, depth: i64, parent_reserved: bool) {
        let mut reservedforself = false;

        for input in thunk.thunk_inputs() {
            let dependents_lt_2 = self.dag.dependent_count(input.id) < 2;
            let isthisreserved =
                is_this_reserved(parent_reserved, dependents_lt_2, reservedforself, self.should_share());

            self.keep(input.id, depth, isthisreserved);
            reservedforself |= isthisreserved;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::test_support::scheduler;
    use crate::thunk::{Input, ThunkFlags};

    fn f() -> crate::thunk::ThunkFn {
        Arc::new(|_| Ok(Box::new(()) as Box<dyn std::any::Any + Send + Sync>))
    }

    fn leaf(name: &str) -> Arc<Thunk> {
        Arc::new(Thunk {
            id: TaskId::from_fingerprint(&name),
            f: f(),
            inputs: vec![],
            flags: ThunkFlags::empty(),
        })
    }

    /// The six boundary combinations §9 flags for a dedicated truth table.
    #[test]
    fn is_this_reserved_truth_table() {
        // parent not reserved -> always false, regardless of the rest.
        assert!(!is_this_reserved(false, true, false, true));
        assert!(!is_this_reserved(false, false, true, false));

        // parent reserved, >=2 dependents -> always false (preferentially shared).
        assert!(!is_this_reserved(true, false, false, true));
        assert!(!is_this_reserved(true, false, true, false));

        // parent reserved, <2 dependents: reserved unless already reserved one
        // for self AND the shared deque still has room.
        assert!(is_this_reserved(true, true, false, true)); // first unique child: always reserved
        assert!(is_this_reserved(true, true, true, false)); // shared deque full: reserved anyway
        assert!(!is_this_reserved(true, true, true, true)); // already covered self, room to share: shared
    }

    #[test]
    fn keep_on_already_done_task_is_noop() {
        let mut sched = scheduler("e1", 4);
        let t = leaf("t");
        sched.store.set_result(t.id, std::sync::Arc::new(1u64));

        let result = sched.keep(t.id, DEFAULT_DEPTH, true);
        assert!(result);
        assert!(!sched.reserved.contains(t.id));
        assert!(sched.expanded.is_empty());
    }

    #[test]
    fn keep_marks_expanded_after_enqueueing_inputs() {
        let child = leaf("child");
        let root = Arc::new(Thunk {
            id: TaskId::from_fingerprint(&"root"),
            f: f(),
            inputs: vec![Input::Thunk(child.clone())],
            flags: ThunkFlags::empty(),
        });

        let mut sched = scheduler("e1", 4);
        sched.init(Arc::clone(&root));

        let done = sched.keep(root.id, DEFAULT_DEPTH, true);
        assert!(!done);
        assert!(sched.reserved.contains(root.id));
        assert!(sched.expanded.contains(&root.id));
        // the sole-dependent child must be reserved, not shared, per the
        // "at least one unique-consumer child reserved" guarantee.
        assert!(sched.reserved.contains(child.id));
    }

    #[test]
    fn keep_at_depth_zero_does_not_expand() {
        let child = leaf("child");
        let root = Arc::new(Thunk {
            id: TaskId::from_fingerprint(&"root2"),
            f: f(),
            inputs: vec![Input::Thunk(child.clone())],
            flags: ThunkFlags::empty(),
        });

        let mut sched = scheduler("e1", 4);
        sched.init(Arc::clone(&root));

        sched.keep(root.id, 0, true);
        assert!(sched.reserved.contains(root.id));
        assert!(!sched.expanded.contains(&root.id));
        assert!(!sched.reserved.contains(child.id));
    }
}
