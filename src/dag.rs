// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! The `dependents` index (§9 design notes).
//!
//! Thunks point forward to their inputs; `Dag` is the reverse index plus a
//! by-id lookup table, both computed once by [`Dag::build`] during
//! [`crate::scheduler::Scheduler::init`] and immutable for the run. Using
//! `TaskId` rather than `Arc<Thunk>` pointers as both keys and set members
//! means neither side owns the other, matching the arena representation the
//! design notes recommend.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::id::TaskId;
use crate::thunk::Thunk;

#[derive(Debug, Default)]
pub struct Dag {
    by_id: HashMap<TaskId, Arc<Thunk>>,
    dependents: HashMap<TaskId, HashSet<TaskId>>,
}

impl Dag {
    /// Traverses the DAG rooted at `root` exactly once, populating the by-id
    /// arena and the reverse `dependents` index.
    pub fn build(root: &Arc<Thunk>) -> Self {
        let mut dag = Self::default();
        let mut stack = vec![Arc::clone(root)];
        let mut visited = HashSet::new();

        while let Some(thunk) = stack.pop() {
            if !visited.insert(thunk.id) {
                continue;
            }
            for input in thunk.thunk_inputs() {
                dag.dependents.entry(input.id).or_default().insert(thunk.id);
                stack.push(Arc::clone(input));
            }
            dag.by_id.insert(thunk.id, thunk);
        }

        dag
    }

    pub fn get(&self, id: TaskId) -> Option<&Arc<Thunk>> {
        self.by_id.get(&id)
    }

    /// Number of distinct thunks that consume `id` as an input. Zero for the
    /// root and for ids not present in the DAG.
    pub fn dependent_count(&self, id: TaskId) -> usize {
        self.dependents.get(&id).map_or(0, HashSet::len)
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn clear(&mut self) {
        self.by_id.clear();
        self.dependents.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::thunk::{Input, ThunkFlags};

    fn leaf(name: &str) -> Arc<Thunk> {
        Arc::new(Thunk {
            id: TaskId::from_fingerprint(&name),
            f: Arc::new(|_| Ok(Box::new(()) as Box<dyn std::any::Any + Send + Sync>)),
            inputs: vec![],
            flags: ThunkFlags::empty(),
        })
    }

    #[test]
    fn fan_in_is_counted_on_both_parents() {
        let shared = leaf("shared");
        let a = Arc::new(Thunk {
            id: TaskId::from_fingerprint(&"a"),
            f: Arc::new(|_| Ok(Box::new(()) as Box<dyn std::any::Any + Send + Sync>)),
            inputs: vec![Input::Thunk(shared.clone())],
            flags: ThunkFlags::empty(),
        });
        let b = Arc::new(Thunk {
            id: TaskId::from_fingerprint(&"b"),
            f: Arc::new(|_| Ok(Box::new(()) as Box<dyn std::any::Any + Send + Sync>)),
            inputs: vec![Input::Thunk(shared.clone())],
            flags: ThunkFlags::empty(),
        });
        let root = Arc::new(Thunk {
            id: TaskId::from_fingerprint(&"root"),
            f: Arc::new(|_| Ok(Box::new(()) as Box<dyn std::any::Any + Send + Sync>)),
            inputs: vec![Input::Thunk(a), Input::Thunk(b)],
            flags: ThunkFlags::empty(),
        });

        let dag = Dag::build(&root);
        assert_eq!(dag.dependent_count(shared.id), 2);
        assert_eq!(dag.dependent_count(root.id), 0);
    }

    #[test]
    fn chain_has_single_dependent_per_link() {
        let mut chain = leaf("0");
        for i in 1..5 {
            chain = Arc::new(Thunk {
                id: TaskId::from_fingerprint(&i),
                f: Arc::new(|_| Ok(Box::new(()) as Box<dyn std::any::Any + Send + Sync>)),
                inputs: vec![Input::Thunk(chain.clone())],
                flags: ThunkFlags::empty(),
            });
        }
        let dag = Dag::build(&chain);
        // every non-root node has exactly one dependent
        for id in dag.by_id.keys() {
            if *id != chain.id {
                assert_eq!(dag.dependent_count(*id), 1);
            }
        }
    }
}
