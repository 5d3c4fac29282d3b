// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! `steal` (§4.4): pop tasks from a peer's shared deque until one hasn't
//! already been stolen by this executor, or the peer drains.

use std::fmt;

use super::Scheduler;
use crate::error::PeerUnavailable;
use crate::id::TaskId;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum TryStealError {
    /// `steal`/`reserve` had nothing available; not an error (§7).
    NoTask,
    /// The targeted peer's deque handle is no longer valid; continue with
    /// other peers (§7).
    PeerUnavailable,
}

impl fmt::Display for TryStealError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoTask => f.write_str("no task available to steal"),
            Self::PeerUnavailable => f.write_str("peer deque handle is no longer valid"),
        }
    }
}

impl From<PeerUnavailable> for TryStealError {
    fn from(_: PeerUnavailable) -> Self {
        Self::PeerUnavailable
    }
}

impl Scheduler {
    /// `steal(from_peer)` (§4.4): pops the peer's shared deque front-to-back
    /// until a task not already in `self.stolen` is found, adds it to
    /// `stolen`, and returns it. Each pop is an atomic act (§4.1: "all
    /// operations on it occur under that deque's lock"); a peer whose handle
    /// has gone stale degrades to [`TryStealError::PeerUnavailable`] for
    /// this one peer rather than aborting the run (§7).
    pub fn steal(&mut self, from_peer: usize) -> Result<TaskId, TryStealError> {
        self.debug_snapshot("steal:enter");
        let peer = self
            .peers
            .get(from_peer)
            .expect("steal: peer index out of range");

        let result = loop {
            match peer.handle.try_pop_front() {
                Ok(Some(task)) => {
                    if self.stolen.insert(task) {
                        tracing::trace!(
                            executor = self.name(),
                            from = peer.handle.name(),
                            %task,
                            "stole"
                        );
                        break Ok(task);
                    }
                    tracing::trace!(
                        executor = self.name(),
                        from = peer.handle.name(),
                        %task,
                        "steal: already stolen, discarding"
                    );
                }
                Ok(None) => break Err(TryStealError::NoTask),
                Err(err) => break Err(err.into()),
            }
        };
        self.debug_snapshot("steal:exit");
        result
    }

    /// Attempts `steal` against every configured peer in turn, returning the
    /// first task obtained. Used by [`crate::executor::Executor`] after
    /// `reserve` finds nothing local to run.
    pub fn steal_from_any_peer(&mut self) -> Option<TaskId> {
        for idx in 0..self.peers.len() {
            match self.steal(idx) {
                Ok(task) => return Some(task),
                Err(TryStealError::NoTask | TryStealError::PeerUnavailable) => continue,
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::test_support::{scheduler, with_peer};

    #[test]
    fn steal_on_empty_peer_is_no_task() {
        let b = scheduler("b", 4);
        let mut a = with_peer(scheduler("a", 4), &b);
        assert_eq!(a.steal(0), Err(TryStealError::NoTask));
    }

    #[test]
    fn steal_returns_and_records_stolen_task() {
        let b = scheduler("b", 4);
        let task = TaskId::from_fingerprint(&"t");
        b.shared.push(task);

        let mut a = with_peer(scheduler("a", 4), &b);
        assert_eq!(a.steal(0), Ok(task));
        assert!(a.stolen.contains(&task));
    }

    #[test]
    fn steal_never_returns_a_task_already_in_stolen() {
        let b = scheduler("b", 4);
        let task = TaskId::from_fingerprint(&"t");
        // simulate the task having been re-shared after already being stolen once
        b.shared.push(task);

        let mut a = with_peer(scheduler("a", 4), &b);
        a.stolen.insert(task);
        assert_eq!(a.steal(0), Err(TryStealError::NoTask));
    }

    #[test]
    fn steal_drains_peer_holding_only_previously_stolen_tasks() {
        let b = scheduler("b", 4);
        let t1 = TaskId::from_fingerprint(&"t1");
        let t2 = TaskId::from_fingerprint(&"t2");
        b.shared.push(t1);
        b.shared.push(t2);

        let mut a = with_peer(scheduler("a", 4), &b);
        a.stolen.insert(t1);
        a.stolen.insert(t2);
        assert_eq!(a.steal(0), Err(TryStealError::NoTask));
        assert!(b.shared.is_empty());
    }
}
