// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! The per-executor scheduler state machine (§2, §3) and its lifecycle
//! (§4.7). `keep` (§4.2), `steal` (§4.4), and `exec`/`release` (§4.5, §4.6)
//! live in their own submodules, the way `kasync`'s `Scheduler` keeps
//! `steal` in a sibling file while sharing the parent's private `Core`.

mod exec;
mod keep;
mod steal;

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::config::{Config, Role};
use crate::dag::Dag;
use crate::id::TaskId;
use crate::peer::{PeerHandle, Pinger};
use crate::pool::ChunkPool;
use crate::queue::{Reserved, Shared};
use crate::store::MetadataStore;
use crate::thunk::Thunk;

pub use keep::{is_this_reserved, DEFAULT_DEPTH};
pub use steal::TryStealError;

/// A peer executor this scheduler may steal from, and ping when it shares
/// new work.
pub struct Peer {
    pub handle: Arc<dyn PeerHandle>,
    pub pinger: Arc<dyn Pinger>,
}

/// How long `Executor::run` parks between idle polls while waiting on a
/// ping; see [`crate::executor::Executor`].
pub const IDLE_PARK: Duration = Duration::from_millis(50);

/// The per-executor (or per-broker) scheduler state (§3).
///
/// Both roles share this type, distinguished by `config.role`; a broker
/// typically drives dispatching rather than executing (§2), which this
/// crate models simply as the caller choosing not to call `exec`.
pub struct Scheduler {
    pub(crate) config: Config,

    pub(crate) reserved: Reserved,
    pub(crate) shared: Arc<Shared>,
    pub(crate) stolen: HashSet<TaskId>,
    pub(crate) expanded: HashSet<TaskId>,

    pub(crate) dag: Dag,
    pub(crate) root_task: Option<TaskId>,

    pub(crate) nshared: AtomicUsize,

    pub(crate) peers: Vec<Peer>,
    pub(crate) own_pinger: Arc<dyn Pinger>,

    pub(crate) store: Arc<dyn MetadataStore>,
    pub(crate) pool: Arc<dyn ChunkPool>,
}

impl Scheduler {
    /// Constructs a new, un-initialized scheduler. Call [`Self::init`]
    /// before `reserve`/`keep`/`steal`/`exec`.
    pub fn new(
        config: Config,
        peers: Vec<Peer>,
        own_pinger: Arc<dyn Pinger>,
        store: Arc<dyn MetadataStore>,
        pool: Arc<dyn ChunkPool>,
    ) -> Self {
        config.validate().expect("invalid scheduler configuration");
        let shared = Arc::new(Shared::new(config.share_limit));
        Self {
            config,
            reserved: Reserved::new(),
            shared,
            stolen: HashSet::new(),
            expanded: HashSet::new(),
            dag: Dag::default(),
            root_task: None,
            nshared: AtomicUsize::new(0),
            peers,
            own_pinger,
            store,
            pool,
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn is_executor(&self) -> bool {
        self.config.role == Role::Executor
    }

    /// This executor's own shareable deque, for peers to attach to.
    pub fn shared(&self) -> &Arc<Shared> {
        &self.shared
    }

    /// `true` iff `len(shared) < help_threshold` (§4.1). Advisory and
    /// re-evaluated at every call; never cache the result across a yield.
    pub fn should_share(&self) -> bool {
        self.shared.len() < self.config.help_threshold
    }

    pub fn nshared(&self) -> usize {
        self.nshared.load(Ordering::Relaxed)
    }

    /// Whether `task` already has a published result, for driver loops that
    /// want to know when a run is finished.
    pub fn store_has_result(&self, task: TaskId) -> bool {
        self.store.has_result(task)
    }

    /// The published result for `task`.
    ///
    /// # Panics
    ///
    /// Panics if `task` has no published result; callers should check
    /// [`Self::store_has_result`] first.
    pub fn get_result(&self, task: TaskId) -> crate::store::Value {
        self.store.get_result(task)
    }

    /// Number of peers configured for stealing (§9 "restricted executor
    /// sets": this may be a strict subset of the full cluster).
    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    /// Registers an additional peer to steal from, for a worker that joins
    /// the restricted executor set after this scheduler was constructed.
    pub fn add_peer(&mut self, peer: Peer) {
        self.peers.push(peer);
    }

    /// The producer names of every registered peer, for surfacing a
    /// cluster's current steal topology (e.g. a restricted executor set).
    pub fn peer_names(&self) -> Vec<&str> {
        self.peers.iter().map(|p| p.handle.name()).collect()
    }

    /// Emits a `tracing::debug!` snapshot of every queue's size, gated by
    /// `config.debug` (SPEC_FULL "debug flag plumbing"). Called at the entry
    /// and exit of `keep`/`reserve`/`steal`/`exec`; cheap enough to call
    /// unconditionally since it's a no-op when `debug` is unset.
    pub(crate) fn debug_snapshot(&self, op: &str) {
        if !self.config.debug {
            return;
        }
        tracing::debug!(
            executor = self.name(),
            op,
            reserved = self.reserved.len(),
            shared = self.shared.len(),
            stolen = self.stolen.len(),
            expanded = self.expanded.len(),
            nshared = self.nshared(),
            "queue snapshot"
        );
    }

    /// `reserve()` (§4.3): scans `reserved` tail-to-head, returning in
    /// strict priority the first unexpanded task, else the first runnable
    /// task, else the tail task regardless, else `None`.
    pub fn reserve(&self) -> Option<TaskId> {
        self.debug_snapshot("reserve:enter");
        let expanded = &self.expanded;
        let store = &self.store;
        let dag = &self.dag;

        let chosen = self.reserved.reserve(
            |task| !expanded.contains(&task),
            |task| Self::is_runnable_impl(dag, store.as_ref(), task),
        );
        self.debug_snapshot("reserve:exit");
        chosen
    }

    /// Whether `task` has already been expanded by `keep`. Used by
    /// [`crate::executor::Executor`] to decide whether a reserved task needs
    /// expanding before it can be executed.
    pub(crate) fn is_expanded(&self, task: TaskId) -> bool {
        self.expanded.contains(&task)
    }

    /// Whether every `Input::Thunk` dependency of `task` already has a
    /// published result (§4.3's "runnable" predicate), exposed for
    /// [`crate::executor::Executor`]'s driver loop.
    pub(crate) fn is_runnable(&self, task: TaskId) -> bool {
        Self::is_runnable_impl(&self.dag, self.store.as_ref(), task)
    }

    fn is_runnable_impl(dag: &Dag, store: &dyn MetadataStore, task: TaskId) -> bool {
        if store.has_result(task) {
            return true;
        }
        match dag.get(task) {
            // not a Thunk (a plain function/literal executable): always runnable.
            None => true,
            Some(thunk) => thunk
                .thunk_inputs()
                .all(|input| store.has_result(input.id)),
        }
    }

    /// `release(task, complete)` (§4.6): removes `task` from `reserved` when
    /// `complete`. The suspended-task re-offer hook is intentionally
    /// unimplemented: this core never suspends a task (§9), so there is
    /// nothing to re-offer yet.
    pub fn release(&mut self, task: TaskId, complete: bool) {
        if complete {
            self.reserved.dequeue(task);
        }
        // else: task stays in place. A future suspension feature would
        // re-push it onto `shared` here; not needed until suspension exists.
    }

    /// `init(root)` (§4.7): seeds `root_task` and precomputes `dependents`
    /// by a single traversal of the DAG rooted at `root`.
    pub fn init(&mut self, root: Arc<Thunk>) {
        tracing::debug!(executor = self.name(), root = %root.id, "scheduler init");
        self.root_task = Some(root.id);
        self.dag = Dag::build(&root);
    }

    /// `reset(dropdb)` (§4.7): clears all per-run sets/queues, zeroes
    /// counters, unsets the root. Does not drop the metadata store's
    /// persisted results unless `dropdb`.
    pub fn reset(&mut self, dropdb: bool) {
        tracing::debug!(executor = self.name(), dropdb, "scheduler reset");
        self.reserved = Reserved::new();
        self.shared = Arc::new(Shared::new(self.config.share_limit));
        self.stolen.clear();
        self.expanded.clear();
        self.dag.clear();
        self.root_task = None;
        self.nshared.store(0, Ordering::Relaxed);
        self.store.reset(dropdb);
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::peer::local::{LocalPeer, LocalPinger};
    use crate::pool::LocalPool;
    use crate::store::LocalStore;

    pub fn scheduler(name: &str, help_threshold: usize) -> Scheduler {
        Scheduler::new(
            Config {
                name: name.to_string(),
                role: Role::Executor,
                share_limit: 16,
                help_threshold,
                debug: false,
            },
            Vec::new(),
            LocalPinger::new(),
            Arc::new(LocalStore::new()),
            Arc::new(LocalPool::new()),
        )
    }

    pub fn with_peer(mut a: Scheduler, b: &Scheduler) -> Scheduler {
        a.peers.push(Peer {
            handle: Arc::new(LocalPeer::new(b.name(), Arc::clone(&b.shared))),
            pinger: LocalPinger::new(),
        });
        a
    }
}
