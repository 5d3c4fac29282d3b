// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! The per-process driver loop (§2): ties `keep`/`reserve`/`steal`/`exec`
//! together the way `kasync::executor::Worker::run`/`tick` drive a
//! `Scheduler`'s run queue, substituting `reserve`/`steal` for `tick_n`'s
//! local dequeue and a random-peer `steal` for the injector/stealer pair.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::SchedulerError;
use crate::id::TaskId;
use crate::scheduler::{self, Scheduler, IDLE_PARK};
use crate::thunk::Thunk;

/// Drives a single [`Scheduler`] to completion (or indefinitely, for a
/// long-lived executor process).
pub struct Executor {
    scheduler: Scheduler,
    rng: fastrand::Rng,
    stop: AtomicBool,
}

impl Executor {
    pub fn new(scheduler: Scheduler) -> Self {
        Self {
            scheduler,
            rng: fastrand::Rng::new(),
            stop: AtomicBool::new(false),
        }
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut Scheduler {
        &mut self.scheduler
    }

    /// Signals [`Self::run`] to return after its current tick.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    /// Initializes the scheduler with `root` and reserves it locally,
    /// equivalent to submitting a run to this executor (§4.7, §4.2).
    pub fn submit(&mut self, root: Arc<Thunk>) {
        self.scheduler.init(Arc::clone(&root));
        self.scheduler.keep(root.id, scheduler::DEFAULT_DEPTH, true);
    }

    /// Runs until `root` has a published result, or [`Self::stop`] is called.
    pub fn run_until_done(&mut self, root: TaskId) -> Result<(), SchedulerError> {
        while !self.scheduler.store_has_result(root) {
            if self.stop.load(Ordering::Acquire) {
                return Ok(());
            }
            if self.tick()? {
                continue;
            }
            self.scheduler.own_pinger.wait_timeout(IDLE_PARK);
        }
        Ok(())
    }

    /// Runs indefinitely, the way a long-lived executor or broker process
    /// does (§2): ticks while there's local or stealable work, parks on its
    /// own pinger otherwise, until [`Self::stop`] is called.
    pub fn run(&mut self) -> Result<(), SchedulerError> {
        loop {
            if self.stop.load(Ordering::Acquire) {
                return Ok(());
            }

            if self.tick()? {
                continue;
            }

            self.scheduler.own_pinger.wait_timeout(IDLE_PARK);
        }
    }

    /// One iteration of the driver loop: reserve-and-drive a local task if
    /// one is available, else try stealing from a peer. Returns `true` if
    /// it made progress (so the caller should tick again immediately rather
    /// than park). Exposed so a caller cooperatively interleaving several
    /// executors on one thread (tests, or a single-threaded simulation of a
    /// small cluster) can drive each one a step at a time rather than only
    /// via the blocking [`Self::run`]/[`Self::run_until_done`].
    pub fn tick(&mut self) -> Result<bool, SchedulerError> {
        if let Some(task) = self.scheduler.reserve() {
            return self.drive(task);
        }

        if self.scheduler.is_executor() {
            if let Some(task) = self.try_steal_random() {
                tracing::trace!(executor = self.scheduler.name(), %task, "tick: keeping stolen task");
                self.scheduler.keep(task, scheduler::DEFAULT_DEPTH, true);
                return Ok(true);
            }
        }

        Ok(false)
    }

    /// Acts on a task `reserve` handed back: expand it if unexpanded, run it
    /// if runnable, otherwise leave it in place (nothing productive to do
    /// with it this tick, §4.3's tail-regardless fallback).
    fn drive(&mut self, task: TaskId) -> Result<bool, SchedulerError> {
        if !self.scheduler.is_expanded(task) {
            self.scheduler.keep(task, scheduler::DEFAULT_DEPTH, true);
            return Ok(true);
        }

        if !self.scheduler.is_runnable(task) {
            return Ok(false);
        }

        self.scheduler.exec(task)?;
        self.scheduler.release(task, true);
        Ok(true)
    }

    /// Attempts `steal` against a random starting peer, then every other
    /// peer in turn (the teacher's `Worker::steal_one_round` random-start
    /// pattern, minus the stealing-worker-count throttle, which only makes
    /// sense for in-process CPU-bound workers).
    fn try_steal_random(&mut self) -> Option<TaskId> {
        let n = self.scheduler.peer_count();
        if n == 0 {
            return None;
        }
        let start = self.rng.usize(0..n);
        for i in 0..n {
            let idx = (start + i) % n;
            match self.scheduler.steal(idx) {
                Ok(task) => return Some(task),
                Err(scheduler::TryStealError::NoTask | scheduler::TryStealError::PeerUnavailable) => continue,
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use std::any::Any;

    use super::*;
    use crate::config::{Config, Role};
    use crate::peer::local::{LocalPeer, LocalPinger};
    use crate::pool::LocalPool;
    use crate::scheduler::Peer;
    use crate::store::LocalStore;
    use crate::thunk::{Input, ThunkFlags};

    fn box_any(v: u64) -> Box<dyn Any + Send + Sync> {
        Box::new(v)
    }

    fn scheduler(name: &str) -> Scheduler {
        Scheduler::new(
            Config {
                name: name.to_string(),
                role: Role::Executor,
                share_limit: 16,
                help_threshold: 4,
                debug: false,
            },
            Vec::new(),
            LocalPinger::new(),
            Arc::new(LocalStore::new()),
            Arc::new(LocalPool::new()),
        )
    }

    #[test]
    fn run_until_done_executes_a_chain() {
        let leaf = Arc::new(Thunk {
            id: TaskId::from_fingerprint(&"leaf"),
            f: Arc::new(|_| Ok(box_any(1))),
            inputs: vec![],
            flags: ThunkFlags::empty(),
        });
        let root = Arc::new(Thunk {
            id: TaskId::from_fingerprint(&"root"),
            f: Arc::new(|args: &[crate::thunk::Arg]| {
                let v = *args[0].expect_value().downcast_ref::<u64>().unwrap();
                Ok(box_any(v + 1))
            }),
            inputs: vec![Input::Thunk(leaf.clone())],
            flags: ThunkFlags::GET_RESULT,
        });

        let mut exec = Executor::new(scheduler("e1"));
        exec.submit(Arc::clone(&root));
        exec.run_until_done(root.id).unwrap();

        let result = exec.scheduler().get_result(root.id);
        assert_eq!(*result.downcast_ref::<u64>().unwrap(), 2);
    }

    #[test]
    fn idle_executor_with_no_peers_does_not_progress() {
        let leaf = Arc::new(Thunk {
            id: TaskId::from_fingerprint(&"unreachable"),
            f: Arc::new(|_| Ok(box_any(0))),
            inputs: vec![],
            flags: ThunkFlags::empty(),
        });

        let mut exec = Executor::new(scheduler("e1"));
        exec.scheduler_mut().init(Arc::clone(&leaf));
        assert!(!exec.tick().unwrap());
    }

    #[test]
    fn stolen_task_is_kept_then_executed() {
        let task = Arc::new(Thunk {
            id: TaskId::from_fingerprint(&"shared-task"),
            f: Arc::new(|_| Ok(box_any(5))),
            inputs: vec![],
            flags: ThunkFlags::GET_RESULT,
        });

        let mut b_sched = scheduler("b");
        b_sched.init(Arc::clone(&task));
        b_sched.shared().push(task.id);

        let mut a_sched = scheduler("a");
        a_sched.init(Arc::clone(&task));
        a_sched.peers.push(Peer {
            handle: Arc::new(LocalPeer::new(b_sched.name(), Arc::clone(b_sched.shared()))),
            pinger: LocalPinger::new(),
        });

        let mut a = Executor::new(a_sched);
        a.run_until_done(task.id).unwrap();

        assert_eq!(*a.scheduler().get_result(task.id).downcast_ref::<u64>().unwrap(), 5);
    }
}
