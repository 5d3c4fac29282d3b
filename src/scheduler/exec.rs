// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! `exec` (§4.5): runs a runnable task's thunk, places its result, and cleans
//! up any input chunks this was the last (or a counted) consumer of.

use std::sync::Arc;

use crate::error::SchedulerError;
use crate::id::TaskId;
use crate::store::Value;
use crate::thunk::{Arg, Chunk, Input, Thunk};

impl super::Scheduler {
    /// Runs `task`'s thunk and publishes its result.
    ///
    /// Idempotent: a `task` that already has a published result (published by
    /// a racing peer, or re-submitted across runs) is a no-op (§5). Precondition:
    /// `task` is runnable, i.e. every `Input::Thunk` dependency already has a
    /// published result — `exec` does not check this itself, the caller (the
    /// driver loop in [`crate::executor::Executor`]) only calls `exec` on
    /// tasks `reserve`/`steal` handed it.
    pub fn exec(&mut self, task: TaskId) -> Result<(), SchedulerError> {
        self.debug_snapshot("exec:enter");
        if self.store.has_result(task) {
            tracing::trace!(executor = self.name(), %task, "exec: already done");
            self.debug_snapshot("exec:exit");
            return Ok(());
        }

        let thunk = self
            .dag
            .get(task)
            .cloned()
            .unwrap_or_else(|| panic!("exec({task}): task missing from dag"));

        let args = self.resolve_args(&thunk)?;

        tracing::debug!(executor = self.name(), %task, nargs = args.len(), "exec: invoking");
        let output = (thunk.f)(&args).map_err(|source| SchedulerError::UserThunkFailure { task, source })?;

        self.place_result(&thunk, output);
        self.cleanup_inputs(&thunk);

        self.debug_snapshot("exec:exit");
        Ok(())
    }

    /// Materializes each input into an [`Arg`]: `Raw` (uncollected) for a
    /// meta thunk, `Value` (fully resolved) otherwise (§4.5 step 1).
    fn resolve_args(&self, thunk: &Arc<Thunk>) -> Result<Vec<Arg>, SchedulerError> {
        thunk
            .inputs
            .iter()
            .map(|input| {
                if thunk.is_meta() {
                    return Ok(Arg::Raw(input.clone()));
                }
                match input {
                    Input::Thunk(child) => {
                        if !self.store.has_result(child.id) {
                            return Err(SchedulerError::MetaMissing { task: child.id });
                        }
                        let stored = self.store.get_result(child.id);
                        // a non-get_result child's published result is the
                        // Chunk wrapper, not the value itself; materialize it.
                        let value = match stored.downcast_ref::<Chunk>() {
                            Some(chunk) => self.pool.collect(chunk),
                            None => stored,
                        };
                        Ok(Arg::Value(value))
                    }
                    Input::Chunk(chunk) => Ok(Arg::Value(self.pool.collect(chunk))),
                    Input::Literal(value) => Ok(Arg::Value(Arc::clone(value))),
                }
            })
            .collect()
    }

    /// Wraps `output` per `thunk`'s flags and publishes it (§4.5 steps 2-3).
    ///
    /// A non-`get_result` thunk's output is boxed into a pool-managed
    /// [`Chunk`] (with `persist`/`effective_cache` carried through); a
    /// `get_result` thunk's output is published as-is. Results with two or
    /// more dependents are always published through `export_result` with an
    /// initial refcount, so [`Self::cleanup_inputs`] can decrement rather
    /// than immediately delete them; the `stolen` migration to disk only
    /// changes whether the chunk becomes cluster-visible, not whether it is
    /// refcounted.
    fn place_result(
        &mut self,
        thunk: &Arc<Thunk>,
        output: Box<dyn std::any::Any + Send + Sync>,
    ) -> Value {
        let value: Value = Arc::from(output);

        let mut stored: Value = if thunk.get_result() {
            value
        } else {
            let chunk = self.pool.tochunk(value, thunk.persist(), thunk.effective_cache());
            Arc::new(chunk)
        };

        if self.stolen.contains(&thunk.id) {
            if let Some(chunk) = stored.downcast_ref::<Chunk>() {
                if chunk.handle.is_in_process() {
                    let migrated = self.pool.chunktodisk(chunk);
                    tracing::trace!(
                        executor = self.name(),
                        task = %thunk.id,
                        "exec: migrated stolen result to disk"
                    );
                    stored = Arc::new(migrated);
                }
            }
        }

        let dependents = self.dag.dependent_count(thunk.id).max(1);
        self.store.export_result(thunk.id, Arc::clone(&stored), dependents);
        stored
    }

    /// Decrements or deletes each `Input::Thunk` dependency's chunk now that
    /// this task has consumed it (§4.5 step 4). A dependency with fewer than
    /// two dependents has no other consumer and is deleted outright;
    /// otherwise the shared refcount is decremented and the chunk deleted
    /// only once it reaches zero. `persist`-flagged chunks are never
    /// reclaimed here.
    fn cleanup_inputs(&self, thunk: &Arc<Thunk>) {
        for child in thunk.thunk_inputs() {
            let Some(result) = self.store.has_result(child.id).then(|| self.store.get_result(child.id)) else {
                continue;
            };
            let Some(chunk) = result.downcast_ref::<Chunk>() else {
                continue;
            };
            if chunk.persist {
                continue;
            }

            let dependents = self.dag.dependent_count(child.id);
            if dependents < 2 {
                tracing::trace!(executor = self.name(), task = %child.id, "exec: deleting sole-consumer chunk");
                self.pool.pooldelete(&chunk.handle);
            } else {
                let remaining = self.store.decr_resultrefcount(child.id);
                tracing::trace!(executor = self.name(), task = %child.id, remaining, "exec: decremented chunk refcount");
                if remaining == 0 {
                    self.pool.pooldelete(&chunk.handle);
                }
            }
        }
    }
}
