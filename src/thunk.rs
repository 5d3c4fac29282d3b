// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! The DAG data model (§3): [`Thunk`], its [`Input`]s, and [`Chunk`] result
//! handles.
//!
//! Thunks point forward to their inputs; the scheduler's `dependents` map
//! (built once in [`crate::scheduler::Scheduler::init`]) is the reverse
//! index. Neither owns the other: both are indices into the run's arena (see
//! [`crate::dag::Dag`]), which eliminates any lifetime coupling between a
//! thunk and the thunks that consume it.

use std::fmt;
use std::sync::Arc;

use bitflags::bitflags;

use crate::id::TaskId;

bitflags! {
    /// Flags carried by a [`Thunk`], controlling how its result is collected
    /// and retained.
    #[derive(Debug, Clone, Copy, Eq, PartialEq)]
    pub struct ThunkFlags: u8 {
        /// `f` receives its inputs as-is (as [`Input`] values, Chunks
        /// uncollected) rather than as materialized values.
        const META = 0b0001;
        /// The result is returned directly rather than boxed into a
        /// [`Chunk`]. When unset, `exec` wraps the result into a `Chunk`.
        const GET_RESULT = 0b0010;
        /// The resulting chunk should survive cleanup even with a dependent
        /// count of one (never eagerly deleted).
        const PERSIST = 0b0100;
        /// The resulting chunk is a candidate for caching; forced on
        /// whenever `PERSIST` is set (see [`Thunk::effective_cache`]).
        const CACHE = 0b1000;
    }
}

/// One input slot of a [`Thunk`]: another thunk, a pre-materialized chunk, or
/// a literal value opaque to the scheduler.
#[derive(Clone)]
pub enum Input {
    Thunk(Arc<Thunk>),
    Chunk(Chunk),
    Literal(Arc<dyn std::any::Any + Send + Sync>),
}

impl fmt::Debug for Input {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Thunk(t) => write!(f, "Input::Thunk({})", t.id),
            Self::Chunk(c) => write!(f, "Input::Chunk({:?})", c.handle),
            Self::Literal(_) => f.write_str("Input::Literal(..)"),
        }
    }
}

impl Input {
    /// Returns the nested [`Thunk`] if this input is itself a thunk; `None`
    /// for chunks and literals (§4.2 step 3: "literals and Chunks are
    /// skipped").
    pub fn as_thunk(&self) -> Option<&Arc<Thunk>> {
        match self {
            Self::Thunk(t) => Some(t),
            _ => None,
        }
    }
}

/// One resolved argument passed to a [`ThunkFn`].
///
/// Ordinary thunks receive `Value`: `exec` has already materialized every
/// input (collecting Chunks, fetching Thunk results from the metadata
/// store). A `META`-flagged thunk instead receives its inputs `Raw`,
/// uncollected, so it can inspect Chunk handles directly (§4.5 step 1:
/// "a meta thunk receives its inputs as-is").
#[derive(Clone)]
pub enum Arg {
    Value(crate::store::Value),
    Raw(Input),
}

impl fmt::Debug for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(_) => f.write_str("Arg::Value(..)"),
            Self::Raw(input) => write!(f, "Arg::Raw({input:?})"),
        }
    }
}

impl Arg {
    /// The materialized value, or panics: callers only build `Value` args
    /// for non-meta thunks, which are the only ones allowed to assume this.
    pub fn expect_value(&self) -> &crate::store::Value {
        match self {
            Self::Value(v) => v,
            Self::Raw(_) => panic!("expect_value called on a Raw arg"),
        }
    }
}

/// The user function invoked by `exec`, opaque to the scheduler.
///
/// Returns a boxed `Any` so the scheduler can store heterogeneous results in
/// the metadata store without being generic over every thunk's output type.
pub type ThunkFn = Arc<
    dyn Fn(&[Arg]) -> Result<Box<dyn std::any::Any + Send + Sync>, Box<dyn std::error::Error + Send + Sync>>
        + Send
        + Sync,
>;

/// An immutable DAG node: a deferred computation (§3).
///
/// Thunks form a DAG rooted at the single node submitted by the driver. Once
/// constructed, a `Thunk`'s `inputs` never change; `TaskId` equality (not
/// `Arc` pointer identity) is what the scheduler uses to recognize "the same
/// computation reached through two paths".
pub struct Thunk {
    pub id: TaskId,
    pub f: ThunkFn,
    pub inputs: Vec<Input>,
    pub flags: ThunkFlags,
}

impl fmt::Debug for Thunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Thunk")
            .field("id", &self.id)
            .field("inputs", &self.inputs.len())
            .field("flags", &self.flags)
            .finish()
    }
}

impl Thunk {
    pub fn is_meta(&self) -> bool {
        self.flags.contains(ThunkFlags::META)
    }

    pub fn get_result(&self) -> bool {
        self.flags.contains(ThunkFlags::GET_RESULT)
    }

    pub fn persist(&self) -> bool {
        self.flags.contains(ThunkFlags::PERSIST)
    }

    /// `cache := persist ? true : cache` (§4.5 step 3).
    pub fn effective_cache(&self) -> bool {
        self.persist() || self.flags.contains(ThunkFlags::CACHE)
    }

    /// Thunk inputs only; literals and pre-materialized chunks are not part
    /// of the DAG traversal `keep`/`init` perform.
    pub fn thunk_inputs(&self) -> impl Iterator<Item = &Arc<Thunk>> {
        self.inputs.iter().filter_map(Input::as_thunk)
    }
}

/// A handle to a materialized value (§3), either held in-process or migrated
/// to the off-heap pool.
#[derive(Clone, Debug)]
pub struct Chunk {
    pub handle: ChunkHandle,
    pub persist: bool,
    pub cache: bool,
}

/// Where a [`Chunk`]'s bytes currently live.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum ChunkHandle {
    /// Held in this process's heap, addressed by an opaque local id.
    InProcess(u64),
    /// Migrated to the off-heap, content-addressed pool (visible cluster-wide
    /// once the pool backend is shared storage).
    OnDisk(u64),
}

impl ChunkHandle {
    pub fn is_in_process(&self) -> bool {
        matches!(self, Self::InProcess(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effective_cache_forced_by_persist() {
        let flags = ThunkFlags::PERSIST;
        assert!(!flags.contains(ThunkFlags::CACHE));

        let thunk = Thunk {
            id: TaskId::from_fingerprint(&"x"),
            f: Arc::new(|_| Ok(Box::new(()) as Box<dyn std::any::Any + Send + Sync>)),
            inputs: vec![],
            flags,
        };
        assert!(thunk.effective_cache());
    }

    #[test]
    fn thunk_inputs_skips_chunks_and_literals() {
        let leaf = Arc::new(Thunk {
            id: TaskId::from_fingerprint(&"leaf"),
            f: Arc::new(|_| Ok(Box::new(()) as Box<dyn std::any::Any + Send + Sync>)),
            inputs: vec![],
            flags: ThunkFlags::empty(),
        });
        let parent = Thunk {
            id: TaskId::from_fingerprint(&"parent"),
            f: Arc::new(|_| Ok(Box::new(()) as Box<dyn std::any::Any + Send + Sync>)),
            inputs: vec![
                Input::Thunk(leaf.clone()),
                Input::Literal(Arc::new(1u64)),
                Input::Chunk(Chunk {
                    handle: ChunkHandle::InProcess(0),
                    persist: false,
                    cache: false,
                }),
            ],
            flags: ThunkFlags::empty(),
        };

        let thunks: Vec<_> = parent.thunk_inputs().collect();
        assert_eq!(thunks.len(), 1);
        assert_eq!(thunks[0].id, leaf.id);
    }
}
