// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! The off-heap chunk pool interface (§6) and a node-local reference
//! implementation.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;

use crate::store::Value;
use crate::thunk::{Chunk, ChunkHandle};

/// A content-addressed blob pool, external to this crate; only its
/// interface is specified (§6).
pub trait ChunkPool: Send + Sync {
    /// Materializes `value` into a pool-managed [`Chunk`].
    fn tochunk(&self, value: Value, persist: bool, cache: bool) -> Chunk;

    /// Materializes a chunk's bytes back into a concrete value.
    ///
    /// # Panics
    ///
    /// Implementations may panic if `chunk`'s handle is not present in the
    /// pool; callers only collect chunks they (or a peer, via export) are
    /// known to have produced.
    fn collect(&self, chunk: &Chunk) -> Value;

    /// Migrates an in-process handle to disk-backed storage, returning the
    /// updated chunk. A no-op (returns a clone) if already disk-backed.
    fn chunktodisk(&self, chunk: &Chunk) -> Chunk;

    /// Reclaims a chunk's storage. Called exactly once per chunk, when its
    /// refcount reaches zero (§4.5); calling it twice for the same handle is
    /// a caller bug.
    fn pooldelete(&self, handle: &ChunkHandle);
}

/// An in-process reference [`ChunkPool`] storing values directly, with
/// `chunktodisk` modeled as relabeling the handle (no real migration is
/// needed within a single process).
#[derive(Default)]
pub struct LocalPool {
    next_id: AtomicU64,
    values: DashMap<ChunkHandle, Value>,
}

impl LocalPool {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ChunkPool for LocalPool {
    fn tochunk(&self, value: Value, persist: bool, cache: bool) -> Chunk {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let handle = ChunkHandle::InProcess(id);
        self.values.insert(handle.clone(), value);
        Chunk { handle, persist, cache }
    }

    fn collect(&self, chunk: &Chunk) -> Value {
        self.values
            .get(&chunk.handle)
            .unwrap_or_else(|| panic!("collect({:?}) on missing chunk", chunk.handle))
            .clone()
    }

    fn chunktodisk(&self, chunk: &Chunk) -> Chunk {
        if let ChunkHandle::OnDisk(_) = chunk.handle {
            return chunk.clone();
        }
        let value = self.collect(chunk);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let handle = ChunkHandle::OnDisk(id);
        self.values.insert(handle.clone(), value);
        self.values.remove(&chunk.handle);
        Chunk {
            handle,
            persist: chunk.persist,
            cache: chunk.cache,
        }
    }

    fn pooldelete(&self, handle: &ChunkHandle) {
        self.values.remove(handle);
    }
}
