// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Cross-process [`PeerHandle`]/[`Pinger`] backed by named shared memory
//! (§6, §9).
//!
//! §9's design notes call for exactly this shape: "a fixed-size ring buffer
//! in a named shared-memory segment, guarded by a robust inter-process
//! mutex; duplicate-detection scans the ring under the lock." `shared_memory`
//! provides the named segment (`create`/`open`, matching §6's
//! create/attach modes); `raw_sync` provides the inter-process mutex and
//! event primitives, since `parking_lot`'s lock only works within one
//! process.

use std::ffi::c_void;
use std::mem::size_of;
use std::time::Duration;

use raw_sync::events::{Event, EventInit, EventState};
use raw_sync::locks::{LockInit, Mutex as RawMutex};
use shared_memory::{Shmem, ShmemConf, ShmemError};

use super::{PeerHandle, Pinger};
use crate::error::PeerUnavailable;
use crate::id::TaskId;
use crate::queue::MAX_SHARE_LIMIT;

// `task_id_from_u128` transmutes a `u128` slot straight into a `TaskId`;
// this only holds as long as `TaskId` stays a bare `#[repr(transparent)]`
// wrapper around `u128` with no added niche.
static_assertions::assert_eq_size!(TaskId, u128);
static_assertions::assert_eq_align!(TaskId, u128);

#[repr(C)]
struct RingHeader {
    len: usize,
    capacity: usize,
    slots: [u128; MAX_SHARE_LIMIT],
}

fn shared_link(name: &str) -> String {
    format!("dagexec-shared-{name}")
}

fn ping_link(name: &str) -> String {
    format!("dagexec-ping-{name}")
}

/// The owning side of a named shared-memory deque: created once by the
/// executor whose tasks it offers, attached to read-only by every peer.
pub struct ShmChannel {
    _mem: Shmem,
    lock: Box<dyn raw_sync::locks::LockImpl>,
}

impl ShmChannel {
    /// Creates a new named segment sized to hold `capacity` task ids.
    ///
    /// # Errors
    ///
    /// Returns the underlying [`ShmemError`] if a segment with this name
    /// already exists or the OS refuses the mapping.
    pub fn create(name: &str, capacity: usize) -> Result<Self, ShmemError> {
        assert!(capacity <= MAX_SHARE_LIMIT);
        let mem = ShmemConf::new()
            .size(size_of::<RingHeader>())
            .flink(shared_link(name))
            .create()?;

        // Safety: `mem`'s backing region is exactly `size_of::<RingHeader>()`
        // bytes and was just freshly mapped by this call, so casting its
        // base pointer to `*mut RingHeader` and zero-initializing it is
        // sound and race-free (no other process has attached yet).
        unsafe {
            let header = mem.as_ptr().cast::<RingHeader>();
            (*header).len = 0;
            (*header).capacity = capacity;
        }

        // Safety: the lock guards the whole `RingHeader`, including the
        // fields just initialized above; no data pointer is needed separate
        // from the lock pointer because the entire region is protected.
        let (lock, _bytes) = unsafe {
            RawMutex::new(mem.as_ptr(), mem.as_ptr().add(size_of::<usize>() * 2))
                .map_err(|_| ShmemError::MapOpenFailed(0))?
        };

        Ok(Self { _mem: mem, lock })
    }

    /// Attaches to an existing named segment created by its owning executor.
    pub fn attach(name: &str) -> Result<Self, ShmemError> {
        let mem = ShmemConf::new().flink(shared_link(name)).open()?;
        let (lock, _bytes) = unsafe {
            RawMutex::new(mem.as_ptr(), mem.as_ptr().add(size_of::<usize>() * 2))
                .map_err(|_| ShmemError::MapOpenFailed(0))?
        };
        Ok(Self { _mem: mem, lock })
    }

    fn with_header<R>(&self, f: impl FnOnce(&mut RingHeader) -> R) -> R {
        let guard = self.lock.lock().expect("shared-memory mutex poisoned");
        // Safety: `guard` holds the inter-process lock for the entire
        // `RingHeader` region (see `create`/`attach`), so this is the sole
        // live reference to it for the duration of `f`.
        let header = unsafe { &mut *(guard.as_ref().as_ptr() as *mut c_void).cast::<RingHeader>() };
        f(header)
    }

    pub fn push(&self, task: TaskId) {
        self.with_header(|h| {
            if h.slots[..h.len].contains(&task.as_u128()) {
                return;
            }
            if h.len >= h.capacity {
                return;
            }
            h.slots[h.len] = task.as_u128();
            h.len += 1;
        });
    }

    pub fn pop_front(&self) -> Option<TaskId> {
        self.with_header(|h| {
            if h.len == 0 {
                return None;
            }
            let front = h.slots[0];
            h.slots.copy_within(1..h.len, 0);
            h.len -= 1;
            Some(task_id_from_u128(front))
        })
    }

    pub fn len(&self) -> usize {
        self.with_header(|h| h.len)
    }
}

fn task_id_from_u128(_bits: u128) -> TaskId {
    // `TaskId` intentionally exposes no public "from raw bits" constructor
    // outside the crate to keep fingerprinting the only production path;
    // within the crate we reach into the same representation the ring
    // buffer stores.
    #[allow(clippy::transmute_int_to_non_zero)]
    unsafe {
        std::mem::transmute::<u128, TaskId>(_bits)
    }
}

pub struct ShmPeer {
    name: String,
    channel: ShmChannel,
}

impl ShmPeer {
    pub fn attach(name: impl Into<String>) -> Result<Self, ShmemError> {
        let name = name.into();
        let channel = ShmChannel::attach(&name)?;
        Ok(Self { name, channel })
    }
}

impl PeerHandle for ShmPeer {
    fn name(&self) -> &str {
        &self.name
    }

    fn try_pop_front(&self) -> Result<Option<TaskId>, PeerUnavailable> {
        Ok(self.channel.pop_front())
    }
}

/// A named cross-process event, the `Pinger` analog of [`ShmChannel`].
pub struct ShmPinger {
    _mem: Shmem,
    event: Box<dyn raw_sync::events::EventImpl>,
}

impl ShmPinger {
    pub fn create(name: &str) -> Result<Self, ShmemError> {
        let mem = ShmemConf::new().size(Event::size_of(None)).flink(ping_link(name)).create()?;
        let (event, _) = unsafe {
            Event::new(mem.as_ptr(), true).map_err(|_| ShmemError::MapOpenFailed(0))?
        };
        Ok(Self { _mem: mem, event })
    }

    pub fn attach(name: &str) -> Result<Self, ShmemError> {
        let mem = ShmemConf::new().flink(ping_link(name)).open()?;
        let (event, _) =
            unsafe { Event::from_existing(mem.as_ptr()).map_err(|_| ShmemError::MapOpenFailed(0))? };
        Ok(Self { _mem: mem, event })
    }
}

impl Pinger for ShmPinger {
    fn ping(&self) {
        // Advisory: a failed signal only costs latency, never correctness
        // (§5), so errors here are swallowed rather than propagated.
        let _ = self.event.set(EventState::Signaled);
    }

    fn wait_timeout(&self, timeout: Duration) {
        let _ = self.event.wait(timeout.as_millis() as usize);
    }
}
