// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::fmt;
use std::hash::{Hash, Hasher};

/// A stable, content-independent identifier of a [`Thunk`](crate::thunk::Thunk).
///
/// Two `TaskId`s are equal iff they denote the same computation: the same
/// function applied to the same inputs. Results in the metadata store are
/// keyed by `TaskId`, so producing the same id twice (whether from the same
/// thunk reachable through two paths in the DAG, or from re-submitting a run)
/// must resolve to the same stored result.
///
/// # Notes
///
/// - `TaskId`s are *not* sequential and carry no ordering information; they
///   are opaque 128-bit fingerprints.
/// - Unlike a spawn-counter id, a `TaskId` is reproducible: hashing the same
///   structural fingerprint twice yields the same id, which is what lets
///   `keep`/`exec` short-circuit on `has_result` across independent runs.
#[derive(Clone, Copy, Eq, PartialEq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct TaskId(u128);

impl TaskId {
    /// The id reserved for the stub/sentinel slot; never assigned to a real thunk.
    pub const fn stub() -> Self {
        Self(0)
    }

    /// Derives a `TaskId` from a structural fingerprint: anything that hashes
    /// identically for equal computations (function identity plus the ids or
    /// literal bytes of its inputs, in order).
    pub fn from_fingerprint<T: Hash>(fingerprint: &T) -> Self {
        let mut hasher = twox::Fingerprint128::new();
        fingerprint.hash(&mut hasher);
        Self(hasher.finish128())
    }

    pub const fn is_stub(self) -> bool {
        self.0 == 0
    }

    pub const fn as_u128(self) -> u128 {
        self.0
    }
}

impl fmt::Debug for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TaskId({:032x})", self.0)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

/// A tiny in-crate 128-bit fingerprint hasher.
///
/// This is not cryptographically strong; it exists only so `TaskId` does not
/// need to pull in a hashing crate for what is, structurally, a 128-bit
/// xor/rotate mix of a [`std::hash::Hash`] byte stream. Collisions would
/// alias two distinct thunks onto the same metadata-store slot, which is a
/// correctness bug the same way it would be for any content-addressed store;
/// callers that need cryptographic collision resistance should fingerprint
/// with a real digest before calling [`TaskId::from_fingerprint`].
mod twox {
    use std::hash::Hasher;

    pub struct Fingerprint128 {
        lo: std::collections::hash_map::DefaultHasher,
        hi: std::collections::hash_map::DefaultHasher,
    }

    impl Fingerprint128 {
        pub fn new() -> Self {
            // `DefaultHasher::new()` is seeded with fixed, stable keys (unlike
            // `RandomState`), which is what makes `TaskId` reproducible across
            // processes and runs. The `hi` stream is decorrelated from `lo` by
            // feeding it a fixed distinguishing prefix before the caller's
            // bytes arrive.
            let mut hi = std::collections::hash_map::DefaultHasher::new();
            hi.write(b"dagexec-taskid-hi");
            Self {
                lo: std::collections::hash_map::DefaultHasher::new(),
                hi,
            }
        }

        pub fn finish128(&self) -> u128 {
            (u128::from(self.lo.finish()) << 64) | u128::from(self.hi.finish())
        }
    }

    impl Hasher for Fingerprint128 {
        fn finish(&self) -> u64 {
            self.lo.finish()
        }

        fn write(&mut self, bytes: &[u8]) {
            self.lo.write(bytes);
            self.hi.write(bytes);
        }
    }
}
