// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::fmt;

use crate::id::TaskId;

/// Errors fatal to the current run (§7).
///
/// `AlreadyDone` and `NoTask` are explicitly *not* members of this enum: both
/// are ordinary control-flow outcomes (`keep`/`exec` short-circuiting,
/// `reserve`/`steal` finding nothing to do) and are represented as plain
/// return values, never as `Err`.
#[derive(Debug)]
pub enum SchedulerError {
    /// The thunk's function returned or panicked with an error. Fatal to the
    /// run; partial results remain in the metadata store but are not
    /// guaranteed consistent.
    UserThunkFailure { task: TaskId, source: Box<dyn std::error::Error + Send + Sync> },
    /// A chunk handle the scheduler expected to find in the off-heap pool was
    /// missing. Indicates corruption or a double-free; fatal.
    PoolMissing { task: TaskId },
    /// A result the scheduler expected to find in the metadata store was
    /// missing despite `has_result` having returned `true`. Fatal.
    MetaMissing { task: TaskId },
    /// The metadata store or chunk pool backing this executor reported an
    /// I/O or transport failure.
    StoreUnavailable(Box<dyn std::error::Error + Send + Sync>),
}

impl fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UserThunkFailure { task, source } => {
                write!(f, "thunk {task} failed: {source}")
            }
            Self::PoolMissing { task } => {
                write!(f, "chunk for task {task} missing from pool")
            }
            Self::MetaMissing { task } => {
                write!(f, "result for task {task} missing from metadata store")
            }
            Self::StoreUnavailable(source) => write!(f, "metadata store unavailable: {source}"),
        }
    }
}

impl std::error::Error for SchedulerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::UserThunkFailure { source, .. } | Self::StoreUnavailable(source) => {
                Some(source.as_ref())
            }
            Self::PoolMissing { .. } | Self::MetaMissing { .. } => None,
        }
    }
}

/// Returned from a peer whose deque handle turned out to be invalid.
///
/// Per §7 this degrades `steal` to `NoTask` for that one peer; it is not
/// fatal to the run, so it is not a member of [`SchedulerError`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PeerUnavailable;

impl fmt::Display for PeerUnavailable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad("peer deque handle is no longer valid")
    }
}

impl std::error::Error for PeerUnavailable {}
