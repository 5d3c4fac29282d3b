// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! In-process [`PeerHandle`]/[`Pinger`] implementations, for single-process
//! test runs and for the in-process reference deployment used by
//! [`crate::scheduler::tests`].

use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use super::{PeerHandle, Pinger};
use crate::error::PeerUnavailable;
use crate::id::TaskId;
use crate::queue::Shared;

/// A [`PeerHandle`] backed directly by an `Arc` to the peer's own
/// [`Shared`] deque: valid for the program's entire lifetime, so
/// `try_pop_front` never returns [`PeerUnavailable`]. Cross-process
/// deployments use [`crate::peer::shm::ShmPeer`] instead, whose handle can
/// go stale if the peer process exits.
pub struct LocalPeer {
    name: String,
    shared: Arc<Shared>,
}

impl LocalPeer {
    pub fn new(name: impl Into<String>, shared: Arc<Shared>) -> Self {
        Self { name: name.into(), shared }
    }
}

impl PeerHandle for LocalPeer {
    fn name(&self) -> &str {
        &self.name
    }

    fn try_pop_front(&self) -> Result<Option<TaskId>, PeerUnavailable> {
        Ok(self.shared.pop_front())
    }
}

/// A [`Pinger`] backed by a `Condvar`, for processes that share an address
/// space (tests, or a single-machine deployment that uses threads rather
/// than processes for "executors").
#[derive(Default)]
pub struct LocalPinger {
    state: Mutex<u64>,
    condvar: Condvar,
}

impl LocalPinger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

impl Pinger for LocalPinger {
    fn ping(&self) {
        *self.state.lock().unwrap() += 1;
        self.condvar.notify_all();
    }

    fn wait_timeout(&self, timeout: Duration) {
        let guard = self.state.lock().unwrap();
        let seen = *guard;
        let (guard, _) = self
            .condvar
            .wait_timeout_while(guard, timeout, |count| *count == seen)
            .unwrap();
        drop(guard);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn local_peer_pops_from_backing_shared() {
        let shared = Arc::new(Shared::new(4));
        let task = TaskId::from_fingerprint(&"t");
        shared.push(task);

        let peer = LocalPeer::new("executor1", shared);
        assert_eq!(peer.try_pop_front(), Ok(Some(task)));
        assert_eq!(peer.try_pop_front(), Ok(None));
    }

    #[test]
    fn ping_wakes_a_waiter() {
        let pinger = LocalPinger::new();
        let waiter = pinger.clone();
        let handle = thread::spawn(move || {
            waiter.wait_timeout(Duration::from_secs(5));
        });

        thread::sleep(Duration::from_millis(10));
        pinger.ping();
        handle.join().unwrap();
    }

    #[test]
    fn wait_timeout_returns_on_timeout_without_ping() {
        let pinger = LocalPinger::new();
        let start = std::time::Instant::now();
        pinger.wait_timeout(Duration::from_millis(20));
        assert!(start.elapsed() >= Duration::from_millis(20));
    }
}
