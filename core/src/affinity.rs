//! Privileged-thread affinity.
//!
//! The external state source may only be touched from the host's own thread.
//! `ThreadAffinity` remembers that thread and flags callers from anywhere else:
//! a panic in debug builds, an `error!` in release builds.

use std::thread::{self, ThreadId};

use parking_lot::Mutex;

#[derive(Debug)]
pub struct ThreadAffinity {
    owner: Mutex<ThreadId>,
}

impl ThreadAffinity {
    /// Bind to the calling thread.
    #[must_use]
    pub fn current() -> Self {
        Self {
            owner: Mutex::new(thread::current().id()),
        }
    }

    /// Rebind to the calling thread.
    ///
    /// Hosts that construct the roster on a loader thread call this from the
    /// first tick.
    pub fn bind_current(&self) {
        *self.owner.lock() = thread::current().id();
    }

    #[must_use]
    pub fn is_current(&self) -> bool {
        *self.owner.lock() == thread::current().id()
    }

    pub fn check(&self, operation: &str) {
        if self.is_current() {
            return;
        }
        tracing::error!(
            operation,
            thread = ?thread::current().id(),
            "called off the privileged thread"
        );
        if cfg!(debug_assertions) {
            panic!(
                "{operation} called off the privileged thread ({:?})",
                thread::current().id()
            );
        }
    }
}
