//! Cross-thread hand-off queue drained on the privileged thread.
//!
//! Any thread may [`enqueue`](Scheduler::enqueue). Only the privileged thread
//! [`drain`](Scheduler::drain)s, once per host tick. A drain swaps the queue
//! out under the lock and runs the captured tasks with the lock released, so
//! tasks enqueued while draining (a recomputation that reads another stale
//! cell, say) land in the next tick instead of extending this one.

use std::fmt;
use std::mem;

use parking_lot::Mutex;

use crate::affinity::ThreadAffinity;

pub type Task = Box<dyn FnOnce() + Send + 'static>;

pub struct Scheduler {
    tasks: Mutex<Vec<Task>>,
    affinity: ThreadAffinity,
}

impl Scheduler {
    /// Create a scheduler owned by the calling thread.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tasks: Mutex::new(Vec::new()),
            affinity: ThreadAffinity::current(),
        }
    }

    /// Queue a task for the next drain. Never blocks beyond the queue lock.
    pub fn enqueue(&self, task: impl FnOnce() + Send + 'static) {
        self.tasks.lock().push(Box::new(task));
    }

    /// Run every task queued before this call, in enqueue order.
    ///
    /// Returns the number of tasks executed.
    pub fn drain(&self) -> usize {
        self.affinity.check("Scheduler::drain");
        let batch = mem::take(&mut *self.tasks.lock());
        let count = batch.len();
        for task in batch {
            task();
        }
        if count > 0 {
            tracing::trace!(count, "drained scheduler");
        }
        count
    }

    #[must_use]
    pub fn pending(&self) -> usize {
        self.tasks.lock().len()
    }

    /// The privileged-thread binding, shared with collaborators that enforce
    /// the same rule.
    #[must_use]
    pub fn affinity(&self) -> &ThreadAffinity {
        &self.affinity
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("pending", &self.pending())
            .finish_non_exhaustive()
    }
}
