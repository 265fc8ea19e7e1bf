//! A handle to a spawned thread.
//!
//! There is no result to hand back across the join - entry points are
//! `fn(usize)`, not `fn() -> T` - so a handle is just a [`ThreadId`] plus a
//! poll of the kernel's arena: a thread counts as finished once its slot has
//! been reclaimed, which only happens after it calls
//! [`Kernel::exit`](crate::kernel::Kernel::exit).

use crate::kernel;
use crate::thread::ThreadId;

pub struct JoinHandle {
    id: ThreadId,
}

impl JoinHandle {
    pub(crate) fn new(id: ThreadId) -> Self {
        Self { id }
    }

    pub fn thread_id(&self) -> ThreadId {
        self.id
    }

    pub fn is_alive(&self) -> bool {
        kernel::thread_alive(self.id)
    }

    /// Block the caller, yielding repeatedly, until the thread has exited.
    pub fn join(self) {
        while kernel::thread_alive(self.id) {
            crate::yield_now();
        }
    }

    /// Non-blocking check: `Some(())` once the thread has exited.
    pub fn try_join(&self) -> Option<()> {
        if kernel::thread_alive(self.id) {
            None
        } else {
            Some(())
        }
    }
}
