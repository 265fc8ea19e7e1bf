//! A mutual-exclusion lock with priority donation.
//!
//! Built directly on [`Semaphore`] the way a textbook lock is: a binary
//! semaphore plus a holder. Donation is the only thing that makes this more
//! than `Semaphore::new(1)` - when a higher-priority thread blocks on a lock
//! held by a lower-priority one, the holder's effective priority is
//! temporarily raised so it can finish and release sooner, and every lock
//! the holder itself is waiting on is walked transitively, up to a bounded
//! depth, in case of nested donation chains.
//!
//! The holder isn't tracked here - it lives in the kernel's lock-holder
//! table, keyed by [`LockId`], because the donation walk needs to follow
//! "who holds the lock the current holder is itself blocked on" across
//! locks it has never seen.

use portable_atomic::{AtomicUsize, Ordering};

use crate::kernel;
use crate::sync::{LockId, Semaphore};

/// Donation chains longer than this are not walked further. A real chain
/// this deep would mean a design with far too many nested locks.
pub const MAX_DONATION_DEPTH: u32 = 8;

static NEXT_LOCK_ID: AtomicUsize = AtomicUsize::new(0);

pub struct Lock {
    id: LockId,
    sema: Semaphore,
}

impl Lock {
    pub fn new() -> Self {
        let id = LockId::from_raw(NEXT_LOCK_ID.fetch_add(1, Ordering::Relaxed));
        Self {
            id,
            sema: Semaphore::new(1),
        }
    }

    pub fn id(&self) -> LockId {
        self.id
    }

    pub fn is_held_by_current(&self) -> bool {
        kernel::lock_holder(self.id) == Some(kernel::current_thread_id())
    }

    /// Acquire the lock, blocking if necessary and donating this thread's
    /// priority up the holder chain while it waits.
    pub fn acquire(&self) {
        let me = kernel::current_thread_id();
        if let Some(holder) = kernel::lock_holder(self.id) {
            #[cfg(feature = "trace")]
            crate::pl011_println!("[lock] {:?} contends lock {:?}, held by {:?}", me, self.id, holder);
            if !kernel::mlfqs_enabled() {
                kernel::donate_priority(me, holder, self.id, MAX_DONATION_DEPTH);
            }
        }

        self.sema.down();

        kernel::clear_waiting_on(me);
        kernel::set_lock_holder(self.id, me);
    }

    /// Acquire the lock without blocking. Returns `true` on success.
    pub fn try_acquire(&self) -> bool {
        if self.sema.try_down() {
            kernel::set_lock_holder(self.id, kernel::current_thread_id());
            true
        } else {
            false
        }
    }

    /// Release the lock. The previous holder's effective priority is
    /// recomputed from its base priority and any remaining donors.
    pub fn release(&self) {
        let me = kernel::current_thread_id();
        debug_assert!(
            kernel::lock_holder(self.id) == Some(me),
            "release() called by a thread that does not hold the lock"
        );
        kernel::clear_lock_holder(self.id);
        kernel::revoke_donations_for_lock(me, self.id);
        self.sema.up();
    }
}

impl Default for Lock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(all(test, feature = "std-shim"))]
mod tests {
    use super::*;

    #[test]
    fn each_lock_gets_a_distinct_id() {
        let a = Lock::new();
        let b = Lock::new();
        assert_ne!(a.id(), b.id());
    }
}
