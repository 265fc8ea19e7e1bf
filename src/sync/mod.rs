//! Synchronization primitives: counting semaphores, priority-donating locks
//! and Mesa-semantics condition variables.
//!
//! None of these types embed the kernel's scheduling state; they hold only
//! their own small, independently-locked bit of bookkeeping (a count, a
//! waiter list) and call back into the single global [`Kernel`] to block,
//! unblock, query thread priorities, or - for [`Lock`] - look up and record
//! who holds it. Two different mutexes are therefore sometimes involved in
//! one operation, but they are never held at once - a primitive's own lock
//! is always dropped before touching kernel state, so there is no
//! lock-ordering hazard.
//!
//! [`Kernel`]: crate::kernel::Kernel

pub mod condvar;
pub mod lock;
pub mod semaphore;

pub use condvar::Condvar;
pub use lock::Lock;
pub use semaphore::Semaphore;

/// Identifies a [`Lock`] for donation bookkeeping (a `Tcb` records the lock
/// it is blocked on as a `LockId` rather than a borrowed reference, since
/// borrows can't cross the kernel's arena boundary).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LockId(pub(crate) usize);

impl LockId {
    pub(crate) fn from_raw(raw: usize) -> Self {
        Self(raw)
    }
}
