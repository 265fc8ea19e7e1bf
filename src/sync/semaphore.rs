//! Counting semaphore: the primitive every other synchronization type here
//! is built from.

extern crate alloc;
use alloc::vec::Vec;

use crate::kernel;
use crate::thread::ThreadId;

struct State {
    count: u32,
    waiters: Vec<ThreadId>,
}

/// A counting semaphore with a priority-ordered waiter list.
///
/// `down` blocks while the count is zero; `up` increments the count and, if
/// anyone is waiting, wakes the highest-priority waiter. Mutation of the
/// waiter list always happens under `self.state`, which is released before
/// any call back into the kernel (block/unblock/priority queries), so the
/// kernel's own lock and this one are never held together.
pub struct Semaphore {
    state: spin::Mutex<State>,
}

impl Semaphore {
    pub const fn new(count: u32) -> Self {
        Self {
            state: spin::Mutex::new(State {
                count,
                waiters: Vec::new(),
            }),
        }
    }

    /// Block until the count is positive, then consume one unit of it.
    pub fn down(&self) {
        loop {
            let mut st = self.state.lock();
            if st.count > 0 {
                st.count -= 1;
                return;
            }
            let me = kernel::current_thread_id();
            st.waiters.push(me);
            drop(st);
            kernel::block_current();
        }
    }

    /// Consume one unit of the count without blocking if it is positive.
    /// Returns `true` if the count was consumed.
    pub fn try_down(&self) -> bool {
        let mut st = self.state.lock();
        if st.count > 0 {
            st.count -= 1;
            true
        } else {
            false
        }
    }

    /// Increment the count, waking the highest-priority waiter if any.
    pub fn up(&self) {
        let mut st = self.state.lock();
        let woken = if st.waiters.is_empty() {
            None
        } else {
            sort_by_priority(&mut st.waiters);
            Some(st.waiters.remove(0))
        };
        st.count += 1;
        drop(st);

        if let Some(id) = woken {
            kernel::unblock(id);
        }
        if !kernel::in_isr() {
            kernel::test_preemption();
        }
    }

    pub fn count(&self) -> u32 {
        self.state.lock().count
    }
}

/// Sort waiters highest-effective-priority first. A linear re-sort on every
/// `up` is fine: waiter lists in this kernel are small and donation can
/// change a waiter's priority at any time, so there is no stale ordering to
/// exploit by keeping the list sorted incrementally.
pub(crate) fn sort_by_priority(waiters: &mut [ThreadId]) {
    waiters.sort_by(|&a, &b| kernel::effective_priority(b).cmp(&kernel::effective_priority(a)));
}

#[cfg(all(test, feature = "std-shim"))]
mod tests {
    use super::*;

    #[test]
    fn try_down_respects_count() {
        let sem = Semaphore::new(1);
        assert!(sem.try_down());
        assert!(!sem.try_down());
        assert_eq!(sem.count(), 0);
    }
}
