//! Mesa-semantics condition variable.
//!
//! Each call to [`Condvar::wait`] gets its own private, one-shot semaphore,
//! mirroring how each waiter owns a stack-local `semaphore_elem` spliced
//! into the condvar's waiter list: `signal`/`broadcast` only ever call `up`
//! on a waiter's own semaphore, they never touch the caller's lock or
//! re-check the wait condition themselves, so callers must still loop on
//! their predicate (`while !condition { cv.wait(&lock); }`).

extern crate alloc;
use alloc::boxed::Box;
use alloc::vec::Vec;

use crate::kernel;
use crate::sync::{Lock, Semaphore};
use crate::thread::ThreadId;

struct Waiter {
    thread: ThreadId,
    woken: bool,
    sema: Box<Semaphore>,
}

pub struct Condvar {
    waiters: spin::Mutex<Vec<Waiter>>,
}

impl Condvar {
    pub const fn new() -> Self {
        Self {
            waiters: spin::Mutex::new(Vec::new()),
        }
    }

    /// Atomically release `lock` and block, then reacquire `lock` before
    /// returning. `lock` must be held by the calling thread.
    pub fn wait(&self, lock: &Lock) {
        let me = kernel::current_thread_id();
        let sema = Box::new(Semaphore::new(0));
        let sema_ptr: *const Semaphore = &*sema;

        self.waiters.lock().push(Waiter {
            thread: me,
            woken: false,
            sema,
        });

        lock.release();
        // SAFETY: `sema_ptr` points at a heap allocation owned by the
        // `Waiter` we just pushed. Nothing removes that `Waiter` from
        // `self.waiters` (and so drops the box) until this thread does so
        // itself, below, after `down` has returned.
        unsafe {
            (*sema_ptr).down();
        }
        lock.acquire();

        let mut w = self.waiters.lock();
        if let Some(pos) = w
            .iter()
            .position(|slot| core::ptr::eq(&*slot.sema as *const Semaphore, sema_ptr))
        {
            w.remove(pos);
        }
    }

    /// Wake the single highest-priority waiter, if any.
    pub fn signal(&self) {
        let mut w = self.waiters.lock();
        let target = highest_unwoken(&w);
        if let Some(pos) = target {
            w[pos].woken = true;
            let ptr: *const Semaphore = &*w[pos].sema;
            drop(w);
            // SAFETY: see `wait` - the waiter's box outlives this call.
            unsafe {
                (*ptr).up();
            }
        }
    }

    /// Wake every current waiter.
    pub fn broadcast(&self) {
        let mut w = self.waiters.lock();
        let mut ptrs = Vec::new();
        for slot in w.iter_mut().filter(|slot| !slot.woken) {
            slot.woken = true;
            ptrs.push(&*slot.sema as *const Semaphore);
        }
        drop(w);
        for ptr in ptrs {
            // SAFETY: see `wait`.
            unsafe {
                (*ptr).up();
            }
        }
    }

    pub fn waiter_count(&self) -> usize {
        self.waiters.lock().iter().filter(|slot| !slot.woken).count()
    }
}

impl Default for Condvar {
    fn default() -> Self {
        Self::new()
    }
}

fn highest_unwoken(waiters: &[Waiter]) -> Option<usize> {
    waiters
        .iter()
        .enumerate()
        .filter(|(_, slot)| !slot.woken)
        .max_by_key(|(_, slot)| kernel::effective_priority(slot.thread))
        .map(|(i, _)| i)
}

#[cfg(all(test, feature = "std-shim"))]
mod tests {
    use super::*;

    #[test]
    fn fresh_condvar_has_no_waiters() {
        let cv = Condvar::new();
        assert_eq!(cv.waiter_count(), 0);
    }
}
