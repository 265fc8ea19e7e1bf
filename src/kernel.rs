//! The kernel: a thread-control-block arena behind one lock, and the
//! scheduling, donation and MLFQS operations every other module here calls
//! into.
//!
//! There is exactly one real kernel per running image, reached through the
//! free functions at the bottom of this module rather than threaded through
//! every call site as an explicit parameter - the same shape Pintos itself
//! takes, where `thread_current()` and friends are plain global functions.
//! [`Kernel::register_global`] wires a `'static` instance up once at boot.

extern crate alloc;
use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::vec::Vec;

use portable_atomic::{AtomicBool, AtomicPtr, Ordering};

use crate::arch::{Arch, DefaultArch};
use crate::errors::SpawnError;
use crate::fixed_point::Fp;
use crate::mem::{StackPool, StackSizeClass};
use crate::sched::{mlfqs, ReadyQueue, SleepQueue};
use crate::sync::{LockId, Semaphore};
use crate::thread::{Tcb, ThreadId, ThreadStatus, PRI_MIN};
use crate::time::{TIMER_FREQUENCY_HZ, TIME_SLICE};

/// Everything the scheduler needs, behind one lock. Every field here is
/// mutated only while that lock is held - this is the "interrupt disable"
/// critical section, implemented as a mutex so it is usable from host
/// tests as well as real hardware.
pub struct KernelState {
    threads: Vec<Option<Tcb>>,
    ready: ReadyQueue,
    sleeping: SleepQueue,
    destruction: Vec<ThreadId>,
    lock_holders: BTreeMap<usize, ThreadId>,
    current: Option<ThreadId>,
    idle: Option<ThreadId>,
    mlfqs: bool,
    load_avg: Fp,
    idle_ticks: u64,
    busy_ticks: u64,
    stack_pool: StackPool,
}

impl KernelState {
    fn new(mlfqs: bool) -> Self {
        Self {
            threads: Vec::new(),
            ready: ReadyQueue::new(),
            sleeping: SleepQueue::new(),
            destruction: Vec::new(),
            lock_holders: BTreeMap::new(),
            current: None,
            idle: None,
            mlfqs,
            load_avg: 0,
            idle_ticks: 0,
            busy_ticks: 0,
            stack_pool: StackPool::new(),
        }
    }

    fn reserve_id(&mut self) -> ThreadId {
        let idx = self.threads.len();
        self.threads.push(None);
        ThreadId::from_index(idx)
    }

    fn install(&mut self, id: ThreadId, tcb: Tcb) {
        self.threads[id.index()] = Some(tcb);
    }

    fn tcb(&self, id: ThreadId) -> &Tcb {
        self.threads[id.index()]
            .as_ref()
            .expect("dangling ThreadId: slot already reclaimed")
    }

    fn tcb_mut(&mut self, id: ThreadId) -> &mut Tcb {
        self.threads[id.index()]
            .as_mut()
            .expect("dangling ThreadId: slot already reclaimed")
    }

    fn rebucket_if_ready(&mut self, id: ThreadId) {
        if self.tcb(id).status == ThreadStatus::Ready {
            self.ready.remove(id);
            let priority = self.tcb(id).effective_priority;
            self.ready.push(id, priority);
        }
    }

    fn pick_next(&mut self) -> ThreadId {
        self.ready
            .pop_highest()
            .unwrap_or_else(|| self.idle.expect("Kernel::start was never called"))
    }

    fn reclaim_destroyed(&mut self) {
        for id in core::mem::take(&mut self.destruction) {
            self.threads[id.index()] = None;
        }
    }

    fn live_thread_ids(&self) -> Vec<ThreadId> {
        self.threads
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|_| ThreadId::from_index(i)))
            .collect()
    }
}

static GLOBAL_KERNEL: AtomicPtr<Kernel> = AtomicPtr::new(core::ptr::null_mut());

/// The kernel core: one lock-protected [`KernelState`] plus a couple of
/// atomics for bookkeeping that's cheaper to keep lock-free (whether the
/// kernel has booted, whether we're currently inside `tick`'s ISR path).
pub struct Kernel {
    state: spin::Mutex<KernelState>,
    in_isr: AtomicBool,
}

impl Kernel {
    /// An MLFQS-driven kernel: priorities are derived from `nice` and CPU
    /// usage, donation is disabled, and `set_priority` only adjusts `nice`.
    ///
    /// Not `const`, since the ready queue's per-priority buckets are built
    /// with `core::array::from_fn`; construct a `static` instance through
    /// `spin::Lazy` instead (see the crate root docs).
    pub fn new_mlfqs() -> Self {
        Self {
            state: spin::Mutex::new(KernelState::new(true)),
            in_isr: AtomicBool::new(false),
        }
    }

    /// A kernel using plain priority scheduling with donation.
    pub fn new() -> Self {
        Self {
            state: spin::Mutex::new(KernelState::new(false)),
            in_isr: AtomicBool::new(false),
        }
    }

    /// Register this kernel as the instance every sync primitive and free
    /// function in this crate reaches through. Must be called exactly once,
    /// before `boot` and before any [`crate::sync`] primitive is used.
    pub fn register_global(&'static self) {
        GLOBAL_KERNEL.store(self as *const Kernel as *mut Kernel, Ordering::Release);
    }

    /// Promote the currently executing context into the kernel's first TCB.
    /// Must be called once, before `create` or `start`.
    pub fn boot(&'static self, priority: u8) -> ThreadId {
        let mut state = self.state.lock();
        assert!(state.current.is_none(), "Kernel::boot called twice");
        let id = state.reserve_id();
        state.install(id, Tcb::promote_current(id, Some(String::from("main")), priority));
        state.current = Some(id);
        drop(state);
        crate::pl011_println!("[boot] main thread promoted as {:?} at priority {}", id, priority);
        id
    }

    /// Create the idle thread, enable interrupts, and block until idle has
    /// actually run once. After this call the ready queue's occupants (if
    /// any created via `create` before this point) are eligible to run the
    /// next time the calling thread yields or blocks.
    pub fn start(&'static self) {
        DefaultArch::enable_interrupts();
        let ready_signal: &'static Semaphore = alloc::boxed::Box::leak(alloc::boxed::Box::new(Semaphore::new(0)));
        let arg = ready_signal as *const Semaphore as usize;
        let idle_id = self
            .create_internal(Some(String::from("idle")), PRI_MIN, StackSizeClass::Small, idle_entry, arg)
            .expect("failed to create idle thread");
        {
            let mut state = self.state.lock();
            // idle is never scheduled through the ready queue; it's the
            // pick_next fallback for when nothing else is runnable.
            state.ready.remove(idle_id);
            state.idle = Some(idle_id);
        }
        ready_signal.down();
        crate::pl011_println!("[boot] idle thread {:?} running, scheduler live", idle_id);
    }

    fn create_internal(
        &'static self,
        name: Option<String>,
        priority: u8,
        stack_size: StackSizeClass,
        entry: fn(usize),
        arg: usize,
    ) -> Result<ThreadId, SpawnError> {
        let (id, name_for_log) = {
            let mut state = self.state.lock();
            let stack = state
                .stack_pool
                .allocate(stack_size)
                .ok_or(SpawnError::OutOfStacks)?;
            let id = state.reserve_id();
            let name_for_log = name.clone();
            let mut tcb = Tcb::new(id, name, priority, stack, entry, arg);
            tcb.status = ThreadStatus::Ready;
            state.install(id, tcb);
            let priority = state.tcb(id).effective_priority;
            state.ready.push(id, priority);
            (id, name_for_log)
        };
        crate::pl011_println!(
            "[thread] created {:?} ({}) at priority {}",
            id,
            name_for_log.as_deref().unwrap_or("<unnamed>"),
            priority
        );
        Ok(id)
    }

    /// Spawn a new thread, ready to run. `entry` receives `arg` verbatim.
    pub fn create(
        &'static self,
        name: Option<String>,
        priority: u8,
        stack_size: StackSizeClass,
        entry: fn(usize),
        arg: usize,
    ) -> Result<ThreadId, SpawnError> {
        let id = self.create_internal(name, priority, stack_size, entry, arg)?;
        self.test_preemption();
        Ok(id)
    }

    pub fn current(&'static self) -> ThreadId {
        self.state.lock().current.expect("kernel not booted")
    }

    pub fn get_priority(&'static self) -> u8 {
        let state = self.state.lock();
        state.tcb(state.current.expect("kernel not booted")).effective_priority
    }

    /// Set the current thread's base priority. Under MLFQS this is a no-op
    /// away from `nice`; priority is derived, not assigned directly.
    pub fn set_priority(&'static self, priority: u8) {
        let mut state = self.state.lock();
        if state.mlfqs {
            return;
        }
        let cur = state.current.expect("kernel not booted");
        state.tcb_mut(cur).base_priority = priority;
        let donor_priorities: Vec<u8> = state
            .tcb(cur)
            .donors
            .iter()
            .map(|&d| state.tcb(d).effective_priority)
            .collect();
        state.tcb_mut(cur).refresh_priority(&donor_priorities);
        state.rebucket_if_ready(cur);
        drop(state);
        self.test_preemption();
    }

    pub fn set_nice(&'static self, nice: i32) {
        let mut state = self.state.lock();
        let cur = state.current.expect("kernel not booted");
        state.tcb_mut(cur).nice = nice.clamp(crate::thread::NICE_MIN, crate::thread::NICE_MAX);
        if state.mlfqs {
            mlfqs::recompute_priority(state.tcb_mut(cur));
            state.rebucket_if_ready(cur);
        }
        drop(state);
        self.test_preemption();
    }

    pub fn get_nice(&'static self) -> i32 {
        let state = self.state.lock();
        state.tcb(state.current.expect("kernel not booted")).nice
    }

    /// System load average, times 100, rounded to the nearest integer.
    pub fn get_load_avg(&'static self) -> i32 {
        let state = self.state.lock();
        crate::fixed_point::to_int_round(crate::fixed_point::mul_int(state.load_avg, 100))
    }

    /// Current thread's `recent_cpu`, times 100, rounded to the nearest
    /// integer.
    pub fn get_recent_cpu(&'static self) -> i32 {
        let state = self.state.lock();
        let cur = state.tcb(state.current.expect("kernel not booted"));
        crate::fixed_point::to_int_round(crate::fixed_point::mul_int(cur.recent_cpu, 100))
    }

    /// (idle_ticks, busy_ticks) since boot.
    pub fn thread_stats(&'static self) -> (u64, u64) {
        let state = self.state.lock();
        (state.idle_ticks, state.busy_ticks)
    }

    /// Whether `id`'s arena slot is still occupied. `false` once the thread
    /// has exited and been reclaimed - used by [`JoinHandle`](crate::thread::JoinHandle)
    /// to poll for completion without keeping the `Tcb` itself alive.
    pub fn is_alive(&'static self, id: ThreadId) -> bool {
        let state = self.state.lock();
        state.threads.get(id.index()).is_some_and(Option::is_some)
    }

    /// Put the current thread to sleep until at least `wakeup_tick`.
    pub fn sleep_until(&'static self, wakeup_tick: u64) {
        {
            let mut state = self.state.lock();
            let cur = state.current.expect("kernel not booted");
            if wakeup_tick <= crate::time::GLOBAL_TICK_COUNTER.ticks() {
                return;
            }
            state.tcb_mut(cur).wakeup_tick = wakeup_tick;
            state.sleeping.push(cur, wakeup_tick);
        }
        self.reschedule(ThreadStatus::Blocked);
    }

    /// Run one tick's worth of scheduler bookkeeping: wake due sleepers,
    /// charge CPU time, and (under MLFQS) recompute priorities/load.
    /// Returns `true` if the caller should yield once back in ordinary
    /// (non-interrupt) context - this function never switches threads
    /// itself, matching the rule that an ISR only ever sets a flag.
    pub fn tick(&'static self) -> bool {
        self.in_isr.store(true, Ordering::Release);
        let now = crate::time::GLOBAL_TICK_COUNTER.increment();
        let resched = {
            let mut state = self.state.lock();

            for id in state.sleeping.drain_ready(now) {
                state.tcb_mut(id).status = ThreadStatus::Ready;
                let priority = state.tcb(id).effective_priority;
                state.ready.push(id, priority);
            }

            if let Some(cur) = state.current {
                if Some(cur) == state.idle {
                    state.idle_ticks += 1;
                } else {
                    state.busy_ticks += 1;
                }
                state.tcb_mut(cur).slice_ticks += 1;
                if state.mlfqs {
                    mlfqs::tick_recent_cpu(state.tcb_mut(cur));
                }
            }

            // On a tick that lands on both the per-second and the 4-tick
            // boundary, `recent_cpu` must decay *before* priority is derived
            // from it, or the 4-tick recompute below uses the stale value -
            // matching the order Pintos's own `timer_interrupt` uses.
            if state.mlfqs && now % TIMER_FREQUENCY_HZ as u64 == 0 {
                let running_counts_as_ready = state.current.is_some() && state.current != state.idle;
                let ready_threads = state.ready.len() as i32 + running_counts_as_ready as i32;
                state.load_avg = mlfqs::recompute_load_avg(state.load_avg, ready_threads as u32);
                for id in state.live_thread_ids() {
                    mlfqs::recompute_recent_cpu(state.tcb_mut(id), state.load_avg);
                }
            }

            if state.mlfqs && now % 4 == 0 {
                for id in state.live_thread_ids() {
                    mlfqs::recompute_priority(state.tcb_mut(id));
                }
                for id in state.live_thread_ids() {
                    state.rebucket_if_ready(id);
                }
            }

            match state.current {
                Some(cur) => {
                    let slice_expired = state.tcb(cur).slice_ticks >= TIME_SLICE;
                    let preempted_by_priority = state
                        .ready
                        .highest_priority()
                        .is_some_and(|p| p > state.tcb(cur).effective_priority);
                    slice_expired || preempted_by_priority
                }
                None => false,
            }
        };
        self.in_isr.store(false, Ordering::Release);
        resched
    }

    /// Voluntarily give up the CPU. The current thread stays ready.
    pub fn yield_now(&'static self) {
        self.reschedule(ThreadStatus::Ready);
    }

    /// Terminate the current thread. Its stack is reclaimed by whichever
    /// thread is dispatched next, since a thread cannot free the stack it
    /// is still running on.
    pub fn exit(&'static self) -> ! {
        crate::pl011_println!("[thread] {:?} exiting", self.current());
        self.reschedule(ThreadStatus::Dying);
        unreachable!("a Dying thread was rescheduled");
    }

    fn reschedule(&'static self, current_next_status: ThreadStatus) {
        let (prev_ptr, next_ptr) = {
            let mut state = self.state.lock();
            // Reclaim whoever died on the *previous* switch: we are no
            // longer running on their stack, so it's safe to drop now.
            // The thread dying on *this* switch is reclaimed next time,
            // by whichever thread is dispatched here.
            state.reclaim_destroyed();

            let cur = state.current.expect("kernel not booted");
            state.tcb_mut(cur).status = current_next_status;
            match current_next_status {
                ThreadStatus::Ready => {
                    let priority = state.tcb(cur).effective_priority;
                    state.ready.push(cur, priority);
                }
                ThreadStatus::Dying => state.destruction.push(cur),
                _ => {}
            }

            let next = state.pick_next();
            state.tcb_mut(next).status = ThreadStatus::Running;
            state.tcb_mut(next).slice_ticks = 0;
            state.current = Some(next);

            let prev_ptr = &mut state.tcb_mut(cur).context as *mut _;
            let next_ptr = &state.tcb(next).context as *const _;
            (prev_ptr, next_ptr)
        };
        // SAFETY: both pointers address `context` fields of live TCBs in the
        // arena; the arena slot for `cur` is not reclaimed until some later
        // reschedule, and `next`'s slot was just installed or is already
        // running. Interrupts are logically disabled for the duration of
        // this critical section by virtue of holding (and having just
        // released) `self.state`.
        unsafe {
            DefaultArch::context_switch(prev_ptr, next_ptr);
        }
    }

    fn block_current(&'static self) {
        self.reschedule(ThreadStatus::Blocked);
    }

    fn unblock(&'static self, id: ThreadId) {
        let mut state = self.state.lock();
        debug_assert_eq!(state.tcb(id).status, ThreadStatus::Blocked);
        state.tcb_mut(id).status = ThreadStatus::Ready;
        let priority = state.tcb(id).effective_priority;
        state.ready.push(id, priority);
    }

    fn test_preemption(&'static self) {
        let should_yield = {
            let state = self.state.lock();
            match state.current {
                Some(cur) => state
                    .ready
                    .highest_priority()
                    .is_some_and(|p| p > state.tcb(cur).effective_priority),
                None => false,
            }
        };
        if should_yield {
            self.yield_now();
        }
    }

    fn effective_priority(&'static self, id: ThreadId) -> u8 {
        self.state.lock().tcb(id).effective_priority
    }

    fn mlfqs_enabled(&'static self) -> bool {
        self.state.lock().mlfqs
    }

    fn lock_holder(&'static self, lock: LockId) -> Option<ThreadId> {
        self.state.lock().lock_holders.get(&lock.0).copied()
    }

    fn set_lock_holder(&'static self, lock: LockId, holder: ThreadId) {
        self.state.lock().lock_holders.insert(lock.0, holder);
    }

    fn clear_lock_holder(&'static self, lock: LockId) {
        self.state.lock().lock_holders.remove(&lock.0);
    }

    fn clear_waiting_on(&'static self, id: ThreadId) {
        self.state.lock().tcb_mut(id).waiting_on = None;
    }

    /// Walk the donation chain starting at `donor -> holder`, raising each
    /// holder's effective priority in turn, up to `max_depth` hops.
    fn donate_priority(&'static self, donor: ThreadId, holder: ThreadId, lock: LockId, max_depth: u32) {
        let mut state = self.state.lock();
        state.tcb_mut(donor).waiting_on = Some(lock);

        // Only the immediate holder gets `donor` itself in its donor list;
        // each deeper hop records the *previous* link in the chain instead,
        // so a holder two or more locks away never names the original donor
        // directly - its priority rises because the intermediate holder's
        // own effective priority rose, not because the far donor is listed.
        // This keeps `revoke_donations_for_lock` correct at every hop: it
        // drops a holder's donor entry by checking that donor's `waiting_on`,
        // which only matches the lock directly between those two threads.
        let mut propagating_donor = donor;
        let mut current_holder = holder;
        for _ in 0..max_depth {
            let donor_priority = state.tcb(propagating_donor).effective_priority;
            if donor_priority <= state.tcb(current_holder).effective_priority {
                break;
            }
            state.tcb_mut(current_holder).donors.push(propagating_donor);
            let donor_priorities: Vec<u8> = state
                .tcb(current_holder)
                .donors
                .iter()
                .map(|&d| state.tcb(d).effective_priority)
                .collect();
            state.tcb_mut(current_holder).refresh_priority(&donor_priorities);
            state.rebucket_if_ready(current_holder);

            #[cfg(feature = "trace")]
            crate::pl011_println!(
                "[donate] thread {:?} raises thread {:?} to priority {}",
                propagating_donor,
                current_holder,
                state.tcb(current_holder).effective_priority
            );

            match state.tcb(current_holder).waiting_on {
                Some(next_lock) => match state.lock_holders.get(&next_lock.0).copied() {
                    Some(next_holder) if next_holder != current_holder => {
                        propagating_donor = current_holder;
                        current_holder = next_holder;
                    }
                    _ => break,
                },
                None => break,
            }
        }
    }

    /// Drop every donor of `holder` that was donating specifically to get
    /// past `lock`, and recompute `holder`'s effective priority.
    fn revoke_donations_for_lock(&'static self, holder: ThreadId, lock: LockId) {
        let mut state = self.state.lock();
        let keep: Vec<ThreadId> = state
            .tcb(holder)
            .donors
            .iter()
            .copied()
            .filter(|&d| state.tcb(d).waiting_on != Some(lock))
            .collect();
        state.tcb_mut(holder).donors = keep;
        let donor_priorities: Vec<u8> = state
            .tcb(holder)
            .donors
            .iter()
            .map(|&d| state.tcb(d).effective_priority)
            .collect();
        state.tcb_mut(holder).refresh_priority(&donor_priorities);
        state.rebucket_if_ready(holder);

        #[cfg(feature = "trace")]
        crate::pl011_println!(
            "[donate] {:?} released a lock, priority now {}",
            holder,
            state.tcb(holder).effective_priority
        );
    }
}

impl Default for Kernel {
    fn default() -> Self {
        Self::new()
    }
}

fn idle_entry(arg: usize) {
    let signal = unsafe { &*(arg as *const Semaphore) };
    signal.up();
    loop {
        DefaultArch::disable_interrupts();
        DefaultArch::enable_interrupts();
        #[cfg(target_arch = "aarch64")]
        unsafe {
            core::arch::asm!("wfi", options(nomem, nostack));
        }
        #[cfg(not(target_arch = "aarch64"))]
        core::hint::spin_loop();
    }
}

/// The registered global kernel. Panics if [`Kernel::register_global`] was
/// never called - every free function below relies on this.
pub fn global() -> &'static Kernel {
    let ptr = GLOBAL_KERNEL.load(Ordering::Acquire);
    assert!(!ptr.is_null(), "no kernel registered; call Kernel::register_global first");
    unsafe { &*ptr }
}

pub fn yield_current() {
    global().yield_now();
}

pub(crate) fn current_thread_id() -> ThreadId {
    global().current()
}

pub(crate) fn thread_alive(id: ThreadId) -> bool {
    global().is_alive(id)
}

pub(crate) fn effective_priority(id: ThreadId) -> u8 {
    global().effective_priority(id)
}

pub(crate) fn mlfqs_enabled() -> bool {
    global().mlfqs_enabled()
}

pub(crate) fn block_current() {
    global().block_current();
}

pub(crate) fn unblock(id: ThreadId) {
    global().unblock(id);
}

pub(crate) fn in_isr() -> bool {
    global().in_isr.load(Ordering::Acquire)
}

pub(crate) fn test_preemption() {
    global().test_preemption();
}

pub(crate) fn lock_holder(lock: LockId) -> Option<ThreadId> {
    global().lock_holder(lock)
}

pub(crate) fn set_lock_holder(lock: LockId, holder: ThreadId) {
    global().set_lock_holder(lock, holder);
}

pub(crate) fn clear_lock_holder(lock: LockId) {
    global().clear_lock_holder(lock);
}

pub(crate) fn clear_waiting_on(id: ThreadId) {
    global().clear_waiting_on(id);
}

pub(crate) fn donate_priority(donor: ThreadId, holder: ThreadId, lock: LockId, max_depth: u32) {
    global().donate_priority(donor, holder, lock, max_depth);
}

pub(crate) fn revoke_donations_for_lock(holder: ThreadId, lock: LockId) {
    global().revoke_donations_for_lock(holder, lock);
}

#[cfg(all(test, feature = "std-shim"))]
mod tests {
    use super::*;

    static TEST_KERNEL: spin::Lazy<Kernel> = spin::Lazy::new(Kernel::new);

    fn noop(_arg: usize) {}

    #[test]
    fn boot_installs_main_as_running() {
        TEST_KERNEL.register_global();
        let main_id = TEST_KERNEL.boot(crate::thread::PRI_DEFAULT);
        assert_eq!(TEST_KERNEL.current(), main_id);
        assert_eq!(TEST_KERNEL.get_priority(), crate::thread::PRI_DEFAULT);
    }

    #[test]
    fn create_enqueues_ready_thread() {
        static K: spin::Lazy<Kernel> = spin::Lazy::new(Kernel::new);
        K.register_global();
        K.boot(crate::thread::PRI_DEFAULT);
        let id = K.create(None, 20, StackSizeClass::Small, noop, 0).unwrap();
        let state = K.state.lock();
        assert_eq!(state.tcb(id).status, ThreadStatus::Ready);
        assert_eq!(state.tcb(id).effective_priority, 20);
    }

    #[test]
    fn set_priority_rebuckets_ready_thread() {
        static K: spin::Lazy<Kernel> = spin::Lazy::new(Kernel::new);
        K.register_global();
        K.boot(crate::thread::PRI_DEFAULT);
        K.set_priority(5);
        assert_eq!(K.get_priority(), 5);
    }
}
