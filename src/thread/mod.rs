//! Thread control block and run state.
//!
//! Every `Tcb` lives inside the kernel's arena (`KernelState::threads`),
//! addressed by [`ThreadId`]; nothing outside the arena holds a `Tcb`
//! directly. Donation, MLFQS and scheduling all mutate a `Tcb` in place
//! while the kernel's big lock is held.

use crate::arch::Arch;
use crate::mem::Stack;

extern crate alloc;
use alloc::string::String;
use alloc::vec::Vec;

pub mod handle;
pub mod builder;

pub use handle::JoinHandle;
pub use builder::ThreadBuilder;

/// Priorities range [0, 63]; 31 is the default, 0 the minimum, 63 the maximum.
pub const PRI_MIN: u8 = 0;
pub const PRI_DEFAULT: u8 = 31;
pub const PRI_MAX: u8 = 63;

/// Default niceness for MLFQS threads.
pub const NICE_DEFAULT: i32 = 0;
pub const NICE_MIN: i32 = -20;
pub const NICE_MAX: i32 = 20;

/// Stack-overflow sentinel written at the base of every stack.
pub const STACK_MAGIC: u64 = 0xDEAD_BEEF_CAFE_BABE;

/// A small unique integer identifying a thread, also its arena index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ThreadId(usize);

impl core::fmt::Display for ThreadId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl ThreadId {
    /// Construct a `ThreadId` from its raw arena index.
    pub(crate) fn from_index(index: usize) -> Self {
        Self(index)
    }

    pub(crate) fn index(self) -> usize {
        self.0
    }
}

/// Run state of a thread, per the data model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadStatus {
    Running,
    Ready,
    Blocked,
    Dying,
}

/// Per-thread control block.
pub struct Tcb {
    pub id: ThreadId,
    pub name: Option<String>,
    pub status: ThreadStatus,

    pub base_priority: u8,
    pub effective_priority: u8,

    /// Absolute tick at which a sleeper must be awakened; 0 when not sleeping.
    pub wakeup_tick: u64,

    /// The lock this thread is blocked trying to acquire, if any.
    pub waiting_on: Option<crate::sync::LockId>,

    /// Threads currently donating priority to this one, one entry per
    /// donor-lock pair (a thread may appear more than once if it is
    /// donating via more than one lock it holds against this thread,
    /// though in practice a thread blocks on at most one lock at a time).
    pub donors: Vec<ThreadId>,

    pub nice: i32,
    pub recent_cpu: crate::fixed_point::Fp,

    /// Ticks accumulated in the current quantum; reset on dispatch.
    pub slice_ticks: u32,

    /// `None` only for the thread promoted from the boot context in
    /// [`Kernel::boot`](crate::kernel::Kernel::boot), which reuses whatever
    /// stack was already in use rather than drawing one from the pool.
    pub stack: Option<Stack>,
    pub context: <crate::arch::DefaultArch as Arch>::SavedContext,
    pub entry_point: Option<fn(usize)>,
    pub entry_arg: usize,
}

impl Tcb {
    pub(crate) fn new(
        id: ThreadId,
        name: Option<String>,
        priority: u8,
        stack: Stack,
        entry_point: fn(usize),
        entry_arg: usize,
    ) -> Self {
        let stack_top = stack.stack_top() as usize;
        let stack_bottom = stack.stack_bottom() as usize;
        stack.install_canary(STACK_MAGIC);
        let _ = stack_top;

        let mut context = <crate::arch::DefaultArch as Arch>::SavedContext::default();
        setup_initial_context(&mut context, entry_point as usize, stack_bottom, entry_arg);

        Self {
            id,
            name,
            status: ThreadStatus::Blocked,
            base_priority: priority,
            effective_priority: priority,
            wakeup_tick: 0,
            waiting_on: None,
            donors: Vec::new(),
            nice: NICE_DEFAULT,
            recent_cpu: 0,
            slice_ticks: 0,
            stack: Some(stack),
            context,
            entry_point: Some(entry_point),
            entry_arg,
        }
    }

    /// Promote the currently executing context into a `Tcb`. Used exactly
    /// once, for the thread that was already running when the kernel was
    /// booted; its context is left default and gets populated the first
    /// time it is switched away from, the same as any other save.
    pub(crate) fn promote_current(id: ThreadId, name: Option<String>, priority: u8) -> Self {
        Self {
            id,
            name,
            status: ThreadStatus::Running,
            base_priority: priority,
            effective_priority: priority,
            wakeup_tick: 0,
            waiting_on: None,
            donors: Vec::new(),
            nice: NICE_DEFAULT,
            recent_cpu: 0,
            slice_ticks: 0,
            stack: None,
            context: <crate::arch::DefaultArch as Arch>::SavedContext::default(),
            entry_point: None,
            entry_arg: 0,
        }
    }

    /// Recompute `effective_priority` from `base_priority` and outstanding
    /// donors. Called after donor-list changes (release, clearing a donor).
    pub fn refresh_priority(&mut self, donor_priorities: &[u8]) {
        let max_donor = donor_priorities.iter().copied().max().unwrap_or(PRI_MIN);
        self.effective_priority = self.base_priority.max(max_donor);
    }

    pub fn check_stack_integrity(&self) -> bool {
        match &self.stack {
            Some(stack) => stack.check_canary(STACK_MAGIC),
            None => true,
        }
    }

    pub fn is_runnable(&self) -> bool {
        matches!(self.status, ThreadStatus::Running | ThreadStatus::Ready)
    }
}

#[allow(unused_variables, unused_mut)]
fn setup_initial_context(
    context: &mut <crate::arch::DefaultArch as Arch>::SavedContext,
    entry_point: usize,
    stack_top: usize,
    arg: usize,
) {
    #[cfg(target_arch = "aarch64")]
    {
        context.x = [0; 31];
        context.x[0] = arg as u64;
        context.sp = stack_top as u64;
        context.pc = entry_point as u64;
        context.pstate = 0x3c5;

        #[cfg(feature = "full-fpu")]
        {
            context.neon_state = [0; 32];
            context.fpcr = 0;
            context.fpsr = 0;
        }
    }

    #[cfg(not(target_arch = "aarch64"))]
    {
        let _ = (entry_point, stack_top, arg);
    }
}

#[cfg(all(test, feature = "std-shim"))]
mod tests {
    use super::*;
    use crate::mem::{StackPool, StackSizeClass};

    fn noop(_arg: usize) {}

    #[test]
    fn tcb_starts_blocked_with_base_priority() {
        let pool = StackPool::new();
        let stack = pool.allocate(StackSizeClass::Small).unwrap();
        let tcb = Tcb::new(ThreadId::from_index(1), None, 31, stack, noop, 0);

        assert_eq!(tcb.status, ThreadStatus::Blocked);
        assert_eq!(tcb.base_priority, 31);
        assert_eq!(tcb.effective_priority, 31);
        assert!(tcb.check_stack_integrity());
    }

    #[test]
    fn refresh_priority_takes_max_of_base_and_donors() {
        let pool = StackPool::new();
        let stack = pool.allocate(StackSizeClass::Small).unwrap();
        let mut tcb = Tcb::new(ThreadId::from_index(1), None, 31, stack, noop, 0);

        tcb.refresh_priority(&[40, 35]);
        assert_eq!(tcb.effective_priority, 40);

        tcb.refresh_priority(&[]);
        assert_eq!(tcb.effective_priority, 31);
    }
}
