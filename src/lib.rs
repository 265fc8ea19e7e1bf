#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![forbid(unreachable_pub)]

//! A single-CPU preemptive kernel core for the Raspberry Pi Zero 2 W.
//!
//! This crate provides the scheduling primitives a small bare-metal kernel
//! needs: a priority thread scheduler, locks that donate priority to avoid
//! priority inversion, Mesa-semantics condition variables, and an optional
//! multi-level feedback queue (MLFQS) policy, all driven by a periodic
//! timer tick. It targets one CPU; there is no SMP support and no
//! userspace/process model.
//!
//! # Target Platform
//!
//! - **Hardware**: Raspberry Pi Zero 2 W only
//! - **SoC**: Broadcom BCM2837 (ARM Cortex-A53)
//! - **Architecture**: AArch64 (ARM 64-bit)
//! - **Environment**: Bare-metal (no operating system)
//!
//! # Features
//!
//! - `full-fpu`: Enable NEON/FPU save/restore (default)
//! - `std-shim`: Enable the compatibility layer used for host testing
//! - `qemu-virt`: Target the QEMU virt machine instead of real hardware
//! - `trace`: Log donation and MLFQS decisions over the PL011 UART
//!
//! # Quick Start
//!
//! ```ignore
//! use priority_kernel::{Kernel, ThreadBuilder};
//! use spin::Lazy;
//!
//! static KERNEL: Lazy<Kernel> = Lazy::new(Kernel::new);
//!
//! fn kernel_main() -> ! {
//!     KERNEL.register_global();
//!     KERNEL.boot(priority_kernel::thread::PRI_DEFAULT);
//!
//!     ThreadBuilder::new()
//!         .priority(40)
//!         .name("worker")
//!         .spawn(|| loop { priority_kernel::yield_now(); })
//!         .expect("failed to spawn worker");
//!
//!     KERNEL.start();
//!     loop {}
//! }
//! ```
//!
//! # Architecture
//!
//! - `thread`: the `Tcb` arena entry, `ThreadId`, `ThreadBuilder`, `JoinHandle`
//! - `sched`: the ready queue, sleep queue and MLFQS formulas
//! - `sync`: semaphores, donating locks, and condition variables
//! - `kernel`: the scheduler core tying the above together behind one lock
//! - `arch`: AArch64 context switching and interrupt control
//! - `time`: the tick counter and a wall-clock `Instant`/`Duration` for logging

pub mod arch;
pub mod errors;
pub mod fixed_point;
pub mod kernel;
pub mod mem;
pub mod sched;
pub mod sync;
pub mod thread;
pub mod time;

#[cfg(test)]
extern crate std;

extern crate alloc;

#[cfg(all(not(test), not(feature = "std-shim")))]
use core::panic::PanicInfo;

#[cfg(all(not(test), not(feature = "std-shim")))]
#[panic_handler]
fn panic(_info: &PanicInfo) -> ! {
    #[cfg(target_arch = "aarch64")]
    unsafe {
        core::arch::asm!("msr daifset, #0xf", options(nomem, nostack));
    }
    loop {
        #[cfg(target_arch = "aarch64")]
        unsafe {
            core::arch::asm!("wfe", options(nomem, nostack));
        }
    }
}

// ============================================================================
// Public API
// ============================================================================

pub use arch::{Arch, DefaultArch};
pub use errors::SpawnError;
pub use kernel::Kernel;
pub use mem::{Stack, StackPool, StackSizeClass};
pub use sync::{Condvar, Lock, LockId, Semaphore};
pub use thread::{JoinHandle, ThreadBuilder, ThreadId, ThreadStatus};
pub use time::{Duration, Instant};

// ============================================================================
// Convenience Functions
// ============================================================================

/// Yield the current thread's time slice to the scheduler.
///
/// This is a cooperative yield: the thread voluntarily gives up the CPU to
/// allow other ready threads to run. It stays runnable and will be
/// scheduled again later.
#[inline]
pub fn yield_now() {
    kernel::yield_current();
}
