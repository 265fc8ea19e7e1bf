//! Minimal bare-metal kernel example for Raspberry Pi Zero 2 W.
//!
//! This example demonstrates basic preemptive multithreading on bare metal:
//! two busy-loop threads, a periodic timer, and priority-donating locks.
//!
//! # Building
//!
//! ```bash
//! cargo build --release --example rpi_kernel --target aarch64-unknown-none-softfloat
//! ```
//!
//! # Deploying
//!
//! 1. Convert ELF to binary:
//!    ```bash
//!    rust-objcopy -O binary target/aarch64-unknown-none-softfloat/release/examples/rpi_kernel kernel8.img
//!    ```
//!
//! 2. Copy kernel8.img to SD card boot partition
//!
//! 3. Create config.txt on SD card:
//!    ```
//!    arm_64bit=1
//!    kernel=kernel8.img
//!    ```
//!
//! 4. Boot the Raspberry Pi

#![no_std]
#![no_main]

extern crate alloc;

use priority_kernel::{thread::PRI_DEFAULT, Kernel, Lock, ThreadBuilder};
use spin::Lazy;

/// Simple bump allocator for the heap.
///
/// In a real kernel, you'd want a more sophisticated allocator.
mod allocator {
    use core::alloc::{GlobalAlloc, Layout};
    use core::cell::UnsafeCell;
    use core::ptr::null_mut;
    use core::sync::atomic::{AtomicUsize, Ordering};

    const HEAP_SIZE: usize = 16 * 1024 * 1024; // 16 MB

    #[repr(C, align(16))]
    struct Heap {
        data: UnsafeCell<[u8; HEAP_SIZE]>,
        next: AtomicUsize,
    }

    unsafe impl Sync for Heap {}

    static HEAP: Heap = Heap {
        data: UnsafeCell::new([0; HEAP_SIZE]),
        next: AtomicUsize::new(0),
    };

    pub struct BumpAllocator;

    unsafe impl GlobalAlloc for BumpAllocator {
        unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
            let size = layout.size();
            let align = layout.align();

            loop {
                let current = HEAP.next.load(Ordering::Relaxed);
                let aligned = (current + align - 1) & !(align - 1);
                let new_next = aligned + size;

                if new_next > HEAP_SIZE {
                    return null_mut(); // Out of memory
                }

                if HEAP
                    .next
                    .compare_exchange(current, new_next, Ordering::Relaxed, Ordering::Relaxed)
                    .is_ok()
                {
                    let heap_start = unsafe { HEAP.data.get() as *mut u8 };
                    return unsafe { heap_start.add(aligned) };
                }
            }
        }

        unsafe fn dealloc(&self, _ptr: *mut u8, _layout: Layout) {
            // Bump allocator doesn't support deallocation
        }
    }

    #[global_allocator]
    static ALLOCATOR: BumpAllocator = BumpAllocator;
}

/// The kernel instance (static for interrupt handler access).
/// Single CPU: the Pi Zero 2 W has 4 cores, but this core targets one.
static KERNEL: Lazy<Kernel> = Lazy::new(Kernel::new);

/// A lock shared by the two demo threads, to exercise donation under load.
static COUNTER_LOCK: Lazy<Lock> = Lazy::new(Lock::new);

/// Kernel entry point - called from boot code after hardware init.
#[no_mangle]
pub fn kernel_main() -> ! {
    // Promote this boot context into the first (main) thread and register
    // the kernel globally so interrupt handlers and sync primitives can
    // reach it.
    KERNEL.register_global();
    KERNEL.boot(PRI_DEFAULT);

    ThreadBuilder::new()
        .name("worker-a")
        .priority(30)
        .spawn(|| {
            let mut counter = 0u64;
            loop {
                COUNTER_LOCK.acquire();
                counter = counter.wrapping_add(1);
                COUNTER_LOCK.release();
                // Cooperative yield; preemption also happens via the timer.
                priority_kernel::yield_now();
            }
        })
        .expect("failed to spawn worker-a");

    ThreadBuilder::new()
        .name("worker-b")
        .priority(30)
        .spawn(|| {
            let mut counter = 0u64;
            loop {
                COUNTER_LOCK.acquire();
                counter = counter.wrapping_add(1);
                COUNTER_LOCK.release();
                priority_kernel::yield_now();
            }
        })
        .expect("failed to spawn worker-b");

    // Set up the preemption timer (1ms time slices) and let interrupts run.
    unsafe {
        priority_kernel::arch::aarch64::setup_preemption_timer(1000)
            .expect("failed to set up preemption timer");
    }

    // Create idle, enable interrupts, and block until idle has run once.
    // This never returns - we're now running threads.
    KERNEL.start();

    // If we somehow get here, just halt.
    loop {
        unsafe {
            core::arch::asm!("wfe");
        }
    }
}

// Panic handler is provided by the library.
