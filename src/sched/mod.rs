//! Scheduling policy: the ready queue, the sleep queue and MLFQS.
//!
//! Everything here operates on data borrowed from `KernelState`; none of
//! these types carry their own locking, the kernel's single mutex is the
//! only synchronization in the scheduler.

pub mod mlfqs;
pub mod ready_queue;
pub mod sleep_queue;

pub use ready_queue::ReadyQueue;
pub use sleep_queue::SleepQueue;
