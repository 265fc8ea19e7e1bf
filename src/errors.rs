//! Error handling for the kernel core.
//!
//! Contract violations (calling an operation before boot, releasing a lock
//! you don't hold, and the like) are programming errors: they fail loudly
//! via `assert!`/`debug_assert!` rather than a `Result`. The one error that
//! is a normal, expected runtime outcome - the arena running out of stacks
//! - gets a real error type instead, since a caller can reasonably recover
//! from it.

use core::fmt;

/// Why [`Kernel::create`](crate::kernel::Kernel::create) could not spawn a
/// thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpawnError {
    /// The stack pool has no free stack of the requested size class.
    OutOfStacks,
}

impl fmt::Display for SpawnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpawnError::OutOfStacks => write!(f, "no free stack available for new thread"),
        }
    }
}

#[cfg(feature = "std-shim")]
impl std::error::Error for SpawnError {}
