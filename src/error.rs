//! Typed error surface for fallible kernel operations.
//!
//! A C-style kernel typically returns bare `0`/`-1`/error-code integers,
//! leaving callers to know which negative number meant what. Here every
//! fallible operation returns `Result<T, KernelError>` instead, and genuine
//! programmer errors (corrupted sentinels, calling a blocking API from
//! interrupt context) still go through [`crate::port::CpuPort::assert_failed`]
//! rather than a `Result`, since there is no sane recovery from them.

use core::fmt;

/// Reasons a kernel API call can fail without it being a programmer bug.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum KernelError {
    /// Priority outside `[MIN_PRIO, MAX_PRIO]`.
    BadPriority,
    /// A thread-table slot is already initialized (or not yet, when one was expected).
    AlreadyInitialized,
    /// The kernel has not been initialized yet.
    NotInitialized,
    /// Operation requires the thread to currently be in a different state.
    BadState,
    /// `thread_kill`/`thread_join` targeted the calling thread itself.
    CurrentThread,
    /// Caller does not own the mutex it tried to unlock.
    NotOwner,
    /// A non-recursive mutex was locked again by its own owner.
    WouldDeadlock,
    /// A bounded mailbox had no room for another message within the timeout.
    MailboxFull,
    /// A pend/receive operation timed out before being satisfied.
    TimedOut,
    /// A blocking call was attempted while holding a critical section or
    /// from within the tick/interrupt path.
    WouldBlockForever,
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            KernelError::BadPriority => "priority out of range",
            KernelError::AlreadyInitialized => "thread slot already initialized",
            KernelError::NotInitialized => "kernel not initialized",
            KernelError::BadState => "thread is not in the required state",
            KernelError::CurrentThread => "operation not valid on the calling thread",
            KernelError::NotOwner => "caller does not own this mutex",
            KernelError::WouldDeadlock => "non-recursive mutex locked twice by owner",
            KernelError::MailboxFull => "mailbox has no free slot",
            KernelError::TimedOut => "operation timed out",
            KernelError::WouldBlockForever => "blocking call not valid in this context",
        };
        f.write_str(msg)
    }
}

pub type Result<T> = core::result::Result<T, KernelError>;
