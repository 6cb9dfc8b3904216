use thiserror::Error;
use windows_sys::Win32::Foundation::NTSTATUS;

use crate::irql::Irql;

/// Why [`ResolvedThread::try_resolve`](crate::ResolvedThread::try_resolve) did not look the thread up.
#[non_exhaustive]
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveError {
    /// This instance already made its one lookup attempt.
    #[error("thread was already looked up")]
    AlreadyAttempted,

    /// The caller runs at an IRQL where the object manager must not be entered.
    /// Nothing was consumed, a later call may succeed.
    #[error("IRQL {0} is too high to look up a thread")]
    InsufficientIrql(Irql),

    /// The id does not name a live thread. Terminal for this instance.
    #[error("thread lookup failed with status 0x{0:08x}")]
    LookupFailed(NTSTATUS),
}

/// Why a thread object that was found has no user-mode stack information.
///
/// Expected for threads that never ran user code yet, so not an error for callers.
#[non_exhaustive]
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackUnavailable {
    #[error("thread has no environment block")]
    NoEnvironmentBlock,

    #[error("trap frame at {frame:016x} is outside the kernel stack")]
    TrapFrameOutsideKernelStack { frame: usize },

    #[error("no user-mode trap frame within {steps} nested frames")]
    TrapFrameChainTooLong { steps: usize },

    #[error("could not read memory at {address:016x}")]
    UnreadableMemory { address: usize },

    /// The environment block holds a reserved range or commit limit that can't describe a stack.
    #[error("environment block has unusable stack limits (reserved [{low:016x}, {high:016x}), committed low {committed:016x})")]
    InvalidStackLimits { low: usize, high: usize, committed: usize },
}

/// Failure to set up the crate's loggers.
#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("could not create log file: {0}")]
    Io(#[from] std::io::Error),

    #[error("a logger is already installed: {0}")]
    AlreadyInitialized(#[from] log::SetLoggerError),
}
