//! Find the user-mode stack of a thread from inside the kernel.
//!
//! Given a thread id, [`ResolvedThread`] references the thread object, walks the
//! trap frames saved on its kernel stack out to the one taken when it last
//! left user mode, and reads the stack limits from its TEB (the 32-bit one
//! for WOW64 threads).
#![deny(unsafe_op_in_unsafe_fn)]

#[macro_use]
extern crate log;
extern crate windows_sys;

pub mod address;
pub mod error;
pub mod irql;
pub mod kernel;
pub mod layout;
pub mod logging;
pub mod os_dependent;
pub mod teb;
pub mod thread;
pub mod trap_frame;

#[cfg(test)]
mod fake_kernel;

pub use address::AddressRange;
pub use error::{ResolveError, StackUnavailable};
pub use kernel::{ThreadId, ThreadKernel};
pub use layout::{KernelLayout, LayoutAccessor};
pub use thread::{ResolvedThread, StackLimits};
