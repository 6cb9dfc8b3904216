use std::ptr::NonNull;

use windows_sys::Win32::Foundation::{HANDLE, NTSTATUS};

use crate::address::AddressRange;
use crate::irql::{sufficient_for_lookup, Irql};
use crate::layout::LayoutAccessor;
use crate::teb::TebWidth;

/// The id a thread is known by to the caller (a `CLIENT_ID.UniqueThread`).
pub type ThreadId = HANDLE;

/// A referenced kernel object (`PETHREAD` / `PEPROCESS`).
pub type KernelObject = NonNull<core::ffi::c_void>;


/// Snapshot reads of memory the resolver does not own.
pub trait MemoryReader {
    /// Read one pointer of the given width at `address`, zero-extended.
    ///
    /// Returns `None` if the memory can't be read. Nothing read this way is
    /// synchronized with the thread that owns it.
    fn read_pointer(&self, address: usize, width: TebWidth) -> Option<usize>;
}


/// Everything the resolver needs from the kernel it runs in.
pub trait ThreadKernel: MemoryReader {
    type Layout: LayoutAccessor;

    fn layout(&self) -> &Self::Layout;

    fn current_irql(&self) -> Irql;

    /// Whether it is currently allowed to call [`ThreadKernel::lookup_thread`].
    fn is_lookup_safe(&self) -> bool {
        sufficient_for_lookup(self.current_irql())
    }

    /// Reference the thread object for `id` (`PsLookupThreadByThreadId`).
    fn lookup_thread(&self, id: ThreadId) -> Result<KernelObject, NTSTATUS>;

    /// Drop a reference obtained from [`ThreadKernel::lookup_thread`].
    ///
    /// # Safety
    /// `thread` must come from `lookup_thread` on this kernel and must not be used afterwards.
    unsafe fn release_thread(&self, thread: KernelObject);

    /// The process that owns `thread`. Not referenced, only valid while `thread` is.
    fn thread_process(&self, thread: KernelObject) -> Option<KernelObject>;

    /// Whether `process` runs under WOW64 (`PsGetProcessWow64Process` is non-null).
    fn is_compat_process(&self, process: KernelObject) -> bool;

    /// The native TEB of `thread`, zero for system threads.
    fn thread_teb(&self, thread: KernelObject) -> usize;

    /// The trap frame saved on the most recent kernel entry of `thread`.
    fn innermost_trap_frame(&self, thread: KernelObject) -> usize;

    /// Bounds of `thread`'s own kernel stack, not the caller's.
    fn kernel_stack_limits(&self, thread: KernelObject) -> AddressRange;
}


/// An owned reference to a thread object. Released exactly once, on drop.
pub struct ThreadRef<'k, K: ThreadKernel + ?Sized> {
    kernel: &'k K,
    object: KernelObject,
}

impl<'k, K: ThreadKernel + ?Sized> ThreadRef<'k, K> {
    pub fn acquire(kernel: &'k K, id: ThreadId) -> Result<Self, NTSTATUS> {
        let object = kernel.lookup_thread(id)?;
        Ok(Self { kernel, object })
    }

    pub fn as_ptr(&self) -> KernelObject {
        self.object
    }

    pub fn kernel(&self) -> &'k K {
        self.kernel
    }
}

impl<K: ThreadKernel + ?Sized> Drop for ThreadRef<'_, K> {
    fn drop(&mut self) {
        trace!("Releasing thread object {:016x?}", self.object);
        // SAFETY: `object` came from `lookup_thread`, and `ThreadRef` can't be cloned
        unsafe { self.kernel.release_thread(self.object) }
    }
}

impl<K: ThreadKernel + ?Sized> std::fmt::Debug for ThreadRef<'_, K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ThreadRef").field(&self.object).finish()
    }
}
