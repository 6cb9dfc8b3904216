use std::ptr::NonNull;

use windows_sys::Win32::Foundation::{HANDLE, NTSTATUS};

use crate::address::AddressRange;
use crate::irql::Irql;
use crate::kernel::{KernelObject, MemoryReader, ThreadId, ThreadKernel};
use crate::layout::KernelLayout;
use crate::teb::TebWidth;

type PETHREAD = *mut core::ffi::c_void;
type PEPROCESS = *mut core::ffi::c_void;

/// `RTL_OSVERSIONINFOW`
#[repr(C)]
struct OsVersionInfo {
    size: u32,
    major_version: u32,
    minor_version: u32,
    build_number: u32,
    platform_id: u32,
    csd_version: [u16; 128],
}

#[link(name = "ntoskrnl.exe", kind = "raw-dylib", modifiers = "+verbatim")]
unsafe extern "system" {
    fn PsLookupThreadByThreadId(ThreadId: HANDLE, Thread: *mut PETHREAD) -> NTSTATUS;
    fn ObfDereferenceObject(Object: *mut core::ffi::c_void) -> isize;
    fn IoThreadToProcess(Thread: PETHREAD) -> PEPROCESS;
    fn PsGetThreadTeb(Thread: PETHREAD) -> *mut core::ffi::c_void;
    fn PsGetProcessWow64Process(Process: PEPROCESS) -> *mut core::ffi::c_void;
    fn MmIsAddressValid(VirtualAddress: *const core::ffi::c_void) -> u8;
    fn RtlGetVersion(VersionInformation: *mut OsVersionInfo) -> NTSTATUS;
}


/// Build number of the running kernel.
pub fn kernel_build_number() -> Result<u32, NTSTATUS> {
    let mut info = OsVersionInfo {
        size: size_of::<OsVersionInfo>() as u32,
        major_version: 0,
        minor_version: 0,
        build_number: 0,
        platform_id: 0,
        csd_version: [0; 128],
    };

    let rv = unsafe { RtlGetVersion(&raw mut info) };
    if rv != 0 { return Err(rv) }

    Ok(info.build_number)
}


/// The running NT kernel.
pub struct NtKernel {
    layout: KernelLayout,
}

impl NtKernel {
    /// Use the layout known for the running build, `None` if the build is unknown.
    pub fn new() -> Option<Self> {
        let build = match kernel_build_number() {
            Ok(build) => build,
            Err(status) => {
                error!("RtlGetVersion failed with status 0x{status:08x}");
                return None
            }
        };
        Some(Self::with_layout(KernelLayout::for_build(build)?))
    }

    pub fn with_layout(layout: KernelLayout) -> Self {
        Self { layout }
    }

    fn read_field(&self, object: KernelObject, offset: usize) -> usize {
        self.read_pointer(object.addr().get() + offset, TebWidth::Native).unwrap_or(0)
    }
}

impl MemoryReader for NtKernel {
    fn read_pointer(&self, address: usize, width: TebWidth) -> Option<usize> {
        let ptr = address as *const u8;
        if ptr.is_null() || unsafe { MmIsAddressValid(ptr.cast()) } == 0 {
            return None
        }

        // SAFETY: the page is resident. The value may change under us, callers
        // only ever get a snapshot.
        let value = unsafe {
            match width {
                TebWidth::Native => ptr.cast::<usize>().read_unaligned(),
                TebWidth::Narrow => ptr.cast::<u32>().read_unaligned() as usize,
            }
        };
        Some(value)
    }
}

impl ThreadKernel for NtKernel {
    type Layout = KernelLayout;

    fn layout(&self) -> &KernelLayout {
        &self.layout
    }

    fn current_irql(&self) -> Irql {
        // `KeGetCurrentIrql` is an inline function on x64, it's just cr8
        let irql: u64;
        unsafe { core::arch::asm!("mov {}, cr8", out(reg) irql, options(nomem, nostack, preserves_flags)) };
        irql as Irql
    }

    fn lookup_thread(&self, id: ThreadId) -> Result<KernelObject, NTSTATUS> {
        let mut thread: PETHREAD = std::ptr::null_mut();
        let rv = unsafe { PsLookupThreadByThreadId(id, &raw mut thread) };
        if rv < 0 { return Err(rv) }

        // a successful lookup always hands out an object
        NonNull::new(thread).ok_or(rv)
    }

    unsafe fn release_thread(&self, thread: KernelObject) {
        unsafe { ObfDereferenceObject(thread.as_ptr()) };
    }

    fn thread_process(&self, thread: KernelObject) -> Option<KernelObject> {
        NonNull::new(unsafe { IoThreadToProcess(thread.as_ptr()) })
    }

    fn is_compat_process(&self, process: KernelObject) -> bool {
        !unsafe { PsGetProcessWow64Process(process.as_ptr()) }.is_null()
    }

    fn thread_teb(&self, thread: KernelObject) -> usize {
        unsafe { PsGetThreadTeb(thread.as_ptr()) }.addr()
    }

    fn innermost_trap_frame(&self, thread: KernelObject) -> usize {
        self.read_field(thread, self.layout.kthread_trap_frame)
    }

    fn kernel_stack_limits(&self, thread: KernelObject) -> AddressRange {
        AddressRange::new(
            self.read_field(thread, self.layout.kthread_stack_limit),
            self.read_field(thread, self.layout.kthread_stack_base),
        )
    }
}
