//! An in-memory kernel for driving the resolver in tests.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::ptr::NonNull;

use windows_sys::Win32::Foundation::NTSTATUS;

use crate::address::AddressRange;
use crate::irql::{Irql, PASSIVE_LEVEL};
use crate::kernel::{KernelObject, MemoryReader, ThreadId, ThreadKernel};
use crate::layout::{KernelLayout, LayoutAccessor};
use crate::teb::TebWidth;

pub const STATUS_INVALID_CID: NTSTATUS = 0xC000_000B_u32 as NTSTATUS;

pub const NATIVE_PROCESS: usize = 0xffff_d000_0000_0080;
pub const WOW64_PROCESS: usize = 0xffff_d000_0000_1080;

/// Somewhere on a kernel stack, what a trap frame of a nested kernel entry holds.
pub const KERNEL_RSP: usize = 0xffff_c000_0000_3f20;

const TRAP_FRAME_STRIDE: usize = 0x200;

#[derive(Debug, Clone, Copy)]
pub struct FakeThread {
    pub object: usize,
    pub process: Option<usize>,
    pub teb: usize,
    pub trap_frame: usize,
    pub kernel_stack: AddressRange,
}

pub struct FakeKernel {
    irql: Cell<Irql>,
    layout: KernelLayout,
    memory: HashMap<usize, usize>,
    threads: HashMap<usize, FakeThread>,
    lookups: Cell<usize>,
    releases: RefCell<Vec<usize>>,
}

impl FakeKernel {
    pub fn new() -> Self {
        Self {
            irql: Cell::new(PASSIVE_LEVEL),
            layout: KernelLayout::WIN10,
            memory: HashMap::new(),
            threads: HashMap::new(),
            lookups: Cell::new(0),
            releases: RefCell::new(Vec::new()),
        }
    }

    pub fn set_irql(&self, irql: Irql) {
        self.irql.set(irql)
    }

    pub fn lookups(&self) -> usize {
        self.lookups.get()
    }

    pub fn releases(&self) -> Vec<usize> {
        self.releases.borrow().clone()
    }

    /// A distinct kernel stack for every thread id.
    pub fn kernel_stack(id: usize) -> AddressRange {
        let base = 0xffff_c000_0000_0000 + id * 0x10_0000;
        AddressRange::new(base, base + 0x6000)
    }

    pub fn add_thread(&mut self, id: usize, thread: FakeThread) {
        self.threads.insert(id, thread);
    }

    pub fn write(&mut self, address: usize, value: usize) {
        self.memory.insert(address, value);
    }

    pub fn native_teb(&mut self, teb: usize, stack_base: usize, stack_limit: usize, deallocation_stack: usize) {
        self.write(teb, 0);
        self.write(teb + 0x08, stack_base);
        self.write(teb + 0x10, stack_limit);
        self.write(teb + 0x30, teb);
        self.write(teb + self.layout.deallocation_stack_offset(TebWidth::Native), deallocation_stack);
    }

    /// A 32-bit TEB at `teb32`, linked from the `ExceptionList` of `native_teb`.
    pub fn narrow_teb(&mut self, native_teb: usize, teb32: usize, stack_base: usize, stack_limit: usize, deallocation_stack: usize) {
        self.write(native_teb, teb32);
        self.write(teb32 + 0x04, stack_base);
        self.write(teb32 + 0x08, stack_limit);
        self.write(teb32 + 0x18, teb32);
        self.write(teb32 + self.layout.deallocation_stack_offset(TebWidth::Narrow), deallocation_stack);
    }

    /// Lay out one trap frame per entry of `rsps` starting at `first`, innermost
    /// first. The outermost frame links to null. Returns `first`.
    pub fn trap_chain(&mut self, first: usize, rsps: &[usize]) -> usize {
        let offsets = self.layout.trap_frame_offsets();
        for (i, rsp) in rsps.iter().enumerate() {
            let frame = first + i * TRAP_FRAME_STRIDE;
            let link = if i + 1 == rsps.len() { 0 } else { frame + TRAP_FRAME_STRIDE };
            self.write(frame + offsets.stack_pointer, *rsp);
            self.write(frame + offsets.link, link);
        }
        first
    }

    fn thread(&self, object: KernelObject) -> Option<&FakeThread> {
        self.threads.values().find(|thread| thread.object == object.addr().get())
    }
}

fn as_object(address: usize) -> Option<KernelObject> {
    NonNull::new(address as *mut core::ffi::c_void)
}

impl MemoryReader for FakeKernel {
    fn read_pointer(&self, address: usize, width: TebWidth) -> Option<usize> {
        let value = *self.memory.get(&address)?;
        match width {
            TebWidth::Native => Some(value),
            TebWidth::Narrow => Some(value & u32::MAX as usize),
        }
    }
}

impl ThreadKernel for FakeKernel {
    type Layout = KernelLayout;

    fn layout(&self) -> &KernelLayout {
        &self.layout
    }

    fn current_irql(&self) -> Irql {
        self.irql.get()
    }

    fn lookup_thread(&self, id: ThreadId) -> Result<KernelObject, NTSTATUS> {
        self.lookups.set(self.lookups.get() + 1);
        self.threads.get(&(id as usize)).and_then(|thread| as_object(thread.object)).ok_or(STATUS_INVALID_CID)
    }

    unsafe fn release_thread(&self, thread: KernelObject) {
        self.releases.borrow_mut().push(thread.addr().get());
    }

    fn thread_process(&self, thread: KernelObject) -> Option<KernelObject> {
        as_object(self.thread(thread)?.process?)
    }

    fn is_compat_process(&self, process: KernelObject) -> bool {
        process.addr().get() == WOW64_PROCESS
    }

    fn thread_teb(&self, thread: KernelObject) -> usize {
        self.thread(thread).map_or(0, |thread| thread.teb)
    }

    fn innermost_trap_frame(&self, thread: KernelObject) -> usize {
        self.thread(thread).map_or(0, |thread| thread.trap_frame)
    }

    fn kernel_stack_limits(&self, thread: KernelObject) -> AddressRange {
        self.thread(thread).map_or(AddressRange::EMPTY, |thread| thread.kernel_stack)
    }
}
