use std::mem::offset_of;

use crate::error::StackUnavailable;
use crate::kernel::MemoryReader;
use crate::layout::LayoutAccessor;

/// `NT_TIB` as the native (64-bit) TEB starts with it.
///
/// https://ntdoc.m417z.com/nt_tib
#[repr(C)]
pub struct ThreadInformationBlock {
    pub exception_list: *const core::ffi::c_void,
    pub stack_base: *const core::ffi::c_void,
    pub stack_limit: *const core::ffi::c_void,
    pub subsystem_tib: *const core::ffi::c_void,
    pub fiber_data: usize, // union with `Version`
    pub arbitrary_user_pointer: *const core::ffi::c_void,
    pub _self: *const ThreadInformationBlock,
}

/// `NT_TIB32`, the head of the TEB a WOW64 thread runs its 32-bit code with.
#[repr(C)]
pub struct ThreadInformationBlock32 {
    pub exception_list: u32,
    pub stack_base: u32,
    pub stack_limit: u32,
    pub subsystem_tib: u32,
    pub fiber_data: u32,
    pub arbitrary_user_pointer: u32,
    pub _self: u32,
}


/// Which of the two TEB layouts a block uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TebWidth {
    /// The kernel's own pointer width.
    Native,
    /// 32-bit block maintained by the WOW64 layer.
    Narrow,
}

impl TebWidth {
    pub const fn pointer_size(self) -> usize {
        match self {
            TebWidth::Native => size_of::<usize>(),
            TebWidth::Narrow => size_of::<u32>(),
        }
    }

    const fn exception_list_offset(self) -> usize {
        match self {
            TebWidth::Native => offset_of!(ThreadInformationBlock, exception_list),
            TebWidth::Narrow => offset_of!(ThreadInformationBlock32, exception_list),
        }
    }

    const fn stack_base_offset(self) -> usize {
        match self {
            TebWidth::Native => offset_of!(ThreadInformationBlock, stack_base),
            TebWidth::Narrow => offset_of!(ThreadInformationBlock32, stack_base),
        }
    }

    const fn stack_limit_offset(self) -> usize {
        match self {
            TebWidth::Native => offset_of!(ThreadInformationBlock, stack_limit),
            TebWidth::Narrow => offset_of!(ThreadInformationBlock32, stack_limit),
        }
    }

    const fn self_offset(self) -> usize {
        match self {
            TebWidth::Native => offset_of!(ThreadInformationBlock, _self),
            TebWidth::Narrow => offset_of!(ThreadInformationBlock32, _self),
        }
    }
}


/// A thread environment block we have not taken ownership of, just its address
/// and the layout it should be read with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvironmentBlock {
    address: usize,
    width: TebWidth,
}

impl EnvironmentBlock {
    pub const fn native(address: usize) -> Self {
        Self { address, width: TebWidth::Native }
    }

    pub const fn narrow(address: usize) -> Self {
        Self { address, width: TebWidth::Narrow }
    }

    pub const fn address(&self) -> usize {
        self.address
    }

    pub const fn width(&self) -> TebWidth {
        self.width
    }

    fn read_field<M: MemoryReader + ?Sized>(&self, memory: &M, offset: usize) -> Result<usize, StackUnavailable> {
        let field = self.address.wrapping_add(offset);
        memory.read_pointer(field, self.width).ok_or(StackUnavailable::UnreadableMemory { address: field })
    }

    pub fn stack_base<M: MemoryReader + ?Sized>(&self, memory: &M) -> Result<usize, StackUnavailable> {
        self.read_field(memory, self.width.stack_base_offset())
    }

    pub fn stack_limit<M: MemoryReader + ?Sized>(&self, memory: &M) -> Result<usize, StackUnavailable> {
        self.read_field(memory, self.width.stack_limit_offset())
    }

    /// `TEB.DeallocationStack`, which is not part of any public header so the
    /// offset comes from `layout`. Whatever is stored there is taken at face value.
    pub fn deallocation_stack<M, L>(&self, memory: &M, layout: &L) -> Result<usize, StackUnavailable>
    where
        M: MemoryReader + ?Sized,
        L: LayoutAccessor + ?Sized,
    {
        self.read_field(memory, layout.deallocation_stack_offset(self.width))
    }
}


/// Find the 32-bit TEB of a thread in a WOW64 process.
///
/// The WOW64 layer stores the address of the 32-bit TEB in the native TEB's
/// `ExceptionList` slot, which is otherwise unused on x64. The candidate only
/// counts if its own `Self` field points back at it.
pub fn find_narrow_block<M: MemoryReader + ?Sized>(memory: &M, native_teb: usize) -> Option<EnvironmentBlock> {
    let slot = native_teb.wrapping_add(TebWidth::Native.exception_list_offset());
    let candidate = memory.read_pointer(slot, TebWidth::Native)?;
    if candidate == 0 || candidate > u32::MAX as usize {
        return None
    }

    let self_field = memory.read_pointer(candidate + TebWidth::Narrow.self_offset(), TebWidth::Narrow)?;
    if self_field != candidate {
        debug!("Rejected WOW64 TEB candidate {candidate:08x}: self pointer is {self_field:08x}");
        return None
    }

    Some(EnvironmentBlock::narrow(candidate))
}

/// Pick the environment block the stack limits should be read from.
///
/// `native_teb` is what the kernel reports for the thread (zero if it has none).
pub fn select_block<M: MemoryReader + ?Sized>(memory: &M, compat_process: bool, native_teb: usize) -> Option<EnvironmentBlock> {
    if native_teb == 0 {
        return None
    }

    if compat_process {
        if let Some(narrow) = find_narrow_block(memory, native_teb) {
            return Some(narrow)
        }
    }

    Some(EnvironmentBlock::native(native_teb))
}
