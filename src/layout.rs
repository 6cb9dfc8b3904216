//! Offsets of kernel and TEB fields that no public header describes.
//!
//! Everything in here depends on the exact build of the running kernel. Getting
//! a row wrong does not fail loudly, it produces stack ranges that look fine
//! and are not, so keep new rows checked against the symbols of that build.

use crate::teb::TebWidth;

/// Where the two `KTRAP_FRAME` fields the walk needs live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TrapFrameOffsets {
    /// `KTRAP_FRAME.Rsp`
    pub stack_pointer: usize,
    /// `KTRAP_FRAME.TrapFrame`, the previous frame of a nested kernel entry
    pub link: usize,
    /// `sizeof(KTRAP_FRAME)`
    pub size: usize,
}


/// The narrow interface the resolver reads undocumented fields through.
pub trait LayoutAccessor {
    /// Offset of `DeallocationStack` inside a TEB of the given width.
    fn deallocation_stack_offset(&self, width: TebWidth) -> usize;
    fn trap_frame_offsets(&self) -> TrapFrameOffsets;
}


/// One row of known offsets, valid from `min_build` up to the next row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KernelLayout {
    pub min_build: u32,
    pub teb_deallocation_stack: usize,
    pub teb32_deallocation_stack: usize,
    /// `KTHREAD.TrapFrame`
    pub kthread_trap_frame: usize,
    /// `KTHREAD.StackLimit`
    pub kthread_stack_limit: usize,
    /// `KTHREAD.StackBase`
    pub kthread_stack_base: usize,
    pub trap_frame: TrapFrameOffsets,
}

impl KernelLayout {
    const KTRAP_FRAME_X64: TrapFrameOffsets = TrapFrameOffsets {
        stack_pointer: 0x180,
        link: 0x138,
        size: 0x190,
    };

    pub const WIN7: Self = Self {
        min_build: 7600,
        teb_deallocation_stack: 0x1478,
        teb32_deallocation_stack: 0xe0c,
        kthread_trap_frame: 0x1d8,
        kthread_stack_limit: 0x30,
        kthread_stack_base: 0x278,
        trap_frame: Self::KTRAP_FRAME_X64,
    };

    pub const WIN8: Self = Self {
        min_build: 9200,
        kthread_trap_frame: 0x90,
        kthread_stack_base: 0x38,
        ..Self::WIN7
    };

    pub const WIN10: Self = Self {
        min_build: 10240,
        ..Self::WIN8
    };

    /// Known rows, ordered by `min_build`.
    pub const KNOWN: &'static [KernelLayout] = &[Self::WIN7, Self::WIN8, Self::WIN10];

    /// The newest known row that applies to `build`, `None` for kernels older than all of them.
    pub fn for_build(build: u32) -> Option<Self> {
        let layout = Self::KNOWN.iter().rev().find(|layout| layout.min_build <= build).copied();
        match layout {
            Some(layout) => debug!("Using kernel layout for build {} (running {build})", layout.min_build),
            None => warn!("No kernel layout known for build {build}"),
        }
        layout
    }
}

impl LayoutAccessor for KernelLayout {
    fn deallocation_stack_offset(&self, width: TebWidth) -> usize {
        match width {
            TebWidth::Native => self.teb_deallocation_stack,
            TebWidth::Narrow => self.teb32_deallocation_stack,
        }
    }

    fn trap_frame_offsets(&self) -> TrapFrameOffsets {
        self.trap_frame
    }
}
