use crate::address::{is_user_mode_address, AddressRange};
use crate::error::StackUnavailable;
use crate::kernel::MemoryReader;
use crate::layout::TrapFrameOffsets;
use crate::teb::TebWidth;

/// The trap frame saved when the thread last left user mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserTrapFrame {
    pub address: usize,
    /// the user-mode `Rsp` saved in the frame
    pub stack_pointer: usize,
}

/// Walk a thread's nested trap frames outwards until one holds a user-mode stack pointer.
///
/// Every time the kernel is re-entered without going back to user mode (an
/// interrupt during a syscall, a callout, ...) another frame is pushed that
/// links to the previous one. Only the outermost one describes user mode.
///
/// Each frame has to lie inside `kernel_stack`, the target thread's kernel
/// stack. A frame outside it means the chain is corrupt or the thread never
/// entered the kernel from user mode. The number of steps is bounded by how
/// many frames the kernel stack could possibly hold, so a cycle ends the walk too.
pub fn find_user_trap_frame<M: MemoryReader + ?Sized>(
    memory: &M,
    offsets: TrapFrameOffsets,
    kernel_stack: AddressRange,
    innermost: usize,
) -> Result<UserTrapFrame, StackUnavailable> {
    let max_steps = (kernel_stack.len() / offsets.size.max(1)).max(1);

    let mut frame = innermost;
    for depth in 0..max_steps {
        if !kernel_stack.contains_object(frame, offsets.size) {
            debug!("Trap frame {frame:016x} (depth {depth}) is outside kernel stack {kernel_stack}");
            return Err(StackUnavailable::TrapFrameOutsideKernelStack { frame })
        }

        let stack_pointer = read(memory, frame + offsets.stack_pointer)?;
        trace!("Trap frame {frame:016x} (depth {depth}): rsp = {stack_pointer:016x}");

        if is_user_mode_address(stack_pointer) {
            return Ok(UserTrapFrame { address: frame, stack_pointer })
        }

        frame = read(memory, frame + offsets.link)?;
    }

    warn!("Gave up on trap frame chain starting at {innermost:016x} after {max_steps} frames");
    Err(StackUnavailable::TrapFrameChainTooLong { steps: max_steps })
}

fn read<M: MemoryReader + ?Sized>(memory: &M, address: usize) -> Result<usize, StackUnavailable> {
    memory.read_pointer(address, TebWidth::Native).ok_or(StackUnavailable::UnreadableMemory { address })
}
