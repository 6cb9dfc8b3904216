use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

use windows_sys::Win32::Foundation::NTSTATUS;

use crate::address::AddressRange;
use crate::error::{ResolveError, StackUnavailable};
use crate::kernel::{KernelObject, ThreadId, ThreadKernel, ThreadRef};
use crate::layout::LayoutAccessor;
use crate::teb::{select_block, EnvironmentBlock};
use crate::trap_frame::find_user_trap_frame;

/// The user-mode stack of a thread, as captured by one resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StackLimits {
    /// `Rsp` of the outermost trap frame
    pub stack_pointer: usize,
    /// `StackLimit`, the lowest committed address
    pub committed_low: usize,
    /// `[DeallocationStack, StackBase)`, everything reserved for the stack
    pub range: AddressRange,
}


enum Resolution<'k, K: ThreadKernel + ?Sized> {
    /// Never looked up, or only turned away at a too high IRQL.
    Pending,
    LookupFailed(NTSTATUS),
    Acquired {
        thread: ThreadRef<'k, K>,
        stack: Result<StackLimits, StackUnavailable>,
    },
}


/// A thread looked up by id, together with where its user-mode stack lives.
///
/// Resolution is one-shot: once the lookup was attempted, the instance keeps
/// whatever it found for its whole lifetime. A stack can grow after that, so
/// anyone who needs fresh limits constructs a new instance.
///
/// Two instances are equal when they hold the same thread object. Before the
/// lookup, only the raw id is available and is compared instead.
pub struct ResolvedThread<'k, K: ThreadKernel + ?Sized> {
    kernel: &'k K,
    thread_id: ThreadId,
    state: Resolution<'k, K>,
}

impl<'k, K: ThreadKernel + ?Sized> ResolvedThread<'k, K> {
    pub fn new(kernel: &'k K, thread_id: ThreadId) -> Self {
        Self { kernel, thread_id, state: Resolution::Pending }
    }

    /// Look the thread up and capture its stack limits.
    ///
    /// Returns `true` if the thread object was found by this call, even if no
    /// stack information could be read for it (check [`Self::is_resolved`]).
    /// Every later call returns `false` without doing anything, except after
    /// being turned away for a too high IRQL, which can be retried.
    pub fn resolve(&mut self) -> bool {
        match self.try_resolve() {
            Ok(()) => true,
            Err(ResolveError::AlreadyAttempted) => false,
            Err(err) => {
                debug!("Thread {:x?} not resolved: {err}", self.thread_id);
                false
            }
        }
    }

    /// [`Self::resolve`], but says why nothing was looked up.
    pub fn try_resolve(&mut self) -> Result<(), ResolveError> {
        if !matches!(self.state, Resolution::Pending) {
            return Err(ResolveError::AlreadyAttempted)
        }

        if !self.kernel.is_lookup_safe() {
            return Err(ResolveError::InsufficientIrql(self.kernel.current_irql()))
        }

        let thread = match ThreadRef::acquire(self.kernel, self.thread_id) {
            Ok(thread) => thread,
            Err(status) => {
                warn!("Lookup of thread {:x?} failed with status 0x{status:08x}", self.thread_id);
                self.state = Resolution::LookupFailed(status);
                return Err(ResolveError::LookupFailed(status))
            }
        };

        let stack = resolve_stack(&thread);
        match &stack {
            Ok(limits) => debug!(
                "Thread {:x?}: rsp {:016x}, committed low {:016x}, reserved {}",
                self.thread_id, limits.stack_pointer, limits.committed_low, limits.range
            ),
            Err(reason) => info!("Thread {:x?} has no usable user stack: {reason}", self.thread_id),
        }

        self.state = Resolution::Acquired { thread, stack };
        Ok(())
    }

    pub fn is_resolved(&self) -> bool {
        !self.stack_ptr().is_null()
    }

    pub fn thread_id(&self) -> ThreadId {
        self.thread_id
    }

    pub fn limits(&self) -> Option<&StackLimits> {
        match &self.state {
            Resolution::Acquired { stack: Ok(limits), .. } => Some(limits),
            _ => None,
        }
    }

    /// The reserved stack range, empty until resolved.
    pub fn stack(&self) -> &AddressRange {
        match self.limits() {
            Some(limits) => &limits.range,
            None => &AddressRange::EMPTY,
        }
    }

    pub fn stack_ptr(&self) -> *const usize {
        self.limits().map_or(std::ptr::null(), |limits| limits.stack_pointer as *const usize)
    }

    pub fn commited_stack_bottom(&self) -> *const usize {
        self.limits().map_or(std::ptr::null(), |limits| limits.committed_low as *const usize)
    }

    /// Why a thread that was found has no stack information.
    pub fn stack_unavailable(&self) -> Option<StackUnavailable> {
        match &self.state {
            Resolution::Acquired { stack: Err(reason), .. } => Some(*reason),
            _ => None,
        }
    }

    /// The status of the failed lookup, if that is how resolution ended.
    pub fn lookup_failure(&self) -> Option<NTSTATUS> {
        match self.state {
            Resolution::LookupFailed(status) => Some(status),
            _ => None,
        }
    }

    /// The referenced thread object, once looked up.
    pub fn object(&self) -> Option<KernelObject> {
        match &self.state {
            Resolution::Acquired { thread, .. } => Some(thread.as_ptr()),
            _ => None,
        }
    }

    /// The process the thread belongs to, once looked up.
    pub fn process(&self) -> Option<KernelObject> {
        self.kernel.thread_process(self.object()?)
    }

    fn identity(&self) -> Identity {
        match self.object() {
            Some(object) => Identity::Object(object.addr().get()),
            None => Identity::Id(self.thread_id as usize),
        }
    }
}


fn resolve_stack<K: ThreadKernel + ?Sized>(thread: &ThreadRef<'_, K>) -> Result<StackLimits, StackUnavailable> {
    let kernel = thread.kernel();
    let object = thread.as_ptr();

    let compat = kernel.thread_process(object).is_some_and(|process| kernel.is_compat_process(process));
    let teb = select_block(kernel, compat, kernel.thread_teb(object)).ok_or(StackUnavailable::NoEnvironmentBlock)?;
    trace!("Thread object {object:016x?} uses {:?} TEB at {:016x}", teb.width(), teb.address());

    extract_limits(kernel, object, teb)
}

/// Read all three limits, or none of them.
fn extract_limits<K: ThreadKernel + ?Sized>(kernel: &K, object: KernelObject, teb: EnvironmentBlock) -> Result<StackLimits, StackUnavailable> {
    let frame = find_user_trap_frame(
        kernel,
        kernel.layout().trap_frame_offsets(),
        kernel.kernel_stack_limits(object),
        kernel.innermost_trap_frame(object),
    )?;

    let high = teb.stack_base(kernel)?;
    let low = teb.deallocation_stack(kernel, kernel.layout())?;
    let committed = teb.stack_limit(kernel)?;

    let range = AddressRange::new(low, high);
    if range.is_empty() || committed == 0 {
        return Err(StackUnavailable::InvalidStackLimits { low, high, committed })
    }

    Ok(StackLimits { stack_pointer: frame.stack_pointer, committed_low: committed, range })
}


#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
enum Identity {
    Object(usize),
    Id(usize),
}

impl<K: ThreadKernel + ?Sized> PartialEq for ResolvedThread<'_, K> {
    fn eq(&self, other: &Self) -> bool {
        self.identity() == other.identity()
    }
}

impl<K: ThreadKernel + ?Sized> Eq for ResolvedThread<'_, K> {}

impl<K: ThreadKernel + ?Sized> PartialOrd for ResolvedThread<'_, K> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<K: ThreadKernel + ?Sized> Ord for ResolvedThread<'_, K> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.identity().cmp(&other.identity())
    }
}

impl<K: ThreadKernel + ?Sized> Hash for ResolvedThread<'_, K> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identity().hash(state)
    }
}

impl<K: ThreadKernel + ?Sized> std::fmt::Debug for ResolvedThread<'_, K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedThread")
            .field("thread_id", &self.thread_id)
            .field("object", &self.object())
            .field("limits", &self.limits())
            .finish()
    }
}
