//! Interrupt request levels, as far as thread lookups care about them.

/// A `KIRQL`.
pub type Irql = u8;

pub const PASSIVE_LEVEL: Irql = 0;
pub const APC_LEVEL: Irql = 1;
pub const DISPATCH_LEVEL: Irql = 2;

/// `PsLookupThreadByThreadId` may block on the object manager, which is only
/// allowed at or below `APC_LEVEL`.
pub const fn sufficient_for_lookup(irql: Irql) -> bool {
    irql <= APC_LEVEL
}
