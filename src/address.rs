/// Highest address a user-mode pointer can have on x64 (`MM_HIGHEST_USER_ADDRESS`).
pub const HIGHEST_USER_ADDRESS: usize = 0x0000_7FFF_FFFE_FFFF;

/// Whether `address` lies in the user half of the address space.
///
/// Null is never a user-mode address, a saved stack pointer of zero means the
/// frame has no user context at all.
pub const fn is_user_mode_address(address: usize) -> bool {
    address != 0 && address <= HIGHEST_USER_ADDRESS
}


/// A half-open address interval `[begin, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct AddressRange {
    begin: usize,
    end: usize,
}

impl AddressRange {
    /// The range containing no addresses at all.
    pub const EMPTY: Self = Self { begin: 0, end: 0 };

    /// Builds `[begin, end)`. Bounds given in the wrong order produce an empty range.
    pub const fn new(begin: usize, end: usize) -> Self {
        if begin <= end {
            Self { begin, end }
        } else {
            Self::EMPTY
        }
    }

    pub const fn begin(&self) -> usize {
        self.begin
    }

    pub const fn end(&self) -> usize {
        self.end
    }

    pub const fn len(&self) -> usize {
        self.end - self.begin
    }

    pub const fn is_empty(&self) -> bool {
        self.begin == self.end
    }

    pub const fn contains_address(&self, address: usize) -> bool {
        self.begin <= address && address < self.end
    }

    /// Whether the whole `size`-byte object at `address` fits in the range.
    pub const fn contains_object(&self, address: usize, size: usize) -> bool {
        match address.checked_add(size) {
            Some(last) => self.contains_address(address) && last <= self.end,
            None => false,
        }
    }
}

impl std::fmt::Display for AddressRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:016x}, {:016x})", self.begin, self.end)
    }
}
