use core::fmt;

use crate::mmu::{PAGE_OFFSET_MASK, PAGE_SHIFT, PAGE_TABLE_INDEX_BITS, PAGE_TABLE_INDEX_MASK};

/// 32-bit address, used for both virtual and physical addresses.
pub type Addr = u32;

/// Virtual address with helpers for two-level page-table decomposition.
///
/// Layout:
/// - bits 22..=31 index the L1 table (directory)
/// - bits 12..=21 index the L2 table
/// - bits 0..=11 are the offset within the page
#[derive(Clone, Copy, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct VirtualAddress(pub Addr);

impl VirtualAddress {
    pub const fn new(addr: Addr) -> Self {
        VirtualAddress(addr)
    }

    pub const fn as_u32(self) -> Addr {
        self.0
    }

    pub const fn offset(self) -> Addr {
        self.0 & PAGE_OFFSET_MASK
    }

    /// Index into the second-level table.
    pub const fn l2_index(self) -> Addr {
        (self.0 >> PAGE_SHIFT) & PAGE_TABLE_INDEX_MASK
    }

    /// Index into the first-level table.
    pub const fn l1_index(self) -> Addr {
        (self.0 >> (PAGE_SHIFT + PAGE_TABLE_INDEX_BITS)) & PAGE_TABLE_INDEX_MASK
    }

    pub const fn page_base(self) -> Self {
        VirtualAddress(self.0 & !PAGE_OFFSET_MASK)
    }

    pub const fn is_page_aligned(self) -> bool {
        self.offset() == 0
    }

    pub const fn wrapping_add(self, value: Addr) -> Self {
        VirtualAddress(self.0.wrapping_add(value))
    }

    pub fn checked_add(self, value: Addr) -> Option<Self> {
        self.0.checked_add(value).map(VirtualAddress)
    }
}

impl From<Addr> for VirtualAddress {
    fn from(value: Addr) -> Self {
        VirtualAddress(value)
    }
}

impl From<VirtualAddress> for Addr {
    fn from(value: VirtualAddress) -> Self {
        value.0
    }
}

impl fmt::Debug for VirtualAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VirtualAddress(0x{:08x})", self.0)
    }
}

impl fmt::Display for VirtualAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decomposes_into_table_indices() {
        let va = VirtualAddress(0x1234_5678);
        assert_eq!(va.l1_index(), 0x1234_5678 >> 22);
        assert_eq!(va.l2_index(), (0x1234_5678 >> 12) & 0x3ff);
        assert_eq!(va.offset(), 0x678);
        assert_eq!(va.page_base().as_u32(), 0x1234_5000);
    }

    #[test]
    fn index_fields_cover_full_range() {
        let va = VirtualAddress(0xffff_ffff);
        assert_eq!(va.l1_index(), 0x3ff);
        assert_eq!(va.l2_index(), 0x3ff);
        assert_eq!(va.offset(), 0xfff);
        assert!(VirtualAddress(0x0040_0000).is_page_aligned());
        assert_eq!(VirtualAddress(0x0040_0000).l1_index(), 1);
        assert_eq!(VirtualAddress(0x0040_0000).l2_index(), 0);
    }
}
