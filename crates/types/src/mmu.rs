use core::fmt;

use bitflags::bitflags;

use crate::address::Addr;

/// Page (and page frame) size in bytes (4 KiB).
pub const PAGE_SIZE: Addr = 1 << PAGE_SHIFT;
/// Shift count for the page size.
pub const PAGE_SHIFT: u32 = 12;
pub const PAGE_OFFSET_MASK: Addr = PAGE_SIZE - 1;
pub const PAGE_NUMBER_MASK: Addr = !PAGE_OFFSET_MASK;

/// Number of bits in a page-table index field.
pub const PAGE_TABLE_INDEX_BITS: u32 = 10;
/// Entries per table (one table fills exactly one frame).
pub const PAGE_TABLE_ENTRIES: Addr = 1 << PAGE_TABLE_INDEX_BITS;
pub const PAGE_TABLE_INDEX_MASK: Addr = PAGE_TABLE_ENTRIES - 1;
pub const PAGE_TABLE_SIZE_BYTES: Addr = PAGE_SIZE;
/// Size of one entry as stored in physical memory.
pub const PTE_SIZE: Addr = 4;

const _: () = assert!(PAGE_TABLE_ENTRIES * PTE_SIZE == PAGE_SIZE);

/// Frame field of a page-table entry (bits 12..=31).
pub const PTE_FRAME_MASK: u32 = PAGE_NUMBER_MASK;

bitflags! {
    /// Flag bits of a page-table entry.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct PteFlags: u32 {
        /// Page present in memory.
        const PRESENT = 1 << 0;
        /// Page may be written.
        const WRITABLE = 1 << 1;
        /// Set by the MMU when the page is referenced.
        const ACCESSED = 1 << 5;
        /// Set by the MMU when the page is written.
        const MODIFIED = 1 << 6;
    }
}

/// A single page-table entry: frame address in the upper 20 bits plus flags.
///
/// Entries are stored in physical memory as little-endian 32-bit words. Bits
/// outside the frame field and the known flags are reserved and carried
/// through unchanged.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct PageTableEntry(pub u32);

impl PageTableEntry {
    /// The entry that is not present and maps nothing.
    pub const EMPTY: PageTableEntry = PageTableEntry(0);

    /// Build an entry for `frame` (low 12 bits ignored) with the given flags.
    pub const fn new(frame: Addr, flags: PteFlags) -> Self {
        PageTableEntry((frame & PTE_FRAME_MASK) | flags.bits())
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn frame(self) -> Addr {
        self.0 & PTE_FRAME_MASK
    }

    pub const fn flags(self) -> PteFlags {
        PteFlags::from_bits_truncate(self.0)
    }

    pub const fn is_present(self) -> bool {
        self.0 & PteFlags::PRESENT.bits() != 0
    }

    pub const fn is_writable(self) -> bool {
        self.0 & PteFlags::WRITABLE.bits() != 0
    }

    pub const fn is_accessed(self) -> bool {
        self.0 & PteFlags::ACCESSED.bits() != 0
    }

    pub const fn is_modified(self) -> bool {
        self.0 & PteFlags::MODIFIED.bits() != 0
    }

    pub const fn with_flags(self, flags: PteFlags) -> Self {
        PageTableEntry(self.0 | flags.bits())
    }

    pub const fn without_flags(self, flags: PteFlags) -> Self {
        PageTableEntry(self.0 & !flags.bits())
    }

    pub const fn with_frame(self, frame: Addr) -> Self {
        PageTableEntry((self.0 & !PTE_FRAME_MASK) | (frame & PTE_FRAME_MASK))
    }

    pub const fn to_le_bytes(self) -> [u8; PTE_SIZE as usize] {
        self.0.to_le_bytes()
    }

    pub const fn from_le_bytes(bytes: [u8; PTE_SIZE as usize]) -> Self {
        PageTableEntry(u32::from_le_bytes(bytes))
    }
}

impl From<u32> for PageTableEntry {
    fn from(value: u32) -> Self {
        PageTableEntry(value)
    }
}

impl From<PageTableEntry> for u32 {
    fn from(value: PageTableEntry) -> Self {
        value.0
    }
}

impl fmt::Debug for PageTableEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageTableEntry")
            .field("frame", &format_args!("0x{:08x}", self.frame()))
            .field("flags", &self.flags())
            .finish()
    }
}

/// Physical address of the entry for `index` in the table starting at `table_base`.
pub const fn entry_address(table_base: Addr, index: Addr) -> Addr {
    table_base.wrapping_add(index * PTE_SIZE)
}

pub const fn is_page_aligned(addr: Addr) -> bool {
    addr & PAGE_OFFSET_MASK == 0
}

pub const fn align_down(addr: Addr) -> Addr {
    addr & PAGE_NUMBER_MASK
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_bits_match_layout() {
        assert_eq!(PteFlags::PRESENT.bits(), 0x01);
        assert_eq!(PteFlags::WRITABLE.bits(), 0x02);
        assert_eq!(PteFlags::ACCESSED.bits(), 0x20);
        assert_eq!(PteFlags::MODIFIED.bits(), 0x40);
    }

    #[test]
    fn entry_accessors() {
        let pte = PageTableEntry::new(0x0001_e123, PteFlags::PRESENT | PteFlags::WRITABLE);
        assert_eq!(pte.frame(), 0x0001_e000);
        assert!(pte.is_present());
        assert!(pte.is_writable());
        assert!(!pte.is_accessed());
        assert!(!pte.is_modified());

        let touched = pte.with_flags(PteFlags::ACCESSED | PteFlags::MODIFIED);
        assert_eq!(touched.bits(), 0x0001_e063);
        assert_eq!(touched.without_flags(PteFlags::WRITABLE).bits(), 0x0001_e061);
        assert_eq!(touched.with_frame(0x0000_5000).frame(), 0x0000_5000);
        assert_eq!(touched.with_frame(0x0000_5000).flags(), touched.flags());
    }

    #[test]
    fn reserved_bits_are_preserved() {
        let pte = PageTableEntry(0x0000_3f9d);
        assert_eq!(pte.with_flags(PteFlags::ACCESSED).bits() & 0x0000_0f9c, 0x0000_0f9c);
        assert_eq!(PageTableEntry::from_le_bytes(pte.to_le_bytes()), pte);
        assert_eq!(pte.to_le_bytes(), [0x9d, 0x3f, 0x00, 0x00]);
    }

    #[test]
    fn entry_address_scales_by_entry_size() {
        assert_eq!(entry_address(0x13000, 0), 0x13000);
        assert_eq!(entry_address(0x13000, 0x3ff), 0x13ffc);
    }
}
