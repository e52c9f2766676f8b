//! Page-table access helpers shared by the frame allocator and address spaces.
//!
//! Kernel bookkeeping lives in the same physical memory the MMU translates
//! into, so every helper here runs with translation switched off.

use types::{Addr, PAGE_SIZE, PTE_SIZE, entry_address};
use vm::{Mmu, PageTableEntry, Pmcb, TransferBuffer};

use crate::error::Result;

/// Run `f` with the MMU in physical mode.
///
/// The caller's PMCB is loaded back afterwards with any pending transfer
/// dropped, whether or not `f` succeeded.
pub fn with_physical_mode<T>(mmu: &mut Mmu, f: impl FnOnce(&mut Mmu) -> Result<T>) -> Result<T> {
    let saved = mmu.pmcb();
    mmu.set_pmcb(Pmcb::physical(), TransferBuffer::Idle)?;
    let out = f(mmu);
    mmu.set_pmcb(saved.idle(), TransferBuffer::Idle)?;
    out
}

pub fn read_entry(mmu: &mut Mmu, table: Addr, index: Addr) -> Result<PageTableEntry> {
    let mut raw = [0u8; PTE_SIZE as usize];
    mmu.get_bytes(&mut raw, entry_address(table, index))?;
    Ok(PageTableEntry::from_le_bytes(raw))
}

pub fn write_entry(mmu: &mut Mmu, table: Addr, index: Addr, entry: PageTableEntry) -> Result<()> {
    mmu.put_bytes(entry_address(table, index), &entry.to_le_bytes())?;
    Ok(())
}

/// Every entry of the table at `table`, in index order.
pub fn read_table(mmu: &mut Mmu, table: Addr) -> Result<Vec<PageTableEntry>> {
    let mut raw = vec![0u8; PAGE_SIZE as usize];
    mmu.get_bytes(&mut raw, table)?;
    Ok(raw
        .chunks_exact(PTE_SIZE as usize)
        .map(|word| PageTableEntry::from_le_bytes([word[0], word[1], word[2], word[3]]))
        .collect())
}

pub fn zero_frame(mmu: &mut Mmu, frame: Addr) -> Result<()> {
    mmu.put_bytes(frame, &[0u8; PAGE_SIZE as usize])?;
    Ok(())
}
