use log::debug;

use types::{Addr, PAGE_SIZE, PteFlags, VirtualAddress, is_page_aligned};
use vm::{Mmu, PageTableEntry, Pmcb, TransferBuffer};

use crate::error::{KernelError, Result};
use crate::frame_allocator::FrameAllocator;
use crate::mmu::{read_entry, read_table, with_physical_mode, write_entry};

/// One process's two-level page table.
///
/// The tables live in frames taken from a [`FrameAllocator`] and are edited
/// through physical-mode byte access. Every editing method leaves the MMU
/// with the PMCB it had on entry, minus any pending transfer.
#[derive(Debug, Clone)]
pub struct AddressSpace {
    l1_table: Addr,
    mapped_pages: Addr,
    quota: Option<Addr>,
}

/// Page-aligned virtual addresses covering `[vaddr, vaddr + size)`.
fn pages(vaddr: Addr, size: Addr) -> Result<impl Iterator<Item = VirtualAddress> + Clone> {
    let misaligned = KernelError::Misaligned { vaddr, size };
    if !is_page_aligned(vaddr) || !is_page_aligned(size) {
        return Err(misaligned);
    }
    // The last page may end exactly at the top of the address space.
    if vaddr as u64 + size as u64 > 1u64 << 32 {
        return Err(misaligned);
    }
    Ok((0..size / PAGE_SIZE).map(move |n| VirtualAddress(vaddr + n * PAGE_SIZE)))
}

const TABLE_FLAGS: PteFlags = PteFlags::PRESENT.union(PteFlags::WRITABLE);

impl AddressSpace {
    /// Allocate an empty L1 table.
    pub fn new(mmu: &mut Mmu, allocator: &mut FrameAllocator) -> Result<Self> {
        let l1_table = allocator.allocate_frame(mmu)?;
        debug!("aspace: new L1 table at 0x{:08x}", l1_table);
        Ok(Self {
            l1_table,
            mapped_pages: 0,
            quota: None,
        })
    }

    /// Like [`AddressSpace::new`], refusing to map more than `quota` pages.
    pub fn with_quota(mmu: &mut Mmu, allocator: &mut FrameAllocator, quota: Addr) -> Result<Self> {
        let mut space = Self::new(mmu, allocator)?;
        space.quota = Some(quota);
        Ok(space)
    }

    pub fn l1_table(&self) -> Addr {
        self.l1_table
    }

    pub fn mapped_pages(&self) -> Addr {
        self.mapped_pages
    }

    pub fn quota(&self) -> Option<Addr> {
        self.quota
    }

    /// PMCB that translates through this address space.
    pub fn pmcb(&self) -> Pmcb {
        Pmcb::virtual_mode(self.l1_table)
    }

    /// Make this the MMU's active address space.
    pub fn activate(&self, mmu: &mut Mmu) -> Result<()> {
        mmu.set_pmcb(self.pmcb(), TransferBuffer::Idle)?;
        mmu.flush_tlb();
        Ok(())
    }

    /// Back `[vaddr, vaddr + size)` with freshly zeroed frames.
    ///
    /// Missing L2 tables are allocated on the way. Nothing is mapped unless
    /// every page in the range is currently unmapped and enough frames are
    /// free for the pages and their tables.
    pub fn map(
        &mut self,
        mmu: &mut Mmu,
        allocator: &mut FrameAllocator,
        vaddr: Addr,
        size: Addr,
    ) -> Result<()> {
        let count = size / PAGE_SIZE;
        let range = pages(vaddr, size)?;
        if let Some(quota) = self.quota {
            if self.mapped_pages + count > quota {
                return Err(KernelError::QuotaExceeded {
                    requested: count,
                    mapped: self.mapped_pages,
                    quota,
                });
            }
        }

        let l1_table = self.l1_table;
        with_physical_mode(mmu, |mmu| {
            let mut new_tables = 0;
            let mut last_new_table = None;
            for page in range.clone() {
                let l1_entry = read_entry(mmu, l1_table, page.l1_index())?;
                if !l1_entry.is_present() {
                    if last_new_table != Some(page.l1_index()) {
                        new_tables += 1;
                        last_new_table = Some(page.l1_index());
                    }
                    continue;
                }
                if read_entry(mmu, l1_entry.frame(), page.l2_index())?.is_present() {
                    return Err(KernelError::AlreadyMapped { vaddr: page.as_u32() });
                }
            }
            let needed = count + new_tables;
            if needed > allocator.free_frames() {
                return Err(KernelError::OutOfFrames {
                    requested: needed,
                    available: allocator.free_frames(),
                });
            }

            for page in range {
                let mut l1_entry = read_entry(mmu, l1_table, page.l1_index())?;
                if !l1_entry.is_present() {
                    let table = allocator.allocate_frame(mmu)?;
                    l1_entry = PageTableEntry::new(table, TABLE_FLAGS);
                    write_entry(mmu, l1_table, page.l1_index(), l1_entry)?;
                    debug!("aspace: L2 table for {} at 0x{:08x}", page, table);
                }
                let frame = allocator.allocate_frame(mmu)?;
                write_entry(
                    mmu,
                    l1_entry.frame(),
                    page.l2_index(),
                    PageTableEntry::new(frame, TABLE_FLAGS),
                )?;
            }
            Ok(())
        })?;

        self.mapped_pages += count;
        debug!(
            "aspace: mapped {} pages at 0x{:08x} ({} total)",
            count, vaddr, self.mapped_pages
        );
        Ok(())
    }

    /// Set or clear the writable bit on every mapped page in the range.
    ///
    /// Unmapped pages are skipped and L1 entries are left alone. The TLB is
    /// flushed so cached permissions cannot outlive the change.
    pub fn set_writable(&self, mmu: &mut Mmu, vaddr: Addr, size: Addr, writable: bool) -> Result<()> {
        let range = pages(vaddr, size)?;
        let l1_table = self.l1_table;
        with_physical_mode(mmu, |mmu| {
            for page in range {
                let l1_entry = read_entry(mmu, l1_table, page.l1_index())?;
                if !l1_entry.is_present() {
                    continue;
                }
                let entry = read_entry(mmu, l1_entry.frame(), page.l2_index())?;
                if !entry.is_present() {
                    continue;
                }
                let updated = if writable {
                    entry.with_flags(PteFlags::WRITABLE)
                } else {
                    entry.without_flags(PteFlags::WRITABLE)
                };
                if updated != entry {
                    write_entry(mmu, l1_entry.frame(), page.l2_index(), updated)?;
                }
            }
            Ok(())
        })?;
        mmu.flush_tlb();
        debug!(
            "aspace: 0x{:08x}+0x{:x} writable={}",
            vaddr, size, writable
        );
        Ok(())
    }

    /// Remove every mapped page in the range and free its frame.
    ///
    /// L2 tables stay allocated. Returns the number of pages unmapped.
    pub fn unmap(
        &mut self,
        mmu: &mut Mmu,
        allocator: &mut FrameAllocator,
        vaddr: Addr,
        size: Addr,
    ) -> Result<Addr> {
        let range = pages(vaddr, size)?;
        let l1_table = self.l1_table;
        let frames = with_physical_mode(mmu, |mmu| {
            let mut frames = Vec::new();
            for page in range {
                let l1_entry = read_entry(mmu, l1_table, page.l1_index())?;
                if !l1_entry.is_present() {
                    continue;
                }
                let entry = read_entry(mmu, l1_entry.frame(), page.l2_index())?;
                if entry.is_present() {
                    write_entry(mmu, l1_entry.frame(), page.l2_index(), PageTableEntry::EMPTY)?;
                    frames.push(entry.frame());
                }
            }
            Ok(frames)
        })?;
        mmu.flush_tlb();
        allocator.deallocate(mmu, &frames)?;

        let unmapped = frames.len() as Addr;
        self.mapped_pages -= unmapped;
        debug!(
            "aspace: unmapped {} pages at 0x{:08x} ({} left)",
            unmapped, vaddr, self.mapped_pages
        );
        Ok(unmapped)
    }

    /// Free every mapped frame, every L2 table and the L1 table.
    ///
    /// If this address space was active, the MMU is left in physical mode.
    pub fn release(self, mmu: &mut Mmu, allocator: &mut FrameAllocator) -> Result<()> {
        let l1_table = self.l1_table;
        let mut frames = with_physical_mode(mmu, |mmu| {
            let mut frames = Vec::new();
            for l1_entry in read_table(mmu, l1_table)? {
                if !l1_entry.is_present() {
                    continue;
                }
                for entry in read_table(mmu, l1_entry.frame())? {
                    if entry.is_present() {
                        frames.push(entry.frame());
                    }
                }
                frames.push(l1_entry.frame());
            }
            Ok(frames)
        })?;
        frames.push(l1_table);

        let active = mmu.pmcb();
        if active.vm_enable && active.page_table_base == l1_table {
            mmu.set_pmcb(Pmcb::physical(), TransferBuffer::Idle)?;
        }
        mmu.flush_tlb();
        allocator.deallocate(mmu, &frames)?;
        debug!(
            "aspace: released L1 table 0x{:08x} ({} frames)",
            l1_table,
            frames.len()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_ranges() {
        let all: Vec<Addr> = pages(0x3000, 2 * PAGE_SIZE).unwrap().map(|p| p.as_u32()).collect();
        assert_eq!(all, vec![0x3000, 0x4000]);
        assert_eq!(pages(0xffff_f000, PAGE_SIZE).unwrap().count(), 1);
        assert_eq!(pages(0x3000, 0).unwrap().count(), 0);
        assert!(pages(0x3004, PAGE_SIZE).is_err());
        assert!(pages(0xffff_f000, 2 * PAGE_SIZE).is_err());
    }
}
