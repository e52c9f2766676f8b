use log::{debug, trace, warn};

use crate::config::MmuConfig;
use crate::error::{MmuError, Result};
use crate::memory::PhysicalMemory;
use crate::tlb::{Tlb, TlbStats};
use types::{
    entry_address, is_page_aligned, Addr, Operation, PageTableEntry, Pmcb, PteFlags,
    VirtualAddress, PAGE_OFFSET_MASK, PAGE_SIZE,
};

/// Caller buffer for a transfer driven by the active [`Pmcb`].
///
/// The PMCB only records an offset (`user_buffer`) into this buffer, so a
/// caller resuming a faulted transfer hands the same buffer back in.
#[derive(Debug)]
pub enum TransferBuffer<'a> {
    /// No buffer; only valid when no transfer is pending.
    Idle,
    /// Destination of a read.
    Read(&'a mut [u8]),
    /// Source of a write.
    Write(&'a [u8]),
}

impl TransferBuffer<'_> {
    fn len(&self) -> usize {
        match self {
            TransferBuffer::Idle => 0,
            TransferBuffer::Read(dest) => dest.len(),
            TransferBuffer::Write(src) => src.len(),
        }
    }
}

impl<'a> From<&'a mut [u8]> for TransferBuffer<'a> {
    fn from(dest: &'a mut [u8]) -> Self {
        TransferBuffer::Read(dest)
    }
}

impl<'a> From<&'a [u8]> for TransferBuffer<'a> {
    fn from(src: &'a [u8]) -> Self {
        TransferBuffer::Write(src)
    }
}

/// Software memory management unit.
///
/// Design at a glance:
/// - Physical memory is a single owned [`PhysicalMemory`]; page tables and
///   frames are just bytes inside it.
/// - Translation is controlled by the active [`Pmcb`]. With `vm_enable`
///   clear, virtual == physical.
/// - With `vm_enable` set, addresses go through a two-level table rooted at
///   `page_table_base`: L1 index (bits 22..=31) → L2 table → L2 index
///   (bits 12..=21) → frame. Walks maintain the accessed/modified bits.
/// - An optional [`Tlb`] caches L2 entries. A cached entry that is not yet
///   marked modified is never trusted for a write, so the first write to a
///   page always reaches the page table.
/// - Transfers run page by page and checkpoint into the PMCB after every
///   chunk. On a fault the PMCB points at the first untransferred byte and can
///   be loaded back with [`Mmu::set_pmcb`] to finish the transfer.
#[derive(Debug)]
pub struct Mmu {
    frame_count: Addr,
    phys_mem: PhysicalMemory,
    pmcb: Pmcb,
    tlb: Option<Tlb>,
}

impl Mmu {
    /// MMU without a TLB, in physical mode.
    pub fn new(frame_count: Addr) -> Result<Self> {
        Self::from_config(&MmuConfig::new(frame_count))
    }

    /// MMU with a TLB of `tlb_entries` entries, in physical mode.
    pub fn with_tlb(frame_count: Addr, tlb_entries: usize) -> Result<Self> {
        Self::from_config(&MmuConfig::new(frame_count).with_tlb(tlb_entries))
    }

    pub fn from_config(config: &MmuConfig) -> Result<Self> {
        config.validate()?;
        let tlb = config.tlb_entries.map(Tlb::new).transpose()?;
        debug!(
            "mmu: {} frames ({} bytes), tlb {:?}",
            config.frame_count,
            config.memory_size(),
            config.tlb_entries
        );
        Ok(Self {
            frame_count: config.frame_count,
            phys_mem: PhysicalMemory::new(config.memory_size()),
            pmcb: Pmcb::physical(),
            tlb,
        })
    }

    pub fn frame_count(&self) -> Addr {
        self.frame_count
    }

    /// Total bytes moved to or from physical memory, page-table traffic included.
    pub fn byte_count(&self) -> u64 {
        self.phys_mem.byte_count()
    }

    pub fn is_tlb_enabled(&self) -> bool {
        self.tlb.is_some()
    }

    pub fn flush_tlb(&mut self) {
        if let Some(tlb) = self.tlb.as_mut() {
            tlb.flush();
        }
    }

    pub fn tlb_stats(&self) -> Result<TlbStats> {
        match &self.tlb {
            Some(tlb) => Ok(tlb.stats()),
            None => {
                warn!("mmu: TLB statistics requested but no TLB is configured");
                Err(MmuError::InvalidOperation(
                    "TLB is not enabled, stats not available",
                ))
            }
        }
    }

    /// Copy of the active PMCB.
    pub fn pmcb(&self) -> Pmcb {
        self.pmcb
    }

    /// Load `pmcb` as the active PMCB.
    ///
    /// If it carries a pending transfer (`remaining_count > 0`), the transfer
    /// resumes immediately using `buffer`, and may fault again.
    pub fn set_pmcb(&mut self, pmcb: Pmcb, buffer: TransferBuffer<'_>) -> Result<()> {
        self.pmcb = pmcb;
        if self.pmcb.remaining_count > 0 {
            debug!(
                "mmu: resuming {:?} at 0x{:08x}, {} bytes left",
                self.pmcb.operation_state, self.pmcb.next_vaddress, self.pmcb.remaining_count
            );
            self.execute(buffer)?;
        }
        Ok(())
    }

    /// Translate `vaddress` to a physical address.
    ///
    /// Identity when virtual memory is disabled (the TLB is not consulted).
    /// Otherwise uses the TLB when it holds a usable entry, and walks the
    /// page table, updating accessed/modified bits and the TLB, when it
    /// does not.
    pub fn to_physical(&mut self, vaddress: Addr, write_op: bool) -> Result<Addr> {
        if !self.pmcb.vm_enable {
            return Ok(vaddress);
        }

        let mut entry = PageTableEntry::EMPTY;
        let mut from_tlb = false;
        if let Some(tlb) = self.tlb.as_mut() {
            entry = tlb.lookup(vaddress);
            // A write through an entry not yet marked modified must go to the
            // page table so the modified bit is recorded there.
            from_tlb = entry.is_present() && (!write_op || entry.is_modified());
        }

        let mut entry_address_l2 = None;
        if !from_tlb {
            let (address, walked) = self.walk(vaddress, write_op)?;
            entry = walked;
            entry_address_l2 = Some(address);
        }

        if !entry.is_present() {
            debug!("mmu: page fault at 0x{:08x}", vaddress);
            return Err(MmuError::PageFault { vaddr: vaddress });
        }
        if write_op && !entry.is_writable() {
            debug!("mmu: write permission fault at 0x{:08x}", vaddress);
            return Err(MmuError::WritePermissionFault { vaddr: vaddress });
        }

        if let Some(address) = entry_address_l2 {
            let updated = entry.with_flags(Self::touch_flags(write_op));
            if updated != entry {
                self.phys_mem.write_u32(address, updated.bits())?;
                entry = updated;
            }
            if let Some(tlb) = self.tlb.as_mut() {
                tlb.cache(vaddress, entry);
            }
        }

        Ok(entry.frame() | (vaddress & PAGE_OFFSET_MASK))
    }

    fn touch_flags(write_op: bool) -> PteFlags {
        if write_op {
            PteFlags::ACCESSED | PteFlags::MODIFIED
        } else {
            PteFlags::ACCESSED
        }
    }

    /// Walk the page table for `vaddress`, returning the physical address of
    /// its L2 entry and the entry as currently stored.
    fn walk(&mut self, vaddress: Addr, write_op: bool) -> Result<(Addr, PageTableEntry)> {
        let base = self.pmcb.page_table_base;
        if !is_page_aligned(base) {
            return Err(MmuError::InvalidOperation(
                "PMCB error: page table base must be at page boundary",
            ));
        }

        let va = VirtualAddress(vaddress);
        let l1_address = entry_address(base, va.l1_index());
        let mut l1_entry = PageTableEntry(self.phys_mem.read_u32(l1_address)?);
        if !l1_entry.is_present() {
            debug!("mmu: page fault at 0x{:08x} (no L2 table)", vaddress);
            return Err(MmuError::PageFault { vaddr: vaddress });
        }
        if !l1_entry.is_accessed() {
            l1_entry = l1_entry.with_flags(Self::touch_flags(write_op));
            self.phys_mem.write_u32(l1_address, l1_entry.bits())?;
        }

        let l2_address = entry_address(l1_entry.frame(), va.l2_index());
        let l2_entry = PageTableEntry(self.phys_mem.read_u32(l2_address)?);
        trace!(
            "mmu: walk 0x{:08x}: l1[{}] = {:?}, l2[{}] = {:?}",
            vaddress,
            va.l1_index(),
            l1_entry,
            va.l2_index(),
            l2_entry
        );
        Ok((l2_address, l2_entry))
    }

    fn init_operation(&mut self, op: Operation, vaddress: Addr, count: usize) -> Result<()> {
        let count = Addr::try_from(count)
            .map_err(|_| MmuError::InvalidOperation("transfer larger than address space"))?;
        self.pmcb.operation_state = op;
        self.pmcb.next_vaddress = vaddress;
        self.pmcb.remaining_count = count;
        self.pmcb.user_buffer = 0;
        Ok(())
    }

    /// Run the transfer described by the active PMCB to completion or to the
    /// first fault.
    fn execute(&mut self, mut buffer: TransferBuffer<'_>) -> Result<()> {
        let write_op = match (self.pmcb.operation_state, &buffer) {
            (Operation::None, _) => return Ok(()),
            (Operation::Read, TransferBuffer::Read(_)) => false,
            (Operation::Write, TransferBuffer::Write(_)) => true,
            _ => {
                return Err(MmuError::InvalidOperation(
                    "PMCB error: buffer does not match pending operation",
                ))
            }
        };
        let needed = self
            .pmcb
            .user_buffer
            .checked_add(self.pmcb.remaining_count as usize);
        if needed.map_or(true, |needed| needed > buffer.len()) {
            return Err(MmuError::InvalidOperation(
                "PMCB error: buffer too short for pending transfer",
            ));
        }

        while self.pmcb.remaining_count > 0 {
            let vaddress = self.pmcb.next_vaddress;
            let paddress = self.to_physical(vaddress, write_op)?;

            let count_in_page = self
                .pmcb
                .remaining_count
                .min(PAGE_SIZE - (vaddress & PAGE_OFFSET_MASK));
            let start = self.pmcb.user_buffer;
            let end = start + count_in_page as usize;

            match &mut buffer {
                TransferBuffer::Read(dest) => {
                    self.phys_mem.get_bytes(&mut dest[start..end], paddress)?
                }
                TransferBuffer::Write(src) => self.phys_mem.put_bytes(paddress, &src[start..end])?,
                TransferBuffer::Idle => {
                    return Err(MmuError::InvalidOperation(
                        "PMCB error: buffer does not match pending operation",
                    ))
                }
            }

            // Checkpoint before the next page is translated.
            self.pmcb.next_vaddress = vaddress.wrapping_add(count_in_page);
            self.pmcb.user_buffer = end;
            self.pmcb.remaining_count -= count_in_page;
        }

        self.pmcb.operation_state = Operation::None;
        Ok(())
    }

    pub fn get_byte(&mut self, vaddress: Addr) -> Result<u8> {
        let mut byte = [0u8; 1];
        self.get_bytes(&mut byte, vaddress)?;
        Ok(byte[0])
    }

    /// Read `dest.len()` bytes starting at virtual address `vaddress`.
    pub fn get_bytes(&mut self, dest: &mut [u8], vaddress: Addr) -> Result<()> {
        self.init_operation(Operation::Read, vaddress, dest.len())?;
        self.execute(TransferBuffer::Read(dest))
    }

    pub fn put_byte(&mut self, vaddress: Addr, value: u8) -> Result<()> {
        self.put_bytes(vaddress, &[value])
    }

    /// Write all of `src` starting at virtual address `vaddress`.
    pub fn put_bytes(&mut self, vaddress: Addr, src: &[u8]) -> Result<()> {
        self.init_operation(Operation::Write, vaddress, src.len())?;
        self.execute(TransferBuffer::Write(src))
    }
}
