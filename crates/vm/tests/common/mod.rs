#![allow(dead_code)]

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use types::{entry_address, PAGE_TABLE_ENTRIES};
use vm::{Addr, Mmu, PageTableEntry, Pmcb, PteFlags, TransferBuffer, VirtualAddress, PAGE_SIZE};

pub const SEED: u64 = 0x5eed_0f_7ab1e;

pub fn rng() -> StdRng {
    StdRng::seed_from_u64(SEED)
}

pub fn random_bytes(rng: &mut StdRng, len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    rng.fill(buf.as_mut_slice());
    buf
}

pub fn present_writable(frame: Addr) -> PageTableEntry {
    PageTableEntry::new(frame, PteFlags::PRESENT | PteFlags::WRITABLE)
}

/// Write a whole page table at `base` (physical mode only) holding `entries`
/// and zero everywhere else.
pub fn write_table(mmu: &mut Mmu, base: Addr, entries: &[(Addr, PageTableEntry)]) {
    let mut table = vec![0u8; PAGE_SIZE as usize];
    for &(index, entry) in entries {
        assert!(index < PAGE_TABLE_ENTRIES);
        let at = (index * 4) as usize;
        table[at..at + 4].copy_from_slice(&entry.to_le_bytes());
    }
    mmu.put_bytes(base, &table).unwrap();
}

pub fn read_entry(mmu: &mut Mmu, table: Addr, index: Addr) -> PageTableEntry {
    let mut raw = [0u8; 4];
    mmu.get_bytes(&mut raw, entry_address(table, index)).unwrap();
    PageTableEntry::from_le_bytes(raw)
}

pub fn write_entry(mmu: &mut Mmu, table: Addr, index: Addr, entry: PageTableEntry) {
    mmu.put_bytes(entry_address(table, index), &entry.to_le_bytes())
        .unwrap();
}

/// Run `f` with translation disabled, then reload `pmcb` (idle) and flush.
pub fn in_physical_mode<T>(mmu: &mut Mmu, f: impl FnOnce(&mut Mmu) -> T) -> T {
    let saved = mmu.pmcb();
    mmu.set_pmcb(Pmcb::physical(), TransferBuffer::Idle).unwrap();
    let out = f(mmu);
    mmu.set_pmcb(saved.idle(), TransferBuffer::Idle).unwrap();
    mmu.flush_tlb();
    out
}

pub fn l1_index(vaddr: Addr) -> Addr {
    VirtualAddress(vaddr).l1_index()
}

pub fn l2_index(vaddr: Addr) -> Addr {
    VirtualAddress(vaddr).l2_index()
}
