//! Translation lookaside buffer.
//!
//! Caches recent L2 page-table entries keyed by the page-aligned virtual
//! address. Replacement is least-recently-used, driven by a private request
//! sequence number that is independent of the physical-memory byte counter.
//! The TLB must be flushed whenever the active page table changes.

use std::collections::BTreeMap;

use log::trace;

use crate::error::{MmuError, Result};
use types::{align_down, Addr, PageTableEntry};

/// Hit/miss/size counters. `recent_*` restart at every flush, `total_*` never do.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TlbStats {
    pub recent_hits: u64,
    pub recent_misses: u64,
    pub recent_max_size: u64,
    pub total_hits: u64,
    pub total_misses: u64,
    pub total_max_size: u64,
}

#[derive(Clone, Copy, Debug)]
struct TlbEntry {
    /// Sequence number of the last lookup or insert that touched this entry.
    last_ref_seq: u64,
    pt_entry: PageTableEntry,
}

#[derive(Debug)]
pub struct Tlb {
    capacity: usize,
    req_seq: u64,
    entries: BTreeMap<Addr, TlbEntry>,
    stats: TlbStats,
}

impl Tlb {
    /// Create a TLB holding at most `capacity` entries (must be > 0).
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(MmuError::InvalidOperation("TLB size specified as 0"));
        }
        Ok(Self {
            capacity,
            req_seq: 0,
            entries: BTreeMap::new(),
            stats: TlbStats::default(),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> TlbStats {
        self.stats
    }

    fn next_seq(&mut self) -> u64 {
        self.req_seq += 1;
        self.req_seq
    }

    /// Cached L2 entry for the page containing `vaddr`, or `PageTableEntry::EMPTY`
    /// when the page is not cached.
    pub fn lookup(&mut self, vaddr: Addr) -> PageTableEntry {
        let page = align_down(vaddr);
        match self.entries.get_mut(&page) {
            Some(entry) => {
                self.req_seq += 1;
                entry.last_ref_seq = self.req_seq;
                self.stats.recent_hits += 1;
                self.stats.total_hits += 1;
                trace!("tlb: hit page 0x{:08x} -> {:?}", page, entry.pt_entry);
                entry.pt_entry
            }
            None => {
                self.stats.recent_misses += 1;
                self.stats.total_misses += 1;
                trace!("tlb: miss page 0x{:08x}", page);
                PageTableEntry::EMPTY
            }
        }
    }

    /// Store the L2 entry for the page containing `vaddr`, evicting the least
    /// recently used entry if the TLB is full.
    pub fn cache(&mut self, vaddr: Addr, pt_entry: PageTableEntry) {
        let page = align_down(vaddr);
        let seq = self.next_seq();

        if let Some(entry) = self.entries.get_mut(&page) {
            entry.last_ref_seq = seq;
            entry.pt_entry = pt_entry;
            return;
        }

        if self.entries.len() >= self.capacity {
            self.remove_lru_entry();
        }
        self.entries.insert(
            page,
            TlbEntry {
                last_ref_seq: seq,
                pt_entry,
            },
        );

        let size = self.entries.len() as u64;
        if size > self.stats.recent_max_size {
            self.stats.recent_max_size = size;
        }
        if self.stats.recent_max_size > self.stats.total_max_size {
            self.stats.total_max_size = self.stats.recent_max_size;
        }
    }

    /// Drop every entry and restart the recent statistics.
    pub fn flush(&mut self) {
        self.stats.recent_hits = 0;
        self.stats.recent_misses = 0;
        self.stats.recent_max_size = 0;
        self.entries.clear();
        trace!("tlb: flushed");
    }

    fn remove_lru_entry(&mut self) {
        // Linear scan; TLBs are small. Strict `<` keeps the first of any tie.
        let mut victim: Option<(Addr, u64)> = None;
        for (&page, entry) in &self.entries {
            match victim {
                Some((_, seq)) if entry.last_ref_seq >= seq => {}
                _ => victim = Some((page, entry.last_ref_seq)),
            }
        }
        if let Some((page, seq)) = victim {
            self.entries.remove(&page);
            trace!("tlb: evicted page 0x{:08x} (last ref {})", page, seq);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_ignores_offset_bits() {
        let mut tlb = Tlb::new(2).unwrap();
        tlb.cache(0x5000, PageTableEntry(0x0001_e003));
        assert_eq!(tlb.lookup(0x5abc), PageTableEntry(0x0001_e003));
        assert_eq!(tlb.lookup(0x5fff), PageTableEntry(0x0001_e003));
        assert_eq!(tlb.lookup(0x6000), PageTableEntry::EMPTY);
    }

    #[test]
    fn refresh_does_not_grow() {
        let mut tlb = Tlb::new(2).unwrap();
        tlb.cache(0x1000, PageTableEntry(0x0000_a001));
        tlb.cache(0x1000, PageTableEntry(0x0000_b001));
        assert_eq!(tlb.len(), 1);
        assert_eq!(tlb.stats().recent_max_size, 1);
        assert_eq!(tlb.lookup(0x1000), PageTableEntry(0x0000_b001));
    }
}
