use std::collections::VecDeque;

use proptest::prelude::*;
use vm::{Mmu, MmuError, PageTableEntry, PhysicalMemory, Tlb, PAGE_SIZE};

const MEM_SIZE: u32 = 4 * PAGE_SIZE;

fn block() -> impl Strategy<Value = (u32, Vec<u8>)> {
    (0u32..MEM_SIZE).prop_flat_map(|addr| {
        let max_len = (MEM_SIZE - addr).min(2 * PAGE_SIZE) as usize;
        (Just(addr), proptest::collection::vec(any::<u8>(), 1..=max_len))
    })
}

#[derive(Clone, Debug)]
enum TlbOp {
    Lookup(u32),
    Cache(u32, u32),
}

fn tlb_op() -> impl Strategy<Value = TlbOp> {
    prop_oneof![
        (0u32..12).prop_map(TlbOp::Lookup),
        (0u32..12, 1u32..0x100).prop_map(|(page, frame)| TlbOp::Cache(page, frame)),
    ]
}

proptest! {
    #[test]
    fn physical_round_trip((addr, data) in block()) {
        let mut mmu = Mmu::new(MEM_SIZE / PAGE_SIZE).unwrap();
        mmu.put_bytes(addr, &data).unwrap();
        let mut back = vec![0u8; data.len()];
        mmu.get_bytes(&mut back, addr).unwrap();
        prop_assert_eq!(back, data.clone());
        prop_assert_eq!(mmu.byte_count(), 2 * data.len() as u64);
    }

    #[test]
    fn out_of_bounds_blocks_are_atomic(addr in any::<u32>(), len in 1usize..64) {
        prop_assume!(addr as u64 + len as u64 > MEM_SIZE as u64);
        let mut mem = PhysicalMemory::new(MEM_SIZE as usize);
        let data = vec![0xa5u8; len];
        prop_assert_eq!(
            mem.put_bytes(addr, &data),
            Err(MmuError::PhysicalMemoryBounds { address: addr })
        );
        let mut buf = vec![0u8; len];
        prop_assert!(mem.get_bytes(&mut buf, addr).is_err());
        prop_assert_eq!(mem.byte_count(), 0);

        let mut all = vec![0xffu8; MEM_SIZE as usize];
        mem.get_bytes(&mut all, 0).unwrap();
        prop_assert!(all.iter().all(|&b| b == 0));
    }

    /// The TLB evicts exactly what a recency-ordered list would.
    #[test]
    fn tlb_matches_lru_model(capacity in 1usize..6, ops in proptest::collection::vec(tlb_op(), 1..200)) {
        let mut tlb = Tlb::new(capacity).unwrap();
        // Least recent at the front.
        let mut model: VecDeque<(u32, PageTableEntry)> = VecDeque::new();
        let (mut hits, mut misses) = (0u64, 0u64);

        for op in ops {
            match op {
                TlbOp::Lookup(page) => {
                    let vaddr = page * PAGE_SIZE + 0x10;
                    let expected = match model.iter().position(|&(p, _)| p == page) {
                        Some(at) => {
                            hits += 1;
                            let hit = model.remove(at).unwrap();
                            model.push_back(hit);
                            hit.1
                        }
                        None => {
                            misses += 1;
                            PageTableEntry::EMPTY
                        }
                    };
                    prop_assert_eq!(tlb.lookup(vaddr), expected);
                }
                TlbOp::Cache(page, frame) => {
                    let entry = PageTableEntry((frame << 12) | 1);
                    tlb.cache(page * PAGE_SIZE, entry);
                    if let Some(at) = model.iter().position(|&(p, _)| p == page) {
                        model.remove(at);
                    } else if model.len() == capacity {
                        model.pop_front();
                    }
                    model.push_back((page, entry));
                }
            }
            prop_assert_eq!(tlb.len(), model.len());
        }

        let stats = tlb.stats();
        prop_assert_eq!(stats.total_hits, hits);
        prop_assert_eq!(stats.total_misses, misses);
        prop_assert!(stats.total_max_size <= capacity as u64);
    }
}
