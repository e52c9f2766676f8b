pub mod config;
pub mod error;
pub mod memory;
pub mod mmu;
pub mod tlb;

pub use config::MmuConfig;
pub use error::{MmuError, Result};
pub use memory::PhysicalMemory;
pub use mmu::{Mmu, TransferBuffer};
pub use tlb::{Tlb, TlbStats};

pub use types::{Addr, Operation, PageTableEntry, Pmcb, PteFlags, VirtualAddress, PAGE_SIZE};
