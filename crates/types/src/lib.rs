#![no_std]

pub mod address;
pub use address::{Addr, VirtualAddress};

pub mod mmu;
pub use mmu::*;

pub mod pmcb;
pub use pmcb::{Operation, Pmcb};
