//! Kernel-side memory management on top of the [`vm`] MMU: a free-list frame
//! allocator and per-process address spaces.

pub mod address_space;
pub mod error;
pub mod frame_allocator;
pub mod mmu;

pub use address_space::AddressSpace;
pub use error::{KernelError, Result};
pub use frame_allocator::{END_OF_LIST, FrameAllocator};
