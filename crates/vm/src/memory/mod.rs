//! Physical memory backing the MMU.

mod physical;

pub use physical::PhysicalMemory;
