use crate::error::{MmuError, Result};
use types::{Addr, PAGE_SHIFT};

/// Construction parameters for an [`Mmu`](crate::Mmu).
///
/// The TLB is chosen here and cannot be added or removed later.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MmuConfig {
    /// Number of 4 KiB frames of physical memory.
    pub frame_count: Addr,
    /// TLB capacity in entries, or `None` to run without a TLB.
    pub tlb_entries: Option<usize>,
}

impl MmuConfig {
    pub const DEFAULT_FRAME_COUNT: Addr = 256;
    pub const DEFAULT_TLB_ENTRIES: usize = 16;
    /// Largest frame count whose byte addresses all fit in an `Addr`.
    pub const MAX_FRAME_COUNT: Addr = 1 << (32 - PAGE_SHIFT);

    pub const fn new(frame_count: Addr) -> Self {
        Self {
            frame_count,
            tlb_entries: None,
        }
    }

    pub const fn with_frames(mut self, frame_count: Addr) -> Self {
        self.frame_count = frame_count;
        self
    }

    pub const fn with_tlb(mut self, entries: usize) -> Self {
        self.tlb_entries = Some(entries);
        self
    }

    pub const fn without_tlb(mut self) -> Self {
        self.tlb_entries = None;
        self
    }

    /// Size of physical memory in bytes.
    pub fn memory_size(&self) -> usize {
        (self.frame_count as usize) << PAGE_SHIFT
    }

    pub fn validate(&self) -> Result<()> {
        if self.frame_count > Self::MAX_FRAME_COUNT {
            return Err(MmuError::InvalidOperation(
                "frame count exceeds 32-bit physical address space",
            ));
        }
        if self.tlb_entries == Some(0) {
            return Err(MmuError::InvalidOperation("TLB size specified as 0"));
        }
        Ok(())
    }
}

impl Default for MmuConfig {
    fn default() -> Self {
        Self::new(Self::DEFAULT_FRAME_COUNT).with_tlb(Self::DEFAULT_TLB_ENTRIES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_has_tlb() {
        let config = MmuConfig::default();
        assert_eq!(config.frame_count, 256);
        assert_eq!(config.tlb_entries, Some(16));
        assert_eq!(config.memory_size(), 256 * 4096);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_zero_tlb_and_oversized_memory() {
        assert_eq!(
            MmuConfig::new(4).with_tlb(0).validate(),
            Err(MmuError::InvalidOperation("TLB size specified as 0"))
        );
        assert!(MmuConfig::new(MmuConfig::MAX_FRAME_COUNT).validate().is_ok());
        assert!(MmuConfig::new(MmuConfig::MAX_FRAME_COUNT + 1).validate().is_err());
    }
}
