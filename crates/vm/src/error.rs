use thiserror::Error;

use types::Addr;

/// Faults and failures raised by the memory subsystem.
///
/// Every variant reaches the caller unchanged; nothing below the MMU retries
/// or swallows an error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MmuError {
    /// Present bit clear in the L1 or L2 entry for `vaddr`.
    #[error("page fault at virtual address 0x{vaddr:08x}")]
    PageFault { vaddr: Addr },
    /// Write to a present page whose L2 entry is not writable.
    #[error("write permission fault at virtual address 0x{vaddr:08x}")]
    WritePermissionFault { vaddr: Addr },
    /// Byte range runs past the end of physical memory or wraps the address space.
    #[error("physical memory bounds violation, block starting at 0x{address:x}")]
    PhysicalMemoryBounds { address: Addr },
    #[error("invalid MMU operation: {0}")]
    InvalidOperation(&'static str),
}

impl MmuError {
    /// True for the faults a caller can remedy and then resume from.
    pub fn is_translation_fault(&self) -> bool {
        matches!(
            self,
            MmuError::PageFault { .. } | MmuError::WritePermissionFault { .. }
        )
    }
}

pub type Result<T> = core::result::Result<T, MmuError>;
