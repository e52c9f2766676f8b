use thiserror::Error;

use types::Addr;
use vm::MmuError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KernelError {
    #[error(transparent)]
    Mmu(#[from] MmuError),
    #[error("out of frames: {requested} requested, {available} available")]
    OutOfFrames { requested: Addr, available: Addr },
    #[error("invalid frame address 0x{frame:08x}")]
    InvalidFrame { frame: Addr },
    /// Range start or length is not a page multiple, or the range wraps.
    #[error("range 0x{vaddr:08x}+0x{size:x} is not page aligned")]
    Misaligned { vaddr: Addr, size: Addr },
    #[error("page at 0x{vaddr:08x} is already mapped")]
    AlreadyMapped { vaddr: Addr },
    #[error("page quota exceeded: {mapped} of {quota} pages mapped, {requested} more requested")]
    QuotaExceeded {
        requested: Addr,
        mapped: Addr,
        quota: Addr,
    },
}

pub type Result<T> = core::result::Result<T, KernelError>;
