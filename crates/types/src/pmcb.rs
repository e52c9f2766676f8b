//! Processor Memory Control Block.
//!
//! The PMCB is the register file of the MMU: translation mode, the page-table
//! base, and the state of a transfer that was interrupted by a fault. It is a
//! plain `Copy` value, so saving one is the same as checkpointing the transfer
//! it describes. Loading it back into the MMU resumes that transfer.

use crate::address::Addr;

/// State of the in-flight transfer described by a [`Pmcb`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Operation {
    /// No transfer pending; the transfer fields are meaningless.
    #[default]
    None,
    /// Memory is copied into the caller's buffer.
    Read,
    /// The caller's buffer is copied into memory.
    Write,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Pmcb {
    /// Virtual memory enable. When false, virtual == physical.
    pub vm_enable: bool,
    /// Physical address of the L1 table. Must start a frame when `vm_enable` is set.
    pub page_table_base: Addr,
    pub operation_state: Operation,
    /// Virtual address of the first byte not yet transferred.
    pub next_vaddress: Addr,
    /// Number of bytes left to transfer.
    pub remaining_count: Addr,
    /// Offset into the caller's buffer matching `next_vaddress`.
    pub user_buffer: usize,
}

impl Pmcb {
    /// Physical (untranslated) mode with no pending transfer.
    pub const fn physical() -> Self {
        Pmcb {
            vm_enable: false,
            page_table_base: 0,
            operation_state: Operation::None,
            next_vaddress: 0,
            remaining_count: 0,
            user_buffer: 0,
        }
    }

    /// Virtual mode using the L1 table at `page_table_base`.
    pub const fn new(vm_enable: bool, page_table_base: Addr) -> Self {
        Pmcb {
            vm_enable,
            page_table_base,
            ..Pmcb::physical()
        }
    }

    pub const fn virtual_mode(page_table_base: Addr) -> Self {
        Pmcb::new(true, page_table_base)
    }

    /// True when loading this PMCB would resume a transfer.
    pub const fn is_pending(&self) -> bool {
        self.remaining_count > 0 && !matches!(self.operation_state, Operation::None)
    }

    /// Same translation state with any pending transfer abandoned.
    pub const fn idle(self) -> Self {
        Pmcb {
            operation_state: Operation::None,
            next_vaddress: 0,
            remaining_count: 0,
            user_buffer: 0,
            ..self
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_physical_and_idle() {
        let pmcb = Pmcb::default();
        assert_eq!(pmcb, Pmcb::physical());
        assert!(!pmcb.vm_enable);
        assert!(!pmcb.is_pending());
    }

    #[test]
    fn idle_keeps_translation_state() {
        let pmcb = Pmcb {
            operation_state: Operation::Write,
            next_vaddress: 0x2000,
            remaining_count: 12,
            user_buffer: 4,
            ..Pmcb::virtual_mode(0x13000)
        };
        assert!(pmcb.is_pending());
        let idle = pmcb.idle();
        assert!(!idle.is_pending());
        assert!(idle.vm_enable);
        assert_eq!(idle.page_table_base, 0x13000);
    }

    #[test]
    fn abandoned_transfer_is_not_pending() {
        let pmcb = Pmcb {
            operation_state: Operation::None,
            remaining_count: 100,
            ..Pmcb::physical()
        };
        assert!(!pmcb.is_pending());
    }
}
