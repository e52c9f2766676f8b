use crate::error::{MmuError, Result};
use types::Addr;

/// Flat, fixed-size physical memory.
///
/// Every access is bounds-checked before a single byte moves, so a rejected
/// request leaves both the contents and the transfer counter untouched.
/// `byte_count` grows by the length of each successful access (including the
/// page-table words the MMU reads and writes) and is only an audit metric.
#[derive(Debug)]
pub struct PhysicalMemory {
    mem: Vec<u8>,
    byte_count: u64,
}

impl PhysicalMemory {
    pub fn new(memory_size: usize) -> Self {
        Self {
            mem: vec![0u8; memory_size],
            byte_count: 0,
        }
    }

    pub fn size(&self) -> usize {
        self.mem.len()
    }

    /// Total bytes transferred to or from memory so far.
    pub fn byte_count(&self) -> u64 {
        self.byte_count
    }

    /// Check that `count` bytes starting at `address` lie inside memory.
    ///
    /// Zero-length blocks and blocks that wrap past `0xffff_ffff` are rejected.
    pub fn validate_range(&self, address: Addr, count: Addr) -> Result<()> {
        let end = address.wrapping_add(count);
        if end as usize > self.mem.len() || end <= address {
            return Err(MmuError::PhysicalMemoryBounds { address });
        }
        Ok(())
    }

    fn checked_range(&self, address: Addr, len: usize) -> Result<core::ops::Range<usize>> {
        let count = Addr::try_from(len).map_err(|_| MmuError::PhysicalMemoryBounds { address })?;
        self.validate_range(address, count)?;
        let start = address as usize;
        Ok(start..start + len)
    }

    pub fn get_byte(&mut self, address: Addr) -> Result<u8> {
        self.validate_range(address, 1)?;
        self.byte_count += 1;
        Ok(self.mem[address as usize])
    }

    /// Copy `dest.len()` bytes starting at `address` into `dest`.
    pub fn get_bytes(&mut self, dest: &mut [u8], address: Addr) -> Result<()> {
        let range = self.checked_range(address, dest.len())?;
        self.byte_count += dest.len() as u64;
        dest.copy_from_slice(&self.mem[range]);
        Ok(())
    }

    pub fn put_byte(&mut self, address: Addr, value: u8) -> Result<()> {
        self.validate_range(address, 1)?;
        self.byte_count += 1;
        self.mem[address as usize] = value;
        Ok(())
    }

    /// Copy all of `src` into memory starting at `address`.
    pub fn put_bytes(&mut self, address: Addr, src: &[u8]) -> Result<()> {
        let range = self.checked_range(address, src.len())?;
        self.byte_count += src.len() as u64;
        self.mem[range].copy_from_slice(src);
        Ok(())
    }

    /// Read a little-endian 32-bit word (used for page-table entries).
    pub fn read_u32(&mut self, address: Addr) -> Result<u32> {
        let mut word = [0u8; 4];
        self.get_bytes(&mut word, address)?;
        Ok(u32::from_le_bytes(word))
    }

    /// Write a little-endian 32-bit word.
    pub fn write_u32(&mut self, address: Addr, value: u32) -> Result<()> {
        self.put_bytes(address, &value.to_le_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn words_are_little_endian() {
        let mut mem = PhysicalMemory::new(16);
        mem.write_u32(4, 0x1234_5678).unwrap();
        let mut raw = [0u8; 4];
        mem.get_bytes(&mut raw, 4).unwrap();
        assert_eq!(raw, [0x78, 0x56, 0x34, 0x12]);
        assert_eq!(mem.read_u32(4).unwrap(), 0x1234_5678);
        assert_eq!(mem.byte_count(), 12);
    }

    #[test]
    fn zero_length_block_is_rejected() {
        let mem = PhysicalMemory::new(16);
        assert_eq!(
            mem.validate_range(3, 0),
            Err(MmuError::PhysicalMemoryBounds { address: 3 })
        );
    }
}
