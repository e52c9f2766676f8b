use log::debug;

use types::{Addr, PAGE_SIZE, is_page_aligned};
use vm::Mmu;

use crate::error::{KernelError, Result};
use crate::mmu::{with_physical_mode, zero_frame};

/// Link value marking the last frame on the free list.
pub const END_OF_LIST: Addr = 0xffff_ffff;

/// Free-list allocator over every physical frame of an [`Mmu`].
///
/// The list is threaded through the free frames themselves: the first four
/// bytes of each free frame hold the address of the next free frame, and the
/// last one holds [`END_OF_LIST`]. Only the head and the counts live here.
#[derive(Debug, Clone)]
pub struct FrameAllocator {
    head: Addr,
    free_frames: Addr,
    total_frames: Addr,
}

impl FrameAllocator {
    /// Put every frame of `mmu` on the free list, lowest address first.
    pub fn new(mmu: &mut Mmu) -> Result<Self> {
        let total_frames = mmu.frame_count();
        with_physical_mode(mmu, |mmu| {
            for frame in 0..total_frames {
                let next = if frame + 1 < total_frames {
                    (frame + 1) * PAGE_SIZE
                } else {
                    END_OF_LIST
                };
                mmu.put_bytes(frame * PAGE_SIZE, &next.to_le_bytes())?;
            }
            Ok(())
        })?;
        debug!("frames: {} frames on the free list", total_frames);
        Ok(Self {
            head: if total_frames > 0 { 0 } else { END_OF_LIST },
            free_frames: total_frames,
            total_frames,
        })
    }

    pub fn free_frames(&self) -> Addr {
        self.free_frames
    }

    pub fn total_frames(&self) -> Addr {
        self.total_frames
    }

    /// Take `count` frames off the free list and zero them.
    ///
    /// Fails without taking anything when fewer than `count` frames are free.
    pub fn allocate(&mut self, mmu: &mut Mmu, count: Addr) -> Result<Vec<Addr>> {
        if count > self.free_frames {
            return Err(KernelError::OutOfFrames {
                requested: count,
                available: self.free_frames,
            });
        }
        let frames = with_physical_mode(mmu, |mmu| {
            let mut frames = Vec::with_capacity(count as usize);
            for _ in 0..count {
                let frame = self.head;
                let mut link = [0u8; 4];
                mmu.get_bytes(&mut link, frame)?;
                self.head = Addr::from_le_bytes(link);
                self.free_frames -= 1;
                zero_frame(mmu, frame)?;
                frames.push(frame);
            }
            Ok(frames)
        })?;
        debug!(
            "frames: allocated {} ({} free)",
            frames.len(),
            self.free_frames
        );
        Ok(frames)
    }

    /// Allocate and zero a single frame.
    pub fn allocate_frame(&mut self, mmu: &mut Mmu) -> Result<Addr> {
        let frames = self.allocate(mmu, 1)?;
        frames.first().copied().ok_or(KernelError::OutOfFrames {
            requested: 1,
            available: self.free_frames,
        })
    }

    /// Return `frames` to the free list.
    ///
    /// The last frame is pushed first, so `frames[0]` becomes the new head.
    /// Every address is checked before any frame is linked back in.
    pub fn deallocate(&mut self, mmu: &mut Mmu, frames: &[Addr]) -> Result<()> {
        if let Some(&frame) = frames
            .iter()
            .find(|&&frame| !is_page_aligned(frame) || frame / PAGE_SIZE >= self.total_frames)
        {
            return Err(KernelError::InvalidFrame { frame });
        }
        with_physical_mode(mmu, |mmu| {
            for &frame in frames.iter().rev() {
                mmu.put_bytes(frame, &self.head.to_le_bytes())?;
                self.head = frame;
                self.free_frames += 1;
            }
            Ok(())
        })?;
        debug!(
            "frames: released {} ({} free)",
            frames.len(),
            self.free_frames
        );
        Ok(())
    }

    /// Walk the free list from its head.
    pub fn free_list(&self, mmu: &mut Mmu) -> Result<Vec<Addr>> {
        with_physical_mode(mmu, |mmu| {
            let mut list = Vec::with_capacity(self.free_frames as usize);
            let mut frame = self.head;
            while list.len() < self.free_frames as usize && frame != END_OF_LIST {
                list.push(frame);
                let mut link = [0u8; 4];
                mmu.get_bytes(&mut link, frame)?;
                frame = Addr::from_le_bytes(link);
            }
            Ok(list)
        })
    }
}
