use tracing::{debug, info};
use whack_domain::config::xsk::MIN_FRAME_SIZE;
use whack_domain::XskError;

use super::sys::Mmap;

/// Contiguous page-aligned region split into `num_frames` equal frames.
///
/// Frame `i` starts at byte `i * frame_size`. The arena does not track who
/// owns a frame; [`super::XskSocket`] does that through frame handles.
#[derive(Debug)]
pub struct FrameArena {
    region: Mmap,
    num_frames: u32,
    frame_size: u32,
}

impl FrameArena {
    pub fn allocate(num_frames: u32, frame_size: u32) -> Result<Self, XskError> {
        if num_frames == 0 {
            return Err(XskError::ArenaAllocation("num_frames must be > 0".into()));
        }
        if !frame_size.is_power_of_two() || frame_size < MIN_FRAME_SIZE {
            return Err(XskError::ArenaAllocation(format!(
                "frame_size {} must be a power of two >= {}",
                frame_size, MIN_FRAME_SIZE
            )));
        }
        let len = (num_frames as usize)
            .checked_mul(frame_size as usize)
            .ok_or_else(|| XskError::ArenaAllocation("arena size overflows".into()))?;

        let region = Mmap::anonymous(len)
            .map_err(|e| XskError::ArenaAllocation(format!("mmap {} bytes: {}", len, e)))?;

        if region.huge_pages() {
            info!(bytes = len, num_frames, frame_size, "Frame arena allocated on huge pages");
        } else {
            debug!(bytes = len, num_frames, frame_size, "Frame arena allocated on regular pages");
        }

        Ok(Self {
            region,
            num_frames,
            frame_size,
        })
    }

    pub fn num_frames(&self) -> u32 {
        self.num_frames
    }

    pub fn frame_size(&self) -> u32 {
        self.frame_size
    }

    pub fn len(&self) -> usize {
        self.region.len()
    }

    pub fn is_empty(&self) -> bool {
        self.region.len() == 0
    }

    pub fn huge_pages(&self) -> bool {
        self.region.huge_pages()
    }

    pub(crate) fn base_ptr(&self) -> *mut u8 {
        self.region.as_ptr()
    }

    /// Offset of frame `index` within the arena, i.e. its UMEM address.
    pub fn frame_addr(&self, index: u32) -> u64 {
        index as u64 * self.frame_size as u64
    }

    /// Splits a UMEM address into `(frame index, offset within frame)`.
    pub fn locate(&self, addr: u64) -> Option<(u32, usize)> {
        let index = addr / self.frame_size as u64;
        if index >= self.num_frames as u64 {
            return None;
        }
        Some((index as u32, (addr % self.frame_size as u64) as usize))
    }

    /// Bytes of frame `index`. The caller must own the frame.
    pub fn frame(&self, index: u32) -> Result<&[u8], XskError> {
        let start = self.checked_start(index)?;
        Ok(unsafe {
            std::slice::from_raw_parts(self.region.as_ptr().add(start), self.frame_size as usize)
        })
    }

    /// Mutable bytes of frame `index`. The caller must own the frame.
    pub fn frame_mut(&mut self, index: u32) -> Result<&mut [u8], XskError> {
        let start = self.checked_start(index)?;
        Ok(unsafe {
            std::slice::from_raw_parts_mut(
                self.region.as_ptr().add(start),
                self.frame_size as usize,
            )
        })
    }

    fn checked_start(&self, index: u32) -> Result<usize, XskError> {
        if index >= self.num_frames {
            return Err(XskError::FrameOutOfBounds {
                offset: index as usize * self.frame_size as usize,
                len: self.frame_size as usize,
                frame_size: self.frame_size as usize,
            });
        }
        Ok(index as usize * self.frame_size as usize)
    }

    /// Returns the region to the OS.
    pub fn release(self) {
        debug!(bytes = self.len(), "Frame arena released");
    }
}
