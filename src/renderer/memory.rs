//! In-memory display
//!
//! Keeps a back buffer that callers write through [`Display::lock_surface`]
//! and a front buffer that only changes on [`Display::unlock_and_present`].
//! Used for headless playback and in tests.

use crate::decoder::PixelFormat;
use crate::renderer::{aligned_stride, planar_buffer_size, Display};
use crate::utils::error::{PlayerError, Result};
use log::debug;

pub struct MemoryDisplay {
    /// Luma rows are padded to a multiple of this
    row_alignment: usize,

    surface: Option<Surface>,
    surfaces_created: u32,
    presented_frames: u64,

    /// `pump_events` reports quit once this many calls have been made
    quit_after: Option<u64>,
    pumps: u64,
}

struct Surface {
    width: u32,
    height: u32,
    format: PixelFormat,
    stride: usize,
    back: Vec<u8>,
    front: Vec<u8>,
    locked: bool,
}

impl MemoryDisplay {
    pub fn new() -> Self {
        Self::with_row_alignment(1)
    }

    pub fn with_row_alignment(row_alignment: usize) -> Self {
        Self {
            row_alignment: row_alignment.max(1),
            surface: None,
            surfaces_created: 0,
            presented_frames: 0,
            quit_after: None,
            pumps: 0,
        }
    }

    /// Report a quit request from the `pumps`-th event pump on
    pub fn quit_after(mut self, pumps: u64) -> Self {
        self.quit_after = Some(pumps);
        self
    }

    pub fn surface_size(&self) -> Option<(u32, u32)> {
        self.surface.as_ref().map(|s| (s.width, s.height))
    }

    pub fn surface_format(&self) -> Option<PixelFormat> {
        self.surface.as_ref().map(|s| s.format)
    }

    pub fn stride(&self) -> Option<usize> {
        self.surface.as_ref().map(|s| s.stride)
    }

    pub fn surfaces_created(&self) -> u32 {
        self.surfaces_created
    }

    pub fn presented_frames(&self) -> u64 {
        self.presented_frames
    }

    /// Contents as of the last present
    pub fn front_buffer(&self) -> Option<&[u8]> {
        self.surface.as_ref().map(|s| s.front.as_slice())
    }
}

impl Default for MemoryDisplay {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for MemoryDisplay {
    fn create_streaming_surface(&mut self, width: u32, height: u32, format: PixelFormat) -> Result<()> {
        if width == 0 || height == 0 {
            return Err(PlayerError::Init(format!(
                "Cannot create a {}x{} surface",
                width, height
            )));
        }

        let stride = aligned_stride(width, self.row_alignment);
        let size = planar_buffer_size(stride, height);
        self.surface = Some(Surface {
            width,
            height,
            format,
            stride,
            back: vec![0; size],
            front: vec![0; size],
            locked: false,
        });
        self.surfaces_created += 1;
        debug!("Memory surface {}x{} stride {}", width, height, stride);
        Ok(())
    }

    fn lock_surface(&mut self) -> Result<(&mut [u8], usize)> {
        let surface = self
            .surface
            .as_mut()
            .ok_or_else(|| PlayerError::Display("No surface to lock".to_string()))?;
        if surface.locked {
            return Err(PlayerError::Display("Surface is already locked".to_string()));
        }
        surface.locked = true;
        Ok((surface.back.as_mut_slice(), surface.stride))
    }

    fn unlock_and_present(&mut self) -> Result<()> {
        let surface = self
            .surface
            .as_mut()
            .ok_or_else(|| PlayerError::Display("No surface to present".to_string()))?;
        if !surface.locked {
            return Err(PlayerError::Display("Surface was not locked".to_string()));
        }
        surface.locked = false;
        surface.front.copy_from_slice(&surface.back);
        self.presented_frames += 1;
        Ok(())
    }

    fn pump_events(&mut self) -> bool {
        self.pumps += 1;
        self.quit_after.is_some_and(|limit| self.pumps >= limit)
    }
}
