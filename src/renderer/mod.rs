//! Renderer module for syncplay
//!
//! This module defines the display contract the playback driver presents
//! frames through, plus two implementations: a wgpu surface in a winit
//! window and an in-memory surface for headless runs.

use crate::decoder::PixelFormat;
use crate::utils::error::Result;

pub mod memory;
pub mod pipeline;
pub mod presenter;
pub mod texture;
pub mod wgpu_display;

pub use memory::MemoryDisplay;
pub use presenter::FramePresenter;
pub use wgpu_display::WgpuDisplay;

/// Display trait defining a streaming planar surface
///
/// Frames are written by locking the surface, filling its buffer, then
/// unlocking; nothing written becomes visible before the unlock.
pub trait Display {
    /// (Re)create the streaming surface
    ///
    /// # Arguments
    ///
    /// * `width` - Luma width in pixels
    /// * `height` - Luma height in pixels
    /// * `format` - Plane order the buffer is written in
    fn create_streaming_surface(&mut self, width: u32, height: u32, format: PixelFormat) -> Result<()>;

    /// Lock the surface for writing
    ///
    /// # Returns
    ///
    /// The buffer and its luma row stride in bytes. Chroma rows use half
    /// the stride.
    fn lock_surface(&mut self) -> Result<(&mut [u8], usize)>;

    /// Unlock the surface and show what was written
    fn unlock_and_present(&mut self) -> Result<()>;

    /// Process pending window events
    ///
    /// # Returns
    ///
    /// True once the user asked to quit
    fn pump_events(&mut self) -> bool;
}

/// Luma stride for a surface of `width` pixels, rounded to `alignment`
pub fn aligned_stride(width: u32, alignment: usize) -> usize {
    let width = width as usize;
    if alignment <= 1 {
        return width;
    }
    width.div_ceil(alignment) * alignment
}

/// Bytes a planar 4:2:0 buffer needs for `height` rows at `stride`
pub fn planar_buffer_size(stride: usize, height: u32) -> usize {
    let height = height as usize;
    stride * height + 2 * (stride / 2) * (height / 2)
}
