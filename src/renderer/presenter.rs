//! Planar frame copy into a locked display surface

use crate::decoder::{PixelFormat, VideoUnit};
use crate::renderer::Display;
use crate::utils::error::{PlayerError, Result};
use log::info;

/// Copies decoded frames onto a [`Display`], recreating the surface when
/// the frame size changes
#[derive(Debug, Default)]
pub struct FramePresenter {
    surface: Option<(u32, u32)>,
    presented: u64,
}

impl FramePresenter {
    /// Plane order [`copy_planes`] writes, whatever the source layout
    pub const SURFACE_FORMAT: PixelFormat = PixelFormat::Iyuv;

    pub fn new() -> Self {
        Self::default()
    }

    /// Presenter for a surface the caller already created
    pub fn for_surface(width: u32, height: u32) -> Self {
        Self {
            surface: Some((width, height)),
            presented: 0,
        }
    }

    pub fn presented(&self) -> u64 {
        self.presented
    }

    /// Copy `frame` onto the surface and present it
    pub fn present<D: Display + ?Sized>(&mut self, display: &mut D, frame: &VideoUnit) -> Result<()> {
        if self.surface != Some((frame.width, frame.height)) {
            info!("Creating {}x{} streaming surface", frame.width, frame.height);
            display.create_streaming_surface(frame.width, frame.height, Self::SURFACE_FORMAT)?;
            self.surface = Some((frame.width, frame.height));
        }

        let copied = {
            let (buffer, stride) = display.lock_surface()?;
            copy_planes(frame, buffer, stride)
        };
        // copy_planes checks the buffer before writing, so a failed copy
        // re-presents the previous contents and still releases the lock
        let unlocked = display.unlock_and_present();
        if let Err(e) = copied {
            self.surface = None;
            return Err(e);
        }
        unlocked?;

        self.presented += 1;
        Ok(())
    }
}

/// Write `frame` into `dst` as Y, U, V planes at the given luma stride
pub fn copy_planes(frame: &VideoUnit, dst: &mut [u8], stride: usize) -> Result<()> {
    let (w, h) = (frame.width as usize, frame.height as usize);
    let (cw, ch) = (w / 2, h / 2);
    let chroma_stride = stride / 2;

    if stride < w || chroma_stride < cw {
        return Err(PlayerError::Display(format!(
            "Surface stride {} is narrower than a {} pixel row",
            stride, w
        )));
    }
    let luma_size = stride * h;
    let chroma_size = chroma_stride * ch;
    if dst.len() < luma_size + 2 * chroma_size {
        return Err(PlayerError::Display(format!(
            "Surface buffer of {} bytes cannot hold a {}x{} frame at stride {}",
            dst.len(),
            w,
            h,
            stride
        )));
    }

    let (y, first, second) = frame.planes();
    let (u, v) = match frame.format {
        PixelFormat::Iyuv => (first, second),
        PixelFormat::Yv12 => (second, first),
    };

    let (dst_y, rest) = dst.split_at_mut(luma_size);
    let (dst_u, rest) = rest.split_at_mut(chroma_size);
    let dst_v = &mut rest[..chroma_size];

    copy_plane(y, w, dst_y, stride, h);
    copy_plane(u, cw, dst_u, chroma_stride, ch);
    copy_plane(v, cw, dst_v, chroma_stride, ch);
    Ok(())
}

fn copy_plane(src: &[u8], width: usize, dst: &mut [u8], stride: usize, rows: usize) {
    if width == 0 {
        return;
    }
    for (src_row, dst_row) in src.chunks_exact(width).zip(dst.chunks_mut(stride)).take(rows) {
        dst_row[..width].copy_from_slice(src_row);
    }
}
