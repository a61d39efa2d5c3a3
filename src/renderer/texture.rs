//! Plane textures for planar 4:2:0 frames
//!
//! One single-channel texture per plane. Frames arrive as one staging buffer
//! laid out Y, U, V at a luma stride; each plane is uploaded from its offset.

use crate::decoder::PixelFormat;
use crate::renderer::planar_buffer_size;
use crate::utils::error::{PlayerError, Result};

/// Y, U and V textures plus the sampler reading them
pub struct PlaneTextures {
    width: u32,
    height: u32,
    planes: [Plane; 3],
    sampler: wgpu::Sampler,
}

struct Plane {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    size: wgpu::Extent3d,
}

impl Plane {
    fn new(device: &wgpu::Device, label: &str, width: u32, height: u32) -> Self {
        let size = wgpu::Extent3d {
            width: width.max(1),
            height: height.max(1),
            depth_or_array_layers: 1,
        };
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::R8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        Self { texture, view, size }
    }

    fn upload(&self, queue: &wgpu::Queue, data: &[u8], offset: usize, stride: usize) {
        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            data,
            wgpu::TexelCopyBufferLayout {
                offset: offset as u64,
                bytes_per_row: Some(stride.max(1) as u32),
                rows_per_image: Some(self.size.height),
            },
            self.size,
        );
    }
}

impl PlaneTextures {
    pub fn new(device: &wgpu::Device, width: u32, height: u32) -> Self {
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Plane Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let (cw, ch) = (width / 2, height / 2);
        Self {
            width,
            height,
            planes: [
                Plane::new(device, "Y Plane", width, height),
                Plane::new(device, "U Plane", cw, ch),
                Plane::new(device, "V Plane", cw, ch),
            ],
            sampler,
        }
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Upload a staging buffer of three planes at luma `stride`, the chroma
    /// planes stored in `format` order
    pub fn upload(&self, queue: &wgpu::Queue, staging: &[u8], stride: usize, format: PixelFormat) -> Result<()> {
        let needed = planar_buffer_size(stride, self.height);
        if staging.len() < needed {
            return Err(PlayerError::Display(format!(
                "Staging buffer holds {} bytes, {}x{} at stride {} needs {}",
                staging.len(),
                self.width,
                self.height,
                stride,
                needed
            )));
        }

        let luma_size = stride * self.height as usize;
        let chroma_stride = stride / 2;
        let chroma_size = chroma_stride * (self.height as usize / 2);

        let [y, u, v] = &self.planes;
        let (first, second) = match format {
            PixelFormat::Iyuv => (u, v),
            PixelFormat::Yv12 => (v, u),
        };
        y.upload(queue, staging, 0, stride);
        if chroma_size > 0 {
            first.upload(queue, staging, luma_size, chroma_stride);
            second.upload(queue, staging, luma_size + chroma_size, chroma_stride);
        }
        Ok(())
    }

    pub fn views(&self) -> [&wgpu::TextureView; 3] {
        let [y, u, v] = &self.planes;
        [&y.view, &u.view, &v.view]
    }

    pub fn sampler(&self) -> &wgpu::Sampler {
        &self.sampler
    }
}
