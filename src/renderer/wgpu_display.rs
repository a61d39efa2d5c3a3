//! WGPU-backed display for syncplay
//!
//! The streaming surface is a CPU staging buffer. `lock_surface` hands it
//! out; `unlock_and_present` uploads the three planes to the GPU and draws
//! them into the window in one submission.

use crate::decoder::PixelFormat;
use crate::renderer::pipeline::{letterbox_scale, VideoPipeline};
use crate::renderer::texture::PlaneTextures;
use crate::renderer::{aligned_stride, planar_buffer_size, Display};
use crate::utils::error::{IntoPlayerError, PlayerError, Result};
use crate::window::PlayerWindow;
use log::{debug, info, warn};

/// Luma rows in the staging buffer are padded to this many bytes
const ROW_ALIGNMENT: usize = 64;

/// WGPU display implementation
pub struct WgpuDisplay {
    window: PlayerWindow,

    device: wgpu::Device,
    queue: wgpu::Queue,
    surface: wgpu::Surface<'static>,
    surface_config: wgpu::SurfaceConfiguration,
    pipeline: VideoPipeline,

    stream: Option<StreamingSurface>,
}

struct StreamingSurface {
    textures: PlaneTextures,
    format: PixelFormat,
    stride: usize,
    staging: Vec<u8>,
    locked: bool,
}

impl WgpuDisplay {
    /// Bring up wgpu on `window`
    pub fn new(window: PlayerWindow) -> Result<Self> {
        let handle = window.handle()?;
        let (width, height) = window.inner_size();

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let surface = instance
            .create_surface(handle)
            .init_err("Failed to create render surface")?;

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::default(),
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))
        .init_err("Failed to find a suitable GPU adapter")?;

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("syncplay device"),
            ..Default::default()
        }))
        .init_err("Failed to create GPU device")?;

        let caps = surface.get_capabilities(&adapter);
        let format = caps
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .or_else(|| caps.formats.first().copied())
            .ok_or_else(|| PlayerError::Init("Surface supports no texture formats".to_string()))?;
        let alpha_mode = caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let surface_config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: width.max(1),
            height: height.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &surface_config);

        let pipeline = VideoPipeline::new(&device, format);
        info!("GPU display ready on {} ({:?})", adapter.get_info().name, format);

        Ok(Self {
            window,
            device,
            queue,
            surface,
            surface_config,
            pipeline,
            stream: None,
        })
    }

    fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.surface_config.width = width;
        self.surface_config.height = height;
        self.surface.configure(&self.device, &self.surface_config);
        self.update_scale();
    }

    fn update_scale(&self) {
        if let Some(stream) = &self.stream {
            let scale = letterbox_scale(
                stream.textures.size(),
                (self.surface_config.width, self.surface_config.height),
            );
            self.pipeline.set_scale(&self.queue, scale);
        }
    }

    fn draw(&mut self) -> Result<()> {
        let frame = match self.surface.get_current_texture() {
            Ok(frame) => frame,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                debug!("Surface lost, reconfiguring");
                self.surface.configure(&self.device, &self.surface_config);
                return Ok(());
            }
            Err(wgpu::SurfaceError::OutOfMemory) => {
                return Err(PlayerError::Display("Out of GPU memory".to_string()));
            }
            Err(e) => {
                warn!("Skipping frame, surface unavailable: {}", e);
                return Ok(());
            }
        };

        let view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Frame Encoder"),
            });
        self.pipeline.draw(&mut encoder, &view);
        self.queue.submit(std::iter::once(encoder.finish()));
        frame.present();
        Ok(())
    }
}

impl Display for WgpuDisplay {
    fn create_streaming_surface(&mut self, width: u32, height: u32, format: PixelFormat) -> Result<()> {
        if width == 0 || height == 0 {
            return Err(PlayerError::Init(format!(
                "Cannot create a {}x{} surface",
                width, height
            )));
        }

        let stride = aligned_stride(width, ROW_ALIGNMENT);
        let textures = PlaneTextures::new(&self.device, width, height);
        self.pipeline.bind_textures(&self.device, &textures);
        self.stream = Some(StreamingSurface {
            textures,
            format,
            stride,
            staging: vec![0; planar_buffer_size(stride, height)],
            locked: false,
        });
        self.update_scale();

        debug!("Streaming surface {}x{} stride {}", width, height, stride);
        Ok(())
    }

    fn lock_surface(&mut self) -> Result<(&mut [u8], usize)> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| PlayerError::Display("No streaming surface to lock".to_string()))?;
        if stream.locked {
            return Err(PlayerError::Display("Surface is already locked".to_string()));
        }
        stream.locked = true;
        Ok((stream.staging.as_mut_slice(), stream.stride))
    }

    fn unlock_and_present(&mut self) -> Result<()> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| PlayerError::Display("No streaming surface to present".to_string()))?;
        if !stream.locked {
            return Err(PlayerError::Display("Surface was not locked".to_string()));
        }
        stream.locked = false;
        stream
            .textures
            .upload(&self.queue, &stream.staging, stream.stride, stream.format)?;

        self.draw()
    }

    fn pump_events(&mut self) -> bool {
        let quit = self.window.pump();
        if let Some((width, height)) = self.window.take_resize() {
            self.resize(width, height);
        }
        quit
    }
}
