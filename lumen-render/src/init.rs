use anyhow::Context;
use tracing::{debug, info};
use wgpu::{InstanceFlags, SurfaceTarget};

use crate::resize::{ResizeHandle, Viewport};

#[derive(Debug)]
pub struct ResizeableSurface<'window> {
    device: wgpu::Device,
    surface: wgpu::Surface<'window>,
    surface_config: wgpu::SurfaceConfiguration,
    resize_handle: ResizeHandle,
}

impl ResizeableSurface<'_> {
    /// Returns `None` when the surface has no area to draw into.
    ///
    /// An outdated or lost surface is reconfigured, and acquiring the texture is retried once.
    pub fn get_current_texture(
        &mut self,
    ) -> Result<Option<(Viewport, SurfaceTextureWithView)>, wgpu::SurfaceError> {
        if let Some(new_size) = self.resize_handle.update() {
            if !new_size.is_empty() {
                debug!("Reconfiguring surface to {}x{}", new_size.width, new_size.height);
                self.surface_config.width = new_size.width;
                self.surface_config.height = new_size.height;
                self.surface.configure(&self.device, &self.surface_config);
            }
        }

        let Some(viewport) = self.resize_handle.get_viewport() else {
            return Ok(None);
        };

        let texture = match self.surface.get_current_texture() {
            Ok(texture) => texture,
            Err(wgpu::SurfaceError::Outdated | wgpu::SurfaceError::Lost) => {
                debug!("Surface error, reconfiguring surface");
                self.surface.configure(&self.device, &self.surface_config);
                self.surface.get_current_texture()?
            }
            Err(e) => return Err(e),
        };
        let view = texture
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        Ok(Some((viewport, SurfaceTextureWithView { texture, view })))
    }

    pub fn format(&self) -> wgpu::TextureFormat {
        self.surface_config.format
    }
}

pub struct SurfaceTextureWithView {
    pub texture: wgpu::SurfaceTexture,
    pub view: wgpu::TextureView,
}

fn configure_surface(
    device: wgpu::Device,
    surface: wgpu::Surface,
    mut resize_handle: ResizeHandle,
    surface_texture_format: wgpu::TextureFormat,
) -> ResizeableSurface {
    let size = resize_handle.get();

    let surface_config = wgpu::SurfaceConfiguration {
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        format: surface_texture_format,
        width: size.width,
        height: size.height,
        present_mode: wgpu::PresentMode::AutoVsync,
        desired_maximum_frame_latency: 2,
        alpha_mode: wgpu::CompositeAlphaMode::Auto,
        view_formats: vec![],
    };
    if !size.is_empty() {
        surface.configure(&device, &surface_config);
    }

    ResizeableSurface {
        device,
        surface,
        surface_config,
        resize_handle,
    }
}

#[derive(Debug)]
pub struct WgpuInitResult<'window> {
    pub instance: wgpu::Instance,
    pub surface: ResizeableSurface<'window>,
    pub adapter: wgpu::Adapter,
    pub surface_texture_format: wgpu::TextureFormat,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
}

impl<'window> WgpuInitResult<'window> {
    pub fn into_resources(self) -> (WgpuResources, ResizeableSurface<'window>) {
        (
            WgpuResources {
                instance: self.instance,
                adapter: self.adapter,
                device: self.device,
                queue: self.queue,
                surface_texture_format: self.surface_texture_format,
            },
            self.surface,
        )
    }
}

pub async fn init_wgpu<'window>(
    surface_target: impl Into<SurfaceTarget<'window>>,
    resize_handle: ResizeHandle,
) -> anyhow::Result<WgpuInitResult<'window>> {
    info!("Initializing wgpu...");

    let backends = wgpu::Backends::from_env().unwrap_or(wgpu::Backends::all());
    let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
        backends,
        flags: InstanceFlags::from_build_config().with_env(),
        ..Default::default()
    });
    let surface = instance
        .create_surface(surface_target)
        .context("Creating surface")?;

    for adapter in instance.enumerate_adapters(backends) {
        debug!("Found adapter: {:?}", adapter.get_info());
    }

    let adapter = wgpu::util::initialize_adapter_from_env_or_default(&instance, Some(&surface))
        .await
        .context("Failed to find appropriate wgpu adapter")?;

    info!("Selected an adapter {:?}", adapter.get_info());
    debug!("Adapter limits: {:?}", adapter.limits());

    let (device, queue) = adapter
        .request_device(
            &wgpu::DeviceDescriptor {
                label: Some("lumen device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits {
                    // sensor frames are commonly larger than the webgl2 default
                    max_texture_dimension_2d: 4096,
                    ..wgpu::Limits::downlevel_webgl2_defaults()
                },
                memory_hints: wgpu::MemoryHints::Performance,
            },
            None,
        )
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create wgpu device: {:?}", e))?;

    // frames are uploaded without any color space conversion, so the surface must not apply one either
    let formats = surface.get_capabilities(&adapter).formats;
    let surface_texture_format = formats
        .iter()
        .copied()
        .find(|f| !f.is_srgb())
        .or_else(|| formats.first().copied())
        .context("Surface is not compatible with the adapter")?;

    debug!(
        "Picked {:?} as the surface texture format",
        surface_texture_format
    );

    let surface = configure_surface(
        device.clone(),
        surface,
        resize_handle,
        surface_texture_format,
    );

    Ok(WgpuInitResult {
        instance,
        surface,
        adapter,
        surface_texture_format,
        device,
        queue,
    })
}

/// Re-create a surface with the same parameters as an old one, after the platform took the old one away.
pub fn surface_reinit<'window>(
    wgpu: &WgpuResources,
    surface_target: impl Into<SurfaceTarget<'window>>,
    resize_handle: ResizeHandle,
) -> anyhow::Result<ResizeableSurface<'window>> {
    info!("Re-creating surface...");
    let surface = wgpu
        .instance
        .create_surface(surface_target)
        .context("Creating surface")?;

    Ok(configure_surface(
        wgpu.device.clone(),
        surface,
        resize_handle,
        wgpu.surface_texture_format,
    ))
}

pub struct WgpuResources {
    pub instance: wgpu::Instance,
    pub adapter: wgpu::Adapter,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub surface_texture_format: wgpu::TextureFormat,
}
