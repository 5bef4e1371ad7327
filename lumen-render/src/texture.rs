use dpi::PhysicalSize;
use lumen_core::PendingFrame;
use tracing::debug;

use crate::{FRAME_TEXTURE_FORMAT, pipeline::FramePipeline};

/// The texture frames are uploaded into, and the bind group to sample it with.
///
/// Only ever written to. It is reallocated when a frame of a different size arrives.
#[derive(Debug)]
pub struct FrameTexture {
    texture: wgpu::Texture,
    bind_group: wgpu::BindGroup,
}

impl FrameTexture {
    fn make_descriptor(size: PhysicalSize<u32>) -> wgpu::TextureDescriptor<'static> {
        wgpu::TextureDescriptor {
            label: Some("Frame Texture"),
            size: wgpu::Extent3d {
                width: size.width,
                height: size.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: FRAME_TEXTURE_FORMAT,
            usage: wgpu::TextureUsages::COPY_DST | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        }
    }

    pub fn new_empty(
        device: &wgpu::Device,
        pipeline: &FramePipeline,
        size: PhysicalSize<u32>,
    ) -> Self {
        debug!("Allocating a {}x{} frame texture", size.width, size.height);

        let texture = device.create_texture(&Self::make_descriptor(size));
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Frame Bind Group"),
            layout: pipeline.bind_group_layout(),
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(pipeline.sampler()),
                },
            ],
        });

        Self {
            texture,
            bind_group,
        }
    }

    pub fn size(&self) -> PhysicalSize<u32> {
        PhysicalSize::new(self.texture.width(), self.texture.height())
    }

    /// Replaces the whole texture contents with `frame`, which must have the same size.
    pub fn write(&self, queue: &wgpu::Queue, frame: &PendingFrame) {
        let size = self.size();
        debug_assert_eq!(size, frame.size());

        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &frame.buffer,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(size.width * 4),
                rows_per_image: Some(size.height),
            },
            wgpu::Extent3d {
                width: size.width,
                height: size.height,
                depth_or_array_layers: 1,
            },
        );
    }

    pub fn bind_group(&self) -> &wgpu::BindGroup {
        &self.bind_group
    }
}
