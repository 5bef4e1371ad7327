use std::sync::Arc;

use dpi::PhysicalSize;
use lumen_core::{FrameRelay, PendingFrame};
use tracing::{error, trace, warn};

use crate::{
    CLEAR_COLOR, FrameTexture,
    init::{ResizeableSurface, WgpuResources},
    pipeline::FramePipeline,
    quad::SensorOrientation,
    resize::SurfaceResizeSource,
};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DrawOutcome {
    /// The surface has no area, nothing was presented.
    Skipped,
    /// Only the clear color was presented: no frame has arrived yet, or drawing is disabled.
    Cleared,
    /// The frame texture was drawn. `uploaded` is `false` when it still holds an earlier frame.
    Drawn { uploaded: bool },
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum TextureUpdate {
    Write,
    Allocate,
    /// The frame has no pixels, a texture cannot hold it.
    DiscardEmpty,
    /// The frame is larger than the device allows a texture to be.
    DiscardOversized,
}

impl TextureUpdate {
    /// Whether the frame ends up in the texture.
    fn writes(self) -> bool {
        matches!(self, TextureUpdate::Write | TextureUpdate::Allocate)
    }
}

fn texture_update(
    current: Option<PhysicalSize<u32>>,
    frame: PhysicalSize<u32>,
    max_dimension: u32,
) -> TextureUpdate {
    if frame.width == 0 || frame.height == 0 {
        TextureUpdate::DiscardEmpty
    } else if frame.width > max_dimension || frame.height > max_dimension {
        TextureUpdate::DiscardOversized
    } else if current == Some(frame) {
        TextureUpdate::Write
    } else {
        TextureUpdate::Allocate
    }
}

/// Drains the relay on every render tick and draws the newest frame over the whole surface.
///
/// When the pipeline could not be created the stage keeps clearing the screen, so the window stays responsive.
pub struct RenderStage {
    device: wgpu::Device,
    queue: wgpu::Queue,
    surface: ResizeableSurface<'static>,
    resize_source: SurfaceResizeSource,
    pipeline: Option<FramePipeline>,
    texture: Option<FrameTexture>,
    relay: Arc<FrameRelay>,
}

impl RenderStage {
    pub fn new(
        wgpu: &WgpuResources,
        surface: ResizeableSurface<'static>,
        resize_source: SurfaceResizeSource,
        relay: Arc<FrameRelay>,
        orientation: SensorOrientation,
    ) -> Self {
        let pipeline = match FramePipeline::new(&wgpu.device, surface.format(), orientation) {
            Ok(pipeline) => Some(pipeline),
            Err(e) => {
                error!("{}. Frames will not be displayed", e);
                None
            }
        };

        Self {
            device: wgpu.device.clone(),
            queue: wgpu.queue.clone(),
            surface,
            resize_source,
            pipeline,
            texture: None,
            relay,
        }
    }

    /// Size of the last frame uploaded.
    pub fn frame_size(&self) -> Option<PhysicalSize<u32>> {
        self.texture.as_ref().map(FrameTexture::size)
    }

    /// Takes effect on the next draw.
    pub fn resize(&self, size: PhysicalSize<u32>) {
        self.resize_source.resize(size);
    }

    /// Swaps in a surface recreated after the platform destroyed the previous one.
    pub fn replace_surface(&mut self, surface: ResizeableSurface<'static>) {
        self.surface = surface;
    }

    /// Returns `true` if `frame` was written into the texture.
    fn upload(&mut self, frame: &PendingFrame) -> bool {
        let Some(pipeline) = &self.pipeline else {
            return false;
        };

        let current = self.texture.as_ref().map(FrameTexture::size);
        let max_dimension = self.device.limits().max_texture_dimension_2d;
        let update = texture_update(current, frame.size(), max_dimension);
        match update {
            TextureUpdate::Write => {}
            TextureUpdate::Allocate => {
                self.texture = Some(FrameTexture::new_empty(&self.device, pipeline, frame.size()));
            }
            TextureUpdate::DiscardEmpty => {
                warn!("Ignoring an empty {}x{} frame", frame.width, frame.height);
            }
            TextureUpdate::DiscardOversized => {
                warn!(
                    "Ignoring a {}x{} frame, textures are limited to {}x{}",
                    frame.width, frame.height, max_dimension, max_dimension
                );
            }
        }
        if !update.writes() {
            return false;
        }

        match &self.texture {
            Some(texture) => {
                texture.write(&self.queue, frame);
                true
            }
            None => false,
        }
    }

    /// One render tick. `pre_present` is called right before the surface texture is presented.
    pub fn draw(&mut self, pre_present: impl FnOnce()) -> Result<DrawOutcome, wgpu::SurfaceError> {
        // the frame buffer is released as soon as its contents are queued for upload
        let uploaded = match self.relay.take_if_present() {
            Some(frame) => self.upload(&frame),
            None => false,
        };

        let Some((viewport, surface_texture)) = self.surface.get_current_texture()? else {
            return Ok(DrawOutcome::Skipped);
        };

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Frame Encoder"),
            });

        let drawable = self.pipeline.as_ref().zip(self.texture.as_ref());
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Frame Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &surface_texture.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(CLEAR_COLOR),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            if let Some((pipeline, texture)) = drawable {
                pass.set_viewport(
                    viewport.x,
                    viewport.y,
                    viewport.width,
                    viewport.height,
                    0.0,
                    1.0,
                );
                pipeline.draw(&mut pass, texture.bind_group());
            }
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        pre_present();
        surface_texture.texture.present();

        let outcome = if drawable.is_some() {
            DrawOutcome::Drawn { uploaded }
        } else {
            DrawOutcome::Cleared
        };
        trace!("Render tick: {:?}", outcome);

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAX_DIMENSION: u32 = 4096;

    #[test]
    fn test_texture_update() {
        let hd = PhysicalSize::new(1280, 720);

        assert_eq!(texture_update(None, hd, MAX_DIMENSION), TextureUpdate::Allocate);
        assert_eq!(texture_update(Some(hd), hd, MAX_DIMENSION), TextureUpdate::Write);
        assert_eq!(
            texture_update(Some(hd), PhysicalSize::new(720, 1280), MAX_DIMENSION),
            TextureUpdate::Allocate
        );
        assert_eq!(
            texture_update(Some(hd), PhysicalSize::new(0, 720), MAX_DIMENSION),
            TextureUpdate::DiscardEmpty
        );
    }

    #[test]
    fn test_oversized_frames_are_discarded() {
        let hd = PhysicalSize::new(1280, 720);

        assert_eq!(
            texture_update(None, PhysicalSize::new(4800, 2700), MAX_DIMENSION),
            TextureUpdate::DiscardOversized
        );
        assert_eq!(
            texture_update(Some(hd), PhysicalSize::new(1080, 5120), MAX_DIMENSION),
            TextureUpdate::DiscardOversized
        );
        // exactly at the limit still fits
        assert_eq!(
            texture_update(Some(hd), PhysicalSize::new(4096, 4096), MAX_DIMENSION),
            TextureUpdate::Allocate
        );
    }

    #[test]
    fn test_only_written_frames_count_as_uploaded() {
        assert!(TextureUpdate::Write.writes());
        assert!(TextureUpdate::Allocate.writes());
        assert!(!TextureUpdate::DiscardEmpty.writes());
        assert!(!TextureUpdate::DiscardOversized.writes());
    }
}
