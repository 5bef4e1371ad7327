//! The render side of the pipeline: owns every GPU object, and is only ever touched from the render schedule.
//!
//! The only thing it shares with the capture side is the [`lumen_core::FrameRelay`] it drains.

pub mod init;
mod pipeline;
pub mod quad;
pub mod resize;
mod stage;
mod texture;

pub use init::{ResizeableSurface, WgpuInitResult, WgpuResources, init_wgpu, surface_reinit};
pub use pipeline::{FramePipeline, GraphicsInitFailure};
pub use quad::{QuadVertex, Rotation, SensorOrientation};
pub use resize::{ResizeHandle, SurfaceResizeSource, SurfaceSize, Viewport};
pub use stage::{DrawOutcome, RenderStage};
pub use texture::FrameTexture;

/// Frames are uploaded as-is: the converter already produced display-ready 8-bit values.
pub const FRAME_TEXTURE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

pub const CLEAR_COLOR: wgpu::Color = wgpu::Color::BLACK;
