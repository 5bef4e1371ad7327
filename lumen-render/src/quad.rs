//! The full-screen quad, with texture coordinates that undo the sensor orientation.

use bytemuck::{Pod, Zeroable};
use glam::{Vec2, vec2};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum Rotation {
    #[default]
    Deg0,
    /// Clockwise.
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    pub fn from_degrees(degrees: u32) -> Option<Self> {
        Some(match degrees % 360 {
            0 => Rotation::Deg0,
            90 => Rotation::Deg90,
            180 => Rotation::Deg180,
            270 => Rotation::Deg270,
            _ => return None,
        })
    }

    pub fn degrees(self) -> u32 {
        match self {
            Rotation::Deg0 => 0,
            Rotation::Deg90 => 90,
            Rotation::Deg180 => 180,
            Rotation::Deg270 => 270,
        }
    }
}

/// How the sensor image has to be turned to appear upright on the display.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct SensorOrientation {
    pub rotation: Rotation,
    /// Mirror horizontally after rotating, like a front camera preview.
    pub mirror: bool,
}

impl SensorOrientation {
    /// Maps a position on the screen (0..1, y down) to the texture coordinate to sample there.
    pub fn map_uv(&self, uv: Vec2) -> Vec2 {
        let uv = if self.mirror { vec2(1.0 - uv.x, uv.y) } else { uv };

        match self.rotation {
            Rotation::Deg0 => uv,
            Rotation::Deg90 => vec2(uv.y, 1.0 - uv.x),
            Rotation::Deg180 => vec2(1.0 - uv.x, 1.0 - uv.y),
            Rotation::Deg270 => vec2(1.0 - uv.y, uv.x),
        }
    }

    /// Whether the displayed image is transposed relative to the sensor frame.
    pub fn swaps_axes(&self) -> bool {
        matches!(self.rotation, Rotation::Deg90 | Rotation::Deg270)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct QuadVertex {
    pub position: Vec2,
    pub texture_position: Vec2,
}

impl QuadVertex {
    pub const ATTRIBUTES: [wgpu::VertexAttribute; 2] =
        wgpu::vertex_attr_array![0 => Float32x2, 1 => Float32x2];

    pub fn buffer_layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: size_of::<QuadVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBUTES,
        }
    }

    /// Four vertices covering the viewport, to be drawn as a triangle strip.
    pub fn fullscreen(orientation: SensorOrientation) -> [QuadVertex; 4] {
        // top-left, top-right, bottom-left, bottom-right
        [
            (vec2(-1.0, 1.0), vec2(0.0, 0.0)),
            (vec2(1.0, 1.0), vec2(1.0, 0.0)),
            (vec2(-1.0, -1.0), vec2(0.0, 1.0)),
            (vec2(1.0, -1.0), vec2(1.0, 1.0)),
        ]
        .map(|(position, screen_uv)| QuadVertex {
            position,
            texture_position: orientation.map_uv(screen_uv),
        })
    }
}
