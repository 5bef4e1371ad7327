use thiserror::Error;
use tracing::debug;
use wgpu::util::DeviceExt;

use crate::quad::{QuadVertex, SensorOrientation};

/// Setting up the draw failed. The stage keeps running, but only clears the screen.
#[derive(Debug, Error)]
#[error("failed to create the {stage}: {message}")]
pub struct GraphicsInitFailure {
    pub stage: &'static str,
    pub message: String,
}

/// Runs `create` inside a validation error scope, turning a validation error into a [`GraphicsInitFailure`].
fn validated<T>(
    device: &wgpu::Device,
    stage: &'static str,
    create: impl FnOnce() -> T,
) -> Result<T, GraphicsInitFailure> {
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let result = create();
    match pollster::block_on(device.pop_error_scope()) {
        None => Ok(result),
        Some(error) => Err(GraphicsInitFailure {
            stage,
            message: error.to_string(),
        }),
    }
}

/// Everything needed to draw a frame texture onto the surface, minus the texture itself.
#[derive(Debug)]
pub struct FramePipeline {
    pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    vertices: wgpu::Buffer,
}

impl FramePipeline {
    pub fn new(
        device: &wgpu::Device,
        surface_texture_format: wgpu::TextureFormat,
        orientation: SensorOrientation,
    ) -> Result<Self, GraphicsInitFailure> {
        let shader_module = validated(device, "frame shader", || {
            device.create_shader_module(wgpu::include_wgsl!("frame_quad.wgsl"))
        })?;

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Frame Bind Group Layout"),
            entries: &[
                // frame texture
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: false },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                // texture sampler
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::NonFiltering),
                    count: None,
                },
            ],
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Frame Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = validated(device, "frame pipeline", || {
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("Frame Pipeline"),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &shader_module,
                    entry_point: Some("vertex_main"),
                    compilation_options: Default::default(),
                    buffers: &[QuadVertex::buffer_layout()],
                },
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleStrip,
                    strip_index_format: None,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: None,
                    unclipped_depth: false,
                    polygon_mode: Default::default(),
                    conservative: false,
                },
                depth_stencil: None,
                multisample: Default::default(),
                fragment: Some(wgpu::FragmentState {
                    module: &shader_module,
                    entry_point: Some("fragment_main"),
                    compilation_options: Default::default(),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: surface_texture_format,
                        blend: Some(wgpu::BlendState::REPLACE),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                }),
                multiview: None,
                cache: None,
            })
        })?;

        // no smoothing, every screen pixel shows exactly one sensor pixel
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Frame Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let vertices = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Frame Quad Vertices"),
            contents: bytemuck::cast_slice(&QuadVertex::fullscreen(orientation)),
            usage: wgpu::BufferUsages::VERTEX,
        });

        debug!("Created the frame pipeline for {:?}", orientation);

        Ok(Self {
            pipeline,
            bind_group_layout,
            sampler,
            vertices,
        })
    }

    pub fn bind_group_layout(&self) -> &wgpu::BindGroupLayout {
        &self.bind_group_layout
    }

    pub fn sampler(&self) -> &wgpu::Sampler {
        &self.sampler
    }

    pub fn draw(&self, render_pass: &mut wgpu::RenderPass, bind_group: &wgpu::BindGroup) {
        render_pass.set_pipeline(&self.pipeline);
        render_pass.set_bind_group(0, bind_group, &[]);
        render_pass.set_vertex_buffer(0, self.vertices.slice(..));
        render_pass.draw(0..4, 0..1);
    }
}
