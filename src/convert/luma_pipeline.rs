//! wgpu pipeline packing four luma samples into each RGBA output texel.

use super::gpu_context::GpuContext;
use crate::frame::{FrameBuffer, QuadVertex, VideoFrame};
use crate::geometry::Resolution;
use anyhow::{anyhow, Result};
use naga::valid::{Capabilities, ValidationFlags, Validator};
use std::borrow::Cow;
use tracing::{debug, info};
use wgpu::util::DeviceExt;

/// Full-screen quad plus the luma packing fragment stage.
///
/// Output texel `(x, y)` holds the luma of frame pixels `4x..4x+3` on row `y`,
/// using BT.601 studio-range weights.
pub const LUMA_SHADER: &str = r#"
struct VertexInput {
    @location(0) position: vec2<f32>,
    @location(1) tex_coords: vec2<f32>,
}

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) tex_coords: vec2<f32>,
}

@vertex
fn vs_main(in: VertexInput) -> VertexOutput {
    var out: VertexOutput;
    out.clip_position = vec4<f32>(in.position, 0.0, 1.0);
    out.tex_coords = in.tex_coords;
    return out;
}

struct Params {
    luma_size: vec2<f32>,
    packed_width: f32,
    _pad: f32,
}

@group(0) @binding(0) var t_frame: texture_2d<f32>;
@group(0) @binding(1) var s_frame: sampler;
@group(0) @binding(2) var<uniform> params: Params;

fn luma_at(x: f32, y: f32) -> f32 {
    if (x >= params.luma_size.x) {
        return 0.0;
    }
    let uv = vec2<f32>((x + 0.5) / params.luma_size.x, (y + 0.5) / params.luma_size.y);
    let rgb = textureSampleLevel(t_frame, s_frame, uv, 0.0).rgb;
    return dot(rgb, vec3<f32>(0.257, 0.504, 0.098)) + 0.0625;
}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    let x0 = floor(in.clip_position.x) * 4.0;
    let y = floor(in.clip_position.y);
    return vec4<f32>(
        luma_at(x0, y),
        luma_at(x0 + 1.0, y),
        luma_at(x0 + 2.0, y),
        luma_at(x0 + 3.0, y),
    );
}
"#;

/// Uniforms passed to the luma shader.
#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct LumaParams {
    luma_width: f32,
    luma_height: f32,
    packed_width: f32,
    _pad: f32,
}

/// Parses and validates [`LUMA_SHADER`] before handing it to the driver.
pub fn validate_shader(source: &str) -> Result<()> {
    let module = naga::front::wgsl::parse_str(source)
        .map_err(|e| anyhow!("luma shader parse error: {}", e.emit_to_string(source)))?;
    Validator::new(ValidationFlags::all(), Capabilities::all())
        .validate(&module)
        .map_err(|e| anyhow!("luma shader validation error: {:?}", e))?;
    Ok(())
}

fn align_to(value: u32, alignment: u32) -> u32 {
    value.div_ceil(alignment) * alignment
}

/// Rejects texture sizes the device cannot allocate.
fn check_texture_size(max_dimension: u32, what: &str, width: u32, height: u32) -> Result<()> {
    if width == 0 || height == 0 {
        return Err(anyhow!("{what} texture {width}x{height} is empty"));
    }
    if width > max_dimension || height > max_dimension {
        return Err(anyhow!(
            "{what} texture {width}x{height} exceeds the device limit of {max_dimension}"
        ));
    }
    Ok(())
}

/// Off-screen luma converter. Must stay on the thread that created it.
pub struct LumaPipeline {
    context: GpuContext,
    render_pipeline: wgpu::RenderPipeline,
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    bind_group_layout: wgpu::BindGroupLayout,
    uniform_buffer: wgpu::Buffer,
    sampler: wgpu::Sampler,
    output: Resolution,
    packed_width: u32,
    padded_bytes_per_row: u32,
    output_texture: wgpu::Texture,
    readback_buffer: wgpu::Buffer,

    // Recreated when the camera frame size changes.
    input_texture: Option<wgpu::Texture>,
    bind_group: Option<wgpu::BindGroup>,
    cached_input: Option<(u32, u32)>,
}

impl LumaPipeline {
    /// Builds shader, buffers, the camera input texture for `input` sized frames
    /// and the packed output target for `output` sized luma.
    pub fn new(context: GpuContext, input: Resolution, output: Resolution) -> Result<Self> {
        validate_shader(LUMA_SHADER)?;
        let device = &context.device;

        let max_dimension = device.limits().max_texture_dimension_2d;
        check_texture_size(max_dimension, "camera input", input.width, input.height)?;
        let packed_width = output.width.div_ceil(4);
        check_texture_size(max_dimension, "packed luma", packed_width, output.height)?;
        let padded_bytes_per_row = align_to(packed_width * 4, wgpu::COPY_BYTES_PER_ROW_ALIGNMENT);
        info!(
            "Creating luma pipeline (luma {}, packed {}x{}, row pitch {})",
            output, packed_width, output.height, padded_bytes_per_row
        );

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Luma Shader"),
            source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(LUMA_SHADER)),
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Luma Bind Group Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Luma Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            immediate_size: 0,
        });

        let render_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Luma Render Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[QuadVertex::layout()],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: wgpu::TextureFormat::Rgba8Unorm,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview_mask: None,
            cache: None,
        });

        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Vertex Buffer"),
            contents: bytemuck::cast_slice(QuadVertex::VERTICES),
            usage: wgpu::BufferUsages::VERTEX,
        });

        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Index Buffer"),
            contents: bytemuck::cast_slice(QuadVertex::INDICES),
            usage: wgpu::BufferUsages::INDEX,
        });

        // Nearest sampling keeps each luma sample tied to one camera pixel.
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Frame Sampler"),
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let params = LumaParams {
            luma_width: output.width as f32,
            luma_height: output.height as f32,
            packed_width: packed_width as f32,
            _pad: 0.0,
        };
        let uniform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Luma Params"),
            contents: bytemuck::cast_slice(&[params]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let output_texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Packed Luma Texture"),
            size: wgpu::Extent3d {
                width: packed_width,
                height: output.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });

        let readback_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Luma Readback Buffer"),
            size: u64::from(padded_bytes_per_row) * u64::from(output.height),
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut pipeline = Self {
            context,
            render_pipeline,
            vertex_buffer,
            index_buffer,
            bind_group_layout,
            uniform_buffer,
            sampler,
            output,
            packed_width,
            padded_bytes_per_row,
            output_texture,
            readback_buffer,
            input_texture: None,
            bind_group: None,
            cached_input: None,
        };
        pipeline.ensure_input(input.width, input.height)?;
        Ok(pipeline)
    }

    pub fn output_size(&self) -> Resolution {
        self.output
    }

    /// Update or create the camera input texture if the frame size changed.
    fn ensure_input(&mut self, width: u32, height: u32) -> Result<()> {
        if self.cached_input == Some((width, height)) {
            return Ok(());
        }
        let device = &self.context.device;
        check_texture_size(device.limits().max_texture_dimension_2d, "camera input", width, height)?;
        debug!("Creating luma input texture {}x{}", width, height);

        if let Some(old) = self.input_texture.take() {
            old.destroy();
        }
        let input_texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Camera Input Texture"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        let input_view = input_texture.create_view(&wgpu::TextureViewDescriptor::default());
        self.bind_group = Some(device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Luma Bind Group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: wgpu::BindingResource::TextureView(&input_view) },
                wgpu::BindGroupEntry { binding: 1, resource: wgpu::BindingResource::Sampler(&self.sampler) },
                wgpu::BindGroupEntry { binding: 2, resource: self.uniform_buffer.as_entire_binding() },
            ],
        }));
        self.input_texture = Some(input_texture);
        self.cached_input = Some((width, height));
        Ok(())
    }

    /// Uploads `frame`, runs the packing pass and reads back a new luma buffer.
    pub fn convert(&mut self, frame: &VideoFrame) -> Result<FrameBuffer> {
        let rgba = frame.to_rgba()?;
        self.ensure_input(rgba.width, rgba.height)?;
        let (Some(input_texture), Some(bind_group)) = (&self.input_texture, &self.bind_group) else {
            return Err(anyhow!("luma input texture missing"));
        };
        let device = &self.context.device;
        let queue = &self.context.queue;

        queue.write_texture(
            wgpu::TexelCopyTextureInfo { texture: input_texture, mip_level: 0, origin: wgpu::Origin3d::ZERO, aspect: wgpu::TextureAspect::All },
            &rgba.data,
            wgpu::TexelCopyBufferLayout { offset: 0, bytes_per_row: Some(rgba.width * 4), rows_per_image: Some(rgba.height) },
            wgpu::Extent3d { width: rgba.width, height: rgba.height, depth_or_array_layers: 1 },
        );

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("Luma Encoder") });
        let output_view = self.output_texture.create_view(&wgpu::TextureViewDescriptor::default());
        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Luma Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &output_view,
                    resolve_target: None,
                    ops: wgpu::Operations { load: wgpu::LoadOp::Clear(wgpu::Color::BLACK), store: wgpu::StoreOp::Store },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });

            render_pass.set_pipeline(&self.render_pipeline);
            render_pass.set_bind_group(0, bind_group, &[]);
            render_pass.set_vertex_buffer(0, self.vertex_buffer.slice(..));
            render_pass.set_index_buffer(self.index_buffer.slice(..), wgpu::IndexFormat::Uint16);
            render_pass.draw_indexed(0..QuadVertex::INDICES.len() as u32, 0, 0..1);
        }

        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo { texture: &self.output_texture, mip_level: 0, origin: wgpu::Origin3d::ZERO, aspect: wgpu::TextureAspect::All },
            wgpu::TexelCopyBufferInfo {
                buffer: &self.readback_buffer,
                layout: wgpu::TexelCopyBufferLayout { offset: 0, bytes_per_row: Some(self.padded_bytes_per_row), rows_per_image: Some(self.output.height) },
            },
            wgpu::Extent3d { width: self.packed_width, height: self.output.height, depth_or_array_layers: 1 },
        );
        queue.submit(std::iter::once(encoder.finish()));

        let buffer_slice = self.readback_buffer.slice(..);
        let (sender, receiver) = std::sync::mpsc::channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        device
            .poll(wgpu::PollType::Wait { submission_index: None, timeout: None })
            .map_err(|e| anyhow!("GPU poll failed: {:?}", e))?;
        receiver.recv()??;

        let luma = {
            let mapped = buffer_slice.get_mapped_range();
            unpack_rows(&mapped, self.padded_bytes_per_row as usize, self.output)
        };
        self.readback_buffer.unmap();

        let mut buffer = FrameBuffer::new(self.output.width, self.output.height, luma)?;
        buffer.timestamp_us = frame.timestamp_us;
        Ok(buffer)
    }

    /// Releases GPU objects: input texture first, then the output target, then the device.
    pub fn release(mut self) {
        self.bind_group = None;
        if let Some(input) = self.input_texture.take() {
            input.destroy();
        }
        self.output_texture.destroy();
        self.readback_buffer.destroy();
        debug!("Luma pipeline released");
    }
}

/// Strips row padding from a readback buffer, keeping `output.width` luma bytes per row.
fn unpack_rows(padded: &[u8], row_pitch: usize, output: Resolution) -> Vec<u8> {
    let width = output.width as usize;
    let mut luma = Vec::with_capacity(width * output.height as usize);
    for row in padded.chunks(row_pitch).take(output.height as usize) {
        luma.extend_from_slice(&row[..width]);
    }
    luma
}
