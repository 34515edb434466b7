#![allow(dead_code)]

use ember_engine::backend::headless::{HeadlessBackend, HeadlessProbe};
use ember_engine::backend::{BindingLayoutEntry, BufferDesc, ShaderSource};
use ember_engine::device::{DeviceSession, SessionConfig};
use ember_engine::frame::DrawList;
use ember_engine::lifecycle::{App, GpuCtx, Lifecycle};
use ember_engine::pipeline::{BlendMode, DepthState, PipelineBuilder, VertexBufferLayout};
use ember_engine::resource::{BindGroupEntry, BindGroupId, BufferId, PipelineId};
use ember_engine::Result;

pub const SHADER: &str = "
struct Globals { time: vec4<f32> };
@group(0) @binding(0) var<uniform> globals: Globals;
@vertex fn vs_main(@location(0) position: vec4<f32>) -> @builtin(position) vec4<f32> { return position; }
@fragment fn fs_main() -> @location(0) vec4<f32> { return vec4<f32>(1.0); }
";

pub fn session(backend: HeadlessBackend) -> DeviceSession<HeadlessBackend> {
    pollster::block_on(DeviceSession::negotiate(backend, (), &SessionConfig::default())).unwrap()
}

/// Four vertices from a 64-byte pattern buffer, with a per-tick uniform.
#[derive(Default)]
pub struct Quad {
    pub vertices: Option<BufferId>,
    pub uniforms: Option<BufferId>,
    pub group: Option<BindGroupId>,
    pub pipeline: Option<PipelineId>,
    pub time: f32,
}

impl App<HeadlessBackend> for Quad {
    fn load(&mut self, ctx: &mut GpuCtx<'_, HeadlessBackend>) -> Result<()> {
        let vertices = ctx.registry.create_buffer(
            ctx.session,
            &BufferDesc {
                label: Some("quad vertices"),
                size: 64,
                usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            },
        )?;
        let pattern: Vec<u8> = (0u8..64).collect();
        ctx.registry.write_buffer(ctx.session, vertices, 0, &pattern)?;

        let uniforms = ctx.registry.create_buffer_init(
            ctx.session,
            Some("quad globals"),
            wgpu::BufferUsages::UNIFORM,
            bytemuck::bytes_of(&[0.0f32; 4]),
        )?;
        let layout = ctx.registry.create_bind_group_layout(
            ctx.session,
            Some("quad layout"),
            &[BindingLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
            }],
        )?;
        let group = ctx.registry.create_bind_group(
            ctx.session,
            Some("quad group"),
            layout,
            &[BindGroupEntry::buffer(0, uniforms)],
        )?;

        let mut builder = PipelineBuilder::new("quad", ShaderSource::wgsl(SHADER))
            .vertex_buffer(
                VertexBufferLayout::new(16).with_attributes(&wgpu::vertex_attr_array![0 => Float32x4]),
            )
            .bind_group_layout(layout)
            .blend(BlendMode::Replace);
        if let Some(format) = ctx.depth_format() {
            builder = builder.depth(DepthState::new(format));
        }
        let pipeline = ctx.build_pipeline(builder)?;

        self.vertices = Some(vertices);
        self.uniforms = Some(uniforms);
        self.group = Some(group);
        self.pipeline = Some(pipeline);
        Ok(())
    }

    fn update(&mut self, ctx: &mut GpuCtx<'_, HeadlessBackend>, dt: f32) -> Result<()> {
        self.time += dt;
        if let Some(uniforms) = self.uniforms {
            let globals = [self.time, 0.0, 0.0, 0.0];
            ctx.registry
                .write_buffer(ctx.session, uniforms, 0, bytemuck::bytes_of(&globals))?;
        }
        Ok(())
    }

    fn draw(&self, list: &mut DrawList) {
        if let (Some(pipeline), Some(group), Some(vertices)) = (self.pipeline, self.group, self.vertices) {
            list.batch(pipeline)
                .bind_group(0, group)
                .vertex_buffer(0, vertices)
                .draw(0..4, 0..1);
        }
    }
}

/// A running lifecycle with a loaded [`Quad`], configured at `width` x `height`.
pub fn running_quad(
    config: SessionConfig,
    width: u32,
    height: u32,
) -> (Lifecycle<HeadlessBackend>, Quad, HeadlessProbe) {
    let backend = HeadlessBackend::new();
    let probe = backend.probe();
    let mut lifecycle = Lifecycle::new(config);
    let mut app = Quad::default();
    lifecycle
        .on_load(&mut app, backend, (), width, height)
        .unwrap();
    (lifecycle, app, probe)
}
