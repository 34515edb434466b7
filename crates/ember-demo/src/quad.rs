//! A textured, depth-tested quad spinning around the Y axis.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};

use ember_engine::Result;
use ember_engine::backend::{Backend, BindingLayoutEntry, SamplerDesc, ShaderSource, ViewDesc};
use ember_engine::frame::DrawList;
use ember_engine::lifecycle::{App, GpuCtx};
use ember_engine::pipeline::{BlendMode, DepthState, PipelineBuilder, VertexBufferLayout};
use ember_engine::resource::{BindGroupEntry, BindGroupId, BufferId, PipelineId};

use crate::decode::{RgbaDecoder, TextureSource};

// ── geometry ──────────────────────────────────────────────────────────────

#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
struct Vertex {
    position: [f32; 3],
    uv: [f32; 2],
}

impl Vertex {
    const ATTRS: [wgpu::VertexAttribute; 2] = wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x2];

    fn layout() -> VertexBufferLayout {
        VertexBufferLayout::new(size_of::<Vertex>() as u64).with_attributes(&Self::ATTRS)
    }
}

const VERTICES: [Vertex; 4] = [
    Vertex { position: [-0.5, -0.5, 0.0], uv: [0.0, 1.0] },
    Vertex { position: [0.5, -0.5, 0.0], uv: [1.0, 1.0] },
    Vertex { position: [0.5, 0.5, 0.0], uv: [1.0, 0.0] },
    Vertex { position: [-0.5, 0.5, 0.0], uv: [0.0, 0.0] },
];

const INDICES: [u16; 6] = [0, 1, 2, 0, 2, 3];

#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
struct Camera {
    mvp: [[f32; 4]; 4],
}

// ── app ───────────────────────────────────────────────────────────────────

struct Handles {
    pipeline: PipelineId,
    group: BindGroupId,
    vertices: BufferId,
    indices: BufferId,
    camera: BufferId,
}

pub struct TexturedQuad {
    source: TextureSource,
    angle: f32,
    handles: Option<Handles>,
}

impl TexturedQuad {
    /// Radians per second.
    const SPIN: f32 = 0.8;

    pub fn new(source: TextureSource) -> Self {
        Self {
            source,
            angle: 0.0,
            handles: None,
        }
    }

    fn mvp(&self, aspect: f32) -> Mat4 {
        let projection = Mat4::perspective_rh(45f32.to_radians(), aspect, 0.1, 10.0);
        let view = Mat4::look_at_rh(Vec3::new(0.0, 0.0, 2.0), Vec3::ZERO, Vec3::Y);
        projection * view * Mat4::from_rotation_y(self.angle)
    }
}

impl<B: Backend> App<B> for TexturedQuad {
    fn load(&mut self, ctx: &mut GpuCtx<'_, B>) -> Result<()> {
        let session = ctx.session;
        let registry = &mut *ctx.registry;

        let vertices = registry.create_buffer_init(
            session,
            Some("quad vertices"),
            wgpu::BufferUsages::VERTEX,
            bytemuck::cast_slice(&VERTICES),
        )?;
        let indices = registry.create_buffer_init(
            session,
            Some("quad indices"),
            wgpu::BufferUsages::INDEX,
            bytemuck::cast_slice(&INDICES),
        )?;
        let camera = registry.create_buffer_init(
            session,
            Some("camera"),
            wgpu::BufferUsages::UNIFORM,
            bytemuck::bytes_of(&Camera { mvp: Mat4::IDENTITY.to_cols_array_2d() }),
        )?;

        let texture = match &self.source {
            TextureSource::Encoded(bytes) => {
                registry.load_texture(session, &RgbaDecoder, bytes, Some("diffuse"))?
            }
            TextureSource::Decoded(image) => {
                registry.create_texture_from_image(session, image, Some("diffuse"))?
            }
        };
        let view = registry.create_view(session, texture, &ViewDesc::default())?;
        let sampler = registry.create_sampler(
            session,
            &SamplerDesc {
                mag_filter: wgpu::FilterMode::Nearest,
                ..SamplerDesc::default()
            },
        )?;

        let layout = registry.create_bind_group_layout(
            session,
            Some("quad layout"),
            &[
                BindingLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: wgpu::BufferSize::new(size_of::<Camera>() as u64),
                    },
                },
                BindingLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                },
                BindingLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                },
            ],
        )?;
        let group = registry.create_bind_group(
            session,
            Some("quad group"),
            layout,
            &[
                BindGroupEntry::buffer(0, camera),
                BindGroupEntry::texture_view(1, view),
                BindGroupEntry::sampler(2, sampler),
            ],
        )?;

        let mut builder = PipelineBuilder::new(
            "textured quad",
            ShaderSource::wgsl(include_str!("shader.wgsl")).with_label("quad shader"),
        )
        .vertex_buffer(Vertex::layout())
        .bind_group_layout(layout)
        .blend(BlendMode::Replace)
        .primitive(wgpu::PrimitiveState {
            cull_mode: None,
            ..wgpu::PrimitiveState::default()
        });
        if let Some(format) = ctx.depth_format() {
            builder = builder.depth(DepthState::new(format));
        }
        let pipeline = ctx.build_pipeline(builder)?;

        self.handles = Some(Handles {
            pipeline,
            group,
            vertices,
            indices,
            camera,
        });
        Ok(())
    }

    fn update(&mut self, ctx: &mut GpuCtx<'_, B>, dt: f32) -> Result<()> {
        self.angle = (self.angle + Self::SPIN * dt) % std::f32::consts::TAU;

        let Some(handles) = &self.handles else {
            return Ok(());
        };
        let camera = Camera {
            mvp: self.mvp(ctx.aspect_ratio()).to_cols_array_2d(),
        };
        ctx.registry
            .write_buffer(ctx.session, handles.camera, 0, bytemuck::bytes_of(&camera))
    }

    fn draw(&self, list: &mut DrawList) {
        let Some(handles) = &self.handles else {
            return;
        };
        list.batch(handles.pipeline)
            .bind_group(0, handles.group)
            .vertex_buffer(0, handles.vertices)
            .index_buffer(handles.indices, wgpu::IndexFormat::Uint16)
            .draw_indexed(0..INDICES.len() as u32, 0, 0..1);
    }
}

#[cfg(test)]
mod tests {
    use ember_engine::backend::headless::HeadlessBackend;
    use ember_engine::device::SessionConfig;
    use ember_engine::frame::FrameOutcome;
    use ember_engine::GpuError;
    use ember_engine::lifecycle::Lifecycle;
    use ember_engine::resource::ResourceKey;

    use super::*;
    use crate::decode::checkerboard;
    use crate::decode::tests::encode_png;

    #[test]
    fn renders_one_indexed_draw_per_tick() {
        let backend = HeadlessBackend::new();
        let probe = backend.probe();
        let config = SessionConfig::default().with_depth(wgpu::TextureFormat::Depth24Plus);
        let mut lifecycle = Lifecycle::new(config);
        let mut app = TexturedQuad::new(TextureSource::Decoded(checkerboard(8, 2)));

        lifecycle.on_load(&mut app, backend, (), 640, 480).unwrap();
        assert_eq!(lifecycle.on_render_tick(&mut app, 0.5), Ok(FrameOutcome::Presented));

        let draws = probe.draws();
        assert_eq!(draws.len(), 1);
        assert_eq!(draws[0].pipeline, "textured quad");
        assert!((app.angle - 0.4).abs() < 1e-6);
        lifecycle.on_close().unwrap();
    }

    #[test]
    fn encoded_image_is_decoded_during_load() {
        let mut lifecycle = Lifecycle::new(SessionConfig::default());
        let mut app = TexturedQuad::new(TextureSource::Encoded(encode_png(&checkerboard(4, 2))));

        lifecycle.on_load(&mut app, HeadlessBackend::new(), (), 640, 480).unwrap();
        let registry = lifecycle.registry();
        let diffuse = registry
            .release_order()
            .into_iter()
            .find_map(|key| match key {
                ResourceKey::Texture(id) if registry.label(key) == Some("diffuse") => Some(id),
                _ => None,
            })
            .unwrap();
        assert_eq!(registry.texture_size(diffuse), Ok((4, 4)));
        lifecycle.on_close().unwrap();
    }

    #[test]
    fn undecodable_bytes_fail_the_load() {
        let mut lifecycle = Lifecycle::new(SessionConfig::default());
        let mut app = TexturedQuad::new(TextureSource::Encoded(b"not an image".to_vec()));
        let err = lifecycle
            .on_load(&mut app, HeadlessBackend::new(), (), 640, 480)
            .unwrap_err();
        assert!(matches!(err, GpuError::ImageDecode(_)));
    }

    #[test]
    fn rotation_keeps_the_quad_in_front_of_the_camera() {
        let mut app = TexturedQuad::new(TextureSource::Decoded(checkerboard(1, 1)));
        app.angle = 1.0;
        let clip = app.mvp(4.0 / 3.0) * glam::Vec4::new(0.0, 0.0, 0.0, 1.0);
        let depth = clip.z / clip.w;
        assert!((0.0..=1.0).contains(&depth));
    }
}
