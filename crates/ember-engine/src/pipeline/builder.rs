use crate::backend::{Backend, NativePipelineDesc, ShaderSource};
use crate::device::DeviceSession;
use crate::error::{GpuError, Result};
use crate::resource::{BindGroupLayoutId, PipelineId, ResourceKey, ResourceRegistry, ShaderModuleId};
use crate::surface::Swapchain;

use super::vertex::validate_vertex_state;
use super::{BlendMode, DepthState, VertexBufferLayout};

/// Where a pipeline's shader stages come from.
#[derive(Debug, Clone, PartialEq)]
pub enum ShaderInput {
    /// Compiled for this pipeline only.
    Source(ShaderSource),
    /// A module held by the registry; the pipeline keeps it alive.
    Module(ShaderModuleId),
}

/// Registry bookkeeping for a built pipeline.
pub(crate) struct PipelineMeta {
    /// What the pipeline was built from, replayed on rebuild.
    pub(crate) recipe: PipelineBuilder,
    pub(crate) color_format: wgpu::TextureFormat,
}

/// Describes a render pipeline and validates it against the swapchain.
///
/// Blending is always explicit: building without a [`BlendMode`] fails.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineBuilder {
    label: String,
    shader: ShaderInput,
    vertex_entry: String,
    fragment_entry: String,
    vertex_buffers: Vec<VertexBufferLayout>,
    bind_group_layouts: Vec<BindGroupLayoutId>,
    color_format: Option<wgpu::TextureFormat>,
    blend: Option<BlendMode>,
    write_mask: wgpu::ColorWrites,
    primitive: wgpu::PrimitiveState,
    depth: Option<DepthState>,
}

impl PipelineBuilder {
    /// A pipeline compiled from `source`, entry points `vs_main` / `fs_main`.
    pub fn new(label: impl Into<String>, source: ShaderSource) -> Self {
        Self::with_shader(label.into(), ShaderInput::Source(source))
    }

    /// A pipeline using a module created through the registry.
    pub fn from_module(label: impl Into<String>, module: ShaderModuleId) -> Self {
        Self::with_shader(label.into(), ShaderInput::Module(module))
    }

    fn with_shader(label: String, shader: ShaderInput) -> Self {
        Self {
            label,
            shader,
            vertex_entry: "vs_main".to_string(),
            fragment_entry: "fs_main".to_string(),
            vertex_buffers: Vec::new(),
            bind_group_layouts: Vec::new(),
            color_format: None,
            blend: None,
            write_mask: wgpu::ColorWrites::ALL,
            primitive: wgpu::PrimitiveState::default(),
            depth: None,
        }
    }

    pub fn entry_points(mut self, vertex: impl Into<String>, fragment: impl Into<String>) -> Self {
        self.vertex_entry = vertex.into();
        self.fragment_entry = fragment.into();
        self
    }

    /// Appends the layout of the next vertex buffer slot.
    pub fn vertex_buffer(mut self, layout: VertexBufferLayout) -> Self {
        self.vertex_buffers.push(layout);
        self
    }

    /// Appends the layout of the next bind group index.
    pub fn bind_group_layout(mut self, layout: BindGroupLayoutId) -> Self {
        self.bind_group_layouts.push(layout);
        self
    }

    /// Declares the color target format. Defaults to the surface format.
    pub fn color_format(mut self, format: wgpu::TextureFormat) -> Self {
        self.color_format = Some(format);
        self
    }

    pub fn blend(mut self, blend: BlendMode) -> Self {
        self.blend = Some(blend);
        self
    }

    pub fn write_mask(mut self, mask: wgpu::ColorWrites) -> Self {
        self.write_mask = mask;
        self
    }

    pub fn primitive(mut self, primitive: wgpu::PrimitiveState) -> Self {
        self.primitive = primitive;
        self
    }

    pub fn depth(mut self, depth: DepthState) -> Self {
        self.depth = Some(depth);
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub(crate) fn vertex_buffers(&self) -> &[VertexBufferLayout] {
        &self.vertex_buffers
    }

    pub(crate) fn bind_group_layouts(&self) -> &[BindGroupLayoutId] {
        &self.bind_group_layouts
    }

    pub(crate) fn depth_state(&self) -> Option<DepthState> {
        self.depth
    }

    /// Validates the description and registers the pipeline.
    ///
    /// A depth state whose format differs from the swapchain's depth
    /// attachment is fatal here rather than at draw time. A pipeline without
    /// a depth state builds either way and draws without depth testing.
    pub fn build<B: Backend>(
        self,
        session: &DeviceSession<B>,
        registry: &mut ResourceRegistry<B>,
        swapchain: &Swapchain<B>,
    ) -> Result<PipelineId> {
        let color_format = self.color_format.unwrap_or(swapchain.format());
        let (handle, deps) = self.compile(session, registry, swapchain)?;
        log::debug!("pipeline `{}` built for {color_format:?}", self.label);

        let label = self.label.clone();
        let meta = PipelineMeta {
            recipe: self,
            color_format,
        };
        let entry = registry.entry(handle, meta, label, deps);
        Ok(registry.pipelines.insert(entry))
    }

    fn compile<B: Backend>(
        &self,
        session: &DeviceSession<B>,
        registry: &ResourceRegistry<B>,
        swapchain: &Swapchain<B>,
    ) -> Result<(B::Pipeline, Vec<ResourceKey>)> {
        let blend = self
            .blend
            .ok_or_else(|| GpuError::MissingBlendState(self.label.clone()))?;

        let surface = swapchain.format();
        let color_format = self.color_format.unwrap_or(surface);
        if color_format != surface {
            return Err(GpuError::ColorFormatMismatch {
                pipeline: color_format,
                surface,
            });
        }

        if let Some(depth) = self.depth
            && Some(depth.format) != swapchain.depth_format()
        {
            let err = GpuError::DepthFormatMismatch {
                pipeline: Some(depth.format),
                swapchain: swapchain.depth_format(),
            };
            log::error!("pipeline `{}`: {err}", self.label);
            return Err(err);
        }

        let limits = &session.report().limits;
        validate_vertex_state(&self.vertex_buffers, limits)?;

        if self.bind_group_layouts.len() > limits.max_bind_groups as usize {
            return Err(GpuError::BindingMismatch(format!(
                "{} bind groups exceed the limit {}",
                self.bind_group_layouts.len(),
                limits.max_bind_groups
            )));
        }
        let mut deps: Vec<ResourceKey> = Vec::with_capacity(self.bind_group_layouts.len() + 1);
        let mut layouts = Vec::with_capacity(self.bind_group_layouts.len());
        for &id in &self.bind_group_layouts {
            let layout = registry
                .layouts
                .get(id)
                .ok_or(GpuError::UnknownResource("bind group layout"))?;
            layouts.push(&layout.handle);
            deps.push(id.into());
        }

        let backend = session.backend();
        let transient;
        let module = match &self.shader {
            ShaderInput::Source(source) => {
                let source = match source.label {
                    Some(_) => source.clone(),
                    None => source.clone().with_label(self.label.as_str()),
                };
                transient = backend.create_shader_module(session.device(), &source)?;
                &transient
            }
            ShaderInput::Module(id) => {
                let module = registry
                    .shaders
                    .get(*id)
                    .ok_or(GpuError::UnknownResource("shader module"))?;
                deps.push((*id).into());
                &module.handle
            }
        };

        let handle = backend.create_pipeline(
            session.device(),
            &NativePipelineDesc {
                label: &self.label,
                module,
                vertex_entry: &self.vertex_entry,
                fragment_entry: &self.fragment_entry,
                vertex_buffers: &self.vertex_buffers,
                bind_group_layouts: layouts,
                color_format,
                blend: Some(blend.to_state()),
                write_mask: self.write_mask,
                primitive: self.primitive,
                depth: self.depth,
                sample_count: 1,
            },
        );
        Ok((handle, deps))
    }
}

/// Rebuilds every pipeline whose color target no longer matches the surface.
///
/// Pipelines follow the surface: a rebuilt pipeline targets the current
/// format even if its recipe named the old one. Ids stay valid.
pub fn rebuild_stale<B: Backend>(
    session: &DeviceSession<B>,
    registry: &mut ResourceRegistry<B>,
    swapchain: &Swapchain<B>,
) -> Result<usize> {
    let format = swapchain.format();
    let stale: Vec<PipelineId> = registry
        .pipelines
        .iter()
        .filter(|(_, e)| e.meta.color_format != format)
        .map(|(id, _)| id)
        .collect();

    for &id in &stale {
        let mut recipe = registry.pipelines[id].meta.recipe.clone();
        recipe.color_format = None;
        let (handle, _) = recipe.compile(session, registry, swapchain)?;

        let entry = &mut registry.pipelines[id];
        entry.handle = handle;
        entry.meta.color_format = format;
        log::info!("pipeline `{}` rebuilt for {format:?}", entry.label);
    }
    Ok(stale.len())
}

impl<B: Backend> ResourceRegistry<B> {
    pub fn pipeline_handle(&self, id: PipelineId) -> Result<&B::Pipeline> {
        self.pipelines
            .get(id)
            .map(|e| &e.handle)
            .ok_or(GpuError::UnknownResource("pipeline"))
    }

    /// Color format the pipeline currently targets.
    pub fn pipeline_format(&self, id: PipelineId) -> Result<wgpu::TextureFormat> {
        self.pipelines
            .get(id)
            .map(|e| e.meta.color_format)
            .ok_or(GpuError::UnknownResource("pipeline"))
    }
}
