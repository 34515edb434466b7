use crate::backend::{Backend, NativeBatch, NativeDepthAttachment, NativePass};
use crate::device::DeviceSession;
use crate::error::{AcquireFailure, GpuError, Result};
use crate::resource::{ResourceKey, ResourceRegistry};
use crate::surface::Swapchain;

use super::{Draw, DrawBatch, DrawList};

/// Where the renderer is in its per-frame cycle.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum FrameState {
    Idle,
    Acquiring,
    Encoding,
    Submitting,
    Presenting,
    /// Acquisition failed recoverably; the swapchain is being reconfigured.
    SwapchainStale,
}

/// How a render tick ended.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum FrameOutcome {
    /// One render pass submitted and presented.
    Presented,
    /// Submitted, but the present call failed; the swapchain was reconfigured.
    PresentFailed,
    /// Acquisition failed recoverably; the swapchain was reconfigured and
    /// nothing was drawn.
    Skipped(AcquireFailure),
    /// The surface has no area; nothing was acquired.
    Suspended,
}

/// Runs the acquire, encode, submit and present cycle, one frame per call.
#[derive(Debug)]
pub struct FrameRenderer {
    state: FrameState,
    presented: u64,
    skipped: u64,
}

impl Default for FrameRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameRenderer {
    pub fn new() -> Self {
        Self {
            state: FrameState::Idle,
            presented: 0,
            skipped: 0,
        }
    }

    pub fn state(&self) -> FrameState {
        self.state
    }

    /// Frames that reached the present call.
    pub fn frames_presented(&self) -> u64 {
        self.presented
    }

    pub fn frames_skipped(&self) -> u64 {
        self.skipped
    }

    fn transition(&mut self, next: FrameState) {
        log::trace!("frame: {:?} -> {next:?}", self.state);
        self.state = next;
    }

    /// Renders `list` into the next surface texture.
    ///
    /// Recoverable acquisition failures reconfigure the swapchain once and
    /// skip the frame; the caller retries on its next tick. Every per-frame
    /// handle is released before this returns, whatever the outcome.
    pub fn render<B: Backend>(
        &mut self,
        session: &DeviceSession<B>,
        registry: &ResourceRegistry<B>,
        swapchain: &mut Swapchain<B>,
        list: &DrawList,
        clear_color: wgpu::Color,
    ) -> Result<FrameOutcome> {
        if swapchain.is_suspended() {
            return Ok(FrameOutcome::Suspended);
        }

        let surface = swapchain.format();
        let batches = list
            .batches()
            .iter()
            .map(|batch| resolve_batch(registry, surface, batch))
            .collect::<Result<Vec<_>>>()?;
        let depth_tested = depth_tested(registry, list)?;

        let backend = session.backend();

        self.transition(FrameState::Acquiring);
        let texture = match backend.acquire(session.surface()) {
            Ok(texture) => texture,
            Err(failure) if failure.is_recoverable() => {
                self.transition(FrameState::SwapchainStale);
                log::warn!("frame skipped: surface acquisition returned {failure:?}");
                let reconfigured = swapchain.reconfigure(session);
                self.skipped += 1;
                self.transition(FrameState::Idle);
                reconfigured?;
                return Ok(FrameOutcome::Skipped(failure));
            }
            Err(failure) => {
                self.transition(FrameState::Idle);
                let err = GpuError::from(failure);
                log::error!("{err}");
                return Err(err);
            }
        };

        self.transition(FrameState::Encoding);
        let view = backend.surface_view(&texture);
        let mut encoder = backend.create_encoder(session.device(), "ember frame encoder");
        let depth = swapchain
            .depth_view()
            .zip(swapchain.depth_format())
            .filter(|_| depth_tested)
            .map(|(view, format)| NativeDepthAttachment { view, format });
        backend.encode_render_pass(
            &mut encoder,
            &NativePass {
                label: "ember frame pass",
                color_view: &view,
                clear_color,
                depth,
                batches,
            },
        );

        self.transition(FrameState::Submitting);
        let commands = backend.finish(encoder);
        backend.submit(session.queue(), commands);

        self.transition(FrameState::Presenting);
        let presented = backend.present(texture);
        drop(view);
        self.presented += 1;
        self.transition(FrameState::Idle);

        match presented {
            Ok(()) => Ok(FrameOutcome::Presented),
            Err(failure) => {
                log::warn!("present failed ({}), reconfiguring", failure.0);
                swapchain.reconfigure(session)?;
                Ok(FrameOutcome::PresentFailed)
            }
        }
    }
}

/// Whether the pass carries the depth attachment.
///
/// Every pipeline in one pass must agree; an empty list draws without depth.
fn depth_tested<B: Backend>(registry: &ResourceRegistry<B>, list: &DrawList) -> Result<bool> {
    let mut first: Option<(bool, &str)> = None;
    for batch in list.batches() {
        let pipeline = registry
            .pipelines
            .get(batch.pipeline)
            .ok_or(GpuError::UnknownResource("pipeline"))?;
        let tested = pipeline.meta.recipe.depth_state().is_some();
        match first {
            None => first = Some((tested, pipeline.label.as_str())),
            Some((seen, label)) if seen != tested => {
                let (depth_tested, untested) = if seen {
                    (label, pipeline.label.as_str())
                } else {
                    (pipeline.label.as_str(), label)
                };
                return Err(GpuError::MixedDepthPass {
                    depth_tested: depth_tested.to_string(),
                    untested: untested.to_string(),
                });
            }
            Some(_) => {}
        }
    }
    Ok(first.is_some_and(|(tested, _)| tested))
}

/// Checks a batch against its pipeline and resolves every id to a native handle.
fn resolve_batch<'r, B: Backend>(
    registry: &'r ResourceRegistry<B>,
    surface: wgpu::TextureFormat,
    batch: &'r DrawBatch,
) -> Result<NativeBatch<'r, B>> {
    let pipeline = registry
        .pipelines
        .get(batch.pipeline)
        .ok_or(GpuError::UnknownResource("pipeline"))?;
    if pipeline.meta.color_format != surface {
        return Err(GpuError::ColorFormatMismatch {
            pipeline: pipeline.meta.color_format,
            surface,
        });
    }
    let recipe = &pipeline.meta.recipe;

    // Bind groups: exactly the pipeline's layouts, index for index.
    let layouts = recipe.bind_group_layouts();
    let mut bind_groups = Vec::with_capacity(batch.bind_groups.len());
    for &(index, id) in &batch.bind_groups {
        let group = registry
            .bind_groups
            .get(id)
            .ok_or(GpuError::UnknownResource("bind group"))?;
        match layouts.get(index as usize) {
            Some(&layout) if layout == group.meta.layout => {}
            _ => return Err(GpuError::BindGroupLayoutMismatch { index }),
        }
        for dep in &group.deps {
            check_alive(registry, *dep)?;
        }
        bind_groups.push((index, &group.handle));
    }
    for index in 0..layouts.len() as u32 {
        if !batch.bind_groups.iter().any(|(i, _)| *i == index) {
            return Err(GpuError::MissingBindGroup { index });
        }
    }

    // Vertex buffers: every declared slot bound, with vertex usage.
    let vertex_layouts = recipe.vertex_buffers();
    let mut vertex_buffers = Vec::with_capacity(vertex_layouts.len());
    let mut vertex_sizes = vec![0u64; vertex_layouts.len()];
    for &(slot, id) in &batch.vertex_buffers {
        let buffer = registry.live_buffer(id)?;
        if !buffer.meta.usage.contains(wgpu::BufferUsages::VERTEX) {
            return Err(GpuError::UsageMismatch {
                resource: buffer.label.clone(),
                operation: "vertex buffer binding",
            });
        }
        let size = vertex_sizes.get_mut(slot as usize).ok_or_else(|| {
            GpuError::InvalidVertexLayout(format!(
                "vertex buffer bound at slot {slot}, pipeline `{}` declares {}",
                recipe.label(),
                vertex_layouts.len()
            ))
        })?;
        *size = buffer.meta.size;
        vertex_buffers.push((slot, &buffer.handle));
    }
    for slot in 0..vertex_layouts.len() as u32 {
        if !batch.vertex_buffers.iter().any(|(s, _)| *s == slot) {
            return Err(GpuError::InvalidVertexLayout(format!(
                "pipeline `{}` reads vertex slot {slot}, which is not bound",
                recipe.label()
            )));
        }
    }

    let index_buffer = match batch.index_buffer {
        Some((id, format)) => {
            let buffer = registry.live_buffer(id)?;
            if !buffer.meta.usage.contains(wgpu::BufferUsages::INDEX) {
                return Err(GpuError::UsageMismatch {
                    resource: buffer.label.clone(),
                    operation: "index buffer binding",
                });
            }
            Some((buffer, format))
        }
        None => None,
    };

    // Draw ranges must stay inside the bound buffers.
    let fits = |range: &std::ops::Range<u32>, step: wgpu::VertexStepMode| -> Result<()> {
        if range.end <= range.start {
            return Ok(());
        }
        for (layout, size) in vertex_layouts.iter().zip(&vertex_sizes) {
            if layout.step_mode == step && u64::from(range.end) * layout.stride > *size {
                return Err(GpuError::VertexRangeOutOfBounds(format!(
                    "{:?} range {range:?} reads past a {size}-byte buffer of stride {}",
                    step, layout.stride
                )));
            }
        }
        Ok(())
    };
    for draw in &batch.draws {
        match draw {
            Draw::NonIndexed {
                vertices,
                instances,
            } => {
                fits(vertices, wgpu::VertexStepMode::Vertex)?;
                fits(instances, wgpu::VertexStepMode::Instance)?;
            }
            Draw::Indexed {
                indices, instances, ..
            } => {
                let (buffer, format) = index_buffer.ok_or_else(|| {
                    GpuError::VertexRangeOutOfBounds("indexed draw without an index buffer".into())
                })?;
                let index_size = match format {
                    wgpu::IndexFormat::Uint16 => 2,
                    wgpu::IndexFormat::Uint32 => 4,
                };
                if u64::from(indices.end) * index_size > buffer.meta.size {
                    return Err(GpuError::VertexRangeOutOfBounds(format!(
                        "indices {indices:?} read past a {}-byte index buffer",
                        buffer.meta.size
                    )));
                }
                fits(instances, wgpu::VertexStepMode::Instance)?;
            }
        }
    }

    Ok(NativeBatch {
        pipeline: &pipeline.handle,
        bind_groups,
        vertex_buffers,
        index_buffer: index_buffer.map(|(buffer, format)| (&buffer.handle, format)),
        draws: &batch.draws,
    })
}

/// Fails when a resource a bind group references was destroyed.
fn check_alive<B: Backend>(registry: &ResourceRegistry<B>, key: ResourceKey) -> Result<()> {
    match key {
        ResourceKey::Buffer(id) => registry.live_buffer(id).map(drop),
        ResourceKey::TextureView(id) => {
            let texture = registry.view_texture(id)?;
            check_alive(registry, texture.into())
        }
        ResourceKey::Texture(id) => {
            let entry = registry
                .textures
                .get(id)
                .ok_or(GpuError::UnknownResource("texture"))?;
            if entry.meta.destroyed {
                return Err(GpuError::ResourceDestroyed(entry.label.clone()));
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::headless::{Event, HeadlessBackend, HeadlessProbe};
    use crate::backend::{BindingLayoutEntry, BufferDesc, ShaderSource};
    use crate::device::SessionConfig;
    use crate::pipeline::{BlendMode, DepthState, PipelineBuilder, VertexBufferLayout};
    use crate::resource::{BindGroupEntry, BufferId, PipelineId};

    const SHADER: &str = "@vertex fn vs_main() {} @fragment fn fs_main() {}";

    struct Fixture {
        session: DeviceSession<HeadlessBackend>,
        registry: ResourceRegistry<HeadlessBackend>,
        swapchain: Swapchain<HeadlessBackend>,
        renderer: FrameRenderer,
        probe: HeadlessProbe,
    }

    impl Fixture {
        fn new() -> Self {
            Self::with_config(SessionConfig::default())
        }

        fn with_config(config: SessionConfig) -> Self {
            let backend = HeadlessBackend::new();
            let probe = backend.probe();
            let session = pollster::block_on(DeviceSession::negotiate(backend, (), &config)).unwrap();
            let mut swapchain = Swapchain::prepare(&session, &config).unwrap();
            swapchain.configure(&session, 800, 600).unwrap();
            probe.clear();
            Self {
                session,
                registry: ResourceRegistry::new(),
                swapchain,
                renderer: FrameRenderer::new(),
                probe,
            }
        }

        fn vertex_buffer(&mut self, size: u64) -> BufferId {
            self.registry
                .create_buffer(
                    &self.session,
                    &BufferDesc {
                        label: Some("vertices"),
                        size,
                        usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
                    },
                )
                .unwrap()
        }

        fn triangle_pipeline(&mut self) -> PipelineId {
            PipelineBuilder::new("triangle", ShaderSource::wgsl(SHADER))
                .vertex_buffer(
                    VertexBufferLayout::new(12).attribute(wgpu::VertexFormat::Float32x3, 0, 0),
                )
                .blend(BlendMode::Replace)
                .build(&self.session, &mut self.registry, &self.swapchain)
                .unwrap()
        }

        fn depth_pipeline(&mut self, format: wgpu::TextureFormat) -> PipelineId {
            PipelineBuilder::new("depth tested", ShaderSource::wgsl(SHADER))
                .vertex_buffer(
                    VertexBufferLayout::new(12).attribute(wgpu::VertexFormat::Float32x3, 0, 0),
                )
                .blend(BlendMode::Replace)
                .depth(DepthState::new(format))
                .build(&self.session, &mut self.registry, &self.swapchain)
                .unwrap()
        }

        fn render(&mut self, list: &DrawList) -> Result<FrameOutcome> {
            self.renderer.render(
                &self.session,
                &self.registry,
                &mut self.swapchain,
                list,
                wgpu::Color::BLACK,
            )
        }
    }

    fn triangle_list(pipeline: PipelineId, vbo: BufferId) -> DrawList {
        let mut list = DrawList::new();
        list.batch(pipeline).vertex_buffer(0, vbo).draw(0..3, 0..1);
        list
    }

    // ── success path ──────────────────────────────────────────────────────

    #[test]
    fn success_encodes_one_pass_and_presents() {
        let mut fx = Fixture::new();
        let vbo = fx.vertex_buffer(36);
        let pipeline = fx.triangle_pipeline();

        let outcome = fx.render(&triangle_list(pipeline, vbo)).unwrap();

        assert_eq!(outcome, FrameOutcome::Presented);
        assert_eq!(fx.probe.configure_count(), 0);
        assert_eq!(fx.probe.render_pass_count(), 1);
        assert_eq!(fx.probe.draw_count(), 1);
        assert_eq!(fx.probe.submit_count(), 1);
        assert_eq!(fx.probe.present_count(), 1);
        assert_eq!(fx.renderer.state(), FrameState::Idle);
        assert_eq!(fx.probe.render_passes()[0].target_size, (800, 600));
    }

    #[test]
    fn transients_are_released_every_frame() {
        let mut fx = Fixture::new();
        fx.render(&DrawList::new()).unwrap();
        let labels = fx.probe.released_labels();
        for transient in ["ember frame encoder", "command buffer", "surface texture", "surface view"] {
            assert!(labels.iter().any(|l| l == transient), "{transient} not released");
        }
    }

    // ── acquisition failures ──────────────────────────────────────────────

    #[test]
    fn recoverable_failures_reconfigure_once_and_skip() {
        for failure in [AcquireFailure::Timeout, AcquireFailure::Outdated, AcquireFailure::Lost] {
            let mut fx = Fixture::new();
            let vbo = fx.vertex_buffer(36);
            let pipeline = fx.triangle_pipeline();
            fx.probe.fail_next_acquire(failure);

            let outcome = fx.render(&triangle_list(pipeline, vbo)).unwrap();

            assert_eq!(outcome, FrameOutcome::Skipped(failure));
            assert_eq!(fx.probe.configure_count(), 1);
            assert_eq!(fx.probe.draw_count(), 0);
            assert_eq!(fx.probe.submit_count(), 0);
            assert_eq!(fx.renderer.frames_skipped(), 1);
        }
    }

    #[test]
    fn fatal_failures_propagate() {
        let mut fx = Fixture::new();
        fx.probe.fail_next_acquire(AcquireFailure::OutOfMemory);
        assert_eq!(fx.render(&DrawList::new()), Err(GpuError::OutOfMemory));

        fx.probe.fail_next_acquire(AcquireFailure::DeviceLost);
        assert!(fx.render(&DrawList::new()).unwrap_err().is_fatal());
        assert_eq!(fx.probe.configure_count(), 0);
    }

    #[test]
    fn present_failure_reconfigures() {
        let mut fx = Fixture::new();
        fx.probe.fail_next_present();
        assert_eq!(fx.render(&DrawList::new()), Ok(FrameOutcome::PresentFailed));
        assert_eq!(fx.probe.configure_count(), 1);
        assert!(fx.probe.released_labels().iter().any(|l| l == "surface texture"));
    }

    #[test]
    fn suspended_surface_is_not_acquired() {
        let mut fx = Fixture::new();
        fx.swapchain.configure(&fx.session, 0, 0).unwrap();
        assert_eq!(fx.render(&DrawList::new()), Ok(FrameOutcome::Suspended));
        assert!(fx.probe.events().is_empty());
    }

    // ── draw list validation ──────────────────────────────────────────────

    #[test]
    fn out_of_range_draw_is_rejected_before_acquire() {
        let mut fx = Fixture::new();
        let vbo = fx.vertex_buffer(24);
        let pipeline = fx.triangle_pipeline();

        let err = fx.render(&triangle_list(pipeline, vbo)).unwrap_err();
        assert!(matches!(err, GpuError::VertexRangeOutOfBounds(_)));
        assert!(!fx.probe.events().contains(&Event::Acquired));
        assert_eq!(fx.renderer.state(), FrameState::Idle);
    }

    #[test]
    fn pipeline_for_a_previous_surface_format_is_rejected() {
        let mut fx = Fixture::new();
        let vbo = fx.vertex_buffer(36);
        let pipeline = fx.triangle_pipeline();
        let built_for = fx.swapchain.format();

        fx.probe.set_surface_formats(vec![wgpu::TextureFormat::Rgba8UnormSrgb]);
        fx.swapchain.reconfigure(&fx.session).unwrap();
        fx.probe.clear();

        assert_eq!(
            fx.render(&triangle_list(pipeline, vbo)),
            Err(GpuError::ColorFormatMismatch {
                pipeline: built_for,
                surface: wgpu::TextureFormat::Rgba8UnormSrgb,
            })
        );
        assert!(!fx.probe.events().contains(&Event::Acquired));
    }

    #[test]
    fn depth_attachment_is_used_only_by_depth_tested_passes() {
        let format = wgpu::TextureFormat::Depth24Plus;
        let mut fx = Fixture::with_config(SessionConfig::default().with_depth(format));
        let vbo = fx.vertex_buffer(36);
        let flat = fx.triangle_pipeline();
        let tested = fx.depth_pipeline(format);

        fx.render(&triangle_list(flat, vbo)).unwrap();
        fx.render(&triangle_list(tested, vbo)).unwrap();
        let passes = fx.probe.render_passes();
        assert_eq!(passes[0].depth_format, None);
        assert_eq!(passes[1].depth_format, Some(format));
    }

    #[test]
    fn mixed_depth_pass_is_rejected_before_acquire() {
        let format = wgpu::TextureFormat::Depth24Plus;
        let mut fx = Fixture::with_config(SessionConfig::default().with_depth(format));
        let vbo = fx.vertex_buffer(36);
        let flat = fx.triangle_pipeline();
        let tested = fx.depth_pipeline(format);

        let mut list = DrawList::new();
        list.batch(flat).vertex_buffer(0, vbo).draw(0..3, 0..1);
        list.batch(tested).vertex_buffer(0, vbo).draw(0..3, 0..1);

        let err = fx.render(&list).unwrap_err();
        assert_eq!(
            err,
            GpuError::MixedDepthPass {
                depth_tested: "depth tested".into(),
                untested: "triangle".into(),
            }
        );
        assert!(!err.is_fatal());
        assert!(!fx.probe.events().contains(&Event::Acquired));
    }

    #[test]
    fn unbound_vertex_slot_is_rejected() {
        let mut fx = Fixture::new();
        let pipeline = fx.triangle_pipeline();
        let mut list = DrawList::new();
        list.batch(pipeline).draw(0..3, 0..1);
        assert!(matches!(fx.render(&list), Err(GpuError::InvalidVertexLayout(_))));
    }

    #[test]
    fn missing_bind_group_is_rejected() {
        let mut fx = Fixture::new();
        let layout = fx
            .registry
            .create_bind_group_layout(
                &fx.session,
                Some("globals"),
                &[BindingLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                }],
            )
            .unwrap();
        let other = fx
            .registry
            .create_bind_group_layout(&fx.session, Some("other"), &[])
            .unwrap();
        let pipeline = PipelineBuilder::new("lit", ShaderSource::wgsl(SHADER))
            .bind_group_layout(layout)
            .blend(BlendMode::Replace)
            .build(&fx.session, &mut fx.registry, &fx.swapchain)
            .unwrap();

        let mut list = DrawList::new();
        list.batch(pipeline).draw(0..3, 0..1);
        assert_eq!(fx.render(&list), Err(GpuError::MissingBindGroup { index: 0 }));

        let group = fx
            .registry
            .create_bind_group(&fx.session, None, other, &[])
            .unwrap();
        let mut list = DrawList::new();
        list.batch(pipeline).bind_group(0, group).draw(0..3, 0..1);
        assert_eq!(fx.render(&list), Err(GpuError::BindGroupLayoutMismatch { index: 0 }));
    }

    #[test]
    fn destroyed_binding_is_rejected_at_draw() {
        let mut fx = Fixture::new();
        let layout = fx
            .registry
            .create_bind_group_layout(
                &fx.session,
                None,
                &[BindingLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                }],
            )
            .unwrap();
        let ubo = fx
            .registry
            .create_buffer(
                &fx.session,
                &BufferDesc {
                    label: Some("globals"),
                    size: 64,
                    usage: wgpu::BufferUsages::UNIFORM,
                },
            )
            .unwrap();
        let group = fx
            .registry
            .create_bind_group(&fx.session, None, layout, &[BindGroupEntry::buffer(0, ubo)])
            .unwrap();
        let pipeline = PipelineBuilder::new("lit", ShaderSource::wgsl(SHADER))
            .bind_group_layout(layout)
            .blend(BlendMode::Replace)
            .build(&fx.session, &mut fx.registry, &fx.swapchain)
            .unwrap();
        fx.registry.destroy_buffer(&fx.session, ubo).unwrap();

        let mut list = DrawList::new();
        list.batch(pipeline).bind_group(0, group).draw(0..3, 0..1);
        assert_eq!(
            fx.render(&list),
            Err(GpuError::ResourceDestroyed("globals".into()))
        );
    }

    #[test]
    fn indexed_draw_needs_index_buffer() {
        let mut fx = Fixture::new();
        let vbo = fx.vertex_buffer(48);
        let pipeline = fx.triangle_pipeline();
        let mut list = DrawList::new();
        list.batch(pipeline).vertex_buffer(0, vbo).draw_indexed(0..6, 0, 0..1);
        assert!(matches!(fx.render(&list), Err(GpuError::VertexRangeOutOfBounds(_))));
    }
}
