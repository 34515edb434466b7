use crate::backend::Backend;
use crate::device::{DeviceSession, SessionConfig};
use crate::error::{GpuError, Result};
use crate::frame::{DrawList, FrameOutcome, FrameRenderer};
use crate::pipeline::rebuild_stale;
use crate::resource::ResourceRegistry;
use crate::surface::{ConfigureOutcome, Swapchain};

use super::app::{App, GpuCtx};

/// Where a [`Lifecycle`] stands between `on_load` and `on_close`.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Phase {
    Unloaded,
    Running,
    /// A fatal error occurred; only `on_close` is accepted.
    Terminated,
    Closed,
}

impl Phase {
    pub fn name(self) -> &'static str {
        match self {
            Phase::Unloaded => "unloaded",
            Phase::Running => "running",
            Phase::Terminated => "terminated",
            Phase::Closed => "closed",
        }
    }
}

/// Orders component startup, per-tick work and teardown for one session.
///
/// Startup: instance, surface, adapter, device and queue (negotiation), then
/// the application's resources and pipelines, then the first surface
/// configuration. Teardown runs the same chain backwards.
///
/// Fields are declared in teardown order so that dropping a lifecycle that
/// was never closed still releases dependents first.
pub struct Lifecycle<B: Backend> {
    renderer: FrameRenderer,
    draw_list: DrawList,
    registry: ResourceRegistry<B>,
    swapchain: Option<Swapchain<B>>,
    session: Option<DeviceSession<B>>,

    config: SessionConfig,
    phase: Phase,
}

impl<B: Backend> Lifecycle<B> {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            renderer: FrameRenderer::new(),
            draw_list: DrawList::new(),
            registry: ResourceRegistry::new(),
            swapchain: None,
            session: None,
            config,
            phase: Phase::Unloaded,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn session(&self) -> Option<&DeviceSession<B>> {
        self.session.as_ref()
    }

    pub fn swapchain(&self) -> Option<&Swapchain<B>> {
        self.swapchain.as_ref()
    }

    pub fn registry(&self) -> &ResourceRegistry<B> {
        &self.registry
    }

    pub fn renderer(&self) -> &FrameRenderer {
        &self.renderer
    }

    /// Context for work outside the hooks (tests, tools).
    pub fn ctx(&mut self) -> Result<GpuCtx<'_, B>> {
        match (&self.session, &self.swapchain) {
            (Some(session), Some(swapchain)) => Ok(GpuCtx {
                session,
                registry: &mut self.registry,
                swapchain,
            }),
            _ => Err(self.phase_error("ctx")),
        }
    }

    // ── hooks ─────────────────────────────────────────────────────────────

    /// Negotiates the session, loads `app`, then configures the surface at
    /// `width` x `height`.
    ///
    /// Any failure releases whatever was created and terminates the lifecycle.
    pub fn on_load<A: App<B>>(
        &mut self,
        app: &mut A,
        backend: B,
        target: B::Target,
        width: u32,
        height: u32,
    ) -> Result<()> {
        self.expect_phase("load", Phase::Unloaded)?;
        log::info!("lifecycle: loading");

        match self.load(app, backend, target, width, height) {
            Ok(()) => {
                self.phase = Phase::Running;
                log::info!("lifecycle: running");
                Ok(())
            }
            Err(err) => {
                log::error!("load failed: {err}");
                self.teardown();
                self.phase = Phase::Terminated;
                Err(err)
            }
        }
    }

    /// Routes a new window size to the swapchain.
    ///
    /// Pipelines are rebuilt when the reconfiguration changed the surface format.
    pub fn on_resize(&mut self, width: u32, height: u32) -> Result<ConfigureOutcome> {
        self.expect_phase("resize", Phase::Running)?;
        let result = self.resize(width, height);
        result.map_err(|err| self.escalate(err))
    }

    /// Runs one update and one frame.
    ///
    /// Recoverable surface failures are absorbed here and reported as a
    /// skipped frame.
    pub fn on_render_tick<A: App<B>>(&mut self, app: &mut A, dt: f32) -> Result<FrameOutcome> {
        self.expect_phase("render tick", Phase::Running)?;
        let result = self.tick(app, dt);
        result.map_err(|err| self.escalate(err))
    }

    /// Waits for the GPU, then releases everything in reverse startup order.
    ///
    /// Accepted in every phase but `Closed`, including after termination.
    pub fn on_close(&mut self) -> Result<()> {
        if self.phase == Phase::Closed {
            return Err(self.phase_error("close"));
        }
        self.teardown();
        self.phase = Phase::Closed;
        log::info!("lifecycle: closed");
        Ok(())
    }

    // ── internals ─────────────────────────────────────────────────────────

    fn load<A: App<B>>(
        &mut self,
        app: &mut A,
        backend: B,
        target: B::Target,
        width: u32,
        height: u32,
    ) -> Result<()> {
        let session = pollster::block_on(DeviceSession::negotiate(backend, target, &self.config))?;
        let session = self.session.insert(session);

        let swapchain = Swapchain::prepare(session, &self.config)?;
        let swapchain = self.swapchain.insert(swapchain);

        app.load(&mut GpuCtx {
            session,
            registry: &mut self.registry,
            swapchain,
        })?;
        log::debug!("application loaded {} object(s)", self.registry.len());

        swapchain.configure(session, width, height)?;
        session.check_health()
    }

    fn resize(&mut self, width: u32, height: u32) -> Result<ConfigureOutcome> {
        let (Some(session), Some(swapchain)) = (&self.session, &mut self.swapchain) else {
            return Err(GpuError::SessionTerminated);
        };

        let outcome = swapchain.configure(session, width, height)?;
        if outcome == (ConfigureOutcome::Configured { format_changed: true }) {
            let rebuilt = rebuild_stale(session, &mut self.registry, swapchain)?;
            log::info!("surface format changed; rebuilt {rebuilt} pipeline(s)");
        }
        Ok(outcome)
    }

    fn tick<A: App<B>>(&mut self, app: &mut A, dt: f32) -> Result<FrameOutcome> {
        let (Some(session), Some(swapchain)) = (&self.session, &mut self.swapchain) else {
            return Err(GpuError::SessionTerminated);
        };

        session.check_health()?;

        app.update(
            &mut GpuCtx {
                session,
                registry: &mut self.registry,
                swapchain,
            },
            dt,
        )?;

        self.draw_list.clear();
        app.draw(&mut self.draw_list);

        let outcome = self.renderer.render(
            session,
            &self.registry,
            swapchain,
            &self.draw_list,
            self.config.clear_color,
        )?;

        // The frame path may have reconfigured the surface.
        if matches!(outcome, FrameOutcome::Skipped(_) | FrameOutcome::PresentFailed) {
            let rebuilt = rebuild_stale(session, &mut self.registry, swapchain)?;
            if rebuilt > 0 {
                log::info!("surface format changed; rebuilt {rebuilt} pipeline(s)");
            }
        }

        session.check_health()?;
        Ok(outcome)
    }

    fn teardown(&mut self) {
        if let Some(session) = &self.session {
            session.wait_idle();
        }
        self.draw_list.clear();

        if let Some(swapchain) = &mut self.swapchain {
            swapchain.release_depth();
        }
        if let Some(session) = &self.session {
            self.registry.release_all(session.backend());
        }
        self.swapchain = None;

        if let Some(session) = self.session.take() {
            session.shutdown();
        }
    }

    fn escalate(&mut self, err: GpuError) -> GpuError {
        if err.is_fatal() && self.phase == Phase::Running {
            log::error!("session terminated: {err}");
            self.phase = Phase::Terminated;
        }
        err
    }

    fn expect_phase(&self, operation: &'static str, expected: Phase) -> Result<()> {
        if self.phase == expected {
            Ok(())
        } else {
            Err(self.phase_error(operation))
        }
    }

    fn phase_error(&self, operation: &'static str) -> GpuError {
        match self.phase {
            Phase::Terminated => GpuError::SessionTerminated,
            phase => GpuError::InvalidPhase {
                operation,
                phase: phase.name(),
            },
        }
    }
}

impl<B: Backend> Drop for Lifecycle<B> {
    fn drop(&mut self) {
        if self.phase != Phase::Closed {
            self.teardown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::headless::{HeadlessBackend, HeadlessProbe};
    use crate::backend::{BufferDesc, ShaderSource};
    use crate::error::AcquireFailure;
    use crate::pipeline::{BlendMode, DepthState, PipelineBuilder, VertexBufferLayout};
    use crate::resource::{BufferId, PipelineId};

    const SHADER: &str = "@vertex fn vs_main() {} @fragment fn fs_main() {}";

    #[derive(Default)]
    struct Triangle {
        vertices: Option<BufferId>,
        pipeline: Option<PipelineId>,
        updates: u32,
        overrun: bool,
    }

    impl App<HeadlessBackend> for Triangle {
        fn load(&mut self, ctx: &mut GpuCtx<'_, HeadlessBackend>) -> Result<()> {
            let vertices = ctx.registry.create_buffer(
                ctx.session,
                &BufferDesc {
                    label: Some("vertices"),
                    size: 36,
                    usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
                },
            )?;
            let mut builder = PipelineBuilder::new("triangle", ShaderSource::wgsl(SHADER))
                .vertex_buffer(
                    VertexBufferLayout::new(12).with_attributes(&wgpu::vertex_attr_array![0 => Float32x3]),
                )
                .blend(BlendMode::Replace);
            if let Some(format) = ctx.depth_format() {
                builder = builder.depth(DepthState::new(format));
            }
            let pipeline = ctx.build_pipeline(builder)?;
            self.vertices = Some(vertices);
            self.pipeline = Some(pipeline);
            Ok(())
        }

        fn update(&mut self, ctx: &mut GpuCtx<'_, HeadlessBackend>, _dt: f32) -> Result<()> {
            self.updates += 1;
            if let (true, Some(vertices)) = (self.overrun, self.vertices) {
                ctx.registry.write_buffer(ctx.session, vertices, 0, &[0; 40])?;
            }
            Ok(())
        }

        fn draw(&self, list: &mut DrawList) {
            if let (Some(pipeline), Some(vertices)) = (self.pipeline, self.vertices) {
                list.batch(pipeline).vertex_buffer(0, vertices).draw(0..3, 0..1);
            }
        }
    }

    fn loaded(config: SessionConfig) -> (Lifecycle<HeadlessBackend>, Triangle, HeadlessProbe) {
        let backend = HeadlessBackend::new();
        let probe = backend.probe();
        let mut lifecycle = Lifecycle::new(config);
        let mut app = Triangle::default();
        lifecycle.on_load(&mut app, backend, (), 640, 480).unwrap();
        (lifecycle, app, probe)
    }

    // ── phases ────────────────────────────────────────────────────────────

    #[test]
    fn hooks_before_load_are_rejected() {
        let mut lifecycle = Lifecycle::<HeadlessBackend>::new(SessionConfig::default());
        assert_eq!(
            lifecycle.on_resize(10, 10),
            Err(GpuError::InvalidPhase { operation: "resize", phase: "unloaded" })
        );
        assert!(lifecycle.ctx().is_err());
    }

    #[test]
    fn load_configures_once_and_runs() {
        let (lifecycle, _app, probe) = loaded(SessionConfig::default());
        assert_eq!(lifecycle.phase(), Phase::Running);
        assert_eq!(probe.configure_count(), 1);
        let config = probe.last_configure().unwrap();
        assert_eq!((config.width, config.height), (640, 480));
    }

    #[test]
    fn second_load_is_rejected() {
        let (mut lifecycle, mut app, _probe) = loaded(SessionConfig::default());
        let err = lifecycle
            .on_load(&mut app, HeadlessBackend::new(), (), 1, 1)
            .unwrap_err();
        assert_eq!(err, GpuError::InvalidPhase { operation: "load", phase: "running" });
    }

    #[test]
    fn failed_negotiation_terminates() {
        let backend = HeadlessBackend::new();
        backend.probe().fail_adapter("none");
        let mut lifecycle = Lifecycle::new(SessionConfig::default());
        let mut app = Triangle::default();

        let err = lifecycle.on_load(&mut app, backend, (), 640, 480).unwrap_err();
        assert!(matches!(err, GpuError::AdapterUnavailable(_)));
        assert_eq!(lifecycle.phase(), Phase::Terminated);
        assert_eq!(lifecycle.on_render_tick(&mut app, 0.016), Err(GpuError::SessionTerminated));
        assert!(lifecycle.on_close().is_ok());
    }

    // ── ticks ─────────────────────────────────────────────────────────────

    #[test]
    fn tick_updates_then_draws() {
        let (mut lifecycle, mut app, probe) = loaded(SessionConfig::default());
        assert_eq!(lifecycle.on_render_tick(&mut app, 0.016), Ok(FrameOutcome::Presented));
        assert_eq!(app.updates, 1);
        assert_eq!(probe.draw_count(), 1);
        assert_eq!(probe.present_count(), 1);
    }

    #[test]
    fn recoverable_acquire_is_absorbed() {
        let (mut lifecycle, mut app, probe) = loaded(SessionConfig::default());
        probe.fail_next_acquire(AcquireFailure::Timeout);

        let outcome = lifecycle.on_render_tick(&mut app, 0.016).unwrap();
        assert_eq!(outcome, FrameOutcome::Skipped(AcquireFailure::Timeout));
        assert_eq!(lifecycle.phase(), Phase::Running);
        assert_eq!(probe.configure_count(), 2);
    }

    #[test]
    fn device_loss_terminates() {
        let (mut lifecycle, mut app, probe) = loaded(SessionConfig::default());
        probe.inject_device_lost("driver reset");

        let err = lifecycle.on_render_tick(&mut app, 0.016).unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(lifecycle.phase(), Phase::Terminated);
        assert_eq!(lifecycle.on_resize(10, 10), Err(GpuError::SessionTerminated));
    }

    #[test]
    fn validation_errors_do_not_terminate() {
        let (mut lifecycle, mut app, probe) = loaded(SessionConfig::default());
        app.overrun = true;

        let err = lifecycle.on_render_tick(&mut app, 0.016).unwrap_err();
        assert!(matches!(err, GpuError::BufferOverrun { .. }));
        assert_eq!(lifecycle.phase(), Phase::Running);
        assert_eq!(probe.submit_count(), 0);

        app.overrun = false;
        assert_eq!(lifecycle.on_render_tick(&mut app, 0.016), Ok(FrameOutcome::Presented));
    }

    // ── resize ────────────────────────────────────────────────────────────

    #[test]
    fn format_change_rebuilds_pipelines() {
        let (mut lifecycle, mut app, probe) = loaded(SessionConfig::default());
        probe.set_surface_formats(vec![wgpu::TextureFormat::Rgba8UnormSrgb]);

        let outcome = lifecycle.on_resize(320, 240).unwrap();
        assert_eq!(outcome, ConfigureOutcome::Configured { format_changed: true });

        let pipeline = app.pipeline.unwrap();
        assert_eq!(
            lifecycle.registry().pipeline_format(pipeline),
            Ok(wgpu::TextureFormat::Rgba8UnormSrgb)
        );
        assert_eq!(lifecycle.on_render_tick(&mut app, 0.016), Ok(FrameOutcome::Presented));
    }

    // ── teardown ──────────────────────────────────────────────────────────

    #[test]
    fn close_releases_dependents_before_the_device_chain() {
        let (mut lifecycle, mut app, probe) =
            loaded(SessionConfig::default().with_depth(wgpu::TextureFormat::Depth32Float));
        lifecycle.on_render_tick(&mut app, 0.016).unwrap();
        probe.clear();

        lifecycle.on_close().unwrap();
        assert_eq!(lifecycle.phase(), Phase::Closed);

        let labels = probe.released_labels();
        let at = |label: &str| labels.iter().position(|l| l == label).unwrap();
        assert!(at("ember depth view") < at("ember depth"));
        assert!(at("triangle") < at("vertices"));
        assert!(at("vertices") < at("queue"));
        assert_eq!(
            labels[labels.len() - 5..],
            ["queue", "device", "adapter", "surface", "instance"]
        );
        assert!(lifecycle.registry().is_empty());
    }

    #[test]
    fn close_twice_is_rejected() {
        let (mut lifecycle, _app, _probe) = loaded(SessionConfig::default());
        lifecycle.on_close().unwrap();
        assert_eq!(
            lifecycle.on_close(),
            Err(GpuError::InvalidPhase { operation: "close", phase: "closed" })
        );
    }

    #[test]
    fn drop_without_close_still_tears_down() {
        let (lifecycle, _app, probe) = loaded(SessionConfig::default());
        drop(lifecycle);
        assert_eq!(probe.released_labels().last().map(String::as_str), Some("instance"));
    }
}
