use anyhow::{Context, Result};
use ouroboros::self_referencing;

use winit::application::ApplicationHandler;
use winit::dpi::{LogicalSize, PhysicalSize};
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowId};

use crate::backend::wgpu_backend::WgpuBackend;
use crate::device::SessionConfig;
use crate::error::GpuError;
use crate::frame::FrameOutcome;
use crate::lifecycle::{App, Lifecycle};
use crate::time::FrameClock;

/// Window configuration.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub title: String,
    pub initial_size: LogicalSize<f64>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            title: "ember".to_string(),
            initial_size: LogicalSize::new(640.0, 480.0),
        }
    }
}

/// Drives one [`Lifecycle`] from a winit event loop.
///
/// Window events map onto the lifecycle hooks:
/// - window creation: `on_load`
/// - `Resized` / `ScaleFactorChanged`: `on_resize`
/// - `RedrawRequested`: `on_render_tick`
/// - `CloseRequested`: `on_close`
pub struct Runtime;

impl Runtime {
    /// Runs `app` until its window closes or the session terminates.
    pub fn run<A>(config: RuntimeConfig, session: SessionConfig, app: A) -> Result<()>
    where
        A: 'static + for<'w> App<WgpuBackend<'w>>,
    {
        let event_loop = EventLoop::new().context("failed to create winit EventLoop")?;
        let mut state = RuntimeState::new(config, session, app);

        event_loop
            .run_app(&mut state)
            .context("winit event loop terminated with error")?;

        match state.failure {
            Some(err) => Err(err).context("session terminated"),
            None => Ok(()),
        }
    }
}

#[self_referencing]
struct WindowEntry {
    clock: FrameClock,

    window: Window,

    #[borrows(window)]
    #[not_covariant]
    lifecycle: Lifecycle<WgpuBackend<'this>>,
}

struct RuntimeState<A> {
    config: RuntimeConfig,
    session: SessionConfig,
    app: A,

    entry: Option<WindowEntry>,
    failure: Option<GpuError>,
}

impl<A> RuntimeState<A>
where
    A: 'static + for<'w> App<WgpuBackend<'w>>,
{
    fn new(config: RuntimeConfig, session: SessionConfig, app: A) -> Self {
        Self {
            config,
            session,
            app,
            entry: None,
            failure: None,
        }
    }

    fn create_entry(&mut self, event_loop: &ActiveEventLoop) -> Result<WindowEntry> {
        let attrs = Window::default_attributes()
            .with_title(self.config.title.clone())
            .with_inner_size(self.config.initial_size);

        let window = event_loop
            .create_window(attrs)
            .context("failed to create window")?;

        let PhysicalSize { width, height } = window.inner_size();
        let backends = self.session.backends;
        let session = self.session.clone();
        let app = &mut self.app;

        let entry = WindowEntryTryBuilder {
            clock: FrameClock::default(),
            window,
            lifecycle_builder: |window| {
                let mut lifecycle = Lifecycle::new(session);
                lifecycle.on_load(app, WgpuBackend::new(backends), window.into(), width, height)?;
                Ok::<_, GpuError>(lifecycle)
            },
        }
        .try_build()
        .context("failed to load the GPU session")?;

        Ok(entry)
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: GpuError) {
        log::error!("{err}");
        self.close(event_loop);
        self.failure = Some(err);
    }

    fn close(&mut self, event_loop: &ActiveEventLoop) {
        if let Some(mut entry) = self.entry.take() {
            if let Err(err) = entry.with_lifecycle_mut(|lifecycle| lifecycle.on_close()) {
                log::warn!("close: {err}");
            }
        }
        event_loop.exit();
    }

    fn resize(&mut self, event_loop: &ActiveEventLoop, size: PhysicalSize<u32>) {
        let Some(entry) = self.entry.as_mut() else {
            return;
        };

        let result = entry.with_lifecycle_mut(|lifecycle| lifecycle.on_resize(size.width, size.height));
        match result {
            Ok(_) => entry.with_window(|w| w.request_redraw()),
            Err(err) if err.is_fatal() => self.fail(event_loop, err),
            Err(err) => log::error!("resize: {err}"),
        }
    }

    fn redraw(&mut self, event_loop: &ActiveEventLoop) {
        // Split borrows to avoid `self` capture inside `ouroboros` closures.
        let (app, entry) = (&mut self.app, &mut self.entry);
        let Some(entry) = entry.as_mut() else {
            return;
        };

        let result = entry.with_mut(|fields| {
            let time = fields.clock.tick();
            fields.lifecycle.on_render_tick(app, time.dt)
        });

        match result {
            Ok(FrameOutcome::Suspended) => entry.with_clock_mut(|clock| clock.reset()),
            Ok(_) => {}
            Err(err) if err.is_fatal() => self.fail(event_loop, err),
            Err(err) => log::error!("render tick: {err}"),
        }
    }
}

impl<A> ApplicationHandler for RuntimeState<A>
where
    A: 'static + for<'w> App<WgpuBackend<'w>>,
{
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.entry.is_some() || self.failure.is_some() {
            return;
        }

        match self.create_entry(event_loop) {
            Ok(entry) => {
                entry.with_window(|w| w.request_redraw());
                self.entry = Some(entry);
            }
            Err(err) => {
                log::error!("failed to create initial window: {err:#}");
                event_loop.exit();
            }
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        event_loop.set_control_flow(ControlFlow::Wait);

        // Continuous redraw.
        if let Some(entry) = &self.entry {
            entry.with_window(|w| w.request_redraw());
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _window_id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => self.close(event_loop),

            WindowEvent::Resized(size) => self.resize(event_loop, size),

            WindowEvent::ScaleFactorChanged { .. } => {
                if let Some(size) = self.entry.as_ref().map(|e| e.with_window(|w| w.inner_size())) {
                    self.resize(event_loop, size);
                }
            }

            WindowEvent::RedrawRequested => self.redraw(event_loop),

            _ => {}
        }
    }

    fn exiting(&mut self, event_loop: &ActiveEventLoop) {
        if self.entry.is_some() {
            self.close(event_loop);
        }
    }
}
