use crate::backend::Backend;
use crate::device::DeviceSession;
use crate::error::Result;
use crate::frame::DrawList;
use crate::pipeline::PipelineBuilder;
use crate::resource::{PipelineId, ResourceRegistry};
use crate::surface::Swapchain;

/// GPU state handed to application callbacks.
///
/// Lifetimes:
/// - `'a` is the duration of the callback invocation
pub struct GpuCtx<'a, B: Backend> {
    pub session: &'a DeviceSession<B>,
    pub registry: &'a mut ResourceRegistry<B>,
    pub swapchain: &'a Swapchain<B>,
}

impl<B: Backend> GpuCtx<'_, B> {
    /// Builds `builder` against the live swapchain.
    pub fn build_pipeline(&mut self, builder: PipelineBuilder) -> Result<PipelineId> {
        builder.build(self.session, self.registry, self.swapchain)
    }

    pub fn surface_format(&self) -> wgpu::TextureFormat {
        self.swapchain.format()
    }

    pub fn depth_format(&self) -> Option<wgpu::TextureFormat> {
        self.swapchain.depth_format()
    }

    /// Last size the driver reported, in physical pixels.
    pub fn surface_size(&self) -> (u32, u32) {
        self.swapchain.size()
    }

    /// Width over height; 1.0 while the surface is zero-sized.
    pub fn aspect_ratio(&self) -> f32 {
        match self.swapchain.size() {
            (w, h) if w > 0 && h > 0 => w as f32 / h as f32,
            _ => 1.0,
        }
    }
}

/// Application contract driven by the [`Lifecycle`](super::Lifecycle).
///
/// Callbacks never run concurrently with each other.
pub trait App<B: Backend> {
    /// Creates the application's resources and pipelines.
    ///
    /// Runs once, after the session is negotiated and the surface format is
    /// known, before the surface is first configured.
    fn load(&mut self, ctx: &mut GpuCtx<'_, B>) -> Result<()>;

    /// Per-tick state update; uniform writes belong here.
    fn update(&mut self, ctx: &mut GpuCtx<'_, B>, dt: f32) -> Result<()> {
        let _ = (ctx, dt);
        Ok(())
    }

    /// Describes this tick's render pass.
    fn draw(&self, list: &mut DrawList);
}
