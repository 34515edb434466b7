//! The protocol seam between the lifecycle core and a graphics API.
//!
//! A [`Backend`] exposes every native operation the core needs. Each native
//! handle kind is an associated type whose value releases the native object
//! when dropped, so ownership (and therefore release order) is expressed by
//! whoever holds the handle. `destroy_*` calls only invalidate GPU storage.
//!
//! Two implementations ship:
//! - [`wgpu_backend::WgpuBackend`]: real GPU work through wgpu.
//! - [`headless::HeadlessBackend`]: host-memory emulation with a call journal.

mod desc;
pub mod headless;
pub mod wgpu_backend;

use std::future::Future;

pub use desc::{
    AdapterOptions, AdapterReport, BindingLayoutEntry, BufferDesc, DeviceRequest, MapMode,
    MapRange, NativeBatch, NativeBindGroupEntry, NativeBinding, NativeDepthAttachment, NativePass,
    NativePipelineDesc, PresentFailure, SamplerDesc, ShaderLanguage, ShaderSource, SurfaceCaps,
    SurfaceConfig, TexelLayout, TextureDesc, TextureRegion, ViewDesc,
};

use crate::device::ErrorSink;
use crate::error::{AcquireFailure, Result};

/// Native operations the session core is written against.
///
/// All calls happen on the single logical thread that drives the lifecycle.
pub trait Backend: Sized {
    /// What a surface is created from (a window, for native backends).
    type Target;

    type Instance;
    type Surface;
    type Adapter;
    type Device;
    type Queue;

    type Buffer;
    type Texture;
    type TextureView;
    type Sampler;
    type ShaderModule;
    type BindGroupLayout;
    type BindGroup;
    type Pipeline;

    type SurfaceTexture;
    type Encoder;
    type CommandBuffer;

    // ── bootstrap ─────────────────────────────────────────────────────────

    fn create_instance(&self) -> Result<Self::Instance>;

    fn create_surface(&self, instance: &Self::Instance, target: Self::Target)
    -> Result<Self::Surface>;

    /// Resolves an adapter able to present to `surface`.
    fn request_adapter<'a>(
        &'a self,
        instance: &'a Self::Instance,
        surface: &'a Self::Surface,
        options: AdapterOptions,
    ) -> impl Future<Output = Result<Self::Adapter>> + 'a;

    fn adapter_report(&self, adapter: &Self::Adapter) -> AdapterReport;

    /// Resolves a logical device and its queue.
    fn request_device<'a>(
        &'a self,
        adapter: &'a Self::Adapter,
        request: &'a DeviceRequest<'a>,
    ) -> impl Future<Output = Result<(Self::Device, Self::Queue)>> + 'a;

    /// Routes uncaptured device errors and device loss into `sink`.
    fn install_error_sink(&self, device: &Self::Device, sink: ErrorSink);

    // ── surface ───────────────────────────────────────────────────────────

    fn surface_capabilities(&self, surface: &Self::Surface, adapter: &Self::Adapter)
    -> SurfaceCaps;

    fn configure_surface(
        &self,
        surface: &Self::Surface,
        device: &Self::Device,
        config: &SurfaceConfig,
    );

    fn acquire(&self, surface: &Self::Surface)
    -> std::result::Result<Self::SurfaceTexture, AcquireFailure>;

    fn surface_view(&self, texture: &Self::SurfaceTexture) -> Self::TextureView;

    fn present(&self, texture: Self::SurfaceTexture) -> std::result::Result<(), PresentFailure>;

    // ── buffers ───────────────────────────────────────────────────────────

    fn create_buffer(&self, device: &Self::Device, desc: &BufferDesc<'_>) -> Self::Buffer;

    /// Queues an upload; ordered with other queue operations.
    fn write_buffer(&self, queue: &Self::Queue, buffer: &Self::Buffer, offset: u64, bytes: &[u8]);

    fn destroy_buffer(&self, buffer: &Self::Buffer);

    /// Maps `range` of `buffer`, blocking the logical thread until the map completes.
    ///
    /// Queued writes are flushed first so the mapping observes them.
    fn map_buffer(
        &self,
        device: &Self::Device,
        queue: &Self::Queue,
        buffer: &Self::Buffer,
        mode: MapMode,
        range: MapRange,
    ) -> Result<()>;

    fn read_mapped(&self, buffer: &Self::Buffer, range: MapRange) -> Vec<u8>;

    /// Writes into the mapping of `mapped`; `offset` is absolute within the buffer.
    fn write_mapped(&self, buffer: &Self::Buffer, mapped: MapRange, offset: u64, bytes: &[u8]);

    fn unmap_buffer(&self, buffer: &Self::Buffer);

    // ── textures, samplers, shaders, bindings, pipelines ─────────────────

    fn create_texture(&self, device: &Self::Device, desc: &TextureDesc<'_>) -> Self::Texture;

    fn write_texture(
        &self,
        queue: &Self::Queue,
        texture: &Self::Texture,
        region: TextureRegion,
        layout: TexelLayout,
        bytes: &[u8],
    );

    fn create_texture_view(&self, texture: &Self::Texture, desc: &ViewDesc) -> Self::TextureView;

    fn destroy_texture(&self, texture: &Self::Texture);

    fn create_sampler(&self, device: &Self::Device, desc: &SamplerDesc) -> Self::Sampler;

    /// The opaque shader compiler.
    fn create_shader_module(
        &self,
        device: &Self::Device,
        source: &ShaderSource,
    ) -> Result<Self::ShaderModule>;

    fn create_bind_group_layout(
        &self,
        device: &Self::Device,
        label: Option<&str>,
        entries: &[BindingLayoutEntry],
    ) -> Self::BindGroupLayout;

    fn create_bind_group(
        &self,
        device: &Self::Device,
        label: Option<&str>,
        layout: &Self::BindGroupLayout,
        entries: &[NativeBindGroupEntry<'_, Self>],
    ) -> Self::BindGroup;

    fn create_pipeline(
        &self,
        device: &Self::Device,
        desc: &NativePipelineDesc<'_, Self>,
    ) -> Self::Pipeline;

    // ── commands ──────────────────────────────────────────────────────────

    fn create_encoder(&self, device: &Self::Device, label: &str) -> Self::Encoder;

    fn encode_copy_buffer(
        &self,
        encoder: &mut Self::Encoder,
        src: &Self::Buffer,
        src_offset: u64,
        dst: &Self::Buffer,
        dst_offset: u64,
        size: u64,
    );

    /// Encodes one complete render pass (begin, batches, end).
    fn encode_render_pass(&self, encoder: &mut Self::Encoder, pass: &NativePass<'_, Self>);

    fn finish(&self, encoder: Self::Encoder) -> Self::CommandBuffer;

    fn submit(&self, queue: &Self::Queue, command_buffer: Self::CommandBuffer);

    /// Calls `callback` once all work submitted so far has completed.
    fn on_submitted_work_done(&self, queue: &Self::Queue, callback: Box<dyn FnOnce() + Send>);

    /// Drives pending callbacks; with `wait` blocks until the queue is idle.
    fn poll(&self, device: &Self::Device, wait: bool);
}
