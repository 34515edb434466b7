//! In-process backend that emulates GPU memory in host RAM.
//!
//! Every observable call is appended to a journal shared with a
//! [`HeadlessProbe`], which tests (and CI runs without a GPU) use to script
//! surface behavior and inspect what the core did.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::future::Future;
use std::rc::Rc;

use super::{
    AdapterOptions, AdapterReport, Backend, BindingLayoutEntry, BufferDesc, DeviceRequest,
    MapMode, MapRange, NativeBindGroupEntry, NativePass, NativePipelineDesc, PresentFailure,
    SamplerDesc, ShaderSource, SurfaceCaps, SurfaceConfig, TexelLayout, TextureDesc,
    TextureRegion, ViewDesc,
};
use crate::device::ErrorSink;
use crate::error::{AcquireFailure, GpuError, Result};
use crate::frame::Draw;

/// Kind of a native handle, as reported in [`Event::Released`].
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum HandleKind {
    Instance,
    Surface,
    Adapter,
    Device,
    Queue,
    Buffer,
    Texture,
    TextureView,
    Sampler,
    ShaderModule,
    BindGroupLayout,
    BindGroup,
    Pipeline,
    SurfaceTexture,
    Encoder,
    CommandBuffer,
}

impl HandleKind {
    fn default_label(self) -> &'static str {
        match self {
            HandleKind::Instance => "instance",
            HandleKind::Surface => "surface",
            HandleKind::Adapter => "adapter",
            HandleKind::Device => "device",
            HandleKind::Queue => "queue",
            HandleKind::Buffer => "buffer",
            HandleKind::Texture => "texture",
            HandleKind::TextureView => "texture view",
            HandleKind::Sampler => "sampler",
            HandleKind::ShaderModule => "shader module",
            HandleKind::BindGroupLayout => "bind group layout",
            HandleKind::BindGroup => "bind group",
            HandleKind::Pipeline => "pipeline",
            HandleKind::SurfaceTexture => "surface texture",
            HandleKind::Encoder => "encoder",
            HandleKind::CommandBuffer => "command buffer",
        }
    }
}

/// A render pass as the backend saw it.
#[derive(Debug, Clone, PartialEq)]
pub struct PassRecord {
    pub label: String,
    pub target_size: (u32, u32),
    pub clear_color: wgpu::Color,
    pub depth_format: Option<wgpu::TextureFormat>,
    pub batches: usize,
}

/// One draw call and the pipeline it was issued with.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawRecord {
    pub pipeline: String,
    pub draw: Draw,
}

/// Journal entry.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Configured(SurfaceConfig),
    Acquired,
    AcquireFailed(AcquireFailure),
    RenderPass(PassRecord),
    Draw(DrawRecord),
    CopyBuffer { size: u64 },
    Submitted,
    Presented,
    PresentFailed,
    Released { kind: HandleKind, label: String },
}

struct State {
    events: Vec<Event>,
    acquire_script: VecDeque<AcquireFailure>,
    fail_adapter: Option<String>,
    fail_device: Option<String>,
    fail_next_present: bool,
    surface_formats: Vec<wgpu::TextureFormat>,
    sink: Option<ErrorSink>,
    work_done: Vec<Box<dyn FnOnce() + Send>>,
}

impl State {
    fn new() -> Self {
        Self {
            events: Vec::new(),
            acquire_script: VecDeque::new(),
            fail_adapter: None,
            fail_device: None,
            fail_next_present: false,
            surface_formats: vec![
                wgpu::TextureFormat::Bgra8UnormSrgb,
                wgpu::TextureFormat::Bgra8Unorm,
            ],
            sink: None,
            work_done: Vec::new(),
        }
    }
}

type Shared = Rc<RefCell<State>>;

/// Records its own release into the journal.
struct Tracked {
    kind: HandleKind,
    label: String,
    state: Shared,
}

impl Tracked {
    fn new(state: &Shared, kind: HandleKind, label: Option<&str>) -> Self {
        Self {
            kind,
            label: label.unwrap_or(kind.default_label()).to_string(),
            state: state.clone(),
        }
    }
}

impl Drop for Tracked {
    fn drop(&mut self) {
        if let Ok(mut state) = self.state.try_borrow_mut() {
            state.events.push(Event::Released {
                kind: self.kind,
                label: std::mem::take(&mut self.label),
            });
        }
    }
}

// ── handles ───────────────────────────────────────────────────────────────

pub struct HeadlessInstance(Tracked);
pub struct HeadlessAdapter(Tracked);
pub struct HeadlessDevice(Tracked);
pub struct HeadlessQueue(Tracked);
pub struct HeadlessSampler {
    _tracked: Tracked,
    desc: SamplerDesc,
}

impl HeadlessSampler {
    pub fn desc(&self) -> &SamplerDesc {
        &self.desc
    }
}

pub struct HeadlessShaderModule(Tracked);
pub struct HeadlessBindGroup(Tracked);

pub struct HeadlessSurface {
    _tracked: Tracked,
    config: Cell<Option<SurfaceConfig>>,
}

pub struct HeadlessBuffer {
    _tracked: Tracked,
    usage: wgpu::BufferUsages,
    data: Rc<RefCell<Vec<u8>>>,
    destroyed: Cell<bool>,
    mapped: Cell<Option<MapMode>>,
}

impl HeadlessBuffer {
    /// Current contents of the emulated storage.
    pub fn contents(&self) -> Vec<u8> {
        self.data.borrow().clone()
    }

    pub fn usage(&self) -> wgpu::BufferUsages {
        self.usage
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.get()
    }

    pub fn is_mapped(&self) -> bool {
        self.mapped.get().is_some()
    }
}

pub struct HeadlessTexture {
    tracked: Tracked,
    width: u32,
    height: u32,
    format: wgpu::TextureFormat,
    texels: RefCell<Vec<u8>>,
    destroyed: Cell<bool>,
}

impl HeadlessTexture {
    /// Tightly packed texels of mip level 0.
    pub fn texels(&self) -> Vec<u8> {
        self.texels.borrow().clone()
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.get()
    }
}

pub struct HeadlessTextureView {
    _tracked: Tracked,
    width: u32,
    height: u32,
    format: wgpu::TextureFormat,
}

impl HeadlessTextureView {
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn format(&self) -> wgpu::TextureFormat {
        self.format
    }
}

pub struct HeadlessBindGroupLayout {
    _tracked: Tracked,
    entries: Vec<BindingLayoutEntry>,
}

impl HeadlessBindGroupLayout {
    pub fn entries(&self) -> &[BindingLayoutEntry] {
        &self.entries
    }
}

pub struct HeadlessPipeline {
    tracked: Tracked,
    color_format: wgpu::TextureFormat,
    depth_format: Option<wgpu::TextureFormat>,
}

impl HeadlessPipeline {
    pub fn color_format(&self) -> wgpu::TextureFormat {
        self.color_format
    }

    pub fn depth_format(&self) -> Option<wgpu::TextureFormat> {
        self.depth_format
    }
}

pub struct HeadlessSurfaceTexture {
    _tracked: Tracked,
    width: u32,
    height: u32,
    format: wgpu::TextureFormat,
}

enum Command {
    Copy {
        src: Rc<RefCell<Vec<u8>>>,
        src_offset: u64,
        dst: Rc<RefCell<Vec<u8>>>,
        dst_offset: u64,
        size: u64,
    },
}

pub struct HeadlessEncoder {
    tracked: Tracked,
    commands: Vec<Command>,
}

pub struct HeadlessCommandBuffer {
    _tracked: Tracked,
    commands: Vec<Command>,
}

// ── backend ───────────────────────────────────────────────────────────────

/// Backend executing everything on the calling thread against host memory.
pub struct HeadlessBackend {
    state: Shared,
}

impl HeadlessBackend {
    pub fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(State::new())),
        }
    }

    /// A handle onto the journal and script of this backend.
    pub fn probe(&self) -> HeadlessProbe {
        HeadlessProbe {
            state: self.state.clone(),
        }
    }

    fn record(&self, event: Event) {
        self.state.borrow_mut().events.push(event);
    }

    fn tracked(&self, kind: HandleKind, label: Option<&str>) -> Tracked {
        Tracked::new(&self.state, kind, label)
    }

    /// Reports a contract violation the way a real device would: asynchronously, through the sink.
    fn device_error(&self, description: String) {
        let sink = self.state.borrow().sink.clone();
        match sink {
            Some(sink) => sink.report_uncaptured(description),
            None => log::error!("device error before sink installation: {description}"),
        }
    }
}

impl Default for HeadlessBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn slice_range(offset: u64, len: u64) -> std::ops::Range<usize> {
    offset as usize..(offset + len) as usize
}

impl Backend for HeadlessBackend {
    type Target = ();

    type Instance = HeadlessInstance;
    type Surface = HeadlessSurface;
    type Adapter = HeadlessAdapter;
    type Device = HeadlessDevice;
    type Queue = HeadlessQueue;

    type Buffer = HeadlessBuffer;
    type Texture = HeadlessTexture;
    type TextureView = HeadlessTextureView;
    type Sampler = HeadlessSampler;
    type ShaderModule = HeadlessShaderModule;
    type BindGroupLayout = HeadlessBindGroupLayout;
    type BindGroup = HeadlessBindGroup;
    type Pipeline = HeadlessPipeline;

    type SurfaceTexture = HeadlessSurfaceTexture;
    type Encoder = HeadlessEncoder;
    type CommandBuffer = HeadlessCommandBuffer;

    fn create_instance(&self) -> Result<Self::Instance> {
        Ok(HeadlessInstance(self.tracked(HandleKind::Instance, None)))
    }

    fn create_surface(&self, _instance: &Self::Instance, _target: ()) -> Result<Self::Surface> {
        Ok(HeadlessSurface {
            _tracked: self.tracked(HandleKind::Surface, None),
            config: Cell::new(None),
        })
    }

    fn request_adapter<'a>(
        &'a self,
        _instance: &'a Self::Instance,
        _surface: &'a Self::Surface,
        _options: AdapterOptions,
    ) -> impl Future<Output = Result<Self::Adapter>> + 'a {
        let failure = self.state.borrow_mut().fail_adapter.take();
        std::future::ready(match failure {
            Some(reason) => Err(GpuError::AdapterUnavailable(reason)),
            None => Ok(HeadlessAdapter(self.tracked(HandleKind::Adapter, None))),
        })
    }

    fn adapter_report(&self, _adapter: &Self::Adapter) -> AdapterReport {
        AdapterReport {
            name: "ember headless".to_string(),
            vendor: 0,
            device: 0,
            device_type: wgpu::DeviceType::Cpu,
            driver: "host memory".to_string(),
            driver_info: String::new(),
            backend: wgpu::Backend::Noop,
            features: wgpu::Features::empty(),
            limits: wgpu::Limits::default(),
        }
    }

    fn request_device<'a>(
        &'a self,
        _adapter: &'a Self::Adapter,
        request: &'a DeviceRequest<'a>,
    ) -> impl Future<Output = Result<(Self::Device, Self::Queue)>> + 'a {
        log::trace!("device requested: {:?}", request.label);
        let failure = self.state.borrow_mut().fail_device.take();
        std::future::ready(match failure {
            Some(reason) => Err(GpuError::DeviceUnavailable(reason)),
            None => Ok((
                HeadlessDevice(self.tracked(HandleKind::Device, None)),
                HeadlessQueue(self.tracked(HandleKind::Queue, None)),
            )),
        })
    }

    fn install_error_sink(&self, _device: &Self::Device, sink: ErrorSink) {
        self.state.borrow_mut().sink = Some(sink);
    }

    fn surface_capabilities(
        &self,
        _surface: &Self::Surface,
        _adapter: &Self::Adapter,
    ) -> SurfaceCaps {
        SurfaceCaps {
            formats: self.state.borrow().surface_formats.clone(),
            present_modes: vec![
                wgpu::PresentMode::Fifo,
                wgpu::PresentMode::Mailbox,
                wgpu::PresentMode::Immediate,
            ],
            alpha_modes: vec![wgpu::CompositeAlphaMode::Opaque],
        }
    }

    fn configure_surface(
        &self,
        surface: &Self::Surface,
        _device: &Self::Device,
        config: &SurfaceConfig,
    ) {
        surface.config.set(Some(*config));
        self.record(Event::Configured(*config));
    }

    fn acquire(
        &self,
        surface: &Self::Surface,
    ) -> std::result::Result<Self::SurfaceTexture, AcquireFailure> {
        let scripted = self.state.borrow_mut().acquire_script.pop_front();
        let outcome = match (scripted, surface.config.get()) {
            (Some(failure), _) => Err(failure),
            (None, None) => Err(AcquireFailure::Outdated),
            (None, Some(config)) => Ok(config),
        };

        match outcome {
            Ok(config) => {
                self.record(Event::Acquired);
                Ok(HeadlessSurfaceTexture {
                    _tracked: self.tracked(HandleKind::SurfaceTexture, None),
                    width: config.width,
                    height: config.height,
                    format: config.format,
                })
            }
            Err(failure) => {
                self.record(Event::AcquireFailed(failure));
                Err(failure)
            }
        }
    }

    fn surface_view(&self, texture: &Self::SurfaceTexture) -> Self::TextureView {
        HeadlessTextureView {
            _tracked: self.tracked(HandleKind::TextureView, Some("surface view")),
            width: texture.width,
            height: texture.height,
            format: texture.format,
        }
    }

    fn present(&self, texture: Self::SurfaceTexture) -> std::result::Result<(), PresentFailure> {
        let failed = std::mem::take(&mut self.state.borrow_mut().fail_next_present);
        let result = if failed {
            self.record(Event::PresentFailed);
            Err(PresentFailure("scripted present failure".to_string()))
        } else {
            self.record(Event::Presented);
            Ok(())
        };
        drop(texture);
        result
    }

    // ── buffers ───────────────────────────────────────────────────────────

    fn create_buffer(&self, _device: &Self::Device, desc: &BufferDesc<'_>) -> Self::Buffer {
        HeadlessBuffer {
            _tracked: self.tracked(HandleKind::Buffer, desc.label),
            usage: desc.usage,
            data: Rc::new(RefCell::new(vec![0; desc.size as usize])),
            destroyed: Cell::new(false),
            mapped: Cell::new(None),
        }
    }

    fn write_buffer(&self, _queue: &Self::Queue, buffer: &Self::Buffer, offset: u64, bytes: &[u8]) {
        if buffer.destroyed.get() {
            self.device_error("write to a destroyed buffer".to_string());
            return;
        }
        let written = buffer
            .data
            .borrow_mut()
            .get_mut(slice_range(offset, bytes.len() as u64))
            .map(|dst| dst.copy_from_slice(bytes))
            .is_some();
        if !written {
            self.device_error(format!("write_buffer out of range at offset {offset}"));
        }
    }

    fn destroy_buffer(&self, buffer: &Self::Buffer) {
        buffer.destroyed.set(true);
        buffer.mapped.set(None);
    }

    fn map_buffer(
        &self,
        _device: &Self::Device,
        _queue: &Self::Queue,
        buffer: &Self::Buffer,
        mode: MapMode,
        _range: MapRange,
    ) -> Result<()> {
        buffer.mapped.set(Some(mode));
        Ok(())
    }

    fn read_mapped(&self, buffer: &Self::Buffer, range: MapRange) -> Vec<u8> {
        let data = buffer.data.borrow();
        data.get(range.start as usize..range.end as usize)
            .map(<[u8]>::to_vec)
            .unwrap_or_default()
    }

    fn write_mapped(&self, buffer: &Self::Buffer, _mapped: MapRange, offset: u64, bytes: &[u8]) {
        if let Some(dst) = buffer
            .data
            .borrow_mut()
            .get_mut(slice_range(offset, bytes.len() as u64))
        {
            dst.copy_from_slice(bytes);
        }
    }

    fn unmap_buffer(&self, buffer: &Self::Buffer) {
        buffer.mapped.set(None);
    }

    // ── textures, samplers, shaders, bindings, pipelines ─────────────────

    fn create_texture(&self, _device: &Self::Device, desc: &TextureDesc<'_>) -> Self::Texture {
        let texel = desc.format.block_copy_size(None).unwrap_or(0) as usize;
        HeadlessTexture {
            tracked: self.tracked(HandleKind::Texture, desc.label),
            width: desc.width,
            height: desc.height,
            format: desc.format,
            texels: RefCell::new(vec![0; desc.width as usize * desc.height as usize * texel]),
            destroyed: Cell::new(false),
        }
    }

    fn write_texture(
        &self,
        _queue: &Self::Queue,
        texture: &Self::Texture,
        region: TextureRegion,
        layout: TexelLayout,
        bytes: &[u8],
    ) {
        // Only the base level is emulated.
        if region.mip_level != 0 {
            return;
        }
        let texel = texture.format.block_copy_size(None).unwrap_or(0) as usize;
        let row_len = region.width as usize * texel;
        let mut texels = texture.texels.borrow_mut();
        for row in 0..region.height as usize {
            let src = layout.offset as usize + row * layout.bytes_per_row as usize;
            let dst = row * texture.width as usize * texel;
            if let (Some(src), Some(dst)) = (
                bytes.get(src..src + row_len),
                texels.get_mut(dst..dst + row_len),
            ) {
                dst.copy_from_slice(src);
            }
        }
    }

    fn create_texture_view(&self, texture: &Self::Texture, desc: &ViewDesc) -> Self::TextureView {
        let label = format!("{} view", texture.tracked.label);
        HeadlessTextureView {
            _tracked: self.tracked(HandleKind::TextureView, Some(label.as_str())),
            width: (texture.width >> desc.base_mip_level).max(1),
            height: (texture.height >> desc.base_mip_level).max(1),
            format: desc.format.unwrap_or(texture.format),
        }
    }

    fn destroy_texture(&self, texture: &Self::Texture) {
        texture.destroyed.set(true);
    }

    fn create_sampler(&self, _device: &Self::Device, desc: &SamplerDesc) -> Self::Sampler {
        HeadlessSampler {
            _tracked: self.tracked(HandleKind::Sampler, None),
            desc: *desc,
        }
    }

    fn create_shader_module(
        &self,
        _device: &Self::Device,
        source: &ShaderSource,
    ) -> Result<Self::ShaderModule> {
        let label = source.label.as_deref().unwrap_or("shader");
        if source.code.trim().is_empty() {
            return Err(GpuError::ShaderCompilation(format!("{label}: empty source")));
        }
        let open = source.code.matches('{').count();
        let close = source.code.matches('}').count();
        if open != close {
            return Err(GpuError::ShaderCompilation(format!(
                "{label}: unbalanced braces ({open} opening, {close} closing)"
            )));
        }
        Ok(HeadlessShaderModule(
            self.tracked(HandleKind::ShaderModule, source.label.as_deref()),
        ))
    }

    fn create_bind_group_layout(
        &self,
        _device: &Self::Device,
        label: Option<&str>,
        entries: &[BindingLayoutEntry],
    ) -> Self::BindGroupLayout {
        HeadlessBindGroupLayout {
            _tracked: self.tracked(HandleKind::BindGroupLayout, label),
            entries: entries.to_vec(),
        }
    }

    fn create_bind_group(
        &self,
        _device: &Self::Device,
        label: Option<&str>,
        _layout: &Self::BindGroupLayout,
        _entries: &[NativeBindGroupEntry<'_, Self>],
    ) -> Self::BindGroup {
        HeadlessBindGroup(self.tracked(HandleKind::BindGroup, label))
    }

    fn create_pipeline(
        &self,
        _device: &Self::Device,
        desc: &NativePipelineDesc<'_, Self>,
    ) -> Self::Pipeline {
        HeadlessPipeline {
            tracked: self.tracked(HandleKind::Pipeline, Some(desc.label)),
            color_format: desc.color_format,
            depth_format: desc.depth.map(|d| d.format),
        }
    }

    // ── commands ──────────────────────────────────────────────────────────

    fn create_encoder(&self, _device: &Self::Device, label: &str) -> Self::Encoder {
        HeadlessEncoder {
            tracked: self.tracked(HandleKind::Encoder, Some(label)),
            commands: Vec::new(),
        }
    }

    fn encode_copy_buffer(
        &self,
        encoder: &mut Self::Encoder,
        src: &Self::Buffer,
        src_offset: u64,
        dst: &Self::Buffer,
        dst_offset: u64,
        size: u64,
    ) {
        self.record(Event::CopyBuffer { size });
        encoder.commands.push(Command::Copy {
            src: src.data.clone(),
            src_offset,
            dst: dst.data.clone(),
            dst_offset,
            size,
        });
    }

    fn encode_render_pass(&self, encoder: &mut Self::Encoder, pass: &NativePass<'_, Self>) {
        log::trace!("{}: render pass on {}", encoder.tracked.label, pass.label);
        self.record(Event::RenderPass(PassRecord {
            label: pass.label.to_string(),
            target_size: pass.color_view.size(),
            clear_color: pass.clear_color,
            depth_format: pass.depth.as_ref().map(|d| d.format),
            batches: pass.batches.len(),
        }));
        for batch in &pass.batches {
            for draw in batch.draws {
                self.record(Event::Draw(DrawRecord {
                    pipeline: batch.pipeline.tracked.label.clone(),
                    draw: draw.clone(),
                }));
            }
        }
    }

    fn finish(&self, encoder: Self::Encoder) -> Self::CommandBuffer {
        let HeadlessEncoder { tracked, commands } = encoder;
        drop(tracked);
        HeadlessCommandBuffer {
            _tracked: self.tracked(HandleKind::CommandBuffer, None),
            commands,
        }
    }

    fn submit(&self, _queue: &Self::Queue, command_buffer: Self::CommandBuffer) {
        for command in &command_buffer.commands {
            match command {
                Command::Copy {
                    src,
                    src_offset,
                    dst,
                    dst_offset,
                    size,
                } => {
                    let bytes = src
                        .borrow()
                        .get(slice_range(*src_offset, *size))
                        .map(<[u8]>::to_vec);
                    let copied = bytes.is_some_and(|bytes| {
                        dst.borrow_mut()
                            .get_mut(slice_range(*dst_offset, *size))
                            .map(|dst| dst.copy_from_slice(&bytes))
                            .is_some()
                    });
                    if !copied {
                        self.device_error("copy_buffer_to_buffer out of range".to_string());
                    }
                }
            }
        }
        self.record(Event::Submitted);
        drop(command_buffer);
    }

    fn on_submitted_work_done(&self, _queue: &Self::Queue, callback: Box<dyn FnOnce() + Send>) {
        self.state.borrow_mut().work_done.push(callback);
    }

    fn poll(&self, _device: &Self::Device, _wait: bool) {
        // Submissions execute synchronously, so every pending notification is due.
        let due = std::mem::take(&mut self.state.borrow_mut().work_done);
        for callback in due {
            callback();
        }
    }
}

// ── probe ─────────────────────────────────────────────────────────────────

/// Scripts a [`HeadlessBackend`] and inspects its journal.
#[derive(Clone)]
pub struct HeadlessProbe {
    state: Shared,
}

impl HeadlessProbe {
    // scripting

    /// The next adapter request fails with `reason`.
    pub fn fail_adapter(&self, reason: &str) {
        self.state.borrow_mut().fail_adapter = Some(reason.to_string());
    }

    /// The next device request fails with `reason`.
    pub fn fail_device(&self, reason: &str) {
        self.state.borrow_mut().fail_device = Some(reason.to_string());
    }

    /// Queues a failed outcome for an upcoming acquisition; unscripted acquisitions succeed.
    pub fn fail_next_acquire(&self, failure: AcquireFailure) {
        self.state.borrow_mut().acquire_script.push_back(failure);
    }

    pub fn fail_next_present(&self) {
        self.state.borrow_mut().fail_next_present = true;
    }

    /// Replaces the formats the surface reports as supported.
    pub fn set_surface_formats(&self, formats: Vec<wgpu::TextureFormat>) {
        self.state.borrow_mut().surface_formats = formats;
    }

    pub fn inject_uncaptured_error(&self, description: &str) {
        let sink = self.state.borrow().sink.clone();
        if let Some(sink) = sink {
            sink.report_uncaptured(description);
        }
    }

    pub fn inject_device_lost(&self, reason: &str) {
        let sink = self.state.borrow().sink.clone();
        if let Some(sink) = sink {
            sink.report_device_lost(reason);
        }
    }

    // inspection

    pub fn events(&self) -> Vec<Event> {
        self.state.borrow().events.clone()
    }

    /// Forgets everything journaled so far.
    pub fn clear(&self) {
        self.state.borrow_mut().events.clear();
    }

    fn count(&self, pred: impl Fn(&Event) -> bool) -> usize {
        self.state.borrow().events.iter().filter(|e| pred(e)).count()
    }

    pub fn configures(&self) -> Vec<SurfaceConfig> {
        self.state
            .borrow()
            .events
            .iter()
            .filter_map(|e| match e {
                Event::Configured(config) => Some(*config),
                _ => None,
            })
            .collect()
    }

    pub fn configure_count(&self) -> usize {
        self.count(|e| matches!(e, Event::Configured(_)))
    }

    pub fn last_configure(&self) -> Option<SurfaceConfig> {
        self.configures().last().copied()
    }

    pub fn render_passes(&self) -> Vec<PassRecord> {
        self.state
            .borrow()
            .events
            .iter()
            .filter_map(|e| match e {
                Event::RenderPass(pass) => Some(pass.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn render_pass_count(&self) -> usize {
        self.count(|e| matches!(e, Event::RenderPass(_)))
    }

    pub fn draws(&self) -> Vec<DrawRecord> {
        self.state
            .borrow()
            .events
            .iter()
            .filter_map(|e| match e {
                Event::Draw(draw) => Some(draw.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn draw_count(&self) -> usize {
        self.count(|e| matches!(e, Event::Draw(_)))
    }

    pub fn submit_count(&self) -> usize {
        self.count(|e| matches!(e, Event::Submitted))
    }

    pub fn present_count(&self) -> usize {
        self.count(|e| matches!(e, Event::Presented))
    }

    /// Every native release, in order.
    pub fn releases(&self) -> Vec<(HandleKind, String)> {
        self.state
            .borrow()
            .events
            .iter()
            .filter_map(|e| match e {
                Event::Released { kind, label } => Some((*kind, label.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn released_labels(&self) -> Vec<String> {
        self.releases().into_iter().map(|(_, label)| label).collect()
    }
}
