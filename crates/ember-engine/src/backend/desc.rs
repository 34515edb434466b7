//! Backend-neutral descriptors exchanged across the [`Backend`](super::Backend) seam.
//!
//! Plain-data types reuse `wgpu` type definitions (formats, usages, blend
//! factors) so the wgpu backend maps them one-to-one; the headless backend
//! interprets them directly.

use std::borrow::Cow;
use std::ops::Range;

use super::Backend;
use crate::frame::Draw;
use crate::pipeline::{DepthState, VertexBufferLayout};

/// Adapter selection preferences.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdapterOptions {
    pub power_preference: wgpu::PowerPreference,
    pub force_fallback_adapter: bool,
}

/// Parameters of a device request.
#[derive(Debug, Clone)]
pub struct DeviceRequest<'a> {
    pub label: Option<&'a str>,
    pub required_features: wgpu::Features,
    pub required_limits: wgpu::Limits,
}

/// Capabilities and identity of a resolved adapter.
#[derive(Debug, Clone)]
pub struct AdapterReport {
    pub name: String,
    pub vendor: u32,
    pub device: u32,
    pub device_type: wgpu::DeviceType,
    pub driver: String,
    pub driver_info: String,
    pub backend: wgpu::Backend,
    pub features: wgpu::Features,
    pub limits: wgpu::Limits,
}

/// What a surface supports when driven by a given adapter.
#[derive(Debug, Clone, Default)]
pub struct SurfaceCaps {
    pub formats: Vec<wgpu::TextureFormat>,
    pub present_modes: Vec<wgpu::PresentMode>,
    pub alpha_modes: Vec<wgpu::CompositeAlphaMode>,
}

/// Presentation parameters applied to a surface.
///
/// Usage is always `RENDER_ATTACHMENT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceConfig {
    pub format: wgpu::TextureFormat,
    pub present_mode: wgpu::PresentMode,
    pub alpha_mode: wgpu::CompositeAlphaMode,
    pub width: u32,
    pub height: u32,
    pub desired_maximum_frame_latency: u32,
}

/// Reported by a backend whose present call failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresentFailure(pub String);

#[derive(Debug, Clone, Copy)]
pub struct BufferDesc<'a> {
    pub label: Option<&'a str>,
    pub size: u64,
    pub usage: wgpu::BufferUsages,
}

#[derive(Debug, Clone, Copy)]
pub struct TextureDesc<'a> {
    pub label: Option<&'a str>,
    pub width: u32,
    pub height: u32,
    pub format: wgpu::TextureFormat,
    pub usage: wgpu::TextureUsages,
    pub mip_level_count: u32,
    pub sample_count: u32,
}

/// Typed projection of a texture.
///
/// `None` counts mean "the rest of the texture's range".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewDesc {
    pub format: Option<wgpu::TextureFormat>,
    pub aspect: wgpu::TextureAspect,
    pub base_mip_level: u32,
    pub mip_level_count: Option<u32>,
    pub base_array_layer: u32,
    pub array_layer_count: Option<u32>,
}

impl Default for ViewDesc {
    fn default() -> Self {
        Self {
            format: None,
            aspect: wgpu::TextureAspect::All,
            base_mip_level: 0,
            mip_level_count: None,
            base_array_layer: 0,
            array_layer_count: None,
        }
    }
}

/// Byte layout of host data uploaded into one mip level of a texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TexelLayout {
    pub offset: u64,
    pub bytes_per_row: u32,
    pub rows_per_image: u32,
}

/// Destination of a texture upload: a full mip level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureRegion {
    pub mip_level: u32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplerDesc {
    pub address_mode_u: wgpu::AddressMode,
    pub address_mode_v: wgpu::AddressMode,
    pub address_mode_w: wgpu::AddressMode,
    pub mag_filter: wgpu::FilterMode,
    pub min_filter: wgpu::FilterMode,
    pub mipmap_filter: wgpu::MipmapFilterMode,
    pub lod_min_clamp: f32,
    pub lod_max_clamp: f32,
}

impl Default for SamplerDesc {
    fn default() -> Self {
        Self {
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            address_mode_w: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::MipmapFilterMode::Linear,
            lod_min_clamp: 0.0,
            lod_max_clamp: 1.0,
        }
    }
}

/// Shader languages the compiler collaborator accepts.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[non_exhaustive]
pub enum ShaderLanguage {
    Wgsl,
}

/// Shader source text handed to the backend's compiler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderSource {
    pub label: Option<String>,
    pub language: ShaderLanguage,
    pub code: Cow<'static, str>,
}

impl ShaderSource {
    pub fn wgsl(code: impl Into<Cow<'static, str>>) -> Self {
        Self {
            label: None,
            language: ShaderLanguage::Wgsl,
            code: code.into(),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// One slot of a bind-group layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindingLayoutEntry {
    pub binding: u32,
    pub visibility: wgpu::ShaderStages,
    pub ty: wgpu::BindingType,
}

/// A resolved resource bound into one slot of a bind group.
pub enum NativeBinding<'a, B: Backend> {
    Buffer {
        buffer: &'a B::Buffer,
        offset: u64,
        size: Option<u64>,
    },
    TextureView(&'a B::TextureView),
    Sampler(&'a B::Sampler),
}

pub struct NativeBindGroupEntry<'a, B: Backend> {
    pub binding: u32,
    pub resource: NativeBinding<'a, B>,
}

/// Fully resolved render pipeline description.
pub struct NativePipelineDesc<'a, B: Backend> {
    pub label: &'a str,
    pub module: &'a B::ShaderModule,
    pub vertex_entry: &'a str,
    pub fragment_entry: &'a str,
    pub vertex_buffers: &'a [VertexBufferLayout],
    pub bind_group_layouts: Vec<&'a B::BindGroupLayout>,
    pub color_format: wgpu::TextureFormat,
    pub blend: Option<wgpu::BlendState>,
    pub write_mask: wgpu::ColorWrites,
    pub primitive: wgpu::PrimitiveState,
    pub depth: Option<DepthState>,
    pub sample_count: u32,
}

/// One pipeline binding plus the draws issued with it.
pub struct NativeBatch<'a, B: Backend> {
    pub pipeline: &'a B::Pipeline,
    pub bind_groups: Vec<(u32, &'a B::BindGroup)>,
    pub vertex_buffers: Vec<(u32, &'a B::Buffer)>,
    pub index_buffer: Option<(&'a B::Buffer, wgpu::IndexFormat)>,
    pub draws: &'a [Draw],
}

/// Depth attachment of a render pass; cleared to 1.0 and stored.
pub struct NativeDepthAttachment<'a, B: Backend> {
    pub view: &'a B::TextureView,
    pub format: wgpu::TextureFormat,
}

/// Exactly one render pass: clear the color target, run every batch.
pub struct NativePass<'a, B: Backend> {
    pub label: &'a str,
    pub color_view: &'a B::TextureView,
    pub clear_color: wgpu::Color,
    pub depth: Option<NativeDepthAttachment<'a, B>>,
    pub batches: Vec<NativeBatch<'a, B>>,
}

/// Buffer access mode for mapping.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum MapMode {
    Read,
    Write,
}

/// Byte range of a mapping.
pub type MapRange = Range<u64>;
