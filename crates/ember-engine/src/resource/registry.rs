use std::cmp::Reverse;

use slotmap::SlotMap;

use crate::backend::{Backend, BindingLayoutEntry, MapMode, ShaderSource};
use crate::device::DeviceSession;
use crate::error::{GpuError, Result};
use crate::pipeline::PipelineMeta;

slotmap::new_key_type! {
    pub struct BufferId;
    pub struct TextureId;
    pub struct TextureViewId;
    pub struct SamplerId;
    pub struct ShaderModuleId;
    pub struct BindGroupLayoutId;
    pub struct BindGroupId;
    pub struct PipelineId;
}

/// Any registry entry.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ResourceKey {
    Buffer(BufferId),
    Texture(TextureId),
    TextureView(TextureViewId),
    Sampler(SamplerId),
    ShaderModule(ShaderModuleId),
    BindGroupLayout(BindGroupLayoutId),
    BindGroup(BindGroupId),
    Pipeline(PipelineId),
}

macro_rules! impl_from_id {
    ($($id:ident => $variant:ident),* $(,)?) => {
        $(
            impl From<$id> for ResourceKey {
                fn from(id: $id) -> Self {
                    ResourceKey::$variant(id)
                }
            }
        )*
    };
}

impl_from_id! {
    BufferId => Buffer,
    TextureId => Texture,
    TextureViewId => TextureView,
    SamplerId => Sampler,
    ShaderModuleId => ShaderModule,
    BindGroupLayoutId => BindGroupLayout,
    BindGroupId => BindGroup,
    PipelineId => Pipeline,
}

impl ResourceKey {
    /// Teardown tier. Every dependency edge points into a strictly higher tier.
    pub fn tier(self) -> u8 {
        match self {
            ResourceKey::BindGroup(_) | ResourceKey::Pipeline(_) => 0,
            ResourceKey::ShaderModule(_) | ResourceKey::BindGroupLayout(_) => 1,
            ResourceKey::TextureView(_) | ResourceKey::Sampler(_) => 2,
            ResourceKey::Texture(_) | ResourceKey::Buffer(_) => 3,
        }
    }

    pub fn kind(self) -> &'static str {
        match self {
            ResourceKey::Buffer(_) => "buffer",
            ResourceKey::Texture(_) => "texture",
            ResourceKey::TextureView(_) => "texture view",
            ResourceKey::Sampler(_) => "sampler",
            ResourceKey::ShaderModule(_) => "shader module",
            ResourceKey::BindGroupLayout(_) => "bind group layout",
            ResourceKey::BindGroup(_) => "bind group",
            ResourceKey::Pipeline(_) => "pipeline",
        }
    }
}

/// A registered native handle plus what the registry knows about it.
pub(crate) struct Entry<H, M> {
    pub(crate) handle: H,
    pub(crate) meta: M,
    pub(crate) label: String,
    /// Objects that must outlive this one.
    pub(crate) deps: Vec<ResourceKey>,
    pub(crate) seq: u64,
}

pub(crate) struct BufferMeta {
    pub(crate) size: u64,
    pub(crate) usage: wgpu::BufferUsages,
    pub(crate) destroyed: bool,
    pub(crate) mapped: Option<MapMode>,
}

impl BufferMeta {
    /// Buffers with a CPU-visible mapping usage must be destroyed before release.
    pub(crate) fn is_mappable(&self) -> bool {
        self.usage
            .intersects(wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::MAP_WRITE)
    }
}

pub(crate) struct TextureMeta {
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) format: wgpu::TextureFormat,
    pub(crate) usage: wgpu::TextureUsages,
    pub(crate) mip_level_count: u32,
    pub(crate) destroyed: bool,
}

pub(crate) struct ViewMeta {
    pub(crate) texture: TextureId,
    pub(crate) format: wgpu::TextureFormat,
}

pub(crate) struct LayoutMeta {
    pub(crate) entries: Vec<BindingLayoutEntry>,
}

pub(crate) struct BindGroupMeta {
    pub(crate) layout: BindGroupLayoutId,
}

/// Owns every GPU-side object a consumer creates and the edges between them.
///
/// All mutation happens on the single logical thread driving the session.
/// Fields are declared in teardown order, so dropping a registry releases
/// dependents before the objects they reference.
pub struct ResourceRegistry<B: Backend> {
    pub(crate) pipelines: SlotMap<PipelineId, Entry<B::Pipeline, PipelineMeta>>,
    pub(crate) bind_groups: SlotMap<BindGroupId, Entry<B::BindGroup, BindGroupMeta>>,
    pub(crate) shaders: SlotMap<ShaderModuleId, Entry<B::ShaderModule, ()>>,
    pub(crate) layouts: SlotMap<BindGroupLayoutId, Entry<B::BindGroupLayout, LayoutMeta>>,
    pub(crate) views: SlotMap<TextureViewId, Entry<B::TextureView, ViewMeta>>,
    pub(crate) samplers: SlotMap<SamplerId, Entry<B::Sampler, ()>>,
    pub(crate) textures: SlotMap<TextureId, Entry<B::Texture, TextureMeta>>,
    pub(crate) buffers: SlotMap<BufferId, Entry<B::Buffer, BufferMeta>>,

    next_seq: u64,
}

impl<B: Backend> Default for ResourceRegistry<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: Backend> ResourceRegistry<B> {
    pub fn new() -> Self {
        Self {
            pipelines: SlotMap::with_key(),
            bind_groups: SlotMap::with_key(),
            shaders: SlotMap::with_key(),
            layouts: SlotMap::with_key(),
            views: SlotMap::with_key(),
            samplers: SlotMap::with_key(),
            textures: SlotMap::with_key(),
            buffers: SlotMap::with_key(),
            next_seq: 0,
        }
    }

    pub(crate) fn entry<H, M>(&mut self, handle: H, meta: M, label: String, deps: Vec<ResourceKey>) -> Entry<H, M> {
        let seq = self.next_seq;
        self.next_seq += 1;
        Entry {
            handle,
            meta,
            label,
            deps,
            seq,
        }
    }

    pub fn len(&self) -> usize {
        self.pipelines.len()
            + self.bind_groups.len()
            + self.shaders.len()
            + self.layouts.len()
            + self.views.len()
            + self.samplers.len()
            + self.textures.len()
            + self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `(key, label, deps, seq)` of every live entry.
    fn records(&self) -> Vec<(ResourceKey, &str, &[ResourceKey], u64)> {
        fn collect<'a, K, H, M>(
            map: &'a SlotMap<K, Entry<H, M>>,
            out: &mut Vec<(ResourceKey, &'a str, &'a [ResourceKey], u64)>,
        ) where
            K: slotmap::Key + Into<ResourceKey>,
        {
            out.extend(
                map.iter()
                    .map(|(k, e)| (k.into(), e.label.as_str(), e.deps.as_slice(), e.seq)),
            );
        }

        let mut out = Vec::with_capacity(self.len());
        collect(&self.pipelines, &mut out);
        collect(&self.bind_groups, &mut out);
        collect(&self.shaders, &mut out);
        collect(&self.layouts, &mut out);
        collect(&self.views, &mut out);
        collect(&self.samplers, &mut out);
        collect(&self.textures, &mut out);
        collect(&self.buffers, &mut out);
        out
    }

    pub fn contains(&self, key: impl Into<ResourceKey>) -> bool {
        match key.into() {
            ResourceKey::Buffer(id) => self.buffers.contains_key(id),
            ResourceKey::Texture(id) => self.textures.contains_key(id),
            ResourceKey::TextureView(id) => self.views.contains_key(id),
            ResourceKey::Sampler(id) => self.samplers.contains_key(id),
            ResourceKey::ShaderModule(id) => self.shaders.contains_key(id),
            ResourceKey::BindGroupLayout(id) => self.layouts.contains_key(id),
            ResourceKey::BindGroup(id) => self.bind_groups.contains_key(id),
            ResourceKey::Pipeline(id) => self.pipelines.contains_key(id),
        }
    }

    pub fn label(&self, key: impl Into<ResourceKey>) -> Option<&str> {
        let key = key.into();
        self.records()
            .into_iter()
            .find(|(k, ..)| *k == key)
            .map(|(_, label, ..)| label)
    }

    /// Objects this one references and which must outlive it.
    pub fn dependencies(&self, key: impl Into<ResourceKey>) -> Vec<ResourceKey> {
        let key = key.into();
        self.records()
            .into_iter()
            .find(|(k, ..)| *k == key)
            .map(|(_, _, deps, _)| deps.to_vec())
            .unwrap_or_default()
    }

    /// Number of live objects referencing `key`.
    pub fn dependents(&self, key: impl Into<ResourceKey>) -> usize {
        let key = key.into();
        self.records()
            .iter()
            .filter(|(_, _, deps, _)| deps.contains(&key))
            .count()
    }

    /// The order [`release_all`](Self::release_all) frees entries in:
    /// by tier, then newest first.
    pub fn release_order(&self) -> Vec<ResourceKey> {
        let mut records: Vec<(ResourceKey, u64)> = self
            .records()
            .into_iter()
            .map(|(key, _, _, seq)| (key, seq))
            .collect();
        records.sort_by_key(|(key, seq)| (key.tier(), Reverse(*seq)));
        records.into_iter().map(|(key, _)| key).collect()
    }

    /// Frees one entry's handle.
    ///
    /// Fails while anything still references it, and for mappable buffers
    /// that were not destroyed first.
    pub fn release(&mut self, key: impl Into<ResourceKey>) -> Result<()> {
        let key = key.into();
        let label = self
            .label(key)
            .ok_or(GpuError::UnknownResource(key.kind()))?
            .to_string();

        let dependents = self.dependents(key);
        if dependents > 0 {
            return Err(GpuError::ResourceInUse {
                resource: label,
                dependents,
            });
        }

        if let ResourceKey::Buffer(id) = key {
            let meta = &self.buffers[id].meta;
            if meta.mapped.is_some() {
                return Err(GpuError::BufferMapped(label));
            }
            if meta.is_mappable() && !meta.destroyed {
                return Err(GpuError::ReleaseBeforeDestroy(label));
            }
        }

        self.remove(key);
        log::debug!("released {} `{label}`", key.kind());
        Ok(())
    }

    /// Frees every entry, dependents strictly before their dependencies.
    ///
    /// Mappable buffers that are still alive are destroyed first.
    pub fn release_all(&mut self, backend: &B) {
        let order = self.release_order();
        let count = order.len();

        for key in order {
            if let ResourceKey::Buffer(id) = key {
                let entry = &mut self.buffers[id];
                if entry.meta.is_mappable() && !entry.meta.destroyed {
                    backend.destroy_buffer(&entry.handle);
                    entry.meta.destroyed = true;
                }
            }
            self.remove(key);
            log::trace!("released {}", key.kind());
        }

        if count > 0 {
            log::debug!("resource registry released {count} object(s)");
        }
    }

    fn remove(&mut self, key: ResourceKey) {
        match key {
            ResourceKey::Buffer(id) => drop(self.buffers.remove(id)),
            ResourceKey::Texture(id) => drop(self.textures.remove(id)),
            ResourceKey::TextureView(id) => drop(self.views.remove(id)),
            ResourceKey::Sampler(id) => drop(self.samplers.remove(id)),
            ResourceKey::ShaderModule(id) => drop(self.shaders.remove(id)),
            ResourceKey::BindGroupLayout(id) => drop(self.layouts.remove(id)),
            ResourceKey::BindGroup(id) => drop(self.bind_groups.remove(id)),
            ResourceKey::Pipeline(id) => drop(self.pipelines.remove(id)),
        }
    }

    // ── shader modules ────────────────────────────────────────────────────

    /// Compiles `source` into a module that pipelines may share.
    ///
    /// Pipelines built from a registered module keep it alive, since it is
    /// part of their rebuild recipe.
    pub fn create_shader_module(
        &mut self,
        session: &DeviceSession<B>,
        source: &ShaderSource,
    ) -> Result<ShaderModuleId> {
        let handle = session
            .backend()
            .create_shader_module(session.device(), source)?;
        let label = source.label.clone().unwrap_or_else(|| "shader".to_string());
        let entry = self.entry(handle, (), label, Vec::new());
        Ok(self.shaders.insert(entry))
    }
}
