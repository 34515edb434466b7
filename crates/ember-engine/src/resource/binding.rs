use std::collections::HashSet;

use wgpu::{BindingType, BufferBindingType, BufferUsages, ShaderStages, TextureUsages};

use crate::backend::{Backend, BindingLayoutEntry, NativeBindGroupEntry, NativeBinding};
use crate::device::DeviceSession;
use crate::error::{GpuError, Result};

use super::registry::{BindGroupMeta, LayoutMeta, ResourceKey};
use super::{BindGroupId, BindGroupLayoutId, BufferId, ResourceRegistry, SamplerId, TextureViewId};

/// A resource bound into one slot of a bind group.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BindingResource {
    /// `size: None` binds the rest of the buffer from `offset`.
    Buffer {
        id: BufferId,
        offset: u64,
        size: Option<u64>,
    },
    TextureView(TextureViewId),
    Sampler(SamplerId),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct BindGroupEntry {
    pub binding: u32,
    pub resource: BindingResource,
}

impl BindGroupEntry {
    /// Binds the whole buffer.
    pub fn buffer(binding: u32, id: BufferId) -> Self {
        Self {
            binding,
            resource: BindingResource::Buffer {
                id,
                offset: 0,
                size: None,
            },
        }
    }

    pub fn texture_view(binding: u32, id: TextureViewId) -> Self {
        Self {
            binding,
            resource: BindingResource::TextureView(id),
        }
    }

    pub fn sampler(binding: u32, id: SamplerId) -> Self {
        Self {
            binding,
            resource: BindingResource::Sampler(id),
        }
    }
}

fn check_unique(bindings: impl IntoIterator<Item = u32>) -> Result<()> {
    let mut seen = HashSet::new();
    for binding in bindings {
        if !seen.insert(binding) {
            return Err(GpuError::DuplicateBinding { binding });
        }
    }
    Ok(())
}

fn writes_from_shader(ty: &BindingType) -> bool {
    match ty {
        BindingType::Buffer {
            ty: BufferBindingType::Storage { read_only },
            ..
        } => !read_only,
        BindingType::StorageTexture { access, .. } => {
            !matches!(access, wgpu::StorageTextureAccess::ReadOnly)
        }
        _ => false,
    }
}

impl<B: Backend> ResourceRegistry<B> {
    // ── layouts ───────────────────────────────────────────────────────────

    /// Declares the shape of a bind group: each slot's kind and visible stages.
    pub fn create_bind_group_layout(
        &mut self,
        session: &DeviceSession<B>,
        label: Option<&str>,
        entries: &[BindingLayoutEntry],
    ) -> Result<BindGroupLayoutId> {
        check_unique(entries.iter().map(|e| e.binding))?;
        for entry in entries {
            if entry.visibility.is_empty() {
                return Err(GpuError::InvalidVisibility {
                    binding: entry.binding,
                    reason: "binding is visible to no shader stage",
                });
            }
            if entry.visibility.contains(ShaderStages::VERTEX) && writes_from_shader(&entry.ty) {
                return Err(GpuError::InvalidVisibility {
                    binding: entry.binding,
                    reason: "writable storage is not allowed in the vertex stage",
                });
            }
        }

        let handle = session
            .backend()
            .create_bind_group_layout(session.device(), label, entries);
        let meta = LayoutMeta {
            entries: entries.to_vec(),
        };
        let label = label.unwrap_or("bind group layout").to_string();
        let entry = self.entry(handle, meta, label, Vec::new());
        Ok(self.layouts.insert(entry))
    }

    pub fn layout_entries(&self, id: BindGroupLayoutId) -> Result<&[BindingLayoutEntry]> {
        self.layouts
            .get(id)
            .map(|e| e.meta.entries.as_slice())
            .ok_or(GpuError::UnknownResource("bind group layout"))
    }

    // ── bind groups ───────────────────────────────────────────────────────

    /// Binds concrete resources to every slot of `layout`.
    ///
    /// The group keeps its layout and every bound resource alive.
    pub fn create_bind_group(
        &mut self,
        session: &DeviceSession<B>,
        label: Option<&str>,
        layout: BindGroupLayoutId,
        entries: &[BindGroupEntry],
    ) -> Result<BindGroupId> {
        let layout_entry = self
            .layouts
            .get(layout)
            .ok_or(GpuError::UnknownResource("bind group layout"))?;
        let slots = &layout_entry.meta.entries;

        check_unique(entries.iter().map(|e| e.binding))?;
        if entries.len() != slots.len() {
            return Err(GpuError::BindingMismatch(format!(
                "layout declares {} binding(s), {} supplied",
                slots.len(),
                entries.len()
            )));
        }

        let limits = &session.report().limits;
        let mut natives = Vec::with_capacity(entries.len());
        let mut deps: Vec<ResourceKey> = vec![layout.into()];

        for entry in entries {
            let slot = slots
                .iter()
                .find(|s| s.binding == entry.binding)
                .ok_or_else(|| {
                    GpuError::BindingMismatch(format!(
                        "binding {} is not declared by the layout",
                        entry.binding
                    ))
                })?;

            let resource = match (entry.resource, &slot.ty) {
                (
                    BindingResource::Buffer { id, offset, size },
                    BindingType::Buffer {
                        ty,
                        min_binding_size,
                        ..
                    },
                ) => {
                    let buffer = self.live_buffer(id)?;
                    let (usage, operation, alignment) = match ty {
                        BufferBindingType::Uniform => (
                            BufferUsages::UNIFORM,
                            "uniform binding",
                            limits.min_uniform_buffer_offset_alignment,
                        ),
                        BufferBindingType::Storage { .. } => (
                            BufferUsages::STORAGE,
                            "storage binding",
                            limits.min_storage_buffer_offset_alignment,
                        ),
                    };
                    if !buffer.meta.usage.contains(usage) {
                        return Err(GpuError::UsageMismatch {
                            resource: buffer.label.clone(),
                            operation,
                        });
                    }
                    if offset % u64::from(alignment) != 0 {
                        return Err(GpuError::UnalignedCopy(format!(
                            "binding {} offset {offset} is not a multiple of {alignment}",
                            entry.binding
                        )));
                    }
                    let bound = size.unwrap_or(buffer.meta.size.saturating_sub(offset));
                    match offset.checked_add(bound) {
                        Some(end) if end <= buffer.meta.size => {}
                        _ => {
                            return Err(GpuError::BufferOverrun {
                                size: buffer.meta.size,
                                offset,
                                len: bound,
                            });
                        }
                    }
                    if bound == 0 || min_binding_size.is_some_and(|min| bound < min.get()) {
                        return Err(GpuError::BindingMismatch(format!(
                            "binding {} covers {bound} bytes, below the layout minimum",
                            entry.binding
                        )));
                    }
                    deps.push(id.into());
                    NativeBinding::Buffer {
                        buffer: &buffer.handle,
                        offset,
                        size,
                    }
                }
                (
                    BindingResource::TextureView(id),
                    BindingType::Texture { .. } | BindingType::StorageTexture { .. },
                ) => {
                    let view = self.view(id)?;
                    let texture = self.texture(view.meta.texture)?;
                    if texture.meta.destroyed {
                        return Err(GpuError::ResourceDestroyed(texture.label.clone()));
                    }
                    let (usage, operation) = match slot.ty {
                        BindingType::StorageTexture { .. } => {
                            (TextureUsages::STORAGE_BINDING, "storage texture binding")
                        }
                        _ => (TextureUsages::TEXTURE_BINDING, "texture binding"),
                    };
                    if !texture.meta.usage.contains(usage) {
                        return Err(GpuError::UsageMismatch {
                            resource: texture.label.clone(),
                            operation,
                        });
                    }
                    deps.push(id.into());
                    NativeBinding::TextureView(&view.handle)
                }
                (BindingResource::Sampler(id), BindingType::Sampler(_)) => {
                    let sampler = self
                        .samplers
                        .get(id)
                        .ok_or(GpuError::UnknownResource("sampler"))?;
                    deps.push(id.into());
                    NativeBinding::Sampler(&sampler.handle)
                }
                (resource, ty) => {
                    return Err(GpuError::BindingMismatch(format!(
                        "binding {} supplies {resource:?} for a {ty:?} slot",
                        entry.binding
                    )));
                }
            };

            natives.push(NativeBindGroupEntry {
                binding: entry.binding,
                resource,
            });
        }

        let handle = session.backend().create_bind_group(
            session.device(),
            label,
            &layout_entry.handle,
            &natives,
        );
        drop(natives);

        let label = label.unwrap_or("bind group").to_string();
        let meta = BindGroupMeta { layout };
        let entry = self.entry(handle, meta, label, deps);
        Ok(self.bind_groups.insert(entry))
    }

    /// The layout a bind group was created against.
    pub fn bind_group_layout(&self, id: BindGroupId) -> Result<BindGroupLayoutId> {
        self.bind_groups
            .get(id)
            .map(|e| e.meta.layout)
            .ok_or(GpuError::UnknownResource("bind group"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::headless::HeadlessBackend;
    use crate::backend::{BufferDesc, TextureDesc};
    use crate::device::SessionConfig;

    fn session() -> DeviceSession<HeadlessBackend> {
        pollster::block_on(DeviceSession::negotiate(
            HeadlessBackend::new(),
            (),
            &SessionConfig::default(),
        ))
        .unwrap()
    }

    fn uniform(binding: u32, visibility: ShaderStages) -> BindingLayoutEntry {
        BindingLayoutEntry {
            binding,
            visibility,
            ty: BindingType::Buffer {
                ty: BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
        }
    }

    fn sampled(binding: u32) -> BindingLayoutEntry {
        BindingLayoutEntry {
            binding,
            visibility: ShaderStages::FRAGMENT,
            ty: BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
        }
    }

    fn buffer(
        registry: &mut ResourceRegistry<HeadlessBackend>,
        session: &DeviceSession<HeadlessBackend>,
        usage: BufferUsages,
    ) -> BufferId {
        registry
            .create_buffer(
                session,
                &BufferDesc {
                    label: Some("uniforms"),
                    size: 256,
                    usage,
                },
            )
            .unwrap()
    }

    // ── layouts ───────────────────────────────────────────────────────────

    #[test]
    fn duplicate_layout_slot_is_rejected() {
        let session = session();
        let mut registry = ResourceRegistry::new();
        let entries = [uniform(0, ShaderStages::VERTEX), uniform(0, ShaderStages::FRAGMENT)];
        assert_eq!(
            registry.create_bind_group_layout(&session, None, &entries),
            Err(GpuError::DuplicateBinding { binding: 0 })
        );
    }

    #[test]
    fn writable_storage_is_hidden_from_vertex_stage() {
        let session = session();
        let mut registry = ResourceRegistry::new();
        let storage = BindingLayoutEntry {
            binding: 3,
            visibility: ShaderStages::VERTEX_FRAGMENT,
            ty: BindingType::Buffer {
                ty: BufferBindingType::Storage { read_only: false },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
        };
        assert!(matches!(
            registry.create_bind_group_layout(&session, None, &[storage]),
            Err(GpuError::InvalidVisibility { binding: 3, .. })
        ));
        assert!(matches!(
            registry.create_bind_group_layout(&session, None, &[uniform(1, ShaderStages::NONE)]),
            Err(GpuError::InvalidVisibility { binding: 1, .. })
        ));
    }

    // ── bind groups ───────────────────────────────────────────────────────

    #[test]
    fn group_must_match_layout_shape() {
        let session = session();
        let mut registry = ResourceRegistry::new();
        let layout = registry
            .create_bind_group_layout(&session, None, &[uniform(0, ShaderStages::VERTEX)])
            .unwrap();
        let ubo = buffer(&mut registry, &session, BufferUsages::UNIFORM);

        assert!(matches!(
            registry.create_bind_group(&session, None, layout, &[]),
            Err(GpuError::BindingMismatch(_))
        ));
        assert!(matches!(
            registry.create_bind_group(&session, None, layout, &[BindGroupEntry::buffer(1, ubo)]),
            Err(GpuError::BindingMismatch(_))
        ));
        assert_eq!(
            registry.create_bind_group(
                &session,
                None,
                layout,
                &[BindGroupEntry::buffer(0, ubo), BindGroupEntry::buffer(0, ubo)]
            ),
            Err(GpuError::DuplicateBinding { binding: 0 })
        );
    }

    #[test]
    fn uniform_slot_requires_uniform_usage() {
        let session = session();
        let mut registry = ResourceRegistry::new();
        let layout = registry
            .create_bind_group_layout(&session, None, &[uniform(0, ShaderStages::VERTEX)])
            .unwrap();
        let vbo = buffer(&mut registry, &session, BufferUsages::VERTEX);
        assert_eq!(
            registry.create_bind_group(&session, None, layout, &[BindGroupEntry::buffer(0, vbo)]),
            Err(GpuError::UsageMismatch {
                resource: "uniforms".into(),
                operation: "uniform binding"
            })
        );
    }

    #[test]
    fn binding_range_stays_inside_buffer() {
        let session = session();
        let mut registry = ResourceRegistry::new();
        let layout = registry
            .create_bind_group_layout(&session, None, &[uniform(0, ShaderStages::VERTEX)])
            .unwrap();
        let ubo = buffer(&mut registry, &session, BufferUsages::UNIFORM);
        let entry = BindGroupEntry {
            binding: 0,
            resource: BindingResource::Buffer {
                id: ubo,
                offset: 0,
                size: Some(512),
            },
        };
        assert!(matches!(
            registry.create_bind_group(&session, None, layout, &[entry]),
            Err(GpuError::BufferOverrun { .. })
        ));
    }

    #[test]
    fn sampler_in_texture_slot_is_rejected() {
        let session = session();
        let mut registry = ResourceRegistry::new();
        let layout = registry
            .create_bind_group_layout(&session, None, &[sampled(0)])
            .unwrap();
        let sampler = registry.create_sampler(&session, &Default::default()).unwrap();
        assert!(matches!(
            registry.create_bind_group(&session, None, layout, &[BindGroupEntry::sampler(0, sampler)]),
            Err(GpuError::BindingMismatch(_))
        ));
    }

    #[test]
    fn group_depends_on_layout_and_resources() {
        let session = session();
        let mut registry = ResourceRegistry::new();
        let layout = registry
            .create_bind_group_layout(&session, Some("material"), &[sampled(0)])
            .unwrap();
        let texture = registry
            .create_texture(
                &session,
                &TextureDesc {
                    label: Some("albedo"),
                    width: 2,
                    height: 2,
                    format: wgpu::TextureFormat::Rgba8UnormSrgb,
                    usage: TextureUsages::TEXTURE_BINDING,
                    mip_level_count: 1,
                    sample_count: 1,
                },
            )
            .unwrap();
        let view = registry.create_view(&session, texture, &Default::default()).unwrap();
        let group = registry
            .create_bind_group(&session, None, layout, &[BindGroupEntry::texture_view(0, view)])
            .unwrap();

        assert_eq!(registry.bind_group_layout(group), Ok(layout));
        assert_eq!(
            registry.dependencies(group),
            vec![ResourceKey::from(layout), ResourceKey::from(view)]
        );
        assert!(matches!(
            registry.release(layout),
            Err(GpuError::ResourceInUse { dependents: 1, .. })
        ));
    }
}
