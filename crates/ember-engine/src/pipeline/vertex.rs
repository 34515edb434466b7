use std::collections::HashSet;

use crate::error::{GpuError, Result};

/// Vertex strides and attribute offsets must be multiples of this.
pub const VERTEX_ALIGNMENT: u64 = 4;

/// How the bytes of one vertex buffer map to shader inputs.
#[derive(Debug, Clone, PartialEq)]
pub struct VertexBufferLayout {
    pub stride: u64,
    pub step_mode: wgpu::VertexStepMode,
    pub attributes: Vec<wgpu::VertexAttribute>,
}

impl VertexBufferLayout {
    /// Per-vertex layout with no attributes yet.
    pub fn new(stride: u64) -> Self {
        Self {
            stride,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: Vec::new(),
        }
    }

    /// Per-instance layout with no attributes yet.
    pub fn instanced(stride: u64) -> Self {
        Self {
            step_mode: wgpu::VertexStepMode::Instance,
            ..Self::new(stride)
        }
    }

    pub fn attribute(mut self, format: wgpu::VertexFormat, offset: u64, location: u32) -> Self {
        self.attributes.push(wgpu::VertexAttribute {
            format,
            offset,
            shader_location: location,
        });
        self
    }

    /// Appends attributes built with `wgpu::vertex_attr_array!`.
    pub fn with_attributes(mut self, attributes: &[wgpu::VertexAttribute]) -> Self {
        self.attributes.extend_from_slice(attributes);
        self
    }

    pub fn to_wgpu(&self) -> wgpu::VertexBufferLayout<'_> {
        wgpu::VertexBufferLayout {
            array_stride: self.stride,
            step_mode: self.step_mode,
            attributes: &self.attributes,
        }
    }

    fn validate(&self, slot: usize, limits: &wgpu::Limits) -> Result<()> {
        if self.stride == 0 || self.stride % VERTEX_ALIGNMENT != 0 {
            return Err(GpuError::InvalidVertexLayout(format!(
                "buffer {slot}: stride {} is not a positive multiple of {VERTEX_ALIGNMENT}",
                self.stride
            )));
        }
        if self.stride > u64::from(limits.max_vertex_buffer_array_stride) {
            return Err(GpuError::InvalidVertexLayout(format!(
                "buffer {slot}: stride {} exceeds the limit {}",
                self.stride, limits.max_vertex_buffer_array_stride
            )));
        }
        for attr in &self.attributes {
            let size = attr.format.size();
            if attr.offset % size.min(VERTEX_ALIGNMENT) != 0 {
                return Err(GpuError::InvalidVertexLayout(format!(
                    "buffer {slot}: location {} offset {} is misaligned for {:?}",
                    attr.shader_location, attr.offset, attr.format
                )));
            }
            if attr.offset + size > self.stride {
                return Err(GpuError::InvalidVertexLayout(format!(
                    "buffer {slot}: location {} ({:?} at offset {}) overflows stride {}",
                    attr.shader_location, attr.format, attr.offset, self.stride
                )));
            }
        }
        Ok(())
    }
}

/// Checks a full vertex state: every layout, buffer and attribute limits,
/// and shader locations unique across all buffers.
pub(crate) fn validate_vertex_state(layouts: &[VertexBufferLayout], limits: &wgpu::Limits) -> Result<()> {
    if layouts.len() > limits.max_vertex_buffers as usize {
        return Err(GpuError::InvalidVertexLayout(format!(
            "{} vertex buffers exceed the limit {}",
            layouts.len(),
            limits.max_vertex_buffers
        )));
    }

    let mut locations = HashSet::new();
    for (slot, layout) in layouts.iter().enumerate() {
        layout.validate(slot, limits)?;
        for attr in &layout.attributes {
            if attr.shader_location >= limits.max_vertex_attributes {
                return Err(GpuError::InvalidVertexLayout(format!(
                    "location {} exceeds the limit {}",
                    attr.shader_location, limits.max_vertex_attributes
                )));
            }
            if !locations.insert(attr.shader_location) {
                return Err(GpuError::DuplicateShaderLocation {
                    location: attr.shader_location,
                });
            }
        }
    }
    Ok(())
}
