use std::ops::Range;

use crate::resource::{BindGroupId, BufferId, PipelineId};

/// One draw call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Draw {
    NonIndexed {
        vertices: Range<u32>,
        instances: Range<u32>,
    },
    Indexed {
        indices: Range<u32>,
        base_vertex: i32,
        instances: Range<u32>,
    },
}

/// A pipeline, the bindings it draws with, and its draw calls.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawBatch {
    pub pipeline: PipelineId,
    pub bind_groups: Vec<(u32, BindGroupId)>,
    pub vertex_buffers: Vec<(u32, BufferId)>,
    pub index_buffer: Option<(BufferId, wgpu::IndexFormat)>,
    pub draws: Vec<Draw>,
}

impl DrawBatch {
    pub fn new(pipeline: PipelineId) -> Self {
        Self {
            pipeline,
            bind_groups: Vec::new(),
            vertex_buffers: Vec::new(),
            index_buffer: None,
            draws: Vec::new(),
        }
    }

    pub fn bind_group(&mut self, index: u32, group: BindGroupId) -> &mut Self {
        self.bind_groups.retain(|(i, _)| *i != index);
        self.bind_groups.push((index, group));
        self
    }

    pub fn vertex_buffer(&mut self, slot: u32, buffer: BufferId) -> &mut Self {
        self.vertex_buffers.retain(|(s, _)| *s != slot);
        self.vertex_buffers.push((slot, buffer));
        self
    }

    pub fn index_buffer(&mut self, buffer: BufferId, format: wgpu::IndexFormat) -> &mut Self {
        self.index_buffer = Some((buffer, format));
        self
    }

    pub fn draw(&mut self, vertices: Range<u32>, instances: Range<u32>) -> &mut Self {
        self.draws.push(Draw::NonIndexed {
            vertices,
            instances,
        });
        self
    }

    pub fn draw_indexed(&mut self, indices: Range<u32>, base_vertex: i32, instances: Range<u32>) -> &mut Self {
        self.draws.push(Draw::Indexed {
            indices,
            base_vertex,
            instances,
        });
        self
    }
}

/// What one frame's render pass draws, in order.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct DrawList {
    batches: Vec<DrawBatch>,
}

impl DrawList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a batch drawn with `pipeline`.
    pub fn batch(&mut self, pipeline: PipelineId) -> &mut DrawBatch {
        self.batches.push(DrawBatch::new(pipeline));
        let last = self.batches.len() - 1;
        &mut self.batches[last]
    }

    pub fn batches(&self) -> &[DrawBatch] {
        &self.batches
    }

    pub fn draw_count(&self) -> usize {
        self.batches.iter().map(|b| b.draws.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    pub fn clear(&mut self) {
        self.batches.clear();
    }
}
