//! Pipeline construction: vertex layouts, fixed-function state, and the
//! checks that tie a pipeline to the swapchain it renders into.

mod builder;
mod state;
mod vertex;

pub use builder::{PipelineBuilder, ShaderInput, rebuild_stale};
pub use state::{BlendMode, DepthState};
pub use vertex::{VERTEX_ALIGNMENT, VertexBufferLayout};

pub(crate) use builder::PipelineMeta;
