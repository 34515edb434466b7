//! GPU-side objects owned by the session and the edges between them.
//!
//! Every creation call validates its descriptor against the adapter limits
//! and the declared usages before anything reaches the backend, so caller
//! errors surface at the call that caused them.

mod binding;
mod buffer;
mod image;
mod registry;
mod texture;

pub use binding::{BindGroupEntry, BindingResource};
pub use buffer::{BufferMapping, COPY_ALIGNMENT, MAP_ALIGNMENT};
pub use image::{DecodedImage, ImageDecoder};
pub use registry::{
    BindGroupId, BindGroupLayoutId, BufferId, PipelineId, ResourceKey, ResourceRegistry,
    SamplerId, ShaderModuleId, TextureId, TextureViewId,
};

