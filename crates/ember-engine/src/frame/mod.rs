//! Per-frame rendering: the draw list a consumer fills and the renderer
//! that turns it into one submitted, presented render pass.

mod draw_list;
mod renderer;

pub use draw_list::{Draw, DrawBatch, DrawList};
pub use renderer::{FrameOutcome, FrameRenderer, FrameState};
