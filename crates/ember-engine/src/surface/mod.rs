//! Surface/swapchain management: format negotiation, configuration on
//! startup, resize and recovery, and the depth attachment sized to match.

mod select;
mod swapchain;

pub use swapchain::{ConfigureOutcome, Swapchain};
