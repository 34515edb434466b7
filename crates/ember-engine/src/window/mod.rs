//! Window + runtime loop.
//!
//! Owns the `winit` event loop and window, and drives a [`Lifecycle`](crate::lifecycle::Lifecycle)
//! presenting to that window through the wgpu backend.

mod runtime;

pub use runtime::{Runtime, RuntimeConfig};
