//! Ember engine crate.
//!
//! GPU session lifecycle and frame rendering on top of wgpu:
//! - [`device`]: negotiates instance, surface, adapter, device and queue
//! - [`resource`]: the registry of GPU objects and their dependency edges
//! - [`surface`]: swapchain configuration and the depth attachment
//! - [`pipeline`]: validated render pipeline construction
//! - [`frame`]: the per-frame acquire, encode, submit, present state machine
//! - [`lifecycle`]: startup, resize, tick and teardown ordering
//!
//! Everything above [`backend`] is generic over [`backend::Backend`]; the
//! headless backend runs the whole stack without a GPU.

pub mod backend;
pub mod device;
pub mod error;
pub mod frame;
pub mod lifecycle;
pub mod pipeline;
pub mod resource;
pub mod surface;

pub mod logging;
pub mod time;
pub mod window;

pub use error::{AcquireFailure, ErrorClass, GpuError, Result};
