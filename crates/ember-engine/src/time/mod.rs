//! Frame timing.
//!
//! The runtime ticks one [`FrameClock`] per window and hands the clamped delta
//! to `Lifecycle::on_render_tick`.

mod frame_clock;

pub use frame_clock::{FrameClock, FrameTime};
