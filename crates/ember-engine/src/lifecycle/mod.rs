//! Lifecycle sequencing.
//!
//! The driver (a window runtime, or a test) calls four hooks in order:
//! `on_load`, then any number of `on_resize` / `on_render_tick`, then
//! `on_close`. The sequencer brings components up in dependency order and
//! tears them down in reverse.

mod app;
mod sequencer;

pub use app::{App, GpuCtx};
pub use sequencer::{Lifecycle, Phase};
