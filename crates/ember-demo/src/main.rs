//! Ember demo: a textured quad spinning in front of a perspective camera.
//!
//! Usage: `ember-demo [image.png|image.jpg]`. Without an argument a generated
//! checkerboard is used.

mod decode;
mod quad;

use anyhow::{Context, Result};
use winit::dpi::LogicalSize;

use ember_engine::device::SessionConfig;
use ember_engine::logging::{LoggingConfig, init_logging};
use ember_engine::window::{Runtime, RuntimeConfig};

use decode::TextureSource;
use quad::TexturedQuad;

fn texture_source() -> Result<TextureSource> {
    let Some(path) = std::env::args().nth(1) else {
        return Ok(TextureSource::Decoded(decode::checkerboard(256, 32)));
    };
    let bytes = std::fs::read(&path).with_context(|| format!("failed to read {path}"))?;
    log::info!("texture: {path} ({} bytes)", bytes.len());
    Ok(TextureSource::Encoded(bytes))
}

fn main() -> Result<()> {
    init_logging(LoggingConfig::default());

    let source = texture_source()?;

    let session = SessionConfig::from_env()
        .with_depth(wgpu::TextureFormat::Depth24Plus)
        .with_clear_color(wgpu::Color {
            r: 0.05,
            g: 0.06,
            b: 0.08,
            a: 1.0,
        });

    Runtime::run(
        RuntimeConfig {
            title: "ember · textured quad".to_string(),
            initial_size: LogicalSize::new(800.0, 600.0),
        },
        session,
        TexturedQuad::new(source),
    )
}
