/// Depth test applied by a pipeline.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct DepthState {
    pub format: wgpu::TextureFormat,
    pub compare: wgpu::CompareFunction,
    pub write_enabled: bool,
}

impl DepthState {
    /// Less-than test with depth writes.
    pub fn new(format: wgpu::TextureFormat) -> Self {
        Self {
            format,
            compare: wgpu::CompareFunction::Less,
            write_enabled: true,
        }
    }
}

/// Color blending of a pipeline's target. There is no implicit default.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum BlendMode {
    /// Source overwrites destination.
    Replace,
    /// Straight (non-premultiplied) alpha.
    Alpha,
    /// Premultiplied alpha: `src + dst * (1 - src.a)`.
    PremultipliedAlpha,
    Custom(wgpu::BlendState),
}

impl BlendMode {
    pub fn to_state(self) -> wgpu::BlendState {
        match self {
            BlendMode::Replace => wgpu::BlendState::REPLACE,
            BlendMode::Alpha => wgpu::BlendState::ALPHA_BLENDING,
            BlendMode::PremultipliedAlpha => {
                let component = wgpu::BlendComponent {
                    src_factor: wgpu::BlendFactor::One,
                    dst_factor: wgpu::BlendFactor::OneMinusSrcAlpha,
                    operation: wgpu::BlendOperation::Add,
                };
                wgpu::BlendState {
                    color: component,
                    alpha: component,
                }
            }
            BlendMode::Custom(state) => state,
        }
    }
}
