/// Negotiation and presentation parameters for a GPU session.
///
/// Keep this structure stable and minimal. Add configuration flags only when a
/// concrete platform or backend requirement exists.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Backends the instance may use.
    pub backends: wgpu::Backends,

    /// Adapter preference: performance vs low power.
    pub power_preference: wgpu::PowerPreference,

    /// Request the software fallback adapter.
    pub force_fallback_adapter: bool,

    /// Prefer an sRGB surface format when available.
    ///
    /// Shaders then write linear values and the hardware applies gamma.
    pub prefer_srgb: bool,

    /// Present mode (swap behavior). Falls back to FIFO when unsupported.
    pub present_mode: wgpu::PresentMode,

    /// Optional alpha mode preference for the surface.
    ///
    /// If provided but unsupported on the current surface, a supported mode is selected.
    pub alpha_mode: Option<wgpu::CompositeAlphaMode>,

    /// Required device features.
    ///
    /// Favor an empty set for portability unless a feature is strictly necessary.
    pub required_features: wgpu::Features,

    /// Limits requested from the adapter/device.
    pub required_limits: wgpu::Limits,

    /// Desired maximum frame latency for the surface.
    ///
    /// This value is a hint; support depends on platform/backend.
    pub desired_maximum_frame_latency: u32,

    /// Format of the depth attachment owned by the swapchain, if pipelines use depth.
    pub depth_format: Option<wgpu::TextureFormat>,

    /// Color the frame's render pass clears to.
    pub clear_color: wgpu::Color,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            backends: wgpu::Backends::all(),
            power_preference: wgpu::PowerPreference::HighPerformance,
            force_fallback_adapter: false,
            prefer_srgb: true,
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode: None,
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            desired_maximum_frame_latency: 2,
            depth_format: None,
            clear_color: wgpu::Color {
                r: 0.9,
                g: 0.1,
                b: 0.2,
                a: 1.0,
            },
        }
    }
}

impl SessionConfig {
    /// Defaults overridden by `WGPU_BACKEND` and `WGPU_POWER_PREF`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(backends) = wgpu::Backends::from_env() {
            config.backends = backends;
        }
        if let Some(power) = wgpu::PowerPreference::from_env() {
            config.power_preference = power;
        }
        config
    }

    pub fn with_depth(mut self, format: wgpu::TextureFormat) -> Self {
        self.depth_format = Some(format);
        self
    }

    pub fn with_clear_color(mut self, color: wgpu::Color) -> Self {
        self.clear_color = color;
        self
    }
}
