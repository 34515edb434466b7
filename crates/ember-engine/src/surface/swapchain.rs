use crate::backend::{Backend, SurfaceConfig, TextureDesc, ViewDesc};
use crate::device::{DeviceSession, SessionConfig};
use crate::error::{GpuError, Result};

use super::select::{choose_alpha_mode, choose_present_mode, choose_surface_format};

/// Result of a [`Swapchain::configure`] call.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ConfigureOutcome {
    /// The surface was configured; `format_changed` reports whether the
    /// negotiated color format differs from the previous one.
    Configured { format_changed: bool },
    /// A zero-sized target (minimized window). The size is recorded and the
    /// surface keeps its previous configuration.
    Suspended,
}

struct DepthAttachment<B: Backend> {
    view: B::TextureView,
    texture: B::Texture,
}

/// Presentation state of the session's surface.
///
/// Owns the depth attachment when the session declares a depth format; the
/// attachment is recreated at the surface's size on every configuration.
pub struct Swapchain<B: Backend> {
    depth: Option<DepthAttachment<B>>,

    config: Option<SurfaceConfig>,
    format: wgpu::TextureFormat,
    alpha_mode: wgpu::CompositeAlphaMode,
    present_mode: wgpu::PresentMode,
    latency: u32,
    prefer_srgb: bool,
    depth_format: Option<wgpu::TextureFormat>,

    size: (u32, u32),
    configure_count: u64,
}

impl<B: Backend> Swapchain<B> {
    /// Negotiates presentation parameters without configuring the surface yet.
    pub fn prepare(session: &DeviceSession<B>, config: &SessionConfig) -> Result<Self> {
        let caps = session.surface_capabilities();
        let format = choose_surface_format(&caps, config.prefer_srgb).ok_or_else(|| {
            GpuError::SurfaceUnavailable("surface is incompatible with the adapter".into())
        })?;
        let alpha_mode = choose_alpha_mode(&caps, config.alpha_mode);
        let present_mode = choose_present_mode(&caps, config.present_mode);

        if let Some(depth) = config
            .depth_format
            .filter(|f| !f.is_depth_stencil_format())
        {
            return Err(GpuError::InvalidTextureLayout(format!(
                "{depth:?} is not a depth format"
            )));
        }

        log::info!("surface format: {format:?}, present mode: {present_mode:?}, alpha: {alpha_mode:?}");

        Ok(Self {
            depth: None,
            config: None,
            format,
            alpha_mode,
            present_mode,
            latency: config.desired_maximum_frame_latency,
            prefer_srgb: config.prefer_srgb,
            depth_format: config.depth_format,
            size: (0, 0),
            configure_count: 0,
        })
    }

    /// Configures the surface for `width` x `height` physical pixels.
    ///
    /// Each call replaces the previous configuration and depth attachment.
    pub fn configure(&mut self, session: &DeviceSession<B>, width: u32, height: u32) -> Result<ConfigureOutcome> {
        self.size = (width, height);
        if width == 0 || height == 0 {
            log::debug!("surface suspended at {width}x{height}");
            return Ok(ConfigureOutcome::Suspended);
        }

        let caps = session.surface_capabilities();
        let format = choose_surface_format(&caps, self.prefer_srgb).ok_or_else(|| {
            GpuError::SurfaceUnavailable("surface lost every supported format".into())
        })?;
        let format_changed = format != self.format;
        if format_changed {
            log::info!("surface format changed: {:?} -> {format:?}", self.format);
        }
        self.format = format;

        let max = session.report().limits.max_texture_dimension_2d;
        let config = SurfaceConfig {
            format,
            present_mode: self.present_mode,
            alpha_mode: self.alpha_mode,
            width: width.min(max),
            height: height.min(max),
            desired_maximum_frame_latency: self.latency,
        };

        let backend = session.backend();
        backend.configure_surface(session.surface(), session.device(), &config);
        self.config = Some(config);
        self.configure_count += 1;

        // The old attachment goes before its replacement is allocated.
        self.depth = None;
        if let Some(depth_format) = self.depth_format {
            let texture = backend.create_texture(
                session.device(),
                &TextureDesc {
                    label: Some("ember depth"),
                    width: config.width,
                    height: config.height,
                    format: depth_format,
                    usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
                    mip_level_count: 1,
                    sample_count: 1,
                },
            );
            let view = backend.create_texture_view(&texture, &ViewDesc::default());
            self.depth = Some(DepthAttachment { view, texture });
        }

        log::debug!(
            "surface configured: {}x{} {:?} (#{})",
            config.width,
            config.height,
            format,
            self.configure_count
        );
        Ok(ConfigureOutcome::Configured { format_changed })
    }

    /// Configures again at the last recorded size.
    pub fn reconfigure(&mut self, session: &DeviceSession<B>) -> Result<ConfigureOutcome> {
        let (width, height) = self.size;
        self.configure(session, width, height)
    }

    /// Negotiated color format; pipelines must target it.
    pub fn format(&self) -> wgpu::TextureFormat {
        self.format
    }

    pub fn depth_format(&self) -> Option<wgpu::TextureFormat> {
        self.depth_format
    }

    /// Most recently requested size.
    pub fn size(&self) -> (u32, u32) {
        self.size
    }

    /// The live configuration, if the surface was ever configured.
    pub fn config(&self) -> Option<&SurfaceConfig> {
        self.config.as_ref()
    }

    pub fn is_suspended(&self) -> bool {
        self.config.is_none() || self.size.0 == 0 || self.size.1 == 0
    }

    pub fn configure_count(&self) -> u64 {
        self.configure_count
    }

    pub fn depth_view(&self) -> Option<&B::TextureView> {
        self.depth.as_ref().map(|d| &d.view)
    }

    /// Frees the depth attachment ahead of session shutdown.
    pub fn release_depth(&mut self) {
        if let Some(DepthAttachment { view, texture }) = self.depth.take() {
            drop(view);
            drop(texture);
            log::debug!("depth attachment released");
        }
    }
}
