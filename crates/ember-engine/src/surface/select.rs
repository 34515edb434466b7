use crate::backend::SurfaceCaps;

/// Picks the surface format, preferring an sRGB one when asked to.
///
/// `None` when the surface reports no formats for this adapter.
pub(crate) fn choose_surface_format(caps: &SurfaceCaps, prefer_srgb: bool) -> Option<wgpu::TextureFormat> {
    if caps.formats.is_empty() {
        return None;
    }

    if prefer_srgb {
        let preferred = [
            wgpu::TextureFormat::Bgra8UnormSrgb,
            wgpu::TextureFormat::Rgba8UnormSrgb,
        ];
        for f in preferred {
            if caps.formats.contains(&f) {
                return Some(f);
            }
        }
    }

    caps.formats.first().copied()
}

pub(crate) fn choose_alpha_mode(
    caps: &SurfaceCaps,
    requested: Option<wgpu::CompositeAlphaMode>,
) -> wgpu::CompositeAlphaMode {
    requested
        .filter(|m| caps.alpha_modes.contains(m))
        .or_else(|| caps.alpha_modes.first().copied())
        .unwrap_or(wgpu::CompositeAlphaMode::Auto)
}

/// The requested mode when supported, FIFO otherwise (always available).
pub(crate) fn choose_present_mode(caps: &SurfaceCaps, requested: wgpu::PresentMode) -> wgpu::PresentMode {
    if caps.present_modes.contains(&requested) {
        requested
    } else {
        if requested != wgpu::PresentMode::Fifo {
            log::warn!("present mode {requested:?} unsupported, falling back to Fifo");
        }
        wgpu::PresentMode::Fifo
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(formats: &[wgpu::TextureFormat]) -> SurfaceCaps {
        SurfaceCaps {
            formats: formats.to_vec(),
            present_modes: vec![wgpu::PresentMode::Fifo],
            alpha_modes: vec![wgpu::CompositeAlphaMode::Opaque],
        }
    }

    #[test]
    fn prefers_srgb_when_offered() {
        let caps = caps(&[wgpu::TextureFormat::Bgra8Unorm, wgpu::TextureFormat::Rgba8UnormSrgb]);
        assert_eq!(
            choose_surface_format(&caps, true),
            Some(wgpu::TextureFormat::Rgba8UnormSrgb)
        );
        assert_eq!(
            choose_surface_format(&caps, false),
            Some(wgpu::TextureFormat::Bgra8Unorm)
        );
    }

    #[test]
    fn no_formats_means_no_choice() {
        assert_eq!(choose_surface_format(&caps(&[]), true), None);
    }

    #[test]
    fn unsupported_modes_fall_back() {
        let caps = caps(&[wgpu::TextureFormat::Bgra8Unorm]);
        assert_eq!(
            choose_present_mode(&caps, wgpu::PresentMode::Mailbox),
            wgpu::PresentMode::Fifo
        );
        assert_eq!(
            choose_alpha_mode(&caps, Some(wgpu::CompositeAlphaMode::PreMultiplied)),
            wgpu::CompositeAlphaMode::Opaque
        );
    }
}
