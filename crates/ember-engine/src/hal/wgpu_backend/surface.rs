use crate::hal::{BackendError, DepthFormat, SurfaceFormat};

pub(crate) fn to_wgpu_format(format: SurfaceFormat) -> wgpu::TextureFormat {
    match format {
        SurfaceFormat::Rgba8UnormSrgb => wgpu::TextureFormat::Rgba8UnormSrgb,
        SurfaceFormat::Bgra8UnormSrgb => wgpu::TextureFormat::Bgra8UnormSrgb,
        SurfaceFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
        SurfaceFormat::Bgra8Unorm => wgpu::TextureFormat::Bgra8Unorm,
        SurfaceFormat::Rgba16Float => wgpu::TextureFormat::Rgba16Float,
    }
}

pub(crate) fn to_wgpu_depth_format(format: DepthFormat) -> wgpu::TextureFormat {
    match format {
        DepthFormat::Depth32Float => wgpu::TextureFormat::Depth32Float,
        DepthFormat::Depth24PlusStencil8 => wgpu::TextureFormat::Depth24PlusStencil8,
    }
}

/// Picks the requested format when the surface supports it, otherwise the
/// closest sRGB variant (when sRGB was requested), otherwise the first
/// supported format.
pub(crate) fn choose_surface_format(
    caps: &wgpu::SurfaceCapabilities,
    requested: SurfaceFormat,
) -> Option<wgpu::TextureFormat> {
    if caps.formats.is_empty() {
        return None;
    }

    let wanted = to_wgpu_format(requested);
    if caps.formats.contains(&wanted) {
        return Some(wanted);
    }

    if requested.is_srgb() {
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

    Some(caps.formats[0])
}

pub(crate) fn choose_alpha_mode(caps: &wgpu::SurfaceCapabilities) -> wgpu::CompositeAlphaMode {
    caps.alpha_modes
        .iter()
        .copied()
        .find(|m| *m == wgpu::CompositeAlphaMode::Opaque)
        .or_else(|| caps.alpha_modes.first().copied())
        .unwrap_or(wgpu::CompositeAlphaMode::Auto)
}

/// Maps a sync interval onto a present mode the surface supports.
///
/// `0` prefers tearing (`Immediate`), then `Mailbox`; every interval falls
/// back to `Fifo`, which is always available.
pub(crate) fn choose_present_mode(
    caps: &wgpu::SurfaceCapabilities,
    sync_interval: u32,
) -> wgpu::PresentMode {
    if sync_interval == 0 {
        for mode in [wgpu::PresentMode::Immediate, wgpu::PresentMode::Mailbox] {
            if caps.present_modes.contains(&mode) {
                return mode;
            }
        }
    }
    wgpu::PresentMode::Fifo
}

/// What to do after `get_current_texture` failed.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub(crate) enum AcquireFailure {
    /// Surface was reconfigured; acquiring again may succeed.
    Reconfigure,
    /// Nothing to render into this tick.
    Skip,
    Fatal,
}

pub(crate) fn classify_surface_error(err: &wgpu::SurfaceError) -> AcquireFailure {
    match err {
        wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated => AcquireFailure::Reconfigure,
        wgpu::SurfaceError::OutOfMemory => AcquireFailure::Fatal,
        wgpu::SurfaceError::Timeout => AcquireFailure::Skip,
        _ => AcquireFailure::Skip,
    }
}

pub(crate) fn surface_error(err: wgpu::SurfaceError) -> BackendError {
    match classify_surface_error(&err) {
        AcquireFailure::Fatal => BackendError::OutOfMemory,
        AcquireFailure::Skip | AcquireFailure::Reconfigure => {
            BackendError::FrameUnavailable(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(formats: Vec<wgpu::TextureFormat>, modes: Vec<wgpu::PresentMode>) -> wgpu::SurfaceCapabilities {
        wgpu::SurfaceCapabilities {
            formats,
            present_modes: modes,
            alpha_modes: vec![wgpu::CompositeAlphaMode::Opaque],
            usages: wgpu::TextureUsages::RENDER_ATTACHMENT,
        }
    }

    #[test]
    fn requested_format_wins_when_supported() {
        let c = caps(
            vec![wgpu::TextureFormat::Bgra8UnormSrgb, wgpu::TextureFormat::Rgba8UnormSrgb],
            vec![wgpu::PresentMode::Fifo],
        );
        assert_eq!(
            choose_surface_format(&c, SurfaceFormat::Rgba8UnormSrgb),
            Some(wgpu::TextureFormat::Rgba8UnormSrgb)
        );
    }

    #[test]
    fn srgb_request_falls_back_to_other_srgb_layout() {
        let c = caps(
            vec![wgpu::TextureFormat::Bgra8Unorm, wgpu::TextureFormat::Bgra8UnormSrgb],
            vec![wgpu::PresentMode::Fifo],
        );
        assert_eq!(
            choose_surface_format(&c, SurfaceFormat::Rgba8UnormSrgb),
            Some(wgpu::TextureFormat::Bgra8UnormSrgb)
        );
    }

    #[test]
    fn empty_caps_yield_no_format() {
        let c = caps(Vec::new(), vec![wgpu::PresentMode::Fifo]);
        assert_eq!(choose_surface_format(&c, SurfaceFormat::Rgba8Unorm), None);
    }

    #[test]
    fn sync_interval_maps_to_present_mode() {
        let c = caps(
            vec![wgpu::TextureFormat::Bgra8Unorm],
            vec![wgpu::PresentMode::Fifo, wgpu::PresentMode::Mailbox],
        );
        assert_eq!(choose_present_mode(&c, 0), wgpu::PresentMode::Mailbox);
        assert_eq!(choose_present_mode(&c, 1), wgpu::PresentMode::Fifo);
        assert_eq!(choose_present_mode(&c, 2), wgpu::PresentMode::Fifo);
    }

    #[test]
    fn lost_surface_is_reconfigured() {
        assert_eq!(
            classify_surface_error(&wgpu::SurfaceError::Lost),
            AcquireFailure::Reconfigure
        );
        assert_eq!(
            classify_surface_error(&wgpu::SurfaceError::OutOfMemory),
            AcquireFailure::Fatal
        );
    }
}
