use crate::device::RenderError;
use crate::hal::{DepthFormat, DriverType, FeatureLevel, SurfaceFormat};
use crate::paint::Color;

/// Renderer configuration, fixed at initialization.
///
/// Keep this structure stable and minimal. Add configuration flags only when a
/// concrete platform or backend requirement exists.
#[derive(Debug, Clone)]
pub struct RenderConfig {
    /// Number of back buffers in the swap chain.
    pub buffer_count: u32,

    /// Back-buffer pixel format.
    ///
    /// sRGB is typically required for correct color output.
    pub format: SurfaceFormat,

    /// `0` presents immediately (may tear); `1..=4` waits for that many
    /// vertical blanks.
    pub sync_interval: u32,

    /// Driver options tried in order during device creation.
    pub driver_order: Vec<DriverType>,

    /// Minimum capability tier the device must reach.
    pub min_feature_level: FeatureLevel,

    /// Depth-stencil target sized to the swap chain, when set.
    pub depth_format: Option<DepthFormat>,

    /// Color the back buffer is cleared to at the start of each frame.
    pub clear_color: Color,
}

impl RenderConfig {
    pub const MIN_BUFFER_COUNT: u32 = 2;
    pub const MAX_BUFFER_COUNT: u32 = 16;
    pub const MAX_SYNC_INTERVAL: u32 = 4;

    pub fn validate(&self) -> Result<(), RenderError> {
        if !(Self::MIN_BUFFER_COUNT..=Self::MAX_BUFFER_COUNT).contains(&self.buffer_count) {
            return Err(RenderError::Config(format!(
                "buffer_count {} outside {}..={}",
                self.buffer_count,
                Self::MIN_BUFFER_COUNT,
                Self::MAX_BUFFER_COUNT
            )));
        }
        if self.sync_interval > Self::MAX_SYNC_INTERVAL {
            return Err(RenderError::Config(format!(
                "sync_interval {} above {}",
                self.sync_interval,
                Self::MAX_SYNC_INTERVAL
            )));
        }
        if self.driver_order.is_empty() {
            return Err(RenderError::Config("driver_order is empty".to_string()));
        }
        if !self.clear_color.is_finite() {
            return Err(RenderError::Config("clear_color is not finite".to_string()));
        }
        Ok(())
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            buffer_count: 2,
            format: SurfaceFormat::Rgba8UnormSrgb,
            sync_interval: 1,
            driver_order: DriverType::DEFAULT_ORDER.to_vec(),
            min_feature_level: FeatureLevel::Level11_0,
            depth_format: None,
            clear_color: Color::CORNFLOWER_BLUE,
        }
    }
}
