/// Rasterizer viewport in physical pixels.
///
/// Mirrors the explicit-API viewport rectangle: an origin, an extent and the
/// depth range the rasterizer maps NDC depth into.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

impl Viewport {
    /// Full-target viewport at the origin with the `[0, 1]` depth range.
    #[inline]
    pub const fn new(width: f32, height: f32) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width,
            height,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }

    /// Full-target viewport for a surface of `width` x `height` pixels.
    #[inline]
    pub fn from_size(width: u32, height: u32) -> Self {
        Self::new(width as f32, height as f32)
    }

    #[inline]
    pub fn is_valid(self) -> bool {
        self.x.is_finite()
            && self.y.is_finite()
            && self.width > 0.0
            && self.height > 0.0
            && self.width.is_finite()
            && self.height.is_finite()
            && (0.0..=1.0).contains(&self.min_depth)
            && (0.0..=1.0).contains(&self.max_depth)
            && self.min_depth <= self.max_depth
    }

    /// Returns `(x, y, width, height, min_depth, max_depth)`.
    #[inline]
    pub fn to_array(self) -> [f32; 6] {
        [self.x, self.y, self.width, self.height, self.min_depth, self.max_depth]
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self::new(0.0, 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_size_covers_whole_target() {
        let v = Viewport::from_size(960, 540);
        assert_eq!(v.to_array(), [0.0, 0.0, 960.0, 540.0, 0.0, 1.0]);
        assert!(v.is_valid());
    }

    #[test]
    fn zero_extent_is_invalid() {
        assert!(!Viewport::from_size(0, 540).is_valid());
        assert!(!Viewport::default().is_valid());
    }

    #[test]
    fn inverted_depth_range_is_invalid() {
        let v = Viewport {
            min_depth: 1.0,
            max_depth: 0.0,
            ..Viewport::new(4.0, 4.0)
        };
        assert!(!v.is_valid());
    }

    #[test]
    fn non_finite_origin_is_invalid() {
        let nan = Viewport {
            x: f32::NAN,
            ..Viewport::new(4.0, 4.0)
        };
        let inf = Viewport {
            y: f32::INFINITY,
            ..Viewport::new(4.0, 4.0)
        };
        assert!(!nan.is_valid());
        assert!(!inf.is_valid());
    }
}
