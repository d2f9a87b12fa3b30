use std::fmt;

use crate::coords::Viewport;
use crate::paint::Color;

macro_rules! define_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
        pub struct $name(u64);

        impl $name {
            #[inline]
            pub const fn from_raw(raw: u64) -> Self {
                Self(raw)
            }

            #[inline]
            pub const fn raw(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}#{}", stringify!($name), self.0)
            }
        }
    };
}

define_handle!(
    /// Logical GPU device.
    DeviceId
);
define_handle!(
    /// FIFO submission queue.
    QueueId
);
define_handle!(
    /// Presentation ring bound to a window and a queue.
    SwapChainId
);
define_handle!(
    /// GPU resource (back buffer or depth-stencil texture).
    ResourceId
);
define_handle!(
    /// Backing memory for recorded commands.
    AllocatorId
);
define_handle!(
    /// Reusable command list.
    CommandListId
);
define_handle!(
    /// GPU-to-CPU completion counter.
    FenceId
);

/// Monotonic id source shared by every object a backend creates.
///
/// Ids are never reused, so a stale handle cannot alias a newer object.
#[derive(Debug)]
pub(crate) struct HandleCounter {
    next: u64,
}

impl HandleCounter {
    pub(crate) const fn new() -> Self {
        Self { next: 1 }
    }

    pub(crate) fn next(&mut self) -> u64 {
        let id = self.next;
        self.next += 1;
        id
    }
}

/// Driver / adapter flavour tried during device creation.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum DriverType {
    /// A physical GPU.
    Hardware,
    /// Software rasterizer shipped with the platform.
    Warp,
    /// Reference rasterizer; correctness only.
    Reference,
}

impl DriverType {
    /// Hardware first, then software fallbacks.
    pub const DEFAULT_ORDER: [DriverType; 2] = [DriverType::Hardware, DriverType::Warp];

    pub fn is_software(self) -> bool {
        !matches!(self, DriverType::Hardware)
    }
}

impl fmt::Display for DriverType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DriverType::Hardware => "hardware",
            DriverType::Warp => "warp",
            DriverType::Reference => "reference",
        })
    }
}

/// Minimum capability tier a device must reach.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum FeatureLevel {
    Level11_0,
    Level11_1,
    Level12_0,
    Level12_1,
}

impl fmt::Display for FeatureLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FeatureLevel::Level11_0 => "11_0",
            FeatureLevel::Level11_1 => "11_1",
            FeatureLevel::Level12_0 => "12_0",
            FeatureLevel::Level12_1 => "12_1",
        })
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum QueueKind {
    /// Graphics + compute + copy.
    Direct,
    Compute,
    Copy,
}

/// Back-buffer pixel format.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum SurfaceFormat {
    Rgba8UnormSrgb,
    Bgra8UnormSrgb,
    Rgba8Unorm,
    Bgra8Unorm,
    Rgba16Float,
}

impl SurfaceFormat {
    pub fn is_srgb(self) -> bool {
        matches!(self, SurfaceFormat::Rgba8UnormSrgb | SurfaceFormat::Bgra8UnormSrgb)
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum DepthFormat {
    Depth32Float,
    Depth24PlusStencil8,
}

/// Usage state of a resource as seen by the GPU.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ResourceState {
    /// Owned by the presentation engine; the only legal state for `present`.
    Present,
    RenderTarget,
    DepthWrite,
    CopySource,
    CopyDest,
}

impl fmt::Display for ResourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ResourceState::Present => "present",
            ResourceState::RenderTarget => "render-target",
            ResourceState::DepthWrite => "depth-write",
            ResourceState::CopySource => "copy-source",
            ResourceState::CopyDest => "copy-dest",
        })
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum DescriptorHeapKind {
    RenderTarget,
    DepthStencil,
}

/// CPU-visible descriptor address. `0` is the null handle.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd, Default)]
pub struct DescriptorHandle(pub u64);

impl DescriptorHandle {
    pub const NULL: Self = Self(0);

    #[inline]
    pub fn is_null(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub fn offset(self, slots: u32, increment: u32) -> Self {
        Self(self.0 + u64::from(slots) * u64::from(increment))
    }
}

impl fmt::Display for DescriptorHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Layout of a descriptor heap as reported by the backend.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct DescriptorHeapInfo {
    pub kind: DescriptorHeapKind,
    pub base: DescriptorHandle,
    pub increment: u32,
    pub capacity: u32,
}

impl DescriptorHeapInfo {
    /// Returns the handle of `slot`, or `None` when out of range.
    pub fn handle(&self, slot: u32) -> Option<DescriptorHandle> {
        (slot < self.capacity).then(|| self.base.offset(slot, self.increment))
    }

    pub fn contains(&self, handle: DescriptorHandle) -> bool {
        if handle.0 < self.base.0 || self.increment == 0 {
            return false;
        }
        let delta = handle.0 - self.base.0;
        delta % u64::from(self.increment) == 0
            && delta / u64::from(self.increment) < u64::from(self.capacity)
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct SwapChainDesc {
    pub width: u32,
    pub height: u32,
    pub format: SurfaceFormat,
    pub buffer_count: u32,
    /// `0` presents immediately; `>= 1` waits for that many vertical blanks.
    pub sync_interval: u32,
}

/// Description of the device a backend created.
#[derive(Debug, Clone, PartialEq)]
pub struct AdapterInfo {
    pub name: String,
    pub driver: DriverType,
    pub backend: String,
    pub feature_level: FeatureLevel,
}

/// A single command recorded into an open command list.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum GpuCommand {
    SetViewport(Viewport),
    Barrier {
        resource: ResourceId,
        before: ResourceState,
        after: ResourceState,
    },
    ClearRenderTarget {
        view: DescriptorHandle,
        color: Color,
    },
    ClearDepthStencil {
        view: DescriptorHandle,
        depth: f32,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn heap() -> DescriptorHeapInfo {
        DescriptorHeapInfo {
            kind: DescriptorHeapKind::RenderTarget,
            base: DescriptorHandle(0x1000),
            increment: 32,
            capacity: 4,
        }
    }

    #[test]
    fn heap_handles_are_strided() {
        let h = heap();
        assert_eq!(h.handle(0), Some(DescriptorHandle(0x1000)));
        assert_eq!(h.handle(3), Some(DescriptorHandle(0x1000 + 96)));
        assert_eq!(h.handle(4), None);
    }

    #[test]
    fn heap_contains_only_slot_addresses() {
        let h = heap();
        assert!(h.contains(DescriptorHandle(0x1020)));
        assert!(!h.contains(DescriptorHandle(0x1010)));
        assert!(!h.contains(DescriptorHandle(0x1080)));
        assert!(!h.contains(DescriptorHandle::NULL));
    }

    #[test]
    fn handle_counter_never_repeats() {
        let mut c = HandleCounter::new();
        let a = c.next();
        let b = c.next();
        assert!(b > a);
        assert_ne!(a, 0);
    }
}
