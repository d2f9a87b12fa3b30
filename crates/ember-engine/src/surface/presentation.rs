use crate::device::RenderError;
use crate::hal::{
    Backend, BackendResult, DepthFormat, DescriptorHandle, DescriptorHeapKind, DeviceId, QueueId,
    ResourceId, SurfaceFormat, SwapChainDesc, SwapChainId,
};

use super::descriptor::DescriptorBanks;

/// The back buffer the current frame renders into.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct BackBuffer {
    pub index: u32,
    pub resource: ResourceId,
    pub view: DescriptorHandle,
}

#[derive(Debug)]
struct DepthTarget {
    format: DepthFormat,
    banks: DescriptorBanks,
    resource: Option<ResourceId>,
    view: DescriptorHandle,
}

/// Swap chain plus the render-target views of its back buffers.
///
/// Back buffers and views are recreated on every resize; the swap chain and
/// its queue binding live as long as the surface.
#[derive(Debug)]
pub struct PresentationSurface {
    device: DeviceId,
    chain: SwapChainId,
    width: u32,
    height: u32,
    format: SurfaceFormat,
    buffer_count: u32,
    sync_interval: u32,
    buffers: Vec<Option<ResourceId>>,
    views: Vec<DescriptorHandle>,
    rtv: DescriptorBanks,
    depth: Option<DepthTarget>,
    released: bool,
}

impl PresentationSurface {
    /// Creates the swap chain on `queue` and builds views for every back buffer.
    pub fn create<B: Backend>(
        backend: &mut B,
        device: DeviceId,
        queue: QueueId,
        window: &B::Window,
        desc: &SwapChainDesc,
        depth_format: Option<DepthFormat>,
    ) -> Result<Self, RenderError> {
        let chain = backend
            .create_swap_chain(queue, window, desc)
            .map_err(RenderError::creation("swap chain"))?;

        let rtv = DescriptorBanks::create(
            backend,
            device,
            DescriptorHeapKind::RenderTarget,
            desc.buffer_count,
        )
        .map_err(RenderError::creation("render-target heap"))?;

        let depth = match depth_format {
            Some(format) => Some(DepthTarget {
                format,
                banks: DescriptorBanks::create(backend, device, DescriptorHeapKind::DepthStencil, 1)
                    .map_err(RenderError::creation("depth-stencil heap"))?,
                resource: None,
                view: DescriptorHandle::NULL,
            }),
            None => None,
        };

        let mut surface = Self {
            device,
            chain,
            width: desc.width,
            height: desc.height,
            format: desc.format,
            buffer_count: desc.buffer_count,
            sync_interval: desc.sync_interval,
            buffers: vec![None; desc.buffer_count as usize],
            views: vec![DescriptorHandle::NULL; desc.buffer_count as usize],
            rtv,
            depth,
            released: false,
        };

        surface
            .acquire_targets(backend)
            .map_err(RenderError::creation("back-buffer views"))?;

        log::info!(
            "created {chain}: {}x{} {:?}, {} buffers",
            desc.width,
            desc.height,
            desc.format,
            desc.buffer_count
        );
        Ok(surface)
    }

    /// Back buffer the next frame renders into, or `None` when the targets
    /// are invalid (failed resize, minimized window, or released surface).
    pub fn current_back_buffer<B: Backend>(
        &self,
        backend: &mut B,
    ) -> BackendResult<Option<BackBuffer>> {
        if !self.is_renderable() {
            return Ok(None);
        }

        let index = backend.current_back_buffer_index(self.chain)?;
        let resource = self.buffers.get(index as usize).copied().flatten();
        let view = self
            .views
            .get(index as usize)
            .copied()
            .unwrap_or(DescriptorHandle::NULL);

        Ok(resource
            .filter(|_| !view.is_null())
            .map(|resource| BackBuffer {
                index,
                resource,
                view,
            }))
    }

    pub fn present<B: Backend>(&self, backend: &mut B, sync_interval: u32) -> BackendResult<()> {
        backend.present(self.chain, sync_interval)
    }

    /// Recreates the back buffers at the new size.
    ///
    /// No GPU work referencing the old back buffers may be in flight. On
    /// failure the last good size is kept and every view stays null until a
    /// later resize succeeds. Zero extents are ignored; any other size,
    /// including the current one, rebuilds every target.
    pub fn resize<B: Backend>(
        &mut self,
        backend: &mut B,
        width: u32,
        height: u32,
    ) -> Result<(), RenderError> {
        if self.released {
            return Err(RenderError::ShutDown);
        }
        if width == 0 || height == 0 {
            log::debug!("ignoring {width}x{height} resize of {}", self.chain);
            return Ok(());
        }
        let (last_width, last_height) = (self.width, self.height);
        match self.rebuild(backend, width, height) {
            Ok(()) => {
                log::info!("resized {} to {width}x{height}", self.chain);
                Ok(())
            }
            Err(source) => {
                self.width = last_width;
                self.height = last_height;
                log::error!(
                    "resize of {} to {width}x{height} failed: {source}; rendering paused at {}x{}",
                    self.chain,
                    self.width,
                    self.height
                );
                Err(RenderError::Resize {
                    width,
                    height,
                    source,
                })
            }
        }
    }

    /// Drops every back-buffer reference and view. Idempotent.
    pub fn release<B: Backend>(&mut self, backend: &mut B) {
        if self.released {
            return;
        }
        self.release_targets(backend);
        self.released = true;
        log::debug!("released {}", self.chain);
    }

    /// Release, resize, re-fetch, re-view. The order is mandatory: the chain
    /// refuses to resize while any back-buffer reference is alive.
    fn rebuild<B: Backend>(&mut self, backend: &mut B, width: u32, height: u32) -> BackendResult<()> {
        self.release_targets(backend);
        backend.resize_swap_chain(self.chain, width, height)?;
        self.width = width;
        self.height = height;
        self.acquire_targets(backend)
    }

    /// Fetches the back buffers, then writes their views into a fresh bank.
    fn acquire_targets<B: Backend>(&mut self, backend: &mut B) -> BackendResult<()> {
        let result = self.try_acquire_targets(backend);
        if result.is_err() {
            self.release_targets(backend);
        }
        result
    }

    fn try_acquire_targets<B: Backend>(&mut self, backend: &mut B) -> BackendResult<()> {
        for index in 0..self.buffer_count {
            let resource = backend.swap_chain_buffer(self.chain, index)?;
            self.buffers[index as usize] = Some(resource);
        }

        self.rtv.rotate();
        for (index, buffer) in self.buffers.iter().enumerate() {
            let Some(resource) = *buffer else { continue };
            let Some(view) = self.rtv.handle(index as u32) else { continue };
            backend.create_render_target_view(resource, view)?;
            self.views[index] = view;
        }

        if let Some(depth) = self.depth.as_mut() {
            let resource =
                backend.create_depth_stencil(self.device, self.width, self.height, depth.format)?;
            depth.resource = Some(resource);

            depth.banks.rotate();
            if let Some(view) = depth.banks.handle(0) {
                backend.create_depth_stencil_view(resource, view)?;
                depth.view = view;
            }
        }

        Ok(())
    }

    fn release_targets<B: Backend>(&mut self, backend: &mut B) {
        for buffer in self.buffers.iter_mut() {
            if let Some(resource) = buffer.take() {
                backend.release_resource(resource);
            }
        }
        self.views.iter_mut().for_each(|v| *v = DescriptorHandle::NULL);

        if let Some(depth) = self.depth.as_mut() {
            if let Some(resource) = depth.resource.take() {
                backend.release_resource(resource);
            }
            depth.view = DescriptorHandle::NULL;
        }
    }

    /// Returns `true` when every back buffer has a live view.
    pub fn is_renderable(&self) -> bool {
        !self.released
            && self.views.iter().all(|v| !v.is_null())
            && self.depth.as_ref().is_none_or(|d| !d.view.is_null())
    }

    /// Back-buffer resources currently held by the surface.
    pub fn back_buffers(&self) -> impl Iterator<Item = ResourceId> + '_ {
        self.buffers.iter().flatten().copied()
    }

    /// Depth-stencil view, when a depth target is enabled and valid.
    pub fn depth_view(&self) -> Option<DescriptorHandle> {
        self.depth
            .as_ref()
            .map(|d| d.view)
            .filter(|v| !v.is_null())
    }

    pub fn depth_resource(&self) -> Option<ResourceId> {
        self.depth.as_ref().and_then(|d| d.resource)
    }

    #[inline]
    pub fn chain(&self) -> SwapChainId {
        self.chain
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn format(&self) -> SurfaceFormat {
        self.format
    }

    #[inline]
    pub fn buffer_count(&self) -> u32 {
        self.buffer_count
    }

    #[inline]
    pub fn sync_interval(&self) -> u32 {
        self.sync_interval
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::ErrorKind;
    use crate::hal::{DriverType, FeatureLevel, HeadlessBackend, HeadlessWindow, QueueKind};

    fn desc(width: u32, height: u32) -> SwapChainDesc {
        SwapChainDesc {
            width,
            height,
            format: SurfaceFormat::Rgba8UnormSrgb,
            buffer_count: 2,
            sync_interval: 1,
        }
    }

    fn setup(depth: Option<DepthFormat>) -> (HeadlessBackend, PresentationSurface) {
        let mut gpu = HeadlessBackend::default();
        let device = gpu
            .create_device(DriverType::Hardware, FeatureLevel::Level11_0)
            .unwrap();
        let queue = gpu.create_command_queue(device, QueueKind::Direct).unwrap();
        let surface =
            PresentationSurface::create(&mut gpu, device, queue, &HeadlessWindow, &desc(960, 540), depth)
                .unwrap();
        (gpu, surface)
    }

    fn snapshot(surface: &PresentationSurface) -> (Vec<ResourceId>, Vec<DescriptorHandle>) {
        (surface.back_buffers().collect(), surface.views.clone())
    }

    // ── creation ──────────────────────────────────────────────────────────

    #[test]
    fn every_back_buffer_gets_a_view() {
        let (mut gpu, surface) = setup(None);
        assert!(surface.is_renderable());
        assert_eq!(surface.back_buffers().count(), 2);

        let current = surface.current_back_buffer(&mut gpu).unwrap().unwrap();
        assert_eq!(current.index, 0);
        assert_eq!(gpu.resource_size(current.resource), Some((960, 540)));
    }

    // ── resize ────────────────────────────────────────────────────────────

    #[test]
    fn resize_yields_new_resources_and_views() {
        let (mut gpu, mut surface) = setup(None);
        let (old_buffers, old_views) = snapshot(&surface);

        surface.resize(&mut gpu, 1920, 1080).unwrap();
        let (new_buffers, new_views) = snapshot(&surface);

        assert_eq!((surface.width(), surface.height()), (1920, 1080));
        assert!(old_buffers.iter().all(|b| !gpu.is_alive(*b)));
        assert!(new_buffers.iter().all(|b| !old_buffers.contains(b)));
        assert!(new_views.iter().all(|v| !old_views.contains(v)));
        assert!(new_buffers
            .iter()
            .all(|b| gpu.resource_size(*b) == Some((1920, 1080))));
    }

    #[test]
    fn resize_with_outstanding_reference_keeps_last_good_size() {
        let (mut gpu, mut surface) = setup(None);
        let stray = gpu.swap_chain_buffer(surface.chain(), 1).unwrap();

        let err = surface.resize(&mut gpu, 1280, 720).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Resize);
        assert_eq!((surface.width(), surface.height()), (960, 540));
        assert!(!surface.is_renderable());
        assert!(surface.current_back_buffer(&mut gpu).unwrap().is_none());

        gpu.release_resource(stray);
        surface.resize(&mut gpu, 1280, 720).unwrap();
        assert!(surface.is_renderable());
        assert_eq!(surface.width(), 1280);
    }

    #[test]
    fn zero_extent_is_a_no_op() {
        let (mut gpu, mut surface) = setup(None);
        let before = snapshot(&surface);

        surface.resize(&mut gpu, 0, 540).unwrap();

        assert_eq!(snapshot(&surface), before);
        assert!(surface.is_renderable());
    }

    #[test]
    fn same_size_resize_still_rebuilds() {
        let (mut gpu, mut surface) = setup(None);
        let (old_buffers, old_views) = snapshot(&surface);

        surface.resize(&mut gpu, 960, 540).unwrap();

        let (buffers, views) = snapshot(&surface);
        assert!(buffers.iter().all(|b| !old_buffers.contains(b)));
        assert!(views.iter().all(|v| !old_views.contains(v)));
        assert!(surface.is_renderable());
    }

    #[test]
    fn depth_target_follows_resize() {
        let (mut gpu, mut surface) = setup(Some(DepthFormat::Depth32Float));
        let old_depth = surface.depth_resource().unwrap();
        let old_view = surface.depth_view().unwrap();

        surface.resize(&mut gpu, 320, 200).unwrap();

        let new_depth = surface.depth_resource().unwrap();
        assert!(!gpu.is_alive(old_depth));
        assert_eq!(gpu.resource_size(new_depth), Some((320, 200)));
        assert_ne!(surface.depth_view().unwrap(), old_view);
    }

    // ── release ───────────────────────────────────────────────────────────

    #[test]
    fn release_is_idempotent() {
        let (mut gpu, mut surface) = setup(Some(DepthFormat::Depth24PlusStencil8));
        let depth = surface.depth_resource().unwrap();

        surface.release(&mut gpu);
        surface.release(&mut gpu);

        assert!(!surface.is_renderable());
        assert!(!gpu.is_alive(depth));
        assert!(matches!(
            surface.resize(&mut gpu, 10, 10),
            Err(RenderError::ShutDown)
        ));
    }
}
