//! Software GPU backend.
//!
//! Objects live in plain tables; submitted work runs on a dedicated thread in
//! queue order. The backend is strict about hazards a debug layer would
//! report: resizing a chain while back buffers are referenced, reusing an
//! allocator with work in flight, barriers that disagree with the resource's
//! actual state, clearing through a view whose resource was destroyed, and
//! presenting a back buffer that is not in the present state.

mod timeline;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::{
    AdapterInfo, AllocatorId, Backend, BackendError, BackendResult, CommandListId, DepthFormat,
    DescriptorHandle, DescriptorHeapInfo, DescriptorHeapKind, DeviceId, DriverType, FeatureLevel,
    FenceId, GpuCommand, HandleCounter, QueueId, QueueKind, ResourceId, ResourceState,
    SwapChainDesc, SwapChainId,
};

use timeline::{FenceCell, Job, Timeline};

pub use timeline::GpuEvent;

const MAX_BUFFER_COUNT: u32 = 16;
const HEAP_STRIDE: u64 = 0x1_0000;
const DESCRIPTOR_INCREMENT: u32 = 32;

/// Behaviour knobs for the simulated adapter.
#[derive(Debug, Clone)]
pub struct HeadlessConfig {
    /// Driver types whose device creation fails.
    pub unavailable_drivers: Vec<DriverType>,

    /// Highest feature level the simulated adapters reach.
    pub max_feature_level: FeatureLevel,

    /// Artificial execution time per queued job.
    pub gpu_latency: Duration,

    /// Number of back-buffer acquires that time out before the chain yields
    /// images.
    pub unavailable_frames: u32,
}

impl Default for HeadlessConfig {
    fn default() -> Self {
        Self {
            unavailable_drivers: Vec::new(),
            max_feature_level: FeatureLevel::Level12_1,
            gpu_latency: Duration::ZERO,
            unavailable_frames: 0,
        }
    }
}

/// Stand-in for a native window; the headless chain presents nowhere.
#[derive(Debug, Default, Copy, Clone)]
pub struct HeadlessWindow;

struct QueueRecord {
    device: DeviceId,
}

struct ChainRecord {
    width: u32,
    height: u32,
    buffers: Vec<Option<ResourceId>>,
    current: u32,
    sync_interval: u32,
}

enum ResourceKind {
    BackBuffer { chain: SwapChainId, index: u32 },
    DepthStencil,
}

struct ResourceRecord {
    kind: ResourceKind,
    state: ResourceState,
    refs: u32,
    width: u32,
    height: u32,
}

struct ViewRecord {
    resource: ResourceId,
    kind: DescriptorHeapKind,
}

struct AllocatorRecord {
    in_flight: Arc<AtomicUsize>,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum ListState {
    Recording,
    Closed,
}

struct ListRecord {
    allocator: AllocatorId,
    state: ListState,
    commands: Vec<GpuCommand>,
}

struct FenceRecord {
    cell: Arc<FenceCell>,
    signaled: u64,
}

/// Software implementation of [`Backend`].
pub struct HeadlessBackend {
    config: HeadlessConfig,
    pending_timeouts: u32,
    ids: HandleCounter,
    devices: HashMap<DeviceId, AdapterInfo>,
    queues: HashMap<QueueId, QueueRecord>,
    chains: HashMap<SwapChainId, ChainRecord>,
    resources: HashMap<ResourceId, ResourceRecord>,
    heaps: Vec<DescriptorHeapInfo>,
    views: HashMap<DescriptorHandle, ViewRecord>,
    allocators: HashMap<AllocatorId, AllocatorRecord>,
    lists: HashMap<CommandListId, ListRecord>,
    fences: HashMap<FenceId, FenceRecord>,
    timeline: Timeline,
}

impl HeadlessBackend {
    pub fn new(config: HeadlessConfig) -> Self {
        let timeline = Timeline::spawn(config.gpu_latency);
        Self {
            pending_timeouts: config.unavailable_frames,
            config,
            ids: HandleCounter::new(),
            devices: HashMap::new(),
            queues: HashMap::new(),
            chains: HashMap::new(),
            resources: HashMap::new(),
            heaps: Vec::new(),
            views: HashMap::new(),
            allocators: HashMap::new(),
            lists: HashMap::new(),
            fences: HashMap::new(),
            timeline,
        }
    }

    /// Everything the simulated GPU executed so far, in order.
    pub fn events(&self) -> Vec<GpuEvent> {
        self.timeline.events()
    }

    pub fn clear_events(&self) {
        self.timeline.clear_events();
    }

    /// Number of presents the GPU has processed for `chain`.
    pub fn present_count(&self, chain: SwapChainId) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, GpuEvent::Presented { chain: c, .. } if *c == chain))
            .count()
    }

    /// Returns `true` while `resource` has not been destroyed.
    pub fn is_alive(&self, resource: ResourceId) -> bool {
        self.resources.contains_key(&resource)
    }

    /// Current GPU-side state of `resource`.
    pub fn resource_state(&self, resource: ResourceId) -> Option<ResourceState> {
        self.resources.get(&resource).map(|r| r.state)
    }

    /// Pixel size of `resource`.
    pub fn resource_size(&self, resource: ResourceId) -> Option<(u32, u32)> {
        self.resources.get(&resource).map(|r| (r.width, r.height))
    }

    fn next_id(&mut self) -> u64 {
        self.ids.next()
    }

    fn chain(&self, chain: SwapChainId) -> BackendResult<&ChainRecord> {
        self.chains
            .get(&chain)
            .ok_or_else(|| BackendError::handle("swap chain", chain.raw()))
    }

    fn chain_mut(&mut self, chain: SwapChainId) -> BackendResult<&mut ChainRecord> {
        self.chains
            .get_mut(&chain)
            .ok_or_else(|| BackendError::handle("swap chain", chain.raw()))
    }

    fn resource_mut(&mut self, resource: ResourceId) -> BackendResult<&mut ResourceRecord> {
        self.resources
            .get_mut(&resource)
            .ok_or_else(|| BackendError::handle("resource", resource.raw()))
    }

    fn list_mut(&mut self, list: CommandListId) -> BackendResult<&mut ListRecord> {
        self.lists
            .get_mut(&list)
            .ok_or_else(|| BackendError::handle("command list", list.raw()))
    }

    fn ensure_device(&self, device: DeviceId) -> BackendResult<()> {
        if self.devices.contains_key(&device) {
            Ok(())
        } else {
            Err(BackendError::handle("device", device.raw()))
        }
    }

    fn heap_for(&self, handle: DescriptorHandle) -> Option<&DescriptorHeapInfo> {
        self.heaps.iter().find(|h| h.contains(handle))
    }

    fn create_view(
        &mut self,
        resource: ResourceId,
        handle: DescriptorHandle,
        kind: DescriptorHeapKind,
    ) -> BackendResult<()> {
        if !self.resources.contains_key(&resource) {
            return Err(BackendError::handle("resource", resource.raw()));
        }

        match self.heap_for(handle) {
            Some(heap) if heap.kind == kind => {}
            Some(heap) => {
                return Err(BackendError::InvalidArgument(format!(
                    "descriptor {handle} lives in a {:?} heap, expected {kind:?}",
                    heap.kind
                )));
            }
            None => return Err(BackendError::handle("descriptor", handle.0)),
        }

        self.views.insert(handle, ViewRecord { resource, kind });
        Ok(())
    }

    /// Resolves a view to a live resource in `expected` state.
    fn validate_view(
        &self,
        view: DescriptorHandle,
        kind: DescriptorHeapKind,
        expected: ResourceState,
    ) -> BackendResult<()> {
        let record = self
            .views
            .get(&view)
            .filter(|v| v.kind == kind)
            .ok_or_else(|| BackendError::handle("descriptor", view.0))?;

        let resource = self.resources.get(&record.resource).ok_or_else(|| {
            BackendError::InvalidState(format!(
                "view {view} references destroyed resource {}",
                record.resource
            ))
        })?;

        if resource.state != expected {
            return Err(BackendError::InvalidState(format!(
                "view {view} used while {} is {}, expected {expected}",
                record.resource, resource.state
            )));
        }

        Ok(())
    }

    fn validate_command(&mut self, command: &GpuCommand) -> BackendResult<()> {
        match *command {
            GpuCommand::SetViewport(viewport) => {
                if !viewport.is_valid() {
                    return Err(BackendError::InvalidArgument(format!(
                        "invalid viewport {viewport:?}"
                    )));
                }
            }
            GpuCommand::Barrier {
                resource,
                before,
                after,
            } => {
                if before == after {
                    return Err(BackendError::InvalidArgument(format!(
                        "barrier on {resource} does not change state ({before})"
                    )));
                }
                let record = self.resource_mut(resource)?;
                if record.state != before {
                    return Err(BackendError::BarrierMismatch {
                        resource,
                        claimed: before,
                        actual: record.state,
                    });
                }
                record.state = after;
            }
            GpuCommand::ClearRenderTarget { view, .. } => {
                self.validate_view(
                    view,
                    DescriptorHeapKind::RenderTarget,
                    ResourceState::RenderTarget,
                )?;
            }
            GpuCommand::ClearDepthStencil { view, depth } => {
                if !(0.0..=1.0).contains(&depth) {
                    return Err(BackendError::InvalidArgument(format!(
                        "depth clear value {depth} outside [0, 1]"
                    )));
                }
                self.validate_view(
                    view,
                    DescriptorHeapKind::DepthStencil,
                    ResourceState::DepthWrite,
                )?;
            }
        }
        Ok(())
    }
}

impl Default for HeadlessBackend {
    fn default() -> Self {
        Self::new(HeadlessConfig::default())
    }
}

impl Backend for HeadlessBackend {
    type Window = HeadlessWindow;

    fn name(&self) -> &'static str {
        "headless"
    }

    fn create_device(
        &mut self,
        driver: DriverType,
        min_feature_level: FeatureLevel,
    ) -> BackendResult<DeviceId> {
        if self.config.unavailable_drivers.contains(&driver) {
            return Err(BackendError::DriverUnavailable {
                driver,
                reason: "disabled by configuration".to_string(),
            });
        }

        if min_feature_level > self.config.max_feature_level {
            return Err(BackendError::DriverUnavailable {
                driver,
                reason: format!(
                    "feature level {min_feature_level} above adapter maximum {}",
                    self.config.max_feature_level
                ),
            });
        }

        let id = DeviceId::from_raw(self.next_id());
        self.devices.insert(
            id,
            AdapterInfo {
                name: format!("Headless {driver} adapter"),
                driver,
                backend: self.name().to_string(),
                feature_level: self.config.max_feature_level,
            },
        );
        Ok(id)
    }

    fn adapter_info(&self, device: DeviceId) -> BackendResult<AdapterInfo> {
        self.devices
            .get(&device)
            .cloned()
            .ok_or_else(|| BackendError::handle("device", device.raw()))
    }

    fn create_command_queue(
        &mut self,
        device: DeviceId,
        _kind: QueueKind,
    ) -> BackendResult<QueueId> {
        self.ensure_device(device)?;
        let id = QueueId::from_raw(self.next_id());
        self.queues.insert(id, QueueRecord { device });
        Ok(id)
    }

    fn create_swap_chain(
        &mut self,
        queue: QueueId,
        _window: &HeadlessWindow,
        desc: &SwapChainDesc,
    ) -> BackendResult<SwapChainId> {
        let device = self
            .queues
            .get(&queue)
            .map(|q| q.device)
            .ok_or_else(|| BackendError::handle("queue", queue.raw()))?;
        self.ensure_device(device)?;

        if desc.width == 0 || desc.height == 0 {
            return Err(BackendError::InvalidArgument(format!(
                "swap chain extent {}x{}",
                desc.width, desc.height
            )));
        }
        if !(2..=MAX_BUFFER_COUNT).contains(&desc.buffer_count) {
            return Err(BackendError::InvalidArgument(format!(
                "buffer count {} outside 2..={MAX_BUFFER_COUNT}",
                desc.buffer_count
            )));
        }

        let id = SwapChainId::from_raw(self.next_id());
        self.chains.insert(
            id,
            ChainRecord {
                width: desc.width,
                height: desc.height,
                buffers: vec![None; desc.buffer_count as usize],
                current: 0,
                sync_interval: desc.sync_interval,
            },
        );
        Ok(id)
    }

    fn swap_chain_buffer(&mut self, chain: SwapChainId, index: u32) -> BackendResult<ResourceId> {
        let record = self.chain(chain)?;
        let slot = record
            .buffers
            .get(index as usize)
            .copied()
            .ok_or_else(|| {
                BackendError::InvalidArgument(format!("back buffer index {index} out of range"))
            })?;
        let (width, height) = (record.width, record.height);

        if let Some(existing) = slot {
            self.resource_mut(existing)?.refs += 1;
            return Ok(existing);
        }

        let id = ResourceId::from_raw(self.next_id());
        self.resources.insert(
            id,
            ResourceRecord {
                kind: ResourceKind::BackBuffer { chain, index },
                state: ResourceState::Present,
                refs: 1,
                width,
                height,
            },
        );
        self.chain_mut(chain)?.buffers[index as usize] = Some(id);
        Ok(id)
    }

    fn current_back_buffer_index(&mut self, chain: SwapChainId) -> BackendResult<u32> {
        let current = self.chain(chain)?.current;
        if self.pending_timeouts > 0 {
            self.pending_timeouts -= 1;
            return Err(BackendError::FrameUnavailable(format!(
                "{chain} acquire timed out"
            )));
        }
        Ok(current)
    }

    fn resize_swap_chain(
        &mut self,
        chain: SwapChainId,
        width: u32,
        height: u32,
    ) -> BackendResult<()> {
        if width == 0 || height == 0 {
            return Err(BackendError::InvalidArgument(format!(
                "swap chain extent {width}x{height}"
            )));
        }

        let buffers: Vec<ResourceId> = self.chain(chain)?.buffers.iter().flatten().copied().collect();

        let outstanding = buffers
            .iter()
            .filter(|id| self.resources.get(id).is_some_and(|r| r.refs > 0))
            .count();
        if outstanding > 0 {
            return Err(BackendError::ResourcesInUse { outstanding });
        }

        for id in &buffers {
            self.resources.remove(id);
        }

        let record = self.chain_mut(chain)?;
        record.width = width;
        record.height = height;
        record.current = 0;
        record.buffers.iter_mut().for_each(|b| *b = None);
        Ok(())
    }

    fn present(&mut self, chain: SwapChainId, sync_interval: u32) -> BackendResult<()> {
        let record = self.chain(chain)?;
        let index = record.current;

        if sync_interval != record.sync_interval {
            return Err(BackendError::InvalidArgument(format!(
                "sync interval {sync_interval} on {chain} created with {}",
                record.sync_interval
            )));
        }

        if let Some(buffer) = record.buffers[index as usize] {
            let state = self
                .resources
                .get(&buffer)
                .map(|r| r.state)
                .unwrap_or(ResourceState::Present);
            if state != ResourceState::Present {
                return Err(BackendError::InvalidState(format!(
                    "presenting {buffer} while it is {state}"
                )));
            }
        }

        let record = self.chain_mut(chain)?;
        record.current = (record.current + 1) % record.buffers.len() as u32;

        self.timeline.push(Job::Present {
            chain,
            index,
            sync_interval,
        });
        Ok(())
    }

    fn create_depth_stencil(
        &mut self,
        device: DeviceId,
        width: u32,
        height: u32,
        _format: DepthFormat,
    ) -> BackendResult<ResourceId> {
        self.ensure_device(device)?;
        if width == 0 || height == 0 {
            return Err(BackendError::InvalidArgument(format!(
                "depth-stencil extent {width}x{height}"
            )));
        }

        let id = ResourceId::from_raw(self.next_id());
        self.resources.insert(
            id,
            ResourceRecord {
                kind: ResourceKind::DepthStencil,
                state: ResourceState::DepthWrite,
                refs: 1,
                width,
                height,
            },
        );
        Ok(id)
    }

    fn release_resource(&mut self, resource: ResourceId) {
        let Some(record) = self.resources.get_mut(&resource) else {
            log::warn!("release of unknown resource {resource}");
            return;
        };

        record.refs = record.refs.saturating_sub(1);
        if let ResourceKind::BackBuffer { chain, index } = record.kind {
            log::trace!("{chain} back buffer {index} released, {} reference(s) left", record.refs);
        }

        // Back buffers stay owned by their chain until it is resized.
        if record.refs == 0 && matches!(record.kind, ResourceKind::DepthStencil) {
            self.resources.remove(&resource);
        }
    }

    fn create_descriptor_heap(
        &mut self,
        device: DeviceId,
        kind: DescriptorHeapKind,
        capacity: u32,
    ) -> BackendResult<DescriptorHeapInfo> {
        self.ensure_device(device)?;
        if capacity == 0 {
            return Err(BackendError::InvalidArgument(
                "descriptor heap capacity is zero".to_string(),
            ));
        }

        let ordinal = self.heaps.len() as u64 + 1;
        let heap = DescriptorHeapInfo {
            kind,
            base: DescriptorHandle(ordinal * HEAP_STRIDE),
            increment: DESCRIPTOR_INCREMENT,
            capacity,
        };
        self.heaps.push(heap);
        Ok(heap)
    }

    fn create_render_target_view(
        &mut self,
        resource: ResourceId,
        handle: DescriptorHandle,
    ) -> BackendResult<()> {
        self.create_view(resource, handle, DescriptorHeapKind::RenderTarget)
    }

    fn create_depth_stencil_view(
        &mut self,
        resource: ResourceId,
        handle: DescriptorHandle,
    ) -> BackendResult<()> {
        self.create_view(resource, handle, DescriptorHeapKind::DepthStencil)
    }

    fn create_command_allocator(
        &mut self,
        device: DeviceId,
        _kind: QueueKind,
    ) -> BackendResult<AllocatorId> {
        self.ensure_device(device)?;
        let id = AllocatorId::from_raw(self.next_id());
        self.allocators.insert(
            id,
            AllocatorRecord {
                in_flight: Arc::new(AtomicUsize::new(0)),
            },
        );
        Ok(id)
    }

    fn create_command_list(
        &mut self,
        device: DeviceId,
        allocator: AllocatorId,
    ) -> BackendResult<CommandListId> {
        self.ensure_device(device)?;
        if !self.allocators.contains_key(&allocator) {
            return Err(BackendError::handle("allocator", allocator.raw()));
        }

        let id = CommandListId::from_raw(self.next_id());
        self.lists.insert(
            id,
            ListRecord {
                allocator,
                state: ListState::Closed,
                commands: Vec::new(),
            },
        );
        Ok(id)
    }

    fn reset_command_allocator(&mut self, allocator: AllocatorId) -> BackendResult<()> {
        let record = self
            .allocators
            .get(&allocator)
            .ok_or_else(|| BackendError::handle("allocator", allocator.raw()))?;

        let in_flight = record.in_flight.load(Ordering::Acquire);
        if in_flight > 0 {
            return Err(BackendError::AllocatorInUse { in_flight });
        }

        let recording = self
            .lists
            .values()
            .any(|l| l.allocator == allocator && l.state == ListState::Recording);
        if recording {
            return Err(BackendError::InvalidState(
                "allocator reset while a list is still recording into it".to_string(),
            ));
        }

        Ok(())
    }

    fn reset_command_list(
        &mut self,
        list: CommandListId,
        allocator: AllocatorId,
    ) -> BackendResult<()> {
        if !self.allocators.contains_key(&allocator) {
            return Err(BackendError::handle("allocator", allocator.raw()));
        }

        let record = self.list_mut(list)?;
        if record.state == ListState::Recording {
            return Err(BackendError::InvalidState(format!(
                "{list} reset while recording"
            )));
        }

        record.state = ListState::Recording;
        record.allocator = allocator;
        record.commands.clear();
        Ok(())
    }

    fn record(&mut self, list: CommandListId, command: GpuCommand) -> BackendResult<()> {
        if self.list_mut(list)?.state != ListState::Recording {
            return Err(BackendError::InvalidState(format!(
                "{list} is closed; reset it before recording"
            )));
        }

        self.validate_command(&command)?;
        self.list_mut(list)?.commands.push(command);
        Ok(())
    }

    fn close_command_list(&mut self, list: CommandListId) -> BackendResult<()> {
        let record = self.list_mut(list)?;
        if record.state != ListState::Recording {
            return Err(BackendError::InvalidState(format!("{list} already closed")));
        }
        record.state = ListState::Closed;
        Ok(())
    }

    fn execute_command_list(&mut self, queue: QueueId, list: CommandListId) -> BackendResult<()> {
        if !self.queues.contains_key(&queue) {
            return Err(BackendError::handle("queue", queue.raw()));
        }

        let record = self
            .lists
            .get(&list)
            .ok_or_else(|| BackendError::handle("command list", list.raw()))?;
        if record.state != ListState::Closed {
            return Err(BackendError::InvalidState(format!(
                "{list} must be closed before execution"
            )));
        }

        let in_flight = self
            .allocators
            .get(&record.allocator)
            .map(|a| Arc::clone(&a.in_flight))
            .ok_or_else(|| BackendError::handle("allocator", record.allocator.raw()))?;
        in_flight.fetch_add(1, Ordering::AcqRel);

        self.timeline.push(Job::Execute {
            list,
            commands: record.commands.clone(),
            in_flight,
        });
        Ok(())
    }

    fn create_fence(&mut self, device: DeviceId, initial_value: u64) -> BackendResult<FenceId> {
        self.ensure_device(device)?;
        let id = FenceId::from_raw(self.next_id());
        self.fences.insert(
            id,
            FenceRecord {
                cell: Arc::new(FenceCell::new(id, initial_value)),
                signaled: initial_value,
            },
        );
        Ok(id)
    }

    fn signal(&mut self, queue: QueueId, fence: FenceId, value: u64) -> BackendResult<()> {
        if !self.queues.contains_key(&queue) {
            return Err(BackendError::handle("queue", queue.raw()));
        }

        let record = self
            .fences
            .get_mut(&fence)
            .ok_or_else(|| BackendError::handle("fence", fence.raw()))?;
        record.signaled = record.signaled.max(value);

        let cell = Arc::clone(&record.cell);
        self.timeline.push(Job::Signal { fence: cell, value });
        Ok(())
    }

    fn fence_completed_value(&mut self, fence: FenceId) -> BackendResult<u64> {
        self.fences
            .get(&fence)
            .map(|f| f.cell.completed())
            .ok_or_else(|| BackendError::handle("fence", fence.raw()))
    }

    fn wait_for_fence(&mut self, fence: FenceId, value: u64) -> BackendResult<()> {
        let record = self
            .fences
            .get(&fence)
            .ok_or_else(|| BackendError::handle("fence", fence.raw()))?;

        if value > record.signaled {
            return Err(BackendError::InvalidState(format!(
                "waiting for {fence} value {value}, last signal queued was {}",
                record.signaled
            )));
        }

        record.cell.wait(value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coords::Viewport;
    use crate::paint::Color;

    struct Rig {
        gpu: HeadlessBackend,
        device: DeviceId,
        queue: QueueId,
        chain: SwapChainId,
    }

    fn rig() -> Rig {
        let mut gpu = HeadlessBackend::default();
        let device = gpu
            .create_device(DriverType::Hardware, FeatureLevel::Level11_0)
            .unwrap();
        let queue = gpu.create_command_queue(device, QueueKind::Direct).unwrap();
        let chain = gpu
            .create_swap_chain(
                queue,
                &HeadlessWindow,
                &SwapChainDesc {
                    width: 64,
                    height: 32,
                    format: crate::hal::SurfaceFormat::Rgba8UnormSrgb,
                    buffer_count: 2,
                    sync_interval: 1,
                },
            )
            .unwrap();
        Rig {
            gpu,
            device,
            queue,
            chain,
        }
    }

    // ── device ────────────────────────────────────────────────────────────

    #[test]
    fn unavailable_driver_fails_creation() {
        let mut gpu = HeadlessBackend::new(HeadlessConfig {
            unavailable_drivers: vec![DriverType::Hardware],
            ..HeadlessConfig::default()
        });
        let err = gpu
            .create_device(DriverType::Hardware, FeatureLevel::Level11_0)
            .unwrap_err();
        assert!(matches!(err, BackendError::DriverUnavailable { .. }));
        assert!(gpu.create_device(DriverType::Warp, FeatureLevel::Level11_0).is_ok());
    }

    #[test]
    fn feature_level_above_maximum_is_rejected() {
        let mut gpu = HeadlessBackend::new(HeadlessConfig {
            max_feature_level: FeatureLevel::Level11_1,
            ..HeadlessConfig::default()
        });
        assert!(gpu.create_device(DriverType::Hardware, FeatureLevel::Level12_0).is_err());
    }

    // ── swap chain ────────────────────────────────────────────────────────

    #[test]
    fn buffer_fetch_returns_same_resource_until_resize() {
        let mut r = rig();
        let a = r.gpu.swap_chain_buffer(r.chain, 0).unwrap();
        let b = r.gpu.swap_chain_buffer(r.chain, 0).unwrap();
        assert_eq!(a, b);
        assert_eq!(r.gpu.resource_size(a), Some((64, 32)));
    }

    #[test]
    fn resize_with_live_buffers_is_a_driver_failure() {
        let mut r = rig();
        let buffer = r.gpu.swap_chain_buffer(r.chain, 1).unwrap();

        let err = r.gpu.resize_swap_chain(r.chain, 128, 64).unwrap_err();
        assert!(matches!(err, BackendError::ResourcesInUse { outstanding: 1 }));

        r.gpu.release_resource(buffer);
        r.gpu.resize_swap_chain(r.chain, 128, 64).unwrap();
        assert!(!r.gpu.is_alive(buffer));

        let fresh = r.gpu.swap_chain_buffer(r.chain, 1).unwrap();
        assert_ne!(fresh, buffer);
        assert_eq!(r.gpu.resource_size(fresh), Some((128, 64)));
    }

    #[test]
    fn present_advances_index_round_robin() {
        let mut r = rig();
        assert_eq!(r.gpu.current_back_buffer_index(r.chain).unwrap(), 0);
        r.gpu.present(r.chain, 1).unwrap();
        assert_eq!(r.gpu.current_back_buffer_index(r.chain).unwrap(), 1);
        r.gpu.present(r.chain, 1).unwrap();
        assert_eq!(r.gpu.current_back_buffer_index(r.chain).unwrap(), 0);
    }

    #[test]
    fn present_rejects_a_different_sync_interval() {
        let mut r = rig();
        let err = r.gpu.present(r.chain, 0).unwrap_err();
        assert!(matches!(err, BackendError::InvalidArgument(_)));
        assert_eq!(r.gpu.current_back_buffer_index(r.chain).unwrap(), 0);
        assert_eq!(r.gpu.present_count(r.chain), 0);
    }

    #[test]
    fn acquire_times_out_for_the_configured_frames() {
        let mut r = rig();
        r.gpu.pending_timeouts = 2;

        for _ in 0..2 {
            let err = r.gpu.current_back_buffer_index(r.chain).unwrap_err();
            assert!(err.is_transient());
        }
        assert_eq!(r.gpu.current_back_buffer_index(r.chain).unwrap(), 0);
    }

    // ── commands ──────────────────────────────────────────────────────────

    #[test]
    fn mismatched_barrier_is_reported() {
        let mut r = rig();
        let buffer = r.gpu.swap_chain_buffer(r.chain, 0).unwrap();
        let alloc = r
            .gpu
            .create_command_allocator(r.device, QueueKind::Direct)
            .unwrap();
        let list = r.gpu.create_command_list(r.device, alloc).unwrap();
        r.gpu.reset_command_list(list, alloc).unwrap();

        let err = r
            .gpu
            .record(
                list,
                GpuCommand::Barrier {
                    resource: buffer,
                    before: ResourceState::RenderTarget,
                    after: ResourceState::Present,
                },
            )
            .unwrap_err();
        assert!(matches!(err, BackendError::BarrierMismatch { .. }));
    }

    #[test]
    fn recording_into_closed_list_fails() {
        let mut r = rig();
        let alloc = r
            .gpu
            .create_command_allocator(r.device, QueueKind::Direct)
            .unwrap();
        let list = r.gpu.create_command_list(r.device, alloc).unwrap();
        let err = r
            .gpu
            .record(list, GpuCommand::SetViewport(Viewport::new(1.0, 1.0)))
            .unwrap_err();
        assert!(matches!(err, BackendError::InvalidState(_)));
    }

    #[test]
    fn clear_requires_render_target_state() {
        let mut r = rig();
        let buffer = r.gpu.swap_chain_buffer(r.chain, 0).unwrap();
        let heap = r
            .gpu
            .create_descriptor_heap(r.device, DescriptorHeapKind::RenderTarget, 2)
            .unwrap();
        let view = heap.handle(0).unwrap();
        r.gpu.create_render_target_view(buffer, view).unwrap();

        let alloc = r
            .gpu
            .create_command_allocator(r.device, QueueKind::Direct)
            .unwrap();
        let list = r.gpu.create_command_list(r.device, alloc).unwrap();
        r.gpu.reset_command_list(list, alloc).unwrap();

        let clear = GpuCommand::ClearRenderTarget {
            view,
            color: Color::BLACK,
        };
        assert!(r.gpu.record(list, clear).is_err());

        r.gpu
            .record(
                list,
                GpuCommand::Barrier {
                    resource: buffer,
                    before: ResourceState::Present,
                    after: ResourceState::RenderTarget,
                },
            )
            .unwrap();
        r.gpu.record(list, clear).unwrap();
    }

    #[test]
    fn allocator_reset_waits_for_execution() {
        let mut gpu = HeadlessBackend::new(HeadlessConfig {
            gpu_latency: Duration::from_millis(30),
            ..HeadlessConfig::default()
        });
        let device = gpu
            .create_device(DriverType::Hardware, FeatureLevel::Level11_0)
            .unwrap();
        let queue = gpu.create_command_queue(device, QueueKind::Direct).unwrap();
        let alloc = gpu.create_command_allocator(device, QueueKind::Direct).unwrap();
        let list = gpu.create_command_list(device, alloc).unwrap();
        let fence = gpu.create_fence(device, 0).unwrap();

        gpu.reset_command_list(list, alloc).unwrap();
        gpu.close_command_list(list).unwrap();
        gpu.execute_command_list(queue, list).unwrap();

        assert!(matches!(
            gpu.reset_command_allocator(alloc),
            Err(BackendError::AllocatorInUse { .. })
        ));

        gpu.signal(queue, fence, 1).unwrap();
        gpu.wait_for_fence(fence, 1).unwrap();
        gpu.reset_command_allocator(alloc).unwrap();
    }

    // ── fences ────────────────────────────────────────────────────────────

    #[test]
    fn waiting_on_unsignaled_value_is_rejected() {
        let mut r = rig();
        let fence = r.gpu.create_fence(r.device, 0).unwrap();
        assert!(r.gpu.wait_for_fence(fence, 1).is_err());

        r.gpu.signal(r.queue, fence, 1).unwrap();
        r.gpu.wait_for_fence(fence, 1).unwrap();
        assert_eq!(r.gpu.fence_completed_value(fence).unwrap(), 1);
    }
}
