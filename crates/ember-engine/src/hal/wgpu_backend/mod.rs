//! wgpu implementation of the GPU abstraction layer.
//!
//! wgpu tracks resource usage and inserts barriers itself, and it hands out
//! swap-chain images one acquire at a time. The mapping is therefore:
//! - back buffers are slots of the chain; the acquired surface texture backs
//!   whichever slot is current
//! - barrier commands are validated against a shadow state and otherwise dropped
//! - a command list is a `CommandEncoder` that is finished on close
//! - a fence value maps to the submission index of an empty submit

mod surface;

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::Context;
use winit::window::Window;

use super::{
    AdapterInfo, AllocatorId, Backend, BackendError, BackendResult, CommandListId, DepthFormat,
    DescriptorHandle, DescriptorHeapInfo, DescriptorHeapKind, DeviceId, DriverType, FeatureLevel,
    FenceId, GpuCommand, HandleCounter, QueueId, QueueKind, ResourceId, ResourceState,
    SwapChainDesc, SwapChainId,
};
use crate::coords::Viewport;

use surface::{AcquireFailure, classify_surface_error, surface_error};

const HEAP_STRIDE: u64 = 0x1_0000;
const DESCRIPTOR_INCREMENT: u32 = 32;

struct DeviceSlot {
    adapter: wgpu::Adapter,
    device: wgpu::Device,
    queue: wgpu::Queue,
    info: AdapterInfo,
}

struct ChainSlot {
    device: DeviceId,
    surface: wgpu::Surface<'static>,
    config: wgpu::SurfaceConfiguration,
    buffers: Vec<Option<ResourceId>>,
    current: u32,
    sync_interval: u32,
    acquired: Option<wgpu::SurfaceTexture>,
}

enum ResourceSlot {
    BackBuffer {
        chain: SwapChainId,
        index: u32,
        refs: u32,
        state: ResourceState,
    },
    Depth {
        texture: wgpu::Texture,
    },
}

struct ListSlot {
    device: DeviceId,
    encoder: Option<wgpu::CommandEncoder>,
    finished: Option<wgpu::CommandBuffer>,
    viewport: Option<Viewport>,
}

struct FenceSlot {
    device: DeviceId,
    completed: Arc<AtomicU64>,
    signaled: u64,
    pending: VecDeque<(u64, wgpu::SubmissionIndex)>,
}

/// [`Backend`] backed by wgpu, presenting into a winit window.
pub struct WgpuBackend {
    instance: wgpu::Instance,
    ids: HandleCounter,
    devices: HashMap<DeviceId, DeviceSlot>,
    queues: HashMap<QueueId, DeviceId>,
    chains: HashMap<SwapChainId, ChainSlot>,
    resources: HashMap<ResourceId, ResourceSlot>,
    heaps: Vec<DescriptorHeapInfo>,
    views: HashMap<DescriptorHandle, ResourceId>,
    allocators: HashMap<AllocatorId, DeviceId>,
    lists: HashMap<CommandListId, ListSlot>,
    fences: HashMap<FenceId, FenceSlot>,
}

impl WgpuBackend {
    pub fn new() -> Self {
        // Use all backends to allow wgpu to select the optimal platform backend.
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        Self {
            instance,
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
        }
    }

    fn device(&self, device: DeviceId) -> BackendResult<&DeviceSlot> {
        self.devices
            .get(&device)
            .ok_or_else(|| BackendError::handle("device", device.raw()))
    }

    fn queue_device(&self, queue: QueueId) -> BackendResult<&DeviceSlot> {
        let device = self
            .queues
            .get(&queue)
            .copied()
            .ok_or_else(|| BackendError::handle("queue", queue.raw()))?;
        self.device(device)
    }

    fn chain_mut(&mut self, chain: SwapChainId) -> BackendResult<&mut ChainSlot> {
        self.chains
            .get_mut(&chain)
            .ok_or_else(|| BackendError::handle("swap chain", chain.raw()))
    }

    fn register_view(
        &mut self,
        resource: ResourceId,
        handle: DescriptorHandle,
        kind: DescriptorHeapKind,
    ) -> BackendResult<()> {
        if !self.resources.contains_key(&resource) {
            return Err(BackendError::handle("resource", resource.raw()));
        }
        let in_heap = self
            .heaps
            .iter()
            .any(|h| h.kind == kind && h.contains(handle));
        if !in_heap {
            return Err(BackendError::handle("descriptor", handle.0));
        }
        self.views.insert(handle, resource);
        Ok(())
    }

    /// Acquires the surface texture of `chain` if this tick has none yet.
    fn acquire(&mut self, chain: SwapChainId) -> BackendResult<()> {
        let (already_acquired, device_id) = {
            let slot = self.chain_mut(chain)?;
            (slot.acquired.is_some(), slot.device)
        };
        if already_acquired {
            return Ok(());
        }

        let device = self.device(device_id)?.device.clone();
        let slot = self.chain_mut(chain)?;

        let texture = match slot.surface.get_current_texture() {
            Ok(t) => t,
            Err(err) => match classify_surface_error(&err) {
                AcquireFailure::Reconfigure => {
                    log::debug!("surface {err}; reconfiguring and retrying acquire");
                    slot.surface.configure(&device, &slot.config);
                    slot.surface.get_current_texture().map_err(surface_error)?
                }
                AcquireFailure::Skip | AcquireFailure::Fatal => return Err(surface_error(err)),
            },
        };

        if texture.suboptimal {
            log::debug!("acquired suboptimal surface texture for {chain}");
        }
        slot.acquired = Some(texture);
        Ok(())
    }

    /// Creates a texture view for the resource behind `view`.
    fn resolve_view(&self, view: DescriptorHandle) -> BackendResult<wgpu::TextureView> {
        let resource = self
            .views
            .get(&view)
            .copied()
            .ok_or_else(|| BackendError::handle("descriptor", view.0))?;

        match self.resources.get(&resource) {
            Some(ResourceSlot::BackBuffer { chain, index, .. }) => {
                let slot = self
                    .chains
                    .get(chain)
                    .ok_or_else(|| BackendError::handle("swap chain", chain.raw()))?;
                if slot.current != *index {
                    return Err(BackendError::InvalidState(format!(
                        "view {view} targets back buffer {index}, current is {}",
                        slot.current
                    )));
                }
                let frame = slot.acquired.as_ref().ok_or_else(|| {
                    BackendError::InvalidState("no surface texture acquired".to_string())
                })?;
                Ok(frame
                    .texture
                    .create_view(&wgpu::TextureViewDescriptor::default()))
            }
            Some(ResourceSlot::Depth { texture }) => {
                Ok(texture.create_view(&wgpu::TextureViewDescriptor::default()))
            }
            None => Err(BackendError::InvalidState(format!(
                "view {view} references destroyed resource {resource}"
            ))),
        }
    }

    fn list_mut(&mut self, list: CommandListId) -> BackendResult<&mut ListSlot> {
        self.lists
            .get_mut(&list)
            .ok_or_else(|| BackendError::handle("command list", list.raw()))
    }
}

impl Default for WgpuBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn feature_level_of(adapter: &wgpu::Adapter) -> FeatureLevel {
    if adapter.get_downlevel_capabilities().is_webgpu_compliant() {
        FeatureLevel::Level12_0
    } else {
        FeatureLevel::Level11_0
    }
}

fn begin_clear_pass<'e>(
    encoder: &'e mut wgpu::CommandEncoder,
    color: Option<(&wgpu::TextureView, wgpu::Color)>,
    depth: Option<(&wgpu::TextureView, f32)>,
) -> wgpu::RenderPass<'e> {
    let color_attachment = color.map(|(view, clear)| wgpu::RenderPassColorAttachment {
        view,
        resolve_target: None,
        ops: wgpu::Operations {
            load: wgpu::LoadOp::Clear(clear),
            store: wgpu::StoreOp::Store,
        },
        depth_slice: None,
    });

    encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some("ember clear"),
        color_attachments: &[color_attachment],
        depth_stencil_attachment: depth.map(|(view, value)| {
            wgpu::RenderPassDepthStencilAttachment {
                view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(value),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }
        }),
        timestamp_writes: None,
        occlusion_query_set: None,
        multiview_mask: None,
    })
}

impl Backend for WgpuBackend {
    type Window = Arc<Window>;

    fn name(&self) -> &'static str {
        "wgpu"
    }

    fn create_device(
        &mut self,
        driver: DriverType,
        min_feature_level: FeatureLevel,
    ) -> BackendResult<DeviceId> {
        if driver == DriverType::Reference {
            return Err(BackendError::DriverUnavailable {
                driver,
                reason: "wgpu has no reference rasterizer".to_string(),
            });
        }

        let unavailable = |reason: String| BackendError::DriverUnavailable { driver, reason };

        let adapter = pollster::block_on(self.instance.request_adapter(
            &wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: driver.is_software(),
            },
        ))
        .map_err(|e| unavailable(e.to_string()))?;

        let adapter_info = adapter.get_info();
        let is_cpu = adapter_info.device_type == wgpu::DeviceType::Cpu;
        if driver == DriverType::Hardware && is_cpu {
            return Err(unavailable(format!(
                "only a software adapter is present ({})",
                adapter_info.name
            )));
        }

        let feature_level = feature_level_of(&adapter);
        if feature_level < min_feature_level {
            return Err(unavailable(format!(
                "{} reaches feature level {feature_level}, {min_feature_level} required",
                adapter_info.name
            )));
        }

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("ember-engine device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::downlevel_defaults(),
            experimental_features: wgpu::ExperimentalFeatures::disabled(),
            memory_hints: wgpu::MemoryHints::Performance,
            trace: wgpu::Trace::Off,
        }))
        .context("failed to create wgpu device/queue")
        .map_err(|e| unavailable(format!("{e:#}")))?;

        let id = DeviceId::from_raw(self.ids.next());
        self.devices.insert(
            id,
            DeviceSlot {
                adapter,
                device,
                queue,
                info: AdapterInfo {
                    name: adapter_info.name,
                    driver,
                    backend: format!("{:?}", adapter_info.backend),
                    feature_level,
                },
            },
        );
        Ok(id)
    }

    fn adapter_info(&self, device: DeviceId) -> BackendResult<AdapterInfo> {
        Ok(self.device(device)?.info.clone())
    }

    fn create_command_queue(
        &mut self,
        device: DeviceId,
        kind: QueueKind,
    ) -> BackendResult<QueueId> {
        self.device(device)?;
        if kind != QueueKind::Direct {
            return Err(BackendError::Unsupported(format!(
                "wgpu exposes a single direct queue, {kind:?} requested"
            )));
        }
        let id = QueueId::from_raw(self.ids.next());
        self.queues.insert(id, device);
        Ok(id)
    }

    fn create_swap_chain(
        &mut self,
        queue: QueueId,
        window: &Arc<Window>,
        desc: &SwapChainDesc,
    ) -> BackendResult<SwapChainId> {
        let device_id = self
            .queues
            .get(&queue)
            .copied()
            .ok_or_else(|| BackendError::handle("queue", queue.raw()))?;

        // The surface borrows the window through the Arc, so it may outlive this call.
        let surface = self
            .instance
            .create_surface(Arc::clone(window))
            .map_err(|e| BackendError::Surface(format!("failed to create wgpu surface: {e}")))?;

        let slot = self.device(device_id)?;
        if !slot.adapter.is_surface_supported(&surface) {
            return Err(BackendError::Surface(format!(
                "adapter {} cannot present to this window",
                slot.info.name
            )));
        }

        let caps = surface.get_capabilities(&slot.adapter);
        let format = surface::choose_surface_format(&caps, desc.format)
            .ok_or_else(|| BackendError::Surface("no supported surface formats".to_string()))?;
        if format != surface::to_wgpu_format(desc.format) {
            log::warn!("{:?} not supported by the surface, using {format:?}", desc.format);
        }

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: desc.width.max(1),
            height: desc.height.max(1),
            present_mode: surface::choose_present_mode(&caps, desc.sync_interval),
            alpha_mode: surface::choose_alpha_mode(&caps),
            view_formats: vec![],
            desired_maximum_frame_latency: desc.buffer_count.saturating_sub(1).max(1),
        };
        surface.configure(&slot.device, &config);

        let id = SwapChainId::from_raw(self.ids.next());
        self.chains.insert(
            id,
            ChainSlot {
                device: device_id,
                surface,
                config,
                buffers: vec![None; desc.buffer_count as usize],
                current: 0,
                sync_interval: desc.sync_interval,
                acquired: None,
            },
        );
        Ok(id)
    }

    fn swap_chain_buffer(&mut self, chain: SwapChainId, index: u32) -> BackendResult<ResourceId> {
        let existing = self
            .chain_mut(chain)?
            .buffers
            .get(index as usize)
            .copied()
            .ok_or_else(|| {
                BackendError::InvalidArgument(format!("back buffer index {index} out of range"))
            })?;

        if let Some(id) = existing {
            if let Some(ResourceSlot::BackBuffer { refs, .. }) = self.resources.get_mut(&id) {
                *refs += 1;
            }
            return Ok(id);
        }

        let id = ResourceId::from_raw(self.ids.next());
        self.resources.insert(
            id,
            ResourceSlot::BackBuffer {
                chain,
                index,
                refs: 1,
                state: ResourceState::Present,
            },
        );
        self.chain_mut(chain)?.buffers[index as usize] = Some(id);
        Ok(id)
    }

    fn current_back_buffer_index(&mut self, chain: SwapChainId) -> BackendResult<u32> {
        self.acquire(chain)?;
        Ok(self.chain_mut(chain)?.current)
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

        let buffers: Vec<ResourceId> = self
            .chain_mut(chain)?
            .buffers
            .iter()
            .flatten()
            .copied()
            .collect();

        let outstanding = buffers
            .iter()
            .filter(|id| {
                matches!(self.resources.get(id), Some(ResourceSlot::BackBuffer { refs, .. }) if *refs > 0)
            })
            .count();
        if outstanding > 0 {
            return Err(BackendError::ResourcesInUse { outstanding });
        }
        for id in &buffers {
            self.resources.remove(id);
        }

        let device_id = self.chain_mut(chain)?.device;
        let device = self.device(device_id)?.device.clone();

        let slot = self.chain_mut(chain)?;
        if slot.acquired.take().is_some() {
            log::debug!("dropping unpresented surface texture before resize");
        }
        slot.config.width = width;
        slot.config.height = height;
        slot.current = 0;
        slot.buffers.iter_mut().for_each(|b| *b = None);
        slot.surface.configure(&device, &slot.config);
        Ok(())
    }

    fn present(&mut self, chain: SwapChainId, sync_interval: u32) -> BackendResult<()> {
        let slot = self.chain_mut(chain)?;
        if sync_interval != slot.sync_interval {
            return Err(BackendError::InvalidArgument(format!(
                "sync interval {sync_interval} on {chain} created with {}",
                slot.sync_interval
            )));
        }
        let index = slot.current;
        let buffer = slot.buffers[index as usize];
        let frame = slot.acquired.take().ok_or_else(|| {
            BackendError::InvalidState("present without an acquired surface texture".to_string())
        })?;

        slot.current = (slot.current + 1) % slot.buffers.len() as u32;
        log::trace!(
            "present {chain} buffer {index} (sync interval {sync_interval}, mode {:?})",
            slot.config.present_mode
        );
        frame.present();

        if let Some(ResourceSlot::BackBuffer { state, .. }) =
            buffer.and_then(|b| self.resources.get(&b))
        {
            if *state != ResourceState::Present {
                log::warn!("{chain} buffer {index} presented while {state}");
            }
        }
        Ok(())
    }

    fn create_depth_stencil(
        &mut self,
        device: DeviceId,
        width: u32,
        height: u32,
        format: DepthFormat,
    ) -> BackendResult<ResourceId> {
        let slot = self.device(device)?;
        let texture = slot.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("ember depth-stencil"),
            size: wgpu::Extent3d {
                width: width.max(1),
                height: height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: surface::to_wgpu_depth_format(format),
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });

        let id = ResourceId::from_raw(self.ids.next());
        self.resources.insert(id, ResourceSlot::Depth { texture });
        Ok(id)
    }

    fn release_resource(&mut self, resource: ResourceId) {
        let owned_by_caller = match self.resources.get_mut(&resource) {
            Some(ResourceSlot::BackBuffer { refs, .. }) => {
                *refs = refs.saturating_sub(1);
                false
            }
            Some(ResourceSlot::Depth { .. }) => true,
            None => {
                log::warn!("release of unknown resource {resource}");
                false
            }
        };

        // Back buffers stay owned by their chain until it is resized.
        if owned_by_caller {
            if let Some(ResourceSlot::Depth { texture }) = self.resources.remove(&resource) {
                texture.destroy();
            }
        }
    }

    fn create_descriptor_heap(
        &mut self,
        device: DeviceId,
        kind: DescriptorHeapKind,
        capacity: u32,
    ) -> BackendResult<DescriptorHeapInfo> {
        self.device(device)?;
        let heap = DescriptorHeapInfo {
            kind,
            base: DescriptorHandle((self.heaps.len() as u64 + 1) * HEAP_STRIDE),
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
        self.register_view(resource, handle, DescriptorHeapKind::RenderTarget)
    }

    fn create_depth_stencil_view(
        &mut self,
        resource: ResourceId,
        handle: DescriptorHandle,
    ) -> BackendResult<()> {
        self.register_view(resource, handle, DescriptorHeapKind::DepthStencil)
    }

    fn create_command_allocator(
        &mut self,
        device: DeviceId,
        _kind: QueueKind,
    ) -> BackendResult<AllocatorId> {
        self.device(device)?;
        let id = AllocatorId::from_raw(self.ids.next());
        self.allocators.insert(id, device);
        Ok(id)
    }

    fn create_command_list(
        &mut self,
        device: DeviceId,
        allocator: AllocatorId,
    ) -> BackendResult<CommandListId> {
        self.device(device)?;
        if !self.allocators.contains_key(&allocator) {
            return Err(BackendError::handle("allocator", allocator.raw()));
        }
        let id = CommandListId::from_raw(self.ids.next());
        self.lists.insert(
            id,
            ListSlot {
                device,
                encoder: None,
                finished: None,
                viewport: None,
            },
        );
        Ok(id)
    }

    fn reset_command_allocator(&mut self, allocator: AllocatorId) -> BackendResult<()> {
        // wgpu recycles encoder memory internally once submissions retire.
        if self.allocators.contains_key(&allocator) {
            Ok(())
        } else {
            Err(BackendError::handle("allocator", allocator.raw()))
        }
    }

    fn reset_command_list(
        &mut self,
        list: CommandListId,
        allocator: AllocatorId,
    ) -> BackendResult<()> {
        if !self.allocators.contains_key(&allocator) {
            return Err(BackendError::handle("allocator", allocator.raw()));
        }
        let device_id = self.list_mut(list)?.device;
        let encoder = self
            .device(device_id)?
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("ember frame encoder"),
            });

        let slot = self.list_mut(list)?;
        if slot.encoder.is_some() {
            return Err(BackendError::InvalidState(format!(
                "{list} reset while recording"
            )));
        }
        slot.encoder = Some(encoder);
        slot.finished = None;
        slot.viewport = None;
        Ok(())
    }

    fn record(&mut self, list: CommandListId, command: GpuCommand) -> BackendResult<()> {
        if self.list_mut(list)?.encoder.is_none() {
            return Err(BackendError::InvalidState(format!(
                "{list} is closed; reset it before recording"
            )));
        }

        match command {
            GpuCommand::SetViewport(viewport) => {
                self.list_mut(list)?.viewport = Some(viewport);
            }
            GpuCommand::Barrier {
                resource,
                before,
                after,
            } => {
                // wgpu derives the real barrier from pass usage; keep the shadow state honest.
                match self.resources.get_mut(&resource) {
                    Some(ResourceSlot::BackBuffer { state, .. }) => {
                        if *state != before {
                            return Err(BackendError::BarrierMismatch {
                                resource,
                                claimed: before,
                                actual: *state,
                            });
                        }
                        *state = after;
                    }
                    Some(ResourceSlot::Depth { .. }) => {}
                    None => return Err(BackendError::handle("resource", resource.raw())),
                }
                log::trace!("barrier {resource}: {before} -> {after}");
            }
            GpuCommand::ClearRenderTarget { view, color } => {
                let target = self.resolve_view(view)?;
                let slot = self.list_mut(list)?;
                let viewport = slot.viewport;
                if let Some(encoder) = slot.encoder.as_mut() {
                    let clear = wgpu::Color {
                        r: f64::from(color.r),
                        g: f64::from(color.g),
                        b: f64::from(color.b),
                        a: f64::from(color.a),
                    };
                    let mut pass = begin_clear_pass(encoder, Some((&target, clear)), None);
                    if let Some(v) = viewport {
                        pass.set_viewport(v.x, v.y, v.width, v.height, v.min_depth, v.max_depth);
                    }
                }
            }
            GpuCommand::ClearDepthStencil { view, depth } => {
                let target = self.resolve_view(view)?;
                let slot = self.list_mut(list)?;
                if let Some(encoder) = slot.encoder.as_mut() {
                    let _pass = begin_clear_pass(encoder, None, Some((&target, depth)));
                }
            }
        }
        Ok(())
    }

    fn close_command_list(&mut self, list: CommandListId) -> BackendResult<()> {
        let slot = self.list_mut(list)?;
        let encoder = slot
            .encoder
            .take()
            .ok_or_else(|| BackendError::InvalidState(format!("{list} already closed")))?;
        slot.finished = Some(encoder.finish());
        Ok(())
    }

    fn execute_command_list(&mut self, queue: QueueId, list: CommandListId) -> BackendResult<()> {
        let buffer = self.list_mut(list)?.finished.take().ok_or_else(|| {
            BackendError::InvalidState(format!("{list} has no closed recording to execute"))
        })?;
        self.queue_device(queue)?.queue.submit(std::iter::once(buffer));
        Ok(())
    }

    fn create_fence(&mut self, device: DeviceId, initial_value: u64) -> BackendResult<FenceId> {
        self.device(device)?;
        let id = FenceId::from_raw(self.ids.next());
        self.fences.insert(
            id,
            FenceSlot {
                device,
                completed: Arc::new(AtomicU64::new(initial_value)),
                signaled: initial_value,
                pending: VecDeque::new(),
            },
        );
        Ok(id)
    }

    fn signal(&mut self, queue: QueueId, fence: FenceId, value: u64) -> BackendResult<()> {
        let queue = self.queue_device(queue)?.queue.clone();
        let index = queue.submit(std::iter::empty());

        let fence_slot = self
            .fences
            .get_mut(&fence)
            .ok_or_else(|| BackendError::handle("fence", fence.raw()))?;
        let completed = Arc::clone(&fence_slot.completed);
        queue.on_submitted_work_done(move || {
            completed.fetch_max(value, Ordering::AcqRel);
        });

        fence_slot.signaled = fence_slot.signaled.max(value);
        fence_slot.pending.push_back((value, index));
        Ok(())
    }

    fn fence_completed_value(&mut self, fence: FenceId) -> BackendResult<u64> {
        let slot = self
            .fences
            .get(&fence)
            .ok_or_else(|| BackendError::handle("fence", fence.raw()))?;
        let device = self.device(slot.device)?;
        device
            .device
            .poll(wgpu::PollType::Poll)
            .map_err(|e| BackendError::DeviceLost(e.to_string()))?;
        Ok(slot.completed.load(Ordering::Acquire))
    }

    fn wait_for_fence(&mut self, fence: FenceId, value: u64) -> BackendResult<()> {
        let slot = self
            .fences
            .get_mut(&fence)
            .ok_or_else(|| BackendError::handle("fence", fence.raw()))?;

        if slot.completed.load(Ordering::Acquire) >= value {
            return Ok(());
        }
        if value > slot.signaled {
            return Err(BackendError::InvalidState(format!(
                "waiting for {fence} value {value}, last signal queued was {}",
                slot.signaled
            )));
        }

        let mut target = None;
        while let Some((v, index)) = slot.pending.pop_front() {
            target = Some((v, index));
            if v >= value {
                break;
            }
        }
        let Some((reached, index)) = target else {
            return Err(BackendError::InvalidState(format!(
                "{fence} has no pending signal for value {value}"
            )));
        };

        let device = self
            .devices
            .get(&slot.device)
            .ok_or_else(|| BackendError::handle("device", slot.device.raw()))?;
        device
            .device
            .poll(wgpu::PollType::Wait {
                submission_index: Some(index),
                timeout: None,
            })
            .map_err(|e| BackendError::DeviceLost(e.to_string()))?;

        slot.completed.fetch_max(reached, Ordering::AcqRel);
        Ok(())
    }
}
