//! GPU abstraction layer.
//!
//! A handle-based interface shaped after explicit graphics APIs: devices,
//! queues, swap chains, resources, descriptor views, command allocators and
//! lists, and fences. The frame pipeline only talks to [`Backend`]; objects
//! live inside the backend and are named by copyable ids.
//!
//! Implementations:
//! - [`WgpuBackend`] renders to a real window through wgpu
//! - [`HeadlessBackend`] runs a software GPU timeline on a worker thread and
//!   validates ordering hazards; used for tests and windowless runs

mod error;
pub mod headless;
mod types;
pub mod wgpu_backend;

pub use error::BackendError;
pub(crate) use types::HandleCounter;
pub use types::{
    AdapterInfo, AllocatorId, CommandListId, DepthFormat, DescriptorHandle, DescriptorHeapInfo,
    DescriptorHeapKind, DeviceId, DriverType, FeatureLevel, FenceId, GpuCommand, QueueId,
    QueueKind, ResourceId, ResourceState, SurfaceFormat, SwapChainDesc, SwapChainId,
};

pub use headless::{HeadlessBackend, HeadlessConfig, HeadlessWindow};
pub use wgpu_backend::WgpuBackend;

pub type BackendResult<T> = Result<T, BackendError>;

/// Explicit-API style GPU backend.
///
/// Call ordering is the caller's responsibility; a backend reports misuse it
/// can observe as [`BackendError`] but is not required to detect every hazard.
pub trait Backend {
    /// Native window the swap chain presents into.
    type Window: ?Sized;

    /// Short backend name for diagnostics.
    fn name(&self) -> &'static str;

    // ── device ────────────────────────────────────────────────────────────

    fn create_device(
        &mut self,
        driver: DriverType,
        min_feature_level: FeatureLevel,
    ) -> BackendResult<DeviceId>;

    fn adapter_info(&self, device: DeviceId) -> BackendResult<AdapterInfo>;

    fn create_command_queue(&mut self, device: DeviceId, kind: QueueKind)
        -> BackendResult<QueueId>;

    // ── swap chain ────────────────────────────────────────────────────────

    /// Creates a swap chain bound to `queue`. The binding never changes.
    fn create_swap_chain(
        &mut self,
        queue: QueueId,
        window: &Self::Window,
        desc: &SwapChainDesc,
    ) -> BackendResult<SwapChainId>;

    /// Returns a reference to back buffer `index`; pair with [`Backend::release_resource`].
    fn swap_chain_buffer(&mut self, chain: SwapChainId, index: u32) -> BackendResult<ResourceId>;

    /// Index of the back buffer the next frame renders into.
    fn current_back_buffer_index(&mut self, chain: SwapChainId) -> BackendResult<u32>;

    /// Resizes every back buffer. Fails while any back buffer reference is held.
    fn resize_swap_chain(&mut self, chain: SwapChainId, width: u32, height: u32)
        -> BackendResult<()>;

    /// Queues presentation of the current back buffer.
    ///
    /// The present mode is fixed when the chain is created, so
    /// `sync_interval` must match the interval in its [`SwapChainDesc`];
    /// any other value is an `InvalidArgument`.
    fn present(&mut self, chain: SwapChainId, sync_interval: u32) -> BackendResult<()>;

    // ── resources & views ─────────────────────────────────────────────────

    /// Creates a depth-stencil texture, initially in [`ResourceState::DepthWrite`].
    fn create_depth_stencil(
        &mut self,
        device: DeviceId,
        width: u32,
        height: u32,
        format: DepthFormat,
    ) -> BackendResult<ResourceId>;

    /// Drops one reference to `resource`.
    fn release_resource(&mut self, resource: ResourceId);

    fn create_descriptor_heap(
        &mut self,
        device: DeviceId,
        kind: DescriptorHeapKind,
        capacity: u32,
    ) -> BackendResult<DescriptorHeapInfo>;

    fn create_render_target_view(
        &mut self,
        resource: ResourceId,
        handle: DescriptorHandle,
    ) -> BackendResult<()>;

    fn create_depth_stencil_view(
        &mut self,
        resource: ResourceId,
        handle: DescriptorHandle,
    ) -> BackendResult<()>;

    // ── commands ──────────────────────────────────────────────────────────

    fn create_command_allocator(
        &mut self,
        device: DeviceId,
        kind: QueueKind,
    ) -> BackendResult<AllocatorId>;

    /// Creates a command list in the closed state.
    fn create_command_list(
        &mut self,
        device: DeviceId,
        allocator: AllocatorId,
    ) -> BackendResult<CommandListId>;

    /// Reclaims allocator memory. Fails while lists recorded from it still execute.
    fn reset_command_allocator(&mut self, allocator: AllocatorId) -> BackendResult<()>;

    /// Reopens a closed list for recording against `allocator`.
    fn reset_command_list(
        &mut self,
        list: CommandListId,
        allocator: AllocatorId,
    ) -> BackendResult<()>;

    fn record(&mut self, list: CommandListId, command: GpuCommand) -> BackendResult<()>;

    fn close_command_list(&mut self, list: CommandListId) -> BackendResult<()>;

    fn execute_command_list(&mut self, queue: QueueId, list: CommandListId) -> BackendResult<()>;

    // ── fences ────────────────────────────────────────────────────────────

    fn create_fence(&mut self, device: DeviceId, initial_value: u64) -> BackendResult<FenceId>;

    /// Queues a signal of `value` behind all work already submitted to `queue`.
    fn signal(&mut self, queue: QueueId, fence: FenceId, value: u64) -> BackendResult<()>;

    fn fence_completed_value(&mut self, fence: FenceId) -> BackendResult<u64>;

    /// Blocks until the fence reaches `value`. No timeout.
    fn wait_for_fence(&mut self, fence: FenceId, value: u64) -> BackendResult<()>;
}
