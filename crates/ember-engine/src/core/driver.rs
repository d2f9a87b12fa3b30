use crate::barrier::BarrierTracker;
use crate::command::CommandPipeline;
use crate::coords::Viewport;
use crate::device::{DeviceContext, RenderConfig, RenderError};
use crate::hal::{Backend, GpuCommand, QueueId, QueueKind, ResourceState, SwapChainDesc};
use crate::surface::{BackBuffer, PresentationSurface};
use crate::sync::FrameSynchronizer;
use crate::time::FrameClock;

use super::callbacks::{FrameCallbacks, FrameRecorder, FrameRequest};

/// Where the driver is in the per-frame cycle.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum FrameState {
    Idle,
    Recording,
    Submitted,
    Synchronized,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum FrameOutcome {
    Presented,
    /// Nothing was recorded: minimized window, invalid targets after a failed
    /// resize, or a transiently unavailable back buffer.
    Skipped,
}

/// Window-side entry points into a running renderer.
///
/// The window runtime holds the driver only through this interface.
pub trait FrameEvents {
    fn on_resize(&mut self, width: u32, height: u32) -> Result<(), RenderError>;

    fn on_frame_tick(&mut self) -> Result<FrameOutcome, RenderError>;
}

/// Orchestrates device, surface, fence, command list and barriers each tick.
pub struct FrameDriver<B: Backend, C: FrameCallbacks> {
    backend: B,
    context: DeviceContext,
    queue: QueueId,
    surface: PresentationSurface,
    sync: FrameSynchronizer,
    pipeline: CommandPipeline,
    tracker: BarrierTracker,
    callbacks: C,
    config: RenderConfig,
    viewport: Viewport,
    clock: FrameClock,
    state: FrameState,
    minimized: bool,
    initialized: bool,
    shut_down: bool,
}

impl<B: Backend, C: FrameCallbacks> FrameDriver<B, C> {
    /// Builds the whole GPU stack for `window` and runs `on_init`.
    ///
    /// Any failure here is a creation failure: nothing is retried.
    pub fn initialize(
        mut backend: B,
        window: &B::Window,
        width: u32,
        height: u32,
        config: RenderConfig,
        callbacks: C,
    ) -> Result<Self, RenderError> {
        config.validate()?;
        if width == 0 || height == 0 {
            return Err(RenderError::Config(format!(
                "initial surface extent {width}x{height}"
            )));
        }

        log::info!("initializing renderer on the {} backend", backend.name());

        let context =
            DeviceContext::create(&mut backend, &config.driver_order, config.min_feature_level)?;
        let queue = context.create_command_queue(&mut backend, QueueKind::Direct)?;

        let desc = SwapChainDesc {
            width,
            height,
            format: config.format,
            buffer_count: config.buffer_count,
            sync_interval: config.sync_interval,
        };
        let surface = PresentationSurface::create(
            &mut backend,
            context.device(),
            queue,
            window,
            &desc,
            config.depth_format,
        )?;

        let sync = FrameSynchronizer::create(&mut backend, context.device())
            .map_err(RenderError::creation("fence"))?;
        let pipeline = CommandPipeline::create(&mut backend, context.device())
            .map_err(RenderError::creation("command pipeline"))?;

        let mut tracker = BarrierTracker::new();
        for buffer in surface.back_buffers() {
            tracker.register(buffer, ResourceState::Present);
        }

        let mut driver = Self {
            backend,
            context,
            queue,
            surface,
            sync,
            pipeline,
            tracker,
            callbacks,
            config,
            viewport: Viewport::from_size(width, height),
            clock: FrameClock::new(),
            state: FrameState::Idle,
            minimized: false,
            initialized: false,
            shut_down: false,
        };

        driver
            .callbacks
            .on_init(driver.context.info())
            .map_err(RenderError::Callbacks)?;
        driver.initialized = true;

        Ok(driver)
    }

    /// Runs one tick: acquire, move, record, submit, present, then wait for
    /// the GPU.
    pub fn render_frame(&mut self) -> Result<FrameOutcome, RenderError> {
        if self.shut_down {
            return Err(RenderError::ShutDown);
        }
        if self.minimized || !self.surface.is_renderable() {
            log::trace!("frame skipped: no valid render target");
            return Ok(FrameOutcome::Skipped);
        }

        // A skipped tick must not advance the clock or the callbacks.
        let target = match self.surface.current_back_buffer(&mut self.backend) {
            Ok(Some(target)) => target,
            Ok(None) => return Ok(FrameOutcome::Skipped),
            Err(err) if err.is_transient() => {
                log::debug!("frame skipped: {err}");
                return Ok(FrameOutcome::Skipped);
            }
            Err(err) => return Err(RenderError::frame("back-buffer acquire")(err)),
        };

        let time = self.clock.tick();
        self.callbacks.on_frame_move(time);

        self.record(target)?;
        self.submit(target)?;
        self.synchronize()?;

        debug_assert!(self.tracker.all_in(ResourceState::Present));
        self.state = FrameState::Idle;
        log::trace!("frame {} presented from buffer {}", time.frame_index, target.index);

        Ok(FrameOutcome::Presented)
    }

    /// Drains the GPU, recreates the surface at the new size and updates the
    /// viewport.
    ///
    /// A zero extent pauses rendering until a non-zero size arrives. A
    /// failure leaves rendering paused at the last good size.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), RenderError> {
        if self.shut_down {
            return Err(RenderError::ShutDown);
        }
        if width == 0 || height == 0 {
            if !self.minimized {
                log::info!("surface minimized; rendering paused");
            }
            self.minimized = true;
            return Ok(());
        }
        self.minimized = false;

        let drained = self
            .sync
            .drain(&mut self.backend, self.queue)
            .map_err(RenderError::frame("resize drain"))?;
        self.pipeline.retire_after(drained);
        self.state = FrameState::Synchronized;

        for buffer in self.surface.back_buffers().collect::<Vec<_>>() {
            self.tracker.forget(buffer);
        }

        let resized = self.surface.resize(&mut self.backend, width, height);

        for buffer in self.surface.back_buffers() {
            self.tracker.register(buffer, ResourceState::Present);
        }
        self.state = FrameState::Idle;
        resized?;

        self.viewport = Viewport::from_size(self.surface.width(), self.surface.height());
        self.clock.reset();
        self.callbacks.on_resize(width, height);
        Ok(())
    }

    /// Drains the GPU, runs `on_term` and releases the surface. Idempotent.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;

        if let Err(err) = self.sync.drain(&mut self.backend, self.queue) {
            log::warn!("GPU drain during shutdown failed: {err}");
        }

        if self.initialized {
            self.callbacks.on_term();
        }

        for buffer in self.surface.back_buffers().collect::<Vec<_>>() {
            self.tracker.forget(buffer);
        }
        self.surface.release(&mut self.backend);
        self.state = FrameState::Idle;
        log::info!("renderer shut down");
    }

    // ── frame stages ──────────────────────────────────────────────────────

    /// Idle -> Recording.
    fn record(&mut self, target: BackBuffer) -> Result<(), RenderError> {
        self.pipeline.reset(&mut self.backend, &self.sync)?;
        self.state = FrameState::Recording;

        self.pipeline
            .record(&mut self.backend, GpuCommand::SetViewport(self.viewport))?;
        self.tracker.transition(
            &mut self.backend,
            &mut self.pipeline,
            target.resource,
            ResourceState::Present,
            ResourceState::RenderTarget,
        )?;
        self.pipeline.record(
            &mut self.backend,
            GpuCommand::ClearRenderTarget {
                view: target.view,
                color: self.config.clear_color,
            },
        )?;

        let depth_view = self.surface.depth_view();
        if let Some(view) = depth_view {
            self.pipeline
                .record(&mut self.backend, GpuCommand::ClearDepthStencil { view, depth: 1.0 })?;
        }

        let mut frame = FrameRecorder::new(
            self.viewport,
            self.surface.width(),
            self.surface.height(),
            depth_view.is_some(),
        );
        self.callbacks.on_frame_render(&mut frame);

        for request in frame.into_requests() {
            let command = match request {
                FrameRequest::Clear(color) => GpuCommand::ClearRenderTarget {
                    view: target.view,
                    color,
                },
                FrameRequest::ClearDepth(depth) => match depth_view {
                    Some(view) => GpuCommand::ClearDepthStencil { view, depth },
                    None => continue,
                },
                FrameRequest::SetViewport(viewport) if viewport.is_valid() => {
                    GpuCommand::SetViewport(viewport)
                }
                FrameRequest::SetViewport(viewport) => {
                    log::warn!("ignoring invalid viewport {viewport:?}");
                    continue;
                }
            };
            self.pipeline.record(&mut self.backend, command)?;
        }

        Ok(())
    }

    /// Recording -> Submitted.
    fn submit(&mut self, target: BackBuffer) -> Result<(), RenderError> {
        self.tracker.transition(
            &mut self.backend,
            &mut self.pipeline,
            target.resource,
            ResourceState::RenderTarget,
            ResourceState::Present,
        )?;
        self.pipeline.close(&mut self.backend)?;
        self.pipeline.submit(&mut self.backend, self.queue)?;
        self.surface
            .present(&mut self.backend, self.config.sync_interval)
            .map_err(RenderError::frame("present"))?;
        self.state = FrameState::Submitted;
        Ok(())
    }

    /// Submitted -> Synchronized.
    fn synchronize(&mut self) -> Result<(), RenderError> {
        let value = self
            .sync
            .signal(&mut self.backend, self.queue)
            .map_err(RenderError::frame("fence signal"))?;
        self.pipeline.retire_after(value);
        self.sync
            .wait_until(&mut self.backend, value)
            .map_err(RenderError::frame("fence wait"))?;
        self.state = FrameState::Synchronized;
        Ok(())
    }

    // ── accessors ─────────────────────────────────────────────────────────

    #[inline]
    pub fn state(&self) -> FrameState {
        self.state
    }

    #[inline]
    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    #[inline]
    pub fn context(&self) -> &DeviceContext {
        &self.context
    }

    #[inline]
    pub fn surface(&self) -> &PresentationSurface {
        &self.surface
    }

    #[inline]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    #[inline]
    pub fn callbacks(&self) -> &C {
        &self.callbacks
    }

    #[inline]
    pub fn config(&self) -> &RenderConfig {
        &self.config
    }
}

impl<B: Backend, C: FrameCallbacks> FrameEvents for FrameDriver<B, C> {
    fn on_resize(&mut self, width: u32, height: u32) -> Result<(), RenderError> {
        self.resize(width, height)
    }

    fn on_frame_tick(&mut self) -> Result<FrameOutcome, RenderError> {
        self.render_frame()
    }
}

impl<B: Backend, C: FrameCallbacks> Drop for FrameDriver<B, C> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
