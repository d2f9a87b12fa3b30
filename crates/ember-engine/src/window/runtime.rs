use std::sync::Arc;

use anyhow::{Context, Result};

use winit::application::ApplicationHandler;
use winit::dpi::{LogicalSize, PhysicalSize};
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowId};

use crate::core::{FrameCallbacks, FrameDriver, FrameEvents};
use crate::device::{ErrorKind, RenderConfig, RenderError};
use crate::hal::WgpuBackend;

/// Window/runtime configuration.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub title: String,
    pub initial_size: LogicalSize<f64>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            title: "ember".to_string(),
            initial_size: LogicalSize::new(960.0, 540.0),
        }
    }
}

/// Entry point for the runtime.
pub struct Runtime;

impl Runtime {
    /// Opens one window and renders into it until it is closed.
    ///
    /// `make_callbacks` runs once, when the window exists. Creation failures
    /// and frame failures end the loop and are returned.
    pub fn run<C, F>(config: RuntimeConfig, render: RenderConfig, make_callbacks: F) -> Result<()>
    where
        C: FrameCallbacks + 'static,
        F: FnOnce() -> C,
    {
        let event_loop = EventLoop::new().context("failed to create winit EventLoop")?;
        let mut state = RuntimeState::new(config, render, make_callbacks);

        event_loop
            .run_app(&mut state)
            .context("winit event loop terminated with error")?;

        match state.failure.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

struct RuntimeState<F> {
    // Declared first so the renderer drains and releases before the window drops.
    events: Option<Box<dyn FrameEvents>>,
    window: Option<Arc<Window>>,
    config: RuntimeConfig,
    render: RenderConfig,
    make_callbacks: Option<F>,
    failure: Option<anyhow::Error>,
    exit_requested: bool,
}

impl<C, F> RuntimeState<F>
where
    C: FrameCallbacks + 'static,
    F: FnOnce() -> C,
{
    fn new(config: RuntimeConfig, render: RenderConfig, make_callbacks: F) -> Self {
        Self {
            events: None,
            window: None,
            config,
            render,
            make_callbacks: Some(make_callbacks),
            failure: None,
            exit_requested: false,
        }
    }

    fn create_renderer(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let attrs = Window::default_attributes()
            .with_title(self.config.title.clone())
            .with_inner_size(self.config.initial_size);

        let window = Arc::new(
            event_loop
                .create_window(attrs)
                .context("failed to create window")?,
        );

        let make_callbacks = self
            .make_callbacks
            .take()
            .context("frame callbacks were already consumed")?;

        let size = window.inner_size();
        let driver = FrameDriver::initialize(
            WgpuBackend::new(),
            &window,
            size.width.max(1),
            size.height.max(1),
            self.render.clone(),
            make_callbacks(),
        )
        .context("renderer initialization failed")?;

        window.request_redraw();
        self.events = Some(Box::new(driver));
        self.window = Some(window);
        Ok(())
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, error: anyhow::Error) {
        log::error!("{error:#}");
        self.failure = Some(error);
        self.shutdown(event_loop);
    }

    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        // Dropping the driver drains the GPU and runs `on_term`.
        self.events.take();
        self.exit_requested = true;
        event_loop.exit();
    }

    fn resize(&mut self, event_loop: &ActiveEventLoop, size: PhysicalSize<u32>) {
        let Some(events) = self.events.as_mut() else {
            return;
        };

        match events.on_resize(size.width, size.height) {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::Resize => {
                log::warn!("rendering paused until the next successful resize: {err}");
            }
            Err(err) => self.fail(event_loop, render_failure(err, "resize")),
        }

        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }
}

impl<C, F> ApplicationHandler for RuntimeState<F>
where
    C: FrameCallbacks + 'static,
    F: FnOnce() -> C,
{
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() || self.exit_requested {
            return;
        }

        if let Err(err) = self.create_renderer(event_loop) {
            self.fail(event_loop, err);
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.exit_requested {
            event_loop.exit();
            return;
        }

        event_loop.set_control_flow(ControlFlow::Wait);

        // Continuous redraw.
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        if self.exit_requested {
            event_loop.exit();
            return;
        }
        if self.window.as_ref().is_none_or(|w| w.id() != window_id) {
            return;
        }

        match event {
            WindowEvent::CloseRequested => {
                log::info!("window closed");
                self.shutdown(event_loop);
            }
            WindowEvent::Resized(size) => self.resize(event_loop, size),
            WindowEvent::ScaleFactorChanged { .. } => {
                if let Some(size) = self.window.as_ref().map(|w| w.inner_size()) {
                    self.resize(event_loop, size);
                }
            }
            WindowEvent::RedrawRequested => {
                let Some(events) = self.events.as_mut() else {
                    return;
                };
                if let Err(err) = events.on_frame_tick() {
                    self.fail(event_loop, render_failure(err, "frame"));
                }
            }
            _ => {}
        }
    }
}

fn render_failure(error: RenderError, stage: &'static str) -> anyhow::Error {
    anyhow::Error::new(error).context(format!("unrecoverable {stage} failure"))
}
