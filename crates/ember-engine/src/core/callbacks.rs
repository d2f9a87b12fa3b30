use crate::coords::Viewport;
use crate::hal::AdapterInfo;
use crate::paint::Color;
use crate::time::FrameTime;

/// Per-frame hooks implemented by the application.
///
/// Every hook except [`FrameCallbacks::on_frame_render`] has a no-op default.
pub trait FrameCallbacks {
    /// Called once after the device and surface exist. An error aborts
    /// initialization.
    fn on_init(&mut self, adapter: &AdapterInfo) -> anyhow::Result<()> {
        let _ = adapter;
        Ok(())
    }

    /// Called once during shutdown, after the GPU has drained.
    fn on_term(&mut self) {}

    /// Called once per tick, before recording starts.
    fn on_frame_move(&mut self, time: FrameTime) {
        let _ = time;
    }

    /// Called while the frame's command list is open, after the default clear.
    fn on_frame_render(&mut self, frame: &mut FrameRecorder);

    /// Called after the surface was recreated at the new size.
    fn on_resize(&mut self, width: u32, height: u32) {
        let _ = (width, height);
    }
}

/// A drawing request made from [`FrameCallbacks::on_frame_render`].
#[derive(Debug, Copy, Clone, PartialEq)]
pub(crate) enum FrameRequest {
    Clear(Color),
    ClearDepth(f32),
    SetViewport(Viewport),
}

/// Collects the drawing requests of one frame.
///
/// Requests are recorded into the command list in the order they were made.
#[derive(Debug)]
pub struct FrameRecorder {
    viewport: Viewport,
    width: u32,
    height: u32,
    has_depth: bool,
    requests: Vec<FrameRequest>,
}

impl FrameRecorder {
    pub(crate) fn new(viewport: Viewport, width: u32, height: u32, has_depth: bool) -> Self {
        Self {
            viewport,
            width,
            height,
            has_depth,
            requests: Vec::new(),
        }
    }

    /// Clears the back buffer to `color`.
    pub fn clear(&mut self, color: Color) {
        self.requests.push(FrameRequest::Clear(color));
    }

    /// Clears the depth target. Ignored when no depth target is configured.
    pub fn clear_depth(&mut self, depth: f32) {
        if self.has_depth {
            self.requests.push(FrameRequest::ClearDepth(depth.clamp(0.0, 1.0)));
        }
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
        self.requests.push(FrameRequest::SetViewport(viewport));
    }

    /// Viewport in effect for subsequent requests.
    #[inline]
    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    #[inline]
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    #[inline]
    pub fn has_depth(&self) -> bool {
        self.has_depth
    }

    pub(crate) fn into_requests(self) -> Vec<FrameRequest> {
        self.requests
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requests_keep_their_order() {
        let mut frame = FrameRecorder::new(Viewport::new(4.0, 4.0), 4, 4, true);
        frame.clear(Color::WHITE);
        frame.set_viewport(Viewport::new(2.0, 2.0));
        frame.clear_depth(2.0);

        assert_eq!(frame.viewport(), Viewport::new(2.0, 2.0));
        assert_eq!(
            frame.into_requests(),
            vec![
                FrameRequest::Clear(Color::WHITE),
                FrameRequest::SetViewport(Viewport::new(2.0, 2.0)),
                FrameRequest::ClearDepth(1.0),
            ]
        );
    }

    #[test]
    fn depth_clear_without_depth_target_is_dropped() {
        let mut frame = FrameRecorder::new(Viewport::new(4.0, 4.0), 4, 4, false);
        frame.clear_depth(0.5);
        assert!(frame.into_requests().is_empty());
    }
}
