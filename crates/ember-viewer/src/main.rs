use anyhow::Result;

use ember_engine::hal::AdapterInfo;
use ember_engine::logging::{LoggingConfig, init_logging};
use ember_engine::paint::Color;
use ember_engine::time::FrameTime;
use ember_engine::window::{Runtime, RuntimeConfig};
use ember_engine::{FrameCallbacks, FrameRecorder, RenderConfig};

/// Seconds for one full sweep between the two clear colors.
const SWEEP_SECONDS: f32 = 4.0;

/// Clears the window to a color that drifts back and forth over time.
struct ColorSweep {
    from: Color,
    to: Color,
    phase: f32,
    frames: u64,
}

impl ColorSweep {
    fn new() -> Self {
        Self {
            from: Color::CORNFLOWER_BLUE,
            to: Color::from_srgb_u8(32, 24, 48, 255),
            phase: 0.0,
            frames: 0,
        }
    }
}

impl FrameCallbacks for ColorSweep {
    fn on_init(&mut self, adapter: &AdapterInfo) -> Result<()> {
        log::info!(
            "rendering on {} ({} driver, {})",
            adapter.name,
            adapter.driver,
            adapter.backend
        );
        Ok(())
    }

    fn on_term(&mut self) {
        log::info!("presented {} frames", self.frames);
    }

    fn on_frame_move(&mut self, time: FrameTime) {
        self.phase = (self.phase + time.dt / SWEEP_SECONDS).fract();
    }

    fn on_frame_render(&mut self, frame: &mut FrameRecorder) {
        // Triangle wave: 0 -> 1 -> 0 over one sweep.
        let t = 1.0 - (2.0 * self.phase - 1.0).abs();
        frame.clear(self.from.lerp(self.to, t));
        self.frames += 1;
    }

    fn on_resize(&mut self, width: u32, height: u32) {
        log::info!("viewport is now {width}x{height}");
    }
}

fn main() -> Result<()> {
    init_logging(LoggingConfig::default());

    Runtime::run(
        RuntimeConfig {
            title: "Ember Viewer".to_string(),
            ..RuntimeConfig::default()
        },
        RenderConfig::default(),
        ColorSweep::new,
    )
}
