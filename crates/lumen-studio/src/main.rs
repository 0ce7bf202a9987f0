use anyhow::Result;

use lumen_engine::core::{App, AppControl};
use lumen_engine::logging::{init_logging, LoggingConfig};
use lumen_engine::window::{Runtime, RuntimeConfig};
use lumen_engine::winsys::WgpuConfig;
use lumen_engine::{Color, ContextConfig, FrameEvent, Onscreen};
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::keyboard::{Key, NamedKey};

/// Redraws continuously: every COMPLETE marks the surface dirty again, and the
/// dirty callback clears to a slowly cycling color and swaps.
struct Studio;

impl App for Studio {
    fn on_surface_created(&mut self, onscreen: &Onscreen) -> Result<()> {
        onscreen.add_dirty_callback(
            |onscreen, _rect| {
                onscreen.clear(pulse(onscreen.frame_counter()));
                if let Err(e) = onscreen.swap_buffers() {
                    log::error!("swap failed: {e}");
                }
            },
            None,
        );

        onscreen.add_frame_callback(
            |onscreen, event, info| match event {
                FrameEvent::Sync => {}
                FrameEvent::Complete => {
                    if info.frame_counter() % 600 == 0 {
                        log::info!("frame {} complete", info.frame_counter());
                    }
                    onscreen.queue_full_dirty();
                }
            },
            None,
        );

        onscreen.add_resize_callback(
            |_, width, height| log::info!("surface resized to {width}x{height}"),
            None,
        );

        Ok(())
    }

    fn on_window_event(&mut self, _onscreen: &Onscreen, event: &WindowEvent) -> AppControl {
        match event {
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        logical_key: Key::Named(NamedKey::Escape),
                        state: ElementState::Pressed,
                        ..
                    },
                ..
            } => AppControl::Exit,
            _ => AppControl::Continue,
        }
    }
}

fn pulse(frame: i64) -> Color {
    let t = (frame % 360) as f32 / 360.0 * std::f32::consts::TAU;
    Color::new(
        0.5 + 0.4 * t.sin(),
        0.3 + 0.2 * (t * 0.5).cos(),
        0.6,
        1.0,
    )
}

fn main() -> Result<()> {
    init_logging(LoggingConfig::default());

    Runtime::run(
        RuntimeConfig {
            title: "Lumen Studio".to_string(),
            ..Default::default()
        },
        WgpuConfig::default(),
        ContextConfig::default(),
        Studio,
    )
}
