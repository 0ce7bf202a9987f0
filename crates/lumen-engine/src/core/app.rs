use winit::event::WindowEvent;

use crate::onscreen::Onscreen;

/// Control directive returned by app callbacks.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum AppControl {
    Continue,
    Exit,
}

/// Application contract implemented by higher layers.
pub trait App {
    /// Called once per window, after its onscreen is created and before it is
    /// allocated and shown. Register frame/dirty/resize closures here.
    fn on_surface_created(&mut self, onscreen: &Onscreen) -> anyhow::Result<()>;

    /// Called for every native window event before the runtime handles it.
    fn on_window_event(&mut self, onscreen: &Onscreen, event: &WindowEvent) -> AppControl {
        let _ = (onscreen, event);
        AppControl::Continue
    }
}
