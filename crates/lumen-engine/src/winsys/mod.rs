//! Window-system integration contract.
//!
//! A [`Winsys`] is selected when the [`crate::Renderer`] is created and stays
//! fixed for its lifetime. It produces one [`OnscreenBackend`] per allocated
//! onscreen; the onscreen core calls through that backend for the actual
//! swap, visibility and resize primitives.
//!
//! Optional primitives have no-op default bodies. Whether the core calls them
//! at all is decided by the [`WinsysFeatures`] the winsys advertises.

mod gpu;
mod headless;

pub use gpu::{WgpuConfig, WgpuWinsys};
pub use headless::{CallLog, HeadlessWinsys, WinsysCall};

use bitflags::bitflags;
use raw_window_handle::RawWindowHandle;

use crate::coords::Rect;
use crate::error::Result;
use crate::onscreen::{DrawCommand, Onscreen};

bitflags! {
    /// Capabilities a window system may advertise.
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct WinsysFeatures: u32 {
        /// `swap_region` is implemented.
        const SWAP_REGION = 1 << 0;
        /// `buffer_age` reports real values.
        const BUFFER_AGE = 1 << 1;
        /// The platform reports SYNC/COMPLETE itself through
        /// [`Onscreen::notify_frame_sync`] and [`Onscreen::notify_complete`].
        const SYNC_AND_COMPLETE_EVENT = 1 << 2;
        /// The platform reports dirty regions itself (e.g. expose events).
        const DIRTY_EVENTS = 1 << 3;
        /// `set_visibility` is implemented.
        const VISIBILITY = 1 << 4;
        /// `set_resizable` is implemented.
        const RESIZABLE = 1 << 5;
    }
}

bitflags! {
    /// Framebuffer buffers whose contents may be discarded.
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct BufferBits: u32 {
        const COLOR = 1 << 0;
        const DEPTH = 1 << 1;
        const STENCIL = 1 << 2;
    }
}

bitflags! {
    /// Native window events a window system needs delivered for a foreign
    /// window it does not own.
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct EventMask: u32 {
        const EXPOSURE = 1 << 0;
        const STRUCTURE_NOTIFY = 1 << 1;
        const VISIBILITY_CHANGE = 1 << 2;
    }
}

/// Per-platform factory for onscreen backends.
pub trait Winsys {
    /// Short identifier used in logs.
    fn name(&self) -> &'static str;

    fn features(&self) -> WinsysFeatures;

    /// Creates the native resources for `onscreen`.
    ///
    /// Called once, the first time the onscreen is allocated. The onscreen's
    /// size, configuration and foreign window are final at this point.
    fn onscreen_init(&self, onscreen: &Onscreen) -> Result<Box<dyn OnscreenBackend>>;
}

/// Native resources backing one allocated onscreen.
///
/// Methods are never called re-entrantly: a backend may call back into its
/// onscreen (e.g. [`Onscreen::notify_complete`]) from any method, but the
/// core will not call the backend again until that method returns.
pub trait OnscreenBackend {
    /// Executes rendering commands buffered since the last swap.
    fn flush(&mut self, commands: &[DrawCommand]) {
        let _ = commands;
    }

    /// Presents the back buffer. `damage` is empty for a full-surface swap.
    fn swap_buffers_with_damage(&mut self, damage: &[Rect]);

    /// Copies `rects` of the back buffer to the front buffer.
    ///
    /// Only called when the winsys advertises [`WinsysFeatures::SWAP_REGION`].
    fn swap_region(&mut self, rects: &[Rect]) {
        let _ = rects;
        log::warn!("swap_region reached a backend that does not implement it");
    }

    /// Only called when the winsys advertises [`WinsysFeatures::BUFFER_AGE`].
    fn buffer_age(&self) -> u32 {
        0
    }

    /// Pushes a new vsync-throttling policy to the platform.
    fn update_swap_throttled(&mut self, throttled: bool);

    /// Only called when the winsys advertises [`WinsysFeatures::VISIBILITY`].
    fn set_visibility(&mut self, visible: bool) {
        let _ = visible;
    }

    /// Only called when the winsys advertises [`WinsysFeatures::RESIZABLE`].
    fn set_resizable(&mut self, resizable: bool) {
        let _ = resizable;
    }

    /// Hint that buffer contents are no longer needed after a swap.
    fn discard_buffers(&mut self, buffers: BufferBits) {
        let _ = buffers;
    }

    /// Native handle of the window this backend renders to, if any.
    fn window_handle(&self) -> Option<RawWindowHandle> {
        None
    }

    /// Releases native resources. Called once, when the onscreen is destroyed.
    fn deinit(&mut self) {}
}
