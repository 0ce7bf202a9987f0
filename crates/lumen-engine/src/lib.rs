//! Lumen engine crate.
//!
//! Onscreen presentation core: swap requests, frame-completion (SYNC /
//! COMPLETE) notification, resize and dirty-region callbacks, all delivered
//! through a host-driven idle dispatch. Window systems plug in behind the
//! [`Winsys`] trait; a wgpu/winit implementation and a headless one ship with
//! the crate.

pub mod closure;
pub mod context;
pub mod coords;
pub mod core;
pub mod error;
pub mod frame;
pub mod logging;
pub mod onscreen;
pub mod poll;
pub mod window;
pub mod winsys;

pub use closure::{ClosureHandle, DestroyNotify};
pub use context::{Context, ContextConfig, Renderer};
pub use coords::{Color, Rect, Viewport};
pub use error::{Error, Result};
pub use frame::{FrameEvent, FrameInfo};
pub use onscreen::{Onscreen, OnscreenConfig, OnscreenId, WeakOnscreen};
pub use winsys::{BufferBits, EventMask, OnscreenBackend, Winsys, WinsysFeatures};
