//! Contract between the host runtime and applications.
//!
//! Applications never see winit windows or wgpu surfaces directly: they get
//! an [`crate::Onscreen`] per window and register closures on it.

mod app;

pub use app::{App, AppControl};
