//! winit host loop.
//!
//! Owns the `winit` EventLoop and windows, binds each window to an onscreen on
//! the wgpu winsys and drives renderer dispatch once per loop turn.

mod runtime;

pub use runtime::{Runtime, RuntimeConfig};
