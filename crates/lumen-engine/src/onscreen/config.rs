/// Per-onscreen framebuffer configuration.
///
/// A context carries one of these as its onscreen template; every new onscreen
/// starts from a copy.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct OnscreenConfig {
    /// Throttle swaps to the display refresh (vsync).
    pub swap_throttled: bool,

    /// Request a stencil buffer from the window system.
    pub need_stencil: bool,

    /// Multisample count; 0 disables multisampling.
    pub samples_per_pixel: u32,
}

impl Default for OnscreenConfig {
    fn default() -> Self {
        Self {
            swap_throttled: true,
            need_stencil: false,
            samples_per_pixel: 0,
        }
    }
}
