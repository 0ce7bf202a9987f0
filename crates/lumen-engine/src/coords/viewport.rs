/// Framebuffer viewport in physical pixels.
///
/// Onscreen surfaces reset this to cover the whole surface whenever the window
/// system reports a new size.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Viewport {
    #[inline]
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    /// Viewport covering a whole `width` x `height` surface.
    #[inline]
    pub fn full(width: i32, height: i32) -> Self {
        Self::new(0.0, 0.0, width as f32, height as f32)
    }
}
