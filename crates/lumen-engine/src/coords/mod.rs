//! Geometry types shared by the onscreen core and window-system backends.
//!
//! All coordinates are physical pixels with a top-left origin.

mod color;
mod rect;
mod viewport;

pub use color::Color;
pub use rect::Rect;
pub use viewport::Viewport;
