//! Per-swap frame records and the events reported for them.

mod info;

pub use info::{FrameEvent, FrameInfo};
