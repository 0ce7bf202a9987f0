//! Multi-subscriber callback lists.
//!
//! Frame, resize, dirty and idle notifications are all delivered through
//! [`ClosureList`].

mod list;

pub use list::{ClosureHandle, ClosureList, DestroyNotify};
