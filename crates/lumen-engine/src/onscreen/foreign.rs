use std::cell::RefCell;
use std::fmt;

use raw_window_handle::RawWindowHandle;

use crate::winsys::EventMask;

use super::Onscreen;

/// Callback through which the winsys tells the owner of a foreign window
/// which native events it must select on that window.
pub type ForeignMaskCallback = dyn FnMut(&Onscreen, EventMask);

/// Externally owned native window an onscreen renders into.
pub(super) struct ForeignWindow {
    pub(super) handle: RawWindowHandle,
    pub(super) update_mask: RefCell<Box<ForeignMaskCallback>>,
}

impl fmt::Debug for ForeignWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForeignWindow")
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}
