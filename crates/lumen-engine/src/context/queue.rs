use std::collections::VecDeque;
use std::rc::Rc;

use crate::coords::Rect;
use crate::frame::{FrameEvent, FrameInfo};
use crate::onscreen::Onscreen;

/// A frame event waiting for dispatch.
///
/// Holds strong references so the onscreen and frame info outlive the entry.
pub(super) struct QueuedEvent {
    pub(super) onscreen: Onscreen,
    pub(super) info: Rc<FrameInfo>,
    pub(super) event: FrameEvent,
}

/// A dirty region waiting for dispatch.
pub(super) struct QueuedDirty {
    pub(super) onscreen: Onscreen,
    pub(super) rect: Rect,
}

/// Context-wide FIFO queues, appended at the tail and detached whole.
#[derive(Default)]
pub(super) struct EventQueues {
    pub(super) events: VecDeque<QueuedEvent>,
    pub(super) dirty: VecDeque<QueuedDirty>,
}

impl EventQueues {
    pub(super) fn is_empty(&self) -> bool {
        self.events.is_empty() && self.dirty.is_empty()
    }

    /// Moves every entry queued for `onscreen` into a new set, keeping the
    /// order of the rest.
    pub(super) fn split_off_onscreen(&mut self, onscreen: &Onscreen) -> EventQueues {
        let (events, kept) = std::mem::take(&mut self.events)
            .into_iter()
            .partition(|queued| queued.onscreen == *onscreen);
        self.events = kept;

        let (dirty, kept) = std::mem::take(&mut self.dirty)
            .into_iter()
            .partition(|queued| queued.onscreen == *onscreen);
        self.dirty = kept;

        EventQueues { events, dirty }
    }
}
