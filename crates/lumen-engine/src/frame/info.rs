use std::cell::Cell;

/// Lifecycle event reported for a presented frame.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum FrameEvent {
    /// The frame has been handed to the display; the application may start
    /// drawing the next one.
    Sync,
    /// The frame is on screen and its timing fields are final.
    Complete,
}

/// Record describing one swap.
///
/// A `FrameInfo` is created by the onscreen surface at swap time and shared
/// (`Rc<FrameInfo>`) between the surface's in-flight queue and any queued
/// events that carry it. Timing fields are filled in by the window system
/// before completion is reported and read-only afterwards by convention.
#[derive(Debug)]
pub struct FrameInfo {
    frame_counter: i64,

    /// Presentation timestamp in nanoseconds on the window system's clock.
    presentation_time: Cell<Option<i64>>,

    /// Refresh rate of the output the frame was shown on, in Hz.
    refresh_rate: Cell<Option<f32>>,

    sync_queued: Cell<bool>,
    complete_queued: Cell<bool>,
}

impl FrameInfo {
    pub(crate) fn new(frame_counter: i64) -> Self {
        Self {
            frame_counter,
            presentation_time: Cell::new(None),
            refresh_rate: Cell::new(None),
            sync_queued: Cell::new(false),
            complete_queued: Cell::new(false),
        }
    }

    /// Value of the owning surface's frame counter when the swap was issued.
    pub fn frame_counter(&self) -> i64 {
        self.frame_counter
    }

    pub fn presentation_time(&self) -> Option<i64> {
        self.presentation_time.get()
    }

    pub fn set_presentation_time(&self, nanos: i64) {
        self.presentation_time.set(Some(nanos));
    }

    pub fn refresh_rate(&self) -> Option<f32> {
        self.refresh_rate.get()
    }

    pub fn set_refresh_rate(&self, hz: f32) {
        self.refresh_rate.set(Some(hz));
    }

    /// Returns `true` once the COMPLETE event for this frame has been queued.
    pub fn is_complete(&self) -> bool {
        self.complete_queued.get()
    }

    pub(crate) fn is_event_queued(&self, event: FrameEvent) -> bool {
        match event {
            FrameEvent::Sync => self.sync_queued.get(),
            FrameEvent::Complete => self.complete_queued.get(),
        }
    }

    /// Marks `event` as queued. Returns `false` if it already was.
    pub(crate) fn mark_queued(&self, event: FrameEvent) -> bool {
        let flag = match event {
            FrameEvent::Sync => &self.sync_queued,
            FrameEvent::Complete => &self.complete_queued,
        };
        !flag.replace(true)
    }
}
