//! In-process window system without native windows.
//!
//! Every backend call is appended to a shared [`CallLog`], which makes this
//! winsys the test double for the platform layer. Headless embedders (offline
//! rendering, CI) can use it as-is.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::coords::Rect;
use crate::error::{Error, Result};
use crate::onscreen::{DrawCommand, Onscreen, OnscreenConfig, OnscreenId, WeakOnscreen};

use super::{BufferBits, EventMask, OnscreenBackend, Winsys, WinsysFeatures};

/// Nominal refresh interval reported for inline completions (60 Hz).
const REFRESH_INTERVAL_NS: i64 = 16_666_667;

/// One recorded backend call.
#[derive(Debug, Clone, PartialEq)]
pub enum WinsysCall {
    Init {
        onscreen: OnscreenId,
        width: i32,
        height: i32,
        config: OnscreenConfig,
    },
    Flush { commands: Vec<DrawCommand> },
    SwapBuffers { damage: Vec<Rect> },
    SwapRegion { rects: Vec<Rect> },
    DiscardBuffers(BufferBits),
    SwapThrottled(bool),
    Visibility(bool),
    Resizable(bool),
    Deinit,
}

/// Shared, append-only record of backend calls.
#[derive(Debug, Clone, Default)]
pub struct CallLog(Rc<RefCell<Vec<WinsysCall>>>);

impl CallLog {
    fn record(&self, call: WinsysCall) {
        self.0.borrow_mut().push(call);
    }

    pub fn calls(&self) -> Vec<WinsysCall> {
        self.0.borrow().clone()
    }

    pub fn count(&self, mut matches: impl FnMut(&WinsysCall) -> bool) -> usize {
        self.0.borrow().iter().filter(|call| matches(call)).count()
    }
}

/// Window system that renders nowhere and records everything.
#[derive(Debug)]
pub struct HeadlessWinsys {
    features: WinsysFeatures,
    buffer_age: Rc<Cell<u32>>,
    inline_completion: bool,
    init_error: RefCell<Option<String>>,
    log: CallLog,
}

impl HeadlessWinsys {
    pub fn new(features: WinsysFeatures) -> Self {
        Self {
            features,
            buffer_age: Rc::new(Cell::new(0)),
            inline_completion: false,
            init_error: RefCell::new(None),
            log: CallLog::default(),
        }
    }

    /// Reports SYNC and COMPLETE from inside every swap, the way a driver with
    /// native completion events may do.
    ///
    /// Only meaningful together with [`WinsysFeatures::SYNC_AND_COMPLETE_EVENT`].
    pub fn with_inline_completion(mut self) -> Self {
        self.inline_completion = true;
        self
    }

    pub fn set_buffer_age(&self, age: u32) {
        self.buffer_age.set(age);
    }

    /// Makes subsequent `onscreen_init` calls fail with `reason`.
    pub fn set_init_error(&self, reason: Option<&str>) {
        *self.init_error.borrow_mut() = reason.map(str::to_owned);
    }

    pub fn call_log(&self) -> CallLog {
        self.log.clone()
    }
}

impl Winsys for HeadlessWinsys {
    fn name(&self) -> &'static str {
        "headless"
    }

    fn features(&self) -> WinsysFeatures {
        self.features
    }

    fn onscreen_init(&self, onscreen: &Onscreen) -> Result<Box<dyn OnscreenBackend>> {
        if let Some(reason) = self.init_error.borrow().as_ref() {
            return Err(Error::Allocation(reason.clone()));
        }

        let (width, height) = onscreen.size();
        self.log.record(WinsysCall::Init {
            onscreen: onscreen.id(),
            width,
            height,
            config: onscreen.config(),
        });

        if onscreen.foreign_window().is_some() {
            onscreen.update_foreign_event_mask(EventMask::EXPOSURE | EventMask::STRUCTURE_NOTIFY);
        }

        Ok(Box::new(HeadlessOnscreen {
            onscreen: onscreen.downgrade(),
            log: self.log.clone(),
            buffer_age: Rc::clone(&self.buffer_age),
            inline_completion: self.inline_completion,
            presented: 0,
        }))
    }
}

struct HeadlessOnscreen {
    onscreen: WeakOnscreen,
    log: CallLog,
    buffer_age: Rc<Cell<u32>>,
    inline_completion: bool,
    presented: i64,
}

impl HeadlessOnscreen {
    fn present(&mut self) {
        self.presented += 1;
        if !self.inline_completion {
            return;
        }

        let Some(onscreen) = self.onscreen.upgrade() else {
            return;
        };
        if let Some(info) = onscreen.oldest_pending_frame() {
            onscreen.notify_frame_sync(&info);
            info.set_presentation_time(self.presented * REFRESH_INTERVAL_NS);
            info.set_refresh_rate(60.0);
            onscreen.notify_complete(&info);
        }
    }
}

impl OnscreenBackend for HeadlessOnscreen {
    fn flush(&mut self, commands: &[DrawCommand]) {
        if !commands.is_empty() {
            self.log.record(WinsysCall::Flush {
                commands: commands.to_vec(),
            });
        }
    }

    fn swap_buffers_with_damage(&mut self, damage: &[Rect]) {
        self.log.record(WinsysCall::SwapBuffers {
            damage: damage.to_vec(),
        });
        self.present();
    }

    fn swap_region(&mut self, rects: &[Rect]) {
        self.log.record(WinsysCall::SwapRegion {
            rects: rects.to_vec(),
        });
        self.present();
    }

    fn buffer_age(&self) -> u32 {
        self.buffer_age.get()
    }

    fn update_swap_throttled(&mut self, throttled: bool) {
        self.log.record(WinsysCall::SwapThrottled(throttled));
    }

    fn set_visibility(&mut self, visible: bool) {
        self.log.record(WinsysCall::Visibility(visible));
    }

    fn set_resizable(&mut self, resizable: bool) {
        self.log.record(WinsysCall::Resizable(resizable));
    }

    fn discard_buffers(&mut self, buffers: BufferBits) {
        self.log.record(WinsysCall::DiscardBuffers(buffers));
    }

    fn deinit(&mut self) {
        self.log.record(WinsysCall::Deinit);
    }
}
