//! Rendering context and the renderer it is bound to.
//!
//! The [`Context`] owns the frame-event and dirty-region queues shared by all
//! of its onscreens, plus the single idle registration that drains them.

mod config;
mod queue;
mod renderer;

pub use config::ContextConfig;
pub use renderer::Renderer;

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use crate::closure::ClosureHandle;
use crate::coords::Rect;
use crate::frame::{FrameEvent, FrameInfo};
use crate::onscreen::{Onscreen, OnscreenConfig};
use crate::winsys::WinsysFeatures;

use queue::{EventQueues, QueuedDirty, QueuedEvent};

/// Shared handle to a rendering context.
///
/// Cloning is cheap; all clones refer to the same context. All access must
/// happen on the thread running the host event loop.
#[derive(Clone)]
pub struct Context {
    inner: Rc<ContextInner>,
}

struct ContextInner {
    renderer: Renderer,
    config: ContextConfig,
    features: WinsysFeatures,
    queues: RefCell<EventQueues>,
    dispatch_idle: Cell<Option<ClosureHandle>>,
}

impl Context {
    pub fn new(renderer: Renderer, config: ContextConfig) -> Self {
        let mut features = renderer.winsys().features();
        if let Some(dirty_events) = config.dirty_events_override {
            features.set(WinsysFeatures::DIRTY_EVENTS, dirty_events);
        }
        log::debug!(
            "context created on winsys '{}' with features {:?}",
            renderer.winsys().name(),
            features
        );

        Self {
            inner: Rc::new(ContextInner {
                renderer,
                config,
                features,
                queues: RefCell::new(EventQueues::default()),
                dispatch_idle: Cell::new(None),
            }),
        }
    }

    pub fn renderer(&self) -> &Renderer {
        &self.inner.renderer
    }

    pub fn features(&self) -> WinsysFeatures {
        self.inner.features
    }

    pub fn has_feature(&self, feature: WinsysFeatures) -> bool {
        self.inner.features.contains(feature)
    }

    /// Configuration copied into every onscreen created on this context.
    pub fn onscreen_template(&self) -> OnscreenConfig {
        self.inner.config.onscreen_template
    }

    /// Number of frame events waiting for the next dispatch.
    pub fn pending_events(&self) -> usize {
        self.inner.queues.borrow().events.len()
    }

    /// Number of dirty regions waiting for the next dispatch.
    pub fn pending_dirty(&self) -> usize {
        self.inner.queues.borrow().dirty.len()
    }

    /// Returns `true` while a dispatch is scheduled on the renderer.
    pub fn is_dispatch_scheduled(&self) -> bool {
        self.inner.dispatch_idle.get().is_some()
    }

    pub(crate) fn queue_event(&self, onscreen: &Onscreen, info: &Rc<FrameInfo>, event: FrameEvent) {
        self.inner.queues.borrow_mut().events.push_back(QueuedEvent {
            onscreen: onscreen.clone(),
            info: Rc::clone(info),
            event,
        });
        self.schedule_dispatch();
    }

    pub(crate) fn queue_dirty(&self, onscreen: &Onscreen, rect: Rect) {
        self.inner.queues.borrow_mut().dirty.push_back(QueuedDirty {
            onscreen: onscreen.clone(),
            rect,
        });
        self.schedule_dispatch();
    }

    fn schedule_dispatch(&self) {
        if self.inner.dispatch_idle.get().is_some() {
            return;
        }

        // The poll must not keep the context alive: the context owns the queues
        // whose entries keep onscreens (and through them the context) alive.
        let weak = Rc::downgrade(&self.inner);
        let handle = self.inner.renderer.poll().add_idle(move || {
            if let Some(inner) = weak.upgrade() {
                Context { inner }.dispatch_onscreen_events();
            }
        });
        self.inner.dispatch_idle.set(Some(handle));
    }

    /// Delivers every event and dirty region queued before this call.
    ///
    /// Both queues are detached before any callback runs, so events queued by
    /// callbacks (e.g. a redraw that swaps again) are delivered by the next
    /// dispatch, never by this one. The idle registration is cleared first so
    /// such events schedule a fresh dispatch.
    ///
    /// This normally runs from the idle closure registered on the renderer.
    pub fn dispatch_onscreen_events(&self) {
        let detached = std::mem::take(&mut *self.inner.queues.borrow_mut());

        if let Some(handle) = self.inner.dispatch_idle.take() {
            self.inner.renderer.poll().remove_idle(handle);
        }

        log::trace!(
            "dispatching {} frame event(s), {} dirty region(s)",
            detached.events.len(),
            detached.dirty.len()
        );

        for queued in detached.events {
            queued.onscreen.dispatch_frame_event(queued.event, &queued.info);
        }

        for queued in detached.dirty {
            queued.onscreen.dispatch_dirty(queued.rect);
        }
    }

    /// Drops the events and dirty regions queued for `onscreen`, releasing the
    /// references they hold without invoking any callbacks. Returns how many
    /// entries were dropped.
    pub fn discard_onscreen_events(&self, onscreen: &Onscreen) -> usize {
        let dropped = {
            let mut queues = self.inner.queues.borrow_mut();
            let dropped = queues.split_off_onscreen(onscreen);
            if queues.is_empty() {
                if let Some(handle) = self.inner.dispatch_idle.take() {
                    self.inner.renderer.poll().remove_idle(handle);
                }
            }
            dropped
        };

        let count = dropped.events.len() + dropped.dirty.len();
        if count > 0 {
            log::debug!("discarded {count} queued entries of onscreen {:?}", onscreen.id());
        }
        count
    }

    /// Drops every queued event and dirty region and cancels the pending
    /// dispatch.
    ///
    /// Queued entries hold strong references to their onscreens; tearing the
    /// context down releases them without invoking any callbacks.
    pub fn teardown(&self) {
        if let Some(handle) = self.inner.dispatch_idle.take() {
            self.inner.renderer.poll().remove_idle(handle);
        }

        let dropped = std::mem::take(&mut *self.inner.queues.borrow_mut());
        if !dropped.is_empty() {
            log::debug!(
                "context teardown dropped {} frame event(s), {} dirty region(s)",
                dropped.events.len(),
                dropped.dirty.len()
            );
        }
    }
}

impl Drop for ContextInner {
    fn drop(&mut self) {
        if let Some(handle) = self.dispatch_idle.take() {
            self.renderer.poll().remove_idle(handle);
        }
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("winsys", &self.inner.renderer.winsys().name())
            .field("features", &self.inner.features)
            .field("pending_events", &self.pending_events())
            .field("pending_dirty", &self.pending_dirty())
            .finish()
    }
}
