//! Onscreen surfaces: swap requests, in-flight frames and notification.
//!
//! An [`Onscreen`] is created unallocated: its size is known but no native
//! resources exist until [`Onscreen::allocate`] (or the first operation that
//! needs them). Each swap pushes a [`FrameInfo`] onto the surface's in-flight
//! queue; SYNC and COMPLETE events for it are queued on the [`Context`] and
//! delivered on the next dispatch, either as reported by the window system or
//! synthesized right after the swap when the window system cannot report them.

mod config;
mod foreign;
mod framebuffer;

pub use config::OnscreenConfig;
pub use foreign::ForeignMaskCallback;
pub use framebuffer::DrawCommand;

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use raw_window_handle::RawWindowHandle;

use crate::closure::{ClosureHandle, ClosureList, DestroyNotify};
use crate::context::Context;
use crate::coords::{Color, Rect, Viewport};
use crate::error::{Error, Result};
use crate::frame::{FrameEvent, FrameInfo};
use crate::winsys::{BufferBits, EventMask, OnscreenBackend, WinsysFeatures};

use foreign::ForeignWindow;
use framebuffer::Framebuffer;

/// Frame event callback: `(onscreen, event, frame_info)`.
pub type FrameCallback = dyn FnMut(&Onscreen, FrameEvent, &FrameInfo);

/// Resize callback: `(onscreen, width, height)`.
pub type ResizeCallback = dyn FnMut(&Onscreen, i32, i32);

/// Dirty-region callback: `(onscreen, rect)`.
pub type DirtyCallback = dyn FnMut(&Onscreen, Rect);

/// Platform-visible state mirrored to the backend.
#[derive(Copy, Clone, PartialEq, Eq)]
struct PlatformState {
    swap_throttled: bool,
    resizable: bool,
    visible: bool,
}

static NEXT_ONSCREEN_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique onscreen identity.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct OnscreenId(u64);

/// Shared handle to an onscreen surface.
///
/// Cloning is cheap. Queued events hold clones, so a surface stays alive until
/// every event referencing it has been dispatched or torn down.
#[derive(Clone)]
pub struct Onscreen {
    inner: Rc<OnscreenInner>,
}

/// Non-owning onscreen handle, for backends that call back into their surface.
#[derive(Clone)]
pub struct WeakOnscreen {
    inner: Weak<OnscreenInner>,
}

struct OnscreenInner {
    id: OnscreenId,
    context: Context,
    config: Cell<OnscreenConfig>,
    framebuffer: Framebuffer,

    /// `Some` once allocated, except while a backend call is in progress.
    backend: RefCell<Option<Box<dyn OnscreenBackend>>>,
    backend_busy: Cell<bool>,

    /// Swaps not yet completed, oldest first.
    pending_frame_infos: RefCell<VecDeque<Rc<FrameInfo>>>,
    frame_counter: Cell<i64>,

    resizable: Cell<bool>,
    visible: Cell<bool>,
    foreign: RefCell<Option<ForeignWindow>>,

    frame_closures: ClosureList<FrameCallback>,
    resize_closures: ClosureList<ResizeCallback>,
    dirty_closures: ClosureList<DirtyCallback>,
}

impl Onscreen {
    /// Creates an unallocated onscreen of the given size.
    pub fn new(context: &Context, width: i32, height: i32) -> Self {
        let id = OnscreenId(NEXT_ONSCREEN_ID.fetch_add(1, Ordering::Relaxed));
        log::debug!("onscreen {id:?} created ({width}x{height})");

        Self {
            inner: Rc::new(OnscreenInner {
                id,
                context: context.clone(),
                config: Cell::new(context.onscreen_template()),
                framebuffer: Framebuffer::new(width, height),
                backend: RefCell::new(None),
                backend_busy: Cell::new(false),
                pending_frame_infos: RefCell::new(VecDeque::new()),
                frame_counter: Cell::new(0),
                resizable: Cell::new(false),
                visible: Cell::new(false),
                foreign: RefCell::new(None),
                frame_closures: ClosureList::new(),
                resize_closures: ClosureList::new(),
                dirty_closures: ClosureList::new(),
            }),
        }
    }

    pub fn id(&self) -> OnscreenId {
        self.inner.id
    }

    pub fn context(&self) -> &Context {
        &self.inner.context
    }

    pub fn config(&self) -> OnscreenConfig {
        self.inner.config.get()
    }

    pub fn downgrade(&self) -> WeakOnscreen {
        WeakOnscreen {
            inner: Rc::downgrade(&self.inner),
        }
    }

    fn has_feature(&self, feature: WinsysFeatures) -> bool {
        self.inner.context.has_feature(feature)
    }

    // ── allocation ────────────────────────────────────────────────────────

    pub fn is_allocated(&self) -> bool {
        self.inner.backend_busy.get() || self.inner.backend.borrow().is_some()
    }

    /// Creates the native resources for this surface. No-op once allocated.
    pub fn allocate(&self) -> Result<()> {
        if self.is_allocated() {
            return Ok(());
        }

        let winsys = self.inner.context.renderer().winsys();
        let backend = winsys.onscreen_init(self)?;
        *self.inner.backend.borrow_mut() = Some(backend);

        let (width, height) = self.size();
        log::debug!(
            "onscreen {:?} allocated on '{}' ({width}x{height})",
            self.inner.id,
            winsys.name()
        );
        Ok(())
    }

    // ── framebuffer ───────────────────────────────────────────────────────

    pub fn size(&self) -> (i32, i32) {
        self.inner.framebuffer.size()
    }

    pub fn width(&self) -> i32 {
        self.size().0
    }

    pub fn height(&self) -> i32 {
        self.size().1
    }

    pub fn viewport(&self) -> Viewport {
        self.inner.framebuffer.viewport()
    }

    pub fn set_viewport(&self, viewport: Viewport) {
        self.inner.framebuffer.set_viewport(viewport);
    }

    /// Buffers a clear of the color buffer, executed when the next swap flushes.
    pub fn clear(&self, color: Color) {
        self.clear_buffers(color, BufferBits::COLOR);
    }

    pub fn clear_buffers(&self, color: Color, buffers: BufferBits) {
        self.inner.framebuffer.record(DrawCommand::Clear { color, buffers });
    }

    /// Returns `true` if rendering commands were recorded since the last swap.
    pub fn is_mid_scene(&self) -> bool {
        self.inner.framebuffer.is_mid_scene()
    }

    // ── swapping ──────────────────────────────────────────────────────────

    pub fn frame_counter(&self) -> i64 {
        self.inner.frame_counter.get()
    }

    /// Number of swaps whose completion has not been reported yet.
    pub fn in_flight_frames(&self) -> usize {
        self.inner.pending_frame_infos.borrow().len()
    }

    /// Oldest swap still waiting for completion.
    pub fn oldest_pending_frame(&self) -> Option<Rc<FrameInfo>> {
        self.inner.pending_frame_infos.borrow().front().cloned()
    }

    /// Snapshot of the swaps still waiting for completion, oldest first.
    pub fn pending_frames(&self) -> Vec<Rc<FrameInfo>> {
        self.inner.pending_frame_infos.borrow().iter().cloned().collect()
    }

    pub fn swap_buffers(&self) -> Result<()> {
        self.swap_buffers_with_damage(&[])
    }

    /// Presents the frame. `damage` lists the regions changed since the last
    /// swap; an empty slice means the whole surface.
    pub fn swap_buffers_with_damage(&self, damage: &[Rect]) -> Result<()> {
        self.allocate()?;
        self.swap_with(|backend| backend.swap_buffers_with_damage(damage))
    }

    /// Presents only `rects` of the back buffer.
    ///
    /// Fails with [`Error::Unsupported`] before touching any state when the
    /// winsys does not advertise [`WinsysFeatures::SWAP_REGION`].
    /// Rectangles outside the surface are clipped away before the winsys
    /// sees them.
    pub fn swap_region(&self, rects: &[Rect]) -> Result<()> {
        if !self.has_feature(WinsysFeatures::SWAP_REGION) {
            return Err(Error::Unsupported("swap_region"));
        }
        self.allocate()?;

        let (width, height) = self.size();
        let surface = Rect::from_size(width, height);
        let clipped: Vec<Rect> = rects.iter().filter_map(|r| r.intersect(surface)).collect();
        self.swap_with(|backend| backend.swap_region(&clipped))
    }

    fn swap_with(&self, swap: impl FnOnce(&mut dyn OnscreenBackend)) -> Result<()> {
        let inner = &self.inner;

        if inner.backend_busy.get() {
            return Err(Error::ContractViolation(
                "swap requested from inside a winsys call",
            ));
        }

        let swapped = self.with_backend(|backend| {
            backend.flush(&inner.framebuffer.take_journal());

            let info = Rc::new(FrameInfo::new(inner.frame_counter.get()));
            inner.pending_frame_infos.borrow_mut().push_back(info);

            swap(&mut *backend);
            backend.discard_buffers(BufferBits::all());
        });
        if swapped.is_none() {
            return Err(Error::Allocation("onscreen has no backend".to_string()));
        }

        if !self.has_feature(WinsysFeatures::SYNC_AND_COMPLETE_EVENT) {
            self.complete_synthesized();
        }

        log::trace!("onscreen {:?} swapped frame {}", inner.id, inner.frame_counter.get());
        inner.frame_counter.set(inner.frame_counter.get() + 1);
        inner.framebuffer.end_scene();
        Ok(())
    }

    /// Retires in-flight frames on a winsys that cannot report completion.
    ///
    /// Exactly one frame is expected. Anything else means the platform layer
    /// lost track of a swap; every remaining frame is retired in order.
    fn complete_synthesized(&self) {
        let retired: Vec<Rc<FrameInfo>> =
            self.inner.pending_frame_infos.borrow_mut().drain(..).collect();

        if retired.len() != 1 {
            log::warn!(
                "onscreen {:?}: expected one in-flight frame on the synthesized completion path, found {}",
                self.inner.id,
                retired.len()
            );
        }

        for info in &retired {
            self.queue_frame_event(FrameEvent::Sync, info);
            self.queue_frame_event(FrameEvent::Complete, info);
        }
    }

    /// Returns how many frames ago the current back buffer was last valid,
    /// or 0 if unknown. Advisory only.
    pub fn buffer_age(&self) -> u32 {
        if !self.has_feature(WinsysFeatures::BUFFER_AGE) {
            return 0;
        }
        self.with_backend(|backend| backend.buffer_age()).unwrap_or(0)
    }

    /// Runs `call` with the backend moved out of its slot, so the backend may
    /// call back into this onscreen from any method.
    ///
    /// Returns `None` if the onscreen is unallocated or a backend call is
    /// already in progress. Platform state changed by such nested calls is
    /// pushed to the backend before it is put back.
    fn with_backend<R>(&self, call: impl FnOnce(&mut dyn OnscreenBackend) -> R) -> Option<R> {
        let mut backend = self.inner.backend.borrow_mut().take()?;
        self.inner.backend_busy.set(true);

        let mut synced = self.platform_state();
        let result = call(backend.as_mut());

        loop {
            let current = self.platform_state();
            if current == synced {
                break;
            }
            self.push_platform_state(backend.as_mut(), synced, current);
            synced = current;
        }

        self.inner.backend_busy.set(false);
        *self.inner.backend.borrow_mut() = Some(backend);
        Some(result)
    }

    fn platform_state(&self) -> PlatformState {
        PlatformState {
            swap_throttled: self.swap_throttled(),
            resizable: self.resizable(),
            visible: self.is_visible(),
        }
    }

    fn push_platform_state(
        &self,
        backend: &mut dyn OnscreenBackend,
        old: PlatformState,
        new: PlatformState,
    ) {
        if old.swap_throttled != new.swap_throttled {
            backend.update_swap_throttled(new.swap_throttled);
        }
        if old.resizable != new.resizable && self.has_feature(WinsysFeatures::RESIZABLE) {
            backend.set_resizable(new.resizable);
        }
        if old.visible != new.visible && self.has_feature(WinsysFeatures::VISIBILITY) {
            backend.set_visibility(new.visible);
        }
    }

    // ── platform state ────────────────────────────────────────────────────

    pub fn resizable(&self) -> bool {
        self.inner.resizable.get()
    }

    /// Hints whether the user may resize the window. Platforms may ignore it.
    pub fn set_resizable(&self, resizable: bool) {
        if self.inner.resizable.replace(resizable) == resizable {
            return;
        }

        if self.has_feature(WinsysFeatures::RESIZABLE) {
            self.with_backend(|backend| backend.set_resizable(resizable));
        }
    }

    pub fn swap_throttled(&self) -> bool {
        self.config().swap_throttled
    }

    pub fn set_swap_throttled(&self, throttled: bool) {
        let mut config = self.inner.config.get();
        if config.swap_throttled == throttled {
            return;
        }
        config.swap_throttled = throttled;
        self.inner.config.set(config);

        log::debug!("onscreen {:?} swap throttling -> {throttled}", self.inner.id);
        self.with_backend(|backend| backend.update_swap_throttled(throttled));
    }

    pub fn is_visible(&self) -> bool {
        self.inner.visible.get()
    }

    /// Makes the surface visible, allocating it first if needed.
    ///
    /// On allocation failure the visibility is left unchanged.
    pub fn show(&self) -> Result<()> {
        self.allocate()?;
        self.inner.visible.set(true);

        if self.has_feature(WinsysFeatures::VISIBILITY) {
            self.with_backend(|backend| backend.set_visibility(true));
        }
        Ok(())
    }

    pub fn hide(&self) {
        self.inner.visible.set(false);

        if self.has_feature(WinsysFeatures::VISIBILITY) {
            self.with_backend(|backend| backend.set_visibility(false));
        }
    }

    // ── foreign windows ───────────────────────────────────────────────────

    /// Renders into an externally owned native window instead of creating one.
    ///
    /// `update_mask` is mandatory: the window system uses it to tell the owner
    /// which native events it needs. Must be called before allocation.
    pub fn set_foreign_window(
        &self,
        handle: RawWindowHandle,
        update_mask: Option<Box<ForeignMaskCallback>>,
    ) -> Result<()> {
        let Some(update_mask) = update_mask else {
            return Err(Error::ContractViolation(
                "foreign window requires an update-mask callback",
            ));
        };
        if self.is_allocated() {
            return Err(Error::ContractViolation(
                "foreign window must be set before allocation",
            ));
        }

        *self.inner.foreign.borrow_mut() = Some(ForeignWindow {
            handle,
            update_mask: RefCell::new(update_mask),
        });
        Ok(())
    }

    pub fn foreign_window(&self) -> Option<RawWindowHandle> {
        self.inner.foreign.borrow().as_ref().map(|f| f.handle)
    }

    /// Forwards the native event mask the winsys needs to the foreign window's
    /// owner. No-op for surfaces without a foreign window.
    pub fn update_foreign_event_mask(&self, mask: EventMask) {
        let foreign = self.inner.foreign.borrow();
        if let Some(foreign) = foreign.as_ref() {
            match foreign.update_mask.try_borrow_mut() {
                Ok(mut update) => (&mut **update)(self, mask),
                Err(_) => log::warn!("foreign update-mask callback re-entered; ignored"),
            }
        }
    }

    /// Native window handle: the foreign window if one is set, otherwise the
    /// window created by the backend.
    pub fn window_handle(&self) -> Option<RawWindowHandle> {
        if let Some(handle) = self.foreign_window() {
            return Some(handle);
        }
        self.with_backend(|backend| backend.window_handle()).flatten()
    }

    // ── callbacks ─────────────────────────────────────────────────────────

    pub fn add_frame_callback(
        &self,
        callback: impl FnMut(&Onscreen, FrameEvent, &FrameInfo) + 'static,
        destroy: Option<DestroyNotify>,
    ) -> ClosureHandle {
        self.inner.frame_closures.add(Box::new(callback), destroy)
    }

    pub fn remove_frame_callback(&self, handle: ClosureHandle) -> bool {
        self.inner.frame_closures.remove(handle)
    }

    pub fn add_resize_callback(
        &self,
        callback: impl FnMut(&Onscreen, i32, i32) + 'static,
        destroy: Option<DestroyNotify>,
    ) -> ClosureHandle {
        self.inner.resize_closures.add(Box::new(callback), destroy)
    }

    pub fn remove_resize_callback(&self, handle: ClosureHandle) -> bool {
        self.inner.resize_closures.remove(handle)
    }

    pub fn add_dirty_callback(
        &self,
        callback: impl FnMut(&Onscreen, Rect) + 'static,
        destroy: Option<DestroyNotify>,
    ) -> ClosureHandle {
        self.inner.dirty_closures.add(Box::new(callback), destroy)
    }

    pub fn remove_dirty_callback(&self, handle: ClosureHandle) -> bool {
        self.inner.dirty_closures.remove(handle)
    }

    // ── winsys entry points ───────────────────────────────────────────────

    /// Reports that `info` has been handed to the display.
    ///
    /// Used by window systems with [`WinsysFeatures::SYNC_AND_COMPLETE_EVENT`].
    pub fn notify_frame_sync(&self, info: &Rc<FrameInfo>) {
        self.queue_frame_event(FrameEvent::Sync, info);
    }

    /// Reports that `info` is on screen and retires it.
    ///
    /// Older frames still in flight are retired first, in order, with a
    /// warning: the platform skipped their completion. SYNC is queued ahead
    /// of COMPLETE for any frame whose SYNC was never reported.
    pub fn notify_complete(&self, info: &Rc<FrameInfo>) {
        let mut retired: Vec<Rc<FrameInfo>> = {
            let mut pending = self.inner.pending_frame_infos.borrow_mut();
            let position = pending.iter().position(|p| Rc::ptr_eq(p, info));
            let drained = match position {
                Some(index) => pending.drain(..=index).collect(),
                None => Vec::new(),
            };
            drained
        };

        match retired.len() {
            0 => {
                log::warn!(
                    "onscreen {:?}: completion for frame {} which is not in flight",
                    self.inner.id,
                    info.frame_counter()
                );
                retired.push(Rc::clone(info));
            }
            1 => {}
            n => log::warn!(
                "onscreen {:?}: platform skipped completion for {} frame(s) before frame {}",
                self.inner.id,
                n - 1,
                info.frame_counter()
            ),
        }

        for frame in &retired {
            if !frame.is_event_queued(FrameEvent::Sync) {
                self.queue_frame_event(FrameEvent::Sync, frame);
            }
            self.queue_frame_event(FrameEvent::Complete, frame);
        }
    }

    /// Records a new native size reported by the window system.
    ///
    /// The viewport is reset to the whole surface. Without
    /// [`WinsysFeatures::DIRTY_EVENTS`] the whole surface is queued as dirty.
    pub fn update_size(&self, width: i32, height: i32) {
        if !self.inner.framebuffer.set_size(width, height) {
            return;
        }
        log::debug!("onscreen {:?} resized to {width}x{height}", self.inner.id);

        if !self.has_feature(WinsysFeatures::DIRTY_EVENTS) {
            self.queue_full_dirty();
        }
    }

    /// Invokes resize callbacks with the current size.
    pub fn notify_resize(&self) {
        let (width, height) = self.size();
        self.inner
            .resize_closures
            .invoke(|callback| callback(self, width, height));
    }

    /// Queues `rect`, clipped to the surface, for delivery to dirty callbacks
    /// on the next dispatch. Regions entirely outside the surface are dropped.
    pub fn queue_dirty(&self, rect: Rect) {
        let (width, height) = self.size();
        match rect.intersect(Rect::from_size(width, height)) {
            Some(clipped) => self.inner.context.queue_dirty(self, clipped),
            None => log::trace!("onscreen {:?}: dirty {rect:?} outside surface", self.inner.id),
        }
    }

    pub fn queue_full_dirty(&self) {
        let (width, height) = self.size();
        self.queue_dirty(Rect::from_size(width, height));
    }

    // ── dispatch ──────────────────────────────────────────────────────────

    fn queue_frame_event(&self, event: FrameEvent, info: &Rc<FrameInfo>) {
        if !info.mark_queued(event) {
            log::warn!(
                "onscreen {:?}: {event:?} for frame {} reported twice; ignored",
                self.inner.id,
                info.frame_counter()
            );
            return;
        }
        self.inner.context.queue_event(self, info, event);
    }

    pub(crate) fn dispatch_frame_event(&self, event: FrameEvent, info: &FrameInfo) {
        self.inner
            .frame_closures
            .invoke(|callback| callback(self, event, info));
    }

    pub(crate) fn dispatch_dirty(&self, rect: Rect) {
        self.inner
            .dirty_closures
            .invoke(|callback| callback(self, rect));
    }
}

impl PartialEq for Onscreen {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Onscreen {}

impl fmt::Debug for Onscreen {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Onscreen")
            .field("id", &self.inner.id)
            .field("size", &self.size())
            .field("allocated", &self.is_allocated())
            .field("frame_counter", &self.frame_counter())
            .field("in_flight", &self.in_flight_frames())
            .finish()
    }
}

impl WeakOnscreen {
    pub fn upgrade(&self) -> Option<Onscreen> {
        self.inner.upgrade().map(|inner| Onscreen { inner })
    }
}

impl fmt::Debug for WeakOnscreen {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("WeakOnscreen")
    }
}

impl Drop for OnscreenInner {
    fn drop(&mut self) {
        self.resize_closures.disconnect_all();
        self.frame_closures.disconnect_all();
        self.dirty_closures.disconnect_all();

        self.pending_frame_infos.get_mut().clear();

        if let Some(mut backend) = self.backend.get_mut().take() {
            backend.deinit();
        }
        log::debug!("onscreen {:?} destroyed", self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{ContextConfig, Renderer};
    use crate::winsys::{CallLog, HeadlessWinsys, WinsysCall};
    use raw_window_handle::XlibWindowHandle;

    type Seen = Rc<RefCell<Vec<(FrameEvent, i64)>>>;

    struct Fixture {
        winsys: Rc<HeadlessWinsys>,
        log: CallLog,
        context: Context,
    }

    impl Fixture {
        fn new(features: WinsysFeatures) -> Self {
            Self::with_winsys(HeadlessWinsys::new(features))
        }

        fn with_winsys(winsys: HeadlessWinsys) -> Self {
            let winsys = Rc::new(winsys);
            let log = winsys.call_log();
            let context = Context::new(Renderer::new(winsys.clone()), ContextConfig::default());
            Self {
                winsys,
                log,
                context,
            }
        }

        fn onscreen(&self) -> Onscreen {
            Onscreen::new(&self.context, 640, 480)
        }

        fn dispatch(&self) {
            self.context.renderer().dispatch();
        }
    }

    fn record_frames(onscreen: &Onscreen) -> Seen {
        let seen: Seen = Rc::new(RefCell::new(Vec::new()));
        let s = Rc::clone(&seen);
        onscreen.add_frame_callback(
            move |_, event, info| s.borrow_mut().push((event, info.frame_counter())),
            None,
        );
        seen
    }

    fn foreign_handle(window: u64) -> RawWindowHandle {
        RawWindowHandle::Xlib(XlibWindowHandle::new(window as _))
    }

    // ── swapping ──────────────────────────────────────────────────────────

    #[test]
    fn first_swap_allocates_and_completes_on_dispatch() {
        let fx = Fixture::new(WinsysFeatures::empty());
        let onscreen = fx.onscreen();
        let seen = record_frames(&onscreen);

        assert!(!onscreen.is_allocated());
        onscreen.swap_buffers().unwrap();

        assert!(onscreen.is_allocated());
        assert_eq!(onscreen.frame_counter(), 1);
        assert_eq!(onscreen.in_flight_frames(), 0);
        // Nothing is delivered from inside the swap.
        assert!(seen.borrow().is_empty());
        assert_eq!(fx.context.pending_events(), 2);

        fx.dispatch();
        assert_eq!(
            *seen.borrow(),
            vec![(FrameEvent::Sync, 0), (FrameEvent::Complete, 0)]
        );
        assert!(!fx.context.is_dispatch_scheduled());
    }

    #[test]
    fn frame_counters_increase_per_swap() {
        let fx = Fixture::new(WinsysFeatures::empty());
        let onscreen = fx.onscreen();
        let seen = record_frames(&onscreen);

        for _ in 0..3 {
            onscreen.swap_buffers().unwrap();
            assert!(onscreen.in_flight_frames() <= 1);
        }
        fx.dispatch();

        let counters: Vec<i64> = seen.borrow().iter().map(|(_, c)| *c).collect();
        assert_eq!(counters, vec![0, 0, 1, 1, 2, 2]);
        assert_eq!(onscreen.frame_counter(), 3);
    }

    #[test]
    fn swap_from_callback_is_delivered_next_dispatch() {
        let fx = Fixture::new(WinsysFeatures::empty());
        let onscreen = fx.onscreen();
        let seen = record_frames(&onscreen);

        let redraws = Rc::new(Cell::new(0));
        let r = Rc::clone(&redraws);
        onscreen.add_frame_callback(
            move |o, event, _| {
                if event == FrameEvent::Complete && r.get() < 1 {
                    r.set(r.get() + 1);
                    o.swap_buffers().unwrap();
                }
            },
            None,
        );

        onscreen.swap_buffers().unwrap();
        fx.dispatch();
        assert_eq!(seen.borrow().len(), 2);
        assert_eq!(fx.context.pending_events(), 2);
        assert!(fx.context.is_dispatch_scheduled());

        fx.dispatch();
        assert_eq!(
            *seen.borrow(),
            vec![
                (FrameEvent::Sync, 0),
                (FrameEvent::Complete, 0),
                (FrameEvent::Sync, 1),
                (FrameEvent::Complete, 1),
            ]
        );
    }

    #[test]
    fn every_frame_callback_sees_every_event() {
        let fx = Fixture::new(WinsysFeatures::empty());
        let onscreen = fx.onscreen();
        let a = Rc::new(Cell::new(0));
        let b = Rc::new(Cell::new(0));
        for counter in [&a, &b] {
            let c = Rc::clone(counter);
            onscreen.add_frame_callback(move |_, _, _| c.set(c.get() + 1), None);
        }

        onscreen.swap_buffers().unwrap();
        fx.dispatch();
        assert_eq!((a.get(), b.get()), (2, 2));
    }

    #[test]
    fn removed_frame_callback_runs_destructor_and_stops() {
        let fx = Fixture::new(WinsysFeatures::empty());
        let onscreen = fx.onscreen();
        let calls = Rc::new(Cell::new(0));
        let destroyed = Rc::new(Cell::new(false));

        let c = Rc::clone(&calls);
        let d = Rc::clone(&destroyed);
        let handle = onscreen.add_frame_callback(
            move |_, _, _| c.set(c.get() + 1),
            Some(Box::new(move || d.set(true))),
        );

        assert!(onscreen.remove_frame_callback(handle));
        assert!(destroyed.get());
        assert!(!onscreen.remove_frame_callback(handle));

        onscreen.swap_buffers().unwrap();
        fx.dispatch();
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn swap_flushes_journal_and_discards() {
        let fx = Fixture::new(WinsysFeatures::empty());
        let onscreen = fx.onscreen();
        let red = Color::new(1.0, 0.0, 0.0, 1.0);

        onscreen.clear(red);
        assert!(onscreen.is_mid_scene());
        onscreen.swap_buffers_with_damage(&[Rect::new(0, 0, 10, 10)]).unwrap();
        assert!(!onscreen.is_mid_scene());

        let calls = fx.log.calls();
        assert!(matches!(calls[0], WinsysCall::Init { width: 640, height: 480, .. }));
        assert_eq!(
            calls[1..],
            [
                WinsysCall::Flush {
                    commands: vec![DrawCommand::Clear {
                        color: red,
                        buffers: BufferBits::COLOR,
                    }],
                },
                WinsysCall::SwapBuffers {
                    damage: vec![Rect::new(0, 0, 10, 10)],
                },
                WinsysCall::DiscardBuffers(BufferBits::all()),
            ]
        );
    }

    #[test]
    fn swap_region_requires_feature() {
        let fx = Fixture::new(WinsysFeatures::empty());
        let onscreen = fx.onscreen();

        let err = onscreen.swap_region(&[Rect::new(0, 0, 4, 4)]).unwrap_err();
        assert!(matches!(err, Error::Unsupported(_)));
        assert!(!onscreen.is_allocated());
        assert_eq!(onscreen.frame_counter(), 0);
        assert!(fx.log.calls().is_empty());
        assert_eq!(fx.context.pending_events(), 0);
    }

    #[test]
    fn swap_region_with_feature() {
        let fx = Fixture::new(WinsysFeatures::SWAP_REGION);
        let onscreen = fx.onscreen();
        let rects = [Rect::new(1, 2, 3, 4)];

        onscreen.swap_region(&rects).unwrap();
        assert_eq!(onscreen.frame_counter(), 1);
        assert_eq!(
            fx.log.count(|c| *c == WinsysCall::SwapRegion { rects: rects.to_vec() }),
            1
        );
    }

    #[test]
    fn swap_region_clips_to_surface() {
        let fx = Fixture::new(WinsysFeatures::SWAP_REGION);
        let onscreen = fx.onscreen();

        onscreen
            .swap_region(&[Rect::new(600, 460, 100, 100), Rect::new(700, 0, 10, 10)])
            .unwrap();
        assert_eq!(
            fx.log.count(|c| *c
                == WinsysCall::SwapRegion {
                    rects: vec![Rect::new(600, 460, 40, 20)]
                }),
            1
        );
    }

    #[test]
    fn buffer_age_needs_feature() {
        let fx = Fixture::new(WinsysFeatures::empty());
        let onscreen = fx.onscreen();
        onscreen.allocate().unwrap();
        fx.winsys.set_buffer_age(2);
        assert_eq!(onscreen.buffer_age(), 0);

        let fx = Fixture::new(WinsysFeatures::BUFFER_AGE);
        let onscreen = fx.onscreen();
        assert_eq!(onscreen.buffer_age(), 0);
        onscreen.allocate().unwrap();
        fx.winsys.set_buffer_age(2);
        assert_eq!(onscreen.buffer_age(), 2);
    }

    // ── platform-reported completion ──────────────────────────────────────

    #[test]
    fn async_frames_wait_for_platform() {
        let fx = Fixture::new(WinsysFeatures::SYNC_AND_COMPLETE_EVENT);
        let onscreen = fx.onscreen();
        let seen = record_frames(&onscreen);

        onscreen.swap_buffers().unwrap();
        onscreen.swap_buffers().unwrap();
        assert_eq!(onscreen.in_flight_frames(), 2);
        assert_eq!(fx.context.pending_events(), 0);

        let first = onscreen.oldest_pending_frame().unwrap();
        onscreen.notify_frame_sync(&first);
        onscreen.notify_frame_sync(&first);
        onscreen.notify_complete(&first);
        assert_eq!(onscreen.in_flight_frames(), 1);
        assert!(first.is_complete());

        fx.dispatch();
        assert_eq!(
            *seen.borrow(),
            vec![(FrameEvent::Sync, 0), (FrameEvent::Complete, 0)]
        );
    }

    #[test]
    fn skipped_completions_are_retired_in_order() {
        let fx = Fixture::new(WinsysFeatures::SYNC_AND_COMPLETE_EVENT);
        let onscreen = fx.onscreen();
        let seen = record_frames(&onscreen);

        for _ in 0..3 {
            onscreen.swap_buffers().unwrap();
        }
        let frames = onscreen.pending_frames();
        onscreen.notify_frame_sync(&frames[0]);
        onscreen.notify_complete(&frames[2]);
        assert_eq!(onscreen.in_flight_frames(), 0);

        fx.dispatch();
        assert_eq!(
            *seen.borrow(),
            vec![
                (FrameEvent::Sync, 0),
                (FrameEvent::Complete, 0),
                (FrameEvent::Sync, 1),
                (FrameEvent::Complete, 1),
                (FrameEvent::Sync, 2),
                (FrameEvent::Complete, 2),
            ]
        );
    }

    #[test]
    fn duplicate_completion_is_ignored() {
        let fx = Fixture::new(WinsysFeatures::SYNC_AND_COMPLETE_EVENT);
        let onscreen = fx.onscreen();
        let seen = record_frames(&onscreen);

        onscreen.swap_buffers().unwrap();
        let info = onscreen.oldest_pending_frame().unwrap();
        onscreen.notify_complete(&info);
        onscreen.notify_complete(&info);

        fx.dispatch();
        assert_eq!(seen.borrow().len(), 2);
    }

    #[test]
    fn inline_completion_fills_timing() {
        let fx = Fixture::with_winsys(
            HeadlessWinsys::new(WinsysFeatures::SYNC_AND_COMPLETE_EVENT).with_inline_completion(),
        );
        let onscreen = fx.onscreen();

        let timing = Rc::new(Cell::new(None));
        let t = Rc::clone(&timing);
        onscreen.add_frame_callback(
            move |_, event, info| {
                if event == FrameEvent::Complete {
                    t.set(Some((info.presentation_time(), info.refresh_rate())));
                }
            },
            None,
        );

        onscreen.swap_buffers().unwrap();
        assert_eq!(onscreen.in_flight_frames(), 0);
        assert_eq!(fx.context.pending_events(), 2);
        assert!(timing.get().is_none());

        fx.dispatch();
        assert_eq!(timing.get(), Some((Some(16_666_667), Some(60.0))));
    }

    // ── size and dirty regions ────────────────────────────────────────────

    #[test]
    fn resize_without_dirty_events_queues_full_rect() {
        let fx = Fixture::new(WinsysFeatures::empty());
        let onscreen = fx.onscreen();

        let dirty = Rc::new(RefCell::new(Vec::new()));
        let d = Rc::clone(&dirty);
        onscreen.add_dirty_callback(move |_, rect| d.borrow_mut().push(rect), None);

        let sizes = Rc::new(RefCell::new(Vec::new()));
        let s = Rc::clone(&sizes);
        onscreen.add_resize_callback(move |_, w, h| s.borrow_mut().push((w, h)), None);

        onscreen.update_size(200, 100);
        onscreen.update_size(200, 100);
        onscreen.notify_resize();
        assert_eq!(*sizes.borrow(), vec![(200, 100)]);
        assert_eq!(onscreen.viewport(), Viewport::full(200, 100));
        assert_eq!(fx.context.pending_dirty(), 1);

        fx.dispatch();
        assert_eq!(*dirty.borrow(), vec![Rect::new(0, 0, 200, 100)]);
    }

    #[test]
    fn resize_with_dirty_events_leaves_damage_to_platform() {
        let fx = Fixture::new(WinsysFeatures::DIRTY_EVENTS);
        let onscreen = fx.onscreen();

        onscreen.update_size(320, 240);
        assert_eq!(onscreen.size(), (320, 240));
        assert_eq!(fx.context.pending_dirty(), 0);

        onscreen.queue_dirty(Rect::new(5, 5, 10, 10));
        assert_eq!(fx.context.pending_dirty(), 1);
    }

    #[test]
    fn dirty_regions_are_clipped_to_surface() {
        let fx = Fixture::new(WinsysFeatures::DIRTY_EVENTS);
        let onscreen = fx.onscreen();
        let dirty = Rc::new(RefCell::new(Vec::new()));
        let d = Rc::clone(&dirty);
        onscreen.add_dirty_callback(move |_, rect| d.borrow_mut().push(rect), None);

        onscreen.queue_dirty(Rect::new(-20, 470, 50, 50));
        onscreen.queue_dirty(Rect::new(640, 0, 10, 10));
        assert_eq!(fx.context.pending_dirty(), 1);

        fx.dispatch();
        assert_eq!(*dirty.borrow(), vec![Rect::new(0, 470, 30, 10)]);
    }

    #[test]
    fn dirty_callback_can_redraw() {
        let fx = Fixture::new(WinsysFeatures::empty());
        let onscreen = fx.onscreen();
        let seen = record_frames(&onscreen);

        onscreen.add_dirty_callback(
            |o, _| {
                o.clear(Color::black());
                o.swap_buffers().unwrap();
            },
            None,
        );

        onscreen.queue_full_dirty();
        fx.dispatch();
        assert_eq!(onscreen.frame_counter(), 1);
        assert!(seen.borrow().is_empty());

        fx.dispatch();
        assert_eq!(seen.borrow().len(), 2);
    }

    // ── platform state ────────────────────────────────────────────────────

    #[test]
    fn set_resizable_reaches_backend_once() {
        let fx = Fixture::new(WinsysFeatures::RESIZABLE);
        let onscreen = fx.onscreen();
        onscreen.allocate().unwrap();

        onscreen.set_resizable(true);
        onscreen.set_resizable(true);
        assert!(onscreen.resizable());
        assert_eq!(fx.log.count(|c| *c == WinsysCall::Resizable(true)), 1);
    }

    #[test]
    fn set_resizable_without_feature_is_local() {
        let fx = Fixture::new(WinsysFeatures::empty());
        let onscreen = fx.onscreen();
        onscreen.allocate().unwrap();

        onscreen.set_resizable(true);
        assert!(onscreen.resizable());
        assert_eq!(fx.log.count(|c| matches!(c, WinsysCall::Resizable(_))), 0);
    }

    #[test]
    fn swap_throttle_pushed_only_when_allocated() {
        let fx = Fixture::new(WinsysFeatures::empty());
        let onscreen = fx.onscreen();
        assert!(onscreen.swap_throttled());

        onscreen.set_swap_throttled(false);
        assert!(!onscreen.swap_throttled());
        assert!(fx.log.calls().is_empty());

        onscreen.allocate().unwrap();
        onscreen.set_swap_throttled(true);
        onscreen.set_swap_throttled(true);
        assert_eq!(fx.log.count(|c| *c == WinsysCall::SwapThrottled(true)), 1);
    }

    #[test]
    fn show_and_hide() {
        let fx = Fixture::new(WinsysFeatures::VISIBILITY);
        let onscreen = fx.onscreen();

        onscreen.show().unwrap();
        assert!(onscreen.is_allocated());
        assert!(onscreen.is_visible());
        onscreen.hide();
        assert!(!onscreen.is_visible());

        assert_eq!(
            fx.log.calls()[1..],
            [WinsysCall::Visibility(true), WinsysCall::Visibility(false)]
        );
    }

    #[test]
    fn visibility_without_feature_is_local() {
        let fx = Fixture::new(WinsysFeatures::empty());
        let onscreen = fx.onscreen();

        onscreen.show().unwrap();
        assert!(onscreen.is_allocated());
        assert!(onscreen.is_visible());
        onscreen.hide();
        assert!(!onscreen.is_visible());

        assert_eq!(fx.log.count(|c| matches!(c, WinsysCall::Visibility(_))), 0);
        assert_eq!(fx.log.calls().len(), 1);
    }

    #[test]
    fn allocation_hands_config_to_winsys() {
        let fx = Fixture::new(WinsysFeatures::empty());
        let onscreen = fx.onscreen();
        onscreen.set_swap_throttled(false);
        onscreen.allocate().unwrap();

        let expected = OnscreenConfig {
            swap_throttled: false,
            ..OnscreenConfig::default()
        };
        assert!(matches!(
            fx.log.calls()[0],
            WinsysCall::Init { config, .. } if config == expected
        ));
    }

    #[test]
    fn allocation_failure_leaves_state_untouched() {
        let fx = Fixture::new(WinsysFeatures::VISIBILITY);
        fx.winsys.set_init_error(Some("no display"));
        let onscreen = fx.onscreen();

        assert!(matches!(onscreen.show(), Err(Error::Allocation(_))));
        assert!(!onscreen.is_visible());
        assert!(matches!(onscreen.swap_buffers(), Err(Error::Allocation(_))));
        assert_eq!(onscreen.frame_counter(), 0);
        assert!(!onscreen.is_allocated());

        fx.winsys.set_init_error(None);
        onscreen.show().unwrap();
        assert!(onscreen.is_visible());
    }

    // ── foreign windows ───────────────────────────────────────────────────

    #[test]
    fn foreign_window_requires_mask_callback() {
        let fx = Fixture::new(WinsysFeatures::empty());
        let onscreen = fx.onscreen();

        let err = onscreen.set_foreign_window(foreign_handle(7), None).unwrap_err();
        assert!(matches!(err, Error::ContractViolation(_)));
        assert!(onscreen.foreign_window().is_none());
    }

    #[test]
    fn foreign_window_after_allocation_is_rejected() {
        let fx = Fixture::new(WinsysFeatures::empty());
        let onscreen = fx.onscreen();
        onscreen.allocate().unwrap();

        let err = onscreen
            .set_foreign_window(foreign_handle(7), Some(Box::new(|_, _| {})))
            .unwrap_err();
        assert!(matches!(err, Error::ContractViolation(_)));
    }

    #[test]
    fn foreign_window_receives_event_mask() {
        let fx = Fixture::new(WinsysFeatures::empty());
        let onscreen = fx.onscreen();

        let mask = Rc::new(Cell::new(EventMask::empty()));
        let m = Rc::clone(&mask);
        onscreen
            .set_foreign_window(foreign_handle(42), Some(Box::new(move |_, em| m.set(em))))
            .unwrap();
        assert_eq!(onscreen.window_handle(), Some(foreign_handle(42)));

        onscreen.allocate().unwrap();
        assert_eq!(mask.get(), EventMask::EXPOSURE | EventMask::STRUCTURE_NOTIFY);
    }

    // ── backend re-entry ──────────────────────────────────────────────────

    /// Reports a new size from inside every swap, like a compositor that
    /// delivers a configure event while presenting.
    struct ResizingWinsys {
        resizable_pushes: Rc<Cell<u32>>,
    }

    struct ResizingOnscreen {
        onscreen: WeakOnscreen,
        resizable_pushes: Rc<Cell<u32>>,
    }

    impl crate::winsys::Winsys for ResizingWinsys {
        fn name(&self) -> &'static str {
            "resizing"
        }

        fn features(&self) -> WinsysFeatures {
            WinsysFeatures::RESIZABLE | WinsysFeatures::BUFFER_AGE
        }

        fn onscreen_init(&self, onscreen: &Onscreen) -> Result<Box<dyn OnscreenBackend>> {
            Ok(Box::new(ResizingOnscreen {
                onscreen: onscreen.downgrade(),
                resizable_pushes: Rc::clone(&self.resizable_pushes),
            }))
        }
    }

    impl OnscreenBackend for ResizingOnscreen {
        fn swap_buffers_with_damage(&mut self, _damage: &[Rect]) {
            if let Some(onscreen) = self.onscreen.upgrade() {
                onscreen.update_size(200, 100);
                onscreen.notify_resize();
            }
        }

        fn buffer_age(&self) -> u32 {
            3
        }

        fn update_swap_throttled(&mut self, _throttled: bool) {}

        fn set_resizable(&mut self, _resizable: bool) {
            self.resizable_pushes.set(self.resizable_pushes.get() + 1);
        }
    }

    #[test]
    fn backend_may_call_back_into_onscreen_during_swap() {
        let pushes = Rc::new(Cell::new(0));
        let winsys = Rc::new(ResizingWinsys {
            resizable_pushes: Rc::clone(&pushes),
        });
        let context = Context::new(Renderer::new(winsys), ContextConfig::default());
        let onscreen = Onscreen::new(&context, 640, 480);

        let nested = Rc::new(RefCell::new(Vec::new()));
        let n = Rc::clone(&nested);
        onscreen.add_resize_callback(
            move |o, w, h| {
                let age = o.buffer_age();
                o.set_resizable(true);
                let swap = o.swap_buffers();
                n.borrow_mut().push((
                    (w, h),
                    age,
                    o.is_allocated(),
                    matches!(swap, Err(Error::ContractViolation(_))),
                ));
            },
            None,
        );

        onscreen.swap_buffers().unwrap();
        assert_eq!(onscreen.size(), (200, 100));
        assert_eq!(*nested.borrow(), vec![((200, 100), 0, true, true)]);
        assert!(onscreen.resizable());
        assert_eq!(pushes.get(), 1);
        assert_eq!(onscreen.frame_counter(), 1);

        onscreen.swap_buffers().unwrap();
        assert_eq!(onscreen.frame_counter(), 2);
        assert_eq!(onscreen.buffer_age(), 3);
        assert_eq!(pushes.get(), 1);

        context.teardown();
    }

    // ── teardown ──────────────────────────────────────────────────────────

    #[test]
    fn drop_deinits_backend_and_runs_destructors() {
        let fx = Fixture::new(WinsysFeatures::empty());
        let onscreen = fx.onscreen();
        let destroyed = Rc::new(Cell::new(0));
        let d = Rc::clone(&destroyed);
        onscreen.add_resize_callback(|_, _, _| {}, Some(Box::new(move || d.set(d.get() + 1))));

        onscreen.swap_buffers().unwrap();
        fx.dispatch();
        drop(onscreen);

        assert_eq!(destroyed.get(), 1);
        assert_eq!(fx.log.calls().last(), Some(&WinsysCall::Deinit));
    }

    #[test]
    fn queued_events_keep_onscreen_alive_until_teardown() {
        let fx = Fixture::new(WinsysFeatures::empty());
        let onscreen = fx.onscreen();
        let seen = record_frames(&onscreen);

        onscreen.swap_buffers().unwrap();
        let weak = onscreen.downgrade();
        drop(onscreen);
        assert!(weak.upgrade().is_some());
        assert_eq!(fx.log.count(|c| *c == WinsysCall::Deinit), 0);

        fx.context.teardown();
        assert!(weak.upgrade().is_none());
        assert_eq!(fx.log.count(|c| *c == WinsysCall::Deinit), 1);
        assert!(seen.borrow().is_empty());
        assert!(!fx.context.is_dispatch_scheduled());
    }
}
