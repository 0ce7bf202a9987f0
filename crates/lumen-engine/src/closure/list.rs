use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Destructor run exactly once when a closure is removed or disconnected.
///
/// State the callback needs is normally captured by the callback itself; the
/// destructor exists for owners that must observe the detach.
pub type DestroyNotify = Box<dyn FnOnce()>;

static NEXT_HANDLE: AtomicU64 = AtomicU64::new(1);

/// Opaque handle returned by [`ClosureList::add`].
///
/// Handles are unique across all lists, so removing a handle from the wrong
/// list is a harmless no-op.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ClosureHandle(u64);

impl ClosureHandle {
    fn next() -> Self {
        Self(NEXT_HANDLE.fetch_add(1, Ordering::Relaxed))
    }
}

struct Closure<F: ?Sized> {
    handle: ClosureHandle,
    live: Cell<bool>,
    destroy: Cell<Option<DestroyNotify>>,
    callback: RefCell<Box<F>>,
}

impl<F: ?Sized> Closure<F> {
    fn detach(&self) {
        self.live.set(false);
        if let Some(destroy) = self.destroy.take() {
            destroy();
        }
    }
}

/// Ordered list of callbacks with safe self-modification during invocation.
///
/// Invocation walks a snapshot of the list, so callbacks may add or remove
/// closures (including themselves) while it runs:
/// - a closure removed mid-pass is not invoked again in that pass
/// - a closure added mid-pass is first invoked on the next pass
pub struct ClosureList<F: ?Sized> {
    closures: RefCell<Vec<Rc<Closure<F>>>>,
}

impl<F: ?Sized> ClosureList<F> {
    pub fn new() -> Self {
        Self {
            closures: RefCell::new(Vec::new()),
        }
    }

    /// Appends a closure; it is invoked after every closure already present.
    pub fn add(&self, callback: Box<F>, destroy: Option<DestroyNotify>) -> ClosureHandle {
        let handle = ClosureHandle::next();
        self.closures.borrow_mut().push(Rc::new(Closure {
            handle,
            live: Cell::new(true),
            destroy: Cell::new(destroy),
            callback: RefCell::new(callback),
        }));
        handle
    }

    /// Detaches the closure identified by `handle` and runs its destructor.
    ///
    /// Returns `false` if the handle is not (or no longer) part of this list.
    pub fn remove(&self, handle: ClosureHandle) -> bool {
        let removed = {
            let mut closures = self.closures.borrow_mut();
            closures
                .iter()
                .position(|c| c.handle == handle)
                .map(|i| closures.remove(i))
        };

        // The list borrow is released first: destructors may touch the list.
        match removed {
            Some(closure) => {
                closure.detach();
                true
            }
            None => false,
        }
    }

    /// Calls `call` once per live closure, in registration order.
    pub fn invoke(&self, mut call: impl FnMut(&mut F)) {
        let snapshot: Vec<Rc<Closure<F>>> = self.closures.borrow().clone();

        for closure in snapshot {
            if !closure.live.get() {
                continue;
            }

            match closure.callback.try_borrow_mut() {
                Ok(mut callback) => call(&mut **callback),
                Err(_) => log::warn!("closure re-entered from its own invocation; skipped"),
            }
        }
    }

    /// Detaches every closure, running each destructor in registration order.
    pub fn disconnect_all(&self) {
        let drained = std::mem::take(&mut *self.closures.borrow_mut());
        for closure in drained {
            closure.detach();
        }
    }

    pub fn len(&self) -> usize {
        self.closures.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.closures.borrow().is_empty()
    }
}

impl<F: ?Sized> Default for ClosureList<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: ?Sized> Drop for ClosureList<F> {
    fn drop(&mut self) {
        self.disconnect_all();
    }
}

impl<F: ?Sized> fmt::Debug for ClosureList<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClosureList")
            .field("len", &self.len())
            .finish()
    }
}
