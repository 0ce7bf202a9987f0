use std::fmt;
use std::rc::Rc;

use crate::poll::Poll;
use crate::winsys::Winsys;

/// Binds a window system to the poll registry the host loop drives.
///
/// Cloning is cheap; all clones share the same winsys and poll.
#[derive(Clone)]
pub struct Renderer {
    inner: Rc<RendererInner>,
}

struct RendererInner {
    winsys: Rc<dyn Winsys>,
    poll: Poll,
}

impl Renderer {
    pub fn new(winsys: Rc<dyn Winsys>) -> Self {
        Self {
            inner: Rc::new(RendererInner {
                winsys,
                poll: Poll::new(),
            }),
        }
    }

    pub fn winsys(&self) -> &dyn Winsys {
        self.inner.winsys.as_ref()
    }

    pub fn poll(&self) -> &Poll {
        &self.inner.poll
    }

    /// Runs one iteration of deferred work. Call once per host loop turn.
    pub fn dispatch(&self) {
        self.inner.poll.dispatch();
    }

    /// Returns `true` if the host loop should poll rather than block.
    pub fn has_pending_idle(&self) -> bool {
        self.inner.poll.has_pending_idle()
    }
}

impl fmt::Debug for Renderer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Renderer")
            .field("winsys", &self.inner.winsys.name())
            .field("poll", &self.inner.poll)
            .finish()
    }
}
