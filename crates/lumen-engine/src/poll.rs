//! Idle-callback integration with an externally owned event loop.
//!
//! The engine never runs its own loop. The embedder calls
//! [`Poll::dispatch`] (usually through [`crate::Renderer::dispatch`]) once per
//! loop iteration, and asks [`Poll::has_pending_idle`] whether the next
//! iteration may block.

use crate::closure::{ClosureHandle, ClosureList};

/// Registry of deferred callbacks run once per loop iteration.
///
/// Idle closures stay registered until removed; a closure usually removes
/// itself once its work is done. Closures registered during a dispatch first
/// run on the following dispatch.
#[derive(Debug, Default)]
pub struct Poll {
    idle: ClosureList<dyn FnMut()>,
}

impl Poll {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_idle(&self, callback: impl FnMut() + 'static) -> ClosureHandle {
        self.idle.add(Box::new(callback), None)
    }

    pub fn remove_idle(&self, handle: ClosureHandle) -> bool {
        self.idle.remove(handle)
    }

    /// Returns `true` if the host loop should not block before the next dispatch.
    pub fn has_pending_idle(&self) -> bool {
        !self.idle.is_empty()
    }

    /// Runs every registered idle closure once.
    pub fn dispatch(&self) {
        self.idle.invoke(|callback| callback());
    }
}
