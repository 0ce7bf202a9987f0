use std::cell::{Cell, RefCell};

use crate::coords::{Color, Viewport};
use crate::winsys::BufferBits;

/// Rendering command buffered until the next swap flushes it to the backend.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum DrawCommand {
    Clear { color: Color, buffers: BufferBits },
}

/// Size, viewport and command journal of an onscreen framebuffer.
#[derive(Debug)]
pub(super) struct Framebuffer {
    width: Cell<i32>,
    height: Cell<i32>,
    viewport: Cell<Viewport>,
    journal: RefCell<Vec<DrawCommand>>,
    mid_scene: Cell<bool>,
}

impl Framebuffer {
    pub(super) fn new(width: i32, height: i32) -> Self {
        Self {
            width: Cell::new(width),
            height: Cell::new(height),
            viewport: Cell::new(Viewport::full(width, height)),
            journal: RefCell::new(Vec::new()),
            mid_scene: Cell::new(false),
        }
    }

    pub(super) fn size(&self) -> (i32, i32) {
        (self.width.get(), self.height.get())
    }

    /// Records a new size. Returns `false` if the size is unchanged.
    pub(super) fn set_size(&self, width: i32, height: i32) -> bool {
        if self.size() == (width, height) {
            return false;
        }
        self.width.set(width);
        self.height.set(height);
        self.viewport.set(Viewport::full(width, height));
        true
    }

    pub(super) fn viewport(&self) -> Viewport {
        self.viewport.get()
    }

    pub(super) fn set_viewport(&self, viewport: Viewport) {
        self.viewport.set(viewport);
    }

    pub(super) fn record(&self, command: DrawCommand) {
        self.journal.borrow_mut().push(command);
        self.mid_scene.set(true);
    }

    pub(super) fn take_journal(&self) -> Vec<DrawCommand> {
        std::mem::take(&mut *self.journal.borrow_mut())
    }

    pub(super) fn is_mid_scene(&self) -> bool {
        self.mid_scene.get()
    }

    pub(super) fn end_scene(&self) {
        self.mid_scene.set(false);
    }
}
