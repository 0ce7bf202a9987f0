use anyhow::{Context as _, Result};
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

use winit::application::ApplicationHandler;
use winit::dpi::{LogicalSize, PhysicalSize};
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowId};

use crate::context::{Context, ContextConfig, Renderer};
use crate::core::{App, AppControl};
use crate::onscreen::Onscreen;
use crate::winsys::{WgpuConfig, WgpuWinsys};

/// Window configuration.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub title: String,
    pub initial_size: LogicalSize<f64>,
    pub resizable: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            title: "lumen".to_string(),
            initial_size: LogicalSize::new(1280.0, 720.0),
            resizable: true,
        }
    }
}

/// Entry point for the runtime.
pub struct Runtime;

impl Runtime {
    /// Opens one window and runs the event loop until every window is closed
    /// or the application asks to exit.
    pub fn run<A>(
        initial: RuntimeConfig,
        wgpu_config: WgpuConfig,
        context_config: ContextConfig,
        app: A,
    ) -> Result<()>
    where
        A: 'static + App,
    {
        let event_loop = EventLoop::new().context("failed to create winit EventLoop")?;

        let winsys = Rc::new(WgpuWinsys::new(wgpu_config));
        let renderer = Renderer::new(winsys.clone());
        let context = Context::new(renderer, context_config);

        let mut state = AppState::new(initial, winsys, context, app);

        let result = event_loop
            .run_app(&mut state)
            .context("winit event loop terminated with error");

        state.shutdown();
        result
    }
}

struct WindowEntry {
    window: Arc<Window>,
    onscreen: Onscreen,
}

struct AppState<A>
where
    A: App + 'static,
{
    initial: RuntimeConfig,
    winsys: Rc<WgpuWinsys>,
    context: Context,
    app: A,

    windows: HashMap<WindowId, WindowEntry>,
    exit_requested: bool,
}

impl<A> AppState<A>
where
    A: App + 'static,
{
    fn new(initial: RuntimeConfig, winsys: Rc<WgpuWinsys>, context: Context, app: A) -> Self {
        Self {
            initial,
            winsys,
            context,
            app,
            windows: HashMap::new(),
            exit_requested: false,
        }
    }

    fn request_exit(&mut self, event_loop: &ActiveEventLoop) {
        self.exit_requested = true;
        event_loop.exit();
    }

    fn create_window_entry(
        &mut self,
        event_loop: &ActiveEventLoop,
        config: RuntimeConfig,
    ) -> Result<WindowId> {
        // Hidden until the onscreen is allocated; `show` maps it.
        let attrs = Window::default_attributes()
            .with_title(config.title)
            .with_inner_size(config.initial_size)
            .with_resizable(config.resizable)
            .with_visible(false);

        let window = Arc::new(
            event_loop
                .create_window(attrs)
                .context("failed to create window")?,
        );

        let (width, height) = to_extent(window.inner_size());
        let onscreen = Onscreen::new(&self.context, width, height);
        self.winsys.bind_window(&onscreen, Arc::clone(&window));
        onscreen.set_resizable(config.resizable);

        self.app
            .on_surface_created(&onscreen)
            .context("application failed to set up onscreen")?;
        onscreen.show().context("failed to allocate onscreen")?;
        window.request_redraw();

        let id = window.id();
        self.windows.insert(id, WindowEntry { window, onscreen });
        Ok(id)
    }

    fn destroy_window_entry(&mut self, id: WindowId) {
        if let Some(entry) = self.windows.remove(&id) {
            entry.onscreen.hide();
            // Queued events would keep the onscreen, and so the window, alive.
            self.context.discard_onscreen_events(&entry.onscreen);
            self.winsys.unbind_window(&entry.onscreen);
            log::debug!("window {id:?} closed (onscreen {:?})", entry.onscreen.id());
        }
    }

    fn resize(&mut self, id: WindowId, size: PhysicalSize<u32>) {
        if let Some(entry) = self.windows.get(&id) {
            let (width, height) = to_extent(size);
            entry.onscreen.update_size(width, height);
            entry.onscreen.notify_resize();
            entry.window.request_redraw();
        }
    }

    /// Releases every window and the context's queued events.
    fn shutdown(&mut self) {
        self.windows.clear();
        self.context.teardown();
    }
}

impl<A> ApplicationHandler for AppState<A>
where
    A: App + 'static,
{
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if !self.windows.is_empty() {
            return;
        }

        if let Err(e) = self.create_window_entry(event_loop, self.initial.clone()) {
            log::error!("failed to create initial window: {e:#}");
            self.request_exit(event_loop);
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.exit_requested {
            event_loop.exit();
            return;
        }

        let renderer = self.context.renderer();
        renderer.dispatch();

        // Keep spinning while deferred work remains, e.g. events queued by
        // closures that ran in this dispatch.
        if renderer.has_pending_idle() {
            event_loop.set_control_flow(ControlFlow::Poll);
        } else {
            event_loop.set_control_flow(ControlFlow::Wait);
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        if self.exit_requested {
            event_loop.exit();
            return;
        }

        let Some(entry) = self.windows.get(&window_id) else {
            return;
        };

        if self.app.on_window_event(&entry.onscreen, &event) == AppControl::Exit {
            self.request_exit(event_loop);
            return;
        }

        match event {
            WindowEvent::CloseRequested => {
                self.destroy_window_entry(window_id);
                if self.windows.is_empty() {
                    self.request_exit(event_loop);
                }
            }

            WindowEvent::Resized(new_size) => self.resize(window_id, new_size),

            WindowEvent::ScaleFactorChanged { .. } => {
                let new_size = entry.window.inner_size();
                self.resize(window_id, new_size);
            }

            WindowEvent::RedrawRequested => entry.onscreen.queue_full_dirty(),

            _ => {}
        }
    }
}

fn to_extent(size: PhysicalSize<u32>) -> (i32, i32) {
    (
        i32::try_from(size.width).unwrap_or(i32::MAX),
        i32::try_from(size.height).unwrap_or(i32::MAX),
    )
}
