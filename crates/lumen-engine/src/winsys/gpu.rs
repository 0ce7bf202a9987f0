//! wgpu + winit window system.
//!
//! Each onscreen renders into a winit window bound to it with
//! [`WgpuWinsys::bind_window`] before allocation. The adapter, device and
//! queue are created lazily on the first allocation and shared by every
//! onscreen of the winsys.
//!
//! The onscreen's `samples_per_pixel` selects a multisampled color target
//! resolved into the surface texture, and `need_stencil` adds a
//! depth-stencil attachment; both are recreated with the surface.
//!
//! wgpu exposes no presentation feedback, so SYNC/COMPLETE are synthesized
//! by the core. Dirty regions come from winit redraw requests, which the host
//! loop forwards with [`Onscreen::queue_full_dirty`].

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use raw_window_handle::{HasWindowHandle, RawWindowHandle};
use wgpu::SurfaceError;
use winit::window::Window;

use crate::coords::{Color, Rect};
use crate::error::{Error, Result};
use crate::onscreen::{DrawCommand, Onscreen, OnscreenId, WeakOnscreen};

use super::{BufferBits, OnscreenBackend, Winsys, WinsysFeatures};

/// Initialization parameters for the wgpu window system.
///
/// Keep this structure stable and minimal. Add configuration flags only when a
/// concrete platform or backend requirement exists.
#[derive(Debug, Clone)]
pub struct WgpuConfig {
    /// Prefer an sRGB surface format when available.
    pub prefer_srgb: bool,

    /// Optional alpha mode preference for the surface.
    ///
    /// If provided but unsupported on the current surface, a supported mode is selected.
    pub alpha_mode: Option<wgpu::CompositeAlphaMode>,

    pub power_preference: wgpu::PowerPreference,

    /// Desired maximum frame latency for the surface.
    ///
    /// This value is a hint; support depends on platform/backend.
    pub desired_maximum_frame_latency: u32,
}

impl Default for WgpuConfig {
    fn default() -> Self {
        Self {
            prefer_srgb: true,
            alpha_mode: None,
            power_preference: wgpu::PowerPreference::HighPerformance,
            desired_maximum_frame_latency: 2,
        }
    }
}

const DEPTH_STENCIL_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth24PlusStencil8;

/// Adapter/device/queue shared by all onscreens of one winsys.
struct GpuShared {
    adapter: wgpu::Adapter,
    device: wgpu::Device,
    queue: wgpu::Queue,
}

pub struct WgpuWinsys {
    config: WgpuConfig,
    instance: wgpu::Instance,
    shared: RefCell<Option<Rc<GpuShared>>>,

    /// Windows bound to onscreens that are not allocated yet. Entries whose
    /// onscreen was dropped unallocated are pruned on the next bind.
    windows: RefCell<HashMap<OnscreenId, (WeakOnscreen, Arc<Window>)>>,
}

impl WgpuWinsys {
    pub fn new(config: WgpuConfig) -> Self {
        // Use all backends to allow wgpu to select the optimal platform backend.
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        Self {
            config,
            instance,
            shared: RefCell::new(None),
            windows: RefCell::new(HashMap::new()),
        }
    }

    /// Binds the native window `onscreen` will render into once allocated.
    pub fn bind_window(&self, onscreen: &Onscreen, window: Arc<Window>) {
        let mut windows = self.windows.borrow_mut();
        prune_unbound(&mut windows);
        windows.insert(onscreen.id(), (onscreen.downgrade(), window));
    }

    /// Releases the window bound to `onscreen` if it was never allocated.
    /// Returns `false` if no window was waiting for it.
    pub fn unbind_window(&self, onscreen: &Onscreen) -> bool {
        self.windows.borrow_mut().remove(&onscreen.id()).is_some()
    }

    fn shared_for(&self, surface: &wgpu::Surface<'_>) -> Result<Rc<GpuShared>> {
        if let Some(shared) = self.shared.borrow().as_ref() {
            return Ok(Rc::clone(shared));
        }

        let adapter = pollster::block_on(self.instance.request_adapter(
            &wgpu::RequestAdapterOptions {
                power_preference: self.config.power_preference,
                compatible_surface: Some(surface),
                force_fallback_adapter: false,
            },
        ))
        .map_err(|e| Error::Gpu(format!("failed to find a suitable GPU adapter: {e}")))?;

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("lumen-engine device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            experimental_features: wgpu::ExperimentalFeatures::disabled(),
            memory_hints: wgpu::MemoryHints::Performance,
            trace: wgpu::Trace::Off,
        }))
        .map_err(|e| Error::Gpu(format!("failed to create wgpu device/queue: {e}")))?;

        log::info!("wgpu adapter: {:?}", adapter.get_info().name);

        let shared = Rc::new(GpuShared {
            adapter,
            device,
            queue,
        });
        *self.shared.borrow_mut() = Some(Rc::clone(&shared));
        Ok(shared)
    }
}

impl Winsys for WgpuWinsys {
    fn name(&self) -> &'static str {
        "wgpu"
    }

    fn features(&self) -> WinsysFeatures {
        WinsysFeatures::DIRTY_EVENTS | WinsysFeatures::VISIBILITY | WinsysFeatures::RESIZABLE
    }

    fn onscreen_init(&self, onscreen: &Onscreen) -> Result<Box<dyn OnscreenBackend>> {
        let (_, window) = self
            .windows
            .borrow_mut()
            .remove(&onscreen.id())
            .ok_or_else(|| Error::Allocation("no native window bound to onscreen".to_string()))?;

        // Surface lifetime is tied to the window through the `Arc`.
        let surface = self
            .instance
            .create_surface(Arc::clone(&window))
            .map_err(|e| Error::Allocation(format!("failed to create wgpu surface: {e}")))?;

        let shared = self.shared_for(&surface)?;

        let caps = surface.get_capabilities(&shared.adapter);
        let format = choose_surface_format(&caps, self.config.prefer_srgb)
            .ok_or_else(|| Error::Allocation("no supported surface formats".to_string()))?;
        let alpha_mode = choose_alpha_mode(&caps, self.config.alpha_mode);

        let (width, height) = onscreen.size();
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: clamp_extent(width),
            height: clamp_extent(height),
            present_mode: present_mode(onscreen.swap_throttled()),
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: self.config.desired_maximum_frame_latency,
        };
        surface.configure(&shared.device, &config);

        window.set_resizable(onscreen.resizable());

        let requested = onscreen.config();
        let need_stencil = requested.need_stencil;
        let sample_count = effective_sample_count(requested.samples_per_pixel, |count| {
            let supports = |format| {
                shared
                    .adapter
                    .get_texture_format_features(format)
                    .flags
                    .sample_count_supported(count)
            };
            supports(format) && (!need_stencil || supports(DEPTH_STENCIL_FORMAT))
        });
        log::debug!(
            "onscreen {:?}: {format:?}, {sample_count}x samples, stencil: {need_stencil}",
            onscreen.id()
        );

        let attachments = Attachments::new(&shared.device, &config, sample_count, need_stencil);

        Ok(Box::new(WgpuOnscreen {
            onscreen: onscreen.downgrade(),
            window,
            surface,
            shared,
            config,
            sample_count,
            need_stencil,
            attachments,
            clear_color: Color::black(),
        }))
    }
}

impl fmt::Debug for WgpuWinsys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WgpuWinsys")
            .field("config", &self.config)
            .field("device_created", &self.shared.borrow().is_some())
            .field("unallocated_windows", &self.windows.borrow().len())
            .finish()
    }
}

/// Render targets that live beside the surface texture and follow its size.
struct Attachments {
    /// Multisampled color target resolved into the surface texture.
    msaa: Option<wgpu::TextureView>,
    depth_stencil: Option<wgpu::TextureView>,
}

impl Attachments {
    fn new(
        device: &wgpu::Device,
        config: &wgpu::SurfaceConfiguration,
        sample_count: u32,
        need_stencil: bool,
    ) -> Self {
        let target = |label, format| {
            device
                .create_texture(&wgpu::TextureDescriptor {
                    label: Some(label),
                    size: wgpu::Extent3d {
                        width: config.width,
                        height: config.height,
                        depth_or_array_layers: 1,
                    },
                    mip_level_count: 1,
                    sample_count,
                    dimension: wgpu::TextureDimension::D2,
                    format,
                    usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
                    view_formats: &[],
                })
                .create_view(&wgpu::TextureViewDescriptor::default())
        };

        Self {
            msaa: (sample_count > 1).then(|| target("lumen msaa color", config.format)),
            depth_stencil: need_stencil
                .then(|| target("lumen depth-stencil", DEPTH_STENCIL_FORMAT)),
        }
    }
}

struct WgpuOnscreen {
    onscreen: WeakOnscreen,
    window: Arc<Window>,
    surface: wgpu::Surface<'static>,
    shared: Rc<GpuShared>,
    config: wgpu::SurfaceConfiguration,
    sample_count: u32,
    need_stencil: bool,
    attachments: Attachments,
    clear_color: Color,
}

impl WgpuOnscreen {
    fn reconfigure(&mut self) {
        if self.config.width > 0 && self.config.height > 0 {
            self.surface.configure(&self.shared.device, &self.config);
            self.attachments = Attachments::new(
                &self.shared.device,
                &self.config,
                self.sample_count,
                self.need_stencil,
            );
        }
    }

    /// Picks up a size change reported to the onscreen since the last swap.
    fn sync_size(&mut self) {
        let Some(onscreen) = self.onscreen.upgrade() else {
            return;
        };
        let (width, height) = onscreen.size();
        if width <= 0 || height <= 0 {
            return;
        }

        let (width, height) = (clamp_extent(width), clamp_extent(height));
        if (self.config.width, self.config.height) != (width, height) {
            self.config.width = width;
            self.config.height = height;
            self.reconfigure();
        }
    }

    fn present(&mut self) {
        self.sync_size();

        let surface_texture = match self.surface.get_current_texture() {
            Ok(texture) => texture,
            Err(err) => {
                self.handle_surface_error(err);
                return;
            }
        };

        let view = surface_texture
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = self
            .shared
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("lumen frame encoder"),
            });

        {
            let clear = self.clear_color;
            let (target, resolve_target) = match &self.attachments.msaa {
                Some(msaa) => (msaa, Some(&view)),
                None => (&view, None),
            };
            let depth_stencil_attachment =
                self.attachments
                    .depth_stencil
                    .as_ref()
                    .map(|depth| wgpu::RenderPassDepthStencilAttachment {
                        view: depth,
                        depth_ops: Some(wgpu::Operations {
                            load: wgpu::LoadOp::Clear(1.0),
                            store: wgpu::StoreOp::Discard,
                        }),
                        stencil_ops: Some(wgpu::Operations {
                            load: wgpu::LoadOp::Clear(0),
                            store: wgpu::StoreOp::Discard,
                        }),
                    });

            let _rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("lumen clear"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: target,
                    resolve_target,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color {
                            r: clear.r as f64,
                            g: clear.g as f64,
                            b: clear.b as f64,
                            a: clear.a as f64,
                        }),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment,
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });
        }

        self.shared.queue.submit(std::iter::once(encoder.finish()));
        self.window.pre_present_notify();
        surface_texture.present();
    }

    fn handle_surface_error(&mut self, err: SurfaceError) {
        match err {
            SurfaceError::Lost | SurfaceError::Outdated => {
                log::debug!("surface {err:?}; reconfiguring");
                self.reconfigure();
            }
            SurfaceError::OutOfMemory => log::error!("surface out of memory; frame dropped"),
            SurfaceError::Timeout | SurfaceError::Other => {
                log::warn!("surface error {err:?}; frame skipped");
            }
        }
    }
}

impl OnscreenBackend for WgpuOnscreen {
    fn flush(&mut self, commands: &[DrawCommand]) {
        for command in commands {
            match *command {
                DrawCommand::Clear { color, buffers } => {
                    if buffers.contains(BufferBits::COLOR) {
                        self.clear_color = color;
                    }
                }
            }
        }
    }

    // wgpu cannot present partial damage; the whole surface is presented.
    fn swap_buffers_with_damage(&mut self, _damage: &[Rect]) {
        self.present();
    }

    fn update_swap_throttled(&mut self, throttled: bool) {
        self.config.present_mode = present_mode(throttled);
        self.reconfigure();
    }

    fn set_visibility(&mut self, visible: bool) {
        self.window.set_visible(visible);
    }

    fn set_resizable(&mut self, resizable: bool) {
        self.window.set_resizable(resizable);
    }

    fn window_handle(&self) -> Option<RawWindowHandle> {
        self.window
            .window_handle()
            .ok()
            .map(|handle| handle.as_raw())
    }
}

/// Sample count to render with: 1 when multisampling is off or `requested`
/// is not `supported` by the adapter.
fn effective_sample_count(requested: u32, supported: impl Fn(u32) -> bool) -> u32 {
    if requested <= 1 {
        return 1;
    }
    if supported(requested) {
        return requested;
    }
    log::warn!("{requested}x multisampling not supported; rendering single-sampled");
    1
}

fn prune_unbound<V>(windows: &mut HashMap<OnscreenId, (WeakOnscreen, V)>) {
    windows.retain(|id, (onscreen, _)| {
        let alive = onscreen.upgrade().is_some();
        if !alive {
            log::debug!("releasing window of dropped onscreen {id:?}");
        }
        alive
    });
}

fn present_mode(throttled: bool) -> wgpu::PresentMode {
    if throttled {
        wgpu::PresentMode::AutoVsync
    } else {
        wgpu::PresentMode::AutoNoVsync
    }
}

fn clamp_extent(value: i32) -> u32 {
    u32::try_from(value).unwrap_or(0).max(1)
}

fn choose_surface_format(
    caps: &wgpu::SurfaceCapabilities,
    prefer_srgb: bool,
) -> Option<wgpu::TextureFormat> {
    if prefer_srgb {
        let preferred = [
            wgpu::TextureFormat::Bgra8UnormSrgb,
            wgpu::TextureFormat::Rgba8UnormSrgb,
        ];
        if let Some(format) = preferred.into_iter().find(|f| caps.formats.contains(f)) {
            return Some(format);
        }
    }

    caps.formats.first().copied()
}

fn choose_alpha_mode(
    caps: &wgpu::SurfaceCapabilities,
    requested: Option<wgpu::CompositeAlphaMode>,
) -> wgpu::CompositeAlphaMode {
    requested
        .filter(|m| caps.alpha_modes.contains(m))
        .or_else(|| caps.alpha_modes.first().copied())
        .unwrap_or(wgpu::CompositeAlphaMode::Auto)
}
