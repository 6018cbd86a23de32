use crate::config::{BackendKind, FOVY, MOTION_SPEED, ViewerConfig, WINDOW_SIZE};
use crate::state::{InputEvent, LoopState, UiFocus, ViewerState};
use anyhow::{Context, Result};
use egui::Context as EguiContext;
use glam::{Vec2, Vec3};
use rtobj_input::{ArcballCamera, CameraController, PointerButtons, PointerEvent};
use rtobj_render::{CpuRaycaster, RenderBackend, Scene};
use rtobj_render_wgpu::{DisplayBlit, GpuRaytracer};
use std::sync::Arc;
use std::time::Instant;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, KeyEvent, MouseButton, MouseScrollDelta, WindowEvent};
use winit::event_loop::ActiveEventLoop;
use winit::keyboard::PhysicalKey;
use winit::window::{Window, WindowId};

/// Pixel scroll deltas per wheel line.
const PIXELS_PER_LINE: f32 = 40.0;

/// Overlay shown on top of the frame.
struct Overlay {
    renderer: egui_wgpu::Renderer,
    state: egui_winit::State,
}

/// Window and GPU resources. Fields drop in declaration order, the reverse
/// of the order they were created in.
struct Graphics {
    overlay: Overlay,
    blit: DisplayBlit,
    backend: Box<dyn RenderBackend>,
    surface: wgpu::Surface<'static>,
    config: wgpu::SurfaceConfiguration,
    queue: Arc<wgpu::Queue>,
    device: Arc<wgpu::Device>,
    window: Arc<Window>,
}

/// Numbers shown in the debug panel.
struct PanelStats {
    average_ms: f64,
    fps: f64,
    render_ms: f64,
    backend: &'static str,
    samples: u32,
}

pub struct ViewerApp {
    graphics: Option<Graphics>,
    scene: Option<Scene>,
    state: ViewerState,
    config: ViewerConfig,
    egui_ctx: EguiContext,
    buttons: PointerButtons,
    last_frame: Instant,
    error: Option<anyhow::Error>,
}

impl ViewerApp {
    pub fn new(config: ViewerConfig, scene: Scene) -> Self {
        let mut controller = CameraController::new(
            ArcballCamera::new(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO, Vec3::Y),
            MOTION_SPEED,
            WINDOW_SIZE,
        );
        controller.frame_bounds(&scene.bounds());

        Self {
            graphics: None,
            scene: Some(scene),
            state: ViewerState::new(controller, FOVY),
            config,
            egui_ctx: EguiContext::default(),
            buttons: PointerButtons::default(),
            last_frame: Instant::now(),
            error: None,
        }
    }

    /// Error that stopped the loop, if any.
    pub fn into_result(self) -> Result<()> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, error: anyhow::Error) {
        tracing::error!("{error:#}");
        self.error = Some(error);
        event_loop.exit();
    }

    fn init_graphics(&mut self, event_loop: &ActiveEventLoop) -> Result<Graphics> {
        let attrs = Window::default_attributes()
            .with_title("rtobj")
            .with_inner_size(PhysicalSize::new(WINDOW_SIZE[0], WINDOW_SIZE[1]))
            .with_resizable(true);
        let window = Arc::new(
            event_loop
                .create_window(attrs)
                .context("failed to create window")?,
        );

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let surface = instance
            .create_surface(window.clone())
            .context("failed to create surface")?;

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))
        .context("no suitable GPU adapter")?;

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("rtobj_device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: Default::default(),
            },
            None,
        ))
        .context("failed to create GPU device")?;
        let device = Arc::new(device);
        let queue = Arc::new(queue);

        let size = window.inner_size();
        let (width, height) = (size.width.max(1), size.height.max(1));
        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .or(surface_caps.formats.first())
            .copied()
            .context("surface reports no formats")?;
        let alpha_mode = surface_caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width,
            height,
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        tracing::info!(
            "GPU initialized with {} backend ({})",
            adapter.get_info().backend.to_str(),
            adapter.get_info().name
        );

        let mut backend: Box<dyn RenderBackend> = match self.config.backend {
            BackendKind::Cpu => Box::new(CpuRaycaster::new(self.config.shading)),
            BackendKind::Gpu => Box::new(GpuRaytracer::new(
                device.clone(),
                queue.clone(),
                self.config.shading,
            )),
        };
        backend
            .initialize(width, height)
            .context("failed to initialize render backend")?;
        let scene = self
            .scene
            .take()
            .context("scene was already handed to a backend")?;
        backend
            .set_scene(scene)
            .context("failed to upload scene")?;
        tracing::info!(
            "{} backend rendering {} at {width}x{height}, {} shading",
            backend.name(),
            self.config.model.display(),
            self.config.shading.name()
        );

        let blit = DisplayBlit::new(&device, surface_format, width, height);

        let overlay = Overlay {
            renderer: egui_wgpu::Renderer::new(&device, surface_format, None, 1, false),
            state: egui_winit::State::new(
                self.egui_ctx.clone(),
                egui::ViewportId::ROOT,
                &window,
                Some(window.scale_factor() as f32),
                None,
                None,
            ),
        };

        self.state.resize(width, height);

        Ok(Graphics {
            overlay,
            blit,
            backend,
            surface,
            config,
            queue,
            device,
            window,
        })
    }

    /// Translate a window event into loop input, tracking button state.
    fn input_event(&mut self, event: &WindowEvent) -> Option<InputEvent> {
        match event {
            WindowEvent::CloseRequested => Some(InputEvent::CloseRequested),
            WindowEvent::Destroyed => Some(InputEvent::Quit),
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(key),
                        state,
                        ..
                    },
                ..
            } => Some(InputEvent::Key {
                key: *key,
                pressed: *state == ElementState::Pressed,
            }),
            WindowEvent::MouseInput { button, state, .. } => {
                let pressed = *state == ElementState::Pressed;
                match button {
                    MouseButton::Left => self.buttons.primary = pressed,
                    MouseButton::Right => self.buttons.secondary = pressed,
                    _ => {}
                }
                None
            }
            WindowEvent::CursorMoved { position, .. } => {
                Some(InputEvent::Pointer(PointerEvent::Motion {
                    position: Vec2::new(position.x as f32, position.y as f32),
                    buttons: self.buttons,
                }))
            }
            WindowEvent::CursorLeft { .. } => Some(InputEvent::Pointer(PointerEvent::Left)),
            WindowEvent::MouseWheel { delta, .. } => {
                let lines = match delta {
                    MouseScrollDelta::LineDelta(_, y) => *y,
                    MouseScrollDelta::PixelDelta(p) => p.y as f32 / PIXELS_PER_LINE,
                };
                Some(InputEvent::Pointer(PointerEvent::Scroll { delta: lines }))
            }
            _ => None,
        }
    }

    fn resize(&mut self, size: PhysicalSize<u32>) {
        let Some(gfx) = self.graphics.as_mut() else {
            return;
        };
        gfx.config.width = size.width.max(1);
        gfx.config.height = size.height.max(1);
        gfx.surface.configure(&gfx.device, &gfx.config);
        self.state.resize(gfx.config.width, gfx.config.height);
        tracing::debug!(
            width = gfx.config.width,
            height = gfx.config.height,
            "surface resized"
        );
    }

    fn redraw(&mut self) -> Result<()> {
        let Some(gfx) = self.graphics.as_mut() else {
            return Ok(());
        };

        let now = Instant::now();
        self.state.timer_mut().record(now - self.last_frame);
        self.last_frame = now;

        let (camera, camera_changed) = self.state.camera();
        let render_time = gfx
            .backend
            .render(&camera, camera_changed)
            .context("render failed")?;
        self.state.timer_mut().set_render_time(render_time);
        {
            let frame = gfx.backend.frame().context("frame unavailable")?;
            gfx.blit.upload(&gfx.queue, &frame);
        }

        let output = match gfx.surface.get_current_texture() {
            Ok(t) => t,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                gfx.surface.configure(&gfx.device, &gfx.config);
                return Ok(());
            }
            Err(e) => {
                tracing::error!("surface error: {e}");
                return Ok(());
            }
        };
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let timer = self.state.timer();
        let stats = PanelStats {
            average_ms: timer.average_ms(),
            fps: timer.fps(),
            render_ms: timer.render_time().as_secs_f64() * 1e3,
            backend: gfx.backend.name(),
            samples: gfx.backend.stats().frame_index,
        };

        let raw_input = gfx.overlay.state.take_egui_input(&gfx.window);
        let full_output = self.egui_ctx.run(raw_input, |ctx| draw_debug_panel(ctx, &stats));
        gfx.overlay
            .state
            .handle_platform_output(&gfx.window, full_output.platform_output);
        let paint_jobs = self
            .egui_ctx
            .tessellate(full_output.shapes, full_output.pixels_per_point);
        let screen_descriptor = egui_wgpu::ScreenDescriptor {
            size_in_pixels: [gfx.config.width, gfx.config.height],
            pixels_per_point: full_output.pixels_per_point,
        };

        for (id, image_delta) in &full_output.textures_delta.set {
            gfx.overlay
                .renderer
                .update_texture(&gfx.device, &gfx.queue, *id, image_delta);
        }

        let mut encoder = gfx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("frame_encoder"),
            });
        gfx.blit.draw(&mut encoder, &view);
        gfx.overlay.renderer.update_buffers(
            &gfx.device,
            &gfx.queue,
            &mut encoder,
            &paint_jobs,
            &screen_descriptor,
        );
        {
            let mut pass = encoder
                .begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: Some("overlay_pass"),
                    color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                        view: &view,
                        resolve_target: None,
                        ops: wgpu::Operations {
                            load: wgpu::LoadOp::Load,
                            store: wgpu::StoreOp::Store,
                        },
                    })],
                    depth_stencil_attachment: None,
                    ..Default::default()
                })
                .forget_lifetime();
            gfx.overlay
                .renderer
                .render(&mut pass, &paint_jobs, &screen_descriptor);
        }
        gfx.queue.submit(std::iter::once(encoder.finish()));
        for id in &full_output.textures_delta.free {
            gfx.overlay.renderer.free_texture(id);
        }

        output.present();
        gfx.window.request_redraw();
        Ok(())
    }
}

fn draw_debug_panel(ctx: &EguiContext, stats: &PanelStats) {
    egui::Window::new("Debug Panel").show(ctx, |ui| {
        ui.label(format!(
            "Application average {:.3} ms/frame ({:.1} FPS)",
            stats.average_ms, stats.fps
        ));
        ui.label(format!(
            "Render: {:.3} ms ({} backend)",
            stats.render_ms, stats.backend
        ));
        ui.label(format!("Accumulated samples: {}", stats.samples));
    });
}

impl ApplicationHandler for ViewerApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.graphics.is_some() || self.error.is_some() {
            return;
        }
        match self.init_graphics(event_loop) {
            Ok(gfx) => {
                gfx.window.request_redraw();
                self.graphics = Some(gfx);
                self.last_frame = Instant::now();
            }
            Err(e) => self.fail(event_loop, e),
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        let focus = match self.graphics.as_mut() {
            Some(gfx) => {
                let response = gfx.overlay.state.on_window_event(&gfx.window, &event);
                UiFocus {
                    keyboard: self.egui_ctx.wants_keyboard_input(),
                    pointer: response.consumed || self.egui_ctx.wants_pointer_input(),
                }
            }
            None => UiFocus::default(),
        };

        match event {
            WindowEvent::Resized(size) => self.resize(size),
            WindowEvent::RedrawRequested => {
                if let Err(e) = self.redraw() {
                    self.fail(event_loop, e);
                }
            }
            ref other => {
                if let Some(input) = self.input_event(other) {
                    if self.state.handle(input, focus) == LoopState::Terminated {
                        tracing::info!("shutting down");
                        event_loop.exit();
                    }
                }
            }
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(gfx) = &self.graphics {
            gfx.window.request_redraw();
        }
    }
}
