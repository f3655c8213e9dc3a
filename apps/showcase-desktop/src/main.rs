use anyhow::Result;
use clap::Parser;
use egui::Context as EguiContext;
use glam::Vec2;
use showcase_assets::FsSource;
use showcase_common::SurfaceSize;
use showcase_input::PointerButton;
use showcase_render::{RenderBackend, RendererSettings};
use showcase_render_wgpu::WgpuRenderer;
use showcase_stage::{
    HostError, LoadEvent, LoadOrder, LoadSink, Mounted, ShowcaseConfig, Stage, SurfaceHost,
};
use showcase_tools::SceneInspector;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing_subscriber::EnvFilter;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, KeyEvent, MouseButton, MouseScrollDelta, TouchPhase, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop, EventLoopProxy};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowId};

#[derive(Parser)]
#[command(name = "showcase-desktop", about = "3D product showcase viewer")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// YAML config merged over the defaults
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Asset directory, overrides the config
    #[arg(long)]
    assets: Option<PathBuf>,

    /// Load the environment alongside the model instead of before it
    #[arg(long)]
    concurrent: bool,
}

/// Window-backed surface host. The GPU renderer draws straight into it.
struct WindowHost {
    window: Arc<Window>,
    attached: bool,
    listening: bool,
}

impl WindowHost {
    fn new(window: Arc<Window>) -> Self {
        Self {
            window,
            attached: false,
            listening: false,
        }
    }
}

impl SurfaceHost for WindowHost {
    type Backend = WgpuRenderer;

    fn size(&self) -> SurfaceSize {
        let size = self.window.inner_size();
        SurfaceSize::new(size.width, size.height)
    }

    fn attach(&mut self, settings: RendererSettings) -> Result<WgpuRenderer, HostError> {
        if self.attached {
            return Err(HostError::AlreadyAttached);
        }
        let renderer =
            pollster::block_on(WgpuRenderer::new(self.window.clone(), self.size(), settings))
                .map_err(|e| HostError::Backend(e.to_string()))?;
        self.attached = true;
        Ok(renderer)
    }

    fn detach(&mut self, backend: WgpuRenderer) {
        drop(backend);
        self.attached = false;
    }

    fn listen_resize(&mut self) {
        self.listening = true;
    }

    fn unlisten_resize(&mut self) {
        self.listening = false;
    }

    fn is_listening(&self) -> bool {
        self.listening
    }
}

/// Forwards load events from the loader thread to the window thread.
struct ProxySink(EventLoopProxy<LoadEvent>);

impl LoadSink for ProxySink {
    fn send(&mut self, event: LoadEvent) {
        if self.0.send_event(event).is_err() {
            tracing::debug!("event loop closed, dropping load event");
        }
    }
}

struct Overlay {
    egui_winit: egui_winit::State,
    renderer: egui_wgpu::Renderer,
}

struct ShowcaseApp {
    config: ShowcaseConfig,
    proxy: EventLoopProxy<LoadEvent>,
    window: Option<Arc<Window>>,
    mounted: Option<Mounted<WindowHost>>,
    loader: Option<JoinHandle<()>>,
    egui_ctx: EguiContext,
    overlay: Option<Overlay>,
    cursor: Vec2,
    show_inspector: bool,
}

impl ShowcaseApp {
    fn new(config: ShowcaseConfig, proxy: EventLoopProxy<LoadEvent>) -> Self {
        Self {
            config,
            proxy,
            window: None,
            mounted: None,
            loader: None,
            egui_ctx: EguiContext::default(),
            overlay: None,
            cursor: Vec2::ZERO,
            show_inspector: false,
        }
    }

    fn mount(&mut self, window: Arc<Window>) -> Result<()> {
        let mounted = Mounted::mount(WindowHost::new(window.clone()), self.config.clone())?;

        let backend = mounted.backend();
        let overlay = Overlay {
            egui_winit: egui_winit::State::new(
                self.egui_ctx.clone(),
                egui::ViewportId::ROOT,
                &window,
                Some(window.scale_factor() as f32),
                None,
                None,
            ),
            renderer: egui_wgpu::Renderer::new(
                backend.device(),
                backend.surface_format(),
                None,
                1,
                false,
            ),
        };

        let pipeline = mounted.load_pipeline();
        let source = FsSource::new(self.config.assets.root.clone());
        let mut sink = ProxySink(self.proxy.clone());
        let loader = std::thread::Builder::new()
            .name("asset-loader".into())
            .spawn(move || pollster::block_on(pipeline.run(&source, &mut sink)))?;

        self.loader = Some(loader);
        self.overlay = Some(overlay);
        self.mounted = Some(mounted);
        self.window = Some(window);
        Ok(())
    }

    fn unmount(&mut self) {
        self.overlay = None;
        if let Some(mounted) = self.mounted.take() {
            let frames = mounted.frame_loop().frames();
            drop(mounted.unmount());
            tracing::info!(frames, "viewer closed");
        }
        if let Some(loader) = self.loader.take() {
            // Cancellation resolves the pipeline at once; in-flight decode
            // workers are detached and their results dropped.
            if loader.join().is_err() {
                tracing::error!("asset loader panicked");
            }
        }
    }

    fn redraw(&mut self) {
        let (Some(mounted), Some(overlay), Some(window)) =
            (self.mounted.as_mut(), self.overlay.as_mut(), self.window.as_ref())
        else {
            return;
        };

        let frame = match mounted.frame() {
            Ok(Some(Some(frame))) => frame,
            Ok(_) => return,
            Err(e) => {
                tracing::error!("frame failed: {e}");
                return;
            }
        };

        let raw_input = overlay.egui_winit.take_egui_input(window);
        let stage = mounted.stage();
        let show_inspector = self.show_inspector;
        let full_output = self
            .egui_ctx
            .run(raw_input, |ctx| draw_ui(ctx, stage, show_inspector));
        overlay
            .egui_winit
            .handle_platform_output(window, full_output.platform_output);

        let paint_jobs = self
            .egui_ctx
            .tessellate(full_output.shapes, full_output.pixels_per_point);
        let size = mounted.backend().size();
        let screen_descriptor = egui_wgpu::ScreenDescriptor {
            size_in_pixels: [size.width, size.height],
            pixels_per_point: full_output.pixels_per_point,
        };

        let backend = mounted.backend();
        let (device, queue) = (backend.device(), backend.queue());
        for (id, image_delta) in &full_output.textures_delta.set {
            overlay
                .renderer
                .update_texture(device, queue, *id, image_delta);
        }
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("egui_encoder"),
        });
        overlay.renderer.update_buffers(
            device,
            queue,
            &mut encoder,
            &paint_jobs,
            &screen_descriptor,
        );
        {
            let mut pass = encoder
                .begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: Some("egui_pass"),
                    color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                        view: &frame.view,
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
            overlay
                .renderer
                .render(&mut pass, &paint_jobs, &screen_descriptor);
        }
        queue.submit(std::iter::once(encoder.finish()));
        for id in &full_output.textures_delta.free {
            overlay.renderer.free_texture(id);
        }

        frame.present();
    }

    fn stage_mut(&mut self) -> Option<&mut Stage> {
        self.mounted.as_mut().map(Mounted::stage_mut)
    }
}

fn pointer_button(button: MouseButton) -> Option<PointerButton> {
    match button {
        MouseButton::Left => Some(PointerButton::Primary),
        MouseButton::Right => Some(PointerButton::Secondary),
        MouseButton::Middle => Some(PointerButton::Middle),
        _ => None,
    }
}

/// Contact card bottom-left, spinner while loading, optional inspector.
fn draw_ui(ctx: &EguiContext, stage: &Stage, show_inspector: bool) {
    let overlay = stage.overlay();

    egui::Area::new(egui::Id::new("contact"))
        .anchor(egui::Align2::LEFT_BOTTOM, egui::vec2(16.0, -16.0))
        .show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.spacing_mut().item_spacing.x = 0.0;
                ui.label(egui::RichText::new(&overlay.contact.prefix).color(egui::Color32::WHITE));
                ui.hyperlink_to(overlay.contact.handle.as_str(), &overlay.contact.url);
            });
        });

    if overlay.loading {
        egui::Area::new(egui::Id::new("loading"))
            .anchor(egui::Align2::CENTER_CENTER, egui::Vec2::ZERO)
            .show(ctx, |ui| {
                ui.add(egui::Spinner::new().size(48.0));
            });
    }

    if !show_inspector {
        return;
    }
    let summary = SceneInspector::summary(stage.scene());
    egui::Window::new("Inspector")
        .default_width(300.0)
        .show(ctx, |ui| {
            ui.label(format!("Nodes: {} ({} top-level)", summary.nodes, summary.top_level));
            ui.label(format!(
                "Meshes: {}  Triangles: {}",
                summary.meshes, summary.triangles
            ));
            ui.label(format!("Background: {}", summary.background));
            let cam = stage.camera().position;
            ui.label(format!("Camera: ({:.1}, {:.1}, {:.1})", cam.x, cam.y, cam.z));
            ui.separator();
            for (_, name) in SceneInspector::list_nodes(stage.scene()) {
                ui.label(name);
            }
            if !stage.diagnostics().is_empty() {
                ui.separator();
                for diagnostic in stage.diagnostics().entries() {
                    ui.colored_label(egui::Color32::LIGHT_RED, diagnostic.to_string());
                }
            }
            ui.separator();
            ui.small("F1: Toggle Inspector | LMB: Rotate | RMB: Pan | Wheel: Zoom");
        });
}

impl ApplicationHandler<LoadEvent> for ShowcaseApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let attrs = Window::default_attributes()
            .with_title("Showcase")
            .with_inner_size(PhysicalSize::new(1280u32, 720));
        let window = match event_loop.create_window(attrs) {
            Ok(window) => Arc::new(window),
            Err(e) => {
                tracing::error!("failed to create window: {e}");
                event_loop.exit();
                return;
            }
        };
        if let Err(e) = self.mount(window) {
            tracing::error!("failed to mount viewer: {e:#}");
            event_loop.exit();
        }
    }

    fn user_event(&mut self, _event_loop: &ActiveEventLoop, event: LoadEvent) {
        let Some(mounted) = self.mounted.as_mut() else {
            return;
        };
        if let Err(e) = mounted.apply(event) {
            tracing::warn!("load event rejected: {e}");
        }
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        if let (Some(overlay), Some(window)) = (self.overlay.as_mut(), self.window.as_ref()) {
            let response = overlay.egui_winit.on_window_event(window, &event);
            if response.consumed {
                return;
            }
        }

        match event {
            WindowEvent::CloseRequested => {
                self.unmount();
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                if let Some(mounted) = self.mounted.as_mut() {
                    mounted.resize(SurfaceSize::new(size.width, size.height));
                }
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(KeyCode::F1),
                        state: ElementState::Pressed,
                        ..
                    },
                ..
            } => {
                self.show_inspector = !self.show_inspector;
            }
            WindowEvent::CursorMoved { position, .. } => {
                self.cursor = Vec2::new(position.x as f32, position.y as f32);
                let cursor = self.cursor;
                if let Some(stage) = self.stage_mut() {
                    stage.pointer_move(cursor);
                }
            }
            WindowEvent::CursorLeft { .. } => {
                if let Some(stage) = self.stage_mut() {
                    stage.controls_mut().cancel();
                }
            }
            WindowEvent::MouseInput { state, button, .. } => {
                let cursor = self.cursor;
                if let (Some(button), Some(stage)) = (pointer_button(button), self.stage_mut()) {
                    match state {
                        ElementState::Pressed => stage.pointer_down(button, cursor),
                        ElementState::Released => stage.pointer_up(button),
                    }
                }
            }
            WindowEvent::MouseWheel { delta, .. } => {
                // winit reports scrolling up as positive.
                let delta_y = match delta {
                    MouseScrollDelta::LineDelta(_, y) => -y,
                    MouseScrollDelta::PixelDelta(p) => -p.y as f32,
                };
                if let Some(stage) = self.stage_mut() {
                    stage.wheel(delta_y);
                }
            }
            WindowEvent::Touch(touch) => {
                let position = Vec2::new(touch.location.x as f32, touch.location.y as f32);
                if let Some(stage) = self.stage_mut() {
                    match touch.phase {
                        TouchPhase::Started => stage.touch_start(touch.id, position),
                        TouchPhase::Moved => stage.touch_move(touch.id, position),
                        TouchPhase::Ended | TouchPhase::Cancelled => stage.touch_end(touch.id),
                    }
                }
            }
            WindowEvent::RedrawRequested => {
                self.redraw();
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        let running = self
            .mounted
            .as_ref()
            .is_some_and(|m| m.frame_loop().is_running());
        if let (true, Some(window)) = (running, &self.window) {
            window.request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        self.unmount();
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    let mut config = match &cli.config {
        Some(path) => ShowcaseConfig::load(path)?,
        None => ShowcaseConfig::default(),
    };
    if let Some(root) = cli.assets {
        config.assets.root = root;
    }
    if cli.concurrent {
        config.load_order = LoadOrder::Concurrent;
    }

    tracing::info!(assets = %config.assets.root.display(), "showcase-desktop starting");

    let event_loop = EventLoop::<LoadEvent>::with_user_event().build()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = ShowcaseApp::new(config, event_loop.create_proxy());
    event_loop.run_app(&mut app)?;

    Ok(())
}
