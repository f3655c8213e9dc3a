use crate::camera::PerspectiveCamera;
use crate::overlay::Overlay;
use showcase_common::{Rgb, SurfaceSize};
use showcase_scene::{Background, NodeKind, Scene};
use std::fmt::Write as _;

/// Errors a render backend can report for a frame.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("renderer has been disposed")]
    Disposed,
    #[error("surface error: {0}")]
    Surface(String),
    #[error("backend error: {0}")]
    Backend(String),
}

/// Output-independent renderer settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RendererSettings {
    pub clear_color: Rgb,
    pub clear_alpha: f32,
}

impl Default for RendererSettings {
    fn default() -> Self {
        Self {
            clear_color: Rgb::from_hex(0x505050),
            clear_alpha: 1.0,
        }
    }
}

/// Everything a backend reads to draw one frame.
#[derive(Debug, Clone, Copy)]
pub struct FrameInput<'a> {
    pub scene: &'a Scene,
    pub camera: &'a PerspectiveCamera,
    pub overlay: &'a Overlay,
}

/// Renderer-agnostic interface. All renderers implement this trait.
///
/// A backend reads the scene, camera and overlay and produces output. It
/// owns its output resources and releases them in [`dispose`]; any frame
/// after that fails with [`RenderError::Disposed`].
///
/// [`dispose`]: RenderBackend::dispose
pub trait RenderBackend {
    /// The output type produced by this renderer.
    type Output;

    fn settings(&self) -> RendererSettings;

    fn size(&self) -> SurfaceSize;

    /// Resize the output. Zero dimensions are clamped to 1.
    fn resize(&mut self, size: SurfaceSize);

    /// Render one frame.
    fn render(&mut self, frame: &FrameInput<'_>) -> Result<Self::Output, RenderError>;

    /// Release output resources. Idempotent.
    fn dispose(&mut self);

    fn is_disposed(&self) -> bool;
}

/// Text renderer for headless runs.
///
/// Produces a human-readable description of each frame. Useful for CLI
/// output, logging, and exercising the mount lifecycle in tests.
#[derive(Debug)]
pub struct DebugTextRenderer {
    settings: RendererSettings,
    size: SurfaceSize,
    frames: u64,
    disposed: bool,
}

impl DebugTextRenderer {
    pub fn new(size: SurfaceSize, settings: RendererSettings) -> Self {
        Self {
            settings,
            size,
            frames: 0,
            disposed: false,
        }
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }
}

impl RenderBackend for DebugTextRenderer {
    type Output = String;

    fn settings(&self) -> RendererSettings {
        self.settings
    }

    fn size(&self) -> SurfaceSize {
        self.size
    }

    fn resize(&mut self, size: SurfaceSize) {
        self.size = SurfaceSize::new(size.width, size.height);
    }

    fn render(&mut self, frame: &FrameInput<'_>) -> Result<String, RenderError> {
        if self.disposed {
            return Err(RenderError::Disposed);
        }
        self.frames += 1;

        let mut out = String::new();
        let _ = writeln!(
            out,
            "=== Frame {} ({}x{}, clear=#{:06x}) ===",
            self.frames,
            self.size.width,
            self.size.height,
            self.settings.clear_color.to_hex()
        );
        let background = match frame.scene.background() {
            None => "none".to_string(),
            Some(Background::Color(c)) => format!("#{:06x}", c.to_hex()),
            Some(Background::Environment(env)) => {
                format!("environment {}x{}", env.width, env.height)
            }
        };
        let _ = writeln!(out, "Background: {background}");

        let cam = frame.camera;
        let _ = writeln!(
            out,
            "Camera: pos=({:.2}, {:.2}, {:.2}) fov={:.0} aspect={:.3}",
            cam.position.x, cam.position.y, cam.position.z, cam.fov_degrees, cam.aspect
        );

        let mut meshes = 0usize;
        let mut triangles = 0usize;
        frame.scene.traverse_world(&mut |node, _world| {
            if let NodeKind::Mesh { geometry, .. } = &node.kind {
                meshes += 1;
                triangles += geometry.triangle_count();
            }
        });
        let _ = writeln!(
            out,
            "Nodes: {} top-level, {meshes} meshes, {triangles} triangles",
            frame.scene.nodes().len()
        );
        for node in frame.scene.nodes() {
            let p = node.transform.position;
            let kind = match &node.kind {
                NodeKind::Group => "group",
                NodeKind::Mesh { .. } => "mesh",
                NodeKind::AmbientLight(_) => "ambient",
            };
            let _ = writeln!(
                out,
                "  [{}] {:<10} {kind:<7} pos=({:.2}, {:.2}, {:.2}) subtree={}",
                node.id.short(),
                node.name,
                p.x,
                p.y,
                p.z,
                node.subtree_len()
            );
        }

        if frame.overlay.loading {
            let _ = writeln!(out, "Overlay: loading...");
        }
        let _ = writeln!(
            out,
            "Overlay: {} <{}>",
            frame.overlay.contact.text(),
            frame.overlay.contact.url
        );
        Ok(out)
    }

    fn dispose(&mut self) {
        if !self.disposed {
            tracing::debug!(frames = self.frames, "debug renderer disposed");
        }
        self.disposed = true;
    }

    fn is_disposed(&self) -> bool {
        self.disposed
    }
}
