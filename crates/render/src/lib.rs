//! Rendering adapter: renderer-agnostic interface.
//!
//! # Invariants
//! - Renderers read the scene, camera and overlay; they never mutate them.
//! - A disposed renderer refuses to draw.
//!
//! `DebugTextRenderer` implements the same [`RenderBackend`] trait as the GPU
//! backend, so headless tools and tests drive the exact mount lifecycle the
//! window uses.

mod camera;
mod overlay;
mod renderer;

pub use camera::PerspectiveCamera;
pub use overlay::{ContactCard, Overlay};
pub use renderer::{
    DebugTextRenderer, FrameInput, RenderBackend, RenderError, RendererSettings,
};

pub fn crate_info() -> &'static str {
    "showcase-render v0.1.0"
}
