//! wgpu render backend for the showcase.
//!
//! Draws the equirectangular environment behind the scene and every mesh node
//! with a metallic-roughness approximation lit by ambient lights and the
//! environment. Wireframe materials are drawn as line lists.
//!
//! # Invariants
//! - Renderer never mutates the scene.
//! - GPU buffers are cached per node and rebuilt only when geometry changes.
//! - After `dispose` no GPU resource is alive and frames fail.

mod gpu;
mod shaders;

pub use gpu::{GpuError, SurfaceFrame, WgpuRenderer};
