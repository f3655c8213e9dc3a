//! Scene graph: the ordered tree of renderable nodes composed for each frame.
//!
//! # Invariants
//! - A node id is added at most once; re-adding is an error, never a silent replace.
//! - Top-level node names are unique when non-empty.
//! - Every mutation appends a `SceneEvent`.

mod geometry;
mod node;
mod scene;
mod texture;

pub use geometry::{Aabb, MeshGeometry};
pub use node::{AmbientLight, Material, Node, NodeKind};
pub use scene::{Background, Scene, SceneError, SceneEvent};
pub use texture::{EnvironmentMap, TextureImage, TextureMapping};
