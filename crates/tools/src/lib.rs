//! Developer tooling: scene and font inspectors.
//!
//! # Invariants
//! - Inspectors are read-only.

mod inspector;

pub use inspector::{FontSummary, NodeInfo, SceneInspector, SceneSummary};

pub fn crate_info() -> &'static str {
    "showcase-tools v0.1.0"
}
