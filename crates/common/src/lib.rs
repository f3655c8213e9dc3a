//! Shared value types used across the showcase crates.

mod types;

pub use types::{NodeId, Rgb, SurfaceSize, Transform};
