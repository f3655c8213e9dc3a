//! Camera input: pointer bindings, touch gestures and the orbit controller.
//!
//! # Invariants
//! - Window events are translated to [`Action`]s before they touch the camera.
//! - After every [`OrbitControls::update`] the camera distance and polar angle
//!   lie inside the configured [`OrbitLimits`].

pub mod action;
mod orbit;
mod touch;

pub use action::{Action, MouseBindings, PointerButton};
pub use orbit::{OrbitControls, OrbitLimits};
pub use touch::{TouchGesture, TouchTracker};
