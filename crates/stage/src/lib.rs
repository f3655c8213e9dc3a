//! Scene bootstrapper: the viewport context of one mount, its lifecycle and
//! the async asset load that fills it.
//!
//! # Invariants
//! - A mount attaches exactly one surface; unmount disposes and detaches it.
//! - A node is attached only after its asset finished loading.
//! - The text node is never attached before the model node.
//! - A failed stage yields one diagnostic, no retry and no error surface.
//! - After unmount no frame renders, no load event arrives and resizes are ignored.

mod config;
mod diagnostics;
mod error;
mod frame;
mod host;
mod loading;
mod pipeline;
mod stage;
#[cfg(test)]
mod testing;

pub use config::{
    AssetPaths, CameraConfig, CodecConfig, ConfigError, ModelConfig, OrbitConfig, RendererConfig,
    ShowcaseConfig, TextConfig,
};
pub use diagnostics::{Diagnostic, Diagnostics};
pub use error::{HostError, StageError};
pub use frame::{CancelToken, Cancelled, FrameLoop};
pub use host::{HeadlessHost, Mounted, SurfaceHost};
pub use loading::{LoadingPolicy, LoadingTracker};
pub use pipeline::{LoadEvent, LoadOrder, LoadPipeline, LoadSink, LoadStage, LoadedAsset};
pub use stage::Stage;
