use showcase_render::RenderError;
use showcase_scene::SceneError;

/// Errors from the host providing the drawable surface.
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("a surface is already attached to this host")]
    AlreadyAttached,
    #[error("surface unavailable: {0}")]
    Unavailable(String),
    #[error("render backend creation failed: {0}")]
    Backend(String),
}

/// Errors from stage and mount operations.
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    #[error(transparent)]
    Scene(#[from] SceneError),
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error(transparent)]
    Host(#[from] HostError),
    #[error("cannot attach {node:?} before {requires:?}")]
    MissingDependency { node: String, requires: String },
}
