/// Errors from fetching or decoding assets.
#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("image decode error: {0}")]
    Image(#[from] image::ImageError),
    #[error("glTF error: {0}")]
    Gltf(#[from] gltf::Error),
    #[error("model requires {extension} but no codec is installed (decoder path: {decoder_path})")]
    CodecUnavailable {
        extension: String,
        decoder_path: String,
    },
    #[error("mesh codec failed: {0}")]
    Codec(String),
    #[error("invalid {extension} data: {reason}")]
    InvalidExtension { extension: String, reason: String },
    #[error("worker for {0} stopped before finishing")]
    WorkerLost(String),
    #[error("model contains no triangle meshes")]
    EmptyModel,
    #[error("font parse error: {0}")]
    FontParse(#[from] serde_json::Error),
    #[error("invalid glyph outline for {glyph:?}: {reason}")]
    InvalidOutline { glyph: String, reason: String },
    #[error("text {0:?} produced no glyph outlines")]
    EmptyText(String),
    #[error("tessellation failed: {0}")]
    Tessellation(String),
}
