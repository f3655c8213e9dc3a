//! Asset pipeline: byte sources and the loaders that turn bytes into scene data.
//!
//! Loaders are pure functions of the fetched bytes. Fetching is abstracted by
//! [`AssetSource`] so the load pipeline can run against the filesystem or a
//! scripted source in tests.

mod codec;
mod environment;
mod error;
mod font;
#[cfg(any(test, feature = "fixtures"))]
pub mod fixtures;
mod model;
mod source;
mod text;
mod worker;

pub use codec::{
    CommandCodec, DEFAULT_RUNTIME, DRACO_EXTENSION, DecodedAttribute, DecodedMesh, DecoderBundle,
    MeshCodec,
};
pub use environment::decode_environment;
pub use error::AssetError;
pub use font::{Font, GlyphPath, PathCommand};
pub use model::ModelLoader;
pub use source::{AssetBytes, AssetSource, FsSource};
pub use text::{TextOptions, build_text_geometry};
pub use worker::unblock;
