use crate::error::AssetError;
use std::collections::BTreeMap;
use std::path::Path;
use std::process::{Command, Stdio};

/// glTF extension marking Draco-compressed primitives.
pub const DRACO_EXTENSION: &str = "KHR_draco_mesh_compression";

/// Program the default codec runs the decoder bundle with.
pub const DEFAULT_RUNTIME: &str = "node";

const BUNDLE_SCRIPT: &str = include_str!("draco_decode.cjs");

/// One decoded vertex attribute, converted to `f32`.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAttribute {
    pub components: usize,
    pub values: Vec<f32>,
}

/// A decompressed primitive: triangle indices plus attributes keyed by the
/// unique ids the container maps glTF semantics to.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedMesh {
    pub indices: Vec<u32>,
    pub attributes: BTreeMap<u32, DecodedAttribute>,
}

impl DecodedMesh {
    /// Attribute `id` as `N`-component tuples.
    pub fn attribute<const N: usize>(&self, id: u32) -> Result<Vec<[f32; N]>, AssetError> {
        let attribute = self
            .attributes
            .get(&id)
            .ok_or_else(|| AssetError::Codec(format!("decoder returned no attribute {id}")))?;
        if attribute.components != N || attribute.values.len() % N != 0 {
            return Err(AssetError::Codec(format!(
                "attribute {id} has {} components, expected {N}",
                attribute.components
            )));
        }
        Ok(attribute
            .values
            .chunks_exact(N)
            .map(|c| {
                let mut v = [0.0; N];
                v.copy_from_slice(c);
                v
            })
            .collect())
    }

    /// Decoder output frame, all fields little-endian:
    /// `u32 index_count, u32 indices[..]`, `u32 attribute_count`, then per
    /// attribute `u32 id, u32 components, u32 value_count, f32 values[..]`.
    pub fn from_frame(bytes: &[u8]) -> Result<Self, AssetError> {
        let mut frame = FrameReader { bytes, pos: 0 };
        let index_count = frame.len()?;
        let indices = (0..index_count)
            .map(|_| frame.u32())
            .collect::<Result<Vec<_>, _>>()?;

        let mut attributes = BTreeMap::new();
        for _ in 0..frame.u32()? {
            let id = frame.u32()?;
            let components = frame.u32()? as usize;
            let count = frame.len()?;
            let values = (0..count)
                .map(|_| frame.u32().map(f32::from_bits))
                .collect::<Result<Vec<_>, _>>()?;
            attributes.insert(id, DecodedAttribute { components, values });
        }
        if frame.pos != bytes.len() {
            return Err(AssetError::Codec(format!(
                "{} trailing bytes in decoder output",
                bytes.len() - frame.pos
            )));
        }
        Ok(Self {
            indices,
            attributes,
        })
    }

    pub fn to_frame(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&(self.indices.len() as u32).to_le_bytes());
        for i in &self.indices {
            out.extend_from_slice(&i.to_le_bytes());
        }
        out.extend_from_slice(&(self.attributes.len() as u32).to_le_bytes());
        for (id, attribute) in &self.attributes {
            out.extend_from_slice(&id.to_le_bytes());
            out.extend_from_slice(&(attribute.components as u32).to_le_bytes());
            out.extend_from_slice(&(attribute.values.len() as u32).to_le_bytes());
            for v in &attribute.values {
                out.extend_from_slice(&v.to_le_bytes());
            }
        }
        out
    }
}

struct FrameReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl FrameReader<'_> {
    fn u32(&mut self) -> Result<u32, AssetError> {
        let word = self
            .bytes
            .get(self.pos..self.pos + 4)
            .ok_or_else(|| AssetError::Codec("truncated decoder output".into()))?;
        self.pos += 4;
        Ok(u32::from_le_bytes([word[0], word[1], word[2], word[3]]))
    }

    /// A count of 4-byte words that must still fit in the frame.
    fn len(&mut self) -> Result<usize, AssetError> {
        let n = self.u32()? as usize;
        if n > (self.bytes.len() - self.pos) / 4 {
            return Err(AssetError::Codec("truncated decoder output".into()));
        }
        Ok(n)
    }
}

/// Decoder for compressed mesh primitives.
pub trait MeshCodec: Send + Sync + std::fmt::Debug {
    /// The glTF extension this codec handles.
    fn extension(&self) -> &str;

    /// Decode one compressed primitive. `attributes` lists the unique ids
    /// the container expects back.
    fn decode(&self, compressed: &[u8], attributes: &[u32]) -> Result<DecodedMesh, AssetError>;
}

/// Resolves the decoder from a decoder bundle, a URL or directory holding
/// `draco_wasm_wrapper.js` and `draco_decoder.wasm`, and runs it with a
/// JavaScript runtime.
#[derive(Debug, Clone)]
pub struct DecoderBundle {
    decoder_path: String,
    runtime: String,
}

impl DecoderBundle {
    pub fn new(decoder_path: impl Into<String>) -> Self {
        Self {
            decoder_path: decoder_path.into(),
            runtime: DEFAULT_RUNTIME.into(),
        }
    }

    pub fn with_runtime(mut self, runtime: impl Into<String>) -> Self {
        self.runtime = runtime.into();
        self
    }

    pub fn decoder_path(&self) -> &str {
        &self.decoder_path
    }
}

impl MeshCodec for DecoderBundle {
    fn extension(&self) -> &str {
        DRACO_EXTENSION
    }

    fn decode(&self, compressed: &[u8], attributes: &[u32]) -> Result<DecodedMesh, AssetError> {
        let dir = tempfile::tempdir().map_err(io_err("codec tempdir"))?;
        let script = dir.path().join("draco_decode.cjs");
        std::fs::write(&script, BUNDLE_SCRIPT).map_err(io_err("codec script"))?;
        let (input, output) = stage_input(dir.path(), compressed)?;

        let args = vec![
            script.display().to_string(),
            self.decoder_path.clone(),
            input.display().to_string(),
            output.display().to_string(),
            id_list(attributes),
        ];
        tracing::debug!(runtime = %self.runtime, decoder_path = %self.decoder_path, "running decoder bundle");
        run_decoder(&self.runtime, &args, &output)
    }
}

/// Runs an external decoder program.
///
/// `{input}` and `{output}` in the argument list are replaced by paths of
/// temporary files holding the compressed primitive and the decoded frame
/// (see [`DecodedMesh::from_frame`]); `{attributes}` by the comma-separated
/// attribute ids.
#[derive(Debug, Clone)]
pub struct CommandCodec {
    extension: String,
    program: String,
    args: Vec<String>,
}

impl CommandCodec {
    pub fn new(extension: impl Into<String>, program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            extension: extension.into(),
            program: program.into(),
            args,
        }
    }

    /// Build from a `[program, args...]` command line.
    pub fn from_command_line(extension: impl Into<String>, command: &[String]) -> Option<Self> {
        let (program, args) = command.split_first()?;
        Some(Self::new(extension, program.clone(), args.to_vec()))
    }
}

impl MeshCodec for CommandCodec {
    fn extension(&self) -> &str {
        &self.extension
    }

    fn decode(&self, compressed: &[u8], attributes: &[u32]) -> Result<DecodedMesh, AssetError> {
        let dir = tempfile::tempdir().map_err(io_err("codec tempdir"))?;
        let (input, output) = stage_input(dir.path(), compressed)?;
        let ids = id_list(attributes);

        let args: Vec<String> = self
            .args
            .iter()
            .map(|a| {
                a.replace("{input}", &input.display().to_string())
                    .replace("{output}", &output.display().to_string())
                    .replace("{attributes}", &ids)
            })
            .collect();

        tracing::debug!(program = %self.program, ?args, "running mesh decoder");
        run_decoder(&self.program, &args, &output)
    }
}

fn stage_input(
    dir: &Path,
    compressed: &[u8],
) -> Result<(std::path::PathBuf, std::path::PathBuf), AssetError> {
    let input = dir.join("primitive.drc");
    let output = dir.join("primitive.bin");
    std::fs::write(&input, compressed).map_err(io_err("codec input"))?;
    Ok((input, output))
}

fn id_list(attributes: &[u32]) -> String {
    attributes
        .iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

fn run_decoder(program: &str, args: &[String], output: &Path) -> Result<DecodedMesh, AssetError> {
    let result = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .map_err(io_err(program))?;
    if !result.status.success() {
        let stderr = String::from_utf8_lossy(&result.stderr);
        let reason = stderr.lines().rev().find(|l| !l.trim().is_empty()).unwrap_or("");
        return Err(AssetError::Codec(format!(
            "{program} exited with {}: {reason}",
            result.status
        )));
    }
    let frame = std::fs::read(output).map_err(io_err("codec output"))?;
    DecodedMesh::from_frame(&frame)
}

fn io_err(path: &str) -> impl FnOnce(std::io::Error) -> AssetError {
    let path = path.to_string();
    move |source| AssetError::Io { path, source }
}
