//! Small in-memory assets for tests in this and downstream crates.

use crate::error::AssetError;
use image::codecs::hdr::HdrEncoder;
use image::{ImageFormat, Rgb, Rgba, RgbaImage};
use std::io::Cursor;

const TRIANGLE: [[f32; 3]; 3] = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];
const TRIANGLE_UVS: [[f32; 2]; 3] = [[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]];

/// How [`textured_triangle_glb`] points its texture at the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureRef {
    /// Core `source` field.
    Source,
    /// Only through `EXT_texture_webp`, which the file then requires.
    WebpExtension,
}

/// A one-triangle GLB. `required` lands in `extensionsRequired`.
pub fn triangle_glb(required: &[&str]) -> Vec<u8> {
    let mut bin = Vec::new();
    push_floats(&mut bin, TRIANGLE.iter().flatten());
    for i in [0u16, 1, 2] {
        bin.extend_from_slice(&i.to_le_bytes());
    }
    let bin_len = bin.len();

    let extensions = json_list(required);
    let json = format!(
        r#"{{"asset":{{"version":"2.0"}},
        "extensionsUsed":{extensions},"extensionsRequired":{extensions},
        "scene":0,"scenes":[{{"nodes":[0]}}],
        "nodes":[{{"name":"Body","mesh":0,"translation":[1.0,0.0,0.0]}}],
        "meshes":[{{"primitives":[{{"attributes":{{"POSITION":0}},"indices":1,"material":0}}]}}],
        "materials":[{{"name":"Paint","pbrMetallicRoughness":{{"baseColorFactor":[1.0,0.0,0.0,1.0],"metallicFactor":0.5,"roughnessFactor":0.25}}}}],
        "buffers":[{{"byteLength":{bin_len}}}],
        "bufferViews":[{{"buffer":0,"byteOffset":0,"byteLength":36}},{{"buffer":0,"byteOffset":36,"byteLength":6}}],
        "accessors":[
            {{"bufferView":0,"componentType":5126,"count":3,"type":"VEC3","min":[0.0,0.0,0.0],"max":[1.0,1.0,0.0]}},
            {{"bufferView":1,"componentType":5123,"count":3,"type":"SCALAR"}}]}}"#
    );
    glb(json, bin)
}

/// A one-triangle GLB with UVs whose material samples `image` as its base
/// colour texture. The image bytes are embedded as-is.
pub fn textured_triangle_glb(image: &[u8], mime_type: &str, reference: TextureRef) -> Vec<u8> {
    let mut bin = Vec::new();
    push_floats(&mut bin, TRIANGLE.iter().flatten());
    push_floats(&mut bin, TRIANGLE_UVS.iter().flatten());
    for i in [0u16, 1, 2] {
        bin.extend_from_slice(&i.to_le_bytes());
    }
    pad(&mut bin, 0);
    let image_offset = bin.len();
    bin.extend_from_slice(image);
    let bin_len = bin.len();
    let image_len = image.len();

    let (extensions, texture) = match reference {
        TextureRef::Source => ("[]", r#"{"source":0}"#),
        TextureRef::WebpExtension => (
            r#"["EXT_texture_webp"]"#,
            r#"{"extensions":{"EXT_texture_webp":{"source":0}}}"#,
        ),
    };
    let json = format!(
        r#"{{"asset":{{"version":"2.0"}},
        "extensionsUsed":{extensions},"extensionsRequired":{extensions},
        "scene":0,"scenes":[{{"nodes":[0]}}],
        "nodes":[{{"name":"Body","mesh":0}}],
        "meshes":[{{"primitives":[{{"attributes":{{"POSITION":0,"TEXCOORD_0":1}},"indices":2,"material":0}}]}}],
        "materials":[{{"name":"Paint","pbrMetallicRoughness":{{"baseColorTexture":{{"index":0}}}}}}],
        "textures":[{texture}],
        "images":[{{"name":"paint","bufferView":3,"mimeType":"{mime_type}"}}],
        "buffers":[{{"byteLength":{bin_len}}}],
        "bufferViews":[
            {{"buffer":0,"byteOffset":0,"byteLength":36}},
            {{"buffer":0,"byteOffset":36,"byteLength":24}},
            {{"buffer":0,"byteOffset":60,"byteLength":6}},
            {{"buffer":0,"byteOffset":{image_offset},"byteLength":{image_len}}}],
        "accessors":[
            {{"bufferView":0,"componentType":5126,"count":3,"type":"VEC3","min":[0.0,0.0,0.0],"max":[1.0,1.0,0.0]}},
            {{"bufferView":1,"componentType":5126,"count":3,"type":"VEC2"}},
            {{"bufferView":2,"componentType":5123,"count":3,"type":"SCALAR"}}]}}"#
    );
    glb(json, bin)
}

/// A one-triangle GLB whose only primitive is Draco-compressed. `payload`
/// is stored in bufferView 0 and handed to the codec verbatim; the
/// extension maps POSITION to attribute id 0 and TEXCOORD_0 to id 1.
pub fn draco_triangle_glb(payload: &[u8]) -> Vec<u8> {
    let bin = payload.to_vec();
    let bin_len = bin.len();
    let json = format!(
        r#"{{"asset":{{"version":"2.0"}},
        "extensionsUsed":["KHR_draco_mesh_compression"],
        "extensionsRequired":["KHR_draco_mesh_compression"],
        "scene":0,"scenes":[{{"nodes":[0]}}],
        "nodes":[{{"name":"Body","mesh":0}}],
        "meshes":[{{"primitives":[{{
            "attributes":{{"POSITION":0,"TEXCOORD_0":1}},"indices":2,"material":0,
            "extensions":{{"KHR_draco_mesh_compression":{{"bufferView":0,"attributes":{{"POSITION":0,"TEXCOORD_0":1}}}}}}}}]}}],
        "materials":[{{"name":"Paint"}}],
        "buffers":[{{"byteLength":{bin_len}}}],
        "bufferViews":[{{"buffer":0,"byteOffset":0,"byteLength":{bin_len}}}],
        "accessors":[
            {{"componentType":5126,"count":3,"type":"VEC3","min":[0.0,0.0,0.0],"max":[1.0,1.0,0.0]}},
            {{"componentType":5126,"count":3,"type":"VEC2"}},
            {{"componentType":5123,"count":3,"type":"SCALAR"}}]}}"#
    );
    glb(json, bin)
}

/// A 2x2 image of one colour in `format`.
pub fn solid_image(format: ImageFormat, rgba: [u8; 4]) -> Result<Vec<u8>, AssetError> {
    let image = RgbaImage::from_pixel(2, 2, Rgba(rgba));
    let mut out = Cursor::new(Vec::new());
    image.write_to(&mut out, format)?;
    Ok(out.into_inner())
}

fn push_floats<'a>(bin: &mut Vec<u8>, values: impl Iterator<Item = &'a f32>) {
    for v in values {
        bin.extend_from_slice(&v.to_le_bytes());
    }
}

fn pad(bytes: &mut Vec<u8>, fill: u8) {
    while bytes.len() % 4 != 0 {
        bytes.push(fill);
    }
}

fn json_list(items: &[&str]) -> String {
    let quoted: Vec<String> = items.iter().map(|e| format!("\"{e}\"")).collect();
    format!("[{}]", quoted.join(","))
}

/// Wrap a JSON chunk and a binary chunk into a GLB container.
fn glb(json: String, mut bin: Vec<u8>) -> Vec<u8> {
    let mut json = json.into_bytes();
    pad(&mut json, b' ');
    pad(&mut bin, 0);

    let total = 12 + 8 + json.len() + 8 + bin.len();
    let mut glb = Vec::with_capacity(total);
    glb.extend_from_slice(b"glTF");
    glb.extend_from_slice(&2u32.to_le_bytes());
    glb.extend_from_slice(&(total as u32).to_le_bytes());
    glb.extend_from_slice(&(json.len() as u32).to_le_bytes());
    glb.extend_from_slice(b"JSON");
    glb.extend_from_slice(&json);
    glb.extend_from_slice(&(bin.len() as u32).to_le_bytes());
    glb.extend_from_slice(b"BIN\0");
    glb.extend_from_slice(&bin);
    glb
}

/// A uniform Radiance HDR panorama.
pub fn uniform_hdr(width: usize, height: usize, color: [f32; 3]) -> Result<Vec<u8>, AssetError> {
    let pixels = vec![Rgb(color); width * height];
    let mut out = Vec::new();
    HdrEncoder::new(&mut out).encode(&pixels, width, height)?;
    Ok(out)
}

/// A typeface with a box `?`, a ring `O` (one hole), a curved `D` and a space.
pub fn box_typeface_json() -> String {
    r#"{
        "familyName": "Box",
        "resolution": 1000,
        "underlineThickness": 50,
        "boundingBox": { "xMin": 0, "xMax": 600, "yMin": -200, "yMax": 800 },
        "glyphs": {
            "?": { "ha": 700, "x_min": 0, "x_max": 600, "o": "m 0 0 l 600 0 l 600 700 l 0 700" },
            "O": { "ha": 700, "x_min": 0, "x_max": 600,
                   "o": "m 0 0 l 0 700 l 600 700 l 600 0 m 150 150 l 450 150 l 450 550 l 150 550" },
            "D": { "ha": 700, "x_min": 0, "x_max": 600,
                   "o": "m 0 0 l 0 700 l 300 700 q 600 350 600 700 q 300 0 600 0" },
            " ": { "ha": 300, "x_min": 0, "x_max": 0, "o": "" }
        }
    }"#
    .to_string()
}
