use crate::codec::{DRACO_EXTENSION, MeshCodec};
use crate::error::AssetError;
use crate::source::AssetBytes;
use glam::{Quat, Vec3};
use gltf::json::validation::{Error as ValidationError, Validate};
use serde::Deserialize;
use showcase_common::{Rgb, Transform};
use showcase_scene::{Material, MeshGeometry, Node, TextureImage};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Texture source extension for WebP images.
const WEBP_EXTENSION: &str = "EXT_texture_webp";

/// Loads glTF / GLB containers into a scene subtree.
///
/// Buffers are resolved from the container alone. Images are decoded per
/// material and a texture that cannot be decoded only costs that texture.
/// Draco-compressed primitives go through the installed [`MeshCodec`];
/// without one, a container that requires the extension is rejected with
/// [`AssetError::CodecUnavailable`].
#[derive(Debug, Clone)]
pub struct ModelLoader {
    decoder_path: String,
    codec: Option<Arc<dyn MeshCodec>>,
}

/// `KHR_draco_mesh_compression` object on a primitive.
#[derive(Debug, Deserialize)]
struct DracoPrimitive {
    #[serde(rename = "bufferView")]
    buffer_view: usize,
    attributes: BTreeMap<String, u32>,
}

struct Import<'a> {
    document: &'a gltf::Document,
    buffers: Vec<gltf::buffer::Data>,
    codec: Option<&'a dyn MeshCodec>,
    textures: BTreeMap<usize, Option<Arc<TextureImage>>>,
}

impl ModelLoader {
    pub fn new(decoder_path: impl Into<String>) -> Self {
        Self {
            decoder_path: decoder_path.into(),
            codec: None,
        }
    }

    pub fn with_codec(mut self, codec: Arc<dyn MeshCodec>) -> Self {
        self.codec = Some(codec);
        self
    }

    pub fn decoder_path(&self) -> &str {
        &self.decoder_path
    }

    pub fn codec(&self) -> Option<&Arc<dyn MeshCodec>> {
        self.codec.as_ref()
    }

    /// Decode a container into an unnamed group holding the default scene.
    pub fn load(&self, asset: &AssetBytes) -> Result<Node, AssetError> {
        let _span = tracing::info_span!("load_model", path = %asset.path).entered();

        let gltf::Gltf { document, blob } = parse(&asset.bytes)?;
        let compressed = document
            .as_json()
            .extensions_used
            .iter()
            .any(|ext| ext == DRACO_EXTENSION);
        let codec = self
            .codec
            .as_deref()
            .filter(|c| compressed && c.extension() == DRACO_EXTENSION);
        let required = document
            .as_json()
            .extensions_required
            .iter()
            .any(|ext| ext == DRACO_EXTENSION);
        if required && codec.is_none() {
            return Err(AssetError::CodecUnavailable {
                extension: DRACO_EXTENSION.to_string(),
                decoder_path: self.decoder_path.clone(),
            });
        }

        let mut import = Import {
            document: &document,
            buffers: gltf::import_buffers(&document, None, blob)?,
            codec,
            textures: BTreeMap::new(),
        };

        let scene = document
            .default_scene()
            .or_else(|| document.scenes().next())
            .ok_or(AssetError::EmptyModel)?;

        let mut root = Node::group();
        for node in scene.nodes() {
            root.add_child(import.node(&node)?);
        }

        let mut meshes = 0usize;
        let mut textured = 0usize;
        root.traverse(&mut |n| {
            if let Some(material) = n.material() {
                meshes += 1;
                textured += usize::from(material.base_color_texture.is_some());
            }
        });
        if meshes == 0 {
            return Err(AssetError::EmptyModel);
        }

        tracing::info!(
            nodes = root.subtree_len(),
            meshes,
            textured,
            digest = %format!("{:#018x}", asset.digest),
            "model decoded"
        );
        Ok(root)
    }
}

/// Parse without touching images, tolerating only what Draco needs: the
/// required extension and accessors whose data lives in the compressed
/// stream.
fn parse(bytes: &[u8]) -> Result<gltf::Gltf, AssetError> {
    let gltf = gltf::Gltf::from_slice_without_validation(bytes)?;
    let root = gltf.document.as_json();

    let mut errors = Vec::new();
    let mut unbacked = Vec::new();
    root.validate(root, gltf::json::Path::new, &mut |path, error| {
        let path = path();
        match error {
            ValidationError::Unsupported if path.as_str().contains(DRACO_EXTENSION) => {}
            ValidationError::Missing if path.as_str().ends_with(".bufferView") => {
                unbacked.push(path)
            }
            _ => errors.push((path, error)),
        }
    });
    if !errors.is_empty() {
        return Err(gltf::Error::Validation(errors).into());
    }

    if !unbacked.is_empty() {
        let draco = draco_accessors(&gltf.document);
        let stray: Vec<_> = unbacked
            .into_iter()
            .filter(|path| {
                accessor_index(path.as_str()).is_none_or(|index| !draco.contains(&index))
            })
            .map(|path| (path, ValidationError::Missing))
            .collect();
        if !stray.is_empty() {
            return Err(gltf::Error::Validation(stray).into());
        }
    }
    Ok(gltf)
}

/// Accessors referenced by Draco-compressed primitives.
fn draco_accessors(document: &gltf::Document) -> BTreeSet<usize> {
    let mut out = BTreeSet::new();
    for primitive in document.meshes().flat_map(|m| m.primitives()) {
        if primitive.extension_value(DRACO_EXTENSION).is_none() {
            continue;
        }
        out.extend(primitive.attributes().map(|(_, a)| a.index()));
        out.extend(primitive.indices().map(|a| a.index()));
    }
    out
}

/// `accessors[N].bufferView` → `N`.
fn accessor_index(path: &str) -> Option<usize> {
    path.strip_prefix("accessors[")?
        .strip_suffix("].bufferView")?
        .parse()
        .ok()
}

impl<'a> Import<'a> {
    fn node(&mut self, node: &gltf::Node<'_>) -> Result<Node, AssetError> {
        let (translation, rotation, scale) = node.transform().decomposed();
        let transform = Transform {
            position: Vec3::from_array(translation),
            rotation: Quat::from_array(rotation),
            scale: Vec3::from_array(scale),
        };

        let mut primitives = Vec::new();
        if let Some(mesh) = node.mesh() {
            for primitive in mesh.primitives() {
                if let Some(node) = self.primitive(&primitive)? {
                    primitives.push(node);
                }
            }
        }

        // A single primitive becomes the node itself; several become children.
        let mut out = if primitives.len() == 1 {
            primitives.remove(0)
        } else {
            let mut group = Node::group();
            group.children.extend(primitives);
            group
        };
        out.name = node.name().unwrap_or_default().to_string();
        out.transform = transform;

        for child in node.children() {
            out.add_child(self.node(&child)?);
        }
        Ok(out)
    }

    fn primitive(&mut self, primitive: &gltf::Primitive<'_>) -> Result<Option<Node>, AssetError> {
        if primitive.mode() != gltf::mesh::Mode::Triangles {
            tracing::warn!(mode = ?primitive.mode(), "skipping non-triangle primitive");
            return Ok(None);
        }

        let material = primitive.material();
        let uv_set = material
            .pbr_metallic_roughness()
            .base_color_texture()
            .map_or(0, |info| info.tex_coord());

        let geometry = match primitive.extension_value(DRACO_EXTENSION) {
            Some(value) => match self.codec {
                Some(codec) => self.draco_geometry(codec, value, uv_set)?,
                None => {
                    tracing::warn!("skipping compressed primitive, no codec installed");
                    return Ok(None);
                }
            },
            None => {
                let Some(geometry) = self.plain_geometry(primitive, uv_set) else {
                    return Ok(None);
                };
                geometry
            }
        };

        let mut material = convert_material(&material);
        if let Some(texture) = self.base_color_texture(&primitive.material()) {
            if geometry.uvs.is_empty() {
                tracing::debug!(material = %material.name, "texture ignored, primitive has no UVs");
            } else {
                material.base_color_texture = Some(texture);
            }
        }
        Ok(Some(Node::mesh(geometry, material)))
    }

    fn plain_geometry(&self, primitive: &gltf::Primitive<'_>, uv_set: u32) -> Option<MeshGeometry> {
        let reader = primitive
            .reader(|buffer| self.buffers.get(buffer.index()).map(|d| d.0.as_slice()));
        let positions: Vec<[f32; 3]> = reader.read_positions()?.collect();
        let indices: Vec<u32> = match reader.read_indices() {
            Some(indices) => indices.into_u32().collect(),
            None => (0..positions.len() as u32).collect(),
        };
        let normals: Vec<[f32; 3]> = reader
            .read_normals()
            .map(|n| n.collect())
            .unwrap_or_default();
        let uvs: Vec<[f32; 2]> = reader
            .read_tex_coords(uv_set)
            .map(|t| t.into_f32().collect())
            .unwrap_or_default();
        Some(finish_geometry(positions, normals, uvs, indices))
    }

    fn draco_geometry(
        &self,
        codec: &dyn MeshCodec,
        value: &serde_json::Value,
        uv_set: u32,
    ) -> Result<MeshGeometry, AssetError> {
        let invalid = |reason: String| AssetError::InvalidExtension {
            extension: DRACO_EXTENSION.to_string(),
            reason,
        };
        let ext = DracoPrimitive::deserialize(value).map_err(|e| invalid(e.to_string()))?;
        let position_id = *ext
            .attributes
            .get("POSITION")
            .ok_or_else(|| invalid("no POSITION attribute".into()))?;
        let normal_id = ext.attributes.get("NORMAL").copied();
        let uv_id = ext.attributes.get(&format!("TEXCOORD_{uv_set}")).copied();

        let compressed = self.view_bytes(ext.buffer_view).ok_or_else(|| {
            invalid(format!("bufferView {} is out of range", ext.buffer_view))
        })?;
        let ids: Vec<u32> = [Some(position_id), normal_id, uv_id]
            .into_iter()
            .flatten()
            .collect();
        tracing::debug!(bytes = compressed.len(), ?ids, "decoding compressed primitive");
        let decoded = codec.decode(compressed, &ids)?;

        let positions = decoded.attribute::<3>(position_id)?;
        let normals = normal_id
            .map(|id| decoded.attribute::<3>(id))
            .transpose()?
            .unwrap_or_default();
        let uvs = uv_id
            .map(|id| decoded.attribute::<2>(id))
            .transpose()?
            .unwrap_or_default();
        if let Some(bad) = decoded.indices.iter().find(|&&i| i as usize >= positions.len()) {
            return Err(AssetError::Codec(format!(
                "index {bad} out of range for {} vertices",
                positions.len()
            )));
        }
        Ok(finish_geometry(positions, normals, uvs, decoded.indices))
    }

    fn view_bytes(&self, index: usize) -> Option<&[u8]> {
        let view = self.document.views().nth(index)?;
        let data = self.buffers.get(view.buffer().index())?;
        data.0.get(view.offset()..view.offset().checked_add(view.length())?)
    }

    /// Decoded base colour texture of a material, cached per image.
    fn base_color_texture(&mut self, material: &gltf::Material<'_>) -> Option<Arc<TextureImage>> {
        let info = material.pbr_metallic_roughness().base_color_texture()?;
        let image = self.texture_image(&info.texture())?;
        let index = image.index();
        if let Some(cached) = self.textures.get(&index) {
            return cached.clone();
        }
        let decoded = self.decode_image(&image).map(Arc::new);
        self.textures.insert(index, decoded.clone());
        decoded
    }

    /// The image a texture samples, following `EXT_texture_webp` when the
    /// texture has no core source.
    fn texture_image(&self, texture: &gltf::Texture<'_>) -> Option<gltf::Image<'a>> {
        if let Some(image) = texture.source() {
            return self.document.images().nth(image.index());
        }
        let index = texture
            .extension_value(WEBP_EXTENSION)?
            .get("source")?
            .as_u64()?;
        self.document.images().nth(index as usize)
    }

    fn decode_image(&self, image: &gltf::Image<'_>) -> Option<TextureImage> {
        let name = image.name().unwrap_or_default().to_string();
        let (bytes, mime_type) = match image.source() {
            gltf::image::Source::View { view, mime_type } => {
                let data = self.buffers.get(view.buffer().index())?;
                let end = view.offset().checked_add(view.length())?;
                (data.0.get(view.offset()..end), mime_type.to_string())
            }
            gltf::image::Source::Uri { uri, .. } => {
                tracing::warn!(image = image.index(), %uri, "external image URIs are not resolved");
                return None;
            }
        };
        let Some(bytes) = bytes else {
            tracing::warn!(image = image.index(), "image bufferView is out of range");
            return None;
        };
        match ::image::load_from_memory(bytes) {
            Ok(decoded) => {
                let rgba = decoded.to_rgba8();
                let (width, height) = rgba.dimensions();
                tracing::debug!(image = image.index(), %mime_type, width, height, "texture decoded");
                Some(TextureImage::new(name, width, height, rgba.into_raw()))
            }
            Err(error) => {
                tracing::warn!(image = image.index(), %mime_type, %error, "texture skipped");
                None
            }
        }
    }
}

fn finish_geometry(
    positions: Vec<[f32; 3]>,
    normals: Vec<[f32; 3]>,
    uvs: Vec<[f32; 2]>,
    indices: Vec<u32>,
) -> MeshGeometry {
    let count = positions.len();
    let mut geometry = MeshGeometry::new(positions, normals, indices);
    if geometry.normals.len() != count {
        geometry.compute_vertex_normals();
    }
    if !uvs.is_empty() {
        geometry = geometry.with_uvs(uvs);
    }
    geometry
}

fn convert_material(material: &gltf::Material<'_>) -> Material {
    let pbr = material.pbr_metallic_roughness();
    let [r, g, b, _a] = pbr.base_color_factor();
    Material {
        name: material.name().unwrap_or("default").to_string(),
        color: Rgb::from_linear([r, g, b]),
        metalness: pbr.metallic_factor().clamp(0.0, 1.0),
        roughness: pbr.roughness_factor().clamp(0.0, 1.0),
        ..Material::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{DecodedAttribute, DecodedMesh};
    use crate::fixtures::{
        TextureRef, draco_triangle_glb, solid_image, textured_triangle_glb, triangle_glb,
    };
    use image::ImageFormat;
    use showcase_scene::NodeKind;
    use std::sync::Mutex;

    /// Decodes the fixture payload `[n]` into an `n`-unit triangle with UVs.
    #[derive(Debug, Default)]
    struct ScriptedDraco {
        calls: Mutex<Vec<(Vec<u8>, Vec<u32>)>>,
    }

    impl MeshCodec for ScriptedDraco {
        fn extension(&self) -> &str {
            DRACO_EXTENSION
        }

        fn decode(&self, compressed: &[u8], attributes: &[u32]) -> Result<DecodedMesh, AssetError> {
            self.calls
                .lock()
                .unwrap()
                .push((compressed.to_vec(), attributes.to_vec()));
            let s = f32::from(compressed[0]);
            let mut mesh = DecodedMesh {
                indices: vec![0, 1, 2],
                ..DecodedMesh::default()
            };
            mesh.attributes.insert(
                0,
                DecodedAttribute {
                    components: 3,
                    values: vec![0.0, 0.0, 0.0, s, 0.0, 0.0, 0.0, s, 0.0],
                },
            );
            mesh.attributes.insert(
                1,
                DecodedAttribute {
                    components: 2,
                    values: vec![0.0, 0.0, 1.0, 0.0, 0.0, 1.0],
                },
            );
            Ok(mesh)
        }
    }

    fn geometry(node: &Node) -> &MeshGeometry {
        match &node.kind {
            NodeKind::Mesh { geometry, .. } => geometry,
            _ => panic!("expected mesh node"),
        }
    }

    #[test]
    fn loads_plain_glb() {
        let loader = ModelLoader::new("decoders/");
        let root = loader
            .load(&AssetBytes::new("model.glb", triangle_glb(&[])))
            .unwrap();

        assert_eq!(root.children.len(), 1);
        let body = &root.children[0];
        assert_eq!(body.name, "Body");
        assert_eq!(body.transform.position, Vec3::X);

        let material = body.material().unwrap();
        assert_eq!(material.name, "Paint");
        assert_eq!(material.color, Rgb::from_hex(0xff0000));
        assert_eq!(material.metalness, 0.5);
        assert_eq!(material.roughness, 0.25);
        assert!(material.base_color_texture.is_none());

        let geometry = geometry(body);
        assert_eq!(geometry.triangle_count(), 1);
        assert_eq!(geometry.normals.len(), 3, "normals generated when absent");
        assert!(geometry.uvs.is_empty());
    }

    #[test]
    fn png_base_color_texture_is_decoded() {
        let png = solid_image(ImageFormat::Png, [0, 255, 0, 255]).unwrap();
        let glb = textured_triangle_glb(&png, "image/png", TextureRef::Source);
        let root = ModelLoader::new("decoders/")
            .load(&AssetBytes::new("model.glb", glb))
            .unwrap();

        let body = &root.children[0];
        let texture = body.material().unwrap().base_color_texture.as_ref().unwrap();
        assert_eq!((texture.width, texture.height), (2, 2));
        assert!(texture.is_valid());
        assert_eq!(&texture.pixels[..4], &[0, 255, 0, 255]);
        assert_eq!(geometry(body).uvs, vec![[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]]);
    }

    #[test]
    fn webp_only_texture_is_decoded() {
        let webp = solid_image(ImageFormat::WebP, [0, 0, 255, 255]).unwrap();
        let glb = textured_triangle_glb(&webp, "image/webp", TextureRef::WebpExtension);
        let root = ModelLoader::new("decoders/")
            .load(&AssetBytes::new("model.glb", glb))
            .unwrap();

        let texture = root.children[0].material().unwrap().base_color_texture.clone();
        assert_eq!(&texture.unwrap().pixels[..4], &[0, 0, 255, 255]);
    }

    #[test]
    fn undecodable_texture_keeps_the_model() {
        let glb = textured_triangle_glb(b"not an image", "image/ktx2", TextureRef::Source);
        let root = ModelLoader::new("decoders/")
            .load(&AssetBytes::new("model.glb", glb))
            .unwrap();

        let material = root.children[0].material().unwrap();
        assert_eq!(material.name, "Paint");
        assert!(material.base_color_texture.is_none());
    }

    #[test]
    fn compressed_model_without_codec_is_rejected() {
        let loader = ModelLoader::new("https://decoders.example/draco/");
        let err = loader
            .load(&AssetBytes::new("model.glb", draco_triangle_glb(&[4])))
            .unwrap_err();
        match err {
            AssetError::CodecUnavailable {
                extension,
                decoder_path,
            } => {
                assert_eq!(extension, DRACO_EXTENSION);
                assert_eq!(decoder_path, "https://decoders.example/draco/");
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn compressed_primitive_goes_through_codec() {
        let codec = Arc::new(ScriptedDraco::default());
        let loader = ModelLoader::new("decoders/").with_codec(codec.clone());
        let root = loader
            .load(&AssetBytes::new("model.glb", draco_triangle_glb(&[4])))
            .unwrap();

        let body = &root.children[0];
        assert_eq!(body.name, "Body");
        let geometry = geometry(body);
        assert_eq!(geometry.positions[1], [4.0, 0.0, 0.0]);
        assert_eq!(geometry.indices, vec![0, 1, 2]);
        assert_eq!(geometry.normals.len(), 3, "normals generated when not encoded");
        assert_eq!(geometry.uvs.len(), 3);

        let calls = codec.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0], (vec![4], vec![0, 1]));
    }

    #[test]
    fn codec_indices_out_of_range_are_rejected() {
        #[derive(Debug)]
        struct Dangling;
        impl MeshCodec for Dangling {
            fn extension(&self) -> &str {
                DRACO_EXTENSION
            }
            fn decode(&self, bytes: &[u8], ids: &[u32]) -> Result<DecodedMesh, AssetError> {
                let mut mesh = ScriptedDraco::default().decode(bytes, ids)?;
                mesh.indices = vec![0, 1, 9];
                Ok(mesh)
            }
        }

        let loader = ModelLoader::new("decoders/").with_codec(Arc::new(Dangling));
        let err = loader
            .load(&AssetBytes::new("model.glb", draco_triangle_glb(&[1])))
            .unwrap_err();
        assert!(matches!(err, AssetError::Codec(msg) if msg.contains("index 9")));
    }

    #[test]
    fn unbacked_accessor_outside_draco_is_rejected() {
        let mut glb = triangle_glb(&[]);
        // Blank out `"bufferView":1` on the index accessor.
        let at = glb
            .windows(14)
            .rposition(|w| w == b"\"bufferView\":1")
            .unwrap();
        glb[at..at + 14].copy_from_slice(b"\"byteOffset\":0");
        let err = ModelLoader::new("decoders/")
            .load(&AssetBytes::new("model.glb", glb))
            .unwrap_err();
        assert!(matches!(err, AssetError::Gltf(_)));
    }

    #[test]
    fn truncated_container_is_gltf_error() {
        let loader = ModelLoader::new("decoders/");
        let err = loader
            .load(&AssetBytes::new("model.glb", b"glTF\x02\0\0\0".to_vec()))
            .unwrap_err();
        assert!(matches!(err, AssetError::Gltf(_)));
    }
}
