use crate::geometry::MeshGeometry;
use crate::texture::TextureImage;
use glam::Mat4;
use serde::{Deserialize, Serialize};
use showcase_common::{NodeId, Rgb, Transform};
use std::sync::Arc;

/// Physically based surface description (metallic-roughness).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Material {
    pub name: String,
    pub color: Rgb,
    pub metalness: f32,
    pub roughness: f32,
    /// Scale applied to reflections sampled from the scene environment.
    pub env_map_intensity: f32,
    pub wireframe: bool,
    /// Multiplied into `color`; sampled with the mesh's first UV set.
    #[serde(skip)]
    pub base_color_texture: Option<Arc<TextureImage>>,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            name: "default".into(),
            color: Rgb::WHITE,
            metalness: 0.0,
            roughness: 1.0,
            env_map_intensity: 1.0,
            wireframe: false,
            base_color_texture: None,
        }
    }
}

impl Material {
    /// Standard material; metalness and roughness are clamped to `[0, 1]`.
    pub fn standard(color: Rgb, roughness: f32, metalness: f32) -> Self {
        Self {
            color,
            roughness: roughness.clamp(0.0, 1.0),
            metalness: metalness.clamp(0.0, 1.0),
            ..Self::default()
        }
    }
}

/// Uniform light applied to every surface; never casts shadows.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AmbientLight {
    pub color: Rgb,
    pub intensity: f32,
}

impl Default for AmbientLight {
    fn default() -> Self {
        Self {
            color: Rgb::WHITE,
            intensity: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Group,
    Mesh {
        geometry: Arc<MeshGeometry>,
        material: Material,
    },
    AmbientLight(AmbientLight),
}

/// A scene graph node and its subtree.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: NodeId,
    pub name: String,
    pub transform: Transform,
    pub kind: NodeKind,
    pub cast_shadow: bool,
    pub receive_shadow: bool,
    pub children: Vec<Node>,
}

impl Node {
    pub fn new(kind: NodeKind) -> Self {
        Self {
            id: NodeId::new(),
            name: String::new(),
            transform: Transform::default(),
            kind,
            cast_shadow: false,
            receive_shadow: false,
            children: Vec::new(),
        }
    }

    pub fn group() -> Self {
        Self::new(NodeKind::Group)
    }

    pub fn mesh(geometry: impl Into<Arc<MeshGeometry>>, material: Material) -> Self {
        Self::new(NodeKind::Mesh {
            geometry: geometry.into(),
            material,
        })
    }

    pub fn ambient_light(light: AmbientLight) -> Self {
        Self::new(NodeKind::AmbientLight(light))
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    pub fn add_child(&mut self, child: Node) {
        self.children.push(child);
    }

    pub fn material(&self) -> Option<&Material> {
        match &self.kind {
            NodeKind::Mesh { material, .. } => Some(material),
            _ => None,
        }
    }

    pub fn material_mut(&mut self) -> Option<&mut Material> {
        match &mut self.kind {
            NodeKind::Mesh { material, .. } => Some(material),
            _ => None,
        }
    }

    /// Depth-first, parent before children.
    pub fn traverse(&self, f: &mut impl FnMut(&Node)) {
        f(self);
        for child in &self.children {
            child.traverse(f);
        }
    }

    pub fn traverse_mut(&mut self, f: &mut impl FnMut(&mut Node)) {
        f(self);
        for child in &mut self.children {
            child.traverse_mut(f);
        }
    }

    /// Visit every node with its world matrix, given the parent's world matrix.
    pub fn traverse_world(&self, parent: Mat4, f: &mut impl FnMut(&Node, Mat4)) {
        let world = parent * self.transform.to_matrix();
        f(self, world);
        for child in &self.children {
            child.traverse_world(world, f);
        }
    }

    /// Number of nodes in this subtree, including self.
    pub fn subtree_len(&self) -> usize {
        1 + self.children.iter().map(Node::subtree_len).sum::<usize>()
    }

    /// Enable shadow casting and receiving on this node and on every
    /// descendant that carries a material, and set their reflection intensity.
    pub fn prepare_for_showcase(&mut self, env_map_intensity: f32) {
        self.cast_shadow = true;
        self.receive_shadow = true;
        self.traverse_mut(&mut |child| {
            if let Some(material) = child.material_mut() {
                material.env_map_intensity = env_map_intensity;
                child.cast_shadow = true;
                child.receive_shadow = true;
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    fn tree() -> Node {
        let mut root = Node::group().with_name("root");
        let mut arm = Node::group().with_name("arm");
        arm.add_child(Node::mesh(MeshGeometry::default(), Material::default()).with_name("hand"));
        root.add_child(arm);
        root.add_child(Node::mesh(MeshGeometry::default(), Material::default()).with_name("body"));
        root
    }

    #[test]
    fn traverse_visits_parent_first() {
        let mut names = Vec::new();
        tree().traverse(&mut |n| names.push(n.name.clone()));
        assert_eq!(names, ["root", "arm", "hand", "body"]);
        assert_eq!(tree().subtree_len(), 4);
    }

    #[test]
    fn showcase_preparation_touches_only_materials() {
        let mut root = tree();
        root.prepare_for_showcase(2.5);
        assert!(root.cast_shadow && root.receive_shadow);

        let mut seen = Vec::new();
        root.traverse(&mut |n| seen.push((n.name.clone(), n.cast_shadow, n.material().cloned())));
        let arm = seen.iter().find(|(name, ..)| name == "arm").unwrap();
        assert!(!arm.1, "groups without material keep their flags");
        for (name, cast, material) in &seen {
            if let Some(m) = material {
                assert!(*cast, "{name} should cast shadows");
                assert_eq!(m.env_map_intensity, 2.5);
            }
        }
    }

    #[test]
    fn world_matrices_compose() {
        let mut root = Node::group().with_transform(Transform::from_position(Vec3::X));
        root.add_child(Node::group().with_transform(Transform::from_position(Vec3::Y)));
        let mut positions = Vec::new();
        root.traverse_world(Mat4::IDENTITY, &mut |_, world| {
            positions.push(world.transform_point3(Vec3::ZERO));
        });
        assert_eq!(positions, [Vec3::X, Vec3::X + Vec3::Y]);
    }

    #[test]
    fn standard_material_clamps() {
        let m = Material::standard(Rgb::from_hex(0xa4eeea), 2.0, 1.0);
        assert_eq!(m.roughness, 1.0);
        assert_eq!(m.metalness, 1.0);
    }
}
