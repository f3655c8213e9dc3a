use glam::Vec3;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }
}

/// Indexed triangle mesh with per-vertex normals and optional texture
/// coordinates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeshGeometry {
    pub positions: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    /// Empty, or one entry per position.
    #[serde(default)]
    pub uvs: Vec<[f32; 2]>,
    pub indices: Vec<u32>,
}

impl MeshGeometry {
    pub fn new(positions: Vec<[f32; 3]>, normals: Vec<[f32; 3]>, indices: Vec<u32>) -> Self {
        Self {
            positions,
            normals,
            uvs: Vec::new(),
            indices,
        }
    }

    /// Attach texture coordinates. A set whose length does not match the
    /// positions is dropped.
    pub fn with_uvs(mut self, uvs: Vec<[f32; 2]>) -> Self {
        if uvs.len() == self.positions.len() {
            self.uvs = uvs;
        } else {
            tracing::warn!(
                uvs = uvs.len(),
                positions = self.positions.len(),
                "texture coordinates do not match vertices, dropped"
            );
        }
        self
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty() || self.indices.is_empty()
    }

    pub fn bounding_box(&self) -> Option<Aabb> {
        let mut iter = self.positions.iter().map(|p| Vec3::from_array(*p));
        let first = iter.next()?;
        let (min, max) = iter.fold((first, first), |(min, max), p| (min.min(p), max.max(p)));
        Some(Aabb { min, max })
    }

    /// Translate the vertices so the bounding-box centre sits at the origin.
    /// Returns the offset that was applied.
    pub fn center(&mut self) -> Vec3 {
        let Some(bounds) = self.bounding_box() else {
            return Vec3::ZERO;
        };
        let offset = -bounds.center();
        for p in &mut self.positions {
            *p = (Vec3::from_array(*p) + offset).to_array();
        }
        offset
    }

    /// Replace the normals with area-weighted vertex normals.
    pub fn compute_vertex_normals(&mut self) {
        let mut accum = vec![Vec3::ZERO; self.positions.len()];
        for tri in self.indices.chunks_exact(3) {
            let [a, b, c] = [tri[0] as usize, tri[1] as usize, tri[2] as usize];
            if a >= accum.len() || b >= accum.len() || c >= accum.len() {
                continue;
            }
            let pa = Vec3::from_array(self.positions[a]);
            let pb = Vec3::from_array(self.positions[b]);
            let pc = Vec3::from_array(self.positions[c]);
            let n = (pb - pa).cross(pc - pa);
            accum[a] += n;
            accum[b] += n;
            accum[c] += n;
        }
        self.normals = accum
            .into_iter()
            .map(|n| n.try_normalize().unwrap_or(Vec3::Y).to_array())
            .collect();
    }

    /// Unique undirected triangle edges, as index pairs for a line list.
    pub fn wireframe_edges(&self) -> Vec<u32> {
        let mut edges = BTreeSet::new();
        for tri in self.indices.chunks_exact(3) {
            for (a, b) in [(tri[0], tri[1]), (tri[1], tri[2]), (tri[2], tri[0])] {
                edges.insert((a.min(b), a.max(b)));
            }
        }
        edges.into_iter().flat_map(|(a, b)| [a, b]).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad() -> MeshGeometry {
        MeshGeometry::new(
            vec![
                [2.0, 2.0, 0.0],
                [4.0, 2.0, 0.0],
                [4.0, 6.0, 0.0],
                [2.0, 6.0, 0.0],
            ],
            Vec::new(),
            vec![0, 1, 2, 2, 3, 0],
        )
    }

    #[test]
    fn bounding_box_of_quad() {
        let bounds = quad().bounding_box().unwrap();
        assert_eq!(bounds.min, Vec3::new(2.0, 2.0, 0.0));
        assert_eq!(bounds.max, Vec3::new(4.0, 6.0, 0.0));
        assert!(MeshGeometry::default().bounding_box().is_none());
    }

    #[test]
    fn center_moves_bounds_to_origin() {
        let mut mesh = quad();
        let offset = mesh.center();
        assert_eq!(offset, Vec3::new(-3.0, -4.0, 0.0));
        let bounds = mesh.bounding_box().unwrap();
        assert!(bounds.center().length() < 1e-6);
    }

    #[test]
    fn vertex_normals_face_plus_z() {
        let mut mesh = quad();
        mesh.compute_vertex_normals();
        assert_eq!(mesh.normals.len(), 4);
        for n in &mesh.normals {
            assert!((Vec3::from_array(*n) - Vec3::Z).length() < 1e-5);
        }
    }

    #[test]
    fn wireframe_edges_are_deduplicated() {
        let edges = quad().wireframe_edges();
        // 4 outer edges + 1 shared diagonal
        assert_eq!(edges.len(), 5 * 2);
    }

    #[test]
    fn uvs_must_match_vertex_count() {
        let mesh = quad().with_uvs(vec![[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]]);
        assert_eq!(mesh.uvs.len(), 4);
        let mesh = quad().with_uvs(vec![[0.0, 0.0]]);
        assert!(mesh.uvs.is_empty());
    }
}
