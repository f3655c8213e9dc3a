use crate::error::AssetError;
use crate::font::Font;
use glam::{Vec2, Vec3};
use lyon_path::Path;
use lyon_path::math::point;
use lyon_tessellation::{
    BuffersBuilder, FillOptions, FillRule, FillTessellator, FillVertex, VertexBuffers,
};
use serde::{Deserialize, Serialize};
use showcase_scene::MeshGeometry;
use std::f32::consts::FRAC_PI_2;

/// Shape parameters for extruded text.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextOptions {
    /// Em size in scene units.
    pub size: f32,
    /// Extrusion depth of the body, excluding bevels.
    pub depth: f32,
    pub curve_segments: u32,
    pub bevel_enabled: bool,
    pub bevel_thickness: f32,
    pub bevel_size: f32,
    pub bevel_offset: f32,
    pub bevel_segments: u32,
}

impl Default for TextOptions {
    fn default() -> Self {
        Self {
            size: 0.5,
            depth: 0.2,
            curve_segments: 12,
            bevel_enabled: true,
            bevel_thickness: 0.03,
            bevel_size: 0.02,
            bevel_offset: 0.0,
            bevel_segments: 5,
        }
    }
}

impl TextOptions {
    /// Cross-section rings as `(z, outward offset)`, front to back.
    fn rings(&self) -> Vec<(f32, f32)> {
        if !self.bevel_enabled {
            return vec![(0.0, 0.0), (self.depth, 0.0)];
        }
        let segments = self.bevel_segments.max(1);
        let bevel = |b: u32| {
            let t = b as f32 / segments as f32;
            (
                self.bevel_thickness * (t * FRAC_PI_2).cos(),
                self.bevel_size * (t * FRAC_PI_2).sin() + self.bevel_offset,
            )
        };

        let mut rings = Vec::with_capacity(2 * segments as usize + 2);
        for b in 0..segments {
            let (dz, off) = bevel(b);
            rings.push((-dz, off));
        }
        let body = self.bevel_size + self.bevel_offset;
        rings.push((0.0, body));
        rings.push((self.depth, body));
        for b in (0..segments).rev() {
            let (dz, off) = bevel(b);
            rings.push((self.depth + dz, off));
        }
        rings
    }
}

/// Extrude `text` into a closed, bevelled mesh centred on the origin.
///
/// Front and back caps face -Z and +Z. Side walls are flat shaded so bevel
/// facets stay crisp.
pub fn build_text_geometry(
    font: &Font,
    text: &str,
    options: &TextOptions,
) -> Result<MeshGeometry, AssetError> {
    let _span = tracing::info_span!("build_text", text = %text, family = %font.family).entered();
    let rings = options.rings();
    let mut mesh = MeshBuilder::default();

    for glyph in font.layout(text, options.size) {
        let contours = orient(glyph.contours(options.curve_segments));
        if contours.is_empty() {
            continue;
        }
        let miters: Vec<Vec<Vec2>> = contours.iter().map(|c| miter_vectors(c)).collect();
        let offset_ring = |off: f32| -> Vec<Vec<Vec2>> {
            contours
                .iter()
                .zip(&miters)
                .map(|(c, m)| c.iter().zip(m).map(|(p, m)| *p + *m * off).collect())
                .collect()
        };

        let (front_z, front_off) = rings[0];
        let (back_z, back_off) = rings[rings.len() - 1];
        mesh.cap(&offset_ring(front_off), front_z, -1.0)?;
        mesh.cap(&offset_ring(back_off), back_z, 1.0)?;

        for pair in rings.windows(2) {
            let (z0, off0) = pair[0];
            let (z1, off1) = pair[1];
            let near = offset_ring(off0);
            let far = offset_ring(off1);
            for (a, b) in near.iter().zip(&far) {
                mesh.wall(a, z0, b, z1);
            }
        }
    }

    if mesh.indices.is_empty() {
        return Err(AssetError::EmptyText(text.to_string()));
    }

    let mut geometry = MeshGeometry::new(mesh.positions, mesh.normals, mesh.indices);
    let shift = geometry.center();
    tracing::info!(
        vertices = geometry.vertex_count(),
        triangles = geometry.triangle_count(),
        shift = ?shift,
        "text geometry built"
    );
    Ok(geometry)
}

#[derive(Default)]
struct MeshBuilder {
    positions: Vec<[f32; 3]>,
    normals: Vec<[f32; 3]>,
    indices: Vec<u32>,
}

impl MeshBuilder {
    fn vertex(&mut self, p: Vec3, n: Vec3) -> u32 {
        let index = self.positions.len() as u32;
        self.positions.push(p.to_array());
        self.normals.push(n.to_array());
        index
    }

    /// Tessellate one glyph's contours at `z`, wound to face `facing` * Z.
    fn cap(&mut self, contours: &[Vec<Vec2>], z: f32, facing: f32) -> Result<(), AssetError> {
        let mut builder = Path::builder();
        for contour in contours {
            builder.begin(point(contour[0].x, contour[0].y));
            for p in &contour[1..] {
                builder.line_to(point(p.x, p.y));
            }
            builder.end(true);
        }
        let path = builder.build();

        let mut buffers: VertexBuffers<Vec2, u32> = VertexBuffers::new();
        FillTessellator::new()
            .tessellate_path(
                &path,
                &FillOptions::default().with_fill_rule(FillRule::NonZero),
                &mut BuffersBuilder::new(&mut buffers, |v: FillVertex| {
                    Vec2::new(v.position().x, v.position().y)
                }),
            )
            .map_err(|e| AssetError::Tessellation(format!("{e:?}")))?;

        let normal = Vec3::Z * facing;
        let base = self.positions.len() as u32;
        for v in &buffers.vertices {
            self.vertex(v.extend(z), normal);
        }
        for tri in buffers.indices.chunks_exact(3) {
            let [a, b, c] = [tri[0], tri[1], tri[2]];
            let pa = buffers.vertices[a as usize];
            let winding = (buffers.vertices[b as usize] - pa)
                .perp_dot(buffers.vertices[c as usize] - pa);
            if winding * facing >= 0.0 {
                self.indices.extend([base + a, base + b, base + c]);
            } else {
                self.indices.extend([base + a, base + c, base + b]);
            }
        }
        Ok(())
    }

    /// One band of flat-shaded quads between two rings of the same contour.
    fn wall(&mut self, near: &[Vec2], z0: f32, far: &[Vec2], z1: f32) {
        let n = near.len();
        for i in 0..n {
            let j = (i + 1) % n;
            let a = near[i].extend(z0);
            let b = near[j].extend(z0);
            let c = far[j].extend(z1);
            let d = far[i].extend(z1);
            let normal = (c - a).cross(d - b);
            if normal.length_squared() < 1e-14 {
                continue;
            }
            let normal = normal.normalize();
            let [ia, ib, ic, id] = [a, b, c, d].map(|p| self.vertex(p, normal));
            self.indices.extend([ia, ib, id, ib, ic, id]);
        }
    }
}

fn signed_area(contour: &[Vec2]) -> f32 {
    let n = contour.len();
    (0..n)
        .map(|i| contour[i].perp_dot(contour[(i + 1) % n]))
        .sum::<f32>()
        * 0.5
}

fn contains(contour: &[Vec2], p: Vec2) -> bool {
    let mut inside = false;
    let mut j = contour.len() - 1;
    for i in 0..contour.len() {
        let (a, b) = (contour[i], contour[j]);
        if (a.y > p.y) != (b.y > p.y) && p.x < (b.x - a.x) * (p.y - a.y) / (b.y - a.y) + a.x {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// Drop repeated points, then wind solids counter-clockwise and holes
/// clockwise. A contour nested inside an odd number of others is a hole.
fn orient(contours: Vec<Vec<Vec2>>) -> Vec<Vec<Vec2>> {
    let cleaned: Vec<Vec<Vec2>> = contours
        .into_iter()
        .map(|mut c| {
            c.dedup_by(|a, b| a.distance_squared(*b) < 1e-12);
            while c.len() > 1 && c[0].distance_squared(c[c.len() - 1]) < 1e-12 {
                c.pop();
            }
            c
        })
        .filter(|c| c.len() >= 3 && signed_area(c).abs() > 1e-12)
        .collect();

    cleaned
        .iter()
        .enumerate()
        .map(|(i, contour)| {
            let depth = cleaned
                .iter()
                .enumerate()
                .filter(|(j, other)| *j != i && contains(other, contour[0]))
                .count();
            let hole = depth % 2 == 1;
            let ccw = signed_area(contour) > 0.0;
            let mut out = contour.clone();
            if ccw == hole {
                out.reverse();
            }
            out
        })
        .collect()
}

/// Per-vertex offset directions. Moving a vertex by `m * d` shifts both
/// adjacent edges outward by `d`. Sharp spikes are clamped.
fn miter_vectors(contour: &[Vec2]) -> Vec<Vec2> {
    let n = contour.len();
    let edge_normal = |i: usize| {
        let d = (contour[(i + 1) % n] - contour[i]).normalize_or_zero();
        Vec2::new(d.y, -d.x)
    };
    (0..n)
        .map(|i| {
            let prev = edge_normal((i + n - 1) % n);
            let next = edge_normal(i);
            let sum = prev + next;
            if sum.length_squared() < 1e-6 {
                return next;
            }
            let dir = sum.normalize();
            dir / dir.dot(next).max(0.25)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::box_typeface_json;

    fn font() -> Font {
        Font::from_json(box_typeface_json().as_bytes()).unwrap()
    }

    fn flat() -> TextOptions {
        TextOptions {
            size: 1.0,
            bevel_enabled: false,
            ..TextOptions::default()
        }
    }

    fn assert_consistent_winding(geometry: &MeshGeometry) {
        for tri in geometry.indices.chunks_exact(3) {
            let [a, b, c] = [0, 1, 2].map(|k| Vec3::from_array(geometry.positions[tri[k] as usize]));
            let n = Vec3::from_array(geometry.normals[tri[0] as usize]);
            let face = (b - a).cross(c - a);
            if face.length_squared() > 1e-12 {
                assert!(face.dot(n) > 0.0, "triangle wound against its normal");
            }
        }
    }

    #[test]
    fn flat_box_glyph_is_a_closed_prism() {
        let geometry = build_text_geometry(&font(), "?", &flat()).unwrap();
        // two triangles per cap, one quad per side
        assert_eq!(geometry.triangle_count(), 2 + 2 + 4 * 2);

        let bounds = geometry.bounding_box().unwrap();
        assert!(bounds.center().length() < 1e-5, "centred on the origin");
        let size = bounds.size();
        assert!((size - Vec3::new(0.6, 0.7, 0.2)).length() < 1e-5, "{size:?}");
        assert_consistent_winding(&geometry);
    }

    #[test]
    fn bevel_widens_and_thickens() {
        let options = TextOptions::default();
        let geometry = build_text_geometry(&font(), "?", &options).unwrap();
        let size = geometry.bounding_box().unwrap().size();

        // 0.5 em box glyph grows by the bevel size on each side.
        assert!((size.x - (0.3 + 2.0 * 0.02)).abs() < 1e-4, "{size:?}");
        assert!((size.y - (0.35 + 2.0 * 0.02)).abs() < 1e-4, "{size:?}");
        assert!((size.z - (0.2 + 2.0 * 0.03)).abs() < 1e-4, "{size:?}");
        assert_consistent_winding(&geometry);
        for n in &geometry.normals {
            assert!((Vec3::from_array(*n).length() - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn ring_rows_follow_bevel_profile() {
        let rings = TextOptions::default().rings();
        assert_eq!(rings.len(), 5 + 2 + 5);
        assert_eq!(rings[0], (-0.03, 0.0));
        assert_eq!(rings[5], (0.0, 0.02));
        assert_eq!(rings[6], (0.2, 0.02));
        assert!((rings[11].0 - 0.23).abs() < 1e-6);
        assert!(rings.windows(2).all(|w| w[0].0 <= w[1].0));
    }

    #[test]
    fn holes_stay_open() {
        let geometry = build_text_geometry(&font(), "O", &flat()).unwrap();
        let min_z = geometry.bounding_box().unwrap().min.z;

        // The hole of `O` sits at the centre of the glyph.
        let centre = Vec2::ZERO;
        for tri in geometry.indices.chunks_exact(3) {
            let p = [0, 1, 2].map(|k| geometry.positions[tri[k] as usize]);
            if p.iter().all(|v| (v[2] - min_z).abs() < 1e-6) {
                let poly = p.map(|v| Vec2::new(v[0], v[1]));
                assert!(!contains(&poly, centre), "front cap covers the hole");
            }
        }
        assert_consistent_winding(&geometry);
    }

    #[test]
    fn hole_orientation_is_normalised() {
        let outer = vec![
            Vec2::new(0.0, 0.0),
            Vec2::new(0.0, 1.0),
            Vec2::new(1.0, 1.0),
            Vec2::new(1.0, 0.0),
        ];
        let inner = vec![
            Vec2::new(0.25, 0.25),
            Vec2::new(0.25, 0.75),
            Vec2::new(0.75, 0.75),
            Vec2::new(0.75, 0.25),
        ];
        let out = orient(vec![outer, inner]);
        assert!(signed_area(&out[0]) > 0.0);
        assert!(signed_area(&out[1]) < 0.0);
    }

    #[test]
    fn curved_glyph_with_bevel_is_consistent() {
        let geometry = build_text_geometry(&font(), "D?", &TextOptions::default()).unwrap();
        assert!(geometry.triangle_count() > 100);
        assert_consistent_winding(&geometry);
    }

    #[test]
    fn blank_text_is_an_error() {
        let err = build_text_geometry(&font(), "   ", &TextOptions::default()).unwrap_err();
        assert!(matches!(err, AssetError::EmptyText(_)));
    }
}
