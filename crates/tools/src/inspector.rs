use showcase_assets::Font;
use showcase_common::NodeId;
use showcase_scene::{Aabb, Background, Node, NodeKind, Scene};

/// Scene inspector for developer tooling.
///
/// Read-only queries against a scene for the CLI and the debug overlay.
pub struct SceneInspector;

impl SceneInspector {
    /// Produce a summary of the scene.
    pub fn summary(scene: &Scene) -> SceneSummary {
        let mut summary = SceneSummary {
            top_level: scene.nodes().len(),
            nodes: scene.node_count(),
            ambient_lights: scene.ambient_lights().count(),
            background: match scene.background() {
                None => "none".into(),
                Some(Background::Color(c)) => format!("#{:06x}", c.to_hex()),
                Some(Background::Environment(env)) => format!("environment {}x{}", env.width, env.height),
            },
            has_environment: scene.environment().is_some(),
            events: scene.events().len(),
            ..SceneSummary::default()
        };
        scene.traverse_world(&mut |node, _| {
            if let NodeKind::Mesh { geometry, material } = &node.kind {
                summary.meshes += 1;
                summary.vertices += geometry.vertex_count();
                summary.triangles += geometry.triangle_count();
                if material.wireframe {
                    summary.wireframes += 1;
                }
                if material.base_color_texture.is_some() {
                    summary.textured += 1;
                }
            }
        });
        tracing::debug!(
            nodes = summary.nodes,
            meshes = summary.meshes,
            textured = summary.textured,
            triangles = summary.triangles,
            "scene summarised"
        );
        summary
    }

    /// Details of the top-level node called `name`.
    pub fn inspect_node(scene: &Scene, name: &str) -> Option<NodeInfo> {
        let info = scene.find_by_name(name).map(NodeInfo::from_node);
        if info.is_none() {
            tracing::debug!(name, "no top-level node with that name");
        }
        info
    }

    /// Top-level node ids and names in insertion order.
    pub fn list_nodes(scene: &Scene) -> Vec<(NodeId, String)> {
        scene.nodes().iter().map(|n| (n.id, n.name.clone())).collect()
    }

    /// Font metrics plus the characters of `text` the font has no glyph for.
    pub fn font(font: &Font, text: &str) -> FontSummary {
        let mut missing = Vec::new();
        for ch in text.chars() {
            if ch != '\n' && !font.has_glyph(ch) && !missing.contains(&ch) {
                missing.push(ch);
            }
        }
        if !missing.is_empty() {
            tracing::debug!(family = %font.family, ?missing, "glyphs missing from font");
        }
        FontSummary {
            family: font.family.clone(),
            glyphs: font.glyph_count(),
            resolution: font.resolution,
            line_height: font.line_height(1.0),
            missing,
            fallback: font.has_glyph('?'),
        }
    }
}

/// Summary of scene contents for the inspector.
#[derive(Debug, Clone, Default)]
pub struct SceneSummary {
    pub top_level: usize,
    pub nodes: usize,
    pub meshes: usize,
    pub wireframes: usize,
    /// Meshes whose material samples a base colour texture.
    pub textured: usize,
    pub vertices: usize,
    pub triangles: usize,
    pub ambient_lights: usize,
    pub background: String,
    pub has_environment: bool,
    pub events: usize,
}

impl std::fmt::Display for SceneSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Scene: nodes={} (top-level {}) meshes={} (textured {}) triangles={} lights={} background={} env={}",
            self.nodes,
            self.top_level,
            self.meshes,
            self.textured,
            self.triangles,
            self.ambient_lights,
            self.background,
            if self.has_environment { "yes" } else { "no" }
        )
    }
}

/// Detailed info about a single node.
#[derive(Debug, Clone)]
pub struct NodeInfo {
    pub id: NodeId,
    pub name: String,
    pub kind: &'static str,
    pub position: [f32; 3],
    pub subtree: usize,
    /// Bounds of every mesh in the subtree, in the parent space of the node.
    pub bounds: Option<Aabb>,
    pub cast_shadow: bool,
}

impl NodeInfo {
    fn from_node(node: &Node) -> Self {
        let mut bounds: Option<Aabb> = None;
        node.traverse_world(glam::Mat4::IDENTITY, &mut |n, world| {
            let NodeKind::Mesh { geometry, .. } = &n.kind else {
                return;
            };
            let Some(local) = geometry.bounding_box() else {
                return;
            };
            let min = world.transform_point3(local.min);
            let max = world.transform_point3(local.max);
            let (lo, hi) = (min.min(max), min.max(max));
            bounds = Some(match bounds {
                Some(b) => Aabb {
                    min: b.min.min(lo),
                    max: b.max.max(hi),
                },
                None => Aabb { min: lo, max: hi },
            });
        });

        let p = node.transform.position;
        Self {
            id: node.id,
            name: node.name.clone(),
            kind: match node.kind {
                NodeKind::Group => "group",
                NodeKind::Mesh { .. } => "mesh",
                NodeKind::AmbientLight(_) => "ambient",
            },
            position: [p.x, p.y, p.z],
            subtree: node.subtree_len(),
            bounds,
            cast_shadow: node.cast_shadow,
        }
    }
}

impl std::fmt::Display for NodeInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Node [{}] {:?} {} pos=({:.2}, {:.2}, {:.2}) subtree={}",
            self.id.short(),
            self.name,
            self.kind,
            self.position[0],
            self.position[1],
            self.position[2],
            self.subtree,
        )?;
        if let Some(b) = &self.bounds {
            let s = b.size();
            write!(f, " size=({:.2}, {:.2}, {:.2})", s.x, s.y, s.z)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct FontSummary {
    pub family: String,
    pub glyphs: usize,
    pub resolution: f32,
    /// Line height at size 1.
    pub line_height: f32,
    /// Characters without a glyph, in first-seen order.
    pub missing: Vec<char>,
    /// Missing characters render as `?`.
    pub fallback: bool,
}

impl std::fmt::Display for FontSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Font {:?}: {} glyphs, resolution {}, line height {:.3}",
            self.family, self.glyphs, self.resolution, self.line_height
        )?;
        if !self.missing.is_empty() {
            let missing: String = self.missing.iter().collect();
            let shown = if self.fallback { " (drawn as '?')" } else { "" };
            write!(f, ", missing {missing:?}{shown}")?;
        }
        Ok(())
    }
}
