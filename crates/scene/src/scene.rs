use crate::node::{Node, NodeKind};
use crate::texture::EnvironmentMap;
use glam::Mat4;
use showcase_common::{NodeId, Rgb};
use std::collections::BTreeSet;
use std::sync::Arc;

/// What is drawn behind the scene's nodes.
#[derive(Debug, Clone, PartialEq)]
pub enum Background {
    Color(Rgb),
    Environment(Arc<EnvironmentMap>),
}

/// An event record produced by every mutation to the scene.
#[derive(Debug, Clone, PartialEq)]
pub enum SceneEvent {
    /// A subtree was attached at the top level.
    NodeAdded {
        id: NodeId,
        name: String,
        subtree_len: usize,
    },
    BackgroundSet,
    EnvironmentSet,
}

/// Errors from scene mutations.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum SceneError {
    #[error("node {0:?} is already in the scene")]
    DuplicateNode(NodeId),
    #[error("a top-level node named {0:?} is already in the scene")]
    DuplicateName(String),
}

/// The scene graph root.
///
/// Top-level nodes keep insertion order. Node ids across the whole tree are
/// tracked so the same node can never be attached twice.
#[derive(Debug, Clone, Default)]
pub struct Scene {
    nodes: Vec<Node>,
    ids: BTreeSet<NodeId>,
    background: Option<Background>,
    environment: Option<Arc<EnvironmentMap>>,
    event_log: Vec<SceneEvent>,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a subtree at the top level. Returns the root id.
    pub fn add(&mut self, node: Node) -> Result<NodeId, SceneError> {
        let mut incoming = Vec::new();
        node.traverse(&mut |n| incoming.push(n.id));
        let mut unique = BTreeSet::new();
        for id in &incoming {
            if self.ids.contains(id) || !unique.insert(*id) {
                return Err(SceneError::DuplicateNode(*id));
            }
        }
        if !node.name.is_empty() && self.find_by_name(&node.name).is_some() {
            return Err(SceneError::DuplicateName(node.name.clone()));
        }

        let id = node.id;
        tracing::debug!(node = %id.short(), name = %node.name, "attaching node");
        self.event_log.push(SceneEvent::NodeAdded {
            id,
            name: node.name.clone(),
            subtree_len: incoming.len(),
        });
        self.ids.extend(incoming);
        self.nodes.push(node);
        Ok(id)
    }

    pub fn set_background(&mut self, background: Background) {
        self.background = Some(background);
        self.event_log.push(SceneEvent::BackgroundSet);
    }

    pub fn set_environment(&mut self, environment: Arc<EnvironmentMap>) {
        self.environment = Some(environment);
        self.event_log.push(SceneEvent::EnvironmentSet);
    }

    pub fn background(&self) -> Option<&Background> {
        self.background.as_ref()
    }

    pub fn environment(&self) -> Option<&Arc<EnvironmentMap>> {
        self.environment.as_ref()
    }

    /// Top-level nodes in insertion order.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.ids.contains(&id)
    }

    /// Top-level node with the given name.
    pub fn find_by_name(&self, name: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.name == name)
    }

    /// Position of a named top-level node in insertion order.
    pub fn position_of(&self, name: &str) -> Option<usize> {
        self.nodes.iter().position(|n| n.name == name)
    }

    /// Total nodes across all subtrees.
    pub fn node_count(&self) -> usize {
        self.ids.len()
    }

    pub fn ambient_lights(&self) -> impl Iterator<Item = &Node> {
        self.nodes
            .iter()
            .filter(|n| matches!(n.kind, NodeKind::AmbientLight(_)))
    }

    /// Visit every node in the scene with its world matrix.
    pub fn traverse_world(&self, f: &mut impl FnMut(&Node, Mat4)) {
        for node in &self.nodes {
            node.traverse_world(Mat4::IDENTITY, f);
        }
    }

    /// Sum of ambient light contributions in linear RGB.
    pub fn ambient_radiance(&self) -> [f32; 3] {
        let mut total = [0.0f32; 3];
        for node in self.ambient_lights() {
            if let NodeKind::AmbientLight(light) = &node.kind {
                let c = light.color.to_linear();
                for i in 0..3 {
                    total[i] += c[i] * light.intensity;
                }
            }
        }
        total
    }

    pub fn events(&self) -> &[SceneEvent] {
        &self.event_log
    }

    pub fn drain_events(&mut self) -> Vec<SceneEvent> {
        std::mem::take(&mut self.event_log)
    }
}
