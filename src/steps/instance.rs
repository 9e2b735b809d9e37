//! Replace repeated mesh nodes with one `EXT_mesh_gpu_instancing` node.

use crate::document::{Accessor, Document, ElementType, InstanceAttributes, MeshId, Node, NodeId, Parent};
use crate::error::StepError;
use crate::pipeline::TransformStep;
use std::collections::{BTreeMap, BTreeSet};

/// Groups sibling nodes that reference the same mesh. Groups of at least
/// `min` nodes become a single node carrying per-instance TRS attributes.
///
/// Only plain leaves qualify: no children, skin, camera, morph weights or
/// animation, and a mesh without morph targets.
#[derive(Debug, Clone, Copy)]
pub struct Instance {
    pub min: usize,
}

impl TransformStep for Instance {
    fn name(&self) -> &'static str {
        "instance"
    }

    fn apply(&self, doc: &mut Document) -> Result<(), StepError> {
        let animated = doc.animated_nodes();
        let joints = doc.joint_nodes();

        let mut parents: BTreeSet<Parent> = (0..doc.scenes.len()).map(Parent::Scene).collect();
        parents.extend((0..doc.nodes.len()).map(Parent::Node));

        let mut instanced = 0;
        for parent in parents {
            let mut groups: BTreeMap<MeshId, Vec<NodeId>> = BTreeMap::new();
            for &child in doc.children_of(parent) {
                if animated.contains(&child) || joints.contains(&child) {
                    continue;
                }
                if let Some(mesh) = instanceable_mesh(doc, child) {
                    groups.entry(mesh).or_default().push(child);
                }
            }
            for (mesh, mut nodes) in groups {
                nodes.dedup();
                if nodes.len() < self.min.max(1) {
                    continue;
                }
                let attributes = instance_attributes(doc, &nodes);
                for &node in &nodes {
                    doc.detach(node);
                }
                let node = doc.add_node(Node {
                    name: doc.meshes[mesh].name.clone(),
                    instancing: Some(attributes),
                    ..Node::with_mesh(mesh)
                });
                doc.attach(parent, node);
                instanced += nodes.len();
            }
        }
        if instanced > 0 {
            log::debug!("Instanced {} nodes", instanced);
        }
        Ok(())
    }
}

fn instanceable_mesh(doc: &Document, node: NodeId) -> Option<MeshId> {
    let n = &doc.nodes[node];
    let mesh = n.mesh?;
    let plain = n.children.is_empty()
        && n.skin.is_none()
        && n.camera.is_none()
        && n.weights.is_empty()
        && n.instancing.is_none()
        && doc.meshes[mesh].primitives.iter().all(|p| p.targets.is_empty());
    plain.then_some(mesh)
}

/// TRANSLATION always, ROTATION and SCALE only when some instance differs from identity.
fn instance_attributes(doc: &mut Document, nodes: &[NodeId]) -> InstanceAttributes {
    let mut translation = Vec::with_capacity(nodes.len() * 3);
    let mut rotation = Vec::with_capacity(nodes.len() * 4);
    let mut scale = Vec::with_capacity(nodes.len() * 3);
    for &id in nodes {
        let node = &doc.nodes[id];
        translation.extend_from_slice(&node.translation);
        rotation.extend_from_slice(&node.rotation);
        scale.extend_from_slice(&node.scale);
    }

    let mut attributes = InstanceAttributes::new();
    let id = doc.add_accessor(Accessor::new(ElementType::Vec3, translation));
    attributes.insert("TRANSLATION".to_string(), id);
    if rotation.chunks_exact(4).any(|r| r != [0.0, 0.0, 0.0, 1.0]) {
        let id = doc.add_accessor(Accessor::new(ElementType::Vec4, rotation));
        attributes.insert("ROTATION".to_string(), id);
    }
    if scale.iter().any(|s| *s != 1.0) {
        let id = doc.add_accessor(Accessor::new(ElementType::Vec3, scale));
        attributes.insert("SCALE".to_string(), id);
    }
    attributes
}
