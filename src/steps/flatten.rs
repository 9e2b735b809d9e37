//! Move static nodes to the scene root.

use crate::document::{Document, NodeId, Parent};
use crate::error::StepError;
use crate::pipeline::TransformStep;

/// Reparents every node under its scene with its world transform baked into
/// its local TRS. Animated nodes, skin joints and everything below them keep
/// their place in the hierarchy.
#[derive(Debug, Clone, Copy, Default)]
pub struct Flatten;

impl TransformStep for Flatten {
    fn name(&self) -> &'static str {
        "flatten"
    }

    fn apply(&self, doc: &mut Document) -> Result<(), StepError> {
        let world = doc.world_matrices();
        let attachments = doc.node_attachments();
        let pinned = doc.descendants_of(doc.animated_nodes().into_iter().chain(doc.joint_nodes()));

        let mut moved = 0;
        for node in 0..doc.nodes.len() {
            let Parent::Node(parent) = attachments[node] else {
                continue;
            };
            if pinned[node] {
                continue;
            }
            let Some(scene) = scene_of(&attachments, parent) else {
                continue;
            };
            doc.nodes[parent].children.retain(|c| *c != node);
            doc.nodes[node].set_local_matrix(world[node]);
            doc.attach(Parent::Scene(scene), node);
            moved += 1;
        }
        if moved > 0 {
            log::debug!("Flattened {} nodes", moved);
        }
        Ok(())
    }
}

/// Scene whose root list the hierarchy above `node` starts from.
fn scene_of(attachments: &[Parent], mut node: NodeId) -> Option<usize> {
    for _ in 0..attachments.len() {
        match attachments[node] {
            Parent::Scene(scene) => return Some(scene),
            Parent::Node(parent) => node = parent,
            Parent::Detached => return None,
        }
    }
    None
}
