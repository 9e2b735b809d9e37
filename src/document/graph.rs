//! Node hierarchy helpers.

use super::{Document, Node, NodeId};
use glam::{Mat4, Quat, Vec3};

/// Where a node hangs in the hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Parent {
    /// Root node listed by a scene.
    Scene(usize),
    Node(NodeId),
    /// Not attached anywhere.
    Detached,
}

impl Node {
    pub fn local_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(
            Vec3::from_array(self.scale),
            Quat::from_array(self.rotation).normalize(),
            Vec3::from_array(self.translation),
        )
    }

    /// Replace the TRS with the decomposition of `matrix`.
    pub fn set_local_matrix(&mut self, matrix: Mat4) {
        let (scale, rotation, translation) = matrix.to_scale_rotation_translation();
        self.scale = scale.to_array();
        self.rotation = rotation.normalize().to_array();
        self.translation = translation.to_array();
    }
}

impl Document {
    /// Parent node of every node. Scene membership is not included.
    pub fn node_parents(&self) -> Vec<Option<NodeId>> {
        let mut parents = vec![None; self.nodes.len()];
        for (index, node) in self.nodes.iter().enumerate() {
            for &child in &node.children {
                if let Some(slot) = parents.get_mut(child) {
                    *slot = Some(index);
                }
            }
        }
        parents
    }

    /// Root nodes: every scene's node list, or every parentless node when
    /// the document has no scenes.
    pub fn root_nodes(&self) -> Vec<NodeId> {
        if self.scenes.is_empty() {
            let parents = self.node_parents();
            return (0..self.nodes.len()).filter(|i| parents[*i].is_none()).collect();
        }
        let mut roots = Vec::new();
        for scene in &self.scenes {
            for &node in &scene.nodes {
                if !roots.contains(&node) {
                    roots.push(node);
                }
            }
        }
        roots
    }

    /// Attachment point of every node. A node listed by several scenes reports the first.
    pub fn node_attachments(&self) -> Vec<Parent> {
        let mut attachments = vec![Parent::Detached; self.nodes.len()];
        for (scene_index, scene) in self.scenes.iter().enumerate() {
            for &node in &scene.nodes {
                if let Some(slot) = attachments.get_mut(node) {
                    if *slot == Parent::Detached {
                        *slot = Parent::Scene(scene_index);
                    }
                }
            }
        }
        for (index, node) in self.nodes.iter().enumerate() {
            for &child in &node.children {
                if let Some(slot) = attachments.get_mut(child) {
                    *slot = Parent::Node(index);
                }
            }
        }
        attachments
    }

    /// Children listed under an attachment point.
    pub fn children_of(&self, parent: Parent) -> &[NodeId] {
        match parent {
            Parent::Scene(scene) => &self.scenes[scene].nodes,
            Parent::Node(node) => &self.nodes[node].children,
            Parent::Detached => &[],
        }
    }

    /// Append a node under an attachment point.
    pub fn attach(&mut self, parent: Parent, node: NodeId) {
        match parent {
            Parent::Scene(scene) => self.scenes[scene].nodes.push(node),
            Parent::Node(parent) => self.nodes[parent].children.push(node),
            Parent::Detached => {}
        }
    }

    /// Remove a node from its parent's child list and from every scene's root list.
    pub fn detach(&mut self, node: NodeId) {
        for scene in &mut self.scenes {
            scene.nodes.retain(|n| *n != node);
        }
        for other in &mut self.nodes {
            other.children.retain(|n| *n != node);
        }
    }

    /// World matrix of every node. Cycles are broken by treating the repeated
    /// node as a root.
    pub fn world_matrices(&self) -> Vec<Mat4> {
        let parents = self.node_parents();
        let mut world: Vec<Option<Mat4>> = vec![None; self.nodes.len()];
        for start in 0..self.nodes.len() {
            let mut chain = Vec::new();
            let mut current = Some(start);
            while let Some(index) = current {
                if world[index].is_some() || chain.contains(&index) {
                    break;
                }
                chain.push(index);
                current = parents[index];
            }
            let mut parent_world = current.and_then(|i| world[i]).unwrap_or(Mat4::IDENTITY);
            for &index in chain.iter().rev() {
                parent_world = parent_world * self.nodes[index].local_matrix();
                world[index] = Some(parent_world);
            }
        }
        world.into_iter().map(|m| m.unwrap_or(Mat4::IDENTITY)).collect()
    }

    /// `roots` and all their descendants.
    pub fn descendants_of(&self, roots: impl IntoIterator<Item = NodeId>) -> Vec<bool> {
        let mut marked = vec![false; self.nodes.len()];
        let mut stack: Vec<NodeId> = roots.into_iter().collect();
        while let Some(index) = stack.pop() {
            match marked.get_mut(index) {
                Some(seen) if !*seen => *seen = true,
                _ => continue,
            }
            stack.extend(self.nodes[index].children.iter().copied());
        }
        marked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Scene;

    fn chain_document() -> Document {
        let mut doc = Document::new();
        let child = doc.add_node(Node {
            translation: [0.0, 1.0, 0.0],
            ..Default::default()
        });
        let root = doc.add_node(Node {
            translation: [2.0, 0.0, 0.0],
            scale: [2.0; 3],
            children: vec![child],
            ..Default::default()
        });
        doc.scenes.push(Scene {
            name: None,
            nodes: vec![root],
        });
        doc
    }

    #[test]
    fn test_world_matrices_compose_parent_first() {
        let doc = chain_document();
        let world = doc.world_matrices();
        let p = world[0].transform_point3(Vec3::ZERO);
        assert!((p - Vec3::new(2.0, 2.0, 0.0)).length() < 1e-6);
    }

    #[test]
    fn test_attachments_and_parents() {
        let doc = chain_document();
        assert_eq!(doc.node_parents(), vec![Some(1), None]);
        assert_eq!(doc.node_attachments(), vec![Parent::Node(1), Parent::Scene(0)]);
        assert_eq!(doc.root_nodes(), vec![1]);
    }

    #[test]
    fn test_detach_and_attach() {
        let mut doc = chain_document();
        doc.detach(0);
        assert!(doc.nodes[1].children.is_empty());
        doc.attach(Parent::Scene(0), 0);
        assert_eq!(doc.scenes[0].nodes, vec![1, 0]);
    }

    #[test]
    fn test_set_local_matrix_round_trip() {
        let mut node = Node {
            translation: [1.0, 2.0, 3.0],
            rotation: Quat::from_rotation_y(0.5).to_array(),
            scale: [2.0, 2.0, 2.0],
            ..Default::default()
        };
        let matrix = node.local_matrix();
        node.set_local_matrix(matrix);
        assert!(node.local_matrix().abs_diff_eq(matrix, 1e-5));
    }

    #[test]
    fn test_descendants_handles_cycles() {
        let mut doc = Document::new();
        doc.add_node(Node {
            children: vec![1],
            ..Default::default()
        });
        doc.add_node(Node {
            children: vec![0],
            ..Default::default()
        });
        assert_eq!(doc.descendants_of([0]), vec![true, true]);
        assert_eq!(doc.world_matrices().len(), 2);
    }
}
