//! Remove unused attributes, empty leaf nodes and unreferenced data.

use crate::document::{Document, NodeId, NORMAL_SLOT};
use crate::error::StepError;
use crate::pipeline::TransformStep;
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, Default)]
pub struct Prune {
    /// Keep `TEXCOORD_n` sets no texture reads and `TANGENT` without a normal map.
    pub keep_attributes: bool,
    /// Keep nodes that have no content and no children.
    pub keep_leaves: bool,
}

impl TransformStep for Prune {
    fn name(&self) -> &'static str {
        "prune"
    }

    fn apply(&self, doc: &mut Document) -> Result<(), StepError> {
        if !self.keep_attributes {
            prune_attributes(doc);
        }
        if !self.keep_leaves {
            prune_leaves(doc);
        }
        let before = doc.stats();
        doc.collect_garbage();
        let after = doc.stats();
        log::debug!(
            "Pruned {} nodes, {} meshes, {} materials, {} textures",
            before.nodes - after.nodes,
            before.meshes - after.meshes,
            before.materials - after.materials,
            before.textures - after.textures
        );
        Ok(())
    }
}

fn prune_attributes(doc: &mut Document) {
    let materials = &doc.materials;
    for primitive in doc.meshes.iter_mut().flat_map(|m| &mut m.primitives) {
        let slots = primitive
            .material
            .and_then(|m| materials.get(m))
            .map(|m| m.texture_slots())
            .unwrap_or_default();
        let used_sets: BTreeSet<String> = slots.iter().map(|s| format!("TEXCOORD_{}", s.tex_coord)).collect();
        let normal_mapped = slots.iter().any(|s| s.slot == NORMAL_SLOT);

        let unused = |semantic: &String| {
            (semantic.starts_with("TEXCOORD_") && !used_sets.contains(semantic))
                || (semantic == "TANGENT" && !normal_mapped)
        };
        primitive.attributes.retain(|semantic, _| !unused(semantic));
        for target in &mut primitive.targets {
            target.retain(|semantic, _| !unused(semantic));
        }
    }
}

/// Repeatedly detach nodes with nothing to show and no children.
fn prune_leaves(doc: &mut Document) {
    let protected: BTreeSet<NodeId> = doc.animated_nodes().into_iter().chain(doc.joint_nodes()).collect();
    loop {
        let empty: Vec<NodeId> = (0..doc.nodes.len())
            .filter(|i| !protected.contains(i))
            .filter(|i| {
                let n = &doc.nodes[*i];
                n.children.is_empty() && n.mesh.is_none() && n.camera.is_none() && n.skin.is_none()
            })
            .filter(|i| {
                doc.scenes.iter().any(|s| s.nodes.contains(i)) || doc.nodes.iter().any(|n| n.children.contains(i))
            })
            .collect();
        if empty.is_empty() {
            break;
        }
        for node in empty {
            doc.detach(node);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Accessor, ElementType, Node};
    use crate::testing;
    use serde_json::json;

    #[test]
    fn test_unused_texcoords_removed() {
        let mut doc = testing::empty_document();
        let mesh = testing::add_cube_mesh(&mut doc, None);
        testing::add_mesh_node(&mut doc, mesh, [0.0; 3]);
        let tangent = doc.add_accessor(Accessor::new(ElementType::Vec4, vec![1.0, 0.0, 0.0, 1.0].repeat(24)));
        doc.meshes[0].primitives[0]
            .attributes
            .insert("TANGENT".to_string(), tangent);

        Prune::default().apply(&mut doc).unwrap();

        let attributes = &doc.meshes[0].primitives[0].attributes;
        assert!(!attributes.contains_key("TEXCOORD_0"));
        assert!(!attributes.contains_key("TANGENT"));
        assert!(attributes.contains_key("NORMAL"));
        assert_eq!(doc.accessors.len(), 2);
    }

    #[test]
    fn test_texcoords_read_by_material_kept() {
        let mut doc = testing::empty_document();
        let texture = doc.add_texture(testing::png_texture("normal", 4, 4));
        let material = doc.add_material(testing::material_from_json(json!({
            "normalTexture": {"index": texture}
        })));
        let mesh = testing::add_cube_mesh(&mut doc, Some(material));
        testing::add_mesh_node(&mut doc, mesh, [0.0; 3]);

        Prune::default().apply(&mut doc).unwrap();
        assert!(doc.meshes[0].primitives[0].attributes.contains_key("TEXCOORD_0"));
    }

    #[test]
    fn test_empty_leaves_removed_recursively() {
        let mut doc = testing::triangle_document();
        let leaf = doc.add_node(Node::default());
        let group = doc.add_node(Node {
            children: vec![leaf],
            ..Default::default()
        });
        doc.scenes[0].nodes.push(group);

        Prune::default().apply(&mut doc).unwrap();
        assert_eq!(doc.nodes.len(), 1);
        assert_eq!(doc.scenes[0].nodes, vec![0]);
    }

    #[test]
    fn test_keep_leaves() {
        let mut doc = testing::triangle_document();
        let leaf = doc.add_node(Node::default());
        doc.scenes[0].nodes.push(leaf);
        Prune {
            keep_attributes: true,
            keep_leaves: true,
        }
        .apply(&mut doc)
        .unwrap();
        assert_eq!(doc.nodes.len(), 2);
    }
}
