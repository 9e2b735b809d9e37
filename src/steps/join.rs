//! Merge compatible primitives of sibling nodes.

use crate::document::{
    Accessor, AttributeMap, ComponentType, Document, ElementType, MaterialId, Mesh, MeshId, Node, NodeId, Parent,
    Primitive, PrimitiveMode,
};
use crate::error::StepError;
use crate::pipeline::TransformStep;
use glam::{Mat3, Mat4, Vec3, Vec4};
use std::collections::{BTreeMap, BTreeSet};

/// Joins primitives that share material, topology and attribute layout across
/// the static child nodes of each parent. Vertex data is moved into the
/// parent's space and the result lives on one new node per parent.
///
/// Meshes used by more than one node, skinned, morphed, instanced, animated
/// and joint nodes are left alone.
#[derive(Debug, Clone, Copy, Default)]
pub struct Join;

/// Primitives with equal keys can share one vertex stream.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct JoinKey {
    material: Option<MaterialId>,
    mode: PrimitiveMode,
    indexed: bool,
    layout: Vec<(String, ElementType, ComponentType, bool)>,
}

impl TransformStep for Join {
    fn name(&self) -> &'static str {
        "join"
    }

    fn apply(&self, doc: &mut Document) -> Result<(), StepError> {
        let pinned: BTreeSet<NodeId> = doc.animated_nodes().into_iter().chain(doc.joint_nodes()).collect();
        let users = doc.mesh_users();

        let mut parents: BTreeSet<Parent> = (0..doc.scenes.len()).map(Parent::Scene).collect();
        parents.extend((0..doc.nodes.len()).map(Parent::Node));

        let mut joined_total = 0;
        for parent in parents {
            let mut groups: BTreeMap<JoinKey, Vec<(NodeId, usize)>> = BTreeMap::new();
            for &child in doc.children_of(parent) {
                if pinned.contains(&child) {
                    continue;
                }
                let Some(mesh) = joinable_mesh(doc, child, &users) else {
                    continue;
                };
                for (index, primitive) in doc.meshes[mesh].primitives.iter().enumerate() {
                    if primitive.mode.is_list() && primitive.targets.is_empty() {
                        groups
                            .entry(join_key(doc, primitive))
                            .or_default()
                            .push((child, index));
                    }
                }
            }

            let mut joined = Vec::new();
            let mut taken: BTreeSet<(MeshId, usize)> = BTreeSet::new();
            for group in groups.into_values().filter(|g| g.len() > 1) {
                joined.push(merge(doc, &group)?);
                joined_total += group.len();
                for (node, index) in group {
                    if let Some(mesh) = doc.nodes[node].mesh {
                        taken.insert((mesh, index));
                    }
                }
            }
            if joined.is_empty() {
                continue;
            }

            let name = taken
                .iter()
                .next()
                .and_then(|(mesh, _)| doc.meshes[*mesh].name.clone());
            for mesh in taken.iter().map(|(mesh, _)| *mesh).collect::<BTreeSet<_>>() {
                let primitives = std::mem::take(&mut doc.meshes[mesh].primitives);
                doc.meshes[mesh].primitives = primitives
                    .into_iter()
                    .enumerate()
                    .filter(|(index, _)| !taken.contains(&(mesh, *index)))
                    .map(|(_, p)| p)
                    .collect();
            }
            let meshes = &doc.meshes;
            for node in &mut doc.nodes {
                if node.mesh.is_some_and(|m| meshes[m].primitives.is_empty()) {
                    node.mesh = None;
                }
            }

            let mesh = doc.add_mesh(Mesh {
                name,
                primitives: joined,
                weights: Vec::new(),
            });
            let node = doc.add_node(Node::with_mesh(mesh));
            doc.attach(parent, node);
        }
        if joined_total > 0 {
            log::debug!("Joined {} primitives", joined_total);
        }
        Ok(())
    }
}

fn joinable_mesh(doc: &Document, node: NodeId, users: &[usize]) -> Option<MeshId> {
    let n = &doc.nodes[node];
    let mesh = n.mesh?;
    let plain = users.get(mesh) == Some(&1)
        && n.skin.is_none()
        && n.weights.is_empty()
        && n.instancing.is_none();
    plain.then_some(mesh)
}

fn join_key(doc: &Document, primitive: &Primitive) -> JoinKey {
    JoinKey {
        material: primitive.material,
        mode: primitive.mode,
        indexed: primitive.indices.is_some(),
        layout: primitive
            .attributes
            .iter()
            .map(|(semantic, id)| {
                let a = &doc.accessors[*id];
                (semantic.clone(), a.element_type, a.component_type, a.normalized)
            })
            .collect(),
    }
}

/// Semantics whose values move with the node transform.
fn is_spatial(semantic: &str) -> bool {
    matches!(semantic, "POSITION" | "NORMAL" | "TANGENT")
}

/// Concatenate a group of compatible primitives in parent space.
fn merge(doc: &mut Document, group: &[(NodeId, usize)]) -> Result<Primitive, StepError> {
    let (first_node, first_index) = group[0];
    let first = primitive_at(doc, first_node, first_index)?;
    let mode = first.mode;
    let material = first.material;
    // Empty accessors with each attribute's layout.
    let mut merged: BTreeMap<String, Accessor> = first
        .attributes
        .iter()
        .map(|(semantic, id)| (semantic.clone(), doc.accessors[*id].gather(&[])))
        .collect();
    let mut indices: Option<Vec<u32>> = first.indices.as_ref().map(|_| Vec::new());

    let mut base = 0u32;
    for &(node, index) in group {
        let matrix = doc.nodes[node].local_matrix();
        let flip = matrix.determinant() < 0.0;
        let primitive = primitive_at(doc, node, index)?;
        let count = doc.vertex_count(primitive);

        let mut order: Vec<u32> = (0..count as u32).collect();
        if flip && mode == PrimitiveMode::Triangles && primitive.indices.is_none() {
            order.chunks_exact_mut(3).for_each(|t| t.swap(1, 2));
        }

        for (semantic, id) in &primitive.attributes {
            let source = &doc.accessors[*id];
            let Some(target) = merged.get_mut(semantic) else {
                continue;
            };
            if is_spatial(semantic) {
                append_transformed(target, source, semantic, &order, matrix);
            } else {
                for &i in &order {
                    target.values.extend_from_slice(source.element(i as usize));
                }
            }
        }

        if let (Some(out), Some(source)) = (indices.as_mut(), primitive.indices.as_ref()) {
            let start = out.len();
            out.extend(source.iter().map(|i| i + base));
            if flip && mode == PrimitiveMode::Triangles {
                out[start..].chunks_exact_mut(3).for_each(|t| t.swap(1, 2));
            }
        }
        base += count as u32;
    }

    let mut attributes = AttributeMap::new();
    for (semantic, accessor) in merged {
        attributes.insert(semantic, doc.add_accessor(accessor));
    }
    Ok(Primitive {
        attributes,
        indices,
        material,
        mode,
        targets: Vec::new(),
    })
}

fn primitive_at(doc: &Document, node: NodeId, index: usize) -> Result<&Primitive, StepError> {
    doc.nodes[node]
        .mesh
        .and_then(|m| doc.meshes.get(m))
        .and_then(|m| m.primitives.get(index))
        .ok_or_else(|| StepError::Document(format!("node {} lost primitive {}", node, index)))
}

/// Append `source` elements in `order`, mapped by `matrix`. Output is float.
fn append_transformed(target: &mut Accessor, source: &Accessor, semantic: &str, order: &[u32], matrix: Mat4) {
    target.component_type = ComponentType::F32;
    target.normalized = false;
    let linear = Mat3::from_mat4(matrix);
    let normal_matrix = linear.inverse().transpose();
    let handedness = if matrix.determinant() < 0.0 { -1.0 } else { 1.0 };

    for &i in order {
        let v = source.element_normalized(i as usize);
        match (semantic, v.as_slice()) {
            ("POSITION", [x, y, z]) => {
                let p = matrix.transform_point3(Vec3::new(*x, *y, *z));
                target.values.extend_from_slice(&p.to_array());
            }
            ("NORMAL", [x, y, z]) => {
                let n = (normal_matrix * Vec3::new(*x, *y, *z)).normalize_or_zero();
                target.values.extend_from_slice(&n.to_array());
            }
            ("TANGENT", [x, y, z, w]) => {
                let t = (linear * Vec3::new(*x, *y, *z)).normalize_or_zero();
                target.values.extend_from_slice(&Vec4::from((t, w * handedness)).to_array());
            }
            _ => target.values.extend_from_slice(&v),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    fn two_cubes() -> Document {
        let mut doc = testing::empty_document();
        let a = testing::add_cube_mesh(&mut doc, None);
        let b = testing::add_cube_mesh(&mut doc, None);
        testing::add_mesh_node(&mut doc, a, [0.0; 3]);
        testing::add_mesh_node(&mut doc, b, [3.0, 0.0, 0.0]);
        doc
    }

    fn joined_primitive(doc: &Document) -> &Primitive {
        let node = *doc.scenes[0].nodes.last().unwrap();
        &doc.meshes[doc.nodes[node].mesh.unwrap()].primitives[0]
    }

    #[test]
    fn test_siblings_are_joined_in_parent_space() {
        let mut doc = two_cubes();
        Join.apply(&mut doc).unwrap();
        doc.collect_garbage();

        let stats = doc.stats();
        assert_eq!(stats.meshes, 1);
        assert_eq!(stats.primitives, 1);
        assert_eq!(stats.vertices, 48);
        assert_eq!(stats.triangles, 24);

        let primitive = joined_primitive(&doc);
        let (min, max) = doc.accessors[primitive.position().unwrap()].bounds().unwrap();
        assert_eq!(min, vec![-0.5, -0.5, -0.5]);
        assert_eq!(max, vec![3.5, 0.5, 0.5]);
        assert_eq!(primitive.indices.as_ref().unwrap()[36], 24);
    }

    #[test]
    fn test_mirrored_node_flips_winding() {
        let mut doc = two_cubes();
        doc.nodes[1].scale = [-1.0, 1.0, 1.0];
        Join.apply(&mut doc).unwrap();

        let primitive = joined_primitive(&doc);
        let indices = primitive.indices.as_ref().unwrap();
        // First triangle of the second cube was (0, 1, 2).
        assert_eq!(&indices[36..39], &[24, 26, 25]);
        let normals = &doc.accessors[primitive.attributes["NORMAL"]];
        // +X face normal of the mirrored cube points to -X.
        assert_eq!(normals.element(24), &[-1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_different_materials_stay_apart() {
        let mut doc = testing::empty_document();
        let red = doc.add_material(testing::color_material([1.0, 0.0, 0.0, 1.0]));
        let blue = doc.add_material(testing::color_material([0.0, 0.0, 1.0, 1.0]));
        for (i, material) in [red, red, blue].into_iter().enumerate() {
            let mesh = testing::add_cube_mesh(&mut doc, Some(material));
            testing::add_mesh_node(&mut doc, mesh, [i as f32 * 2.0, 0.0, 0.0]);
        }
        Join.apply(&mut doc).unwrap();
        doc.collect_garbage();

        let primitives: Vec<_> = doc.meshes.iter().flat_map(|m| &m.primitives).collect();
        assert_eq!(primitives.len(), 2);
        assert!(primitives.iter().any(|p| p.material == Some(blue) && doc.vertex_count(p) == 24));
    }

    #[test]
    fn test_shared_mesh_is_not_joined() {
        let mut doc = testing::empty_document();
        let mesh = testing::add_cube_mesh(&mut doc, None);
        testing::add_mesh_node(&mut doc, mesh, [0.0; 3]);
        testing::add_mesh_node(&mut doc, mesh, [2.0, 0.0, 0.0]);
        Join.apply(&mut doc).unwrap();
        assert_eq!(doc.meshes.len(), 1);
        assert_eq!(doc.scenes[0].nodes.len(), 2);
    }
}
