//! Merge vertices that are equal within a tolerance.

use super::{compact_primitive, retain_primitives};
use crate::document::{Accessor, AccessorId, Document, PrimitiveMode};
use crate::error::StepError;
use crate::pipeline::TransformStep;
use std::collections::HashMap;

/// Welds vertices whose attributes all agree within `tolerance`.
///
/// POSITION (and morph target positions) use a grid scaled by the
/// primitive's largest bounding box dimension; other attributes use the
/// tolerance directly. A tolerance of zero welds bitwise-identical vertices
/// only. Non-indexed triangles gain an index list, and triangles that
/// collapse are dropped.
#[derive(Debug, Clone, Copy)]
pub struct Weld {
    pub tolerance: f32,
}

impl TransformStep for Weld {
    fn name(&self) -> &'static str {
        "weld"
    }

    fn apply(&self, doc: &mut Document) -> Result<(), StepError> {
        retain_primitives(doc, |doc, primitive| {
            if primitive.mode != PrimitiveMode::Triangles {
                return Ok(true);
            }
            let vertex_count = doc.vertex_count(primitive);
            if vertex_count == 0 {
                return Ok(true);
            }

            let position_grid = primitive
                .position()
                .and_then(|id| doc.accessors[id].bounds())
                .map(|(min, max)| {
                    let extent = min
                        .iter()
                        .zip(&max)
                        .map(|(a, b)| b - a)
                        .fold(0.0_f32, f32::max);
                    self.tolerance * extent
                })
                .unwrap_or(self.tolerance);

            let mut channels: Vec<(&Accessor, f32)> = Vec::new();
            let mut push = |semantic: &str, id: AccessorId| {
                let grid = if semantic == "POSITION" {
                    position_grid
                } else {
                    self.tolerance
                };
                channels.push((&doc.accessors[id], grid));
            };
            for (semantic, id) in &primitive.attributes {
                push(semantic, *id);
            }
            for target in &primitive.targets {
                for (semantic, id) in target {
                    push(semantic, *id);
                }
            }

            let mut canonical = Vec::with_capacity(vertex_count);
            let mut seen: HashMap<Vec<i64>, u32> = HashMap::new();
            for vertex in 0..vertex_count {
                let key = vertex_key(&channels, vertex);
                let first = *seen.entry(key).or_insert(vertex as u32);
                canonical.push(first);
            }

            let indices = primitive
                .indices
                .take()
                .unwrap_or_else(|| (0..vertex_count as u32).collect());
            let before = indices.len() / 3;
            let welded: Vec<u32> = indices
                .chunks_exact(3)
                .map(|t| [canonical[t[0] as usize], canonical[t[1] as usize], canonical[t[2] as usize]])
                .filter(|[a, b, c]| a != b && b != c && a != c)
                .flatten()
                .collect();
            if welded.len() / 3 < before {
                log::trace!("Weld dropped {} degenerate triangles", before - welded.len() / 3);
            }
            if welded.is_empty() {
                return Ok(false);
            }
            primitive.indices = Some(welded);
            compact_primitive(doc, primitive);
            Ok(true)
        })
    }
}

/// Quantized values of every channel for one vertex.
fn vertex_key(channels: &[(&Accessor, f32)], vertex: usize) -> Vec<i64> {
    let mut key = Vec::new();
    for (accessor, grid) in channels {
        for &value in accessor.element(vertex) {
            let cell = if *grid > 0.0 {
                (value / grid).round() as i64
            } else {
                value.to_bits() as i64
            };
            key.push(cell);
        }
    }
    key
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{AttributeMap, ElementType, Mesh, Primitive};
    use crate::testing;

    /// Two triangles sharing an edge, stored without indices.
    fn unindexed_quad(offset: f32) -> Document {
        let mut doc = testing::empty_document();
        let positions = vec![
            0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0, //
            1.0 + offset, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 1.0 + offset, 0.0,
        ];
        let position = doc.add_accessor(Accessor::new(ElementType::Vec3, positions));
        let mut attributes = AttributeMap::new();
        attributes.insert("POSITION".to_string(), position);
        let mesh = doc.add_mesh(Mesh {
            name: None,
            primitives: vec![Primitive::new(attributes, None)],
            weights: Vec::new(),
        });
        testing::add_mesh_node(&mut doc, mesh, [0.0; 3]);
        doc
    }

    fn position_count(doc: &Document) -> usize {
        let primitive = &doc.meshes[0].primitives[0];
        doc.accessors[primitive.position().unwrap()].count()
    }

    #[test]
    fn test_exact_weld_shares_vertices() {
        let mut doc = unindexed_quad(0.0);
        Weld { tolerance: 0.0 }.apply(&mut doc).unwrap();
        assert_eq!(position_count(&doc), 4);
        assert_eq!(doc.meshes[0].primitives[0].indices.as_ref().unwrap().len(), 6);
    }

    #[test]
    fn test_tolerance_scales_with_extent() {
        let mut doc = unindexed_quad(1e-6);
        Weld { tolerance: 0.0 }.apply(&mut doc).unwrap();
        assert_eq!(position_count(&doc), 6);

        let mut doc = unindexed_quad(1e-6);
        Weld { tolerance: 1e-4 }.apply(&mut doc).unwrap();
        assert_eq!(position_count(&doc), 4);
    }

    #[test]
    fn test_different_normals_are_not_welded() {
        let mut doc = testing::empty_document();
        let mesh = testing::add_cube_mesh(&mut doc, None);
        testing::add_mesh_node(&mut doc, mesh, [0.0; 3]);
        Weld { tolerance: 1e-4 }.apply(&mut doc).unwrap();
        assert_eq!(position_count(&doc), 24);
    }

    #[test]
    fn test_collapsed_primitive_is_removed() {
        let mut doc = testing::triangle_document();
        let position = doc.meshes[0].primitives[0].position().unwrap();
        let normal = doc.meshes[0].primitives[0].attributes["NORMAL"];
        doc.accessors[position].values = vec![0.0; 9];
        doc.accessors[position].values[0] = 1.0;
        doc.accessors[normal].values = vec![0.0, 0.0, 1.0].repeat(3);
        Weld { tolerance: 0.0 }.apply(&mut doc).unwrap();
        assert!(doc.meshes[0].primitives.is_empty());
    }
}
