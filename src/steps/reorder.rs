//! Vertex cache and vertex fetch optimization.

use super::{compact_primitive, retain_primitives};
use crate::document::{Document, PrimitiveMode};
use crate::error::StepError;
use crate::pipeline::TransformStep;

/// Reorders triangles for the post-transform vertex cache, then vertices in
/// order of first use.
#[derive(Debug, Clone, Copy, Default)]
pub struct Reorder;

impl TransformStep for Reorder {
    fn name(&self) -> &'static str {
        "reorder"
    }

    fn apply(&self, doc: &mut Document) -> Result<(), StepError> {
        retain_primitives(doc, |doc, primitive| {
            if primitive.mode != PrimitiveMode::Triangles {
                return Ok(true);
            }
            let vertex_count = doc.vertex_count(primitive);
            if let Some(indices) = primitive.indices.as_mut() {
                if indices.len() >= 3 && vertex_count > 0 {
                    *indices = meshopt::optimize_vertex_cache(indices, vertex_count);
                }
            }
            compact_primitive(doc, primitive);
            Ok(true)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    #[test]
    fn test_reorder_preserves_triangles() {
        let mut doc = testing::empty_document();
        let mesh = testing::add_grid_mesh(&mut doc, 8);
        let before = doc.meshes[mesh].primitives[0].clone();
        let positions_before = doc.accessors[before.position().unwrap()].clone();

        Reorder.apply(&mut doc).unwrap();

        let after = &doc.meshes[mesh].primitives[0];
        let positions_after = &doc.accessors[after.position().unwrap()];
        let triangle_set = |indices: &[u32], positions: &crate::document::Accessor| {
            let mut triangles: Vec<Vec<[u32; 3]>> = indices
                .chunks_exact(3)
                .map(|t| {
                    let mut corners: Vec<[u32; 3]> = t
                        .iter()
                        .map(|i| {
                            let p = positions.element(*i as usize);
                            [p[0].to_bits(), p[1].to_bits(), p[2].to_bits()]
                        })
                        .collect();
                    corners.sort();
                    corners
                })
                .collect();
            triangles.sort();
            triangles
        };
        assert_eq!(
            triangle_set(before.indices.as_ref().unwrap(), &positions_before),
            triangle_set(after.indices.as_ref().unwrap(), positions_after)
        );

        // First use order: the first index is 0 and indices never skip ahead.
        let mut next = 0;
        for &i in after.indices.as_ref().unwrap() {
            assert!(i <= next);
            if i == next {
                next += 1;
            }
        }
    }

    #[test]
    fn test_skips_points() {
        let mut doc = testing::triangle_document();
        doc.meshes[0].primitives[0].mode = PrimitiveMode::Points;
        doc.meshes[0].primitives[0].indices = Some(vec![2, 1, 0]);
        Reorder.apply(&mut doc).unwrap();
        assert_eq!(doc.meshes[0].primitives[0].indices, Some(vec![2, 1, 0]));
    }
}
