//! Mesh decimation.

use super::{compact_primitive, retain_primitives};
use crate::document::{ComponentType, Document, ElementType, PrimitiveMode};
use crate::error::StepError;
use crate::pipeline::TransformStep;
use meshopt::{SimplifyOptions, VertexDataAdapter};

/// Decimates indexed triangle primitives.
///
/// `ratio` is the fraction of indices to aim for and `error` the largest
/// deviation allowed, relative to the mesh extent. The error bound wins: a
/// ratio of 0 simplifies as far as the error allows. Primitives that
/// collapse completely are removed.
#[derive(Debug, Clone, Copy)]
pub struct Simplify {
    pub ratio: f32,
    pub error: f32,
}

impl TransformStep for Simplify {
    fn name(&self) -> &'static str {
        "simplify"
    }

    fn apply(&self, doc: &mut Document) -> Result<(), StepError> {
        let mut before = 0;
        let mut after = 0;
        retain_primitives(doc, |doc, primitive| {
            if primitive.mode != PrimitiveMode::Triangles {
                return Ok(true);
            }
            let (Some(indices), Some(position)) = (primitive.indices.as_ref(), primitive.position()) else {
                return Ok(true);
            };
            let accessor = &doc.accessors[position];
            if accessor.element_type != ElementType::Vec3 || accessor.component_type != ComponentType::F32 {
                log::warn!("Skipping simplification of a primitive with quantized positions");
                return Ok(true);
            }

            let bytes: &[u8] = bytemuck::cast_slice(&accessor.values);
            let adapter = VertexDataAdapter::new(bytes, 12, 0)
                .map_err(|e| StepError::Geometry(format!("{:?}", e)))?;
            let target = (indices.len() as f32 * self.ratio) as usize / 3 * 3;
            let simplified = meshopt::simplify(
                indices,
                &adapter,
                target,
                self.error,
                SimplifyOptions::None,
                None,
            );
            before += indices.len() / 3;
            after += simplified.len() / 3;

            if simplified.is_empty() {
                return Ok(false);
            }
            primitive.indices = Some(simplified);
            compact_primitive(doc, primitive);
            Ok(true)
        })?;
        log::debug!("Simplified {} triangles to {}", before, after);
        Ok(())
    }
}
