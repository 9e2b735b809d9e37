//! Convert quantized vertex attributes back to float.

use crate::document::{AccessorId, ComponentType, Document};
use crate::error::StepError;
use crate::pipeline::TransformStep;
use std::collections::BTreeSet;

const QUANTIZATION_EXTENSION: &str = "KHR_mesh_quantization";

/// Rewrites integer vertex attributes (except `JOINTS_n`) as `f32`, applying
/// normalization, and drops `KHR_mesh_quantization`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Dequantize;

impl TransformStep for Dequantize {
    fn name(&self) -> &'static str {
        "dequantize"
    }

    fn apply(&self, doc: &mut Document) -> Result<(), StepError> {
        let mut ids: BTreeSet<AccessorId> = BTreeSet::new();
        for primitive in doc.meshes.iter().flat_map(|m| &m.primitives) {
            let maps = std::iter::once(&primitive.attributes).chain(&primitive.targets);
            for map in maps {
                ids.extend(
                    map.iter()
                        .filter(|(semantic, _)| !semantic.starts_with("JOINTS_"))
                        .map(|(_, id)| *id),
                );
            }
        }

        let mut converted = 0;
        for id in ids {
            let Some(accessor) = doc.accessors.get_mut(id) else {
                continue;
            };
            if accessor.component_type == ComponentType::F32 {
                continue;
            }
            if accessor.normalized {
                let component_type = accessor.component_type;
                for value in &mut accessor.values {
                    *value = component_type.denormalize(*value);
                }
            }
            accessor.component_type = ComponentType::F32;
            accessor.normalized = false;
            converted += 1;
        }
        if converted > 0 {
            log::debug!("Dequantized {} accessors", converted);
        }
        doc.extensions_used.remove(QUANTIZATION_EXTENSION);
        Ok(())
    }
}
