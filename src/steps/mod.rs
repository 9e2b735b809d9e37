//! Document transformation steps.
//!
//! Each step mutates the document in place. Steps that replace geometry add
//! new accessors and leave the old ones for [`Prune`] to collect.

mod compression;
mod dedup;
mod dequantize;
mod flatten;
mod instance;
mod join;
mod palette;
mod prune;
mod reorder;
mod resample;
mod simplify;
mod sparse;
mod texture;
mod unpartition;
mod weld;

pub use compression::MeshoptCompression;
pub use dedup::Dedup;
pub use dequantize::Dequantize;
pub use flatten::Flatten;
pub use instance::Instance;
pub use join::Join;
pub use palette::Palette;
pub use prune::Prune;
pub use reorder::Reorder;
pub use resample::{Resample, DEFAULT_RESAMPLE_TOLERANCE};
pub use simplify::Simplify;
pub use sparse::{Sparse, DEFAULT_SPARSE_RATIO};
pub use texture::{TextureCompress, TextureSelector, NORMAL_JPEG_QUALITY};
pub use unpartition::Unpartition;
pub use weld::Weld;

use crate::document::{Document, Primitive};
use crate::error::StepError;

/// Renumber a primitive's vertices in order of first use by its indices,
/// dropping unreferenced ones. Attribute and morph target accessors are
/// replaced by compacted copies. Does nothing for non-indexed primitives.
pub(crate) fn compact_primitive(doc: &mut Document, primitive: &mut Primitive) {
    let vertex_count = doc.vertex_count(primitive);
    let Some(indices) = primitive.indices.as_mut() else {
        return;
    };
    let mut remap = vec![u32::MAX; vertex_count];
    let mut order = Vec::with_capacity(vertex_count);
    for index in indices.iter_mut() {
        let slot = &mut remap[*index as usize];
        if *slot == u32::MAX {
            *slot = order.len() as u32;
            order.push(*index);
        }
        *index = *slot;
    }
    let unchanged = order.len() == vertex_count && order.iter().enumerate().all(|(i, v)| i as u32 == *v);
    if unchanged {
        return;
    }

    let mut replace = |id: &mut usize| {
        let compacted = doc.accessors[*id].gather(&order);
        *id = doc.add_accessor(compacted);
    };
    primitive.attributes.values_mut().for_each(&mut replace);
    for target in &mut primitive.targets {
        target.values_mut().for_each(&mut replace);
    }
}

/// Run `f` on every primitive of every mesh with the document available.
/// Returning `false` removes the primitive.
pub(crate) fn retain_primitives(
    doc: &mut Document,
    mut f: impl FnMut(&mut Document, &mut Primitive) -> Result<bool, StepError>,
) -> Result<(), StepError> {
    for mesh_index in 0..doc.meshes.len() {
        let primitives = std::mem::take(&mut doc.meshes[mesh_index].primitives);
        let mut kept = Vec::with_capacity(primitives.len());
        for mut primitive in primitives {
            if f(doc, &mut primitive)? {
                kept.push(primitive);
            }
        }
        doc.meshes[mesh_index].primitives = kept;
    }
    Ok(())
}
