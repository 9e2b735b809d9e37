//! Merge duplicate textures, accessors, materials and meshes.

use crate::document::{AttributeMap, Document, PrimitiveMode};
use crate::error::StepError;
use crate::pipeline::TransformStep;
use std::collections::HashMap;

/// Points every reference at the first of a set of identical items, then
/// drops what became unreferenced. Names are ignored when comparing.
#[derive(Debug, Clone, Copy, Default)]
pub struct Dedup;

impl TransformStep for Dedup {
    fn name(&self) -> &'static str {
        "dedup"
    }

    fn apply(&self, doc: &mut Document) -> Result<(), StepError> {
        let textures = dedup_textures(doc);
        let accessors = dedup_accessors(doc);
        let materials = dedup_materials(doc);
        let meshes = dedup_meshes(doc);
        log::debug!(
            "Merged {} textures, {} accessors, {} materials, {} meshes",
            textures,
            accessors,
            materials,
            meshes
        );
        doc.collect_garbage();
        Ok(())
    }
}

/// First index of each distinct key. Returns the remap table and the number of duplicates.
fn first_occurrences<K: std::hash::Hash + Eq>(keys: impl Iterator<Item = K>) -> (Vec<usize>, usize) {
    let mut seen: HashMap<K, usize> = HashMap::new();
    let mut remap = Vec::new();
    let mut duplicates = 0;
    for (index, key) in keys.enumerate() {
        let first = *seen.entry(key).or_insert(index);
        if first != index {
            duplicates += 1;
        }
        remap.push(first);
    }
    (remap, duplicates)
}

fn dedup_textures(doc: &mut Document) -> usize {
    let (remap, duplicates) = first_occurrences(
        doc.textures
            .iter()
            .map(|t| (t.mime_type.as_str(), t.data.as_slice(), t.sampler.unwrap_or_default())),
    );
    if duplicates > 0 {
        for material in &mut doc.materials {
            material.remap_textures(&mut |t| Some(remap.get(t).copied().unwrap_or(t)));
        }
    }
    duplicates
}

fn dedup_accessors(doc: &mut Document) -> usize {
    let (remap, duplicates) = first_occurrences(doc.accessors.iter().map(|a| a.content_key()));
    if duplicates == 0 {
        return 0;
    }
    let map = |id: usize| remap.get(id).copied().unwrap_or(id);
    for mesh in &mut doc.meshes {
        for primitive in &mut mesh.primitives {
            primitive.remap_accessors(map);
        }
    }
    for node in &mut doc.nodes {
        if let Some(instancing) = &mut node.instancing {
            for id in instancing.values_mut() {
                *id = map(*id);
            }
        }
    }
    for skin in &mut doc.skins {
        skin.inverse_bind_matrices = skin.inverse_bind_matrices.map(map);
    }
    for animation in &mut doc.animations {
        for sampler in &mut animation.samplers {
            sampler.input = map(sampler.input);
            sampler.output = map(sampler.output);
        }
    }
    duplicates
}

fn dedup_materials(doc: &mut Document) -> usize {
    let (remap, duplicates) = first_occurrences(doc.materials.iter().map(|m| m.content_key()));
    if duplicates > 0 {
        for primitive in doc.meshes.iter_mut().flat_map(|m| &mut m.primitives) {
            primitive.material = primitive.material.map(|m| remap.get(m).copied().unwrap_or(m));
        }
    }
    duplicates
}

/// Everything that makes two meshes interchangeable.
type MeshKey = (
    Vec<(AttributeMap, Option<Vec<u32>>, Option<usize>, PrimitiveMode, Vec<AttributeMap>)>,
    Vec<u32>,
);

fn dedup_meshes(doc: &mut Document) -> usize {
    let keys = doc.meshes.iter().map(|mesh| -> MeshKey {
        let primitives = mesh
            .primitives
            .iter()
            .map(|p| (p.attributes.clone(), p.indices.clone(), p.material, p.mode, p.targets.clone()))
            .collect();
        (primitives, mesh.weights.iter().map(|w| w.to_bits()).collect())
    });
    let (remap, duplicates) = first_occurrences(keys);
    if duplicates > 0 {
        for node in &mut doc.nodes {
            node.mesh = node.mesh.map(|m| remap.get(m).copied().unwrap_or(m));
        }
    }
    duplicates
}
