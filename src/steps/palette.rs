//! Collapse untextured materials into palette-textured ones.

use super::texture::encode;
use crate::config::ImageFormat;
use crate::document::{Accessor, Document, ElementType, Material, MaterialId, Sampler, Texture, TextureId};
use crate::error::StepError;
use crate::pipeline::TransformStep;
use image::{DynamicImage, Rgb, RgbImage, Rgba, RgbaImage};
use serde_json::{json, Value};
use std::collections::BTreeMap;

/// Pixels per palette entry, in both directions.
const BLOCK_SIZE: u32 = 4;

const NEAREST: u32 = 9728;
const CLAMP_TO_EDGE: u32 = 33071;

/// Untextured materials that differ only in colour factors are grouped;
/// a group with at least `min` distinct colour sets is replaced by one
/// material sampling palette textures, and its primitives get a
/// `TEXCOORD_0` pointing at their palette block.
#[derive(Debug, Clone, Copy)]
pub struct Palette {
    pub min: usize,
}

/// Colour factors of one palette entry.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Swatch {
    base_color: [f32; 4],
    emissive: [f32; 3],
    metallic: f32,
    roughness: f32,
}

impl Swatch {
    fn of(material: &Material) -> Self {
        Self {
            base_color: material.base_color_factor(),
            emissive: material.emissive_factor(),
            metallic: material.metallic_factor(),
            roughness: material.roughness_factor(),
        }
    }

    fn bits(&self) -> Vec<u32> {
        self.base_color
            .iter()
            .chain(&self.emissive)
            .chain([&self.metallic, &self.roughness])
            .map(|v| v.to_bits())
            .collect()
    }
}

impl TransformStep for Palette {
    fn name(&self) -> &'static str {
        "palette"
    }

    fn apply(&self, doc: &mut Document) -> Result<(), StepError> {
        let mut used = vec![false; doc.materials.len()];
        for primitive in doc.meshes.iter().flat_map(|m| &m.primitives) {
            if let Some(flag) = primitive.material.and_then(|m| used.get_mut(m)) {
                *flag = true;
            }
        }

        let mut groups: BTreeMap<String, Vec<MaterialId>> = BTreeMap::new();
        for (id, material) in doc.materials.iter().enumerate() {
            if used[id] && !material.has_textures() {
                groups.entry(colorless_key(material)).or_default().push(id);
            }
        }

        for members in groups.into_values() {
            // Distinct swatches in first-seen order, and each member's block.
            let mut swatches: Vec<Swatch> = Vec::new();
            let mut seen: BTreeMap<Vec<u32>, usize> = BTreeMap::new();
            let mut block_of: BTreeMap<MaterialId, usize> = BTreeMap::new();
            for &id in &members {
                let swatch = Swatch::of(&doc.materials[id]);
                let block = *seen.entry(swatch.bits()).or_insert_with(|| {
                    swatches.push(swatch);
                    swatches.len() - 1
                });
                block_of.insert(id, block);
            }
            if swatches.len() < self.min.max(2) {
                continue;
            }

            let template = doc.materials[members[0]].clone();
            let material = build_palette_material(doc, &template, &swatches)?;
            let width = palette_width(swatches.len());
            let mut remapped = 0;
            for mesh_index in 0..doc.meshes.len() {
                for p in 0..doc.meshes[mesh_index].primitives.len() {
                    let primitive = &doc.meshes[mesh_index].primitives[p];
                    let Some(block) = primitive.material.and_then(|m| block_of.get(&m).copied()) else {
                        continue;
                    };
                    let count = doc.vertex_count(primitive);
                    let u = (block as u32 * BLOCK_SIZE + BLOCK_SIZE / 2) as f32 / width as f32;
                    let uv = doc.add_accessor(Accessor::new(ElementType::Vec2, [u, 0.5].repeat(count)));
                    let primitive = &mut doc.meshes[mesh_index].primitives[p];
                    primitive.attributes.insert("TEXCOORD_0".to_string(), uv);
                    primitive.material = Some(material);
                    remapped += 1;
                }
            }
            log::debug!(
                "Palette of {} colours replaces {} materials on {} primitives",
                swatches.len(),
                members.len(),
                remapped
            );
        }
        Ok(())
    }
}

/// Material JSON without colour factors.
fn colorless_key(material: &Material) -> String {
    let mut stripped = material.clone();
    strip_factors(&mut stripped);
    stripped.content_key()
}

fn strip_factors(material: &mut Material) {
    material.json.remove("emissiveFactor");
    let pbr = material.pbr_mut();
    pbr.remove("baseColorFactor");
    pbr.remove("metallicFactor");
    pbr.remove("roughnessFactor");
}

/// Power-of-two texture width holding `count` blocks.
fn palette_width(count: usize) -> u32 {
    (count as u32 * BLOCK_SIZE).next_power_of_two()
}

fn build_palette_material(
    doc: &mut Document,
    template: &Material,
    swatches: &[Swatch],
) -> Result<MaterialId, StepError> {
    let width = palette_width(swatches.len());
    let swatch_at = |x: u32| swatches.get((x / BLOCK_SIZE) as usize);

    let base = RgbaImage::from_fn(width, BLOCK_SIZE, |x, _| match swatch_at(x) {
        Some(s) => {
            let [r, g, b, a] = s.base_color;
            Rgba([linear_to_srgb(r), linear_to_srgb(g), linear_to_srgb(b), unit_to_byte(a)])
        }
        None => Rgba([0, 0, 0, 0]),
    });
    let metallic_roughness = RgbImage::from_fn(width, BLOCK_SIZE, |x, _| match swatch_at(x) {
        Some(s) => Rgb([0, unit_to_byte(s.roughness), unit_to_byte(s.metallic)]),
        None => Rgb([0, 0, 0]),
    });
    let emissive = swatches
        .iter()
        .any(|s| s.emissive != [0.0; 3])
        .then(|| {
            RgbImage::from_fn(width, BLOCK_SIZE, |x, _| match swatch_at(x) {
                Some(s) => Rgb(s.emissive.map(linear_to_srgb)),
                None => Rgb([0, 0, 0]),
            })
        });

    let base = add_palette_texture(doc, "PaletteBaseColor", DynamicImage::ImageRgba8(base))?;
    let metallic_roughness = add_palette_texture(
        doc,
        "PaletteMetallicRoughness",
        DynamicImage::ImageRgb8(metallic_roughness),
    )?;

    let mut material = template.clone();
    strip_factors(&mut material);
    material.name = Some("PaletteMaterial".to_string());
    let pbr = material.pbr_mut();
    pbr.insert("baseColorTexture".to_string(), json!({ "index": base }));
    pbr.insert(
        "metallicRoughnessTexture".to_string(),
        json!({ "index": metallic_roughness }),
    );
    if let Some(emissive) = emissive {
        let texture = add_palette_texture(doc, "PaletteEmissive", DynamicImage::ImageRgb8(emissive))?;
        material
            .json
            .insert("emissiveTexture".to_string(), json!({ "index": texture }));
        material
            .json
            .insert("emissiveFactor".to_string(), Value::from(vec![1.0; 3]));
    }
    Ok(doc.add_material(material))
}

fn add_palette_texture(doc: &mut Document, name: &str, image: DynamicImage) -> Result<TextureId, StepError> {
    let data = encode(&image, ImageFormat::Png, 0)?;
    Ok(doc.add_texture(Texture {
        name: Some(name.to_string()),
        uri: None,
        mime_type: ImageFormat::Png.mime_type().to_string(),
        data,
        sampler: Some(Sampler {
            mag_filter: Some(NEAREST),
            min_filter: Some(NEAREST),
            wrap_s: CLAMP_TO_EDGE,
            wrap_t: CLAMP_TO_EDGE,
        }),
    }))
}

fn unit_to_byte(value: f32) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0).round() as u8
}

fn linear_to_srgb(value: f32) -> u8 {
    let c = value.clamp(0.0, 1.0);
    let encoded = if c <= 0.0031308 {
        c * 12.92
    } else {
        1.055 * c.powf(1.0 / 2.4) - 0.055
    };
    unit_to_byte(encoded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    const COLORS: [[f32; 4]; 6] = [
        [1.0, 0.0, 0.0, 1.0],
        [0.0, 1.0, 0.0, 1.0],
        [0.0, 0.0, 1.0, 1.0],
        [1.0, 1.0, 0.0, 1.0],
        [0.0, 1.0, 1.0, 1.0],
        [1.0, 0.0, 1.0, 1.0],
    ];

    fn colored_cubes(colors: &[[f32; 4]]) -> Document {
        let mut doc = testing::empty_document();
        for (i, color) in colors.iter().enumerate() {
            let material = doc.add_material(testing::color_material(*color));
            let mesh = testing::add_cube_mesh(&mut doc, Some(material));
            testing::add_mesh_node(&mut doc, mesh, [i as f32 * 2.0, 0.0, 0.0]);
        }
        doc
    }

    #[test]
    fn test_palette_replaces_colour_materials() {
        let mut doc = colored_cubes(&COLORS);
        Palette { min: 5 }.apply(&mut doc).unwrap();
        doc.collect_garbage();

        assert_eq!(doc.materials.len(), 1);
        assert_eq!(doc.textures.len(), 2);
        let material = &doc.materials[0];
        assert_eq!(material.name.as_deref(), Some("PaletteMaterial"));
        assert_eq!(material.base_color_factor(), [1.0; 4]);
        assert_eq!(testing::texture_size(&doc.textures[0]), (32, 4));

        let base = image::load_from_memory(&doc.textures[0].data).unwrap().to_rgba8();
        for (mesh_index, color) in COLORS.iter().enumerate() {
            let primitive = &doc.meshes[mesh_index].primitives[0];
            assert_eq!(primitive.material, Some(0));
            let uv = doc.accessors[primitive.attributes["TEXCOORD_0"]].element(0).to_vec();
            let x = (uv[0] * 32.0) as u32;
            let expected = color.map(|c| (c * 255.0) as u8);
            assert_eq!(base.get_pixel(x, 2).0, expected);
        }

        let mr = image::load_from_memory(&doc.textures[1].data).unwrap().to_rgb8();
        // Roughness 0.5 in G, metallic 0 in B.
        assert_eq!(mr.get_pixel(2, 2).0, [0, 128, 0]);
    }

    #[test]
    fn test_too_few_colours_untouched() {
        let mut doc = colored_cubes(&COLORS[..4]);
        Palette { min: 5 }.apply(&mut doc).unwrap();
        assert_eq!(doc.materials.len(), 4);
        assert!(doc.textures.is_empty());
    }

    #[test]
    fn test_emissive_palette() {
        let mut doc = colored_cubes(&COLORS);
        doc.materials[0]
            .json
            .insert("emissiveFactor".to_string(), json!([1.0, 0.5, 0.0]));
        Palette { min: 5 }.apply(&mut doc).unwrap();
        doc.collect_garbage();

        assert_eq!(doc.textures.len(), 3);
        let slots = doc.materials[0].texture_slots();
        assert!(slots.iter().any(|s| s.slot == "emissiveTexture"));
    }

    #[test]
    fn test_groups_split_by_other_properties() {
        let mut doc = colored_cubes(&COLORS);
        doc.materials[0]
            .json
            .insert("alphaMode".to_string(), json!("BLEND"));
        Palette { min: 5 }.apply(&mut doc).unwrap();
        doc.collect_garbage();

        // Five opaque colours share a palette; the blended one keeps its material.
        assert_eq!(doc.materials.len(), 2);
        assert_eq!(doc.meshes[0].primitives[0].material, Some(0));
        assert_eq!(doc.materials[0].alpha_mode(), "BLEND");
        assert!((1..6).all(|m| doc.meshes[m].primitives[0].material == Some(1)));
    }
}
