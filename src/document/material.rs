//! Materials stored as raw glTF JSON.
//!
//! Keeping the material object as JSON lets extension data (clearcoat,
//! transmission, texture transforms, ...) pass through untouched. Texture
//! references are found structurally: any `*Texture` key whose value is an
//! object with an integer `index`.

use serde_json::{Map, Value};

/// Slot name used by normal maps.
pub const NORMAL_SLOT: &str = "normalTexture";

/// A texture reference found inside a material.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureSlot {
    /// Slot key, e.g. `baseColorTexture`, `normalTexture`, `clearcoatTexture`.
    pub slot: String,
    pub texture: usize,
    /// UV set read by the slot, after any `KHR_texture_transform` override.
    pub tex_coord: u32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Material {
    pub name: Option<String>,
    /// The material object without its `name`.
    pub json: Map<String, Value>,
}

impl Material {
    pub fn new(name: Option<String>, mut json: Map<String, Value>) -> Self {
        json.remove("name");
        Self { name, json }
    }

    /// All texture references, in a stable order.
    pub fn texture_slots(&self) -> Vec<TextureSlot> {
        let mut slots = Vec::new();
        collect_slots(&self.json, &mut slots);
        slots
    }

    pub fn has_textures(&self) -> bool {
        !self.texture_slots().is_empty()
    }

    /// Rewrite every texture index through `remap`. Slots mapped to `None` are removed.
    pub fn remap_textures(&mut self, remap: &mut impl FnMut(usize) -> Option<usize>) {
        remap_slots(&mut self.json, remap);
    }

    pub fn alpha_mode(&self) -> &str {
        self.json
            .get("alphaMode")
            .and_then(Value::as_str)
            .unwrap_or("OPAQUE")
    }

    pub fn base_color_factor(&self) -> [f32; 4] {
        read_factor(self.pbr().and_then(|p| p.get("baseColorFactor")), [1.0; 4])
    }

    pub fn emissive_factor(&self) -> [f32; 3] {
        read_factor(self.json.get("emissiveFactor"), [0.0; 3])
    }

    pub fn metallic_factor(&self) -> f32 {
        read_scalar(self.pbr().and_then(|p| p.get("metallicFactor")), 1.0)
    }

    pub fn roughness_factor(&self) -> f32 {
        read_scalar(self.pbr().and_then(|p| p.get("roughnessFactor")), 1.0)
    }

    fn pbr(&self) -> Option<&Map<String, Value>> {
        self.json
            .get("pbrMetallicRoughness")
            .and_then(Value::as_object)
    }

    /// Mutable `pbrMetallicRoughness` object, created if missing.
    pub fn pbr_mut(&mut self) -> &mut Map<String, Value> {
        let entry = self
            .json
            .entry("pbrMetallicRoughness")
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        match entry {
            Value::Object(map) => map,
            _ => unreachable!("pbrMetallicRoughness was just set to an object"),
        }
    }

    /// Canonical string of everything except the name. Used as a dedup key.
    pub fn content_key(&self) -> String {
        Value::Object(self.json.clone()).to_string()
    }
}

fn is_slot_key(key: &str) -> bool {
    key.ends_with("Texture")
}

fn slot_index(value: &Value) -> Option<usize> {
    value
        .as_object()?
        .get("index")?
        .as_u64()
        .map(|i| i as usize)
}

fn slot_tex_coord(info: &Map<String, Value>) -> u32 {
    let overridden = info
        .get("extensions")
        .and_then(|e| e.get("KHR_texture_transform"))
        .and_then(|t| t.get("texCoord"))
        .and_then(Value::as_u64);
    overridden
        .or_else(|| info.get("texCoord").and_then(Value::as_u64))
        .unwrap_or(0) as u32
}

fn collect_slots(map: &Map<String, Value>, out: &mut Vec<TextureSlot>) {
    for (key, value) in map {
        if is_slot_key(key) {
            if let (Some(texture), Some(info)) = (slot_index(value), value.as_object()) {
                out.push(TextureSlot {
                    slot: key.clone(),
                    texture,
                    tex_coord: slot_tex_coord(info),
                });
                continue;
            }
        }
        if let Some(child) = value.as_object() {
            collect_slots(child, out);
        }
    }
}

fn remap_slots(map: &mut Map<String, Value>, remap: &mut impl FnMut(usize) -> Option<usize>) {
    let mut removed = Vec::new();
    for (key, value) in map.iter_mut() {
        if is_slot_key(key) {
            if let Some(texture) = slot_index(value) {
                match remap(texture) {
                    Some(new_index) => {
                        if let Some(info) = value.as_object_mut() {
                            info.insert("index".to_string(), Value::from(new_index));
                        }
                    }
                    None => removed.push(key.clone()),
                }
                continue;
            }
        }
        if let Some(child) = value.as_object_mut() {
            remap_slots(child, remap);
        }
    }
    for key in removed {
        map.remove(&key);
    }
}

fn read_factor<const N: usize>(value: Option<&Value>, default: [f32; N]) -> [f32; N] {
    let Some(array) = value.and_then(Value::as_array) else {
        return default;
    };
    let mut out = default;
    for (slot, v) in out.iter_mut().zip(array) {
        if let Some(f) = v.as_f64() {
            *slot = f as f32;
        }
    }
    out
}

fn read_scalar(value: Option<&Value>, default: f32) -> f32 {
    value
        .and_then(Value::as_f64)
        .map(|f| f as f32)
        .unwrap_or(default)
}
