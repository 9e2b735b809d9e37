//! GLB output.

use super::codec::{self, Mode};
use super::glb;
use crate::document::*;
use crate::error::SerializeError;
use gltf_json as json;
use json::validation::Checked::Valid;
use json::validation::USize64;
use serde_json::{json as object, Map, Value};
use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};

/// Value of `asset.generator` in every written file.
pub const GENERATOR: &str = concat!("gltf-optimizer v", env!("CARGO_PKG_VERSION"));

const MESHOPT: &str = "EXT_meshopt_compression";
const INSTANCING: &str = "EXT_mesh_gpu_instancing";
const WEBP: &str = "EXT_texture_webp";
const AVIF: &str = "EXT_texture_avif";
const QUANTIZATION: &str = "KHR_mesh_quantization";

/// Serialize a document as a self-contained GLB.
pub fn write_glb(doc: &Document) -> Result<Vec<u8>, SerializeError> {
    if doc.buffers.len() > 1 {
        return Err(SerializeError::MultipleBuffers(doc.buffers.len()));
    }
    let mut writer = Writer::new(doc);
    for id in 0..doc.accessors.len() {
        writer.write_accessor(id)?;
    }
    let meshes = writer.write_meshes()?;
    let (json, bin) = writer.finish(meshes)?;
    log::debug!("Writing GLB: {} bytes JSON, {} bytes binary", json.len(), bin.len());
    glb::assemble(&json, &bin)
}

fn pad4(data: &mut Vec<u8>) {
    let padding = (4 - (data.len() % 4)) % 4;
    data.extend(std::iter::repeat(0u8).take(padding));
}

fn align4(size: usize) -> usize {
    (size + 3) & !3
}

/// Accessor as it will be stored. Matrix columns of 1- and 2-byte components
/// need padding, so those are widened to floats instead.
fn storable(accessor: &Accessor) -> Cow<'_, Accessor> {
    let is_matrix = matches!(
        accessor.element_type,
        ElementType::Mat2 | ElementType::Mat3 | ElementType::Mat4
    );
    if !is_matrix || accessor.component_type.size() == 4 {
        return Cow::Borrowed(accessor);
    }
    let values = (0..accessor.count())
        .flat_map(|i| accessor.element_normalized(i))
        .collect();
    Cow::Owned(Accessor {
        values,
        component_type: ComponentType::F32,
        normalized: false,
        ..accessor.clone()
    })
}

fn encode_elements(accessor: &Accessor, stride: usize) -> Vec<u8> {
    let element_size = accessor.element_size();
    let mut out = Vec::with_capacity(accessor.count() * stride);
    for element in accessor.values.chunks_exact(accessor.components()) {
        for value in element {
            accessor.component_type.write(*value, &mut out);
        }
        out.resize(out.len() + stride - element_size, 0);
    }
    out
}

fn semantic(name: &str) -> Option<json::mesh::Semantic> {
    use json::mesh::Semantic;
    match name {
        "POSITION" => return Some(Semantic::Positions),
        "NORMAL" => return Some(Semantic::Normals),
        "TANGENT" => return Some(Semantic::Tangents),
        _ => {}
    }
    let (prefix, set) = name.rsplit_once('_')?;
    let set: u32 = set.parse().ok()?;
    match prefix {
        "COLOR" => Some(Semantic::Colors(set)),
        "TEXCOORD" => Some(Semantic::TexCoords(set)),
        "JOINTS" => Some(Semantic::Joints(set)),
        "WEIGHTS" => Some(Semantic::Weights(set)),
        _ => None,
    }
}

fn index<T>(i: usize) -> json::Index<T> {
    json::Index::new(i as u32)
}

fn sampler_json(sampler: &Sampler) -> Value {
    let mut map = Map::new();
    if let Some(filter) = sampler.mag_filter {
        map.insert("magFilter".to_string(), Value::from(filter));
    }
    if let Some(filter) = sampler.min_filter {
        map.insert("minFilter".to_string(), Value::from(filter));
    }
    if sampler.wrap_s != 10497 {
        map.insert("wrapS".to_string(), Value::from(sampler.wrap_s));
    }
    if sampler.wrap_t != 10497 {
        map.insert("wrapT".to_string(), Value::from(sampler.wrap_t));
    }
    Value::Object(map)
}

/// Add `extensions.<name> = ext` to `root[key][index]`.
fn set_extension(root: &mut Value, key: &str, index: usize, name: &str, ext: Value) {
    let Some(Value::Object(item)) = root.get_mut(key).and_then(|v| v.get_mut(index)) else {
        return;
    };
    let extensions = item
        .entry("extensions")
        .or_insert_with(|| Value::Object(Map::new()));
    if let Some(extensions) = extensions.as_object_mut() {
        extensions.insert(name.to_string(), ext);
    }
}

struct Writer<'a> {
    doc: &'a Document,
    compress: bool,
    /// Accessors referenced as vertex attributes.
    vertex_accessors: BTreeSet<AccessorId>,
    /// Accessors that must carry min/max.
    bounded_accessors: BTreeSet<AccessorId>,
    bin: Vec<u8>,
    fallback_len: usize,
    views: Vec<json::buffer::View>,
    compressed_views: BTreeMap<usize, Value>,
    accessors: Vec<json::Accessor>,
}

impl<'a> Writer<'a> {
    fn new(doc: &'a Document) -> Self {
        let mut vertex_accessors = BTreeSet::new();
        let mut bounded_accessors = BTreeSet::new();
        for primitive in doc.meshes.iter().flat_map(|m| &m.primitives) {
            vertex_accessors.extend(primitive.accessor_ids());
            bounded_accessors.extend(primitive.position());
            bounded_accessors.extend(primitive.targets.iter().filter_map(|t| t.get("POSITION")));
        }
        for animation in &doc.animations {
            bounded_accessors.extend(animation.samplers.iter().map(|s| s.input));
        }
        Self {
            doc,
            compress: doc.geometry_compression == Some(GeometryCompression::Meshopt),
            vertex_accessors,
            bounded_accessors,
            bin: Vec::new(),
            fallback_len: 0,
            views: Vec::new(),
            compressed_views: BTreeMap::new(),
            accessors: Vec::new(),
        }
    }

    fn add_view(
        &mut self,
        bytes: &[u8],
        stride: Option<usize>,
        target: Option<json::buffer::Target>,
    ) -> json::Index<json::buffer::View> {
        pad4(&mut self.bin);
        let offset = self.bin.len();
        self.bin.extend_from_slice(bytes);
        self.views.push(json::buffer::View {
            buffer: json::Index::new(0),
            byte_length: USize64(bytes.len() as u64),
            byte_offset: Some(USize64(offset as u64)),
            byte_stride: stride.map(json::buffer::Stride),
            extensions: Default::default(),
            extras: Default::default(),
            name: None,
            target: target.map(Valid),
        });
        index(self.views.len() - 1)
    }

    /// Store `encoded` in the binary chunk and point a view in the fallback buffer at it.
    fn add_compressed_view(
        &mut self,
        raw_len: usize,
        encoded: &[u8],
        stride: usize,
        count: usize,
        mode: Mode,
        target: json::buffer::Target,
    ) -> json::Index<json::buffer::View> {
        pad4(&mut self.bin);
        let offset = self.bin.len();
        self.bin.extend_from_slice(encoded);
        let fallback_offset = self.fallback_len;
        self.fallback_len += align4(raw_len);

        self.views.push(json::buffer::View {
            buffer: json::Index::new(1),
            byte_length: USize64(raw_len as u64),
            byte_offset: Some(USize64(fallback_offset as u64)),
            byte_stride: (mode == Mode::Attributes).then_some(json::buffer::Stride(stride)),
            extensions: Default::default(),
            extras: Default::default(),
            name: None,
            target: Some(Valid(target)),
        });
        let view = self.views.len() - 1;
        self.compressed_views.insert(
            view,
            object!({
                "buffer": 0,
                "byteOffset": offset,
                "byteLength": encoded.len(),
                "byteStride": stride,
                "count": count,
                "mode": mode.as_str(),
            }),
        );
        index(view)
    }

    fn write_accessor(&mut self, id: AccessorId) -> Result<(), SerializeError> {
        let doc = self.doc;
        let accessor = storable(&doc.accessors[id]);
        let count = accessor.count();
        let vertex = self.vertex_accessors.contains(&id);

        let (buffer_view, sparse) = if accessor.sparse {
            (None, self.write_sparse(&accessor))
        } else if vertex {
            let stride = align4(accessor.element_size());
            let bytes = encode_elements(&accessor, stride);
            let view = if self.compress && count > 0 {
                let encoded = codec::encode_vertices(&bytes, count, stride)
                    .map_err(|e| SerializeError::Encode(format!("accessor {}: {}", id, e)))?;
                self.add_compressed_view(
                    bytes.len(),
                    &encoded,
                    stride,
                    count,
                    Mode::Attributes,
                    json::buffer::Target::ArrayBuffer,
                )
            } else {
                self.add_view(&bytes, Some(stride), Some(json::buffer::Target::ArrayBuffer))
            };
            (Some(view), None)
        } else {
            let bytes = encode_elements(&accessor, accessor.element_size());
            (Some(self.add_view(&bytes, None, None)), None)
        };

        let bounds = if self.bounded_accessors.contains(&id) {
            accessor.bounds().map(|(min, max)| {
                let denormalize = |values: Vec<f32>| -> Vec<f32> {
                    if accessor.normalized {
                        values
                            .into_iter()
                            .map(|v| accessor.component_type.denormalize(v))
                            .collect()
                    } else {
                        values
                    }
                };
                (denormalize(min), denormalize(max))
            })
        } else {
            None
        };

        self.accessors.push(json::Accessor {
            buffer_view,
            byte_offset: buffer_view.map(|_| USize64(0)),
            count: USize64(count as u64),
            component_type: Valid(json::accessor::GenericComponentType(
                accessor.component_type.to_json(),
            )),
            extensions: Default::default(),
            extras: Default::default(),
            type_: Valid(accessor.element_type.to_json()),
            min: bounds.as_ref().map(|(min, _)| json::Value::from(min.clone())),
            max: bounds.as_ref().map(|(_, max)| json::Value::from(max.clone())),
            name: accessor.name.clone(),
            normalized: accessor.normalized && accessor.component_type != ComponentType::F32,
            sparse,
        });
        Ok(())
    }

    /// Write the non-zero elements only. An all-zero accessor needs no data at all.
    fn write_sparse(&mut self, accessor: &Accessor) -> Option<json::accessor::sparse::Sparse> {
        use json::accessor::sparse;

        let targets: Vec<usize> = (0..accessor.count())
            .filter(|i| accessor.element(*i).iter().any(|v| *v != 0.0))
            .collect();
        let last = *targets.last()?;

        let index_type = if last < 256 {
            ComponentType::U8
        } else if last < 65536 {
            ComponentType::U16
        } else {
            ComponentType::U32
        };
        let mut index_bytes = Vec::with_capacity(targets.len() * index_type.size());
        let mut value_bytes = Vec::with_capacity(targets.len() * accessor.element_size());
        for &target in &targets {
            match index_type {
                ComponentType::U8 => index_bytes.push(target as u8),
                ComponentType::U16 => index_bytes.extend_from_slice(&(target as u16).to_le_bytes()),
                _ => index_bytes.extend_from_slice(&(target as u32).to_le_bytes()),
            }
            for value in accessor.element(target) {
                accessor.component_type.write(*value, &mut value_bytes);
            }
        }
        let indices_view = self.add_view(&index_bytes, None, None);
        let values_view = self.add_view(&value_bytes, None, None);

        Some(sparse::Sparse {
            count: USize64(targets.len() as u64),
            indices: sparse::Indices {
                buffer_view: indices_view,
                byte_offset: USize64(0),
                component_type: Valid(json::accessor::IndexComponentType(index_type.to_json())),
                extensions: Default::default(),
                extras: Default::default(),
            },
            values: sparse::Values {
                buffer_view: values_view,
                byte_offset: USize64(0),
                extensions: Default::default(),
                extras: Default::default(),
            },
            extensions: Default::default(),
            extras: Default::default(),
        })
    }

    fn write_indices(
        &mut self,
        indices: &[u32],
        vertex_count: usize,
        mode: PrimitiveMode,
    ) -> Result<json::Index<json::Accessor>, SerializeError> {
        let max = indices.iter().copied().max().unwrap_or(0);
        let (component_type, size) = if max < 65535 {
            (ComponentType::U16, 2)
        } else {
            (ComponentType::U32, 4)
        };
        let mut bytes = Vec::with_capacity(indices.len() * size);
        for &i in indices {
            if size == 2 {
                bytes.extend_from_slice(&(i as u16).to_le_bytes());
            } else {
                bytes.extend_from_slice(&i.to_le_bytes());
            }
        }

        let target = json::buffer::Target::ElementArrayBuffer;
        let view = if self.compress && !indices.is_empty() {
            let (codec_mode, encoded) = if mode == PrimitiveMode::Triangles && indices.len() % 3 == 0 {
                (Mode::Triangles, codec::encode_triangles(indices, vertex_count))
            } else {
                (Mode::Indices, codec::encode_index_sequence(indices, vertex_count))
            };
            let encoded = encoded.map_err(SerializeError::Encode)?;
            self.add_compressed_view(bytes.len(), &encoded, size, indices.len(), codec_mode, target)
        } else {
            self.add_view(&bytes, None, Some(target))
        };

        self.accessors.push(json::Accessor {
            buffer_view: Some(view),
            byte_offset: Some(USize64(0)),
            count: USize64(indices.len() as u64),
            component_type: Valid(json::accessor::GenericComponentType(component_type.to_json())),
            extensions: Default::default(),
            extras: Default::default(),
            type_: Valid(json::accessor::Type::Scalar),
            min: None,
            max: None,
            name: None,
            normalized: false,
            sparse: None,
        });
        Ok(index(self.accessors.len() - 1))
    }

    fn write_meshes(&mut self) -> Result<Vec<json::Mesh>, SerializeError> {
        let doc = self.doc;
        let mut meshes = Vec::with_capacity(doc.meshes.len());
        for mesh in &doc.meshes {
            let mut primitives = Vec::with_capacity(mesh.primitives.len());
            for primitive in &mesh.primitives {
                let mut attributes = BTreeMap::new();
                for (name, id) in &primitive.attributes {
                    match semantic(name) {
                        Some(semantic) => {
                            attributes.insert(Valid(semantic), index(*id));
                        }
                        None => log::warn!("Dropping vertex attribute {}", name),
                    }
                }
                let indices = match &primitive.indices {
                    Some(indices) => Some(self.write_indices(
                        indices,
                        doc.vertex_count(primitive),
                        primitive.mode,
                    )?),
                    None => None,
                };
                let targets: Vec<json::mesh::MorphTarget> = primitive
                    .targets
                    .iter()
                    .map(|target| json::mesh::MorphTarget {
                        positions: target.get("POSITION").map(|id| index(*id)),
                        normals: target.get("NORMAL").map(|id| index(*id)),
                        tangents: target.get("TANGENT").map(|id| index(*id)),
                    })
                    .collect();
                primitives.push(json::mesh::Primitive {
                    attributes,
                    extensions: Default::default(),
                    extras: Default::default(),
                    indices,
                    material: primitive.material.map(index),
                    mode: Valid(primitive.mode.to_json()),
                    targets: (!targets.is_empty()).then_some(targets),
                });
            }
            meshes.push(json::Mesh {
                extensions: Default::default(),
                extras: Default::default(),
                name: mesh.name.clone(),
                primitives,
                weights: (!mesh.weights.is_empty()).then(|| mesh.weights.clone()),
            });
        }
        Ok(meshes)
    }

    fn write_nodes(&self) -> Vec<json::Node> {
        self.doc
            .nodes
            .iter()
            .map(|node| json::Node {
                camera: node.camera.map(index),
                children: (!node.children.is_empty())
                    .then(|| node.children.iter().copied().map(index).collect()),
                extensions: Default::default(),
                extras: Default::default(),
                matrix: None,
                mesh: node.mesh.map(index),
                name: node.name.clone(),
                rotation: (node.rotation != [0.0, 0.0, 0.0, 1.0])
                    .then_some(json::scene::UnitQuaternion(node.rotation)),
                scale: (node.scale != [1.0; 3]).then_some(node.scale),
                translation: (node.translation != [0.0; 3]).then_some(node.translation),
                skin: node.skin.map(index),
                weights: (!node.weights.is_empty()).then(|| node.weights.clone()),
            })
            .collect()
    }

    fn write_animations(&self) -> Vec<json::Animation> {
        use json::animation::{Interpolation as Interp, Property};
        self.doc
            .animations
            .iter()
            .map(|animation| json::Animation {
                extensions: Default::default(),
                extras: Default::default(),
                channels: animation
                    .channels
                    .iter()
                    .map(|channel| json::animation::Channel {
                        sampler: index(channel.sampler),
                        target: json::animation::Target {
                            extensions: Default::default(),
                            extras: Default::default(),
                            node: index(channel.node),
                            path: Valid(match channel.path {
                                AnimationPath::Translation => Property::Translation,
                                AnimationPath::Rotation => Property::Rotation,
                                AnimationPath::Scale => Property::Scale,
                                AnimationPath::Weights => Property::MorphTargetWeights,
                            }),
                        },
                        extensions: Default::default(),
                        extras: Default::default(),
                    })
                    .collect(),
                name: animation.name.clone(),
                samplers: animation
                    .samplers
                    .iter()
                    .map(|sampler| json::animation::Sampler {
                        extensions: Default::default(),
                        extras: Default::default(),
                        input: index(sampler.input),
                        interpolation: Valid(match sampler.interpolation {
                            Interpolation::Linear => Interp::Linear,
                            Interpolation::Step => Interp::Step,
                            Interpolation::CubicSpline => Interp::CubicSpline,
                        }),
                        output: index(sampler.output),
                    })
                    .collect(),
            })
            .collect()
    }

    /// Images, textures and samplers as raw JSON; images are deduplicated by content.
    fn write_textures(&mut self, used: &mut BTreeSet<String>) -> (Vec<Value>, Vec<Value>, Vec<Value>) {
        let doc = self.doc;
        let mut images = Vec::new();
        let mut image_ids: BTreeMap<(&str, &[u8]), usize> = BTreeMap::new();
        let mut samplers: Vec<Sampler> = Vec::new();
        let mut textures = Vec::with_capacity(doc.textures.len());

        for texture in &doc.textures {
            let key = (texture.mime_type.as_str(), texture.data.as_slice());
            let source = match image_ids.get(&key) {
                Some(source) => *source,
                None => {
                    let view = self.add_view(&texture.data, None, None);
                    let mut image = Map::new();
                    image.insert("bufferView".to_string(), Value::from(view.value()));
                    image.insert("mimeType".to_string(), Value::from(texture.mime_type.clone()));
                    if let Some(name) = &texture.name {
                        image.insert("name".to_string(), Value::from(name.clone()));
                    }
                    images.push(Value::Object(image));
                    image_ids.insert(key, images.len() - 1);
                    images.len() - 1
                }
            };

            let mut out = Map::new();
            if let Some(name) = &texture.name {
                out.insert("name".to_string(), Value::from(name.clone()));
            }
            if let Some(sampler) = &texture.sampler {
                let id = match samplers.iter().position(|s| s == sampler) {
                    Some(id) => id,
                    None => {
                        samplers.push(*sampler);
                        samplers.len() - 1
                    }
                };
                out.insert("sampler".to_string(), Value::from(id));
            }
            let extension = match texture.mime_type.as_str() {
                "image/webp" => Some(WEBP),
                "image/avif" => Some(AVIF),
                _ => None,
            };
            match extension {
                Some(name) => {
                    used.insert(name.to_string());
                    let mut extensions = Map::new();
                    extensions.insert(name.to_string(), object!({ "source": source }));
                    out.insert("extensions".to_string(), Value::Object(extensions));
                }
                None => {
                    out.insert("source".to_string(), Value::from(source));
                }
            }
            textures.push(Value::Object(out));
        }

        (images, textures, samplers.iter().map(sampler_json).collect())
    }

    fn finish(mut self, meshes: Vec<json::Mesh>) -> Result<(Vec<u8>, Vec<u8>), SerializeError> {
        let doc = self.doc;
        let mut used: BTreeSet<String> = doc.extensions_used.clone();
        let (images, textures, samplers) = self.write_textures(&mut used);

        let compressed = !self.compressed_views.is_empty();
        if compressed {
            used.insert(MESHOPT.to_string());
        }
        if doc.nodes.iter().any(|n| n.instancing.is_some()) {
            used.insert(INSTANCING.to_string());
        }
        let required: Vec<String> = used
            .iter()
            .filter(|e| [MESHOPT, WEBP, AVIF, QUANTIZATION].contains(&e.as_str()))
            .cloned()
            .collect();

        let mut buffers = Vec::new();
        if !self.bin.is_empty() || compressed {
            buffers.push(json::Buffer {
                byte_length: USize64(self.bin.len() as u64),
                extensions: Default::default(),
                extras: Default::default(),
                name: doc.buffers.first().and_then(|b| b.name.clone()),
                uri: None,
            });
        }
        if compressed {
            buffers.push(json::Buffer {
                byte_length: USize64(self.fallback_len as u64),
                extensions: Default::default(),
                extras: Default::default(),
                name: None,
                uri: None,
            });
        }

        let root = json::Root {
            accessors: std::mem::take(&mut self.accessors),
            animations: self.write_animations(),
            asset: json::Asset {
                copyright: doc.copyright.clone(),
                generator: Some(GENERATOR.to_string()),
                ..Default::default()
            },
            buffers,
            buffer_views: std::mem::take(&mut self.views),
            cameras: doc.cameras.clone(),
            extensions_used: used.into_iter().collect(),
            extensions_required: required,
            meshes,
            nodes: self.write_nodes(),
            scene: doc.scene.map(index),
            scenes: doc
                .scenes
                .iter()
                .map(|scene| json::Scene {
                    extensions: Default::default(),
                    extras: Default::default(),
                    name: scene.name.clone(),
                    nodes: scene.nodes.iter().copied().map(index).collect(),
                })
                .collect(),
            skins: doc
                .skins
                .iter()
                .map(|skin| json::Skin {
                    extensions: Default::default(),
                    extras: Default::default(),
                    inverse_bind_matrices: skin.inverse_bind_matrices.map(index),
                    joints: skin.joints.iter().copied().map(index).collect(),
                    name: skin.name.clone(),
                    skeleton: skin.skeleton.map(index),
                })
                .collect(),
            ..Default::default()
        };

        let mut value = serde_json::to_value(&root)?;
        for (view, ext) in std::mem::take(&mut self.compressed_views) {
            set_extension(&mut value, "bufferViews", view, MESHOPT, ext);
        }
        if compressed {
            set_extension(&mut value, "buffers", 1, MESHOPT, object!({"fallback": true}));
        }
        for (id, node) in doc.nodes.iter().enumerate() {
            if let Some(attributes) = &node.instancing {
                set_extension(
                    &mut value,
                    "nodes",
                    id,
                    INSTANCING,
                    object!({ "attributes": attributes }),
                );
            }
        }

        let materials: Vec<Value> = doc
            .materials
            .iter()
            .map(|material| {
                let mut json = material.json.clone();
                if let Some(name) = &material.name {
                    json.insert("name".to_string(), Value::from(name.clone()));
                }
                Value::Object(json)
            })
            .collect();
        if let Some(top) = value.as_object_mut() {
            for (key, items) in [
                ("materials", materials),
                ("textures", textures),
                ("images", images),
                ("samplers", samplers),
            ] {
                if !items.is_empty() {
                    top.insert(key.to_string(), Value::Array(items));
                }
            }
        }

        Ok((serde_json::to_vec(&value)?, self.bin))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::read_slice;
    use crate::testing;

    fn json_chunk(glb: &[u8]) -> Value {
        let (json, _) = glb::parse(glb).unwrap();
        serde_json::from_slice(json).unwrap()
    }

    #[test]
    fn test_round_trip_preserves_geometry_and_materials() {
        let mut doc = testing::triangle_document();
        let material = doc.add_material(testing::color_material([1.0, 0.0, 0.0, 1.0]));
        doc.meshes[0].primitives[0].material = Some(material);
        doc.nodes[0].translation = [1.0, 2.0, 3.0];

        let glb = write_glb(&doc).unwrap();
        assert_eq!(&glb[0..4], b"glTF");
        let back = read_slice(&glb, None).unwrap();

        let primitive = &back.meshes[0].primitives[0];
        assert_eq!(primitive.indices.as_deref(), Some(&[0, 1, 2][..]));
        let position = &back.accessors[primitive.position().unwrap()];
        assert_eq!(position.values, doc.accessors[0].values);
        assert_eq!(back.materials[primitive.material.unwrap()].base_color_factor(), [1.0, 0.0, 0.0, 1.0]);
        assert_eq!(back.nodes[0].translation, [1.0, 2.0, 3.0]);
        assert_eq!(back.scenes[0].nodes, vec![0]);
    }

    #[test]
    fn test_json_layout() {
        let doc = testing::triangle_document();
        let json = json_chunk(&write_glb(&doc).unwrap());
        assert_eq!(json["asset"]["generator"], GENERATOR);
        // Vertex views carry a stride and ARRAY_BUFFER target; indices are u16
        assert_eq!(json["bufferViews"][0]["byteStride"], 12);
        assert_eq!(json["bufferViews"][0]["target"], 34962);
        assert_eq!(json["accessors"][2]["componentType"], 5123);
        assert_eq!(json["accessors"][0]["min"], object!([0.0, 0.0, 0.0]));
        assert_eq!(json["buffers"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_large_meshes_use_u32_indices() {
        let mut doc = testing::empty_document();
        let mesh = testing::add_grid_mesh(&mut doc, 256);
        testing::add_mesh_node(&mut doc, mesh, [0.0; 3]);
        let json = json_chunk(&write_glb(&doc).unwrap());
        let indices = json["meshes"][0]["primitives"][0]["indices"].as_u64().unwrap() as usize;
        assert_eq!(json["accessors"][indices]["componentType"], 5125);
    }

    #[test]
    fn test_multiple_buffers_are_rejected() {
        let mut doc = testing::triangle_document();
        doc.buffers.push(Buffer::default());
        assert!(matches!(write_glb(&doc), Err(SerializeError::MultipleBuffers(2))));
    }

    #[test]
    fn test_meshopt_compression_round_trip() {
        let mut doc = testing::empty_document();
        let mesh = testing::add_cube_mesh(&mut doc, None);
        testing::add_mesh_node(&mut doc, mesh, [0.0; 3]);
        doc.geometry_compression = Some(GeometryCompression::Meshopt);

        let glb = write_glb(&doc).unwrap();
        let json = json_chunk(&glb);
        assert!(json["extensionsRequired"]
            .as_array()
            .unwrap()
            .contains(&Value::from(MESHOPT)));
        assert_eq!(json["buffers"][1]["extensions"][MESHOPT]["fallback"], true);
        assert_eq!(json["bufferViews"][0]["buffer"], 1);
        assert_eq!(json["bufferViews"][0]["extensions"][MESHOPT]["mode"], "ATTRIBUTES");

        let back = read_slice(&glb, None).unwrap();
        assert_eq!(back.buffers.len(), 1);
        assert_eq!(back.stats().triangles, 12);
        let before = &doc.accessors[doc.meshes[0].primitives[0].position().unwrap()];
        let after = &back.accessors[back.meshes[0].primitives[0].position().unwrap()];
        assert_eq!(before.values, after.values);
    }

    #[test]
    fn test_sparse_accessor() {
        let mut doc = testing::triangle_document();
        let mut values = vec![0.0; 30];
        values[7] = 2.5;
        let mut accessor = Accessor::new(ElementType::Scalar, values.clone());
        accessor.sparse = true;
        let id = doc.add_accessor(accessor);
        doc.animations.push(Animation {
            name: None,
            channels: vec![AnimationChannel {
                sampler: 0,
                node: 0,
                path: AnimationPath::Weights,
            }],
            samplers: vec![AnimationSampler {
                input: id,
                output: id,
                interpolation: Interpolation::Step,
            }],
        });

        let glb = write_glb(&doc).unwrap();
        let json = json_chunk(&glb);
        assert_eq!(json["accessors"][id]["sparse"]["count"], 1);
        assert!(json["accessors"][id].get("bufferView").is_none());

        let back = read_slice(&glb, None).unwrap();
        let input = back.animations[0].samplers[0].input;
        assert_eq!(back.accessors[input].values, values);
    }

    #[test]
    fn test_images_are_deduplicated_and_webp_is_required() {
        let mut doc = testing::triangle_document();
        let png = testing::png_texture("a", 2, 2);
        doc.add_texture(png.clone());
        doc.add_texture(Texture {
            name: Some("b".to_string()),
            ..png
        });
        doc.add_texture(Texture {
            name: None,
            uri: None,
            mime_type: "image/webp".to_string(),
            data: vec![1, 2, 3, 4],
            sampler: Some(Sampler {
                mag_filter: Some(9729),
                ..Default::default()
            }),
        });

        let json = json_chunk(&write_glb(&doc).unwrap());
        assert_eq!(json["images"].as_array().unwrap().len(), 2);
        assert_eq!(json["textures"][0]["source"], 0);
        assert_eq!(json["textures"][1]["source"], 0);
        assert_eq!(json["textures"][2]["extensions"][WEBP]["source"], 1);
        assert_eq!(json["samplers"][0]["magFilter"], 9729);
        assert!(json["extensionsRequired"]
            .as_array()
            .unwrap()
            .contains(&Value::from(WEBP)));
    }

    #[test]
    fn test_instancing_extension() {
        let mut doc = testing::triangle_document();
        let translations = doc.add_accessor(Accessor::new(ElementType::Vec3, vec![0.0; 6]));
        let mut attributes = InstanceAttributes::new();
        attributes.insert("TRANSLATION".to_string(), translations);
        doc.nodes[0].instancing = Some(attributes);

        let glb = write_glb(&doc).unwrap();
        let json = json_chunk(&glb);
        assert_eq!(
            json["nodes"][0]["extensions"][INSTANCING]["attributes"]["TRANSLATION"],
            translations
        );
        assert!(json["extensionsUsed"]
            .as_array()
            .unwrap()
            .contains(&Value::from(INSTANCING)));

        let back = read_slice(&glb, None).unwrap();
        let instancing = back.nodes[0].instancing.as_ref().unwrap();
        assert_eq!(back.accessors[instancing["TRANSLATION"]].count(), 2);
    }

    #[test]
    fn test_output_is_deterministic() {
        let mut doc = testing::empty_document();
        let mesh = testing::add_cube_mesh(&mut doc, None);
        testing::add_mesh_node(&mut doc, mesh, [1.0, 0.0, 0.0]);
        doc.geometry_compression = Some(GeometryCompression::Meshopt);
        assert_eq!(write_glb(&doc).unwrap(), write_glb(&doc).unwrap());
    }
}
