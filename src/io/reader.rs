//! glTF/GLB input.

use super::{codec, glb};
use crate::document::*;
use crate::error::LoadError;
use base64::Engine;
use gltf_json as json;
use json::validation::Checked;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;

/// Required extensions that cannot be decoded here.
const UNSUPPORTED_REQUIRED: &[&str] = &["KHR_draco_mesh_compression", "KHR_texture_basisu"];

/// Largest element count accepted for an accessor with no buffer view.
/// Such accessors are all zeros apart from sparse overrides.
const MAX_UNBACKED_COUNT: usize = 1 << 24;

/// Largest size ratio between a decoded `EXT_meshopt_compression` view and
/// its compressed bytes. The codec never expands data this far.
const MAX_DECODE_RATIO: usize = 1024;

/// Extensions the writer derives from document state rather than passing through.
const DERIVED_EXTENSIONS: &[&str] = &[
    "EXT_meshopt_compression",
    "EXT_mesh_gpu_instancing",
    "EXT_texture_webp",
    "EXT_texture_avif",
];

/// Read a `.gltf` or `.glb` file. External resources resolve relative to its directory.
pub fn read_path(path: impl AsRef<Path>) -> Result<Document, LoadError> {
    let path = path.as_ref();
    let data = std::fs::read(path)?;
    read_slice(&data, path.parent())
}

/// Read a glTF document from memory. Without `base`, only embedded resources resolve.
pub fn read_slice(data: &[u8], base: Option<&Path>) -> Result<Document, LoadError> {
    let (json_bytes, bin) = if glb::is_glb(data) {
        glb::parse(data)?
    } else {
        (data, None)
    };

    let mut value: Value = serde_json::from_slice(json_bytes)?;
    let object = value
        .as_object_mut()
        .ok_or_else(|| LoadError::Malformed("top level is not a JSON object".to_string()))?;
    check_required(object)?;

    // Materials and textures stay raw so extension data survives untouched.
    let raw = RawParts {
        materials: take_array(object, "materials"),
        textures: take_array(object, "textures"),
        images: take_array(object, "images"),
        samplers: take_array(object, "samplers"),
        meshes: serde_json::from_value(Value::Array(take_array(object, "meshes")))?,
    };
    let root = json::Root::deserialize(&value)?;

    let mut reader = Reader {
        root: &root,
        raw: &value,
        base,
        buffers: Vec::new(),
        views: Vec::new(),
        view_partitions: Vec::new(),
        accessor_ids: BTreeMap::new(),
        doc: Document::new(),
    };
    reader.load_buffers(bin)?;
    reader.load_views()?;
    reader.load_textures(&raw)?;
    reader.load_materials(&raw)?;
    reader.load_meshes(raw.meshes)?;
    reader.load_nodes()?;
    reader.load_scenes()?;
    reader.load_skins()?;
    reader.load_animations()?;

    let mut doc = reader.doc;
    doc.cameras = root.cameras.clone();
    doc.generator = root.asset.generator.clone();
    doc.copyright = root.asset.copyright.clone();
    doc.extensions_used = root
        .extensions_used
        .iter()
        .filter(|e| !DERIVED_EXTENSIONS.contains(&e.as_str()))
        .cloned()
        .collect();
    Ok(doc)
}

fn check_required(object: &Map<String, Value>) -> Result<(), LoadError> {
    let required = object
        .get("extensionsRequired")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_str);
    for extension in required {
        if UNSUPPORTED_REQUIRED.contains(&extension) {
            return Err(LoadError::UnsupportedExtension(extension.to_string()));
        }
    }
    Ok(())
}

fn take_array(object: &mut Map<String, Value>, key: &str) -> Vec<Value> {
    match object.remove(key) {
        Some(Value::Array(items)) => items,
        _ => Vec::new(),
    }
}

/// `extensions.<name>` of a JSON object, if present.
fn extension<'v>(value: Option<&'v Value>, name: &str) -> Option<&'v Value> {
    value?.get("extensions")?.get(name)
}

fn slice<'d>(data: &'d [u8], offset: usize, len: usize, what: &str) -> Result<&'d [u8], LoadError> {
    offset
        .checked_add(len)
        .and_then(|end| data.get(offset..end))
        .ok_or_else(|| LoadError::Malformed(format!("{} is out of bounds", what)))
}

fn out_of_range(what: &str, index: usize) -> LoadError {
    LoadError::Malformed(format!("{} {} does not exist", what, index))
}

fn check_index(index: usize, len: usize, what: &str) -> Result<usize, LoadError> {
    if index < len {
        Ok(index)
    } else {
        Err(out_of_range(what, index))
    }
}

#[derive(Deserialize)]
struct RawMesh {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    primitives: Vec<RawPrimitive>,
    #[serde(default)]
    weights: Vec<f32>,
}

#[derive(Deserialize)]
struct RawPrimitive {
    #[serde(default)]
    attributes: BTreeMap<String, usize>,
    indices: Option<usize>,
    material: Option<usize>,
    #[serde(default = "default_mode")]
    mode: u32,
    #[serde(default)]
    targets: Vec<BTreeMap<String, usize>>,
}

fn default_mode() -> u32 {
    4
}

/// `EXT_meshopt_compression` on a buffer view.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CompressedView {
    buffer: usize,
    #[serde(default)]
    byte_offset: usize,
    byte_length: usize,
    byte_stride: usize,
    count: usize,
    mode: String,
    #[serde(default)]
    filter: Option<String>,
}

struct RawParts {
    materials: Vec<Value>,
    textures: Vec<Value>,
    images: Vec<Value>,
    samplers: Vec<Value>,
    meshes: Vec<RawMesh>,
}

/// Component values of one accessor before they are narrowed.
struct Components {
    name: Option<String>,
    element_type: ElementType,
    component_type: ComponentType,
    normalized: bool,
    values: Vec<f64>,
    partition: usize,
}

struct Reader<'a> {
    root: &'a json::Root,
    raw: &'a Value,
    base: Option<&'a Path>,
    /// Buffer contents; `None` for meshopt fallback buffers.
    buffers: Vec<Option<Vec<u8>>>,
    views: Vec<Vec<u8>>,
    /// Document buffer each view's data belongs to.
    view_partitions: Vec<usize>,
    accessor_ids: BTreeMap<usize, AccessorId>,
    doc: Document,
}

impl<'a> Reader<'a> {
    fn raw_item(&self, key: &str, index: usize) -> Option<&'a Value> {
        self.raw.get(key)?.get(index)
    }

    fn load_uri(&self, uri: &str) -> Result<Vec<u8>, LoadError> {
        if let Some(rest) = uri.strip_prefix("data:") {
            let (_, payload) = rest.split_once(";base64,").ok_or_else(|| {
                LoadError::Malformed("only base64 data URIs are supported".to_string())
            })?;
            return Ok(base64::engine::general_purpose::STANDARD.decode(payload)?);
        }
        let base = self
            .base
            .ok_or_else(|| LoadError::MissingResource(uri.to_string()))?;
        std::fs::read(base.join(uri)).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => LoadError::MissingResource(uri.to_string()),
            _ => LoadError::Io(e),
        })
    }

    fn load_buffers(&mut self, bin: Option<&[u8]>) -> Result<(), LoadError> {
        let root = self.root;
        let mut partitions = Vec::new();
        for (index, buffer) in root.buffers.iter().enumerate() {
            let raw = self.raw_item("buffers", index);
            let fallback = extension(raw, "EXT_meshopt_compression")
                .and_then(|e| e.get("fallback"))
                .and_then(Value::as_bool)
                .unwrap_or(false);
            if fallback {
                self.buffers.push(None);
                continue;
            }
            let byte_length = buffer.byte_length.0 as usize;
            let data = match (&buffer.uri, bin) {
                (Some(uri), _) => self.load_uri(uri)?,
                (None, Some(bin)) if index == 0 => bin.to_vec(),
                (None, _) if byte_length == 0 => Vec::new(),
                (None, _) => return Err(LoadError::MissingResource(format!("buffer {}", index))),
            };
            if data.len() < byte_length {
                return Err(LoadError::Malformed(format!(
                    "buffer {} holds {} bytes, byteLength is {}",
                    index,
                    data.len(),
                    byte_length
                )));
            }
            partitions.push(Buffer {
                name: buffer.name.clone(),
                uri: None,
            });
            self.buffers.push(Some(data));
        }
        if partitions.is_empty() {
            partitions.push(Buffer::default());
        }
        self.doc.buffers = partitions;
        Ok(())
    }

    /// Document buffer index of a glTF buffer.
    fn partition_of(&self, buffer: usize) -> usize {
        self.buffers[..buffer.min(self.buffers.len())]
            .iter()
            .filter(|b| b.is_some())
            .count()
    }

    fn buffer_data(&self, buffer: usize, what: &str) -> Result<&[u8], LoadError> {
        match self.buffers.get(buffer) {
            Some(Some(data)) => Ok(data),
            Some(None) => Err(LoadError::Malformed(format!(
                "{} reads a meshopt fallback buffer",
                what
            ))),
            None => Err(out_of_range("buffer", buffer)),
        }
    }

    fn load_views(&mut self) -> Result<(), LoadError> {
        let root = self.root;
        for (index, view) in root.buffer_views.iter().enumerate() {
            let what = format!("bufferView {}", index);
            let raw = self.raw_item("bufferViews", index);
            let (bytes, buffer) = match extension(raw, "EXT_meshopt_compression") {
                Some(ext) => {
                    let ext = CompressedView::deserialize(ext)?;
                    if let Some(filter) = ext.filter.as_deref().filter(|f| *f != "NONE") {
                        return Err(LoadError::Decode(format!(
                            "{}: filter {} is not supported",
                            what, filter
                        )));
                    }
                    let mode = codec::Mode::parse(&ext.mode).ok_or_else(|| {
                        LoadError::Decode(format!("{}: unknown mode {}", what, ext.mode))
                    })?;
                    let source = slice(
                        self.buffer_data(ext.buffer, &what)?,
                        ext.byte_offset,
                        ext.byte_length,
                        &what,
                    )?;
                    let decoded_len = ext
                        .count
                        .checked_mul(ext.byte_stride)
                        .filter(|len| *len == view.byte_length.0 as usize)
                        .ok_or_else(|| {
                            LoadError::Decode(format!(
                                "{}: {} elements of {} bytes do not fill the view",
                                what, ext.count, ext.byte_stride
                            ))
                        })?;
                    if decoded_len > source.len().saturating_mul(MAX_DECODE_RATIO) {
                        return Err(LoadError::Decode(format!(
                            "{}: {} compressed bytes cannot hold {} bytes",
                            what,
                            source.len(),
                            decoded_len
                        )));
                    }
                    let decoded = codec::decode(mode, source, ext.count, ext.byte_stride)
                        .map_err(|e| LoadError::Decode(format!("{}: {}", what, e)))?;
                    (decoded, ext.buffer)
                }
                None => {
                    let buffer = view.buffer.value();
                    let data = self.buffer_data(buffer, &what)?;
                    let offset = view.byte_offset.map(|o| o.0 as usize).unwrap_or(0);
                    let bytes = slice(data, offset, view.byte_length.0 as usize, &what)?;
                    (bytes.to_vec(), buffer)
                }
            };
            self.view_partitions.push(self.partition_of(buffer));
            self.views.push(bytes);
        }
        Ok(())
    }

    fn view(&self, index: usize) -> Result<&[u8], LoadError> {
        self.views
            .get(index)
            .map(Vec::as_slice)
            .ok_or_else(|| out_of_range("bufferView", index))
    }

    fn components(&self, index: usize) -> Result<Components, LoadError> {
        let what = format!("accessor {}", index);
        let accessor = self
            .root
            .accessors
            .get(index)
            .ok_or_else(|| out_of_range("accessor", index))?;
        let component_type = match &accessor.component_type {
            Checked::Valid(t) => ComponentType::from_json(t.0),
            Checked::Invalid => {
                return Err(LoadError::Malformed(format!("{} has an invalid componentType", what)))
            }
        };
        let element_type = match &accessor.type_ {
            Checked::Valid(t) => ElementType::from_json(*t),
            Checked::Invalid => {
                return Err(LoadError::Malformed(format!("{} has an invalid type", what)))
            }
        };

        let count = accessor.count.0 as usize;
        let n = element_type.components();
        let size = component_type.size();
        let layout = ElementLayout::new(element_type, size);
        let too_large = || LoadError::Malformed(format!("{} count {} is too large", what, count));

        // Backed accessors are bounded by their view; the rest by a fixed limit.
        let view = match accessor.buffer_view {
            Some(view_index) => {
                let view_index = view_index.value();
                let data = self.view(view_index)?;
                let stride = self
                    .root
                    .buffer_views
                    .get(view_index)
                    .and_then(|v| v.byte_stride)
                    .map(|s| s.0)
                    .unwrap_or(layout.element_bytes);
                if stride < layout.element_bytes {
                    return Err(LoadError::Malformed(format!(
                        "{} has a stride of {} bytes for {}-byte elements",
                        what, stride, layout.element_bytes
                    )));
                }
                let offset = accessor.byte_offset.map(|o| o.0 as usize).unwrap_or(0);
                if count > 0 {
                    let span = stride
                        .checked_mul(count - 1)
                        .and_then(|s| s.checked_add(layout.element_bytes))
                        .ok_or_else(too_large)?;
                    slice(data, offset, span, &what)?;
                }
                Some((view_index, data, stride, offset))
            }
            None if count > MAX_UNBACKED_COUNT => return Err(too_large()),
            None => None,
        };
        let mut values = vec![0.0; count.checked_mul(n).ok_or_else(too_large)?];
        let mut partition = 0;

        if let Some((view_index, data, stride, offset)) = view {
            for element in 0..count {
                let start = offset + element * stride;
                layout.read(&data[start..], component_type, &mut values[element * n..(element + 1) * n]);
            }
            partition = self.view_partitions[view_index];
        }

        if let Some(sparse) = &accessor.sparse {
            let sparse_count = sparse.count.0 as usize;
            let index_type = match &sparse.indices.component_type {
                Checked::Valid(t) => ComponentType::from_json(t.0),
                Checked::Invalid => {
                    return Err(LoadError::Malformed(format!("{} has invalid sparse indices", what)))
                }
            };
            let sparse_span = |bytes: usize| {
                sparse_count
                    .checked_mul(bytes)
                    .ok_or_else(|| LoadError::Malformed(format!("{} has too many sparse elements", what)))
            };
            let index_data = slice(
                self.view(sparse.indices.buffer_view.value())?,
                sparse.indices.byte_offset.0 as usize,
                sparse_span(index_type.size())?,
                &what,
            )?;
            let value_data = slice(
                self.view(sparse.values.buffer_view.value())?,
                sparse.values.byte_offset.0 as usize,
                sparse_span(layout.element_bytes)?,
                &what,
            )?;
            for k in 0..sparse_count {
                let target = index_type.read(&index_data[k * index_type.size()..]) as usize;
                if target >= count {
                    return Err(LoadError::Malformed(format!(
                        "{} has sparse index {} past its count",
                        what, target
                    )));
                }
                layout.read(
                    &value_data[k * layout.element_bytes..],
                    component_type,
                    &mut values[target * n..(target + 1) * n],
                );
            }
            if accessor.buffer_view.is_none() {
                partition = self.view_partitions[sparse.values.buffer_view.value()];
            }
        }

        Ok(Components {
            name: accessor.name.clone(),
            element_type,
            component_type,
            normalized: accessor.normalized,
            values,
            partition,
        })
    }

    /// Document accessor for a glTF accessor, created on first use.
    fn accessor(&mut self, index: usize) -> Result<AccessorId, LoadError> {
        if let Some(id) = self.accessor_ids.get(&index) {
            return Ok(*id);
        }
        let components = self.components(index)?;
        let id = self.doc.add_accessor(Accessor {
            name: components.name,
            element_type: components.element_type,
            component_type: components.component_type,
            normalized: components.normalized && components.component_type != ComponentType::F32,
            values: components.values.into_iter().map(|v| v as f32).collect(),
            sparse: false,
            buffer: components.partition,
        });
        self.accessor_ids.insert(index, id);
        Ok(id)
    }

    fn indices(&self, index: usize, vertex_count: usize) -> Result<Vec<u32>, LoadError> {
        let components = self.components(index)?;
        let valid_type = matches!(
            components.component_type,
            ComponentType::U8 | ComponentType::U16 | ComponentType::U32
        );
        if components.element_type != ElementType::Scalar || !valid_type {
            return Err(LoadError::Malformed(format!(
                "accessor {} cannot be used as indices",
                index
            )));
        }
        let indices: Vec<u32> = components.values.into_iter().map(|v| v as u32).collect();
        if let Some(bad) = indices.iter().find(|i| **i as usize >= vertex_count) {
            return Err(LoadError::Malformed(format!(
                "index {} in accessor {} exceeds vertex count {}",
                bad, index, vertex_count
            )));
        }
        Ok(indices)
    }

    fn attribute_map(&mut self, attributes: &BTreeMap<String, usize>) -> Result<AttributeMap, LoadError> {
        let mut map = AttributeMap::new();
        for (name, index) in attributes {
            map.insert(name.clone(), self.accessor(*index)?);
        }
        Ok(map)
    }

    fn load_meshes(&mut self, meshes: Vec<RawMesh>) -> Result<(), LoadError> {
        for raw in meshes {
            let mut mesh = Mesh {
                name: raw.name,
                primitives: Vec::with_capacity(raw.primitives.len()),
                weights: raw.weights,
            };
            for primitive in raw.primitives {
                let attributes = self.attribute_map(&primitive.attributes)?;
                let mut targets = Vec::with_capacity(primitive.targets.len());
                for target in &primitive.targets {
                    targets.push(self.attribute_map(target)?);
                }
                let mode = PrimitiveMode::from_gl(primitive.mode).ok_or_else(|| {
                    LoadError::Malformed(format!("unknown primitive mode {}", primitive.mode))
                })?;
                let mut out = Primitive::new(attributes, None);
                let vertex_count = self.doc.vertex_count(&out);
                for (semantic, id) in out.attributes.iter().chain(targets.iter().flatten()) {
                    let count = self.doc.accessors[*id].count();
                    if count != vertex_count {
                        return Err(LoadError::Malformed(format!(
                            "{} has {} elements but the primitive has {} vertices",
                            semantic, count, vertex_count
                        )));
                    }
                }
                if let Some(index) = primitive.indices {
                    out.indices = Some(self.indices(index, vertex_count)?);
                }
                out.material = primitive
                    .material
                    .map(|m| check_index(m, self.doc.materials.len(), "material"))
                    .transpose()?;
                out.mode = mode;
                out.targets = targets;
                mesh.primitives.push(out);
            }
            self.doc.add_mesh(mesh);
        }
        Ok(())
    }

    fn load_materials(&mut self, raw: &RawParts) -> Result<(), LoadError> {
        for (index, value) in raw.materials.iter().enumerate() {
            let object = value
                .as_object()
                .ok_or_else(|| LoadError::Malformed(format!("material {} is not an object", index)))?;
            let name = object.get("name").and_then(Value::as_str).map(str::to_string);
            let material = Material::new(name, object.clone());
            for slot in material.texture_slots() {
                check_index(slot.texture, self.doc.textures.len(), "texture")?;
            }
            self.doc.add_material(material);
        }
        Ok(())
    }

    fn load_textures(&mut self, raw: &RawParts) -> Result<(), LoadError> {
        for (index, texture) in raw.textures.iter().enumerate() {
            let source = ["EXT_texture_webp", "EXT_texture_avif"]
                .iter()
                .find_map(|name| extension(Some(texture), name)?.get("source")?.as_u64())
                .or_else(|| texture.get("source")?.as_u64())
                .ok_or_else(|| LoadError::Malformed(format!("texture {} has no image", index)))?
                as usize;
            let image = raw
                .images
                .get(source)
                .ok_or_else(|| out_of_range("image", source))?;

            let uri = image.get("uri").and_then(Value::as_str);
            let data = match (image.get("bufferView").and_then(Value::as_u64), uri) {
                (Some(view), _) => self.view(view as usize)?.to_vec(),
                (None, Some(uri)) => self.load_uri(uri)?,
                (None, None) => {
                    return Err(LoadError::MissingResource(format!("image {}", source)))
                }
            };
            let mime_type = image
                .get("mimeType")
                .and_then(Value::as_str)
                .map(str::to_string)
                .or_else(|| data_uri_mime(uri?))
                .or_else(|| {
                    image::guess_format(&data)
                        .ok()
                        .map(|f| f.to_mime_type().to_string())
                })
                .ok_or_else(|| LoadError::Malformed(format!("image {} has unknown type", source)))?;

            let sampler = match texture.get("sampler").and_then(Value::as_u64) {
                Some(s) => Some(read_sampler(
                    raw.samplers
                        .get(s as usize)
                        .ok_or_else(|| out_of_range("sampler", s as usize))?,
                )),
                None => None,
            };

            let name = texture
                .get("name")
                .or_else(|| image.get("name"))
                .and_then(Value::as_str)
                .map(str::to_string);
            self.doc.add_texture(Texture {
                name,
                uri: uri.filter(|u| !u.starts_with("data:")).map(str::to_string),
                mime_type,
                data,
                sampler,
            });
        }
        Ok(())
    }

    fn node_index(&self, index: usize) -> Result<NodeId, LoadError> {
        check_index(index, self.root.nodes.len(), "node")
    }

    fn load_nodes(&mut self) -> Result<(), LoadError> {
        let root = self.root;
        for (index, node) in root.nodes.iter().enumerate() {
            let mut out = Node {
                name: node.name.clone(),
                translation: node.translation.unwrap_or([0.0; 3]),
                rotation: node.rotation.as_ref().map(|r| r.0).unwrap_or([0.0, 0.0, 0.0, 1.0]),
                scale: node.scale.unwrap_or([1.0; 3]),
                weights: node.weights.clone().unwrap_or_default(),
                ..Default::default()
            };
            if let Some(matrix) = node.matrix {
                out.set_local_matrix(glam::Mat4::from_cols_array(&matrix));
            }
            for child in node.children.iter().flatten() {
                out.children.push(self.node_index(child.value())?);
            }
            out.mesh = node
                .mesh
                .map(|m| check_index(m.value(), self.doc.meshes.len(), "mesh"))
                .transpose()?;
            out.skin = node
                .skin
                .map(|s| check_index(s.value(), self.root.skins.len(), "skin"))
                .transpose()?;
            out.camera = node
                .camera
                .map(|c| check_index(c.value(), self.root.cameras.len(), "camera"))
                .transpose()?;

            let instancing = extension(self.raw_item("nodes", index), "EXT_mesh_gpu_instancing")
                .and_then(|e| e.get("attributes"))
                .and_then(Value::as_object);
            if let Some(attributes) = instancing {
                let mut map = InstanceAttributes::new();
                for (name, accessor) in attributes {
                    let accessor = accessor.as_u64().ok_or_else(|| {
                        LoadError::Malformed(format!("node {} has an invalid instance attribute", index))
                    })?;
                    map.insert(name.clone(), self.accessor(accessor as usize)?);
                }
                let mut counts = map.values().map(|id| self.doc.accessors[*id].count());
                if let Some(first) = counts.next() {
                    if counts.any(|c| c != first) {
                        return Err(LoadError::Malformed(format!(
                            "node {} has instance attributes of different lengths",
                            index
                        )));
                    }
                }
                out.instancing = Some(map);
            }
            self.doc.add_node(out);
        }
        Ok(())
    }

    fn load_scenes(&mut self) -> Result<(), LoadError> {
        let root = self.root;
        for scene in &root.scenes {
            let nodes = scene
                .nodes
                .iter()
                .map(|n| self.node_index(n.value()))
                .collect::<Result<Vec<_>, _>>()?;
            self.doc.scenes.push(Scene {
                name: scene.name.clone(),
                nodes,
            });
        }
        self.doc.scene = self
            .root
            .scene
            .map(|s| check_index(s.value(), self.doc.scenes.len(), "scene"))
            .transpose()?;
        Ok(())
    }

    fn load_skins(&mut self) -> Result<(), LoadError> {
        let root = self.root;
        for skin in &root.skins {
            let joints = skin
                .joints
                .iter()
                .map(|j| self.node_index(j.value()))
                .collect::<Result<Vec<_>, _>>()?;
            let skeleton = skin
                .skeleton
                .map(|s| self.node_index(s.value()))
                .transpose()?;
            let inverse_bind_matrices = skin
                .inverse_bind_matrices
                .map(|a| self.accessor(a.value()))
                .transpose()?;
            self.doc.skins.push(Skin {
                name: skin.name.clone(),
                joints,
                skeleton,
                inverse_bind_matrices,
            });
        }
        Ok(())
    }

    fn load_animations(&mut self) -> Result<(), LoadError> {
        use json::animation::{Interpolation as Interp, Property};
        let root = self.root;
        for animation in &root.animations {
            let mut out = Animation {
                name: animation.name.clone(),
                ..Default::default()
            };
            for sampler in &animation.samplers {
                let interpolation = match &sampler.interpolation {
                    Checked::Valid(Interp::Linear) => Interpolation::Linear,
                    Checked::Valid(Interp::Step) => Interpolation::Step,
                    Checked::Valid(Interp::CubicSpline) => Interpolation::CubicSpline,
                    Checked::Invalid => {
                        return Err(LoadError::Malformed("invalid interpolation".to_string()))
                    }
                };
                out.samplers.push(AnimationSampler {
                    input: self.accessor(sampler.input.value())?,
                    output: self.accessor(sampler.output.value())?,
                    interpolation,
                });
            }
            for channel in &animation.channels {
                let path = match &channel.target.path {
                    Checked::Valid(Property::Translation) => AnimationPath::Translation,
                    Checked::Valid(Property::Rotation) => AnimationPath::Rotation,
                    Checked::Valid(Property::Scale) => AnimationPath::Scale,
                    Checked::Valid(Property::MorphTargetWeights) => AnimationPath::Weights,
                    Checked::Invalid => {
                        return Err(LoadError::Malformed("invalid animation path".to_string()))
                    }
                };
                out.channels.push(AnimationChannel {
                    sampler: check_index(channel.sampler.value(), out.samplers.len(), "animation sampler")?,
                    node: self.node_index(channel.target.node.value())?,
                    path,
                });
            }
            self.doc.animations.push(out);
        }
        Ok(())
    }
}

/// How the components of one element are laid out in a view.
struct ElementLayout {
    /// Components per column (matrices) or per element.
    rows: usize,
    columns: usize,
    column_stride: usize,
    element_bytes: usize,
    size: usize,
}

impl ElementLayout {
    fn new(element_type: ElementType, size: usize) -> Self {
        let (rows, columns) = match element_type {
            ElementType::Mat2 => (2, 2),
            ElementType::Mat3 => (3, 3),
            ElementType::Mat4 => (4, 4),
            other => (other.components(), 1),
        };
        // Matrix columns start on 4-byte boundaries.
        let column_stride = if columns > 1 {
            (rows * size + 3) & !3
        } else {
            rows * size
        };
        Self {
            rows,
            columns,
            column_stride,
            element_bytes: column_stride * columns,
            size,
        }
    }

    fn read(&self, data: &[u8], component_type: ComponentType, out: &mut [f64]) {
        for column in 0..self.columns {
            for row in 0..self.rows {
                let offset = column * self.column_stride + row * self.size;
                out[column * self.rows + row] = component_type.read(&data[offset..]);
            }
        }
    }
}

fn data_uri_mime(uri: &str) -> Option<String> {
    let rest = uri.strip_prefix("data:")?;
    let (mime, _) = rest.split_once(';')?;
    Some(mime.to_string()).filter(|m| !m.is_empty())
}

fn read_sampler(value: &Value) -> Sampler {
    let field = |key: &str| value.get(key).and_then(Value::as_u64).map(|v| v as u32);
    Sampler {
        mag_filter: field("magFilter"),
        min_filter: field("minFilter"),
        wrap_s: field("wrapS").unwrap_or(10497),
        wrap_t: field("wrapT").unwrap_or(10497),
    }
}
