//! Document fixtures shared by unit tests.

use crate::document::*;
use image::ImageEncoder;
use serde_json::{json, Value};

/// One indexed triangle (POSITION + NORMAL) on one node in one scene.
pub fn triangle_document() -> Document {
    let mut doc = Document::new();
    let position = doc.add_accessor(Accessor::new(
        ElementType::Vec3,
        vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0],
    ));
    let normal = doc.add_accessor(Accessor::new(
        ElementType::Vec3,
        vec![0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0],
    ));
    let mut attributes = AttributeMap::new();
    attributes.insert("POSITION".to_string(), position);
    attributes.insert("NORMAL".to_string(), normal);
    let mesh = doc.add_mesh(Mesh {
        name: Some("Triangle".to_string()),
        primitives: vec![Primitive::new(attributes, Some(vec![0, 1, 2]))],
        weights: Vec::new(),
    });
    let node = doc.add_node(Node::with_mesh(mesh));
    doc.scenes.push(Scene {
        name: Some("Scene".to_string()),
        nodes: vec![node],
    });
    doc.scene = Some(0);
    doc.buffers.push(Buffer::default());
    doc
}

/// Unit cube with 24 vertices (POSITION, NORMAL, TEXCOORD_0), returns the mesh.
pub fn add_cube_mesh(doc: &mut Document, material: Option<MaterialId>) -> MeshId {
    let faces: [([f32; 3], [f32; 3], [f32; 3]); 6] = [
        ([1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]),
        ([-1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0, 0.0]),
        ([0.0, 1.0, 0.0], [0.0, 0.0, 1.0], [1.0, 0.0, 0.0]),
        ([0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
        ([0.0, 0.0, 1.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
        ([0.0, 0.0, -1.0], [0.0, 1.0, 0.0], [1.0, 0.0, 0.0]),
    ];
    let mut positions = Vec::new();
    let mut normals = Vec::new();
    let mut uvs = Vec::new();
    let mut indices = Vec::new();
    for (n, u, v) in faces {
        let base = (positions.len() / 3) as u32;
        for (su, sv) in [(-0.5, -0.5), (0.5, -0.5), (0.5, 0.5), (-0.5, 0.5)] {
            for axis in 0..3 {
                positions.push(n[axis] * 0.5 + u[axis] * su + v[axis] * sv);
            }
            normals.extend_from_slice(&n);
            uvs.extend_from_slice(&[su + 0.5, sv + 0.5]);
        }
        indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }
    let position = doc.add_accessor(Accessor::new(ElementType::Vec3, positions));
    let normal = doc.add_accessor(Accessor::new(ElementType::Vec3, normals));
    let uv = doc.add_accessor(Accessor::new(ElementType::Vec2, uvs));
    let mut attributes = AttributeMap::new();
    attributes.insert("POSITION".to_string(), position);
    attributes.insert("NORMAL".to_string(), normal);
    attributes.insert("TEXCOORD_0".to_string(), uv);
    let mut primitive = Primitive::new(attributes, Some(indices));
    primitive.material = material;
    doc.add_mesh(Mesh {
        name: Some("Cube".to_string()),
        primitives: vec![primitive],
        weights: Vec::new(),
    })
}

/// Flat `n` x `n` quad grid on the XZ plane: `2 * n * n` triangles.
pub fn add_grid_mesh(doc: &mut Document, n: usize) -> MeshId {
    let mut positions = Vec::new();
    let mut normals = Vec::new();
    for z in 0..=n {
        for x in 0..=n {
            positions.extend_from_slice(&[x as f32 / n as f32, 0.0, z as f32 / n as f32]);
            normals.extend_from_slice(&[0.0, 1.0, 0.0]);
        }
    }
    let row = (n + 1) as u32;
    let mut indices = Vec::new();
    for z in 0..n as u32 {
        for x in 0..n as u32 {
            let i = z * row + x;
            indices.extend_from_slice(&[i, i + row, i + 1, i + 1, i + row, i + row + 1]);
        }
    }
    let position = doc.add_accessor(Accessor::new(ElementType::Vec3, positions));
    let normal = doc.add_accessor(Accessor::new(ElementType::Vec3, normals));
    let mut attributes = AttributeMap::new();
    attributes.insert("POSITION".to_string(), position);
    attributes.insert("NORMAL".to_string(), normal);
    doc.add_mesh(Mesh {
        name: Some("Grid".to_string()),
        primitives: vec![Primitive::new(attributes, Some(indices))],
        weights: Vec::new(),
    })
}

/// Add a node with a mesh under the first scene.
pub fn add_mesh_node(doc: &mut Document, mesh: MeshId, translation: [f32; 3]) -> NodeId {
    let node = doc.add_node(Node {
        translation,
        ..Node::with_mesh(mesh)
    });
    if doc.scenes.is_empty() {
        doc.scenes.push(Scene::default());
        doc.scene = Some(0);
    }
    doc.scenes[0].nodes.push(node);
    node
}

/// Empty document with one scene and one buffer.
pub fn empty_document() -> Document {
    let mut doc = Document::new();
    doc.scenes.push(Scene::default());
    doc.scene = Some(0);
    doc.buffers.push(Buffer::default());
    doc
}

/// Untextured material with the given base color.
pub fn color_material(color: [f32; 4]) -> Material {
    material_from_json(json!({
        "pbrMetallicRoughness": {"baseColorFactor": color, "metallicFactor": 0.0, "roughnessFactor": 0.5}
    }))
}

pub fn material_from_json(value: Value) -> Material {
    let name = value.get("name").and_then(Value::as_str).map(str::to_string);
    Material::new(name, value.as_object().cloned().unwrap_or_default())
}

/// Solid-colour RGBA PNG.
pub fn png_bytes(width: u32, height: u32, rgba: [u8; 4]) -> Vec<u8> {
    let pixels: Vec<u8> = std::iter::repeat(rgba)
        .take((width * height) as usize)
        .flatten()
        .collect();
    let mut bytes = Vec::new();
    image::codecs::png::PngEncoder::new(std::io::Cursor::new(&mut bytes))
        .write_image(&pixels, width, height, image::ExtendedColorType::Rgba8)
        .expect("encode test png");
    bytes
}

pub fn png_texture(name: &str, width: u32, height: u32) -> Texture {
    Texture {
        name: Some(name.to_string()),
        uri: None,
        mime_type: "image/png".to_string(),
        data: png_bytes(width, height, [200, 100, 50, 255]),
        sampler: None,
    }
}

/// Decoded dimensions of a texture.
pub fn texture_size(texture: &Texture) -> (u32, u32) {
    let image = image::load_from_memory(&texture.data).expect("decode test texture");
    (image.width(), image.height())
}
