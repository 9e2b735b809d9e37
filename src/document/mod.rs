//! In-memory scene document.
//!
//! The document is an arena of vectors; cross references are plain indices.
//! Steps mutate it in place and detach what they replace; [`Document::collect_garbage`]
//! then removes anything no longer referenced and remaps every index.

pub mod accessor;
mod gc;
mod graph;
pub mod material;

pub use accessor::{Accessor, ComponentType, ElementType};
pub use graph::Parent;
pub use material::{Material, TextureSlot, NORMAL_SLOT};

use gltf_json as json;
use std::collections::{BTreeMap, BTreeSet};

pub type AccessorId = usize;
pub type MeshId = usize;
pub type MaterialId = usize;
pub type TextureId = usize;
pub type NodeId = usize;

/// Attribute semantic name to accessor.
pub type AttributeMap = BTreeMap<String, AccessorId>;

/// Primitive topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PrimitiveMode {
    Points,
    Lines,
    LineLoop,
    LineStrip,
    Triangles,
    TriangleStrip,
    TriangleFan,
}

impl PrimitiveMode {
    pub fn to_json(self) -> json::mesh::Mode {
        match self {
            PrimitiveMode::Points => json::mesh::Mode::Points,
            PrimitiveMode::Lines => json::mesh::Mode::Lines,
            PrimitiveMode::LineLoop => json::mesh::Mode::LineLoop,
            PrimitiveMode::LineStrip => json::mesh::Mode::LineStrip,
            PrimitiveMode::Triangles => json::mesh::Mode::Triangles,
            PrimitiveMode::TriangleStrip => json::mesh::Mode::TriangleStrip,
            PrimitiveMode::TriangleFan => json::mesh::Mode::TriangleFan,
        }
    }

    /// From the numeric `mode` of a glTF primitive.
    pub fn from_gl(mode: u32) -> Option<Self> {
        Some(match mode {
            0 => PrimitiveMode::Points,
            1 => PrimitiveMode::Lines,
            2 => PrimitiveMode::LineLoop,
            3 => PrimitiveMode::LineStrip,
            4 => PrimitiveMode::Triangles,
            5 => PrimitiveMode::TriangleStrip,
            6 => PrimitiveMode::TriangleFan,
            _ => return None,
        })
    }

    /// Modes whose elements are independent (can be concatenated).
    pub fn is_list(self) -> bool {
        matches!(
            self,
            PrimitiveMode::Points | PrimitiveMode::Lines | PrimitiveMode::Triangles
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Primitive {
    pub attributes: AttributeMap,
    /// Inline index list; `None` for non-indexed geometry.
    pub indices: Option<Vec<u32>>,
    pub material: Option<MaterialId>,
    pub mode: PrimitiveMode,
    /// Morph targets.
    pub targets: Vec<AttributeMap>,
}

impl Primitive {
    pub fn new(attributes: AttributeMap, indices: Option<Vec<u32>>) -> Self {
        Self {
            attributes,
            indices,
            material: None,
            mode: PrimitiveMode::Triangles,
            targets: Vec::new(),
        }
    }

    pub fn position(&self) -> Option<AccessorId> {
        self.attributes.get("POSITION").copied()
    }

    /// Accessors used by attributes and morph targets.
    pub fn accessor_ids(&self) -> impl Iterator<Item = AccessorId> + '_ {
        self.attributes
            .values()
            .chain(self.targets.iter().flat_map(|t| t.values()))
            .copied()
    }

    /// Rewrite every accessor reference.
    pub fn remap_accessors(&mut self, remap: impl Fn(AccessorId) -> AccessorId) {
        for id in self.attributes.values_mut() {
            *id = remap(*id);
        }
        for target in &mut self.targets {
            for id in target.values_mut() {
                *id = remap(*id);
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mesh {
    pub name: Option<String>,
    pub primitives: Vec<Primitive>,
    /// Default morph target weights.
    pub weights: Vec<f32>,
}

/// Texture filtering/wrapping state (glTF sampler enums).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Sampler {
    pub mag_filter: Option<u32>,
    pub min_filter: Option<u32>,
    pub wrap_s: u32,
    pub wrap_t: u32,
}

impl Default for Sampler {
    fn default() -> Self {
        Self {
            mag_filter: None,
            min_filter: None,
            wrap_s: 10497,
            wrap_t: 10497,
        }
    }
}

/// An encoded image plus its sampler.
#[derive(Debug, Clone, PartialEq)]
pub struct Texture {
    pub name: Option<String>,
    /// Original URI, kept for name matching.
    pub uri: Option<String>,
    pub mime_type: String,
    pub data: Vec<u8>,
    pub sampler: Option<Sampler>,
}

/// `EXT_mesh_gpu_instancing` attributes (TRANSLATION, ROTATION, SCALE, ...).
pub type InstanceAttributes = AttributeMap;

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub name: Option<String>,
    pub translation: [f32; 3],
    pub rotation: [f32; 4],
    pub scale: [f32; 3],
    pub children: Vec<NodeId>,
    pub mesh: Option<MeshId>,
    pub skin: Option<usize>,
    pub camera: Option<usize>,
    pub weights: Vec<f32>,
    pub instancing: Option<InstanceAttributes>,
}

impl Default for Node {
    fn default() -> Self {
        Self {
            name: None,
            translation: [0.0; 3],
            rotation: [0.0, 0.0, 0.0, 1.0],
            scale: [1.0; 3],
            children: Vec::new(),
            mesh: None,
            skin: None,
            camera: None,
            weights: Vec::new(),
            instancing: None,
        }
    }
}

impl Node {
    pub fn with_mesh(mesh: MeshId) -> Self {
        Self {
            mesh: Some(mesh),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scene {
    pub name: Option<String>,
    pub nodes: Vec<NodeId>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Skin {
    pub name: Option<String>,
    pub joints: Vec<NodeId>,
    pub skeleton: Option<NodeId>,
    pub inverse_bind_matrices: Option<AccessorId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnimationPath {
    Translation,
    Rotation,
    Scale,
    Weights,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Interpolation {
    Linear,
    Step,
    CubicSpline,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnimationChannel {
    pub sampler: usize,
    pub node: NodeId,
    pub path: AnimationPath,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnimationSampler {
    pub input: AccessorId,
    pub output: AccessorId,
    pub interpolation: Interpolation,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Animation {
    pub name: Option<String>,
    pub channels: Vec<AnimationChannel>,
    pub samplers: Vec<AnimationSampler>,
}

/// Buffer partition.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Buffer {
    pub name: Option<String>,
    pub uri: Option<String>,
}

/// Geometry codec applied when the document is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeometryCompression {
    Meshopt,
}

/// Summary counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DocumentStats {
    pub nodes: usize,
    pub meshes: usize,
    pub primitives: usize,
    pub vertices: usize,
    pub triangles: usize,
    pub materials: usize,
    pub textures: usize,
    pub animations: usize,
    pub instanced_nodes: usize,
}

/// The scene document.
#[derive(Debug, Clone, Default)]
pub struct Document {
    pub generator: Option<String>,
    pub copyright: Option<String>,
    pub buffers: Vec<Buffer>,
    pub accessors: Vec<Accessor>,
    pub meshes: Vec<Mesh>,
    pub materials: Vec<Material>,
    pub textures: Vec<Texture>,
    pub cameras: Vec<json::Camera>,
    pub nodes: Vec<Node>,
    pub scenes: Vec<Scene>,
    pub scene: Option<usize>,
    pub skins: Vec<Skin>,
    pub animations: Vec<Animation>,
    /// Extensions carried over from the input that still apply.
    pub extensions_used: BTreeSet<String>,
    pub geometry_compression: Option<GeometryCompression>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_accessor(&mut self, accessor: Accessor) -> AccessorId {
        self.accessors.push(accessor);
        self.accessors.len() - 1
    }

    pub fn add_mesh(&mut self, mesh: Mesh) -> MeshId {
        self.meshes.push(mesh);
        self.meshes.len() - 1
    }

    pub fn add_material(&mut self, material: Material) -> MaterialId {
        self.materials.push(material);
        self.materials.len() - 1
    }

    pub fn add_texture(&mut self, texture: Texture) -> TextureId {
        self.textures.push(texture);
        self.textures.len() - 1
    }

    pub fn add_node(&mut self, node: Node) -> NodeId {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    /// Vertex count of a primitive, taken from POSITION or the first attribute.
    pub fn vertex_count(&self, primitive: &Primitive) -> usize {
        primitive
            .position()
            .or_else(|| primitive.attributes.values().next().copied())
            .and_then(|id| self.accessors.get(id))
            .map(Accessor::count)
            .unwrap_or(0)
    }

    /// Triangle count of a primitive (0 for points and lines).
    pub fn triangle_count(&self, primitive: &Primitive) -> usize {
        let elements = primitive
            .indices
            .as_ref()
            .map(Vec::len)
            .unwrap_or_else(|| self.vertex_count(primitive));
        match primitive.mode {
            PrimitiveMode::Triangles => elements / 3,
            PrimitiveMode::TriangleStrip | PrimitiveMode::TriangleFan => elements.saturating_sub(2),
            _ => 0,
        }
    }

    /// Nodes referenced by any animation channel.
    pub fn animated_nodes(&self) -> BTreeSet<NodeId> {
        self.animations
            .iter()
            .flat_map(|a| a.channels.iter().map(|c| c.node))
            .collect()
    }

    /// Nodes used as skin joints or skeleton roots.
    pub fn joint_nodes(&self) -> BTreeSet<NodeId> {
        self.skins
            .iter()
            .flat_map(|s| s.joints.iter().copied().chain(s.skeleton))
            .collect()
    }

    /// Number of nodes referencing each mesh.
    pub fn mesh_users(&self) -> Vec<usize> {
        let mut users = vec![0; self.meshes.len()];
        for node in &self.nodes {
            if let Some(mesh) = node.mesh {
                if let Some(count) = users.get_mut(mesh) {
                    *count += 1;
                }
            }
        }
        users
    }

    /// Texture slot references per texture: `(material, slot)`.
    pub fn texture_users(&self) -> Vec<Vec<(MaterialId, TextureSlot)>> {
        let mut users = vec![Vec::new(); self.textures.len()];
        for (material_id, material) in self.materials.iter().enumerate() {
            for slot in material.texture_slots() {
                if let Some(list) = users.get_mut(slot.texture) {
                    list.push((material_id, slot));
                }
            }
        }
        users
    }

    pub fn stats(&self) -> DocumentStats {
        let mut stats = DocumentStats {
            nodes: self.nodes.len(),
            meshes: self.meshes.len(),
            materials: self.materials.len(),
            textures: self.textures.len(),
            animations: self.animations.len(),
            ..Default::default()
        };
        for mesh in &self.meshes {
            stats.primitives += mesh.primitives.len();
            for primitive in &mesh.primitives {
                stats.vertices += self.vertex_count(primitive);
                stats.triangles += self.triangle_count(primitive);
            }
        }
        stats.instanced_nodes = self.nodes.iter().filter(|n| n.instancing.is_some()).count();
        stats
    }
}
