//! Removal of unreferenced document entries.

use super::Document;

/// Drop every item whose `keep` flag is false; returns old index -> new index.
fn compact<T>(items: &mut Vec<T>, keep: &[bool]) -> Vec<Option<usize>> {
    let mut remap = Vec::with_capacity(items.len());
    let mut next = 0;
    for &kept in keep.iter().take(items.len()) {
        if kept {
            remap.push(Some(next));
            next += 1;
        } else {
            remap.push(None);
        }
    }
    let mut index = 0;
    items.retain(|_| {
        let kept = keep.get(index).copied().unwrap_or(false);
        index += 1;
        kept
    });
    remap
}

fn lookup(remap: &[Option<usize>], index: usize) -> Option<usize> {
    remap.get(index).copied().flatten()
}

impl Document {
    /// Remove nodes unreachable from the scene roots, and meshes, skins,
    /// cameras, materials, textures, accessors and buffers nothing refers to.
    /// Meshes without primitives count as unreferenced.
    pub fn collect_garbage(&mut self) {
        for node in &mut self.nodes {
            if let Some(mesh) = node.mesh {
                if self.meshes.get(mesh).map_or(true, |m| m.primitives.is_empty()) {
                    node.mesh = None;
                }
            }
        }

        let mut keep_nodes = self.descendants_of(self.root_nodes());
        loop {
            let extra: Vec<usize> = self
                .nodes
                .iter()
                .enumerate()
                .filter(|(i, _)| keep_nodes[*i])
                .filter_map(|(_, n)| n.skin)
                .filter_map(|s| self.skins.get(s))
                .flat_map(|s| s.joints.iter().copied().chain(s.skeleton))
                .filter(|j| keep_nodes.get(*j) == Some(&false))
                .collect();
            if extra.is_empty() {
                break;
            }
            for (i, marked) in self.descendants_of(extra).into_iter().enumerate() {
                keep_nodes[i] |= marked;
            }
        }

        let mut keep_meshes = vec![false; self.meshes.len()];
        let mut keep_skins = vec![false; self.skins.len()];
        let mut keep_cameras = vec![false; self.cameras.len()];
        for (index, node) in self.nodes.iter().enumerate() {
            if !keep_nodes[index] {
                continue;
            }
            if let Some(slot) = node.mesh.and_then(|m| keep_meshes.get_mut(m)) {
                *slot = true;
            }
            if let Some(slot) = node.skin.and_then(|s| keep_skins.get_mut(s)) {
                *slot = true;
            }
            if let Some(slot) = node.camera.and_then(|c| keep_cameras.get_mut(c)) {
                *slot = true;
            }
        }

        for animation in &mut self.animations {
            animation
                .channels
                .retain(|c| keep_nodes.get(c.node) == Some(&true) && c.sampler < animation.samplers.len());
            let mut used = vec![false; animation.samplers.len()];
            for channel in &animation.channels {
                used[channel.sampler] = true;
            }
            let sampler_map = compact(&mut animation.samplers, &used);
            for channel in &mut animation.channels {
                channel.sampler = lookup(&sampler_map, channel.sampler).unwrap_or(0);
            }
        }
        self.animations.retain(|a| !a.channels.is_empty());

        let mut keep_materials = vec![false; self.materials.len()];
        for (index, mesh) in self.meshes.iter().enumerate() {
            if !keep_meshes[index] {
                continue;
            }
            for primitive in &mesh.primitives {
                if let Some(slot) = primitive.material.and_then(|m| keep_materials.get_mut(m)) {
                    *slot = true;
                }
            }
        }

        let mut keep_textures = vec![false; self.textures.len()];
        for (index, material) in self.materials.iter().enumerate() {
            if !keep_materials[index] {
                continue;
            }
            for slot in material.texture_slots() {
                if let Some(flag) = keep_textures.get_mut(slot.texture) {
                    *flag = true;
                }
            }
        }

        let mut keep_accessors = vec![false; self.accessors.len()];
        {
            let mut mark = |id: usize| {
                if let Some(flag) = keep_accessors.get_mut(id) {
                    *flag = true;
                }
            };
            for (index, mesh) in self.meshes.iter().enumerate() {
                if keep_meshes[index] {
                    mesh.primitives
                        .iter()
                        .flat_map(|p| p.accessor_ids())
                        .for_each(&mut mark);
                }
            }
            for (index, skin) in self.skins.iter().enumerate() {
                if keep_skins[index] {
                    skin.inverse_bind_matrices.into_iter().for_each(&mut mark);
                }
            }
            for animation in &self.animations {
                for sampler in &animation.samplers {
                    mark(sampler.input);
                    mark(sampler.output);
                }
            }
            for (index, node) in self.nodes.iter().enumerate() {
                if keep_nodes[index] {
                    if let Some(instancing) = &node.instancing {
                        instancing.values().copied().for_each(&mut mark);
                    }
                }
            }
        }

        let mut keep_buffers = vec![false; self.buffers.len()];
        for (index, accessor) in self.accessors.iter().enumerate() {
            if keep_accessors[index] {
                if let Some(flag) = keep_buffers.get_mut(accessor.buffer) {
                    *flag = true;
                }
            }
        }
        if !keep_buffers.is_empty() && !keep_buffers.contains(&true) {
            keep_buffers[0] = true;
        }

        let node_map = compact(&mut self.nodes, &keep_nodes);
        let mesh_map = compact(&mut self.meshes, &keep_meshes);
        let skin_map = compact(&mut self.skins, &keep_skins);
        let camera_map = compact(&mut self.cameras, &keep_cameras);
        let material_map = compact(&mut self.materials, &keep_materials);
        let texture_map = compact(&mut self.textures, &keep_textures);
        let accessor_map = compact(&mut self.accessors, &keep_accessors);
        let buffer_map = compact(&mut self.buffers, &keep_buffers);

        for node in &mut self.nodes {
            node.children = node
                .children
                .iter()
                .filter_map(|c| lookup(&node_map, *c))
                .collect();
            node.mesh = node.mesh.and_then(|m| lookup(&mesh_map, m));
            node.skin = node.skin.and_then(|s| lookup(&skin_map, s));
            node.camera = node.camera.and_then(|c| lookup(&camera_map, c));
            if let Some(instancing) = &mut node.instancing {
                instancing.retain(|_, id| match lookup(&accessor_map, *id) {
                    Some(new_id) => {
                        *id = new_id;
                        true
                    }
                    None => false,
                });
            }
        }
        for scene in &mut self.scenes {
            scene.nodes = scene
                .nodes
                .iter()
                .filter_map(|n| lookup(&node_map, *n))
                .collect();
        }
        for skin in &mut self.skins {
            skin.joints = skin
                .joints
                .iter()
                .filter_map(|j| lookup(&node_map, *j))
                .collect();
            skin.skeleton = skin.skeleton.and_then(|s| lookup(&node_map, s));
            skin.inverse_bind_matrices = skin
                .inverse_bind_matrices
                .and_then(|a| lookup(&accessor_map, a));
        }
        for animation in &mut self.animations {
            for channel in &mut animation.channels {
                channel.node = lookup(&node_map, channel.node).unwrap_or(channel.node);
            }
            for sampler in &mut animation.samplers {
                sampler.input = lookup(&accessor_map, sampler.input).unwrap_or(sampler.input);
                sampler.output = lookup(&accessor_map, sampler.output).unwrap_or(sampler.output);
            }
        }
        for mesh in &mut self.meshes {
            for primitive in &mut mesh.primitives {
                primitive.material = primitive.material.and_then(|m| lookup(&material_map, m));
                primitive.attributes.retain(|_, id| lookup(&accessor_map, *id).is_some());
                primitive.remap_accessors(|id| lookup(&accessor_map, id).unwrap_or(id));
            }
        }
        for material in &mut self.materials {
            material.remap_textures(&mut |t| lookup(&texture_map, t));
        }
        for accessor in &mut self.accessors {
            accessor.buffer = lookup(&buffer_map, accessor.buffer).unwrap_or(0);
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::document::*;
    use crate::testing;

    #[test]
    fn test_orphans_are_removed_and_indices_remapped() {
        let mut doc = testing::triangle_document();
        // An unused accessor, material, texture and mesh before the live ones.
        doc.accessors.insert(0, Accessor::new(ElementType::Scalar, vec![1.0]));
        for mesh in &mut doc.meshes {
            for primitive in &mut mesh.primitives {
                primitive.remap_accessors(|id| id + 1);
            }
        }
        doc.add_mesh(Mesh::default());
        doc.add_material(Material::default());
        doc.add_texture(testing::png_texture("unused", 4, 4));

        doc.collect_garbage();

        assert_eq!(doc.accessors.len(), 2);
        assert_eq!(doc.meshes.len(), 1);
        assert!(doc.materials.is_empty());
        assert!(doc.textures.is_empty());
        let primitive = &doc.meshes[0].primitives[0];
        assert_eq!(primitive.position(), Some(0));
        assert_eq!(doc.vertex_count(primitive), 3);
    }

    #[test]
    fn test_empty_mesh_is_detached() {
        let mut doc = testing::triangle_document();
        doc.meshes[0].primitives.clear();
        doc.collect_garbage();
        assert!(doc.meshes.is_empty());
        assert_eq!(doc.nodes[0].mesh, None);
        assert!(doc.accessors.is_empty());
    }

    #[test]
    fn test_skin_joints_outside_scene_are_kept() {
        let mut doc = testing::triangle_document();
        let joint = doc.add_node(Node::default());
        doc.skins.push(Skin {
            joints: vec![joint],
            ..Default::default()
        });
        doc.nodes[0].skin = Some(0);
        let orphan = doc.add_node(Node::default());
        assert_eq!(orphan, 2);

        doc.collect_garbage();
        assert_eq!(doc.nodes.len(), 2);
        assert_eq!(doc.skins[0].joints, vec![1]);
    }

    #[test]
    fn test_animation_channels_to_removed_nodes_are_dropped() {
        let mut doc = testing::triangle_document();
        let orphan = doc.add_node(Node::default());
        let input = doc.add_accessor(Accessor::new(ElementType::Scalar, vec![0.0, 1.0]));
        let output = doc.add_accessor(Accessor::new(ElementType::Vec3, vec![0.0; 6]));
        doc.animations.push(Animation {
            name: None,
            channels: vec![AnimationChannel {
                sampler: 0,
                node: orphan,
                path: AnimationPath::Translation,
            }],
            samplers: vec![AnimationSampler {
                input,
                output,
                interpolation: Interpolation::Linear,
            }],
        });

        doc.collect_garbage();
        assert!(doc.animations.is_empty());
        assert_eq!(doc.accessors.len(), 2);
    }
}
