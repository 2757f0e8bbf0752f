// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Read-only scene data consumed by the frame.
//!
//! Meshes are arena-indexed: a [`MeshKey`] addresses both the common
//! [`MeshRecord`] and, through a secondary map, the typed [`MeshExtension`]
//! carrying material bindings. Stages that need the extension look it up by
//! the same key.

use crate::math::{Aabb, Mat4, Vec3};
use crate::renderer::api::{BufferId, IndexFormat, TextureId};
use crate::renderer::light::{Light, LightId};
use slotmap::{new_key_type, SecondaryMap, SlotMap};

new_key_type! {
    /// Arena key of a mesh.
    pub struct MeshKey;
}

/// Material class, which decides the visibility bin of a mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MaterialClass {
    /// Fully opaque.
    Opaque,
    /// Opaque with alpha-tested cutouts.
    AlphaTested,
    /// Blended; drawn after lighting, back to front.
    Transparent,
}

/// Vertex and index buffers of a mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeshBuffers {
    /// Vertex data.
    pub vertex: BufferId,
    /// Index data.
    pub index: BufferId,
    /// Index element width.
    pub index_format: IndexFormat,
    /// Number of indices.
    pub index_count: u32,
}

/// Common data of every mesh.
#[derive(Debug, Clone, PartialEq)]
pub struct MeshRecord {
    /// Object-space bounds.
    pub local_bounds: Aabb,
    /// World-space bounds, derived from `local_bounds` and `world`.
    pub bounds: Aabb,
    /// Object-to-world transform.
    pub world: Mat4,
    /// Transform of the previous frame, for velocity.
    pub prev_world: Mat4,
    /// Visibility bin.
    pub material: MaterialClass,
    /// Contributes to the emissive bin.
    pub emissive: bool,
    /// Drawn without face culling.
    pub two_sided: bool,
    /// Rendered into shadow maps.
    pub casts_shadow: bool,
    /// Moves at runtime (an actor).
    pub dynamic: bool,
    /// Hidden meshes are skipped by culling.
    pub visible: bool,
    /// Number of bones for skinned meshes.
    pub bone_count: Option<u32>,
    /// GPU buffers.
    pub buffers: MeshBuffers,
}

impl MeshRecord {
    /// A visible, static, opaque shadow caster.
    pub fn new(local_bounds: Aabb, world: Mat4, buffers: MeshBuffers) -> Self {
        Self {
            local_bounds,
            bounds: local_bounds.transform(&world),
            world,
            prev_world: world,
            material: MaterialClass::Opaque,
            emissive: false,
            two_sided: false,
            casts_shadow: true,
            dynamic: false,
            visible: true,
            bone_count: None,
            buffers,
        }
    }

    /// Builder-style: sets the material class.
    pub fn with_material(mut self, material: MaterialClass) -> Self {
        self.material = material;
        self
    }

    /// Builder-style: marks the mesh as a moving actor.
    pub fn dynamic(mut self) -> Self {
        self.dynamic = true;
        self
    }

    /// Builder-style: marks the mesh as emissive.
    pub fn emissive(mut self) -> Self {
        self.emissive = true;
        self
    }

    /// Builder-style: skinned mesh with `bones` bones.
    pub fn skinned(mut self, bones: u32) -> Self {
        self.bone_count = Some(bones);
        self
    }

    /// Bit pattern of the world transform, for change detection.
    pub fn transform_bits(&self) -> [u32; 16] {
        crate::math::matrix_bits(&self.world)
    }
}

/// Material bindings and instancing of a mesh.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MeshExtension {
    /// Albedo map.
    pub albedo: Option<TextureId>,
    /// Normal map.
    pub normal: Option<TextureId>,
    /// Specular/roughness map.
    pub specular: Option<TextureId>,
    /// Emissive map.
    pub emissive: Option<TextureId>,
    /// Instances drawn per call. `0` and `1` both mean one.
    pub instance_count: u32,
    /// Tint id used by the colorize debug views.
    pub colorize_id: u32,
}

/// An irradiance probe volume.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnvProbe {
    /// Index into the SH data buffer.
    pub index: u32,
    /// Center of the volume.
    pub center: Vec3,
    /// Half extents of the volume.
    pub half_extents: Vec3,
}

impl EnvProbe {
    /// World bounds of the probe volume.
    pub fn bounds(&self) -> Aabb {
        Aabb::from_center_half_extents(self.center, self.half_extents)
    }
}

/// A particle emitter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParticleEmitter {
    /// World bounds of every live particle.
    pub bounds: Aabb,
    /// Live particles.
    pub particle_count: u32,
    /// Per-particle instance data.
    pub instance_buffer: Option<BufferId>,
}

/// The scene handed to the frame, read-only during recording.
#[derive(Debug, Default)]
pub struct Scene {
    meshes: SlotMap<MeshKey, MeshRecord>,
    extensions: SecondaryMap<MeshKey, MeshExtension>,
    /// Lights, in insertion order.
    pub lights: Vec<Light>,
    /// Irradiance probes.
    pub probes: Vec<EnvProbe>,
    /// Particle emitters.
    pub emitters: Vec<ParticleEmitter>,
    /// Opaque SH coefficient buffer consumed by probe lighting.
    pub probe_sh_buffer: Option<BufferId>,
    /// Image-based lighting inputs: prefiltered cubemap and BRDF lookup.
    pub ibl: Option<IblTextures>,
    /// Scene time in seconds.
    pub animation_time: f32,
}

/// Textures sampled by image-based lighting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IblTextures {
    /// Prefiltered environment cubemap.
    pub prefiltered: TextureId,
    /// Split-sum BRDF lookup.
    pub brdf_lut: TextureId,
}

impl Scene {
    /// An empty scene.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a mesh and returns its key.
    pub fn add_mesh(&mut self, record: MeshRecord) -> MeshKey {
        self.meshes.insert(record)
    }

    /// Adds a mesh together with its extension.
    pub fn add_mesh_with(&mut self, record: MeshRecord, extension: MeshExtension) -> MeshKey {
        let key = self.meshes.insert(record);
        self.extensions.insert(key, extension);
        key
    }

    /// Removes a mesh and its extension.
    pub fn remove_mesh(&mut self, key: MeshKey) -> Option<MeshRecord> {
        self.extensions.remove(key);
        self.meshes.remove(key)
    }

    /// Looks up a mesh.
    pub fn mesh(&self, key: MeshKey) -> Option<&MeshRecord> {
        self.meshes.get(key)
    }

    /// Looks up a mesh's extension.
    pub fn extension(&self, key: MeshKey) -> Option<&MeshExtension> {
        self.extensions.get(key)
    }

    /// Iterates meshes in arena order.
    pub fn meshes(&self) -> impl Iterator<Item = (MeshKey, &MeshRecord)> {
        self.meshes.iter()
    }

    /// Number of meshes.
    pub fn mesh_count(&self) -> usize {
        self.meshes.len()
    }

    /// Moves a mesh. The old transform becomes its previous-frame transform.
    pub fn set_mesh_transform(&mut self, key: MeshKey, world: Mat4) -> bool {
        match self.meshes.get_mut(key) {
            Some(mesh) => {
                mesh.prev_world = mesh.world;
                mesh.world = world;
                mesh.bounds = mesh.local_bounds.transform(&world);
                true
            }
            None => false,
        }
    }

    /// Copies every current transform into the previous-frame slot.
    ///
    /// Called once per frame after recording so that meshes that did not move
    /// report zero velocity on the next frame.
    pub fn settle_transforms(&mut self) {
        for (_, mesh) in self.meshes.iter_mut() {
            mesh.prev_world = mesh.world;
        }
    }

    /// Adds a light.
    pub fn add_light(&mut self, light: Light) {
        self.lights.push(light);
    }

    /// Looks up a light by id.
    pub fn light(&self, id: LightId) -> Option<&Light> {
        self.lights.iter().find(|l| l.id == id)
    }

    /// Looks up a light by id, mutably.
    pub fn light_mut(&mut self, id: LightId) -> Option<&mut Light> {
        self.lights.iter_mut().find(|l| l.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffers() -> MeshBuffers {
        MeshBuffers {
            vertex: BufferId(1),
            index: BufferId(2),
            index_format: IndexFormat::Uint32,
            index_count: 36,
        }
    }

    #[test]
    fn test_extension_shares_key() {
        let mut scene = Scene::new();
        let unit = Aabb::from_sphere(Vec3::ZERO, 1.0);
        let plain = scene.add_mesh(MeshRecord::new(unit, Mat4::IDENTITY, buffers()));
        let textured = scene.add_mesh_with(
            MeshRecord::new(unit, Mat4::IDENTITY, buffers()),
            MeshExtension {
                albedo: Some(TextureId(9)),
                ..Default::default()
            },
        );
        assert!(scene.extension(plain).is_none());
        assert_eq!(scene.extension(textured).unwrap().albedo, Some(TextureId(9)));

        scene.remove_mesh(textured);
        assert!(scene.extension(textured).is_none());
        assert_eq!(scene.mesh_count(), 1);
    }

    #[test]
    fn test_transform_updates_bounds_and_history() {
        let mut scene = Scene::new();
        let key = scene.add_mesh(MeshRecord::new(
            Aabb::from_sphere(Vec3::ZERO, 1.0),
            Mat4::IDENTITY,
            buffers(),
        ));
        let moved = Mat4::from_translation(Vec3::new(10.0, 0.0, 0.0));
        assert!(scene.set_mesh_transform(key, moved));
        let mesh = scene.mesh(key).unwrap();
        assert_eq!(mesh.prev_world, Mat4::IDENTITY);
        assert_eq!(mesh.bounds.center(), Vec3::new(10.0, 0.0, 0.0));

        scene.settle_transforms();
        assert_eq!(scene.mesh(key).unwrap().prev_world, moved);
    }
}
