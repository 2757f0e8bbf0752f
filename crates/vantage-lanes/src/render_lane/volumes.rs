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

//! Unit proxy meshes drawn to bound light and probe volumes.
//!
//! All meshes enclose their ideal shape: the icosahedron circumscribes the
//! unit sphere and the cone's polygonal base circumscribes the unit circle.
//! A proxy that cut into its volume would leave unlit pixels at the edges.

use bytemuck::{Pod, Zeroable};
use std::f32::consts::TAU;
use vantage_core::math::{Mat4, Quat, Vec3};
use vantage_core::renderer::api::{BufferDescriptor, BufferId, BufferUsage, IndexFormat};
use vantage_core::renderer::{GraphicsContext, ResourceError};

/// Segments around the cone base.
pub const CONE_SEGMENTS: u32 = 16;

/// Position-only vertex.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct VolumeVertex {
    /// Object-space position.
    pub position: [f32; 3],
}

fn v(x: f32, y: f32, z: f32) -> VolumeVertex {
    VolumeVertex {
        position: [x, y, z],
    }
}

/// Cube spanning -1..1 on every axis, outward winding.
pub fn unit_box() -> (Vec<VolumeVertex>, Vec<u16>) {
    let vertices = vec![
        v(-1.0, -1.0, -1.0),
        v(1.0, -1.0, -1.0),
        v(1.0, 1.0, -1.0),
        v(-1.0, 1.0, -1.0),
        v(-1.0, -1.0, 1.0),
        v(1.0, -1.0, 1.0),
        v(1.0, 1.0, 1.0),
        v(-1.0, 1.0, 1.0),
    ];
    let indices = vec![
        0, 2, 1, 0, 3, 2, // -z
        4, 5, 6, 4, 6, 7, // +z
        0, 1, 5, 0, 5, 4, // -y
        3, 7, 6, 3, 6, 2, // +y
        0, 4, 7, 0, 7, 3, // -x
        1, 2, 6, 1, 6, 5, // +x
    ];
    (vertices, indices)
}

/// Icosahedron whose faces lie outside the unit sphere.
pub fn sphere() -> (Vec<VolumeVertex>, Vec<u16>) {
    let t = (1.0 + 5.0f32.sqrt()) / 2.0;
    let raw = [
        Vec3::new(-1.0, t, 0.0),
        Vec3::new(1.0, t, 0.0),
        Vec3::new(-1.0, -t, 0.0),
        Vec3::new(1.0, -t, 0.0),
        Vec3::new(0.0, -1.0, t),
        Vec3::new(0.0, 1.0, t),
        Vec3::new(0.0, -1.0, -t),
        Vec3::new(0.0, 1.0, -t),
        Vec3::new(t, 0.0, -1.0),
        Vec3::new(t, 0.0, 1.0),
        Vec3::new(-t, 0.0, -1.0),
        Vec3::new(-t, 0.0, 1.0),
    ];
    let indices: Vec<u16> = vec![
        0, 11, 5, 0, 5, 1, 0, 1, 7, 0, 7, 10, 0, 10, 11, //
        1, 5, 9, 5, 11, 4, 11, 10, 2, 10, 7, 6, 7, 1, 8, //
        3, 9, 4, 3, 4, 2, 3, 2, 6, 3, 6, 8, 3, 8, 9, //
        4, 9, 5, 2, 4, 11, 6, 2, 10, 8, 6, 7, 9, 8, 1,
    ];
    // Scale so the face planes, not the vertices, sit at distance 1.
    let a = raw[0].normalize();
    let b = raw[11].normalize();
    let c = raw[5].normalize();
    let inradius = ((a + b + c) / 3.0).length();
    let vertices = raw
        .iter()
        .map(|p| {
            let p = p.normalize() / inradius;
            v(p.x, p.y, p.z)
        })
        .collect();
    (vertices, indices)
}

/// Cone with its apex at the origin and its base at `z = -1`, radius 1.
pub fn cone() -> (Vec<VolumeVertex>, Vec<u16>) {
    let scale = 1.0 / (TAU / (2.0 * CONE_SEGMENTS as f32)).cos();
    let mut vertices = vec![v(0.0, 0.0, 0.0), v(0.0, 0.0, -1.0)];
    for i in 0..CONE_SEGMENTS {
        let a = TAU * i as f32 / CONE_SEGMENTS as f32;
        vertices.push(v(a.cos() * scale, a.sin() * scale, -1.0));
    }
    let mut indices = Vec::with_capacity(CONE_SEGMENTS as usize * 6);
    for i in 0..CONE_SEGMENTS {
        let cur = 2 + i as u16;
        let next = 2 + ((i + 1) % CONE_SEGMENTS) as u16;
        indices.extend_from_slice(&[0, cur, next]);
        indices.extend_from_slice(&[1, next, cur]);
    }
    (vertices, indices)
}

/// An uploaded proxy mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeMesh {
    /// Positions.
    pub vertex: BufferId,
    /// 16-bit indices.
    pub index: BufferId,
    /// Number of indices.
    pub index_count: u32,
}

impl VolumeMesh {
    fn upload(
        gfx: &GraphicsContext,
        label: &str,
        (vertices, indices): (Vec<VolumeVertex>, Vec<u16>),
    ) -> Result<Self, ResourceError> {
        let vertex = gfx.create_buffer_with_data(
            &BufferDescriptor {
                label: Some(format!("{label} vertices").into()),
                size: std::mem::size_of_val(vertices.as_slice()) as u64,
                usage: BufferUsage::VERTEX,
            },
            bytemuck::cast_slice(&vertices),
        )?;
        let index = match gfx.create_buffer_with_data(
            &BufferDescriptor {
                label: Some(format!("{label} indices").into()),
                size: std::mem::size_of_val(indices.as_slice()) as u64,
                usage: BufferUsage::INDEX,
            },
            bytemuck::cast_slice(&indices),
        ) {
            Ok(id) => id,
            Err(e) => {
                let _ = gfx.destroy_buffer(vertex);
                return Err(e);
            }
        };
        Ok(Self {
            vertex,
            index,
            index_count: indices.len() as u32,
        })
    }

    /// Index element width.
    pub fn index_format(&self) -> IndexFormat {
        IndexFormat::Uint16
    }

    fn release(&self, gfx: &GraphicsContext) {
        for buffer in [self.vertex, self.index] {
            if let Err(e) = gfx.destroy_buffer(buffer) {
                log::warn!("LightVolumes: failed to destroy {buffer:?}: {e}");
            }
        }
    }
}

/// The three proxy meshes, uploaded once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LightVolumes {
    /// Box lights and probes.
    pub unit_box: VolumeMesh,
    /// Omni lights.
    pub sphere: VolumeMesh,
    /// Spot lights.
    pub cone: VolumeMesh,
}

impl LightVolumes {
    /// Uploads the proxies.
    pub fn create(gfx: &GraphicsContext) -> Result<Self, ResourceError> {
        let unit_box = VolumeMesh::upload(gfx, "volume box", unit_box())?;
        let sphere = match VolumeMesh::upload(gfx, "volume sphere", sphere()) {
            Ok(m) => m,
            Err(e) => {
                unit_box.release(gfx);
                return Err(e);
            }
        };
        let cone = match VolumeMesh::upload(gfx, "volume cone", cone()) {
            Ok(m) => m,
            Err(e) => {
                unit_box.release(gfx);
                sphere.release(gfx);
                return Err(e);
            }
        };
        Ok(Self {
            unit_box,
            sphere,
            cone,
        })
    }

    /// Destroys the proxies.
    pub fn destroy(&self, gfx: &GraphicsContext) {
        self.unit_box.release(gfx);
        self.sphere.release(gfx);
        self.cone.release(gfx);
    }
}

/// Places the unit sphere proxy around an omni light.
pub fn sphere_model(center: Vec3, radius: f32) -> Mat4 {
    Mat4::from_translation(center) * Mat4::from_scale(Vec3::splat(radius))
}

/// Places the unit box proxy over an axis-aligned box.
pub fn box_model(center: Vec3, half_extents: Vec3) -> Mat4 {
    Mat4::from_translation(center) * Mat4::from_scale(half_extents)
}

/// Places the cone proxy along a spot light.
///
/// `outer_angle` is the half angle in degrees.
pub fn cone_model(apex: Vec3, direction: Vec3, range: f32, outer_angle: f32) -> Mat4 {
    let base_radius = range * outer_angle.clamp(0.1, 89.0).to_radians().tan();
    let forward = direction.normalize_or(Vec3::NEG_Z);
    let rotation = Quat::from_rotation_arc(Vec3::NEG_Z, forward);
    Mat4::from_scale_rotation_translation(
        Vec3::new(base_radius, base_radius, range),
        rotation,
        apex,
    )
}
