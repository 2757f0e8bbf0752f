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

//! The per-frame output of frustum culling.

use vantage_core::math::Overlap;
use vantage_core::renderer::LightId;
use vantage_core::scene::MeshKey;

/// Distance bucket selecting a mesh's level of detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LodBucket {
    /// Closer than the first LOD distance.
    Near,
    /// Between the two LOD distances.
    Mid,
    /// Beyond the second LOD distance.
    Far,
}

impl LodBucket {
    /// Buckets a squared distance against squared thresholds.
    #[inline]
    pub fn from_distance_sq(distance_sq: f32, thresholds_sq: (f32, f32)) -> Self {
        if distance_sq < thresholds_sq.0 {
            LodBucket::Near
        } else if distance_sq < thresholds_sq.1 {
            LodBucket::Mid
        } else {
            LodBucket::Far
        }
    }

    /// Zero-based LOD index.
    pub fn index(self) -> u32 {
        self as u32
    }
}

/// A mesh that survived culling.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisibleMesh {
    /// Arena key of the mesh.
    pub key: MeshKey,
    /// LOD bucket.
    pub lod: LodBucket,
    /// How the bounds overlap the frustum.
    pub overlap: Overlap,
    /// Squared distance from the eye to the bounds center.
    pub distance_sq: f32,
}

/// Binned, ordered references to everything a camera sees.
///
/// Opaque, alpha-tested and emissive bins are sorted front to back, the
/// transparent bin back to front. Ties keep arena order, so identical inputs
/// always produce an identical set.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct VisibleSet {
    /// Opaque meshes.
    pub opaque: Vec<VisibleMesh>,
    /// Alpha-tested meshes.
    pub alpha_tested: Vec<VisibleMesh>,
    /// Blended meshes.
    pub transparent: Vec<VisibleMesh>,
    /// Emissive meshes. An emissive opaque mesh is listed here and in its material bin.
    pub emissive: Vec<VisibleMesh>,
    /// Visible lights, in scene order.
    pub lights: Vec<LightId>,
    /// Visible lights carrying a light shaft, back to front.
    pub lightshafts: Vec<LightId>,
    /// Indices of probes whose volume reaches the camera.
    pub inside_probes: Vec<usize>,
    /// Indices of probes seen from outside.
    pub outside_probes: Vec<usize>,
    /// Indices of particle emitters with live particles in view.
    pub emitters: Vec<usize>,
    /// Dynamic meshes (actors) that survived culling.
    pub visible_actors: u32,
    /// Tightened near plane.
    pub near: f32,
    /// Tightened far plane.
    pub far: f32,
}

impl VisibleSet {
    /// Returns `true` if nothing survived.
    pub fn is_empty(&self) -> bool {
        self.opaque.is_empty()
            && self.alpha_tested.is_empty()
            && self.transparent.is_empty()
            && self.emissive.is_empty()
            && self.lights.is_empty()
            && self.inside_probes.is_empty()
            && self.outside_probes.is_empty()
            && self.emitters.is_empty()
    }

    /// Opaque and alpha-tested meshes, the bins drawn into depth.
    pub fn solid_meshes(&self) -> impl Iterator<Item = &VisibleMesh> {
        self.opaque.iter().chain(self.alpha_tested.iter())
    }

    /// Number of distinct meshes across all material bins.
    pub fn mesh_count(&self) -> usize {
        self.opaque.len() + self.alpha_tested.len() + self.transparent.len()
    }

    /// Returns `true` if the mesh is in any bin.
    pub fn contains_mesh(&self, key: MeshKey) -> bool {
        self.solid_meshes()
            .chain(self.transparent.iter())
            .chain(self.emissive.iter())
            .any(|m| m.key == key)
    }

    /// Returns `true` if the light is visible.
    pub fn contains_light(&self, id: LightId) -> bool {
        self.lights.contains(&id)
    }

    /// Clears every bin, keeping allocations.
    pub fn clear(&mut self) {
        self.opaque.clear();
        self.alpha_tested.clear();
        self.transparent.clear();
        self.emissive.clear();
        self.lights.clear();
        self.lightshafts.clear();
        self.inside_probes.clear();
        self.outside_probes.clear();
        self.emitters.clear();
        self.visible_actors = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lod_bucket_thresholds() {
        let t = (50.0 * 50.0, 100.0 * 100.0);
        assert_eq!(LodBucket::from_distance_sq(49.0 * 49.0, t), LodBucket::Near);
        assert_eq!(LodBucket::from_distance_sq(2500.0, t), LodBucket::Mid);
        assert_eq!(LodBucket::from_distance_sq(10_000.0, t), LodBucket::Far);
        assert_eq!(LodBucket::Far.index(), 2);
    }

    #[test]
    fn test_empty_set() {
        let set = VisibleSet::default();
        assert!(set.is_empty());
        assert_eq!(set.mesh_count(), 0);
    }
}
