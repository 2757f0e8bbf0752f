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

//! Adapter identity and per-stage resource limits.

use serde::{Deserialize, Serialize};

/// Identifies the graphics backend family behind a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BackendFamily {
    /// A desktop-class API.
    Desktop,
    /// A mobile-class API with tighter binding limits.
    Mobile,
    /// A software or test implementation.
    Emulated,
}

/// Information about the adapter the device runs on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterInfo {
    /// Adapter name as reported by the driver.
    pub name: String,
    /// Backend family.
    pub backend: BackendFamily,
}

/// Limits checked by the optional binding conformance check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceLimits {
    /// Largest 2D texture edge.
    pub max_texture_dimension_2d: u32,
    /// Sampled textures per shader stage.
    pub max_sampled_textures_per_stage: u32,
    /// Storage textures or buffers per shader stage.
    pub max_storage_resources_per_stage: u32,
    /// Uniform buffers per shader stage.
    pub max_uniform_buffers_per_stage: u32,
}

impl Default for DeviceLimits {
    fn default() -> Self {
        Self {
            max_texture_dimension_2d: 8192,
            max_sampled_textures_per_stage: 16,
            max_storage_resources_per_stage: 8,
            max_uniform_buffers_per_stage: 12,
        }
    }
}

/// Optional device capabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceFeature {
    /// Compute shaders.
    Compute,
    /// Pipeline-statistics queries.
    PipelineStatisticsQuery,
    /// Timestamp queries.
    TimestampQuery,
}
