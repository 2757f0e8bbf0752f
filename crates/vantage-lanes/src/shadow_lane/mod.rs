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

//! Shadow maps and the lane that keeps them current.
//!
//! Each face of a map runs a small state machine (see [`UpdateState`]):
//! a face is only re-rendered when it was never drawn, when its light or its
//! static casters changed, or when dynamic casters are in view.

mod shadow_map;
mod shadow_map_set;

pub use shadow_map::*;
pub use shadow_map_set::*;
