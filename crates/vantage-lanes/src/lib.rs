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

//! # Vantage Lanes
//!
//! The per-frame stages of the renderer. Each stage is a
//! [`Lane`](vantage_core::lane::Lane) that reads its inputs from the shared
//! [`LaneContext`](vantage_core::lane::LaneContext) and publishes its outputs
//! back into it:
//!
//! - [`cull_lane`]: frustum culling into a binned [`cull_lane::VisibleSet`]
//! - [`shadow_lane`]: shadow maps and their update state machine
//! - [`render_lane`]: G-buffer, depth pyramid and the lighting accumulator
//! - [`post_lane`]: the post-process chain

#![warn(missing_docs)]

pub mod cull_lane;
pub mod post_lane;
pub mod render_lane;
pub mod shadow_lane;
