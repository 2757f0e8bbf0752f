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

//! # Vantage Core
//!
//! Foundational crate of the frame orchestrator: the backend-agnostic graphics
//! contracts, the math and scene types every stage reads, configuration, and
//! the [`lane`] abstraction the stages implement.

#![warn(missing_docs)]

pub mod config;
pub mod lane;
pub mod math;
pub mod renderer;
pub mod scene;

pub use config::{Environment, EnvironmentValues, RendererConfig};
pub use renderer::{GraphicsContext, RenderFlags};
