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

//! Provides the backend-agnostic rendering contracts of the frame orchestrator.
//!
//! This module defines the "common language" for all rendering operations: the
//! abstract `traits` (like [`GraphicsDevice`]), the data structures passed to
//! them (like [`TextureDescriptor`]), and the error types. On top of those sit
//! the orchestration primitives every stage shares: the [`GraphicsContext`],
//! the transition [`ResourceLedger`], [`RenderFlags`] and the effect
//! normalizer.
//!
//! A concrete backend implements [`GraphicsDevice`]; `vantage-lanes` and
//! `vantage-agents` only ever talk to these traits.

pub mod api;
pub mod camera;
pub mod context;
pub mod effects;
pub mod error;
pub mod flags;
pub mod ledger;
pub mod light;
pub mod readback;
pub mod traits;

// Re-export the most important traits and types for easier use.
pub use self::api::*;
pub use self::camera::{Camera, Projection};
pub use self::context::{GpuObject, GraphicsContext, LeakReport, LeakedObject, LimitViolation};
pub use self::effects::{EffectParameterNormalizer, EffectParams, NormalizedEffects};
pub use self::error::{InitStatus, PipelineError, RenderError, ResourceError, ShaderError};
pub use self::flags::RenderFlags;
pub use self::ledger::{LedgerError, ResourceLedger, TransitionBatch};
pub use self::light::{Light, LightId, LightKind};
pub use self::readback::{FrameStatistics, QueryReadback};
pub use self::traits::{CommandEncoder, ComputePass, GraphicsDevice, RenderPass};
