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

//! # Lane Abstraction
//!
//! A **Lane** is one stage of the frame: culling, shadows, the G-buffer,
//! lighting, or a post-process step. The orchestrator owns the lanes and
//! runs them in dependency order, handing each one a [`LaneContext`] that
//! carries the frame's inputs and collects the lane's outputs.
//!
//! ## Lifecycle
//!
//! ```text
//! on_initialize(ctx)  →  [ on_viewport_resized(ctx)? execute(ctx) ]*  →  on_shutdown(ctx)
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use vantage_core::lane::{Lane, LaneKind, LaneError, LaneContext};
//!
//! struct NoopLane;
//!
//! impl Lane for NoopLane {
//!     fn strategy_name(&self) -> &'static str { "Noop" }
//!     fn lane_kind(&self) -> LaneKind { LaneKind::PostProcess }
//!     fn execute(&self, _ctx: &mut LaneContext) -> Result<(), LaneError> { Ok(()) }
//!     fn as_any(&self) -> &dyn std::any::Any { self }
//!     fn as_any_mut(&mut self) -> &mut dyn std::any::Any { self }
//! }
//! ```

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;

pub mod context_keys;
pub use context_keys::*;

/// Error type for lane operations.
#[derive(Debug)]
pub enum LaneError {
    /// The lane has not been initialized yet.
    NotInitialized,
    /// The execution context is missing an entry or holds the wrong type.
    InvalidContext {
        /// What the lane expected.
        expected: &'static str,
        /// Description of what was received.
        received: String,
    },
    /// A domain-specific error occurred during execution.
    ExecutionFailed(Box<dyn std::error::Error + Send + Sync>),
    /// A domain-specific error occurred during initialization.
    InitializationFailed(Box<dyn std::error::Error + Send + Sync>),
}

impl fmt::Display for LaneError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LaneError::NotInitialized => write!(f, "Lane not initialized"),
            LaneError::InvalidContext { expected, received } => {
                write!(
                    f,
                    "Invalid lane context: expected {expected}, got {received}"
                )
            }
            LaneError::ExecutionFailed(e) => write!(f, "Lane execution failed: {e}"),
            LaneError::InitializationFailed(e) => write!(f, "Lane initialization failed: {e}"),
        }
    }
}

impl std::error::Error for LaneError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LaneError::ExecutionFailed(e) | LaneError::InitializationFailed(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

impl LaneError {
    /// Convenience constructor for a missing context entry.
    pub fn missing(type_name: &'static str) -> Self {
        LaneError::InvalidContext {
            expected: type_name,
            received: "not found in LaneContext".into(),
        }
    }

    /// Wraps an execution-time error.
    pub fn execution(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        LaneError::ExecutionFailed(Box::new(err))
    }

    /// Wraps an initialization-time error.
    pub fn initialization(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        LaneError::InitializationFailed(Box::new(err))
    }
}

/// Classification of lanes, in frame order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LaneKind {
    /// Visibility culling.
    Cull,
    /// Shadow map generation.
    Shadow,
    /// G-buffer fill and depth pyramid.
    Geometry,
    /// Direct and indirect light accumulation.
    Lighting,
    /// Screen-space post-processing.
    PostProcess,
}

impl fmt::Display for LaneKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LaneKind::Cull => write!(f, "Cull"),
            LaneKind::Shadow => write!(f, "Shadow"),
            LaneKind::Geometry => write!(f, "Geometry"),
            LaneKind::Lighting => write!(f, "Lighting"),
            LaneKind::PostProcess => write!(f, "PostProcess"),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// LaneContext: type-map for passing frame data to lanes
// ─────────────────────────────────────────────────────────────────────────────

/// A type-erased context for passing data to lanes.
///
/// The orchestrator inserts the frame's inputs; lanes read them by type and
/// insert their outputs for the lanes that follow.
///
/// # Safety
///
/// `LaneContext` uses `unsafe impl Send + Sync` because it may hold
/// [`Slot`] / [`Ref`] wrappers containing raw pointers. The context is
/// created for one frame on the recording thread and dropped before the
/// borrowed data is touched again.
pub struct LaneContext {
    data: HashMap<TypeId, Box<dyn Any>>,
}

// SAFETY: values inserted through `insert` are Send + Sync; Slot/Ref wrappers
// are frame-scoped and only used on the recording thread.
unsafe impl Send for LaneContext {}
unsafe impl Sync for LaneContext {}

impl LaneContext {
    /// Creates an empty context.
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
        }
    }

    /// Inserts a value, keyed by its concrete type, replacing any previous one.
    pub fn insert<T: 'static + Send + Sync>(&mut self, value: T) {
        self.data.insert(TypeId::of::<T>(), Box::new(value));
    }

    /// Returns a shared reference to a value by type.
    pub fn get<T: 'static>(&self) -> Option<&T> {
        self.data.get(&TypeId::of::<T>())?.downcast_ref()
    }

    /// Returns a mutable reference to a value by type.
    pub fn get_mut<T: 'static>(&mut self) -> Option<&mut T> {
        self.data.get_mut(&TypeId::of::<T>())?.downcast_mut()
    }

    /// Returns a value by type or a [`LaneError::missing`] naming it.
    pub fn require<T: 'static>(&self, name: &'static str) -> Result<&T, LaneError> {
        self.get::<T>().ok_or(LaneError::missing(name))
    }

    /// Checks whether a value of the given type is present.
    pub fn contains<T: 'static>(&self) -> bool {
        self.data.contains_key(&TypeId::of::<T>())
    }

    /// Removes and returns a value by type.
    pub fn remove<T: 'static>(&mut self) -> Option<T> {
        self.data
            .remove(&TypeId::of::<T>())
            .and_then(|b| b.downcast().ok().map(|b| *b))
    }
}

impl Default for LaneContext {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for LaneContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LaneContext")
            .field("entries", &self.data.len())
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Slot / Ref: borrowing through LaneContext
// ─────────────────────────────────────────────────────────────────────────────

/// Wraps a **mutable** borrow for storage in [`LaneContext`].
///
/// The caller must remove the `Slot` before the original reference ends.
pub struct Slot<T: ?Sized>(*mut T);

// SAFETY: Slot is used only within single-threaded frame scopes.
unsafe impl<T: ?Sized> Send for Slot<T> {}
unsafe impl<T: ?Sized> Sync for Slot<T> {}

impl<T: ?Sized> Slot<T> {
    /// Creates a `Slot` from a mutable reference.
    pub fn new(value: &mut T) -> Self {
        Self(value as *mut T)
    }

    /// Returns a mutable reference to the wrapped value.
    #[allow(clippy::mut_from_ref)]
    pub fn get(&self) -> &mut T {
        // SAFETY: one lane at a time, and the slot never outlives the borrow.
        unsafe { &mut *self.0 }
    }

    /// Returns a shared reference to the wrapped value.
    pub fn get_ref(&self) -> &T {
        // SAFETY: same as get()
        unsafe { &*self.0 }
    }
}

/// Wraps a **shared** borrow for storage in [`LaneContext`].
pub struct Ref<T: ?Sized>(*const T);

// SAFETY: Ref is used only within single-threaded frame scopes.
unsafe impl<T: ?Sized> Send for Ref<T> {}
unsafe impl<T: ?Sized> Sync for Ref<T> {}

impl<T: ?Sized> Ref<T> {
    /// Creates a `Ref` from a shared reference.
    pub fn new(value: &T) -> Self {
        Self(value as *const T)
    }

    /// Returns a shared reference to the wrapped value.
    pub fn get(&self) -> &T {
        // SAFETY: guaranteed by frame-scoped lifetime
        unsafe { &*self.0 }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Lane traits
// ─────────────────────────────────────────────────────────────────────────────

/// Base trait for every stage of the frame.
///
/// All lifecycle methods receive a [`LaneContext`]. Render lanes expect an
/// `Arc<GraphicsContext>` in it, plus the frame keys from [`context_keys`].
pub trait Lane: Send + Sync {
    /// Human-readable name, used as the log prefix.
    fn strategy_name(&self) -> &'static str;

    /// The kind of processing this lane performs.
    fn lane_kind(&self) -> LaneKind;

    /// Estimated relative cost of running this lane.
    fn estimate_cost(&self, _ctx: &LaneContext) -> f32 {
        1.0
    }

    /// Called once before the first frame, and again after a flag-triggered rebuild.
    ///
    /// Builds programs and pipelines. A shader failure here is fatal to the stage.
    fn on_initialize(&self, _ctx: &mut LaneContext) -> Result<(), LaneError> {
        Ok(())
    }

    /// Records this lane's GPU work for the frame.
    fn execute(&self, _ctx: &mut LaneContext) -> Result<(), LaneError> {
        Ok(())
    }

    /// Releases every GPU object the lane owns.
    fn on_shutdown(&self, _ctx: &mut LaneContext) {}

    /// Downcast to a concrete type.
    fn as_any(&self) -> &dyn Any;

    /// Downcast to a concrete type (mutable).
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// A lane owning resolution-dependent render targets.
pub trait RenderLane: Lane {
    /// Recreates targets for the [`Viewport`] in the context.
    fn on_viewport_resized(&self, _ctx: &mut LaneContext) -> Result<(), LaneError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_round_trip() {
        let mut ctx = LaneContext::new();
        ctx.insert(42u32);
        assert_eq!(ctx.get::<u32>(), Some(&42));
        *ctx.get_mut::<u32>().unwrap() = 7;
        assert_eq!(ctx.remove::<u32>(), Some(7));
        assert!(!ctx.contains::<u32>());
    }

    #[test]
    fn test_require_names_missing_type() {
        let ctx = LaneContext::new();
        let err = ctx.require::<u64>("FrameIndex").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid lane context: expected FrameIndex, got not found in LaneContext"
        );
    }

    #[test]
    fn test_slot_and_ref() {
        let mut value = 10u32;
        {
            let mut ctx = LaneContext::new();
            ctx.insert(Slot::new(&mut value));
            *ctx.get::<Slot<u32>>().unwrap().get() = 20;
        }
        assert_eq!(value, 20);
        let text = String::from("scene");
        let mut ctx = LaneContext::new();
        ctx.insert(Ref::new(&text));
        assert_eq!(ctx.get::<Ref<String>>().unwrap().get(), "scene");
    }
}
