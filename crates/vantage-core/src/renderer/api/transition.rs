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

//! Resource access states and the barriers that move resources between them.

use super::resource::{BufferId, TextureId};
use std::fmt;

/// The last known access state of a GPU resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ResourceState {
    /// Contents undefined; the state of a freshly created resource.
    #[default]
    Undefined,
    /// Bound as a color attachment.
    RenderTarget,
    /// Bound as a writable depth attachment.
    DepthWrite,
    /// Bound as a read-only depth attachment or sampled as depth.
    DepthRead,
    /// Sampled from shaders.
    ShaderRead,
    /// Read/write from compute shaders.
    UnorderedAccess,
    /// Source of a copy.
    TransferSrc,
    /// Destination of a copy.
    TransferDst,
}

impl ResourceState {
    /// Returns `true` if shaders may sample a resource in this state.
    #[inline]
    pub fn is_readable(&self) -> bool {
        matches!(self, ResourceState::ShaderRead | ResourceState::DepthRead)
    }

    /// Returns `true` if a pass writes the resource in this state.
    #[inline]
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            ResourceState::RenderTarget
                | ResourceState::DepthWrite
                | ResourceState::UnorderedAccess
                | ResourceState::TransferDst
        )
    }
}

/// A texture or a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceHandle {
    /// A texture.
    Texture(TextureId),
    /// A buffer.
    Buffer(BufferId),
}

impl fmt::Display for ResourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceHandle::Texture(id) => write!(f, "texture#{}", id.0),
            ResourceHandle::Buffer(id) => write!(f, "buffer#{}", id.0),
        }
    }
}

impl From<TextureId> for ResourceHandle {
    fn from(id: TextureId) -> Self {
        ResourceHandle::Texture(id)
    }
}

impl From<BufferId> for ResourceHandle {
    fn from(id: BufferId) -> Self {
        ResourceHandle::Buffer(id)
    }
}

/// One barrier: move one mip of a resource from `before` to `after`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransitionBarrier {
    /// The resource.
    pub resource: ResourceHandle,
    /// Mip level. Always 0 for buffers.
    pub mip: u32,
    /// State recorded by the ledger before the barrier.
    pub before: ResourceState,
    /// State after the barrier.
    pub after: ResourceState,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_readable_states() {
        assert!(ResourceState::ShaderRead.is_readable());
        assert!(ResourceState::DepthRead.is_readable());
        assert!(!ResourceState::RenderTarget.is_readable());
        assert!(!ResourceState::Undefined.is_readable());
        assert!(ResourceState::UnorderedAccess.is_write());
    }

    #[test]
    fn test_handle_display() {
        assert_eq!(ResourceHandle::from(TextureId(7)).to_string(), "texture#7");
        assert_eq!(ResourceHandle::from(BufferId(2)).to_string(), "buffer#2");
    }
}
