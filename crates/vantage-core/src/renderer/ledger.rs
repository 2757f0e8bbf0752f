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

//! The resource transition ledger.
//!
//! Every texture and buffer shared between stages has one entry per mip
//! recording its last known [`ResourceState`]. Stages never issue barriers by
//! hand: they describe the states they need through a [`TransitionBatch`],
//! which emits only the barriers that actually change something and updates
//! the ledger in the same step.
//!
//! A resource may be sampled only after a transition to a readable state was
//! recorded following its last write. [`ResourceLedger::ensure_readable`]
//! checks exactly that before a stage binds its inputs.

use crate::renderer::api::{BufferId, ResourceHandle, ResourceState, TextureId, TransitionBarrier};
use crate::renderer::traits::CommandEncoder;
use std::collections::HashMap;
use thiserror::Error;

/// Errors raised by ledger lookups.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// The resource was never registered, or was already destroyed.
    #[error("{0} is not registered with the transition ledger")]
    Unregistered(ResourceHandle),
    /// The resource is not in a shader-readable state.
    #[error("{resource} mip {mip} is in state {state:?}, not shader-readable")]
    NotReadable {
        /// The resource.
        resource: ResourceHandle,
        /// The offending mip.
        mip: u32,
        /// Its current state.
        state: ResourceState,
    },
    /// A mip index beyond the resource's mip count.
    #[error("{resource} has {count} mips, mip {mip} requested")]
    MipOutOfRange {
        /// The resource.
        resource: ResourceHandle,
        /// Requested mip.
        mip: u32,
        /// Number of mips registered.
        count: u32,
    },
}

/// Last known access state of every registered resource, per mip.
#[derive(Debug, Default)]
pub struct ResourceLedger {
    entries: HashMap<ResourceHandle, Vec<ResourceState>>,
}

impl ResourceLedger {
    /// Creates an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a texture with `mip_count` mips, all `Undefined`.
    pub fn register_texture(&mut self, id: TextureId, mip_count: u32) {
        self.entries.insert(
            ResourceHandle::Texture(id),
            vec![ResourceState::Undefined; mip_count.max(1) as usize],
        );
    }

    /// Registers a buffer in the `Undefined` state.
    pub fn register_buffer(&mut self, id: BufferId) {
        self.entries
            .insert(ResourceHandle::Buffer(id), vec![ResourceState::Undefined]);
    }

    /// Drops the entry of a destroyed resource. Returns `true` if one existed.
    pub fn unregister(&mut self, resource: impl Into<ResourceHandle>) -> bool {
        self.entries.remove(&resource.into()).is_some()
    }

    /// Returns `true` if the resource has an entry.
    pub fn is_registered(&self, resource: impl Into<ResourceHandle>) -> bool {
        self.entries.contains_key(&resource.into())
    }

    /// Number of registered resources.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the state of one mip.
    pub fn state(&self, resource: impl Into<ResourceHandle>, mip: u32) -> Option<ResourceState> {
        self.entries
            .get(&resource.into())
            .and_then(|mips| mips.get(mip as usize).copied())
    }

    /// Fails unless every mip of `resource` is in a shader-readable state.
    pub fn ensure_readable(&self, resource: impl Into<ResourceHandle>) -> Result<(), LedgerError> {
        let resource = resource.into();
        let mips = self
            .entries
            .get(&resource)
            .ok_or(LedgerError::Unregistered(resource))?;
        match mips.iter().position(|s| !s.is_readable()) {
            Some(mip) => Err(LedgerError::NotReadable {
                resource,
                mip: mip as u32,
                state: mips[mip],
            }),
            None => Ok(()),
        }
    }

    /// Fails unless one mip of `resource` is shader-readable.
    pub fn ensure_mip_readable(
        &self,
        resource: impl Into<ResourceHandle>,
        mip: u32,
    ) -> Result<(), LedgerError> {
        let resource = resource.into();
        let mips = self
            .entries
            .get(&resource)
            .ok_or(LedgerError::Unregistered(resource))?;
        let state = *mips.get(mip as usize).ok_or(LedgerError::MipOutOfRange {
            resource,
            mip,
            count: mips.len() as u32,
        })?;
        if state.is_readable() {
            Ok(())
        } else {
            Err(LedgerError::NotReadable {
                resource,
                mip,
                state,
            })
        }
    }

    /// Starts a batch of transitions.
    pub fn batch(&mut self) -> TransitionBatch<'_> {
        TransitionBatch {
            ledger: self,
            pending: Vec::new(),
            error: None,
        }
    }

    fn mip_count(&self, resource: ResourceHandle) -> Result<u32, LedgerError> {
        self.entries
            .get(&resource)
            .map(|mips| mips.len() as u32)
            .ok_or(LedgerError::Unregistered(resource))
    }
}

/// A set of requested states, turned into barriers on [`submit`](Self::submit).
///
/// Requests for a state the resource is already in produce no barrier. If any
/// request names an unregistered resource, `submit` fails and neither the
/// encoder nor the ledger is touched.
#[must_use = "a transition batch does nothing until submitted"]
pub struct TransitionBatch<'a> {
    ledger: &'a mut ResourceLedger,
    pending: Vec<TransitionBarrier>,
    error: Option<LedgerError>,
}

impl<'a> TransitionBatch<'a> {
    /// Requests `state` for every mip of a texture.
    pub fn texture(mut self, id: TextureId, state: ResourceState) -> Self {
        let resource = ResourceHandle::Texture(id);
        match self.ledger.mip_count(resource) {
            Ok(count) => {
                for mip in 0..count {
                    self.request(resource, mip, state);
                }
            }
            Err(e) => self.fail(e),
        }
        self
    }

    /// Requests `state` for one mip of a texture.
    pub fn mip(mut self, id: TextureId, level: u32, state: ResourceState) -> Self {
        let resource = ResourceHandle::Texture(id);
        match self.ledger.mip_count(resource) {
            Ok(count) if level < count => self.request(resource, level, state),
            Ok(count) => self.fail(LedgerError::MipOutOfRange {
                resource,
                mip: level,
                count,
            }),
            Err(e) => self.fail(e),
        }
        self
    }

    /// Requests `state` for a buffer.
    pub fn buffer(mut self, id: BufferId, state: ResourceState) -> Self {
        let resource = ResourceHandle::Buffer(id);
        match self.ledger.mip_count(resource) {
            Ok(_) => self.request(resource, 0, state),
            Err(e) => self.fail(e),
        }
        self
    }

    /// Records the barriers on `encoder` and commits them to the ledger.
    ///
    /// Returns the number of barriers emitted.
    pub fn submit(self, encoder: &mut dyn CommandEncoder) -> Result<usize, LedgerError> {
        let barriers = self.commit()?;
        if !barriers.is_empty() {
            encoder.transition_resources(&barriers);
        }
        Ok(barriers.len())
    }

    /// Commits to the ledger and returns the barriers without recording them.
    pub fn commit(self) -> Result<Vec<TransitionBarrier>, LedgerError> {
        if let Some(e) = self.error {
            return Err(e);
        }
        for barrier in &self.pending {
            if let Some(slot) = self
                .ledger
                .entries
                .get_mut(&barrier.resource)
                .and_then(|mips| mips.get_mut(barrier.mip as usize))
            {
                *slot = barrier.after;
            }
        }
        Ok(self.pending)
    }

    fn current(&self, resource: ResourceHandle, mip: u32) -> ResourceState {
        self.pending
            .iter()
            .rev()
            .find(|b| b.resource == resource && b.mip == mip)
            .map(|b| b.after)
            .or_else(|| self.ledger.state(resource, mip))
            .unwrap_or_default()
    }

    fn request(&mut self, resource: ResourceHandle, mip: u32, after: ResourceState) {
        let before = self.current(resource, mip);
        if before != after {
            self.pending.push(TransitionBarrier {
                resource,
                mip,
                before,
                after,
            });
        }
    }

    fn fail(&mut self, error: LedgerError) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_emits_only_changes() {
        let mut ledger = ResourceLedger::new();
        let tex = TextureId(1);
        ledger.register_texture(tex, 3);

        let barriers = ledger
            .batch()
            .texture(tex, ResourceState::RenderTarget)
            .commit()
            .unwrap();
        assert_eq!(barriers.len(), 3);
        assert!(barriers.iter().all(|b| b.before == ResourceState::Undefined));

        let again = ledger
            .batch()
            .texture(tex, ResourceState::RenderTarget)
            .commit()
            .unwrap();
        assert!(again.is_empty());

        let one = ledger
            .batch()
            .mip(tex, 1, ResourceState::ShaderRead)
            .commit()
            .unwrap();
        assert_eq!(one.len(), 1);
        assert_eq!(one[0].before, ResourceState::RenderTarget);
        assert_eq!(ledger.state(tex, 1), Some(ResourceState::ShaderRead));
    }

    #[test]
    fn test_chained_requests_in_one_batch() {
        let mut ledger = ResourceLedger::new();
        let tex = TextureId(4);
        ledger.register_texture(tex, 1);
        let barriers = ledger
            .batch()
            .texture(tex, ResourceState::TransferDst)
            .texture(tex, ResourceState::ShaderRead)
            .commit()
            .unwrap();
        assert_eq!(barriers.len(), 2);
        assert_eq!(barriers[1].before, ResourceState::TransferDst);
    }

    #[test]
    fn test_unregistered_fails_without_side_effects() {
        let mut ledger = ResourceLedger::new();
        let known = TextureId(1);
        ledger.register_texture(known, 1);
        let err = ledger
            .batch()
            .texture(known, ResourceState::ShaderRead)
            .texture(TextureId(99), ResourceState::ShaderRead)
            .commit()
            .unwrap_err();
        assert_eq!(
            err,
            LedgerError::Unregistered(ResourceHandle::Texture(TextureId(99)))
        );
        assert_eq!(ledger.state(known, 0), Some(ResourceState::Undefined));
    }

    #[test]
    fn test_ensure_readable() {
        let mut ledger = ResourceLedger::new();
        let tex = TextureId(2);
        ledger.register_texture(tex, 2);
        assert!(matches!(
            ledger.ensure_readable(tex),
            Err(LedgerError::NotReadable { mip: 0, .. })
        ));
        ledger
            .batch()
            .mip(tex, 0, ResourceState::ShaderRead)
            .commit()
            .unwrap();
        assert!(ledger.ensure_mip_readable(tex, 0).is_ok());
        assert!(matches!(
            ledger.ensure_readable(tex),
            Err(LedgerError::NotReadable { mip: 1, .. })
        ));
        ledger
            .batch()
            .mip(tex, 1, ResourceState::DepthRead)
            .commit()
            .unwrap();
        assert!(ledger.ensure_readable(tex).is_ok());

        assert!(ledger.unregister(tex));
        assert!(matches!(
            ledger.ensure_readable(tex),
            Err(LedgerError::Unregistered(_))
        ));
    }

    #[test]
    fn test_buffers_use_mip_zero() {
        let mut ledger = ResourceLedger::new();
        let buf = BufferId(8);
        ledger.register_buffer(buf);
        let barriers = ledger
            .batch()
            .buffer(buf, ResourceState::UnorderedAccess)
            .commit()
            .unwrap();
        assert_eq!(barriers[0].mip, 0);
        assert_eq!(ledger.state(buf, 0), Some(ResourceState::UnorderedAccess));
    }
}
