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

//! Two-frame-latency GPU query readback.
//!
//! Frame `N` records its queries into slot `N % 2` and, before recording,
//! polls the results of frame `N - 1` from the other slot. Polling never
//! blocks: results the GPU has not produced yet are counted as missed and
//! dropped.

use crate::renderer::api::{QueryKind, QuerySetDescriptor, QuerySetId};
use crate::renderer::context::GraphicsContext;
use crate::renderer::error::ResourceError;
use crate::renderer::traits::CommandEncoder;

/// Number of query slots cycled through.
pub const MAX_FRAMES_IN_FLIGHT: usize = 2;

/// Query results of one completed frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameStatistics {
    /// Frame the results were recorded in.
    pub frame_index: u64,
    /// Raw query values, one per query.
    pub values: Vec<u64>,
}

/// Double-buffered query sets with non-blocking readback.
#[derive(Debug)]
pub struct QueryReadback {
    sets: [QuerySetId; MAX_FRAMES_IN_FLIGHT],
    recorded: [Option<u64>; MAX_FRAMES_IN_FLIGHT],
    queries_per_frame: u32,
    missed: u64,
}

impl QueryReadback {
    /// Creates one query set per slot.
    pub fn new(
        context: &GraphicsContext,
        kind: QueryKind,
        queries_per_frame: u32,
    ) -> Result<Self, ResourceError> {
        let count = queries_per_frame.max(1);
        let first = context.create_query_set(&QuerySetDescriptor {
            label: Some("frame queries 0"),
            kind,
            count,
        })?;
        let second = match context.create_query_set(&QuerySetDescriptor {
            label: Some("frame queries 1"),
            kind,
            count,
        }) {
            Ok(id) => id,
            Err(e) => {
                if let Err(release) = context.destroy_query_set(first) {
                    log::warn!("QueryReadback: failed to release {first:?}: {release}");
                }
                return Err(e);
            }
        };
        Ok(Self {
            sets: [first, second],
            recorded: [None; MAX_FRAMES_IN_FLIGHT],
            queries_per_frame: count,
            missed: 0,
        })
    }

    #[inline]
    fn slot(frame_index: u64) -> usize {
        (frame_index % MAX_FRAMES_IN_FLIGHT as u64) as usize
    }

    /// Query set frame `frame_index` records into.
    pub fn set_for_frame(&self, frame_index: u64) -> QuerySetId {
        self.sets[Self::slot(frame_index)]
    }

    /// Polls the previous frame's slot without waiting.
    ///
    /// Returns its statistics if the GPU has finished them. Unready results
    /// are counted in [`missed`](Self::missed) and discarded.
    pub fn poll(&mut self, context: &GraphicsContext, frame_index: u64) -> Option<FrameStatistics> {
        let previous = frame_index.checked_sub(1)?;
        let slot = Self::slot(previous);
        let recorded = self.recorded[slot].take()?;
        if recorded != previous {
            return None;
        }
        match context.read_query_results(self.sets[slot], 0..self.queries_per_frame) {
            Ok(Some(values)) => Some(FrameStatistics {
                frame_index: previous,
                values,
            }),
            Ok(None) => {
                self.missed += 1;
                log::debug!("QueryReadback: results of frame {previous} not ready, dropped");
                None
            }
            Err(e) => {
                self.missed += 1;
                log::warn!("QueryReadback: reading frame {previous} failed: {e}");
                None
            }
        }
    }

    /// Opens query `index` of this frame's slot.
    pub fn begin(&self, encoder: &mut dyn CommandEncoder, frame_index: u64, index: u32) {
        encoder.begin_query(self.set_for_frame(frame_index), index);
    }

    /// Closes query `index` of this frame's slot and marks the slot pending.
    pub fn end(&mut self, encoder: &mut dyn CommandEncoder, frame_index: u64, index: u32) {
        encoder.end_query(self.set_for_frame(frame_index), index);
        self.recorded[Self::slot(frame_index)] = Some(frame_index);
    }

    /// Number of results dropped because they were not ready in time.
    pub fn missed(&self) -> u64 {
        self.missed
    }

    /// Releases both query sets.
    pub fn destroy(&mut self, context: &GraphicsContext) {
        for set in self.sets {
            if let Err(e) = context.destroy_query_set(set) {
                log::warn!("QueryReadback: failed to destroy {set:?}: {e}");
            }
        }
        self.recorded = [None; MAX_FRAMES_IN_FLIGHT];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slots_alternate() {
        assert_eq!(QueryReadback::slot(0), 0);
        assert_eq!(QueryReadback::slot(1), 1);
        assert_eq!(QueryReadback::slot(2), 0);
        assert_eq!(QueryReadback::slot(7), 1);
    }
}
