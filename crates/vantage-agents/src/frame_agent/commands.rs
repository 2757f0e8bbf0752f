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

//! Host control commands.
//!
//! A host (benchmark driver, UI thread) never touches the orchestrator while
//! it records. It sends [`HostCommand`]s through an [`OrchestratorHandle`];
//! the orchestrator drains them at the start of the next frame.

use crossbeam_channel::{Receiver, Sender};
use vantage_core::lane::DebugView;
use vantage_core::renderer::{EffectParams, RenderFlags};

/// A request from the host, applied at the next frame boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum HostCommand {
    /// Replaces the feature flags.
    SetFlags(RenderFlags),
    /// Resizes the output.
    Resize {
        /// New width in pixels.
        width: u32,
        /// New height in pixels.
        height: u32,
    },
    /// Replaces the raw effect strengths of the global environment.
    SetEffects(EffectParams),
    /// Selects the texture shown by the debug overlay.
    SetDebugView(Option<DebugView>),
    /// Renders exactly one frame at the given scene time, then halts.
    RequestSingleFrame {
        /// Scene time of the frame, in seconds.
        time: f32,
    },
    /// Leaves single-frame mode.
    Resume,
}

/// Cloneable sender side of the orchestrator's command queue.
#[derive(Debug, Clone)]
pub struct OrchestratorHandle {
    sender: Sender<HostCommand>,
}

impl OrchestratorHandle {
    pub(crate) fn new(sender: Sender<HostCommand>) -> Self {
        Self { sender }
    }

    /// Queues a command. Returns `false` if the orchestrator is gone.
    pub fn send(&self, command: HostCommand) -> bool {
        if self.sender.send(command).is_err() {
            log::warn!("OrchestratorHandle: orchestrator dropped, command discarded");
            return false;
        }
        true
    }

    /// Queues [`HostCommand::SetFlags`].
    pub fn set_flags(&self, flags: RenderFlags) -> bool {
        self.send(HostCommand::SetFlags(flags))
    }

    /// Queues [`HostCommand::Resize`].
    pub fn resize(&self, width: u32, height: u32) -> bool {
        self.send(HostCommand::Resize { width, height })
    }

    /// Queues [`HostCommand::RequestSingleFrame`].
    pub fn request_single_frame(&self, time: f32) -> bool {
        self.send(HostCommand::RequestSingleFrame { time })
    }

    /// Queues [`HostCommand::Resume`].
    pub fn resume(&self) -> bool {
        self.send(HostCommand::Resume)
    }
}

/// Everything queued so far, in send order.
pub(crate) fn drain(receiver: &Receiver<HostCommand>) -> Vec<HostCommand> {
    receiver.try_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commands_drain_in_order() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let handle = OrchestratorHandle::new(tx);
        assert!(handle.resize(960, 540));
        assert!(handle.request_single_frame(2.5));
        assert!(handle.resume());
        assert_eq!(
            drain(&rx),
            vec![
                HostCommand::Resize {
                    width: 960,
                    height: 540
                },
                HostCommand::RequestSingleFrame { time: 2.5 },
                HostCommand::Resume,
            ]
        );
        assert!(drain(&rx).is_empty());
    }

    #[test]
    fn test_send_after_drop_reports_failure() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let handle = OrchestratorHandle::new(tx);
        drop(rx);
        assert!(!handle.set_flags(RenderFlags::empty()));
    }
}
