// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Per-controller link state.

use std::fmt;

use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::adapter::BleAdapter;

/// Phase of the connection state machine.
///
/// ```text
/// Idle -> Scanning -> Connecting -> ConnectedPendingGatt -> Ready
///   ^                                                         |
///   +--------------------- disconnect ------------------------+
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkPhase {
    /// No link, nothing in progress.
    #[default]
    Idle,
    /// Discovery is running.
    Scanning,
    /// Transport connect in progress.
    Connecting,
    /// Transport link is up, GATT handles not resolved yet.
    ConnectedPendingGatt,
    /// Write characteristic resolved; pushes can be sent.
    Ready,
}

impl LinkPhase {
    /// Returns true while the transport link is up.
    #[must_use]
    pub fn is_connected(self) -> bool {
        matches!(self, Self::ConnectedPendingGatt | Self::Ready)
    }

    /// Returns true once the write characteristic is usable.
    #[must_use]
    pub fn is_ready(self) -> bool {
        self == Self::Ready
    }
}

impl fmt::Display for LinkPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Idle => "idle",
            Self::Scanning => "scanning",
            Self::Connecting => "connecting",
            Self::ConnectedPendingGatt => "connected (pending GATT)",
            Self::Ready => "ready",
        };
        f.write_str(label)
    }
}

/// Snapshot of a controller, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ControllerStatus {
    /// Current phase.
    pub phase: LinkPhase,
    /// Value of the exposed switch.
    pub switch_on: bool,
    /// Whether a write handle is held.
    pub has_write_handle: bool,
    /// Whether the heartbeat task is running.
    pub heartbeat_active: bool,
}

/// Running keep-alive task.
pub(crate) struct Heartbeat {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl Heartbeat {
    pub(crate) fn new(token: CancellationToken, handle: JoinHandle<()>) -> Self {
        Self { token, handle }
    }

    /// Cancels the task. A read in flight is dropped at its next await.
    pub(crate) fn stop(self) {
        self.token.cancel();
    }

    fn is_active(&self) -> bool {
        !self.token.is_cancelled() && !self.handle.is_finished()
    }
}

/// Link state of one controller.
///
/// Every handle belongs to one link generation. Starting or tearing down a
/// link bumps the generation, so observers and connect sequences started for
/// an older link can detect that they are stale and leave the state alone.
/// Each generation also carries a token that is cancelled when the link is
/// cleared, ending the tasks bound to it.
pub(crate) struct ConnectionState<A: BleAdapter> {
    phase: LinkPhase,
    generation: u64,
    device: Option<A::Device>,
    write: Option<A::Characteristic>,
    notify: Option<A::Characteristic>,
    heartbeat: Option<Heartbeat>,
    link: Option<CancellationToken>,
}

impl<A: BleAdapter> ConnectionState<A> {
    pub(crate) fn new() -> Self {
        Self {
            phase: LinkPhase::Idle,
            generation: 0,
            device: None,
            write: None,
            notify: None,
            heartbeat: None,
            link: None,
        }
    }

    pub(crate) fn phase(&self) -> LinkPhase {
        self.phase
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) fn device(&self) -> Option<A::Device> {
        self.device.clone()
    }

    pub(crate) fn write_handle(&self) -> Option<A::Characteristic> {
        self.write.clone()
    }

    pub(crate) fn notify_handle(&self) -> Option<A::Characteristic> {
        self.notify.clone()
    }

    /// Moves from `from` to `to`; does nothing if the phase changed meanwhile.
    pub(crate) fn transition(&mut self, from: LinkPhase, to: LinkPhase) -> bool {
        if self.phase == from {
            self.phase = to;
            true
        } else {
            false
        }
    }

    /// Enters `Connecting` unless a link is already up.
    pub(crate) fn begin_connect(&mut self) -> bool {
        if self.phase.is_connected() {
            return false;
        }
        self.phase = LinkPhase::Connecting;
        true
    }

    /// Records a fresh transport link and returns its generation.
    ///
    /// `link` is cancelled when the link is cleared.
    pub(crate) fn begin_link(&mut self, device: A::Device, link: CancellationToken) -> u64 {
        if let Some(previous) = self.link.replace(link) {
            previous.cancel();
        }
        self.generation += 1;
        self.phase = LinkPhase::ConnectedPendingGatt;
        self.device = Some(device);
        self.write = None;
        self.notify = None;
        self.generation
    }

    /// Stores the write handle if `generation` is still the live link.
    pub(crate) fn mark_ready(&mut self, generation: u64, write: A::Characteristic) -> bool {
        if generation != self.generation || self.phase != LinkPhase::ConnectedPendingGatt {
            return false;
        }
        self.write = Some(write);
        self.phase = LinkPhase::Ready;
        true
    }

    /// Stores the notify handle if `generation` is still the live link.
    pub(crate) fn set_notify(&mut self, generation: u64, notify: A::Characteristic) -> bool {
        if generation != self.generation || !self.phase.is_connected() {
            return false;
        }
        self.notify = Some(notify);
        true
    }

    /// Installs a heartbeat, returning the one it replaces.
    pub(crate) fn replace_heartbeat(&mut self, heartbeat: Heartbeat) -> Option<Heartbeat> {
        self.heartbeat.replace(heartbeat)
    }

    pub(crate) fn take_heartbeat(&mut self) -> Option<Heartbeat> {
        self.heartbeat.take()
    }

    /// Drops every handle of the current link at once and returns to `Idle`.
    ///
    /// The returned heartbeat must be stopped by the caller.
    pub(crate) fn clear_link(&mut self) -> Option<Heartbeat> {
        if let Some(link) = self.link.take() {
            link.cancel();
        }
        self.generation += 1;
        self.phase = LinkPhase::Idle;
        self.device = None;
        self.write = None;
        self.notify = None;
        self.heartbeat.take()
    }

    pub(crate) fn status(&self, switch_on: bool) -> ControllerStatus {
        ControllerStatus {
            phase: self.phase,
            switch_on,
            has_write_handle: self.write.is_some(),
            heartbeat_active: self.heartbeat.as_ref().is_some_and(Heartbeat::is_active),
        }
    }
}

impl<A: BleAdapter> fmt::Debug for ConnectionState<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionState")
            .field("phase", &self.phase)
            .field("generation", &self.generation)
            .field("has_device", &self.device.is_some())
            .field("has_write", &self.write.is_some())
            .field("has_notify", &self.notify.is_some())
            .finish_non_exhaustive()
    }
}
