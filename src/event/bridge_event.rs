// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Bridge event types.

use serde::Serialize;

use super::DeviceId;

/// Events emitted by device controllers.
///
/// Every event carries the ID of the controller that produced it.
///
/// # Examples
///
/// ```
/// use pushbot_bridge::event::{BridgeEvent, DeviceId};
///
/// let device_id = DeviceId::new();
///
/// let connected = BridgeEvent::ConnectionChanged {
///     device_id,
///     connected: true,
///     error: None,
/// };
/// assert!(connected.is_connection());
///
/// let off = BridgeEvent::switch_changed(device_id, false);
/// assert_eq!(off.device_id(), device_id);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BridgeEvent {
    /// A controller was registered.
    DeviceAdded {
        /// The ID of the controller.
        device_id: DeviceId,
        /// Display name of the device.
        name: String,
    },

    /// The link to the peripheral went up or down.
    ConnectionChanged {
        /// The ID of the controller.
        device_id: DeviceId,
        /// Whether the transport link is now up.
        connected: bool,
        /// Reason for the change, if it was caused by an error.
        error: Option<String>,
    },

    /// The exposed switch changed value.
    ///
    /// Auto-off always publishes `on: false`, even when the switch was
    /// already off.
    SwitchChanged {
        /// The ID of the controller.
        device_id: DeviceId,
        /// New switch value.
        on: bool,
    },

    /// An activation finished.
    PushCompleted {
        /// The ID of the controller.
        device_id: DeviceId,
        /// Whether the packet reached the peripheral.
        delivered: bool,
        /// Number of write attempts made. Zero if the link could not be
        /// established.
        attempts: u32,
    },
}

impl BridgeEvent {
    /// Returns the device ID associated with this event.
    #[must_use]
    pub fn device_id(&self) -> DeviceId {
        match self {
            Self::DeviceAdded { device_id, .. }
            | Self::ConnectionChanged { device_id, .. }
            | Self::SwitchChanged { device_id, .. }
            | Self::PushCompleted { device_id, .. } => *device_id,
        }
    }

    /// Returns `true` if this is a connection event.
    #[must_use]
    pub fn is_connection(&self) -> bool {
        matches!(self, Self::ConnectionChanged { .. })
    }

    /// Returns `true` if this is a switch event.
    #[must_use]
    pub fn is_switch(&self) -> bool {
        matches!(self, Self::SwitchChanged { .. })
    }

    /// Creates a device added event.
    #[must_use]
    pub fn device_added(device_id: DeviceId, name: impl Into<String>) -> Self {
        Self::DeviceAdded {
            device_id,
            name: name.into(),
        }
    }

    /// Creates a connected event.
    #[must_use]
    pub fn connected(device_id: DeviceId) -> Self {
        Self::ConnectionChanged {
            device_id,
            connected: true,
            error: None,
        }
    }

    /// Creates a disconnected event.
    #[must_use]
    pub fn disconnected(device_id: DeviceId) -> Self {
        Self::ConnectionChanged {
            device_id,
            connected: false,
            error: None,
        }
    }

    /// Creates a disconnected event with an error.
    #[must_use]
    pub fn disconnected_with_error(device_id: DeviceId, error: impl Into<String>) -> Self {
        Self::ConnectionChanged {
            device_id,
            connected: false,
            error: Some(error.into()),
        }
    }

    /// Creates a switch changed event.
    #[must_use]
    pub fn switch_changed(device_id: DeviceId, on: bool) -> Self {
        Self::SwitchChanged { device_id, on }
    }

    /// Creates a push completed event.
    #[must_use]
    pub fn push_completed(device_id: DeviceId, delivered: bool, attempts: u32) -> Self {
        Self::PushCompleted {
            device_id,
            delivered,
            attempts,
        }
    }
}
