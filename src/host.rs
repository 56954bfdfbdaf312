// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Host-facing switch.
//!
//! A home-automation host sees each device as a momentary on/off switch:
//! reading it is instant, turning it on triggers a push, and it always falls
//! back to off on its own after the auto-off delay.

use serde::Serialize;
use tokio::sync::watch;

use crate::adapter::BleAdapter;
use crate::manager::DeviceController;

/// Manufacturer reported to the host.
pub const MANUFACTURER: &str = "PushBot";

/// Model reported to the host.
pub const MODEL: &str = "BLE Push Button";

/// Static identity of an accessory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessoryInfo {
    /// Display name.
    pub name: String,
    /// Manufacturer label.
    pub manufacturer: String,
    /// Model label.
    pub model: String,
    /// Serial number: the normalized hardware address.
    pub serial: String,
}

/// Switch handle handed to the host integration layer.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use pushbot_bridge::adapter::SimulatedAdapter;
/// use pushbot_bridge::event::EventBus;
/// use pushbot_bridge::manager::{ControllerTiming, DeviceConfig, DeviceController};
/// use pushbot_bridge::types::PushPacket;
/// use tokio_util::sync::CancellationToken;
/// use uuid::Uuid;
///
/// let config = DeviceConfig::new(
///     "AA:BB:CC:DD:EE:FF".parse().unwrap(),
///     Uuid::from_u128(1),
///     Uuid::from_u128(2),
///     PushPacket::from_hex("570100").unwrap(),
/// );
/// let controller = DeviceController::new(
///     config,
///     ControllerTiming::default(),
///     Arc::new(SimulatedAdapter::new()),
///     EventBus::new(),
///     CancellationToken::new(),
/// );
///
/// let switch = controller.accessory();
/// assert_eq!(switch.info().serial, "aabbccddeeff");
/// assert!(!switch.get());
/// ```
pub struct SwitchAccessory<A: BleAdapter> {
    controller: DeviceController<A>,
    info: AccessoryInfo,
}

impl<A: BleAdapter> Clone for SwitchAccessory<A> {
    fn clone(&self) -> Self {
        Self {
            controller: self.controller.clone(),
            info: self.info.clone(),
        }
    }
}

impl<A: BleAdapter> SwitchAccessory<A> {
    pub(crate) fn new(controller: DeviceController<A>) -> Self {
        let config = controller.config();
        let info = AccessoryInfo {
            name: config.name.clone(),
            manufacturer: MANUFACTURER.to_string(),
            model: MODEL.to_string(),
            serial: config.address.key(),
        };
        Self { controller, info }
    }

    /// Returns the static identity.
    #[must_use]
    pub fn info(&self) -> &AccessoryInfo {
        &self.info
    }

    /// Returns the current switch value without touching the radio.
    #[must_use]
    pub fn get(&self) -> bool {
        self.controller.switch_on()
    }

    /// Requests a new switch value and returns immediately.
    ///
    /// `true` starts an activation in the background; the outcome is only
    /// visible through [`watch`](Self::watch) and the event bus.
    pub fn set(&self, on: bool) {
        if on {
            drop(self.controller.trigger(true));
        }
    }

    /// Returns a receiver for outbound state pushes.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<bool> {
        self.controller.watch_switch()
    }

    /// Returns the underlying controller.
    #[must_use]
    pub fn controller(&self) -> &DeviceController<A> {
        &self.controller
    }
}

impl<A: BleAdapter> std::fmt::Debug for SwitchAccessory<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SwitchAccessory")
            .field("info", &self.info)
            .field("on", &self.get())
            .finish()
    }
}
