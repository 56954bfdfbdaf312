// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! BLE transport abstraction.
//!
//! Controllers never talk to a Bluetooth stack directly; they go through the
//! [`BleAdapter`] trait, which covers exactly what the connection state
//! machine needs: discovery, connect, GATT lookup, characteristic I/O and
//! disconnect notification.
//!
//! # Implementations
//!
//! - [`SimulatedAdapter`]: in-process peripherals with injectable faults and
//!   a recorded call log
//! - `BluestAdapter` (feature `bluest`): real hardware through the `bluest`
//!   crate

#[cfg(feature = "bluest")]
mod bluest_adapter;
mod simulated;

#[cfg(feature = "bluest")]
pub use bluest_adapter::BluestAdapter;
pub use simulated::{
    AdapterCall, RecordedCall, SimCharacteristic, SimDevice, SimService, SimulatedAdapter,
    SimulatedPeripheral,
};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AdapterError;
use crate::types::MacAddress;

/// How a characteristic write is performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteMode {
    /// Write request, acknowledged by the peripheral.
    #[default]
    Request,
    /// Write command, fire and forget.
    Command,
}

/// Capabilities a BLE transport must provide to drive a controller.
///
/// Handles (`Device`, `Service`, `Characteristic`) are owned by the adapter;
/// controllers clone and hold them only while the link is up.
#[async_trait::async_trait]
pub trait BleAdapter: Send + Sync + 'static {
    /// Handle to a discovered peripheral.
    type Device: Clone + Send + Sync + 'static;
    /// Handle to a resolved GATT service.
    type Service: Send + Sync + 'static;
    /// Handle to a resolved GATT characteristic.
    type Characteristic: Clone + Send + Sync + 'static;

    /// Waits until the radio is usable.
    ///
    /// # Errors
    ///
    /// Returns `AdapterError::Unavailable` if there is no usable adapter.
    async fn ready(&self) -> Result<(), AdapterError>;

    /// Starts collecting advertisements.
    async fn start_discovery(&self) -> Result<(), AdapterError>;

    /// Stops collecting advertisements.
    async fn stop_discovery(&self) -> Result<(), AdapterError>;

    /// Lists every address seen while discovery was running.
    async fn discovered_addresses(&self) -> Result<Vec<MacAddress>, AdapterError>;

    /// Returns the handle for a discovered address.
    async fn resolve_device(&self, address: &MacAddress) -> Result<Self::Device, AdapterError>;

    /// Establishes the transport link.
    async fn connect(&self, device: &Self::Device) -> Result<(), AdapterError>;

    /// Tears the transport link down. Does nothing if it is already down.
    async fn disconnect(&self, device: &Self::Device) -> Result<(), AdapterError>;

    /// Resolves once, when the link to `device` goes down.
    async fn disconnected(&self, device: &Self::Device) -> Result<(), AdapterError>;

    /// Looks up a primary service by UUID.
    async fn service(&self, device: &Self::Device, uuid: Uuid)
    -> Result<Self::Service, AdapterError>;

    /// Looks up a characteristic of `service` by UUID.
    async fn characteristic(
        &self,
        service: &Self::Service,
        uuid: Uuid,
    ) -> Result<Self::Characteristic, AdapterError>;

    /// Writes `data` to a characteristic.
    async fn write(
        &self,
        characteristic: &Self::Characteristic,
        data: &[u8],
        mode: WriteMode,
    ) -> Result<(), AdapterError>;

    /// Reads the current value of a characteristic.
    async fn read(&self, characteristic: &Self::Characteristic) -> Result<Vec<u8>, AdapterError>;

    /// Enables notifications on a characteristic.
    async fn subscribe(&self, characteristic: &Self::Characteristic) -> Result<(), AdapterError>;
}
