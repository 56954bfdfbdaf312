// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! BLE transport on top of the `bluest` crate.
//!
//! Discovery runs as a background scan task that records every advertising
//! device whose platform ID carries a hardware address. Platforms that hide
//! addresses behind opaque IDs (macOS) never report a match.

use std::collections::{HashMap, HashSet};
use std::pin::pin;
use std::sync::Arc;

use ::bluest::{Adapter, Characteristic, ConnectionEvent, Device, Service};
use futures_util::StreamExt;
use parking_lot::Mutex;
use regex::Regex;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::{BleAdapter, WriteMode};
use crate::error::AdapterError;
use crate::types::MacAddress;

const ADDRESS_PATTERN: &str = r"([0-9A-Fa-f]{2}[:_-]){5}[0-9A-Fa-f]{2}";

#[derive(Default)]
struct Discovered {
    known: HashMap<MacAddress, Device>,
    seen: HashSet<MacAddress>,
}

/// Extracts the last hardware address embedded in a platform device ID.
fn extract_address(pattern: &Regex, id: &str) -> Option<MacAddress> {
    pattern
        .find_iter(id)
        .last()
        .and_then(|m| MacAddress::parse(m.as_str()).ok())
}

struct ScanTask {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Adapter driving the system Bluetooth stack.
pub struct BluestAdapter {
    adapter: Adapter,
    address_pattern: Regex,
    discovered: Arc<Mutex<Discovered>>,
    scan: Mutex<Option<ScanTask>>,
}

impl BluestAdapter {
    /// Opens the default system adapter.
    ///
    /// # Errors
    ///
    /// Returns `AdapterError::Unavailable` if the system has no Bluetooth
    /// adapter.
    pub async fn new() -> Result<Self, AdapterError> {
        let adapter = Adapter::default()
            .await
            .ok_or_else(|| AdapterError::Unavailable("no Bluetooth adapter found".into()))?;
        let address_pattern =
            Regex::new(ADDRESS_PATTERN).map_err(|e| AdapterError::Unavailable(e.to_string()))?;

        Ok(Self {
            adapter,
            address_pattern,
            discovered: Arc::new(Mutex::new(Discovered::default())),
            scan: Mutex::new(None),
        })
    }

    async fn scan_task(
        adapter: Adapter,
        pattern: Regex,
        discovered: Arc<Mutex<Discovered>>,
        token: CancellationToken,
    ) {
        let mut stream = match adapter.scan(&[]).await {
            Ok(stream) => stream,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to start BLE scan");
                return;
            }
        };

        loop {
            tokio::select! {
                () = token.cancelled() => break,
                next = stream.next() => {
                    let Some(advertising) = next else {
                        tracing::debug!("BLE scan stream ended");
                        break;
                    };
                    let device = advertising.device;
                    let Some(address) = extract_address(&pattern, &device.id().to_string()) else {
                        tracing::trace!(id = %device.id(), "Ignoring device without address");
                        continue;
                    };

                    let mut discovered = discovered.lock();
                    if discovered.seen.insert(address) {
                        tracing::trace!(%address, rssi = ?advertising.rssi, "Advertisement");
                    }
                    discovered.known.insert(address, device);
                }
            }
        }
    }
}

#[async_trait::async_trait]
impl BleAdapter for BluestAdapter {
    type Device = Device;
    type Service = Service;
    type Characteristic = Characteristic;

    async fn ready(&self) -> Result<(), AdapterError> {
        self.adapter.wait_available().await?;
        tracing::info!("Bluetooth adapter is available");
        Ok(())
    }

    async fn start_discovery(&self) -> Result<(), AdapterError> {
        self.discovered.lock().seen.clear();

        let token = CancellationToken::new();
        let handle = tokio::spawn(Self::scan_task(
            self.adapter.clone(),
            self.address_pattern.clone(),
            Arc::clone(&self.discovered),
            token.clone(),
        ));

        let previous = self.scan.lock().replace(ScanTask { token, handle });
        if let Some(previous) = previous {
            previous.token.cancel();
        }
        Ok(())
    }

    async fn stop_discovery(&self) -> Result<(), AdapterError> {
        let task = self.scan.lock().take();
        if let Some(task) = task {
            task.token.cancel();
            task.handle
                .await
                .map_err(|e| AdapterError::Discovery(e.to_string()))?;
        }
        Ok(())
    }

    async fn discovered_addresses(&self) -> Result<Vec<MacAddress>, AdapterError> {
        Ok(self.discovered.lock().seen.iter().copied().collect())
    }

    async fn resolve_device(&self, address: &MacAddress) -> Result<Device, AdapterError> {
        self.discovered
            .lock()
            .known
            .get(address)
            .cloned()
            .ok_or_else(|| AdapterError::UnknownDevice(address.to_string()))
    }

    async fn connect(&self, device: &Device) -> Result<(), AdapterError> {
        if !device.is_connected().await {
            self.adapter.connect_device(device).await?;
        }
        Ok(())
    }

    async fn disconnect(&self, device: &Device) -> Result<(), AdapterError> {
        if device.is_connected().await {
            self.adapter.disconnect_device(device).await?;
        }
        Ok(())
    }

    async fn disconnected(&self, device: &Device) -> Result<(), AdapterError> {
        let events = self.adapter.device_connection_events(device).await?;
        let mut events = pin!(events);

        if !device.is_connected().await {
            return Ok(());
        }

        while let Some(event) = events.next().await {
            if matches!(event, ConnectionEvent::Disconnected) {
                break;
            }
        }
        Ok(())
    }

    async fn service(&self, device: &Device, uuid: Uuid) -> Result<Service, AdapterError> {
        device
            .discover_services_with_uuid(uuid)
            .await?
            .into_iter()
            .next()
            .ok_or(AdapterError::ServiceNotFound(uuid))
    }

    async fn characteristic(
        &self,
        service: &Service,
        uuid: Uuid,
    ) -> Result<Characteristic, AdapterError> {
        service
            .discover_characteristics_with_uuid(uuid)
            .await?
            .into_iter()
            .next()
            .ok_or(AdapterError::CharacteristicNotFound(uuid))
    }

    async fn write(
        &self,
        characteristic: &Characteristic,
        data: &[u8],
        mode: WriteMode,
    ) -> Result<(), AdapterError> {
        match mode {
            WriteMode::Request => characteristic.write(data).await?,
            WriteMode::Command => characteristic.write_without_response(data).await?,
        }
        Ok(())
    }

    async fn read(&self, characteristic: &Characteristic) -> Result<Vec<u8>, AdapterError> {
        Ok(characteristic.read().await?)
    }

    async fn subscribe(&self, characteristic: &Characteristic) -> Result<(), AdapterError> {
        let characteristic = characteristic.clone();
        let (subscribed_tx, subscribed_rx) = oneshot::channel();

        // The stream borrows the characteristic, so it lives in its own task
        // until the link drops.
        tokio::spawn(async move {
            let stream = match characteristic.notify().await {
                Ok(stream) => {
                    let _ = subscribed_tx.send(Ok(()));
                    stream
                }
                Err(e) => {
                    let _ = subscribed_tx.send(Err(e));
                    return;
                }
            };

            let mut stream = pin!(stream);
            while let Some(value) = stream.next().await {
                match value {
                    Ok(value) => tracing::trace!(len = value.len(), "Notification"),
                    Err(e) => {
                        tracing::debug!(error = %e, "Notification stream failed");
                        break;
                    }
                }
            }
        });

        subscribed_rx
            .await
            .map_err(|_| AdapterError::Gatt("notification task ended early".into()))??;
        Ok(())
    }
}

impl std::fmt::Debug for BluestAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BluestAdapter")
            .field("scanning", &self.scan.lock().is_some())
            .finish_non_exhaustive()
    }
}
