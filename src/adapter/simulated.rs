// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! In-process adapter with scripted peripherals.
//!
//! [`SimulatedAdapter`] behaves like a small BLE radio: peripherals can be
//! added, put in or out of range, and have their links dropped. Faults are
//! injected per operation, and every call is recorded with the tokio clock
//! so tests can check ordering and delays under a paused runtime.
//!
//! # Examples
//!
//! ```
//! use pushbot_bridge::adapter::{BleAdapter, SimulatedAdapter, SimulatedPeripheral};
//! use uuid::Uuid;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let service = Uuid::from_u128(1);
//! let write = Uuid::from_u128(2);
//!
//! let adapter = SimulatedAdapter::new();
//! adapter.add_peripheral(
//!     SimulatedPeripheral::new("aa:bb:cc:dd:ee:ff".parse().unwrap())
//!         .with_service(service, [write]),
//! );
//!
//! adapter.start_discovery().await.unwrap();
//! let seen = adapter.discovered_addresses().await.unwrap();
//! assert_eq!(seen.len(), 1);
//! # }
//! ```

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::time::Instant;
use uuid::Uuid;

use super::{BleAdapter, WriteMode};
use crate::error::AdapterError;
use crate::types::MacAddress;

/// A peripheral known to the simulated radio.
#[derive(Debug, Clone)]
pub struct SimulatedPeripheral {
    address: MacAddress,
    services: Vec<(Uuid, Vec<Uuid>)>,
    in_range: bool,
}

impl SimulatedPeripheral {
    /// Creates an in-range peripheral without services.
    #[must_use]
    pub fn new(address: MacAddress) -> Self {
        Self {
            address,
            services: Vec::new(),
            in_range: true,
        }
    }

    /// Adds a service and its characteristics.
    #[must_use]
    pub fn with_service(
        mut self,
        service: Uuid,
        characteristics: impl IntoIterator<Item = Uuid>,
    ) -> Self {
        self.services
            .push((service, characteristics.into_iter().collect()));
        self
    }

    /// Starts the peripheral out of range.
    #[must_use]
    pub fn out_of_range(mut self) -> Self {
        self.in_range = false;
        self
    }

    /// Returns the address.
    #[must_use]
    pub fn address(&self) -> MacAddress {
        self.address
    }
}

/// Device handle of the simulated adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimDevice {
    /// Address of the peripheral.
    pub address: MacAddress,
}

/// Service handle of the simulated adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimService {
    /// Address of the owning peripheral.
    pub address: MacAddress,
    /// Service UUID.
    pub uuid: Uuid,
}

/// Characteristic handle of the simulated adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimCharacteristic {
    /// Address of the owning peripheral.
    pub address: MacAddress,
    /// Characteristic UUID.
    pub uuid: Uuid,
}

/// One adapter operation, as recorded in the call log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdapterCall {
    /// `start_discovery`.
    StartDiscovery,
    /// `stop_discovery`.
    StopDiscovery,
    /// `connect`.
    Connect(MacAddress),
    /// `disconnect`.
    Disconnect(MacAddress),
    /// `service`.
    Service(Uuid),
    /// `characteristic`.
    Characteristic(Uuid),
    /// Start of a `write`. `link_up` tells whether the link was connected.
    Write {
        /// Target characteristic.
        characteristic: Uuid,
        /// Bytes written.
        data: Vec<u8>,
        /// Write mode requested.
        mode: WriteMode,
        /// Whether the link was up when the write was issued.
        link_up: bool,
    },
    /// End of a `write`.
    WriteDone {
        /// Whether the write succeeded.
        ok: bool,
    },
    /// `read`.
    Read(Uuid),
    /// `subscribe`.
    Subscribe(Uuid),
}

/// A call log entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    /// Tokio clock reading when the call was made.
    pub at: Instant,
    /// The operation.
    pub call: AdapterCall,
}

#[derive(Debug, Default)]
struct Faults {
    unavailable: bool,
    scan_failures: u32,
    connect_failures: u32,
    write_failures: u32,
    subscribe_fails: bool,
    read_fails: bool,
}

#[derive(Debug, Default)]
struct SimState {
    peripherals: Vec<SimulatedPeripheral>,
    discovering: bool,
    seen: Vec<MacAddress>,
    known: HashSet<MacAddress>,
    links: HashMap<MacAddress, watch::Sender<bool>>,
    faults: Faults,
    write_latency: Duration,
    calls: Vec<RecordedCall>,
}

impl SimState {
    fn record(&mut self, call: AdapterCall) {
        self.calls.push(RecordedCall {
            at: Instant::now(),
            call,
        });
    }

    fn peripheral(&self, address: &MacAddress) -> Option<&SimulatedPeripheral> {
        self.peripherals.iter().find(|p| p.address == *address)
    }

    fn link_up(&self, address: &MacAddress) -> bool {
        self.links.get(address).is_some_and(|tx| *tx.borrow())
    }

    fn observe_advertisements(&mut self) {
        let in_range: Vec<MacAddress> = self
            .peripherals
            .iter()
            .filter(|p| p.in_range)
            .map(|p| p.address)
            .collect();
        for address in in_range {
            if !self.seen.contains(&address) {
                self.seen.push(address);
            }
            self.known.insert(address);
        }
    }
}

/// Adapter backed by scripted, in-memory peripherals.
#[derive(Debug, Default)]
pub struct SimulatedAdapter {
    state: Mutex<SimState>,
}

impl SimulatedAdapter {
    /// Creates an adapter with no peripherals.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a peripheral.
    pub fn add_peripheral(&self, peripheral: SimulatedPeripheral) {
        let mut state = self.state.lock();
        state.peripherals.retain(|p| p.address != peripheral.address);
        state.peripherals.push(peripheral);
        if state.discovering {
            state.observe_advertisements();
        }
    }

    /// Moves a peripheral in or out of range. Going out of range drops its
    /// link.
    pub fn set_in_range(&self, address: &MacAddress, in_range: bool) {
        let mut state = self.state.lock();
        if let Some(p) = state.peripherals.iter_mut().find(|p| p.address == *address) {
            p.in_range = in_range;
        }
        if in_range && state.discovering {
            state.observe_advertisements();
        }
        if !in_range && let Some(tx) = state.links.get(address) {
            tx.send_replace(false);
        }
    }

    /// Drops the link to a peripheral, firing its disconnect observer.
    pub fn drop_link(&self, address: &MacAddress) {
        if let Some(tx) = self.state.lock().links.get(address) {
            tx.send_replace(false);
        }
    }

    /// Returns true if the link to `address` is up.
    #[must_use]
    pub fn is_linked(&self, address: &MacAddress) -> bool {
        self.state.lock().link_up(address)
    }

    /// Returns the number of tasks currently waiting for the link to
    /// `address` to drop.
    #[must_use]
    pub fn disconnect_observers(&self, address: &MacAddress) -> usize {
        self.state
            .lock()
            .links
            .get(address)
            .map_or(0, watch::Sender::receiver_count)
    }

    /// Makes `ready` fail.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state.lock().faults.unavailable = unavailable;
    }

    /// Makes the next `count` calls to `start_discovery` fail.
    pub fn fail_next_scans(&self, count: u32) {
        self.state.lock().faults.scan_failures = count;
    }

    /// Makes the next `count` calls to `connect` fail.
    pub fn fail_next_connects(&self, count: u32) {
        self.state.lock().faults.connect_failures = count;
    }

    /// Makes the next `count` writes fail.
    pub fn fail_next_writes(&self, count: u32) {
        self.state.lock().faults.write_failures = count;
    }

    /// Makes `subscribe` fail.
    pub fn fail_subscribe(&self, fail: bool) {
        self.state.lock().faults.subscribe_fails = fail;
    }

    /// Makes `read` fail.
    pub fn fail_reads(&self, fail: bool) {
        self.state.lock().faults.read_fails = fail;
    }

    /// Sets how long each write takes.
    pub fn set_write_latency(&self, latency: Duration) {
        self.state.lock().write_latency = latency;
    }

    /// Returns the call log.
    #[must_use]
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state.lock().calls.clone()
    }

    /// Clears the call log.
    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    /// Returns the payload of every write attempt, in order.
    #[must_use]
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.state
            .lock()
            .calls
            .iter()
            .filter_map(|c| match &c.call {
                AdapterCall::Write { data, .. } => Some(data.clone()),
                _ => None,
            })
            .collect()
    }

    /// Returns the number of recorded calls matching `predicate`.
    #[must_use]
    pub fn count(&self, predicate: impl Fn(&AdapterCall) -> bool) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|c| predicate(&c.call))
            .count()
    }

    fn ensure_link(&self, address: &MacAddress) -> Result<(), AdapterError> {
        if self.state.lock().link_up(address) {
            Ok(())
        } else {
            Err(AdapterError::NotConnected)
        }
    }
}

#[async_trait::async_trait]
impl BleAdapter for SimulatedAdapter {
    type Device = SimDevice;
    type Service = SimService;
    type Characteristic = SimCharacteristic;

    async fn ready(&self) -> Result<(), AdapterError> {
        if self.state.lock().faults.unavailable {
            return Err(AdapterError::Unavailable("simulated radio is off".into()));
        }
        Ok(())
    }

    async fn start_discovery(&self) -> Result<(), AdapterError> {
        let mut state = self.state.lock();
        state.record(AdapterCall::StartDiscovery);

        if state.faults.scan_failures > 0 {
            state.faults.scan_failures -= 1;
            return Err(AdapterError::Discovery("simulated scan failure".into()));
        }

        state.discovering = true;
        state.seen.clear();
        state.observe_advertisements();
        Ok(())
    }

    async fn stop_discovery(&self) -> Result<(), AdapterError> {
        let mut state = self.state.lock();
        state.record(AdapterCall::StopDiscovery);
        state.discovering = false;
        Ok(())
    }

    async fn discovered_addresses(&self) -> Result<Vec<MacAddress>, AdapterError> {
        Ok(self.state.lock().seen.clone())
    }

    async fn resolve_device(&self, address: &MacAddress) -> Result<SimDevice, AdapterError> {
        let state = self.state.lock();
        if state.known.contains(address) && state.peripheral(address).is_some() {
            Ok(SimDevice { address: *address })
        } else {
            Err(AdapterError::UnknownDevice(address.to_string()))
        }
    }

    async fn connect(&self, device: &SimDevice) -> Result<(), AdapterError> {
        let mut state = self.state.lock();
        state.record(AdapterCall::Connect(device.address));

        if state.faults.connect_failures > 0 {
            state.faults.connect_failures -= 1;
            return Err(AdapterError::ConnectFailed("simulated connect failure".into()));
        }

        let in_range = state.peripheral(&device.address).is_some_and(|p| p.in_range);
        if !in_range {
            return Err(AdapterError::ConnectFailed(format!(
                "{} is out of range",
                device.address
            )));
        }

        state
            .links
            .entry(device.address)
            .or_insert_with(|| watch::channel(false).0)
            .send_replace(true);
        Ok(())
    }

    async fn disconnect(&self, device: &SimDevice) -> Result<(), AdapterError> {
        let mut state = self.state.lock();
        state.record(AdapterCall::Disconnect(device.address));
        if let Some(tx) = state.links.get(&device.address) {
            tx.send_replace(false);
        }
        Ok(())
    }

    async fn disconnected(&self, device: &SimDevice) -> Result<(), AdapterError> {
        let rx = self
            .state
            .lock()
            .links
            .get(&device.address)
            .map(watch::Sender::subscribe);

        if let Some(mut rx) = rx {
            // A dropped sender also counts as a lost link
            let _ = rx.wait_for(|up| !*up).await;
        }
        Ok(())
    }

    async fn service(&self, device: &SimDevice, uuid: Uuid) -> Result<SimService, AdapterError> {
        self.state.lock().record(AdapterCall::Service(uuid));
        self.ensure_link(&device.address)?;

        let state = self.state.lock();
        state
            .peripheral(&device.address)
            .and_then(|p| p.services.iter().find(|(s, _)| *s == uuid))
            .map(|_| SimService {
                address: device.address,
                uuid,
            })
            .ok_or(AdapterError::ServiceNotFound(uuid))
    }

    async fn characteristic(
        &self,
        service: &SimService,
        uuid: Uuid,
    ) -> Result<SimCharacteristic, AdapterError> {
        self.state.lock().record(AdapterCall::Characteristic(uuid));
        self.ensure_link(&service.address)?;

        let state = self.state.lock();
        state
            .peripheral(&service.address)
            .and_then(|p| p.services.iter().find(|(s, _)| *s == service.uuid))
            .filter(|(_, chars)| chars.contains(&uuid))
            .map(|_| SimCharacteristic {
                address: service.address,
                uuid,
            })
            .ok_or(AdapterError::CharacteristicNotFound(uuid))
    }

    async fn write(
        &self,
        characteristic: &SimCharacteristic,
        data: &[u8],
        mode: WriteMode,
    ) -> Result<(), AdapterError> {
        let latency = {
            let mut state = self.state.lock();
            let link_up = state.link_up(&characteristic.address);
            state.record(AdapterCall::Write {
                characteristic: characteristic.uuid,
                data: data.to_vec(),
                mode,
                link_up,
            });
            state.write_latency
        };

        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.state.lock();
        let result = if !state.link_up(&characteristic.address) {
            Err(AdapterError::NotConnected)
        } else if state.faults.write_failures > 0 {
            state.faults.write_failures -= 1;
            Err(AdapterError::Gatt("simulated write failure".into()))
        } else {
            Ok(())
        };
        state.record(AdapterCall::WriteDone {
            ok: result.is_ok(),
        });
        result
    }

    async fn read(&self, characteristic: &SimCharacteristic) -> Result<Vec<u8>, AdapterError> {
        let mut state = self.state.lock();
        state.record(AdapterCall::Read(characteristic.uuid));

        if !state.link_up(&characteristic.address) {
            return Err(AdapterError::NotConnected);
        }
        if state.faults.read_fails {
            return Err(AdapterError::Gatt("simulated read failure".into()));
        }
        Ok(vec![0x01])
    }

    async fn subscribe(&self, characteristic: &SimCharacteristic) -> Result<(), AdapterError> {
        let mut state = self.state.lock();
        state.record(AdapterCall::Subscribe(characteristic.uuid));

        if state.faults.subscribe_fails {
            return Err(AdapterError::Gatt("simulated subscribe failure".into()));
        }
        if !state.link_up(&characteristic.address) {
            return Err(AdapterError::NotConnected);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SERVICE: Uuid = Uuid::from_u128(0x10);
    const WRITE: Uuid = Uuid::from_u128(0x11);

    fn address() -> MacAddress {
        "aa:bb:cc:dd:ee:ff".parse().unwrap()
    }

    fn adapter() -> SimulatedAdapter {
        let adapter = SimulatedAdapter::new();
        adapter.add_peripheral(SimulatedPeripheral::new(address()).with_service(SERVICE, [WRITE]));
        adapter
    }

    #[tokio::test]
    async fn resolve_requires_discovery() {
        let adapter = adapter();

        assert!(adapter.resolve_device(&address()).await.is_err());

        adapter.start_discovery().await.unwrap();
        adapter.stop_discovery().await.unwrap();

        assert_eq!(
            adapter.resolve_device(&address()).await.unwrap(),
            SimDevice { address: address() }
        );
    }

    #[tokio::test]
    async fn out_of_range_is_not_seen() {
        let adapter = SimulatedAdapter::new();
        adapter.add_peripheral(SimulatedPeripheral::new(address()).out_of_range());

        adapter.start_discovery().await.unwrap();
        assert!(adapter.discovered_addresses().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn each_window_reports_only_its_own_sightings() {
        let adapter = adapter();
        adapter.start_discovery().await.unwrap();
        adapter.stop_discovery().await.unwrap();
        assert_eq!(adapter.discovered_addresses().await.unwrap(), vec![address()]);

        adapter.set_in_range(&address(), false);
        adapter.start_discovery().await.unwrap();
        adapter.stop_discovery().await.unwrap();

        assert!(adapter.discovered_addresses().await.unwrap().is_empty());
        assert!(adapter.resolve_device(&address()).await.is_ok());
    }

    #[tokio::test]
    async fn device_entering_range_mid_window_is_seen() {
        let adapter = adapter();
        adapter.set_in_range(&address(), false);
        adapter.start_discovery().await.unwrap();

        adapter.set_in_range(&address(), true);
        adapter.stop_discovery().await.unwrap();

        assert_eq!(adapter.discovered_addresses().await.unwrap(), vec![address()]);
    }

    #[tokio::test]
    async fn disconnect_releases_observers() {
        let adapter = std::sync::Arc::new(adapter());
        adapter.start_discovery().await.unwrap();
        let device = adapter.resolve_device(&address()).await.unwrap();
        adapter.connect(&device).await.unwrap();

        let watcher = {
            let adapter = std::sync::Arc::clone(&adapter);
            let device = device.clone();
            tokio::spawn(async move { adapter.disconnected(&device).await })
        };
        tokio::task::yield_now().await;
        assert_eq!(adapter.disconnect_observers(&address()), 1);

        adapter.disconnect(&device).await.unwrap();
        watcher.await.unwrap().unwrap();

        assert!(!adapter.is_linked(&address()));
        assert_eq!(adapter.disconnect_observers(&address()), 0);
        assert_eq!(adapter.count(|c| *c == AdapterCall::Disconnect(address())), 1);
    }

    #[tokio::test]
    async fn gatt_lookup_after_connect() {
        let adapter = adapter();
        adapter.start_discovery().await.unwrap();
        let device = adapter.resolve_device(&address()).await.unwrap();

        assert!(matches!(
            adapter.service(&device, SERVICE).await,
            Err(AdapterError::NotConnected)
        ));

        adapter.connect(&device).await.unwrap();
        let service = adapter.service(&device, SERVICE).await.unwrap();
        let write = adapter.characteristic(&service, WRITE).await.unwrap();

        assert_eq!(write.uuid, WRITE);
        assert!(matches!(
            adapter.characteristic(&service, Uuid::from_u128(0x99)).await,
            Err(AdapterError::CharacteristicNotFound(_))
        ));
        assert!(matches!(
            adapter.service(&device, Uuid::from_u128(0x98)).await,
            Err(AdapterError::ServiceNotFound(_))
        ));
    }

    #[tokio::test]
    async fn drop_link_fires_disconnect() {
        let adapter = std::sync::Arc::new(adapter());
        adapter.start_discovery().await.unwrap();
        let device = adapter.resolve_device(&address()).await.unwrap();
        adapter.connect(&device).await.unwrap();

        let watcher = {
            let adapter = std::sync::Arc::clone(&adapter);
            let device = device.clone();
            tokio::spawn(async move { adapter.disconnected(&device).await })
        };

        tokio::task::yield_now().await;
        assert!(!watcher.is_finished());

        adapter.drop_link(&address());
        watcher.await.unwrap().unwrap();
        assert!(!adapter.is_linked(&address()));
    }

    #[tokio::test]
    async fn injected_write_failures_are_consumed() {
        let adapter = adapter();
        adapter.start_discovery().await.unwrap();
        let device = adapter.resolve_device(&address()).await.unwrap();
        adapter.connect(&device).await.unwrap();
        let service = adapter.service(&device, SERVICE).await.unwrap();
        let write = adapter.characteristic(&service, WRITE).await.unwrap();

        adapter.fail_next_writes(1);
        assert!(adapter.write(&write, &[1], WriteMode::Request).await.is_err());
        assert!(adapter.write(&write, &[2], WriteMode::Request).await.is_ok());

        assert_eq!(adapter.writes(), vec![vec![1], vec![2]]);
        assert_eq!(
            adapter.count(|c| matches!(c, AdapterCall::WriteDone { ok: true })),
            1
        );
    }

    #[tokio::test]
    async fn write_on_dropped_link_is_recorded_as_stale() {
        let adapter = adapter();
        adapter.start_discovery().await.unwrap();
        let device = adapter.resolve_device(&address()).await.unwrap();
        adapter.connect(&device).await.unwrap();
        let service = adapter.service(&device, SERVICE).await.unwrap();
        let write = adapter.characteristic(&service, WRITE).await.unwrap();

        adapter.drop_link(&address());
        let result = adapter.write(&write, &[1], WriteMode::Command).await;

        assert!(matches!(result, Err(AdapterError::NotConnected)));
        assert_eq!(
            adapter.count(|c| matches!(c, AdapterCall::Write { link_up: false, .. })),
            1
        );
    }
}
