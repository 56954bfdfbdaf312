// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Device registry: one controller per configured device.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::adapter::BleAdapter;
use crate::config::{BridgeConfig, validate_entries};
use crate::error::ConfigError;
use crate::event::{BridgeEvent, DeviceId, EventBus};
use crate::host::SwitchAccessory;

use super::controller::DeviceController;
use super::device_config::{ControllerTiming, DeviceConfig};

/// Owns the controllers of a bridge.
///
/// Controllers are kept in configuration order. They share one adapter, one
/// event bus and one shutdown token; nothing else is shared between them.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use pushbot_bridge::adapter::SimulatedAdapter;
/// use pushbot_bridge::config::BridgeConfig;
/// use pushbot_bridge::manager::DeviceRegistry;
///
/// let config = BridgeConfig::from_json_str(r#"{
///     "devices": [
///         {
///             "name": "Gate",
///             "mac_address": "AA:BB:CC:DD:EE:FF",
///             "service_uuid": "cba20d00-224d-11e6-9fb8-0002a5d5c51b",
///             "write_uuid": "cba20002-224d-11e6-9fb8-0002a5d5c51b",
///             "push_packet_hex": "570100"
///         },
///         {
///             "mac_address": "not-an-address",
///             "service_uuid": "cba20d00-224d-11e6-9fb8-0002a5d5c51b",
///             "write_uuid": "cba20002-224d-11e6-9fb8-0002a5d5c51b",
///             "push_packet_hex": "570100"
///         }
///     ]
/// }"#).unwrap();
///
/// let registry = DeviceRegistry::from_config(&config, Arc::new(SimulatedAdapter::new()));
///
/// assert_eq!(registry.len(), 1);
/// assert_eq!(registry.rejected().len(), 1);
/// assert!(registry.find_by_address("aabbccddeeff").is_some());
/// ```
pub struct DeviceRegistry<A: BleAdapter> {
    controllers: Vec<DeviceController<A>>,
    rejected: Vec<ConfigError>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    events: EventBus,
    shutdown: CancellationToken,
}

impl<A: BleAdapter> DeviceRegistry<A> {
    /// Creates one controller per configuration, without starting them.
    #[must_use]
    pub fn new(configs: Vec<DeviceConfig>, timing: ControllerTiming, adapter: Arc<A>) -> Self {
        let events = EventBus::new();
        let shutdown = CancellationToken::new();

        let controllers = configs
            .into_iter()
            .map(|config| {
                let controller = DeviceController::new(
                    config,
                    timing.clone(),
                    Arc::clone(&adapter),
                    events.clone(),
                    shutdown.child_token(),
                );
                tracing::info!(
                    device = %controller.config().name,
                    address = %controller.config().address,
                    device_id = %controller.id(),
                    "Registered device"
                );
                controller
            })
            .collect();

        Self {
            controllers,
            rejected: Vec::new(),
            tasks: Mutex::new(Vec::new()),
            events,
            shutdown,
        }
    }

    /// Validates every entry of `config` and registers the valid ones.
    ///
    /// Invalid entries are logged and kept in [`rejected`](Self::rejected).
    #[must_use]
    pub fn from_config(config: &BridgeConfig, adapter: Arc<A>) -> Self {
        let (valid, rejected) = validate_entries(&config.devices);

        for error in &rejected {
            tracing::error!(error = %error, "Skipping invalid device entry");
        }

        let mut registry = Self::new(valid, config.timing.clone(), adapter);
        registry.rejected = rejected;
        registry
    }

    /// Creates the controllers and starts their discovery loops.
    #[must_use]
    pub fn start(configs: Vec<DeviceConfig>, timing: ControllerTiming, adapter: Arc<A>) -> Self {
        let registry = Self::new(configs, timing, adapter);
        registry.spawn_discovery();
        registry
    }

    /// Starts the discovery loop of every controller not started yet.
    ///
    /// Publishes one [`BridgeEvent::DeviceAdded`] per controller started.
    pub fn spawn_discovery(&self) {
        let mut tasks = self.tasks.lock();
        if self.shutdown.is_cancelled() || !tasks.is_empty() {
            return;
        }

        for controller in &self.controllers {
            self.events.publish(BridgeEvent::device_added(
                controller.id(),
                controller.config().name.clone(),
            ));
            tasks.push(controller.spawn_discovery());
        }
    }

    /// Returns the controllers in configuration order.
    #[must_use]
    pub fn controllers(&self) -> &[DeviceController<A>] {
        &self.controllers
    }

    /// Returns the controller with the given ID.
    #[must_use]
    pub fn get(&self, id: DeviceId) -> Option<&DeviceController<A>> {
        self.controllers.iter().find(|c| c.id() == id)
    }

    /// Returns the first controller whose address matches `address`, in any
    /// notation.
    #[must_use]
    pub fn find_by_address(&self, address: &str) -> Option<&DeviceController<A>> {
        self.controllers
            .iter()
            .find(|c| c.config().address.matches(address))
    }

    /// Returns one host switch per controller, in configuration order.
    #[must_use]
    pub fn accessories(&self) -> Vec<SwitchAccessory<A>> {
        self.controllers
            .iter()
            .map(DeviceController::accessory)
            .collect()
    }

    /// Returns the entries rejected by [`from_config`](Self::from_config).
    #[must_use]
    pub fn rejected(&self) -> &[ConfigError] {
        &self.rejected
    }

    /// Returns the number of controllers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.controllers.len()
    }

    /// Returns true if no device is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.controllers.is_empty()
    }

    /// Subscribes to the events of every controller.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<BridgeEvent> {
        self.events.subscribe()
    }

    /// Returns the shared event bus.
    #[must_use]
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Stops every controller and waits for the discovery loops to exit.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();

        let tasks = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Discovery task ended abnormally");
            }
        }

        tracing::info!(devices = self.controllers.len(), "Registry shut down");
    }

    /// Returns true once [`shutdown`](Self::shutdown) has been called.
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

impl<A: BleAdapter> std::fmt::Debug for DeviceRegistry<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceRegistry")
            .field("controllers", &self.controllers)
            .field("rejected", &self.rejected.len())
            .field("subscribers", &self.events.subscriber_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use uuid::Uuid;

    use super::*;
    use crate::adapter::SimulatedAdapter;
    use crate::types::PushPacket;

    fn config(address: &str, name: &str) -> DeviceConfig {
        DeviceConfig::new(
            address.parse().unwrap(),
            Uuid::from_u128(1),
            Uuid::from_u128(2),
            PushPacket::from_hex("01").unwrap(),
        )
        .with_name(name)
    }

    #[test]
    fn keeps_configuration_order() {
        let registry = DeviceRegistry::new(
            vec![
                config("11:11:11:11:11:11", "First"),
                config("22:22:22:22:22:22", "Second"),
                config("33:33:33:33:33:33", "Third"),
            ],
            ControllerTiming::default(),
            Arc::new(SimulatedAdapter::new()),
        );

        let names: Vec<&str> = registry
            .controllers()
            .iter()
            .map(|c| c.config().name.as_str())
            .collect();
        assert_eq!(names, ["First", "Second", "Third"]);
    }

    #[test]
    fn lookup_by_id_and_address() {
        let registry = DeviceRegistry::new(
            vec![config("aa:bb:cc:dd:ee:ff", "Gate")],
            ControllerTiming::default(),
            Arc::new(SimulatedAdapter::new()),
        );
        let id = registry.controllers()[0].id();

        assert_eq!(registry.get(id).unwrap().config().name, "Gate");
        assert!(registry.get(DeviceId::new()).is_none());
        assert!(registry.find_by_address("AA-BB-CC-DD-EE-FF").is_some());
        assert!(registry.find_by_address("00:00:00:00:00:00").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn spawn_publishes_device_added_once() {
        let registry = DeviceRegistry::new(
            vec![config("aa:bb:cc:dd:ee:ff", "Gate")],
            ControllerTiming::default(),
            Arc::new(SimulatedAdapter::new()),
        );
        let mut events = registry.subscribe();

        registry.spawn_discovery();
        registry.spawn_discovery();

        let event = events.recv().await.unwrap();
        assert_eq!(
            event,
            BridgeEvent::device_added(registry.controllers()[0].id(), "Gate")
        );
        assert!(events.try_recv().is_err());

        registry.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_all_controllers() {
        let registry = DeviceRegistry::start(
            vec![
                config("11:11:11:11:11:11", "First"),
                config("22:22:22:22:22:22", "Second"),
            ],
            ControllerTiming::default(),
            Arc::new(SimulatedAdapter::new()),
        );

        tokio::time::sleep(Duration::from_secs(10)).await;
        registry.shutdown().await;

        assert!(registry.is_shut_down());
        assert!(registry.controllers().iter().all(DeviceController::is_stopped));
    }
}
