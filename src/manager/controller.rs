// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Device controller: connection state machine and push execution.
//!
//! A [`DeviceController`] owns the lifecycle of one peripheral. It runs as a
//! set of independent tokio tasks sharing one link state:
//!
//! - the discovery loop, which scans for the configured address while the
//!   link is down and connects when it shows up
//! - a disconnect observer per link, which clears the link state when the
//!   adapter reports the link lost
//! - the heartbeat, which periodically reads the notify characteristic to
//!   keep the link alive
//! - activations, each followed by a detached auto-off timer
//!
//! The state lock is a `parking_lot::Mutex` and is never held across an
//! `.await`.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::adapter::BleAdapter;
use crate::error::{AdapterError, Error, Result};
use crate::event::{BridgeEvent, DeviceId, EventBus};
use crate::host::SwitchAccessory;
use crate::types::MacAddress;

use super::connection::{ConnectionState, ControllerStatus, Heartbeat, LinkPhase};
use super::device_config::{ControllerTiming, DeviceConfig};

/// Result of an activation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// The request was `false`; nothing happened.
    Ignored,
    /// Another activation was already in flight; nothing happened.
    Busy,
    /// No link could be established; no write was attempted.
    NotConnected,
    /// The packet was written.
    Delivered {
        /// Attempts used, including the successful one.
        attempts: u32,
    },
    /// Every write attempt failed.
    Failed {
        /// Attempts used.
        attempts: u32,
    },
}

impl PushOutcome {
    /// Returns true if the packet reached the peripheral.
    #[must_use]
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered { .. })
    }

    /// Returns the number of write attempts made.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Delivered { attempts } | Self::Failed { attempts } => *attempts,
            Self::Ignored | Self::Busy | Self::NotConnected => 0,
        }
    }
}

struct Inner<A: BleAdapter> {
    id: DeviceId,
    config: DeviceConfig,
    timing: ControllerTiming,
    adapter: Arc<A>,
    state: Mutex<ConnectionState<A>>,
    switch_tx: watch::Sender<bool>,
    connect_lock: tokio::sync::Mutex<()>,
    push_lock: tokio::sync::Mutex<()>,
    events: EventBus,
    shutdown: CancellationToken,
}

/// Controller for one configured peripheral.
///
/// Cloning is cheap; all clones drive the same device.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use pushbot_bridge::adapter::SimulatedAdapter;
/// use pushbot_bridge::event::EventBus;
/// use pushbot_bridge::manager::{ControllerTiming, DeviceConfig, DeviceController, PushOutcome};
/// use pushbot_bridge::types::PushPacket;
/// use tokio_util::sync::CancellationToken;
/// use uuid::Uuid;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let config = DeviceConfig::new(
///     "aa:bb:cc:dd:ee:ff".parse().unwrap(),
///     Uuid::from_u128(1),
///     Uuid::from_u128(2),
///     PushPacket::from_hex("570100").unwrap(),
/// );
///
/// let controller = DeviceController::new(
///     config,
///     ControllerTiming::default(),
///     Arc::new(SimulatedAdapter::new()),
///     EventBus::new(),
///     CancellationToken::new(),
/// );
///
/// assert_eq!(controller.activate(false).await, PushOutcome::Ignored);
/// assert!(!controller.switch_on());
/// # }
/// ```
pub struct DeviceController<A: BleAdapter> {
    inner: Arc<Inner<A>>,
}

impl<A: BleAdapter> Clone for DeviceController<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A: BleAdapter> DeviceController<A> {
    /// Creates a controller. No task is started until
    /// [`spawn_discovery`](Self::spawn_discovery) is called.
    ///
    /// Every task of the controller stops when `shutdown` is cancelled.
    #[must_use]
    pub fn new(
        config: DeviceConfig,
        timing: ControllerTiming,
        adapter: Arc<A>,
        events: EventBus,
        shutdown: CancellationToken,
    ) -> Self {
        let (switch_tx, _) = watch::channel(false);

        Self {
            inner: Arc::new(Inner {
                id: DeviceId::new(),
                config,
                timing,
                adapter,
                state: Mutex::new(ConnectionState::new()),
                switch_tx,
                connect_lock: tokio::sync::Mutex::new(()),
                push_lock: tokio::sync::Mutex::new(()),
                events,
                shutdown,
            }),
        }
    }

    /// Returns the controller ID.
    #[must_use]
    pub fn id(&self) -> DeviceId {
        self.inner.id
    }

    /// Returns the device configuration.
    #[must_use]
    pub fn config(&self) -> &DeviceConfig {
        &self.inner.config
    }

    /// Returns the timing in use.
    #[must_use]
    pub fn timing(&self) -> &ControllerTiming {
        &self.inner.timing
    }

    /// Returns the current phase of the state machine.
    #[must_use]
    pub fn phase(&self) -> LinkPhase {
        self.inner.state.lock().phase()
    }

    /// Returns true while the transport link is up.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.phase().is_connected()
    }

    /// Returns the value of the exposed switch.
    #[must_use]
    pub fn switch_on(&self) -> bool {
        *self.inner.switch_tx.borrow()
    }

    /// Returns a receiver that observes every switch change.
    #[must_use]
    pub fn watch_switch(&self) -> watch::Receiver<bool> {
        self.inner.switch_tx.subscribe()
    }

    /// Returns a diagnostic snapshot.
    #[must_use]
    pub fn status(&self) -> ControllerStatus {
        let switch_on = self.switch_on();
        self.inner.state.lock().status(switch_on)
    }

    /// Returns the host-facing switch for this controller.
    #[must_use]
    pub fn accessory(&self) -> SwitchAccessory<A> {
        SwitchAccessory::new(self.clone())
    }

    /// Stops every task of this controller.
    pub fn stop(&self) {
        self.inner.shutdown.cancel();
    }

    /// Returns true once the controller has been stopped.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    /// Spawns the discovery loop.
    pub fn spawn_discovery(&self) -> JoinHandle<()> {
        let controller = self.clone();
        tokio::spawn(async move { controller.run_discovery().await })
    }

    /// Runs the discovery loop until the controller is stopped.
    ///
    /// If the adapter never becomes ready the loop logs and returns at once.
    pub async fn run_discovery(&self) {
        let inner = &self.inner;

        if let Err(e) = inner.adapter.ready().await {
            tracing::error!(
                device = %inner.config.name,
                error = %e,
                "Bluetooth adapter unavailable, discovery disabled"
            );
            return;
        }

        tracing::debug!(device = %inner.config.name, "Discovery loop started");

        loop {
            if !self.is_connected() {
                tokio::select! {
                    () = inner.shutdown.cancelled() => break,
                    result = self.scan_and_connect() => match result {
                        Ok(true) => {}
                        Ok(false) => tracing::debug!(
                            device = %inner.config.name,
                            address = %inner.config.address,
                            "Device not seen in this scan"
                        ),
                        Err(e) => tracing::warn!(
                            device = %inner.config.name,
                            error = %e,
                            "Scan cycle failed"
                        ),
                    },
                }
            }

            tokio::select! {
                () = inner.shutdown.cancelled() => break,
                () = sleep(inner.timing.reconnect_delay) => {}
            }
        }

        tracing::debug!(device = %inner.config.name, "Discovery loop stopped");
    }

    /// Runs one scan window and connects if the device was seen.
    ///
    /// Returns `Ok(false)` if the configured address was not among the
    /// discovered ones.
    ///
    /// # Errors
    ///
    /// Returns the adapter error if discovery, resolution or the connect
    /// sequence fails.
    pub async fn scan_and_connect(&self) -> Result<bool> {
        let inner = &self.inner;

        inner
            .state
            .lock()
            .transition(LinkPhase::Idle, LinkPhase::Scanning);

        let scanned = self.scan().await;

        inner
            .state
            .lock()
            .transition(LinkPhase::Scanning, LinkPhase::Idle);

        let seen = scanned?;
        let Some(address) = seen.iter().find(|a| **a == inner.config.address) else {
            return Ok(false);
        };

        tracing::info!(
            device = %inner.config.name,
            address = %address,
            "Device discovered"
        );

        let device = inner.adapter.resolve_device(address).await?;
        self.connect_device(device).await?;
        Ok(true)
    }

    async fn scan(&self) -> std::result::Result<Vec<MacAddress>, AdapterError> {
        let adapter = &self.inner.adapter;

        if let Err(e) = adapter.stop_discovery().await {
            tracing::trace!(error = %e, "Stopping previous discovery failed");
        }

        adapter.start_discovery().await?;
        sleep(self.inner.timing.scan_window).await;
        adapter.stop_discovery().await?;
        adapter.discovered_addresses().await
    }

    /// Connects on demand, reusing the held device handle or asking the
    /// adapter to resolve the configured address.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ControllerStopped`] once the controller has been
    /// stopped, or an error if the device cannot be resolved or the connect
    /// sequence fails.
    pub async fn connect(&self) -> Result<()> {
        if self.is_stopped() {
            return Err(Error::ControllerStopped);
        }

        let held = self.inner.state.lock().device();
        let device = match held {
            Some(device) => device,
            None => self
                .inner
                .adapter
                .resolve_device(&self.inner.config.address)
                .await
                .map_err(|e| match e {
                    AdapterError::UnknownDevice(_) => {
                        Error::DeviceNotFound(self.inner.config.address.to_string())
                    }
                    other => other.into(),
                })?,
        };

        self.connect_device(device).await
    }

    /// Runs the connect sequence against a resolved device handle.
    ///
    /// Concurrent callers are serialized; a caller that finds the link
    /// already up returns `Ok` without reconnecting.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport connect fails or the write
    /// characteristic cannot be resolved. The state is rolled back to
    /// `Idle` in both cases.
    pub async fn connect_device(&self, device: A::Device) -> Result<()> {
        let inner = &self.inner;
        let _guard = inner.connect_lock.lock().await;

        if !inner.state.lock().begin_connect() {
            tracing::debug!(device = %inner.config.name, "Already connected");
            return Ok(());
        }

        let adapter = &inner.adapter;
        let attempted = inner
            .timing
            .connect_retry
            .run(|attempt| {
                let device = device.clone();
                async move {
                    tracing::debug!(device = %inner.config.name, attempt, "Connecting");
                    adapter.connect(&device).await
                }
            })
            .await;

        if let Err(e) = attempted.result {
            inner
                .state
                .lock()
                .transition(LinkPhase::Connecting, LinkPhase::Idle);
            return Err(e.into());
        }

        let link = inner.shutdown.child_token();
        let generation = inner.state.lock().begin_link(device.clone(), link.clone());
        self.watch_disconnect(device.clone(), generation, link);

        tracing::info!(
            device = %inner.config.name,
            address = %inner.config.address,
            "Connected"
        );
        inner.events.publish(BridgeEvent::connected(inner.id));

        sleep(inner.timing.gatt_settle_delay).await;

        let service = match self.resolve_write(&device, generation).await {
            Ok(service) => service,
            Err(e) => {
                // Only GATT failed; the transport link is still up
                if self.roll_back(generation, &e)
                    && let Err(disconnect) = inner.adapter.disconnect(&device).await
                {
                    tracing::debug!(
                        device = %inner.config.name,
                        error = %disconnect,
                        "Disconnect after failed GATT resolution failed"
                    );
                }
                return Err(e);
            }
        };

        tracing::debug!(device = %inner.config.name, "Write characteristic ready");

        self.setup_notify(&service, generation).await;
        Ok(())
    }

    async fn resolve_write(&self, device: &A::Device, generation: u64) -> Result<A::Service> {
        let inner = &self.inner;
        let service = inner
            .adapter
            .service(device, inner.config.service_uuid)
            .await?;
        let write = inner
            .adapter
            .characteristic(&service, inner.config.write_uuid)
            .await?;

        if inner.state.lock().mark_ready(generation, write) {
            Ok(service)
        } else {
            Err(Error::NotConnected)
        }
    }

    /// Clears the link of `generation`. Returns false if it was already gone.
    fn roll_back(&self, generation: u64, error: &Error) -> bool {
        let inner = &self.inner;
        let heartbeat = {
            let mut state = inner.state.lock();
            if state.generation() != generation {
                return false;
            }
            state.clear_link()
        };
        if let Some(heartbeat) = heartbeat {
            heartbeat.stop();
        }

        inner
            .events
            .publish(BridgeEvent::disconnected_with_error(inner.id, error.to_string()));
        true
    }

    async fn setup_notify(&self, service: &A::Service, generation: u64) {
        let inner = &self.inner;
        let Some(uuid) = inner.config.notify_uuid else {
            return;
        };

        let subscribed = async {
            let notify = inner.adapter.characteristic(service, uuid).await?;
            inner.adapter.subscribe(&notify).await?;
            Ok::<_, AdapterError>(notify)
        }
        .await;

        match subscribed {
            Ok(notify) => {
                if inner.state.lock().set_notify(generation, notify) {
                    self.start_heartbeat();
                }
            }
            Err(e) => tracing::warn!(
                device = %inner.config.name,
                error = %e,
                "Notify setup failed, continuing without heartbeat"
            ),
        }
    }

    fn watch_disconnect(&self, device: A::Device, generation: u64, link: CancellationToken) {
        let controller = self.clone();

        tokio::spawn(async move {
            let inner = &controller.inner;
            tokio::select! {
                () = link.cancelled() => {}
                result = inner.adapter.disconnected(&device) => {
                    controller.handle_disconnect(generation, result.err());
                }
            }
        });
    }

    fn handle_disconnect(&self, generation: u64, error: Option<AdapterError>) {
        let inner = &self.inner;

        let (was_connected, heartbeat) = {
            let mut state = inner.state.lock();
            if state.generation() != generation {
                tracing::debug!(device = %inner.config.name, "Ignoring stale disconnect");
                return;
            }
            let was_connected = state.phase().is_connected();
            (was_connected, state.clear_link())
        };

        if let Some(heartbeat) = heartbeat {
            heartbeat.stop();
        }

        if was_connected {
            tracing::warn!(
                device = %inner.config.name,
                address = %inner.config.address,
                "Disconnected"
            );
            let event = match error {
                Some(e) => BridgeEvent::disconnected_with_error(inner.id, e.to_string()),
                None => BridgeEvent::disconnected(inner.id),
            };
            inner.events.publish(event);
        }
    }

    fn start_heartbeat(&self) {
        let inner = &self.inner;
        let mut state = inner.state.lock();

        let Some(notify) = state.notify_handle() else {
            return;
        };

        let token = inner.shutdown.child_token();
        let task_token = token.clone();
        let adapter = Arc::clone(&inner.adapter);
        let interval = inner.timing.heartbeat_interval;
        let name = inner.config.name.clone();

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = task_token.cancelled() => break,
                    () = sleep(interval) => {}
                }
                tokio::select! {
                    () = task_token.cancelled() => break,
                    result = adapter.read(&notify) => {
                        if let Err(e) = result {
                            tracing::debug!(device = %name, error = %e, "Heartbeat read failed");
                        }
                    }
                }
            }
        });

        if let Some(previous) = state.replace_heartbeat(Heartbeat::new(token, handle)) {
            previous.stop();
        }
    }

    fn stop_heartbeat(&self) {
        let heartbeat = self.inner.state.lock().take_heartbeat();
        if let Some(heartbeat) = heartbeat {
            heartbeat.stop();
        }
    }

    /// Executes an activation request.
    ///
    /// `false` is ignored. `true` connects if needed, writes the push packet
    /// with the write retry policy and sets the switch on success. The
    /// auto-off timer is scheduled whatever the outcome, and no error is
    /// returned to the caller.
    pub async fn activate(&self, on: bool) -> PushOutcome {
        let inner = &self.inner;

        if !on {
            return PushOutcome::Ignored;
        }

        let Ok(_push) = inner.push_lock.try_lock() else {
            tracing::debug!(device = %inner.config.name, "Push already in flight, ignoring");
            return PushOutcome::Busy;
        };

        tracing::info!(device = %inner.config.name, "Activation requested");

        let has_write = inner.state.lock().write_handle().is_some();
        if !has_write && let Err(e) = self.connect().await {
            tracing::error!(
                device = %inner.config.name,
                error = %e,
                "Activation aborted, device not connected"
            );
            self.schedule_auto_off();
            inner
                .events
                .publish(BridgeEvent::push_completed(inner.id, false, 0));
            return PushOutcome::NotConnected;
        }

        self.stop_heartbeat();
        sleep(inner.timing.pre_write_delay).await;

        let packet = &inner.config.push_packet;
        let mode = inner.timing.write_mode;
        let attempted = inner
            .timing
            .write_retry
            .run(|attempt| async move {
                let write = inner
                    .state
                    .lock()
                    .write_handle()
                    .ok_or(AdapterError::NotConnected)?;
                tracing::debug!(
                    device = %inner.config.name,
                    attempt,
                    packet = %packet,
                    "Writing push packet"
                );
                inner.adapter.write(&write, packet.as_bytes(), mode).await
            })
            .await;

        let outcome = match attempted.result {
            Ok(()) => {
                inner.switch_tx.send_replace(true);
                inner
                    .events
                    .publish(BridgeEvent::switch_changed(inner.id, true));
                tracing::info!(
                    device = %inner.config.name,
                    attempts = attempted.attempts,
                    "Push delivered"
                );
                self.start_heartbeat();
                PushOutcome::Delivered {
                    attempts: attempted.attempts,
                }
            }
            Err(e) => {
                tracing::error!(
                    device = %inner.config.name,
                    attempts = attempted.attempts,
                    error = %e,
                    "Push failed"
                );
                PushOutcome::Failed {
                    attempts: attempted.attempts,
                }
            }
        };

        self.schedule_auto_off();
        inner.events.publish(BridgeEvent::push_completed(
            inner.id,
            outcome.is_delivered(),
            outcome.attempts(),
        ));

        outcome
    }

    /// Spawns [`activate`](Self::activate) and returns its handle.
    pub fn trigger(&self, on: bool) -> JoinHandle<PushOutcome> {
        let controller = self.clone();
        tokio::spawn(async move { controller.activate(on).await })
    }

    fn schedule_auto_off(&self) {
        let controller = self.clone();

        tokio::spawn(async move {
            let inner = &controller.inner;
            sleep(inner.timing.auto_off_delay).await;

            inner.switch_tx.send_replace(false);
            tracing::debug!(device = %inner.config.name, "Auto-off");
            inner
                .events
                .publish(BridgeEvent::switch_changed(inner.id, false));
        });
    }
}

impl<A: BleAdapter> fmt::Debug for DeviceController<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceController")
            .field("id", &self.inner.id)
            .field("name", &self.inner.config.name)
            .field("address", &self.inner.config.address)
            .field("state", &*self.inner.state.lock())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use uuid::Uuid;

    use super::*;
    use crate::adapter::{AdapterCall, SimulatedAdapter, SimulatedPeripheral};
    use crate::types::PushPacket;

    const SERVICE: Uuid = Uuid::from_u128(0x10);
    const WRITE: Uuid = Uuid::from_u128(0x11);

    fn address() -> MacAddress {
        "aa:bb:cc:dd:ee:ff".parse().unwrap()
    }

    fn setup() -> (DeviceController<SimulatedAdapter>, Arc<SimulatedAdapter>) {
        let adapter = Arc::new(SimulatedAdapter::new());
        adapter.add_peripheral(SimulatedPeripheral::new(address()).with_service(SERVICE, [WRITE]));

        let config = DeviceConfig::new(
            address(),
            SERVICE,
            WRITE,
            PushPacket::from_hex("570100").unwrap(),
        );
        let controller = DeviceController::new(
            config,
            ControllerTiming::default(),
            Arc::clone(&adapter),
            EventBus::new(),
            CancellationToken::new(),
        );
        (controller, adapter)
    }

    #[test]
    fn outcome_accessors() {
        assert!(PushOutcome::Delivered { attempts: 2 }.is_delivered());
        assert_eq!(PushOutcome::Failed { attempts: 3 }.attempts(), 3);
        assert_eq!(PushOutcome::NotConnected.attempts(), 0);
        assert!(!PushOutcome::Busy.is_delivered());
    }

    #[tokio::test(start_paused = true)]
    async fn false_is_ignored() {
        let (controller, adapter) = setup();

        assert_eq!(controller.activate(false).await, PushOutcome::Ignored);
        assert!(adapter.calls().is_empty());
        assert!(!controller.switch_on());
    }

    #[tokio::test(start_paused = true)]
    async fn scan_connects_and_reaches_ready() {
        let (controller, adapter) = setup();

        assert!(controller.scan_and_connect().await.unwrap());
        assert_eq!(controller.phase(), LinkPhase::Ready);
        assert!(controller.status().has_write_handle);
        assert_eq!(adapter.count(|c| matches!(c, AdapterCall::Connect(_))), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn scan_without_match_returns_false() {
        let (controller, adapter) = setup();
        adapter.set_in_range(&address(), false);

        assert!(!controller.scan_and_connect().await.unwrap());
        assert_eq!(controller.phase(), LinkPhase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn connect_failure_rolls_back() {
        let (controller, adapter) = setup();
        adapter.fail_next_connects(1);

        assert!(controller.scan_and_connect().await.is_err());
        assert_eq!(controller.phase(), LinkPhase::Idle);
        assert!(!controller.status().has_write_handle);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_characteristic_rolls_back() {
        let adapter = Arc::new(SimulatedAdapter::new());
        adapter.add_peripheral(SimulatedPeripheral::new(address()).with_service(SERVICE, Vec::new()));
        let controller = DeviceController::new(
            DeviceConfig::new(address(), SERVICE, WRITE, PushPacket::from_hex("01").unwrap()),
            ControllerTiming::default(),
            Arc::clone(&adapter),
            EventBus::new(),
            CancellationToken::new(),
        );

        let err = controller.scan_and_connect().await.unwrap_err();
        assert!(matches!(
            err,
            Error::Adapter(AdapterError::CharacteristicNotFound(_))
        ));
        assert_eq!(controller.phase(), LinkPhase::Idle);
        assert!(!adapter.is_linked(&address()));
    }

    #[tokio::test(start_paused = true)]
    async fn on_demand_connect_requires_discovery() {
        let (controller, _adapter) = setup();

        assert!(matches!(
            controller.connect().await,
            Err(Error::DeviceNotFound(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn second_connect_reuses_ready_link() {
        let (controller, adapter) = setup();
        controller.scan_and_connect().await.unwrap();

        controller.connect().await.unwrap();
        assert_eq!(adapter.count(|c| matches!(c, AdapterCall::Connect(_))), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn activation_delivers_and_auto_offs() {
        let (controller, adapter) = setup();
        controller.scan_and_connect().await.unwrap();

        let outcome = controller.activate(true).await;
        assert_eq!(outcome, PushOutcome::Delivered { attempts: 1 });
        assert!(controller.switch_on());
        assert_eq!(adapter.writes(), vec![vec![0x57, 0x01, 0x00]]);

        tokio::time::sleep(Duration::from_millis(1600)).await;
        assert!(!controller.switch_on());
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_clears_handles() {
        let (controller, adapter) = setup();
        controller.scan_and_connect().await.unwrap();

        adapter.drop_link(&address());
        tokio::time::sleep(Duration::from_millis(1)).await;

        let status = controller.status();
        assert_eq!(status.phase, LinkPhase::Idle);
        assert!(!status.has_write_handle);
    }

    #[tokio::test(start_paused = true)]
    async fn stopped_controller_stops_discovery() {
        let (controller, _adapter) = setup();
        let handle = controller.spawn_discovery();

        tokio::time::sleep(Duration::from_secs(1)).await;
        controller.stop();

        handle.await.unwrap();
        assert!(controller.is_stopped());
    }
}
