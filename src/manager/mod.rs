// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Device controllers and the registry that owns them.
//!
//! # Overview
//!
//! The [`DeviceRegistry`] turns a list of [`DeviceConfig`]s into one
//! [`DeviceController`] each. A controller keeps its peripheral connected
//! and turns activation requests into characteristic writes:
//!
//! - **Discovery loop**: scans while the link is down, connects on sight
//! - **Connect sequence**: transport connect, GATT settle, write
//!   characteristic lookup, optional notify subscription
//! - **Disconnect observer**: clears every link handle when the link drops
//! - **Heartbeat**: periodic read of the notify characteristic
//! - **Push**: bounded write retry, then auto-off of the exposed switch
//!
//! # Examples
//!
//! ```no_run
//! use std::sync::Arc;
//! use pushbot_bridge::adapter::SimulatedAdapter;
//! use pushbot_bridge::config::BridgeConfig;
//! use pushbot_bridge::event::BridgeEvent;
//! use pushbot_bridge::manager::DeviceRegistry;
//!
//! #[tokio::main]
//! async fn main() -> pushbot_bridge::Result<()> {
//!     let config = BridgeConfig::load("bridge.json")?;
//!     let registry = DeviceRegistry::from_config(&config, Arc::new(SimulatedAdapter::new()));
//!
//!     let mut events = registry.subscribe();
//!     registry.spawn_discovery();
//!
//!     for switch in registry.accessories() {
//!         println!("{} ({})", switch.info().name, switch.info().serial);
//!     }
//!
//!     while let Ok(event) = events.recv().await {
//!         if let BridgeEvent::SwitchChanged { device_id, on } = event {
//!             println!("{device_id}: {on}");
//!         }
//!     }
//!     Ok(())
//! }
//! ```

mod connection;
mod controller;
mod device_config;
mod registry;

pub use connection::{ControllerStatus, LinkPhase};
pub use controller::{DeviceController, PushOutcome};
pub use device_config::{ControllerTiming, DeviceConfig};
pub use registry::DeviceRegistry;
