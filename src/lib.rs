// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `PushBot` Bridge - expose BLE push-button actuators as on/off switches.
//!
//! A push-button actuator is a small BLE peripheral that presses a physical
//! button when a fixed command packet is written to one of its
//! characteristics. This crate keeps such peripherals connected and exposes
//! each one to a home-automation host as a momentary switch.
//!
//! # Features
//!
//! - **Discovery and reconnection**: each device is scanned for by hardware
//!   address and reconnected automatically after a link loss
//! - **Reliable push**: the command packet is written with bounded retry
//! - **Keep-alive**: optional periodic read of a notify characteristic
//! - **Momentary switch**: the exposed switch returns to off on its own
//! - **Pluggable transport**: [`adapter::BleAdapter`], with a simulated
//!   implementation and a `bluest` one (feature `bluest`)
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use pushbot_bridge::adapter::SimulatedAdapter;
//! use pushbot_bridge::config::BridgeConfig;
//! use pushbot_bridge::manager::DeviceRegistry;
//!
//! #[tokio::main]
//! async fn main() -> pushbot_bridge::Result<()> {
//!     let config = BridgeConfig::load("bridge.json")?;
//!     let registry = DeviceRegistry::from_config(&config, Arc::new(SimulatedAdapter::new()));
//!     registry.spawn_discovery();
//!
//!     let switches = registry.accessories();
//!     if let Some(gate) = switches.first() {
//!         gate.set(true);
//!     }
//!
//!     tokio::signal::ctrl_c().await.ok();
//!     registry.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod adapter;
pub mod config;
pub mod error;
pub mod event;
pub mod host;
pub mod manager;
pub mod retry;
pub mod types;

pub use adapter::{BleAdapter, SimulatedAdapter, WriteMode};
pub use config::{BridgeConfig, DeviceEntry};
pub use error::{AdapterError, ConfigError, Error, Result, ValueError};
pub use event::{BridgeEvent, DeviceId, EventBus};
pub use host::{AccessoryInfo, SwitchAccessory};
pub use manager::{
    ControllerStatus, ControllerTiming, DeviceConfig, DeviceController, DeviceRegistry, LinkPhase,
    PushOutcome,
};
pub use retry::RetryPolicy;
pub use types::{MacAddress, PushPacket};
