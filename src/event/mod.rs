// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Event system for controller activity.
//!
//! Every controller publishes connection changes, switch changes and push
//! outcomes on a shared [`EventBus`], backed by a tokio broadcast channel so
//! any number of subscribers can observe the bridge.
//!
//! # Examples
//!
//! ```
//! use pushbot_bridge::event::{BridgeEvent, DeviceId, EventBus};
//!
//! let bus = EventBus::new();
//! let mut rx = bus.subscribe();
//!
//! let device_id = DeviceId::new();
//! bus.publish(BridgeEvent::switch_changed(device_id, false));
//! ```

mod bridge_event;
mod device_id;
mod event_bus;

pub use bridge_event::BridgeEvent;
pub use device_id::DeviceId;
pub use event_bus::EventBus;
