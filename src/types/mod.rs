// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Value types for device configuration.
//!
//! Each type validates its input at construction time, so a configured
//! device can never carry a malformed address or packet.
//!
//! # Types
//!
//! - [`MacAddress`] - BLE hardware address, case- and punctuation-insensitive
//! - [`PushPacket`] - Immutable command bytes decoded from hex

mod mac_address;
mod push_packet;

pub use mac_address::MacAddress;
pub use push_packet::PushPacket;
