// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Device configuration and controller timing.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::adapter::WriteMode;
use crate::config::{DEFAULT_DEVICE_NAME, DeviceEntry, duration_ms};
use crate::error::ValueError;
use crate::retry::RetryPolicy;
use crate::types::{MacAddress, PushPacket};

/// Validated configuration for one managed device.
///
/// # Examples
///
/// ```
/// use pushbot_bridge::manager::DeviceConfig;
/// use pushbot_bridge::types::PushPacket;
/// use uuid::Uuid;
///
/// let config = DeviceConfig::new(
///     "aa:bb:cc:dd:ee:ff".parse().unwrap(),
///     Uuid::from_u128(0xcba20d00_224d_11e6_9fb8_0002a5d5c51b),
///     Uuid::from_u128(0xcba20002_224d_11e6_9fb8_0002a5d5c51b),
///     PushPacket::from_hex("570100").unwrap(),
/// )
/// .with_name("Garage Door");
///
/// assert_eq!(config.name, "Garage Door");
/// assert!(config.notify_uuid.is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceConfig {
    /// Display label.
    pub name: String,
    /// Hardware address of the peripheral.
    pub address: MacAddress,
    /// GATT service holding the characteristics.
    pub service_uuid: Uuid,
    /// Characteristic the push packet is written to.
    pub write_uuid: Uuid,
    /// Characteristic used for the keep-alive heartbeat, if any.
    pub notify_uuid: Option<Uuid>,
    /// Bytes written on every activation.
    pub push_packet: PushPacket,
}

impl DeviceConfig {
    /// Creates a configuration with the default name and no notify
    /// characteristic.
    #[must_use]
    pub fn new(
        address: MacAddress,
        service_uuid: Uuid,
        write_uuid: Uuid,
        push_packet: PushPacket,
    ) -> Self {
        Self {
            name: DEFAULT_DEVICE_NAME.to_string(),
            address,
            service_uuid,
            write_uuid,
            notify_uuid: None,
            push_packet,
        }
    }

    /// Sets the display name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the notify characteristic, enabling the heartbeat.
    #[must_use]
    pub fn with_notify(mut self, notify_uuid: Uuid) -> Self {
        self.notify_uuid = Some(notify_uuid);
        self
    }

    /// Returns true if a heartbeat can run for this device.
    #[must_use]
    pub fn has_heartbeat(&self) -> bool {
        self.notify_uuid.is_some()
    }
}

impl TryFrom<&DeviceEntry> for DeviceConfig {
    type Error = ValueError;

    fn try_from(entry: &DeviceEntry) -> Result<Self, Self::Error> {
        let notify_uuid = entry.notify_uuid.as_deref().map(parse_uuid).transpose()?;

        Ok(Self {
            name: entry.display_name().to_string(),
            address: MacAddress::parse(&entry.mac_address)?,
            service_uuid: parse_uuid(&entry.service_uuid)?,
            write_uuid: parse_uuid(&entry.write_uuid)?,
            notify_uuid,
            push_packet: PushPacket::from_hex(entry.push_packet_hex.trim())?,
        })
    }
}

fn parse_uuid(value: &str) -> Result<Uuid, ValueError> {
    Uuid::parse_str(value.trim()).map_err(|e| ValueError::InvalidUuid {
        value: value.to_string(),
        message: e.to_string(),
    })
}

/// Delays and retry budgets of the connection state machine.
///
/// Every field has a default and can be overridden from the configuration
/// file (durations in milliseconds, `_ms` suffix).
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use pushbot_bridge::manager::ControllerTiming;
///
/// let timing = ControllerTiming::default()
///     .with_reconnect_delay(Duration::from_secs(15));
///
/// assert_eq!(timing.scan_window, Duration::from_millis(4000));
/// assert_eq!(timing.auto_off_delay, Duration::from_millis(1500));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerTiming {
    /// How long discovery runs on each scan cycle.
    #[serde(rename = "scan_window_ms", with = "duration_ms")]
    pub scan_window: Duration,
    /// Pause between discovery cycles.
    #[serde(rename = "reconnect_delay_ms", with = "duration_ms")]
    pub reconnect_delay: Duration,
    /// Wait between transport connect and GATT resolution.
    #[serde(rename = "gatt_settle_delay_ms", with = "duration_ms")]
    pub gatt_settle_delay: Duration,
    /// Wait before the first write of an activation.
    #[serde(rename = "pre_write_delay_ms", with = "duration_ms")]
    pub pre_write_delay: Duration,
    /// Period of the keep-alive read.
    #[serde(rename = "heartbeat_interval_ms", with = "duration_ms")]
    pub heartbeat_interval: Duration,
    /// Time after which the exposed switch reverts to off.
    #[serde(rename = "auto_off_delay_ms", with = "duration_ms")]
    pub auto_off_delay: Duration,
    /// Write mode used for the push packet.
    pub write_mode: WriteMode,
    /// Retry budget for push writes.
    pub write_retry: RetryPolicy,
    /// Retry budget for transport connects.
    pub connect_retry: RetryPolicy,
}

impl ControllerTiming {
    /// Sets the scan window.
    #[must_use]
    pub fn with_scan_window(mut self, window: Duration) -> Self {
        self.scan_window = window;
        self
    }

    /// Sets the delay between discovery cycles.
    #[must_use]
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Sets the GATT settle delay.
    #[must_use]
    pub fn with_gatt_settle_delay(mut self, delay: Duration) -> Self {
        self.gatt_settle_delay = delay;
        self
    }

    /// Sets the pre-write delay.
    #[must_use]
    pub fn with_pre_write_delay(mut self, delay: Duration) -> Self {
        self.pre_write_delay = delay;
        self
    }

    /// Sets the heartbeat interval.
    #[must_use]
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Sets the auto-off delay.
    #[must_use]
    pub fn with_auto_off_delay(mut self, delay: Duration) -> Self {
        self.auto_off_delay = delay;
        self
    }

    /// Sets the write mode.
    #[must_use]
    pub fn with_write_mode(mut self, mode: WriteMode) -> Self {
        self.write_mode = mode;
        self
    }

    /// Sets the write retry policy.
    #[must_use]
    pub fn with_write_retry(mut self, policy: RetryPolicy) -> Self {
        self.write_retry = policy;
        self
    }

    /// Sets the connect retry policy.
    #[must_use]
    pub fn with_connect_retry(mut self, policy: RetryPolicy) -> Self {
        self.connect_retry = policy;
        self
    }
}

impl Default for ControllerTiming {
    fn default() -> Self {
        Self {
            scan_window: Duration::from_millis(4000),
            reconnect_delay: Duration::from_millis(5000),
            gatt_settle_delay: Duration::from_millis(2000),
            pre_write_delay: Duration::from_millis(300),
            heartbeat_interval: Duration::from_millis(15000),
            auto_off_delay: Duration::from_millis(1500),
            write_mode: WriteMode::Request,
            write_retry: RetryPolicy::default(),
            connect_retry: RetryPolicy::once(),
        }
    }
}
