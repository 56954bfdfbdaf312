// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Configuration documents.
//!
//! A bridge is configured with a JSON document listing the devices to manage
//! and, optionally, the controller timing:
//!
//! ```json
//! {
//!   "devices": [
//!     {
//!       "name": "Garage Door",
//!       "mac_address": "AA:BB:CC:DD:EE:FF",
//!       "service_uuid": "cba20d00-224d-11e6-9fb8-0002a5d5c51b",
//!       "write_uuid": "cba20002-224d-11e6-9fb8-0002a5d5c51b",
//!       "notify_uuid": "cba20003-224d-11e6-9fb8-0002a5d5c51b",
//!       "push_packet_hex": "570100"
//!     }
//!   ],
//!   "timing": { "reconnect_delay_ms": 15000 }
//! }
//! ```
//!
//! Entries are kept as raw strings ([`DeviceEntry`]) until the registry
//! validates them one by one, so a single malformed entry never blocks the
//! others.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ValueError};
use crate::manager::{ControllerTiming, DeviceConfig};

/// Display name used when an entry has none.
pub const DEFAULT_DEVICE_NAME: &str = "PushBot";

/// One device entry as written in the configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceEntry {
    /// Display label.
    #[serde(default)]
    pub name: Option<String>,
    /// BLE hardware address, any punctuation, any case.
    pub mac_address: String,
    /// GATT service UUID.
    pub service_uuid: String,
    /// Write characteristic UUID.
    pub write_uuid: String,
    /// Optional notify characteristic UUID; enables the heartbeat.
    #[serde(default)]
    pub notify_uuid: Option<String>,
    /// Hex-encoded bytes written on activation.
    pub push_packet_hex: String,
}

impl DeviceEntry {
    /// Returns the configured name or the default one.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(DEFAULT_DEVICE_NAME)
    }

    /// Validates the entry into a [`DeviceConfig`].
    ///
    /// # Errors
    ///
    /// Returns the first field that fails validation.
    pub fn validate(&self) -> Result<DeviceConfig, ValueError> {
        DeviceConfig::try_from(self)
    }
}

/// Top-level configuration document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Devices to manage, in registration order.
    #[serde(default)]
    pub devices: Vec<DeviceEntry>,
    /// Controller timing shared by every device.
    #[serde(default)]
    pub timing: ControllerTiming,
}

impl BridgeConfig {
    /// Parses a configuration document.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Json` if the document does not match the schema.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads and parses a configuration file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Io` if the file cannot be read, or
    /// `ConfigError::Json` if it cannot be parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    /// Validates every entry, keeping valid devices and reporting the rest.
    ///
    /// Order is preserved in both lists.
    #[must_use]
    pub fn validate(&self) -> (Vec<DeviceConfig>, Vec<ConfigError>) {
        validate_entries(&self.devices)
    }
}

/// Validates a list of entries independently of each other.
pub(crate) fn validate_entries(entries: &[DeviceEntry]) -> (Vec<DeviceConfig>, Vec<ConfigError>) {
    let mut valid = Vec::with_capacity(entries.len());
    let mut rejected = Vec::new();

    for (index, entry) in entries.iter().enumerate() {
        match entry.validate() {
            Ok(config) => valid.push(config),
            Err(reason) => rejected.push(ConfigError::InvalidDevice {
                index,
                name: entry.display_name().to_string(),
                reason,
            }),
        }
    }

    (valid, rejected)
}

/// Serde helper storing a `Duration` as integer milliseconds.
pub(crate) mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        u64::try_from(value.as_millis())
            .unwrap_or(u64::MAX)
            .serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    const DOCUMENT: &str = r#"{
        "devices": [
            {
                "name": "Garage Door",
                "mac_address": "AA:BB:CC:DD:EE:FF",
                "service_uuid": "CBA20D00-224D-11E6-9FB8-0002A5D5C51B",
                "write_uuid": "cba20002-224d-11e6-9fb8-0002a5d5c51b",
                "notify_uuid": "cba20003-224d-11e6-9fb8-0002a5d5c51b",
                "push_packet_hex": "570100"
            },
            {
                "mac_address": "11-22-33-44-55-66",
                "service_uuid": "cba20d00-224d-11e6-9fb8-0002a5d5c51b",
                "write_uuid": "cba20002-224d-11e6-9fb8-0002a5d5c51b",
                "push_packet_hex": "0102030f"
            }
        ],
        "timing": { "reconnect_delay_ms": 15000, "write_retry": { "max_attempts": 5 } }
    }"#;

    #[test]
    fn parses_document() {
        let config = BridgeConfig::from_json_str(DOCUMENT).unwrap();

        assert_eq!(config.devices.len(), 2);
        assert_eq!(config.devices[0].display_name(), "Garage Door");
        assert_eq!(config.devices[1].display_name(), DEFAULT_DEVICE_NAME);
        assert_eq!(config.timing.reconnect_delay, Duration::from_secs(15));
        assert_eq!(config.timing.scan_window, Duration::from_millis(4000));
        assert_eq!(config.timing.write_retry.max_attempts, 5);
        assert_eq!(
            config.timing.write_retry.backoff,
            Duration::from_millis(500)
        );
    }

    #[test]
    fn validate_keeps_order() {
        let config = BridgeConfig::from_json_str(DOCUMENT).unwrap();
        let (valid, rejected) = config.validate();

        assert!(rejected.is_empty());
        assert_eq!(valid.len(), 2);
        assert_eq!(valid[0].name, "Garage Door");
        assert_eq!(valid[1].address.key(), "112233445566");
        assert!(valid[0].notify_uuid.is_some());
        assert!(valid[1].notify_uuid.is_none());
    }

    #[test]
    fn bad_entry_does_not_block_others() {
        let mut config = BridgeConfig::from_json_str(DOCUMENT).unwrap();
        config.devices[0].push_packet_hex = "xyz".to_string();

        let (valid, rejected) = config.validate();

        assert_eq!(valid.len(), 1);
        assert_eq!(valid[0].name, DEFAULT_DEVICE_NAME);
        assert_eq!(rejected.len(), 1);
        assert!(matches!(
            &rejected[0],
            ConfigError::InvalidDevice { index: 0, name, .. } if name == "Garage Door"
        ));
    }

    #[test]
    fn missing_required_field_is_json_error() {
        let err = BridgeConfig::from_json_str(r#"{"devices":[{"mac_address":"aa"}]}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Json(_)));
    }

    #[test]
    fn empty_document_uses_defaults() {
        let config = BridgeConfig::from_json_str("{}").unwrap();
        assert!(config.devices.is_empty());
        assert_eq!(config.timing, ControllerTiming::default());
    }

    #[test]
    fn load_reports_missing_file() {
        let err = BridgeConfig::load("/nonexistent/pushbot.json").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn blank_name_falls_back_to_default() {
        let entry = DeviceEntry {
            name: Some("  ".to_string()),
            mac_address: "aabbccddeeff".to_string(),
            service_uuid: String::new(),
            write_uuid: String::new(),
            notify_uuid: None,
            push_packet_hex: "01".to_string(),
        };
        assert_eq!(entry.display_name(), DEFAULT_DEVICE_NAME);
    }
}
