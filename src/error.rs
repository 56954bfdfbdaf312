// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for the `PushBot` bridge.
//!
//! This module provides the error hierarchy used across the crate: value
//! validation, configuration loading, BLE transport failures, and controller
//! operations.

use thiserror::Error;

/// The main error type for this library.
#[derive(Debug, Error)]
pub enum Error {
    /// Error occurred during value validation.
    #[error("value error: {0}")]
    Value(#[from] ValueError),

    /// Error occurred while loading or validating configuration.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Error reported by the BLE adapter.
    #[error("adapter error: {0}")]
    Adapter(#[from] AdapterError),

    /// The peripheral has not been seen by the adapter.
    #[error("device {0} has not been discovered")]
    DeviceNotFound(String),

    /// The device has no usable connection.
    #[error("device is not connected")]
    NotConnected,

    /// The controller task is no longer running.
    #[error("controller has been stopped")]
    ControllerStopped,
}

/// Errors related to value validation and parsing.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValueError {
    /// A hardware address does not contain exactly 12 hex digits.
    #[error("invalid hardware address: {0}")]
    InvalidAddress(String),

    /// A hex string has an odd number of digits.
    #[error("hex string has odd length {0}")]
    OddHexLength(usize),

    /// A hex string contains a non-hex character.
    #[error("invalid hex digit {digit:?} at position {position}")]
    InvalidHexDigit {
        /// The offending character.
        digit: char,
        /// Its position in the input.
        position: usize,
    },

    /// A push packet must carry at least one byte.
    #[error("push packet is empty")]
    EmptyPacket,

    /// A UUID could not be parsed.
    #[error("invalid UUID {value:?}: {message}")]
    InvalidUuid {
        /// The raw value.
        value: String,
        /// Parser message.
        message: String,
    },
}

/// Errors related to configuration documents.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        /// The path that was read.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration document is not valid JSON for the schema.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// A device entry failed validation.
    #[error("device entry {index} ({name}): {reason}")]
    InvalidDevice {
        /// Position of the entry in the `devices` list.
        index: usize,
        /// Display name of the entry.
        name: String,
        /// What was wrong with it.
        reason: ValueError,
    },
}

/// Errors reported by a BLE adapter implementation.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// No usable Bluetooth adapter.
    #[error("bluetooth adapter unavailable: {0}")]
    Unavailable(String),

    /// Starting or stopping discovery failed.
    #[error("discovery failed: {0}")]
    Discovery(String),

    /// The adapter does not know a device with this address.
    #[error("unknown device {0}")]
    UnknownDevice(String),

    /// Transport-level connect failed.
    #[error("connect failed: {0}")]
    ConnectFailed(String),

    /// The link to the peripheral is down.
    #[error("link is not connected")]
    NotConnected,

    /// The requested service is not exposed by the peripheral.
    #[error("service {0} not found")]
    ServiceNotFound(uuid::Uuid),

    /// The requested characteristic is not part of the service.
    #[error("characteristic {0} not found")]
    CharacteristicNotFound(uuid::Uuid),

    /// A characteristic read, write or subscribe failed.
    #[error("GATT operation failed: {0}")]
    Gatt(String),

    /// Error raised by the `bluest` backend.
    #[cfg(feature = "bluest")]
    #[error("bluest error: {0}")]
    Bluest(#[from] bluest::Error),
}

/// A specialized Result type for this library.
pub type Result<T> = std::result::Result<T, Error>;
