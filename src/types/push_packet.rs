// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Push packet type.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use hex::FromHexError;

use crate::error::ValueError;

/// The fixed byte sequence written to trigger one actuation.
///
/// The packet is decoded from hex once, at construction, and is immutable
/// afterwards. Clones share the same buffer.
///
/// # Examples
///
/// ```
/// use pushbot_bridge::types::PushPacket;
///
/// let packet = PushPacket::from_hex("0102030f").unwrap();
/// assert_eq!(packet.as_bytes(), &[0x01, 0x02, 0x03, 0x0f]);
/// assert_eq!(packet.to_string(), "0102030f");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PushPacket(Arc<[u8]>);

impl PushPacket {
    /// Decodes a packet from a hex string.
    ///
    /// Case is ignored. Whitespace is not accepted.
    ///
    /// # Errors
    ///
    /// Returns an error if the string is empty, has odd length, or contains a
    /// character that is not a hex digit.
    pub fn from_hex(input: &str) -> Result<Self, ValueError> {
        if input.is_empty() {
            return Err(ValueError::EmptyPacket);
        }

        let bytes = hex::decode(input).map_err(|e| match e {
            FromHexError::InvalidHexCharacter { c, index } => ValueError::InvalidHexDigit {
                digit: c,
                position: index,
            },
            FromHexError::OddLength | FromHexError::InvalidStringLength => {
                ValueError::OddHexLength(input.len())
            }
        })?;
        Ok(Self(bytes.into()))
    }

    /// Creates a packet from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns `ValueError::EmptyPacket` if `bytes` is empty.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ValueError> {
        if bytes.is_empty() {
            return Err(ValueError::EmptyPacket);
        }
        Ok(Self(bytes.into()))
    }

    /// Returns the packet bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Returns the packet length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false; empty packets cannot be constructed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for PushPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0.iter() {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl FromStr for PushPacket {
    type Err = ValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl AsRef<[u8]> for PushPacket {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_exact_bytes() {
        let packet = PushPacket::from_hex("0102030f").unwrap();
        assert_eq!(packet.as_bytes(), &[0x01, 0x02, 0x03, 0x0f]);
        assert_eq!(packet.len(), 4);
    }

    #[test]
    fn ignores_case() {
        let upper = PushPacket::from_hex("570100").unwrap();
        let lower: PushPacket = "570100".parse().unwrap();
        assert_eq!(upper, lower);
        assert_eq!(PushPacket::from_hex("ABcd").unwrap().as_bytes(), &[0xab, 0xcd]);
    }

    #[test]
    fn rejects_empty() {
        assert_eq!(PushPacket::from_hex(""), Err(ValueError::EmptyPacket));
        assert_eq!(PushPacket::from_bytes(&[]), Err(ValueError::EmptyPacket));
    }

    #[test]
    fn rejects_odd_length() {
        assert_eq!(PushPacket::from_hex("abc"), Err(ValueError::OddHexLength(3)));
    }

    #[test]
    fn rejects_bad_digit_with_position() {
        assert_eq!(
            PushPacket::from_hex("01zz"),
            Err(ValueError::InvalidHexDigit {
                digit: 'z',
                position: 2
            })
        );
    }

    #[test]
    fn prefixed_hex_is_rejected() {
        assert_eq!(
            PushPacket::from_hex("0x0f"),
            Err(ValueError::InvalidHexDigit {
                digit: 'x',
                position: 1
            })
        );
    }

    #[test]
    fn clones_share_content() {
        let packet = PushPacket::from_bytes(&[0x57, 0x01]).unwrap();
        let copy = packet.clone();
        assert_eq!(packet.as_bytes(), copy.as_bytes());
        assert_eq!(copy.to_string(), "5701");
    }
}
