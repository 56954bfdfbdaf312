// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! BLE hardware address type.
//!
//! Addresses arrive from configuration files and from platform BLE stacks in
//! many spellings (`AA:BB:CC:DD:EE:FF`, `aabbccddeeff`, `Aa-Bb-Cc-Dd-Ee-Ff`).
//! [`MacAddress`] normalizes all of them to the same value so they can be
//! compared directly.

use std::fmt;
use std::str::FromStr;

use crate::error::ValueError;

/// A 48-bit Bluetooth hardware address.
///
/// Parsing ignores case and any punctuation or whitespace between the hex
/// digits.
///
/// # Examples
///
/// ```
/// use pushbot_bridge::types::MacAddress;
///
/// let a: MacAddress = "AA:BB:CC:DD:EE:FF".parse().unwrap();
/// let b: MacAddress = "aabbccddeeff".parse().unwrap();
/// let c: MacAddress = "Aa-Bb-Cc-Dd-Ee-Ff".parse().unwrap();
///
/// assert_eq!(a, b);
/// assert_eq!(b, c);
/// assert_eq!(a.key(), "aabbccddeeff");
/// assert_eq!(a.to_string(), "aa:bb:cc:dd:ee:ff");
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MacAddress([u8; 6]);

impl MacAddress {
    /// Creates an address from its six octets.
    #[must_use]
    pub const fn new(octets: [u8; 6]) -> Self {
        Self(octets)
    }

    /// Parses an address, ignoring case and punctuation.
    ///
    /// # Errors
    ///
    /// Returns `ValueError::InvalidAddress` unless the input contains exactly
    /// twelve hex digits once separators are removed.
    pub fn parse(input: &str) -> Result<Self, ValueError> {
        let digits: Vec<u8> = input
            .chars()
            .filter(|c| !c.is_ascii_punctuation() && !c.is_whitespace())
            .map(|c| {
                c.to_digit(16)
                    .and_then(|d| u8::try_from(d).ok())
                    .ok_or_else(|| ValueError::InvalidAddress(input.to_string()))
            })
            .collect::<Result<_, _>>()?;

        if digits.len() != 12 {
            return Err(ValueError::InvalidAddress(input.to_string()));
        }

        let mut octets = [0u8; 6];
        for (octet, pair) in octets.iter_mut().zip(digits.chunks_exact(2)) {
            *octet = (pair[0] << 4) | pair[1];
        }
        Ok(Self(octets))
    }

    /// Returns the six octets.
    #[must_use]
    pub const fn octets(&self) -> [u8; 6] {
        self.0
    }

    /// Returns the normalized lookup key: twelve lowercase hex digits.
    #[must_use]
    pub fn key(&self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }

    /// Returns true if `other` spells this address, in any case or
    /// punctuation.
    #[must_use]
    pub fn matches(&self, other: &str) -> bool {
        Self::parse(other).is_ok_and(|parsed| parsed == *self)
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

impl fmt::Debug for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MacAddress({self})")
    }
}

impl FromStr for MacAddress {
    type Err = ValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<[u8; 6]> for MacAddress {
    fn from(octets: [u8; 6]) -> Self {
        Self(octets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spellings_normalize_to_same_key() {
        let spellings = ["AA:BB:CC:DD:EE:FF", "aabbccddeeff", "Aa-Bb-Cc-Dd-Ee-Ff"];
        let parsed: Vec<MacAddress> = spellings.iter().map(|s| s.parse().unwrap()).collect();

        for addr in &parsed {
            assert_eq!(addr.key(), "aabbccddeeff");
        }
        for addr in &parsed {
            for spelling in spellings {
                assert!(addr.matches(spelling), "{addr} should match {spelling}");
            }
        }
    }

    #[test]
    fn dotted_and_spaced_forms_parse() {
        let dotted: MacAddress = "aabb.ccdd.eeff".parse().unwrap();
        let spaced: MacAddress = "AA BB CC DD EE FF".parse().unwrap();
        assert_eq!(dotted, spaced);
    }

    #[test]
    fn display_is_lowercase_colon_form() {
        let addr = MacAddress::new([0x0a, 0x1b, 0x2c, 0x3d, 0x4e, 0x5f]);
        assert_eq!(addr.to_string(), "0a:1b:2c:3d:4e:5f");
        assert_eq!(format!("{addr:?}"), "MacAddress(0a:1b:2c:3d:4e:5f)");
    }

    #[test]
    fn rejects_wrong_length() {
        assert!(MacAddress::parse("aa:bb:cc:dd:ee").is_err());
        assert!(MacAddress::parse("aa:bb:cc:dd:ee:ff:00").is_err());
        assert!(MacAddress::parse("").is_err());
    }

    #[test]
    fn rejects_non_hex() {
        let err = MacAddress::parse("gg:bb:cc:dd:ee:ff").unwrap_err();
        assert_eq!(err, ValueError::InvalidAddress("gg:bb:cc:dd:ee:ff".to_string()));
    }

    #[test]
    fn matches_rejects_other_address() {
        let addr: MacAddress = "aa:bb:cc:dd:ee:ff".parse().unwrap();
        assert!(!addr.matches("aa:bb:cc:dd:ee:fe"));
        assert!(!addr.matches("not an address"));
    }
}
