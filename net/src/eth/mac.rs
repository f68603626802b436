// SPDX-License-Identifier: Apache-2.0
// Copyright Polykube Authors

//! Mac address type and logic.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// A [MAC Address] as reported by the kernel or assigned by a network function.
///
/// [MAC Address]: https://en.wikipedia.org/wiki/MAC_address
#[repr(transparent)]
#[cfg_attr(any(test, feature = "bolero"), derive(bolero::TypeGenerator))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Mac(pub [u8; 6]);

/// Errors which can occur while building a [`Mac`] from text or raw bytes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidMac {
    /// The text is not six colon separated hex octets.
    #[error("invalid string representation of mac address: {0:?}")]
    Text(String),
    /// The link-layer address does not have six octets.
    #[error("link-layer address has {0} octets, expected 6")]
    Length(usize),
}

impl Mac {
    /// The all-zero `Mac`.
    ///
    /// Used as the placeholder destination of static VXLAN forwarding entries, where it stands for
    /// "every frame with no better match".
    pub const ZERO: Mac = Mac([0; 6]);

    /// The broadcast `Mac`.
    pub const BROADCAST: Mac = Mac([u8::MAX; 6]);

    /// Returns true iff every octet is zero.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self == &Mac::ZERO
    }

    /// Returns true iff the group bit of the first octet is set.
    #[must_use]
    pub fn is_multicast(&self) -> bool {
        self.0[0] & 0x01 == 0x01
    }

    /// The raw octets of this address.
    #[must_use]
    pub fn octets(&self) -> [u8; 6] {
        self.0
    }
}

impl From<[u8; 6]> for Mac {
    fn from(value: [u8; 6]) -> Self {
        Mac(value)
    }
}

impl TryFrom<&[u8]> for Mac {
    type Error = InvalidMac;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        <[u8; 6]>::try_from(value)
            .map(Mac)
            .map_err(|_| InvalidMac::Length(value.len()))
    }
}

impl FromStr for Mac {
    type Err = InvalidMac;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidMac::Text(value.to_string());
        let mut octets = [0u8; 6];
        let mut parts = value.split(':');
        for octet in &mut octets {
            let part = parts.next().ok_or_else(invalid)?;
            if part.len() != 2 {
                return Err(invalid());
            }
            *octet = u8::from_str_radix(part, 16).map_err(|_| invalid())?;
        }
        if parts.next().is_some() {
            return Err(invalid());
        }
        Ok(Mac(octets))
    }
}

impl TryFrom<String> for Mac {
    type Error = InvalidMac;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Mac> for String {
    fn from(value: Mac) -> Self {
        value.to_string()
    }
}

impl Display for Mac {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::{InvalidMac, Mac};

    #[test]
    fn text_form_is_parseable() {
        bolero::check!().with_type().for_each(|mac: &Mac| {
            let text = mac.to_string();
            assert_eq!(text.len(), 17);
            assert_eq!(text.parse::<Mac>().unwrap(), *mac);
        });
    }

    #[test]
    fn parses_mixed_case() {
        let mac: Mac = "0A:bc:00:11:22:Ff".parse().unwrap();
        assert_eq!(mac, Mac([0x0a, 0xbc, 0x00, 0x11, 0x22, 0xff]));
        assert_eq!(mac.to_string(), "0a:bc:00:11:22:ff");
    }

    #[test]
    fn rejects_malformed_text() {
        for bad in ["", "00:11:22:33:44", "00:11:22:33:44:55:66", "0:11:22:33:44:55", "zz:11:22:33:44:55"] {
            assert!(matches!(bad.parse::<Mac>(), Err(InvalidMac::Text(_))), "{bad}");
        }
    }

    #[test]
    fn link_layer_bytes_must_be_six_octets() {
        assert_eq!(Mac::try_from(&[1u8, 2, 3, 4, 5, 6][..]).unwrap(), Mac([1, 2, 3, 4, 5, 6]));
        assert_eq!(Mac::try_from(&[1u8, 2, 3][..]), Err(InvalidMac::Length(3)));
    }
}
