// SPDX-License-Identifier: Apache-2.0
// Copyright Polykube Authors

//! Identifiers for linux network interfaces.

use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Display, Formatter};
use std::num::NonZero;
use std::str::FromStr;

/// A network interface id (also known as ifindex in linux).
///
/// These are assigned by the kernel and only meaningful inside one network namespace for the
/// lifetime of the interface.
#[repr(transparent)]
#[derive(Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InterfaceIndex(NonZero<u32>);

/// Returned when the kernel (or a caller) hands us ifindex zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("interface index must not be zero")]
pub struct ZeroInterfaceIndex;

impl InterfaceIndex {
    /// Treat the provided `u32` as an [`InterfaceIndex`].
    ///
    /// # Errors
    ///
    /// Returns an error if the provided value is zero.
    pub fn try_new(raw: u32) -> Result<Self, ZeroInterfaceIndex> {
        NonZero::new(raw).map(InterfaceIndex).ok_or(ZeroInterfaceIndex)
    }

    /// Treat this [`InterfaceIndex`] as a `u32`.
    #[must_use]
    pub fn to_u32(self) -> u32 {
        self.0.get()
    }
}

impl TryFrom<u32> for InterfaceIndex {
    type Error = ZeroInterfaceIndex;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::try_new(value)
    }
}

impl From<NonZero<u32>> for InterfaceIndex {
    fn from(value: NonZero<u32>) -> Self {
        InterfaceIndex(value)
    }
}

impl From<InterfaceIndex> for u32 {
    fn from(value: InterfaceIndex) -> Self {
        value.to_u32()
    }
}

impl Debug for InterfaceIndex {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        <_ as Debug>::fmt(&self.0, f)
    }
}

impl Display for InterfaceIndex {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        <_ as Display>::fmt(&self.0, f)
    }
}

/// A string which has been checked to be a legal linux network interface name.
///
/// Legal names are 1 to 15 bytes of alphanumeric ASCII, `.`, `-` and `_`, and are neither `.` nor
/// `..`.
#[repr(transparent)]
#[derive(Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
#[derive(Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug)]
pub struct InterfaceName(String);

impl InterfaceName {
    /// The maximum length of a linux network interface name, excluding the trailing NUL.
    pub const MAX_LEN: usize = 15;
}

/// Errors which may occur when mapping a general `String` into an [`InterfaceName`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IllegalInterfaceName {
    /// The empty string was submitted.
    #[error("interface name must be at least one character")]
    Empty,
    /// You can't make an interface named `.` or `..`.
    #[error("interface name must not be . or ..")]
    OnlyDots(String),
    /// A string which is longer than [`InterfaceName::MAX_LEN`] was submitted.
    #[error("interface name {0} is too long")]
    TooLong(String),
    /// The string contains a character outside of `[A-Za-z0-9._-]`.
    #[error("interface name {0:?} contains illegal characters (only alphanumeric ASCII and .-_ are permitted)")]
    IllegalCharacters(String),
}

impl TryFrom<String> for InterfaceName {
    type Error = IllegalInterfaceName;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value.is_empty() {
            return Err(IllegalInterfaceName::Empty);
        }
        if value == "." || value == ".." {
            return Err(IllegalInterfaceName::OnlyDots(value));
        }
        if !value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
        {
            return Err(IllegalInterfaceName::IllegalCharacters(value));
        }
        if value.len() > InterfaceName::MAX_LEN {
            return Err(IllegalInterfaceName::TooLong(value));
        }
        Ok(InterfaceName(value))
    }
}

impl TryFrom<&str> for InterfaceName {
    type Error = IllegalInterfaceName;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::try_from(value.to_string())
    }
}

impl FromStr for InterfaceName {
    type Err = IllegalInterfaceName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::try_from(s)
    }
}

impl From<InterfaceName> for String {
    fn from(value: InterfaceName) -> Self {
        value.0
    }
}

impl AsRef<str> for InterfaceName {
    fn as_ref(&self) -> &str {
        self.0.as_str()
    }
}

impl Display for InterfaceName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::{IllegalInterfaceName, InterfaceIndex, InterfaceName};

    #[test]
    fn zero_is_not_an_interface_index() {
        assert!(InterfaceIndex::try_new(0).is_err());
        assert_eq!(InterfaceIndex::try_new(7).unwrap().to_u32(), 7);
    }

    #[test]
    fn interface_names_follow_kernel_rules() {
        assert_eq!(InterfaceName::try_from("vxlan0").unwrap().as_ref(), "vxlan0");
        assert_eq!(InterfaceName::try_from("eth0.100").unwrap().to_string(), "eth0.100");
        assert_eq!(InterfaceName::try_from(""), Err(IllegalInterfaceName::Empty));
        assert!(matches!(
            InterfaceName::try_from(".."),
            Err(IllegalInterfaceName::OnlyDots(_))
        ));
        assert!(matches!(
            InterfaceName::try_from("sixteen-chars-xx"),
            Err(IllegalInterfaceName::TooLong(_))
        ));
        assert!(matches!(
            InterfaceName::try_from("br 0"),
            Err(IllegalInterfaceName::IllegalCharacters(_))
        ));
    }
}
