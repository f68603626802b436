// SPDX-License-Identifier: Apache-2.0
// Copyright Polykube Authors

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::num::NonZero;

/// A [VXLAN][RFC7348] Network Identifier.
///
/// A 24-bit value identifying the overlay segment.  Zero is reserved by most implementations and
/// is rejected here.
///
/// [RFC7348]: https://datatracker.ietf.org/doc/html/rfc7348#section-5
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
#[repr(transparent)]
pub struct Vni(NonZero<u32>);

/// Errors that can occur when converting a `u32` to a [`Vni`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum InvalidVni {
    /// Zero is not a legal Vni.
    #[error("zero is not a legal vni")]
    ReservedZero,
    /// The value does not fit in 24 bits.
    #[error("the value {0} is too large to be a vni (max is {max})", max = Vni::MAX)]
    TooLarge(u32),
}

impl Vni {
    /// The maximum legal [`Vni`] value (2<sup>24</sup> - 1).
    pub const MAX: u32 = 0x00_FF_FF_FF;

    /// Create a new [`Vni`] from a `u32`.
    ///
    /// # Errors
    ///
    /// Returns an [`InvalidVni`] error if the value is 0 or greater than [`Vni::MAX`].
    pub const fn new_checked(vni: u32) -> Result<Vni, InvalidVni> {
        if vni > Vni::MAX {
            return Err(InvalidVni::TooLarge(vni));
        }
        match NonZero::new(vni) {
            Some(vni) => Ok(Vni(vni)),
            None => Err(InvalidVni::ReservedZero),
        }
    }

    /// Get the value of the [`Vni`] as a `u32`.
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0.get()
    }
}

impl Display for Vni {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_u32())
    }
}

impl TryFrom<u32> for Vni {
    type Error = InvalidVni;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Vni::new_checked(value)
    }
}

impl From<Vni> for u32 {
    fn from(value: Vni) -> Self {
        value.as_u32()
    }
}
