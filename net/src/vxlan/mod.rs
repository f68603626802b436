// SPDX-License-Identifier: Apache-2.0
// Copyright Polykube Authors

//! VXLAN tunnel parameters.

mod vni;

#[allow(unused_imports)] // re-export
pub use vni::*;

/// The IANA assigned UDP destination port for VXLAN.
pub const VXLAN_PORT: u16 = 4789;
