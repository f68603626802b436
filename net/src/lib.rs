// SPDX-License-Identifier: Apache-2.0
// Copyright Polykube Authors

//! Addressing vocabulary shared by the node bootstrap crates.

#![deny(
    unsafe_code,
    missing_docs,
    clippy::all,
    clippy::pedantic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic
)]

pub mod eth;
pub mod interface;
pub mod ipv4;
pub mod vxlan;
