// SPDX-License-Identifier: Apache-2.0
// Copyright Polykube Authors

//! Ethernet (link-layer) addressing.

pub mod mac;
