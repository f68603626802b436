// SPDX-License-Identifier: Apache-2.0
// Copyright Polykube Authors

//! Client side of the network function management API.
//!
//! Four function types are managed: the L2 bridge (`simplebridge`), the L3 `router`, the
//! load-balancer/reverse-proxy (`lbrp`) and the kubernetes service dispatcher (`k8sdispatcher`).
//! Each type gets one async trait; [`CubeClientSet`] bundles an implementation of every trait.

#![deny(
    unsafe_code,
    missing_docs,
    clippy::all,
    clippy::pedantic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic
)]

mod api;
mod client;
mod error;
pub mod models;

#[cfg(any(test, feature = "testing"))]
pub mod fake;

pub use api::*;
pub use client::PolycubeClient;
pub use error::ManagementApiError;

use tracectl::trace_target;

trace_target!("cube", LevelFilter::INFO, &["management-api"]);

/// The peer string naming `port` of the function instance `cube`.
///
/// A port peer is either such a string or the bare name of a kernel interface.
#[must_use]
pub fn port_peer(cube: &str, port: &str) -> String {
    format!("{cube}:{port}")
}

#[cfg(test)]
mod tests {
    use super::port_peer;

    #[test]
    fn peers_join_instance_and_port() {
        assert_eq!(port_peer("r0", "to_br0"), "r0:to_br0");
    }
}
