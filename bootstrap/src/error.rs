// SPDX-License-Identifier: Apache-2.0
// Copyright Polykube Authors

//! Errors which abort a bootstrap run.

use crate::topology::TopologyStage;
use cluster::ClusterError;
use cube::ManagementApiError;
use interface_manager::StackError;
use std::net::Ipv4Addr;
use std::path::PathBuf;

/// Everything that can go wrong while bootstrapping a node.
///
/// Every variant is terminal: no stage retries or rolls back, the caller is expected to log the
/// error and exit.
#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    /// An address or prefix reported by the cluster is unparsable, missing or not IPv4.
    #[error("{subject} {value:?} is not usable: {reason}")]
    AddressFormat {
        /// What the value was supposed to be (e.g. "pod cidr of node worker1").
        subject: String,
        /// The offending value as reported.
        value: String,
        /// Why it was refused.
        reason: String,
    },
    /// No local interface owns the address the cluster reports for this node.
    #[error("no local interface owns {address}, the internal address of node {node}")]
    InterfaceNotFound {
        /// The node name.
        node: String,
        /// The address that was looked for.
        address: Ipv4Addr,
    },
    /// A derived address could not be computed from the naming or addressing conventions.
    #[error("cannot derive the {what} of node {node}: {reason}")]
    AddressDerivation {
        /// The node name.
        node: String,
        /// The address being derived.
        what: &'static str,
        /// Why the derivation failed.
        reason: String,
    },
    /// The uplink probe route is missing, not unique or leaves through the wrong interface.
    #[error("route towards {probe} is unusable: {reason}")]
    RouteAmbiguity {
        /// The probe destination.
        probe: Ipv4Addr,
        /// What was expected versus what the kernel reported.
        reason: String,
    },
    /// The link-layer address of a gateway is unknown.
    #[error("no mac known for gateway {gateway} on {interface}")]
    GatewayMacUnresolved {
        /// The gateway address.
        gateway: Ipv4Addr,
        /// Where the mac was looked up (an interface or a router port).
        interface: String,
    },
    /// An interface could not be created or configured.
    #[error("failed to {step} interface {interface}: {source}")]
    InterfaceCreation {
        /// The interface name.
        interface: String,
        /// The failing step.
        step: &'static str,
        /// The underlying error.
        #[source]
        source: StackError,
    },
    /// A management API call failed.
    #[error(transparent)]
    ManagementApi(#[from] ManagementApiError),
    /// A kernel query or forwarding update failed.
    #[error("failed to {operation}: {source}")]
    Netlink {
        /// The failing operation.
        operation: &'static str,
        /// The underlying error.
        #[source]
        source: StackError,
    },
    /// Cluster metadata could not be read.
    #[error(transparent)]
    ClusterMetadata(#[from] ClusterError),
    /// The CNI configuration file could not be written.
    #[error("failed to write cni configuration {}: {source}", path.display())]
    ConfigEmit {
        /// The configuration file path.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },
    /// A topology step was attempted out of order.
    #[error("topology step requires stage {expected}, but the topology is {actual}")]
    TopologyStage {
        /// The stage the step starts from.
        expected: TopologyStage,
        /// The stage the topology is in.
        actual: TopologyStage,
    },
}

impl BootstrapError {
    pub(crate) fn address_format(
        subject: impl Into<String>,
        value: impl Into<String>,
        reason: impl ToString,
    ) -> Self {
        BootstrapError::AddressFormat {
            subject: subject.into(),
            value: value.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn derivation(node: &str, what: &'static str, reason: impl Into<String>) -> Self {
        BootstrapError::AddressDerivation {
            node: node.to_string(),
            what,
            reason: reason.into(),
        }
    }

    pub(crate) fn netlink(operation: &'static str) -> impl FnOnce(StackError) -> Self {
        move |source| BootstrapError::Netlink { operation, source }
    }

    pub(crate) fn creation(
        interface: impl ToString,
        step: &'static str,
    ) -> impl FnOnce(StackError) -> Self {
        let interface = interface.to_string();
        move |source| BootstrapError::InterfaceCreation {
            interface,
            step,
            source,
        }
    }
}
