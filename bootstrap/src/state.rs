// SPDX-License-Identifier: Apache-2.0
// Copyright Polykube Authors

//! What a bootstrap run learns about the node.

use ipnet::Ipv4Net;
use net::eth::mac::Mac;
use net::interface::{InterfaceIndex, InterfaceName};
use std::fmt::Display;
use std::net::Ipv4Addr;

/// A gateway address and, once known, its link-layer address.
///
/// A gateway with no mac is "address known, link-layer pending".
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct GatewayInfo {
    /// The gateway address, with the prefix length of the subnet it serves.
    pub address: Ipv4Net,
    /// The gateway mac, if resolved.
    pub mac: Option<Mac>,
}

impl GatewayInfo {
    /// A gateway whose mac is not known yet.
    #[must_use]
    pub fn pending(address: Ipv4Net) -> Self {
        Self { address, mac: None }
    }

    /// True once the mac is known.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.mac.is_some()
    }
}

impl Display for GatewayInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.mac {
            Some(mac) => write!(f, "{} ({mac})", self.address),
            None => write!(f, "{} (mac pending)", self.address),
        }
    }
}

/// A snapshot of a local interface and the address it was selected for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InterfaceDescriptor {
    /// The interface name.
    pub name: InterfaceName,
    /// The interface index.
    pub index: InterfaceIndex,
    /// The address of interest, with its prefix length.
    pub address: Ipv4Net,
    /// The interface mac, if it has one.
    pub mac: Option<Mac>,
}

impl Display for InterfaceDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (index {}, {})", self.name, self.index, self.address)
    }
}

/// The addressing of a node, filled in progressively by a bootstrap run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeTopologyState {
    /// The node name.
    pub node: String,
    /// The pod subnet of the node.
    pub pod_cidr: Ipv4Net,
    /// The gateway pods use; its mac is back-filled once the router exists.
    pub pod_gateway: GatewayInfo,
    /// The interface owning the node's internal address.
    pub external: InterfaceDescriptor,
    /// The local tunnel endpoint address, with the pool's prefix length.
    pub vtep: Ipv4Net,
    /// The next hop of the node's default route.
    pub uplink_gateway: GatewayInfo,
    /// The overlay device, once created.
    pub vxlan: Option<InterfaceDescriptor>,
}

/// What it takes to reach the pods of one peer node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PeerRoute {
    /// The peer node name.
    pub node: String,
    /// The pod subnet of the peer.
    pub pod_cidr: Ipv4Net,
    /// The tunnel endpoint of the peer.
    pub vtep: Ipv4Addr,
    /// The internal address of the peer, the outer destination of tunnelled frames.
    pub node_ip: Ipv4Addr,
}

impl Display for PeerRoute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {} via {} (node {})",
            self.node, self.pod_cidr, self.vtep, self.node_ip
        )
    }
}
