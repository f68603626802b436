// SPDX-License-Identifier: Apache-2.0
// Copyright Polykube Authors

//! The operations the bootstrap needs from the kernel, and the data they exchange.

use derive_builder::Builder;
use ipnet::Ipv4Net;
use net::eth::mac::Mac;
use net::interface::{InterfaceIndex, InterfaceName};
use net::vxlan::{VXLAN_PORT, Vni};
use std::future::Future;
use std::net::Ipv4Addr;

/// A network interface as observed in the kernel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Link {
    /// The kernel-assigned index of the interface.
    pub index: InterfaceIndex,
    /// The name of the interface.
    pub name: InterfaceName,
    /// The hardware address of the interface, if it has a six octet one.
    pub mac: Option<Mac>,
}

/// The outcome of asking the kernel which way it would send a packet.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ProbeRoute {
    /// The interface the packet would leave through.
    pub oif: InterfaceIndex,
    /// The next hop, if the destination is not directly connected.
    pub gateway: Option<Ipv4Addr>,
}

/// An IPv4 entry of the kernel neighbour (ARP) table.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Neighbour {
    /// The interface the neighbour was learned on.
    pub index: InterfaceIndex,
    /// The protocol address of the neighbour.
    pub ip: Ipv4Addr,
    /// The link-layer address of the neighbour, absent while resolution is pending or failed.
    pub mac: Option<Mac>,
}

/// The properties of a VXLAN device to create.
#[derive(Builder, Clone, Debug, PartialEq, Eq)]
pub struct VxlanSpec {
    /// The name of the new device.
    pub name: InterfaceName,
    /// The network identifier carried in every encapsulated frame.
    pub vni: Vni,
    /// The UDP destination port of encapsulated frames.
    #[builder(default = "VXLAN_PORT")]
    pub port: u16,
    /// The underlay interface encapsulated frames leave through.
    pub underlay: InterfaceIndex,
}

/// A static forwarding entry on a VXLAN device.
///
/// Frames to `mac` are encapsulated and sent to `dst`.  With [`Mac::ZERO`] the entry is a default
/// destination and the device floods unknown and broadcast frames to every such `dst`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FdbEntry {
    /// The VXLAN device owning the entry.
    pub dev: InterfaceIndex,
    /// The inner destination mac.
    pub mac: Mac,
    /// The remote tunnel endpoint.
    pub dst: Ipv4Addr,
}

/// Errors reported while talking to the networking stack.
#[derive(Debug, thiserror::Error)]
pub enum StackError {
    /// The netlink socket could not be opened.
    #[error("failed to open netlink socket: {0}")]
    Socket(#[source] std::io::Error),
    /// The kernel rejected a request or the connection failed.
    #[error(transparent)]
    Netlink(#[from] rtnetlink::Error),
    /// The kernel answered with something we cannot use.
    #[error("unusable {what} reported by the kernel: {detail}")]
    Unusable {
        /// The kind of object being decoded.
        what: &'static str,
        /// What was wrong with it.
        detail: String,
    },
    /// The kernel has no route towards the destination.
    #[error("no route to {0}")]
    NoRoute(Ipv4Addr),
    /// The request conflicts with the current state of the stack.
    #[error("request rejected: {0}")]
    Rejected(String),
}

/// Read and write access to the networking stack of one network namespace.
pub trait NetworkStack {
    /// List every interface.
    fn links(&self) -> impl Future<Output = Result<Vec<Link>, StackError>>;

    /// Find an interface by name.
    fn link_by_name(
        &self,
        name: &InterfaceName,
    ) -> impl Future<Output = Result<Option<Link>, StackError>> {
        async move {
            Ok(self
                .links()
                .await?
                .into_iter()
                .find(|link| &link.name == name))
        }
    }

    /// List the IPv4 addresses, with their prefix length, assigned to an interface.
    fn ipv4_addresses(
        &self,
        index: InterfaceIndex,
    ) -> impl Future<Output = Result<Vec<Ipv4Net>, StackError>>;

    /// Ask the kernel how it would reach `destination`.
    ///
    /// The kernel normally answers with a single route; every route it reports is returned.
    fn routes_to(
        &self,
        destination: Ipv4Addr,
    ) -> impl Future<Output = Result<Vec<ProbeRoute>, StackError>>;

    /// List the IPv4 neighbours learned on an interface.
    fn ipv4_neighbours(
        &self,
        index: InterfaceIndex,
    ) -> impl Future<Output = Result<Vec<Neighbour>, StackError>>;

    /// Create a VXLAN device.  The device is left down.
    fn create_vxlan(&self, spec: &VxlanSpec) -> impl Future<Output = Result<(), StackError>>;

    /// Set an interface administratively up.
    fn set_up(&self, index: InterfaceIndex) -> impl Future<Output = Result<(), StackError>>;

    /// Assign an IPv4 address to an interface.
    fn add_address(
        &self,
        index: InterfaceIndex,
        address: Ipv4Net,
    ) -> impl Future<Output = Result<(), StackError>>;

    /// Append a static forwarding entry, keeping any entry for the same mac.
    fn append_fdb(&self, entry: &FdbEntry) -> impl Future<Output = Result<(), StackError>>;
}
