// SPDX-License-Identifier: Apache-2.0
// Copyright Polykube Authors

//! Node addressing resolver.
//!
//! Derives the addressing of a node from cluster metadata and the state of the local networking
//! stack.  Nothing here mutates the kernel or the network functions.

use crate::config::EnvironmentConfig;
use crate::error::BootstrapError;
use crate::ordinal::NodeOrdinals;
use crate::state::{GatewayInfo, InterfaceDescriptor, NodeTopologyState};
use cluster::ClusterNodeInfo;
use cube::RouterApi;
use interface_manager::{NetworkStack, StackError};
use ipnet::Ipv4Net;
use net::eth::mac::Mac;
use net::ipv4;
use std::net::Ipv4Addr;
use tracing::{debug, info, warn};

/// The destination whose route designates the uplink gateway.
pub const PROBE_ADDRESS: Ipv4Addr = Ipv4Addr::new(1, 0, 0, 0);

/// Parse the pod subnet the cluster assigned to `node`.
///
/// # Errors
///
/// Fails with [`BootstrapError::AddressFormat`] if the node has no pod subnet or it is not an IPv4
/// prefix.
pub fn resolve_pod_subnet(node: &ClusterNodeInfo) -> Result<Ipv4Net, BootstrapError> {
    let subject = || format!("pod cidr of node {}", node.name);
    let text = node
        .pod_cidr
        .as_deref()
        .ok_or_else(|| BootstrapError::address_format(subject(), "", "missing"))?;
    ipv4::parse_network(text).map_err(|e| BootstrapError::address_format(subject(), text, e))
}

/// Parse the internal address the cluster reports for `node`.
///
/// # Errors
///
/// Fails with [`BootstrapError::AddressFormat`] if the node has no internal address or it is not
/// IPv4.
pub fn node_internal_ip(node: &ClusterNodeInfo) -> Result<Ipv4Addr, BootstrapError> {
    let subject = || format!("internal ip of node {}", node.name);
    let text = node
        .internal_ip
        .as_deref()
        .ok_or_else(|| BootstrapError::address_format(subject(), "", "missing"))?;
    text.trim()
        .parse()
        .map_err(|e| BootstrapError::address_format(subject(), text, e))
}

/// The gateway of a pod subnet: the address just below its broadcast address.
///
/// # Errors
///
/// Fails with [`BootstrapError::AddressDerivation`] for /31 and /32 subnets, which leave no room
/// for a gateway distinct from the network address.
pub fn derive_pod_gateway(node: &str, pod_cidr: Ipv4Net) -> Result<GatewayInfo, BootstrapError> {
    if pod_cidr.prefix_len() > 30 {
        return Err(BootstrapError::derivation(
            node,
            "pod gateway",
            format!("pod cidr {pod_cidr} is too small"),
        ));
    }
    let gateway = ipv4::prev(ipv4::broadcast(pod_cidr)).ok_or_else(|| {
        BootstrapError::derivation(node, "pod gateway", format!("{pod_cidr} has no broadcast"))
    })?;
    Ok(GatewayInfo::pending(ipv4::with_prefix_of(gateway, pod_cidr)))
}

/// Find the local interface owning the internal address of `node`.
///
/// Interfaces are scanned in kernel order; the first one owning the address wins.
///
/// # Errors
///
/// Fails with [`BootstrapError::InterfaceNotFound`] if no interface owns the address.
pub async fn resolve_external_interface<S: NetworkStack>(
    stack: &S,
    node: &ClusterNodeInfo,
) -> Result<InterfaceDescriptor, BootstrapError> {
    let internal_ip = node_internal_ip(node)?;
    let links = stack
        .links()
        .await
        .map_err(BootstrapError::netlink("list interfaces"))?;
    for link in links {
        let addresses = stack
            .ipv4_addresses(link.index)
            .await
            .map_err(BootstrapError::netlink("list interface addresses"))?;
        if let Some(address) = addresses.into_iter().find(|a| a.addr() == internal_ip) {
            debug!("external interface of {} is {}", node.name, link.name);
            return Ok(InterfaceDescriptor {
                name: link.name,
                index: link.index,
                address,
                mac: link.mac,
            });
        }
    }
    warn!("no interface owns {internal_ip}");
    Err(BootstrapError::InterfaceNotFound {
        node: node.name.clone(),
        address: internal_ip,
    })
}

/// The tunnel endpoint address of `node`: the pool's network address advanced by the node's
/// ordinal, with the pool's prefix length.
///
/// # Errors
///
/// Fails with [`BootstrapError::AddressDerivation`] if the node has no ordinal or the ordinal
/// falls outside the pool.
pub fn derive_vtep_address(
    node: &str,
    pool: Ipv4Net,
    ordinals: &dyn NodeOrdinals,
) -> Result<Ipv4Net, BootstrapError> {
    let ordinal = ordinals.ordinal(node)?;
    let vtep = ipv4::advance(pool.network(), ordinal)
        .filter(|vtep| pool.contains(vtep))
        .ok_or_else(|| {
            BootstrapError::derivation(
                node,
                "vtep address",
                format!("ordinal {ordinal} is outside of pool {pool}"),
            )
        })?;
    Ok(ipv4::with_prefix_of(vtep, pool))
}

/// Find the next hop of the node's uplink and its mac.
///
/// The route towards [`PROBE_ADDRESS`] must be unique, leave through `external` and have a
/// gateway.  The gateway mac is read from the neighbour cache of `external`; no resolution is
/// triggered.
///
/// # Errors
///
/// Fails with [`BootstrapError::RouteAmbiguity`] if the route is missing, not unique, leaves
/// through another interface or has no gateway, and with [`BootstrapError::GatewayMacUnresolved`]
/// if the neighbour cache has no usable entry for the gateway.
pub async fn resolve_uplink_gateway<S: NetworkStack>(
    stack: &S,
    external: &InterfaceDescriptor,
) -> Result<GatewayInfo, BootstrapError> {
    let ambiguity = |reason: String| BootstrapError::RouteAmbiguity {
        probe: PROBE_ADDRESS,
        reason,
    };
    let routes = match stack.routes_to(PROBE_ADDRESS).await {
        Ok(routes) => routes,
        Err(StackError::NoRoute(_)) => return Err(ambiguity("no route".to_string())),
        Err(source) => {
            return Err(BootstrapError::Netlink {
                operation: "look up uplink route",
                source,
            });
        }
    };
    let [route] = routes.as_slice() else {
        return Err(ambiguity(format!(
            "expected exactly one route, found {}",
            routes.len()
        )));
    };
    if route.oif != external.index {
        return Err(ambiguity(format!(
            "route leaves through interface {}, expected {} ({})",
            route.oif, external.index, external.name
        )));
    }
    let gateway = route
        .gateway
        .ok_or_else(|| ambiguity(format!("route through {} has no gateway", external.name)))?;

    let neighbours = stack
        .ipv4_neighbours(external.index)
        .await
        .map_err(BootstrapError::netlink("list neighbours"))?;
    let mac = neighbours
        .iter()
        .filter(|n| n.ip == gateway)
        .find_map(|n| n.mac.filter(|mac| !mac.is_zero()))
        .ok_or_else(|| BootstrapError::GatewayMacUnresolved {
            gateway,
            interface: external.name.to_string(),
        })?;
    let address = ipv4::with_prefix_of(gateway, external.address);
    debug!("uplink gateway is {address} ({mac})");
    Ok(GatewayInfo {
        address,
        mac: Some(mac),
    })
}

/// Read the mac the router assigned to the port facing the bridge.
///
/// # Errors
///
/// Fails with [`BootstrapError::ManagementApi`] if the router cannot be read and with
/// [`BootstrapError::GatewayMacUnresolved`] if the port or its mac is missing.
pub async fn resolve_pod_gateway_mac(
    router_api: &dyn RouterApi,
    router: &str,
    port: &str,
    gateway: Ipv4Addr,
) -> Result<Mac, BootstrapError> {
    let state = router_api.read_router(router).await?;
    state
        .port(port)
        .and_then(|p| p.mac)
        .filter(|mac| !mac.is_zero())
        .ok_or_else(|| BootstrapError::GatewayMacUnresolved {
            gateway,
            interface: cube::port_peer(router, port),
        })
}

/// Resolve every address of the node that can be known before anything is created.
///
/// The pod gateway mac stays pending and no overlay device is recorded yet.
///
/// # Errors
///
/// Propagates the first failure of the individual resolution steps.
pub async fn resolve_node_addressing<S: NetworkStack>(
    stack: &S,
    node: &ClusterNodeInfo,
    config: &EnvironmentConfig,
    ordinals: &dyn NodeOrdinals,
) -> Result<NodeTopologyState, BootstrapError> {
    let pod_cidr = resolve_pod_subnet(node)?;
    let pod_gateway = derive_pod_gateway(&node.name, pod_cidr)?;
    let external = resolve_external_interface(stack, node).await?;
    let vtep = derive_vtep_address(&node.name, config.vtep_pool, ordinals)?;
    let uplink_gateway = resolve_uplink_gateway(stack, &external).await?;
    info!(
        "node {}: pod cidr {pod_cidr}, pod gateway {}, external {external}, vtep {vtep}, uplink {uplink_gateway}",
        node.name, pod_gateway.address
    );
    Ok(NodeTopologyState {
        node: node.name.clone(),
        pod_cidr,
        pod_gateway,
        external,
        vtep,
        uplink_gateway,
        vxlan: None,
    })
}
