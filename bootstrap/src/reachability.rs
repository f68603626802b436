// SPDX-License-Identifier: Apache-2.0
// Copyright Polykube Authors

//! Cross-node reachability.
//!
//! Pods of a peer node are reached through the overlay: the router sends their subnet to the
//! peer's VTEP out of its VXLAN-facing port, and the VXLAN device floods to the peer's internal
//! address thanks to an all-zeros forwarding entry.  Membership is read once; nodes joining later
//! need a new run.

use crate::error::BootstrapError;
use crate::ordinal::NodeOrdinals;
use crate::resolver::{derive_vtep_address, node_internal_ip, resolve_pod_subnet};
use crate::state::{InterfaceDescriptor, PeerRoute};
use cluster::ClusterNodeInfo;
use cube::RouterApi;
use cube::models::RouterRoute;
use interface_manager::{FdbEntry, NetworkStack};
use ipnet::Ipv4Net;
use net::eth::mac::Mac;
use tracing::{debug, info};

/// The peers of `local` among `nodes` and how to reach each of them.
///
/// # Errors
///
/// Fails on the first peer whose pod subnet, internal address or VTEP cannot be derived.
pub fn plan_peer_routes(
    local: &str,
    nodes: &[ClusterNodeInfo],
    vtep_pool: Ipv4Net,
    ordinals: &dyn NodeOrdinals,
) -> Result<Vec<PeerRoute>, BootstrapError> {
    nodes
        .iter()
        .filter(|node| node.name != local && ordinals.covers(&node.name))
        .map(|node| {
            Ok::<_, BootstrapError>(PeerRoute {
                node: node.name.clone(),
                pod_cidr: resolve_pod_subnet(node)?,
                vtep: derive_vtep_address(&node.name, vtep_pool, ordinals)?.addr(),
                node_ip: node_internal_ip(node)?,
            })
        })
        .collect()
}

/// Make the pods of `peer` reachable: one forwarding entry on the overlay device, one route on
/// the router.
///
/// The two are independent; a failure of the second leaves the first in place.
///
/// # Errors
///
/// Fails with [`BootstrapError::Netlink`] if the forwarding entry is refused and with
/// [`BootstrapError::ManagementApi`] if the route is.
pub async fn add_peer_reachability<S: NetworkStack>(
    stack: &S,
    router_api: &dyn RouterApi,
    router: &str,
    vxlan: &InterfaceDescriptor,
    router_port: &str,
    peer: &PeerRoute,
) -> Result<(), BootstrapError> {
    stack
        .append_fdb(&FdbEntry {
            dev: vxlan.index,
            mac: Mac::ZERO,
            dst: peer.node_ip,
        })
        .await
        .map_err(BootstrapError::netlink("append overlay forwarding entry"))?;
    router_api
        .create_router_route(
            router,
            &RouterRoute {
                network: peer.pod_cidr.to_string(),
                nexthop: peer.vtep.to_string(),
                interface: router_port.to_string(),
                pathcost: None,
            },
        )
        .await?;
    debug!("peer {peer} reachable");
    Ok(())
}

/// Add reachability to every peer, one after the other.
///
/// # Errors
///
/// Stops at the first failing peer.
pub async fn provision<S: NetworkStack>(
    stack: &S,
    router_api: &dyn RouterApi,
    router: &str,
    vxlan: &InterfaceDescriptor,
    router_port: &str,
    peers: &[PeerRoute],
) -> Result<(), BootstrapError> {
    for peer in peers {
        add_peer_reachability(stack, router_api, router, vxlan, router_port, peer).await?;
    }
    info!("{} peers reachable through {}", peers.len(), vxlan.name);
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::ordinal::{NamePrefixOrdinals, StaticOrdinals};
    use pretty_assertions::assert_eq;
    use std::net::Ipv4Addr;

    fn node(name: &str, ip: &str, cidr: &str) -> ClusterNodeInfo {
        ClusterNodeInfo {
            name: name.to_string(),
            internal_ip: Some(ip.to_string()),
            pod_cidr: Some(cidr.to_string()),
        }
    }

    fn cluster() -> Vec<ClusterNodeInfo> {
        vec![
            ClusterNodeInfo {
                name: "master".into(),
                internal_ip: Some("192.168.1.10".into()),
                pod_cidr: None,
            },
            node("worker1", "192.168.1.11", "10.10.1.0/24"),
            node("worker2", "192.168.1.12", "10.10.2.0/24"),
            node("worker3", "192.168.1.13", "10.10.3.0/24"),
        ]
    }

    #[test]
    fn peers_exclude_self_and_non_workers() {
        let ordinals = NamePrefixOrdinals::new("worker");
        let peers =
            plan_peer_routes("worker1", &cluster(), "10.18.0.0/16".parse().unwrap(), &ordinals)
                .unwrap();
        assert_eq!(
            peers,
            vec![
                PeerRoute {
                    node: "worker2".into(),
                    pod_cidr: "10.10.2.0/24".parse().unwrap(),
                    vtep: Ipv4Addr::new(10, 18, 0, 2),
                    node_ip: Ipv4Addr::new(192, 168, 1, 12),
                },
                PeerRoute {
                    node: "worker3".into(),
                    pod_cidr: "10.10.3.0/24".parse().unwrap(),
                    vtep: Ipv4Addr::new(10, 18, 0, 3),
                    node_ip: Ipv4Addr::new(192, 168, 1, 13),
                },
            ]
        );
    }

    #[test]
    fn explicit_ordinals_select_the_peers() {
        let ordinals = StaticOrdinals::default()
            .with("worker1", 10)
            .with("worker3", 30);
        let peers =
            plan_peer_routes("worker1", &cluster(), "10.18.0.0/16".parse().unwrap(), &ordinals)
                .unwrap();
        assert_eq!(peers.len(), 1);
        assert_eq!(peers[0].vtep, Ipv4Addr::new(10, 18, 0, 30));
    }

    #[test]
    fn broken_peer_aborts_the_plan() {
        let mut nodes = cluster();
        nodes.push(node("worker4", "not-an-ip", "10.10.4.0/24"));
        let ordinals = NamePrefixOrdinals::new("worker");
        assert!(matches!(
            plan_peer_routes("worker1", &nodes, "10.18.0.0/16".parse().unwrap(), &ordinals),
            Err(BootstrapError::AddressFormat { .. })
        ));
    }
}
