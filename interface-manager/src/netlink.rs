// SPDX-License-Identifier: Apache-2.0
// Copyright Polykube Authors

//! [`NetworkStack`] over rtnetlink.

use crate::stack::{FdbEntry, Link, Neighbour, NetworkStack, ProbeRoute, StackError, VxlanSpec};
use crate::{Manager, address, link, neighbour, route};
use futures::{StreamExt, TryStreamExt};
use ipnet::Ipv4Net;
use net::interface::InterfaceIndex;
use rtnetlink::LinkUnspec;
use rtnetlink::packet_core::{
    NLM_F_ACK, NLM_F_APPEND, NLM_F_CREATE, NLM_F_REQUEST, NetlinkMessage, NetlinkPayload,
};
use rtnetlink::packet_route::RouteNetlinkMessage;
use std::net::{IpAddr, Ipv4Addr};
use tracing::{debug, trace};

impl Manager {
    /// Send a hand built request and collect the inner messages of the kernel's answer.
    async fn request(
        &self,
        message: RouteNetlinkMessage,
        flags: u16,
    ) -> Result<Vec<RouteNetlinkMessage>, StackError> {
        let mut request = NetlinkMessage::from(message);
        request.header.flags = flags;
        let mut handle = (*self.handle).clone();
        let mut response = std::pin::pin!(handle.request(request)?);
        let mut answer = vec![];
        while let Some(reply) = response.next().await {
            match reply.payload {
                NetlinkPayload::Error(err) if err.code.is_some() => {
                    return Err(rtnetlink::Error::NetlinkError(err).into());
                }
                NetlinkPayload::InnerMessage(inner) => answer.push(inner),
                _ => {}
            }
        }
        Ok(answer)
    }
}

impl NetworkStack for Manager {
    async fn links(&self) -> Result<Vec<Link>, StackError> {
        let mut links = vec![];
        let mut response = self.handle.link().get().execute();
        while let Some(message) = response.try_next().await? {
            if let Some(link) = link::link_from_message(&message) {
                links.push(link);
            }
        }
        trace!("observed {} links", links.len());
        Ok(links)
    }

    async fn ipv4_addresses(&self, index: InterfaceIndex) -> Result<Vec<Ipv4Net>, StackError> {
        let mut addresses = vec![];
        let mut response = self
            .handle
            .address()
            .get()
            .set_link_index_filter(index.to_u32())
            .execute();
        while let Some(message) = response.try_next().await? {
            if message.header.index != index.to_u32() {
                continue;
            }
            if let Some(address) = address::ipv4_from_message(&message) {
                addresses.push(address);
            }
        }
        Ok(addresses)
    }

    async fn routes_to(&self, destination: Ipv4Addr) -> Result<Vec<ProbeRoute>, StackError> {
        let query = RouteNetlinkMessage::GetRoute(route::probe_message(destination));
        let mut routes = vec![];
        for reply in self.request(query, NLM_F_REQUEST).await? {
            if let RouteNetlinkMessage::NewRoute(message) = reply {
                routes.push(route::probe_from_message(&message)?);
            }
        }
        debug!("routes to {destination}: {routes:?}");
        if routes.is_empty() {
            return Err(StackError::NoRoute(destination));
        }
        Ok(routes)
    }

    async fn ipv4_neighbours(&self, index: InterfaceIndex) -> Result<Vec<Neighbour>, StackError> {
        let mut neighbours = vec![];
        let mut response = self.handle.neighbours().get().execute();
        while let Some(message) = response.try_next().await? {
            if let Some(neighbour) = neighbour::neighbour_from_message(&message, index) {
                neighbours.push(neighbour);
            }
        }
        Ok(neighbours)
    }

    async fn create_vxlan(&self, spec: &VxlanSpec) -> Result<(), StackError> {
        debug!("creating vxlan {} (vni {})", spec.name, spec.vni);
        self.handle
            .link()
            .add(link::vxlan_message(spec))
            .execute()
            .await?;
        Ok(())
    }

    async fn set_up(&self, index: InterfaceIndex) -> Result<(), StackError> {
        self.handle
            .link()
            .set(LinkUnspec::new_with_index(index.to_u32()).up().build())
            .execute()
            .await?;
        Ok(())
    }

    async fn add_address(&self, index: InterfaceIndex, address: Ipv4Net) -> Result<(), StackError> {
        self.handle
            .address()
            .add(index.to_u32(), IpAddr::V4(address.addr()), address.prefix_len())
            .execute()
            .await?;
        Ok(())
    }

    async fn append_fdb(&self, entry: &FdbEntry) -> Result<(), StackError> {
        debug!("appending fdb {} dst {} on {}", entry.mac, entry.dst, entry.dev);
        let message = RouteNetlinkMessage::NewNeighbour(neighbour::fdb_message(entry));
        self.request(
            message,
            NLM_F_REQUEST | NLM_F_ACK | NLM_F_CREATE | NLM_F_APPEND,
        )
        .await?;
        Ok(())
    }
}
