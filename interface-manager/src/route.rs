// SPDX-License-Identifier: Apache-2.0
// Copyright Polykube Authors

use crate::stack::{ProbeRoute, StackError};
use net::interface::InterfaceIndex;
use rtnetlink::packet_route::AddressFamily;
use rtnetlink::packet_route::route::{RouteAddress, RouteAttribute, RouteMessage};
use std::net::Ipv4Addr;

/// Build the `RTM_GETROUTE` query equivalent to `ip route get <destination>`.
pub(crate) fn probe_message(destination: Ipv4Addr) -> RouteMessage {
    let mut message = RouteMessage::default();
    message.header.address_family = AddressFamily::Inet;
    message.header.destination_prefix_length = 32;
    message
        .attributes
        .push(RouteAttribute::Destination(RouteAddress::Inet(destination)));
    message
}

pub(crate) fn probe_from_message(message: &RouteMessage) -> Result<ProbeRoute, StackError> {
    let mut oif = None;
    let mut gateway = None;
    for attribute in &message.attributes {
        match attribute {
            RouteAttribute::Oif(index) => oif = Some(*index),
            RouteAttribute::Gateway(RouteAddress::Inet(ip)) => gateway = Some(*ip),
            _ => {}
        }
    }
    let oif = oif.ok_or_else(|| StackError::Unusable {
        what: "route",
        detail: "no output interface".to_string(),
    })?;
    let oif = InterfaceIndex::try_new(oif).map_err(|e| StackError::Unusable {
        what: "route",
        detail: e.to_string(),
    })?;
    Ok(ProbeRoute { oif, gateway })
}
