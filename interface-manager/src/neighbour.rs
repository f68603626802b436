// SPDX-License-Identifier: Apache-2.0
// Copyright Polykube Authors

use crate::stack::{FdbEntry, Neighbour};
use net::eth::mac::Mac;
use net::interface::InterfaceIndex;
use rtnetlink::packet_route::AddressFamily;
use rtnetlink::packet_route::neighbour::{
    NeighbourAddress, NeighbourAttribute, NeighbourFlags, NeighbourMessage, NeighbourState,
};

/// Decode an IPv4 entry of the neighbour table learned on `index`.
pub(crate) fn neighbour_from_message(
    message: &NeighbourMessage,
    index: InterfaceIndex,
) -> Option<Neighbour> {
    if message.header.family != AddressFamily::Inet || message.header.ifindex != index.to_u32() {
        return None;
    }
    let mut ip = None;
    let mut mac = None;
    for attribute in &message.attributes {
        match attribute {
            NeighbourAttribute::Destination(NeighbourAddress::Inet(addr)) => ip = Some(*addr),
            NeighbourAttribute::LinkLocalAddress(raw) => mac = Mac::try_from(raw.as_slice()).ok(),
            _ => {}
        }
    }
    Some(Neighbour {
        index,
        ip: ip?,
        mac,
    })
}

/// Build the `RTM_NEWNEIGH` message equivalent to
/// `bridge fdb append <mac> dev <dev> dst <dst> self permanent`.
pub(crate) fn fdb_message(entry: &FdbEntry) -> NeighbourMessage {
    let mut message = NeighbourMessage::default();
    message.header.family = AddressFamily::Bridge;
    message.header.ifindex = entry.dev.to_u32();
    message.header.state = NeighbourState::Permanent;
    message.header.flags = NeighbourFlags::Own;
    message
        .attributes
        .push(NeighbourAttribute::LinkLocalAddress(entry.mac.octets().to_vec()));
    message
        .attributes
        .push(NeighbourAttribute::Destination(NeighbourAddress::Inet(entry.dst)));
    message
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn index(raw: u32) -> InterfaceIndex {
        InterfaceIndex::try_new(raw).unwrap()
    }

    #[test]
    fn neighbours_are_filtered_by_interface_and_family() {
        let mut message = NeighbourMessage::default();
        message.header.family = AddressFamily::Inet;
        message.header.ifindex = 2;
        message.attributes.push(NeighbourAttribute::Destination(NeighbourAddress::Inet(
            Ipv4Addr::new(192, 168, 1, 1),
        )));
        message
            .attributes
            .push(NeighbourAttribute::LinkLocalAddress(vec![0xaa, 0, 0, 0, 0, 1]));
        let neighbour = neighbour_from_message(&message, index(2)).unwrap();
        assert_eq!(neighbour.ip, Ipv4Addr::new(192, 168, 1, 1));
        assert_eq!(neighbour.mac, Some(Mac([0xaa, 0, 0, 0, 0, 1])));
        assert!(neighbour_from_message(&message, index(3)).is_none());
        message.header.family = AddressFamily::Inet6;
        assert!(neighbour_from_message(&message, index(2)).is_none());
    }

    #[test]
    fn fdb_entries_are_permanent_bridge_neighbours() {
        let entry = FdbEntry {
            dev: index(7),
            mac: Mac::ZERO,
            dst: Ipv4Addr::new(192, 168, 1, 11),
        };
        let message = fdb_message(&entry);
        assert_eq!(message.header.family, AddressFamily::Bridge);
        assert_eq!(message.header.ifindex, 7);
        assert_eq!(message.header.state, NeighbourState::Permanent);
        assert_eq!(message.header.flags, NeighbourFlags::Own);
        assert_eq!(
            message.attributes,
            vec![
                NeighbourAttribute::LinkLocalAddress(vec![0; 6]),
                NeighbourAttribute::Destination(NeighbourAddress::Inet(Ipv4Addr::new(
                    192, 168, 1, 11
                ))),
            ]
        );
    }
}
