// SPDX-License-Identifier: Apache-2.0
// Copyright Polykube Authors

use crate::stack::{Link, VxlanSpec};
use net::eth::mac::Mac;
use net::interface::{InterfaceIndex, InterfaceName};
use rtnetlink::LinkVxlan;
use rtnetlink::packet_route::link::{InfoData, InfoVxlan, LinkAttribute, LinkMessage};
use tracing::debug;

/// Decode a `RTM_NEWLINK` message.
///
/// Links whose name we cannot represent are skipped rather than failing the whole listing.
pub(crate) fn link_from_message(message: &LinkMessage) -> Option<Link> {
    let Ok(index) = InterfaceIndex::try_new(message.header.index) else {
        debug!("ignoring link message without index");
        return None;
    };
    let mut name = None;
    let mut mac = None;
    for attribute in &message.attributes {
        match attribute {
            LinkAttribute::IfName(raw) => match InterfaceName::try_from(raw.as_str()) {
                Ok(parsed) => name = Some(parsed),
                Err(e) => debug!("ignoring link {index}: {e}"),
            },
            LinkAttribute::Address(raw) => mac = Mac::try_from(raw.as_slice()).ok(),
            _ => {}
        }
    }
    Some(Link {
        index,
        name: name?,
        mac,
    })
}

pub(crate) fn vxlan_message(spec: &VxlanSpec) -> LinkMessage {
    LinkVxlan::new(spec.name.as_ref(), spec.vni.as_u32())
        .set_info_data(InfoData::Vxlan(vec![
            InfoVxlan::Id(spec.vni.as_u32()),
            InfoVxlan::Link(spec.underlay.to_u32()),
            InfoVxlan::Port(spec.port),
        ]))
        .build()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::stack::VxlanSpecBuilder;
    use net::vxlan::{VXLAN_PORT, Vni};
    use rtnetlink::packet_route::link::LinkInfo;

    #[test]
    fn links_decode_name_and_mac() {
        let mut message = LinkMessage::default();
        message.header.index = 3;
        message
            .attributes
            .push(LinkAttribute::IfName("eth0".to_string()));
        message
            .attributes
            .push(LinkAttribute::Address(vec![2, 0, 0, 0, 0, 1]));
        let link = link_from_message(&message).unwrap();
        assert_eq!(link.index.to_u32(), 3);
        assert_eq!(link.name.as_ref(), "eth0");
        assert_eq!(link.mac, Some(Mac([2, 0, 0, 0, 0, 1])));
    }

    #[test]
    fn links_without_ethernet_address_have_no_mac() {
        let mut message = LinkMessage::default();
        message.header.index = 1;
        message.attributes.push(LinkAttribute::IfName("lo".into()));
        message.attributes.push(LinkAttribute::Address(vec![]));
        assert_eq!(link_from_message(&message).unwrap().mac, None);
    }

    #[test]
    fn unrepresentable_links_are_skipped() {
        let mut message = LinkMessage::default();
        message.header.index = 0;
        message.attributes.push(LinkAttribute::IfName("eth0".into()));
        assert!(link_from_message(&message).is_none());
        message.header.index = 9;
        message.attributes = vec![LinkAttribute::IfName("bad name".into())];
        assert!(link_from_message(&message).is_none());
    }

    #[test]
    fn vxlan_message_carries_vni_port_and_underlay() {
        let spec = VxlanSpecBuilder::default()
            .name("vxlan0".try_into().unwrap())
            .vni(Vni::new_checked(42).unwrap())
            .underlay(InterfaceIndex::try_new(2).unwrap())
            .build()
            .unwrap();
        assert_eq!(spec.port, VXLAN_PORT);
        let message = vxlan_message(&spec);
        assert!(
            message
                .attributes
                .contains(&LinkAttribute::IfName("vxlan0".into()))
        );
        let info = message
            .attributes
            .iter()
            .find_map(|a| match a {
                LinkAttribute::LinkInfo(info) => Some(info),
                _ => None,
            })
            .unwrap();
        let data = info
            .iter()
            .find_map(|i| match i {
                LinkInfo::Data(InfoData::Vxlan(data)) => Some(data),
                _ => None,
            })
            .unwrap();
        assert!(data.contains(&InfoVxlan::Id(42)));
        assert!(data.contains(&InfoVxlan::Link(2)));
        assert!(data.contains(&InfoVxlan::Port(4789)));
    }
}
