// SPDX-License-Identifier: Apache-2.0
// Copyright Polykube Authors

use ipnet::Ipv4Net;
use rtnetlink::packet_route::AddressFamily;
use rtnetlink::packet_route::address::{AddressAttribute, AddressMessage};
use std::net::IpAddr;

/// Decode the IPv4 address (with prefix) carried by a `RTM_NEWADDR` message.
///
/// `IFA_LOCAL` is preferred since `IFA_ADDRESS` holds the peer on point-to-point links.
pub(crate) fn ipv4_from_message(message: &AddressMessage) -> Option<Ipv4Net> {
    if message.header.family != AddressFamily::Inet {
        return None;
    }
    let pick = |local: bool| {
        message.attributes.iter().find_map(|attribute| match attribute {
            AddressAttribute::Local(IpAddr::V4(ip)) if local => Some(*ip),
            AddressAttribute::Address(IpAddr::V4(ip)) if !local => Some(*ip),
            _ => None,
        })
    };
    let ip = pick(true).or_else(|| pick(false))?;
    Ipv4Net::new(ip, message.header.prefix_len).ok()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn message(prefix_len: u8, attributes: Vec<AddressAttribute>) -> AddressMessage {
        let mut message = AddressMessage::default();
        message.header.family = AddressFamily::Inet;
        message.header.prefix_len = prefix_len;
        message.attributes = attributes;
        message
    }

    #[test]
    fn local_wins_over_peer() {
        let m = message(
            24,
            vec![
                AddressAttribute::Address(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 9))),
                AddressAttribute::Local(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1))),
            ],
        );
        assert_eq!(ipv4_from_message(&m), Some("10.0.0.1/24".parse().unwrap()));
    }

    #[test]
    fn address_is_used_without_local() {
        let m = message(
            16,
            vec![AddressAttribute::Address(IpAddr::V4(Ipv4Addr::new(192, 168, 3, 4)))],
        );
        assert_eq!(ipv4_from_message(&m), Some("192.168.3.4/16".parse().unwrap()));
    }

    #[test]
    fn other_families_are_ignored() {
        let mut m = message(64, vec![]);
        m.header.family = AddressFamily::Inet6;
        assert_eq!(ipv4_from_message(&m), None);
    }
}
