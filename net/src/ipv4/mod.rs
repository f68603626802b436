// SPDX-License-Identifier: Apache-2.0
// Copyright Polykube Authors

//! IPv4 prefix arithmetic.
//!
//! All helpers are checked: stepping past either end of the IPv4 space yields `None` rather than
//! wrapping.

use ipnet::{IpNet, Ipv4Net};
use std::net::Ipv4Addr;

/// Errors produced when parsing an IPv4 CIDR.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CidrError {
    /// The text is not a CIDR at all.
    #[error("{0:?} is not in the format w.x.y.z/n")]
    Malformed(String),
    /// The text is an IPv6 CIDR.
    #[error("{0:?} is an IPv6 prefix, only IPv4 is supported")]
    NotIpv4(String),
}

/// Parse `text` as an IPv4 CIDR and return the network it denotes.
///
/// Host bits are cleared, so `10.10.3.7/24` yields `10.10.3.0/24`.
///
/// # Errors
///
/// Fails if the text is not a CIDR or names an IPv6 prefix.
pub fn parse_network(text: &str) -> Result<Ipv4Net, CidrError> {
    match text.trim().parse::<IpNet>() {
        Ok(IpNet::V4(net)) => Ok(net.trunc()),
        Ok(IpNet::V6(_)) => Err(CidrError::NotIpv4(text.to_string())),
        Err(_) => Err(CidrError::Malformed(text.to_string())),
    }
}

/// The broadcast address of `net`: its network address with every host bit set.
#[must_use]
pub fn broadcast(net: Ipv4Net) -> Ipv4Addr {
    Ipv4Addr::from(u32::from(net.network()) | u32::from(net.hostmask()))
}

/// The address immediately following `addr`.
#[must_use]
pub fn next(addr: Ipv4Addr) -> Option<Ipv4Addr> {
    advance(addr, 1)
}

/// The address immediately preceding `addr`.
#[must_use]
pub fn prev(addr: Ipv4Addr) -> Option<Ipv4Addr> {
    u32::from(addr).checked_sub(1).map(Ipv4Addr::from)
}

/// The address `steps` positions after `addr`.
#[must_use]
pub fn advance(addr: Ipv4Addr, steps: u32) -> Option<Ipv4Addr> {
    u32::from(addr).checked_add(steps).map(Ipv4Addr::from)
}

/// Pair `addr` with the prefix length of `net`.
///
/// # Panics
///
/// Never: the prefix length of an existing [`Ipv4Net`] is always legal.
#[must_use]
pub fn with_prefix_of(addr: Ipv4Addr, net: Ipv4Net) -> Ipv4Net {
    #[allow(clippy::expect_used)] // prefix length comes from a valid Ipv4Net
    Ipv4Net::new(addr, net.prefix_len()).expect("prefix length of a valid network")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parse_clears_host_bits() {
        assert_eq!(
            parse_network("10.10.3.7/24").unwrap(),
            "10.10.3.0/24".parse::<Ipv4Net>().unwrap()
        );
        assert!(matches!(parse_network("fd00::/64"), Err(CidrError::NotIpv4(_))));
        assert!(matches!(parse_network("10.10.3.0"), Err(CidrError::Malformed(_))));
        assert!(matches!(parse_network("10.10.3.0/33"), Err(CidrError::Malformed(_))));
    }

    #[test]
    fn broadcast_sets_every_host_bit() {
        let net: Ipv4Net = "10.10.3.0/24".parse().unwrap();
        assert_eq!(broadcast(net), Ipv4Addr::new(10, 10, 3, 255));
        let net: Ipv4Net = "10.18.0.0/16".parse().unwrap();
        assert_eq!(broadcast(net), Ipv4Addr::new(10, 18, 255, 255));
        let net: Ipv4Net = "192.168.1.1/32".parse().unwrap();
        assert_eq!(broadcast(net), Ipv4Addr::new(192, 168, 1, 1));
    }

    #[test]
    fn stepping_is_checked_at_the_edges() {
        assert_eq!(next(Ipv4Addr::BROADCAST), None);
        assert_eq!(prev(Ipv4Addr::UNSPECIFIED), None);
        assert_eq!(next(Ipv4Addr::new(10, 0, 0, 255)), Some(Ipv4Addr::new(10, 0, 1, 0)));
        assert_eq!(prev(Ipv4Addr::new(10, 0, 1, 0)), Some(Ipv4Addr::new(10, 0, 0, 255)));
        assert_eq!(advance(Ipv4Addr::new(10, 18, 0, 0), 300), Some(Ipv4Addr::new(10, 18, 1, 44)));
    }

    #[test]
    fn with_prefix_keeps_the_address() {
        let net: Ipv4Net = "10.10.3.0/24".parse().unwrap();
        let gw = with_prefix_of(Ipv4Addr::new(10, 10, 3, 254), net);
        assert_eq!(gw.to_string(), "10.10.3.254/24");
    }
}
