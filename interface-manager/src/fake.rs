// SPDX-License-Identifier: Apache-2.0
// Copyright Polykube Authors

//! An in-memory [`NetworkStack`] for tests.
//!
//! It keeps just enough state to answer the queries the bootstrap makes and rejects the mutations
//! the kernel would reject (duplicate names, unknown interfaces, duplicate forwarding entries).

#![allow(clippy::missing_panics_doc)]

use crate::stack::{FdbEntry, Link, Neighbour, NetworkStack, ProbeRoute, StackError, VxlanSpec};
use ipnet::Ipv4Net;
use net::eth::mac::Mac;
use net::interface::{InterfaceIndex, InterfaceName};
use std::net::Ipv4Addr;
use std::num::NonZero;
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone)]
struct FakeLink {
    link: Link,
    addresses: Vec<Ipv4Net>,
    up: bool,
    vxlan: Option<VxlanSpec>,
}

#[derive(Debug)]
struct FakeState {
    next_index: NonZero<u32>,
    links: Vec<FakeLink>,
    routes: Vec<(Ipv4Net, ProbeRoute)>,
    neighbours: Vec<Neighbour>,
    fdb: Vec<FdbEntry>,
}

impl Default for FakeState {
    fn default() -> Self {
        Self {
            // index 1 is traditionally lo
            next_index: NonZero::<u32>::MIN.saturating_add(1),
            links: vec![],
            routes: vec![],
            neighbours: vec![],
            fdb: vec![],
        }
    }
}

impl FakeState {
    fn allocate_index(&mut self) -> InterfaceIndex {
        let index = InterfaceIndex::from(self.next_index);
        self.next_index = self.next_index.saturating_add(1);
        index
    }

    fn link_mut(&mut self, index: InterfaceIndex) -> Result<&mut FakeLink, StackError> {
        self.links
            .iter_mut()
            .find(|l| l.link.index == index)
            .ok_or_else(|| StackError::Rejected(format!("no interface with index {index}")))
    }
}

/// A [`NetworkStack`] whose state lives in memory.
#[derive(Debug, Default)]
pub struct FakeNetworkStack {
    state: Mutex<FakeState>,
}

impl FakeNetworkStack {
    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add an (up) interface with the given addresses and return its index.
    pub fn add_link(
        &self,
        name: InterfaceName,
        mac: Option<Mac>,
        addresses: &[Ipv4Net],
    ) -> InterfaceIndex {
        let mut state = self.state();
        let index = state.allocate_index();
        state.links.push(FakeLink {
            link: Link { index, name, mac },
            addresses: addresses.to_vec(),
            up: true,
            vxlan: None,
        });
        index
    }

    /// Add a route; [`NetworkStack::routes_to`] answers with every route of the longest matching
    /// prefix.
    pub fn add_route(&self, prefix: Ipv4Net, oif: InterfaceIndex, gateway: Option<Ipv4Addr>) {
        self.state()
            .routes
            .push((prefix, ProbeRoute { oif, gateway }));
    }

    /// Add an IPv4 neighbour entry.
    pub fn add_neighbour(&self, index: InterfaceIndex, ip: Ipv4Addr, mac: Option<Mac>) {
        self.state().neighbours.push(Neighbour { index, ip, mac });
    }

    /// The interface called `name`, if any.
    #[must_use]
    pub fn link(&self, name: &str) -> Option<Link> {
        self.state()
            .links
            .iter()
            .find(|l| l.link.name.as_ref() == name)
            .map(|l| l.link.clone())
    }

    /// The addresses currently assigned to `index`.
    #[must_use]
    pub fn addresses(&self, index: InterfaceIndex) -> Vec<Ipv4Net> {
        self.state()
            .links
            .iter()
            .find(|l| l.link.index == index)
            .map(|l| l.addresses.clone())
            .unwrap_or_default()
    }

    /// True if `index` exists and is administratively up.
    #[must_use]
    pub fn is_up(&self, index: InterfaceIndex) -> bool {
        self.state()
            .links
            .iter()
            .any(|l| l.link.index == index && l.up)
    }

    /// The VXLAN properties `index` was created with, if it is a VXLAN device.
    #[must_use]
    pub fn vxlan(&self, index: InterfaceIndex) -> Option<VxlanSpec> {
        self.state()
            .links
            .iter()
            .find(|l| l.link.index == index)
            .and_then(|l| l.vxlan.clone())
    }

    /// Every forwarding entry appended so far, in order.
    #[must_use]
    pub fn fdb(&self) -> Vec<FdbEntry> {
        self.state().fdb.clone()
    }
}

impl NetworkStack for FakeNetworkStack {
    async fn links(&self) -> Result<Vec<Link>, StackError> {
        Ok(self.state().links.iter().map(|l| l.link.clone()).collect())
    }

    async fn ipv4_addresses(&self, index: InterfaceIndex) -> Result<Vec<Ipv4Net>, StackError> {
        Ok(self.addresses(index))
    }

    async fn routes_to(&self, destination: Ipv4Addr) -> Result<Vec<ProbeRoute>, StackError> {
        let state = self.state();
        let matching = state
            .routes
            .iter()
            .filter(|(prefix, _)| prefix.contains(&destination));
        let Some(longest) = matching.clone().map(|(prefix, _)| prefix.prefix_len()).max() else {
            return Err(StackError::NoRoute(destination));
        };
        Ok(matching
            .filter(|(prefix, _)| prefix.prefix_len() == longest)
            .map(|(_, probe)| *probe)
            .collect())
    }

    async fn ipv4_neighbours(&self, index: InterfaceIndex) -> Result<Vec<Neighbour>, StackError> {
        Ok(self
            .state()
            .neighbours
            .iter()
            .filter(|n| n.index == index)
            .copied()
            .collect())
    }

    async fn create_vxlan(&self, spec: &VxlanSpec) -> Result<(), StackError> {
        let mut state = self.state();
        if state.links.iter().any(|l| l.link.name == spec.name) {
            return Err(StackError::Rejected(format!("{} already exists", spec.name)));
        }
        state.link_mut(spec.underlay)?;
        let index = state.allocate_index();
        let mac = Mac([0x02, 0, 0, 0, 0, u8::try_from(index.to_u32() & 0xff).unwrap_or(0)]);
        state.links.push(FakeLink {
            link: Link {
                index,
                name: spec.name.clone(),
                mac: Some(mac),
            },
            addresses: vec![],
            up: false,
            vxlan: Some(spec.clone()),
        });
        Ok(())
    }

    async fn set_up(&self, index: InterfaceIndex) -> Result<(), StackError> {
        self.state().link_mut(index)?.up = true;
        Ok(())
    }

    async fn add_address(&self, index: InterfaceIndex, address: Ipv4Net) -> Result<(), StackError> {
        let mut state = self.state();
        let link = state.link_mut(index)?;
        if link.addresses.iter().any(|a| a.addr() == address.addr()) {
            return Err(StackError::Rejected(format!(
                "{} already has address {address}",
                link.link.name
            )));
        }
        link.addresses.push(address);
        Ok(())
    }

    async fn append_fdb(&self, entry: &FdbEntry) -> Result<(), StackError> {
        let mut state = self.state();
        if state.link_mut(entry.dev)?.vxlan.is_none() {
            return Err(StackError::Rejected(format!(
                "interface {} is not a vxlan device",
                entry.dev
            )));
        }
        if state.fdb.contains(entry) {
            return Err(StackError::Rejected(format!(
                "fdb entry {} dst {} already exists",
                entry.mac, entry.dst
            )));
        }
        state.fdb.push(*entry);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::FakeNetworkStack;
    use crate::stack::{FdbEntry, NetworkStack, StackError, VxlanSpecBuilder};
    use net::eth::mac::Mac;
    use net::vxlan::Vni;
    use pretty_assertions::assert_eq;
    use std::net::Ipv4Addr;

    #[tokio::test]
    async fn routes_use_longest_prefix() {
        let stack = FakeNetworkStack::default();
        let eth0 = stack.add_link("eth0".try_into().unwrap(), None, &[]);
        let eth1 = stack.add_link("eth1".try_into().unwrap(), None, &[]);
        stack.add_route("0.0.0.0/0".parse().unwrap(), eth0, Some(Ipv4Addr::new(192, 168, 1, 1)));
        stack.add_route("10.0.0.0/8".parse().unwrap(), eth1, None);
        assert_eq!(stack.routes_to(Ipv4Addr::new(1, 0, 0, 0)).await.unwrap()[0].oif, eth0);
        assert_eq!(stack.routes_to(Ipv4Addr::new(10, 1, 2, 3)).await.unwrap()[0].oif, eth1);
        stack.add_route("10.0.0.0/8".parse().unwrap(), eth0, None);
        assert_eq!(stack.routes_to(Ipv4Addr::new(10, 1, 2, 3)).await.unwrap().len(), 2);
        assert!(matches!(
            FakeNetworkStack::default().routes_to(Ipv4Addr::new(1, 0, 0, 0)).await,
            Err(StackError::NoRoute(_))
        ));
    }

    #[tokio::test]
    async fn fdb_entries_need_a_vxlan_device_and_are_unique() {
        let stack = FakeNetworkStack::default();
        let eth0 = stack.add_link("eth0".try_into().unwrap(), None, &[]);
        let spec = VxlanSpecBuilder::default()
            .name("vxlan0".try_into().unwrap())
            .vni(Vni::new_checked(42).unwrap())
            .underlay(eth0)
            .build()
            .unwrap();
        stack.create_vxlan(&spec).await.unwrap();
        assert!(matches!(
            stack.create_vxlan(&spec).await,
            Err(StackError::Rejected(_))
        ));
        let vxlan = stack.link("vxlan0").unwrap();
        assert!(!stack.is_up(vxlan.index));

        let entry = FdbEntry {
            dev: vxlan.index,
            mac: Mac::ZERO,
            dst: Ipv4Addr::new(192, 168, 1, 11),
        };
        stack.append_fdb(&entry).await.unwrap();
        assert!(stack.append_fdb(&entry).await.is_err());
        assert!(
            stack
                .append_fdb(&FdbEntry { dev: eth0, ..entry })
                .await
                .is_err()
        );
        assert_eq!(stack.fdb(), vec![entry]);
    }
}
