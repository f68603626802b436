// SPDX-License-Identifier: Apache-2.0
// Copyright Polykube Authors

//! An in-memory management daemon for tests.
//!
//! Instances and ports must exist before they are wired, names are unique per function type, and
//! router ports created without a MAC get one assigned.  Every successful call is recorded.

use crate::api::{BridgeApi, K8sDispatcherApi, LbrpApi, RouterApi};
use crate::error::ManagementApiError;
use crate::models::{
    K8sDispatcher, K8sDispatcherPort, Lbrp, Router, RouterRoute, Simplebridge,
};
use async_trait::async_trait;
use net::eth::mac::Mac;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct FakeCubeState {
    bridges: BTreeMap<String, Simplebridge>,
    routers: BTreeMap<String, Router>,
    lbrps: BTreeMap<String, Lbrp>,
    dispatchers: BTreeMap<String, K8sDispatcher>,
    failing: BTreeSet<&'static str>,
    calls: Vec<String>,
    next_mac: u16,
}

fn rejected(operation: &'static str, resource: String, status: u16) -> ManagementApiError {
    let body = match status {
        404 => "not found".to_string(),
        409 => "already exists".to_string(),
        _ => "injected failure".to_string(),
    };
    ManagementApiError::Rejected {
        operation,
        resource,
        status,
        body,
    }
}

impl FakeCubeState {
    fn check(&self, operation: &'static str, resource: &str) -> Result<(), ManagementApiError> {
        if self.failing.contains(operation) {
            return Err(rejected(operation, resource.to_string(), 500));
        }
        Ok(())
    }

    fn assign_mac(&mut self) -> Mac {
        self.next_mac = self.next_mac.wrapping_add(1);
        let [hi, lo] = self.next_mac.to_be_bytes();
        Mac([0x02, 0xfc, 0, 0, hi, lo])
    }
}

/// Find `instance` in `map` and the port called `port` among the ports `ports_of` yields, then
/// set its peer.
fn set_peer<T, P>(
    map: &mut BTreeMap<String, T>,
    operation: &'static str,
    instance: &str,
    port: &str,
    peer: &str,
    ports_of: impl FnOnce(&mut T) -> &mut Vec<P>,
    peer_of: impl Fn(&mut P) -> (&str, &mut Option<String>),
) -> Result<(), ManagementApiError> {
    let resource = format!("{instance}/ports/{port}");
    let found = map
        .get_mut(instance)
        .ok_or_else(|| rejected(operation, resource.clone(), 404))?;
    for candidate in ports_of(found) {
        let (name, slot) = peer_of(candidate);
        if name == port {
            *slot = Some(peer.to_string());
            return Ok(());
        }
    }
    Err(rejected(operation, resource, 404))
}

/// A management API whose state lives in memory.
#[derive(Debug, Default)]
pub struct FakeCubeApi {
    state: Mutex<FakeCubeState>,
}

impl FakeCubeApi {
    fn state(&self) -> MutexGuard<'_, FakeCubeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make every later call of `operation` (e.g. `"create router"`) fail with status 500.
    pub fn fail(&self, operation: &'static str) {
        self.state().failing.insert(operation);
    }

    /// Every successful call, in order, as `"<operation> <resource>"`.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    /// The bridge called `name`, if created.
    #[must_use]
    pub fn bridge(&self, name: &str) -> Option<Simplebridge> {
        self.state().bridges.get(name).cloned()
    }

    /// The router called `name`, if created.
    #[must_use]
    pub fn router(&self, name: &str) -> Option<Router> {
        self.state().routers.get(name).cloned()
    }

    /// The load balancer called `name`, if created.
    #[must_use]
    pub fn lbrp(&self, name: &str) -> Option<Lbrp> {
        self.state().lbrps.get(name).cloned()
    }

    /// The dispatcher called `name`, if created.
    #[must_use]
    pub fn k8sdispatcher(&self, name: &str) -> Option<K8sDispatcher> {
        self.state().dispatchers.get(name).cloned()
    }
}

#[async_trait]
impl BridgeApi for FakeCubeApi {
    async fn create_bridge(&self, bridge: &Simplebridge) -> Result<(), ManagementApiError> {
        const OP: &str = "create bridge";
        let mut state = self.state();
        state.check(OP, &bridge.name)?;
        if state.bridges.contains_key(&bridge.name) {
            return Err(rejected(OP, bridge.name.clone(), 409));
        }
        state.bridges.insert(bridge.name.clone(), bridge.clone());
        state.calls.push(format!("{OP} {}", bridge.name));
        Ok(())
    }

    async fn set_bridge_port_peer(
        &self,
        bridge: &str,
        port: &str,
        peer: &str,
    ) -> Result<(), ManagementApiError> {
        const OP: &str = "set bridge port peer";
        let mut state = self.state();
        state.check(OP, bridge)?;
        set_peer(
            &mut state.bridges,
            OP,
            bridge,
            port,
            peer,
            |b| &mut b.ports,
            |p| (p.name.as_str(), &mut p.peer),
        )?;
        state.calls.push(format!("{OP} {bridge}:{port} {peer}"));
        Ok(())
    }
}

#[async_trait]
impl RouterApi for FakeCubeApi {
    async fn create_router(&self, router: &Router) -> Result<(), ManagementApiError> {
        const OP: &str = "create router";
        let mut state = self.state();
        state.check(OP, &router.name)?;
        if state.routers.contains_key(&router.name) {
            return Err(rejected(OP, router.name.clone(), 409));
        }
        let mut created = router.clone();
        for port in &mut created.ports {
            if port.mac.is_none() {
                port.mac = Some(state.assign_mac());
            }
        }
        state.routers.insert(router.name.clone(), created);
        state.calls.push(format!("{OP} {}", router.name));
        Ok(())
    }

    async fn read_router(&self, router: &str) -> Result<Router, ManagementApiError> {
        const OP: &str = "read router";
        let state = self.state();
        state.check(OP, router)?;
        state
            .routers
            .get(router)
            .cloned()
            .ok_or_else(|| rejected(OP, router.to_string(), 404))
    }

    async fn set_router_port_peer(
        &self,
        router: &str,
        port: &str,
        peer: &str,
    ) -> Result<(), ManagementApiError> {
        const OP: &str = "set router port peer";
        let mut state = self.state();
        state.check(OP, router)?;
        set_peer(
            &mut state.routers,
            OP,
            router,
            port,
            peer,
            |r| &mut r.ports,
            |p| (p.name.as_str(), &mut p.peer),
        )?;
        state.calls.push(format!("{OP} {router}:{port} {peer}"));
        Ok(())
    }

    async fn create_router_route(
        &self,
        router: &str,
        route: &RouterRoute,
    ) -> Result<(), ManagementApiError> {
        const OP: &str = "create router route";
        let resource = format!("{router}/route/{}/{}", route.network, route.nexthop);
        let mut state = self.state();
        state.check(OP, &resource)?;
        let found = state
            .routers
            .get_mut(router)
            .ok_or_else(|| rejected(OP, resource.clone(), 404))?;
        if !found.ports.iter().any(|p| p.name == route.interface) {
            return Err(rejected(OP, resource, 404));
        }
        if found
            .route
            .iter()
            .any(|r| r.network == route.network && r.nexthop == route.nexthop)
        {
            return Err(rejected(OP, resource, 409));
        }
        found.route.push(route.clone());
        state.calls.push(format!("{OP} {resource}"));
        Ok(())
    }
}

#[async_trait]
impl LbrpApi for FakeCubeApi {
    async fn create_lbrp(&self, lbrp: &Lbrp) -> Result<(), ManagementApiError> {
        const OP: &str = "create lbrp";
        let mut state = self.state();
        state.check(OP, &lbrp.name)?;
        if state.lbrps.contains_key(&lbrp.name) {
            return Err(rejected(OP, lbrp.name.clone(), 409));
        }
        state.lbrps.insert(lbrp.name.clone(), lbrp.clone());
        state.calls.push(format!("{OP} {}", lbrp.name));
        Ok(())
    }

    async fn set_lbrp_port_peer(
        &self,
        lbrp: &str,
        port: &str,
        peer: &str,
    ) -> Result<(), ManagementApiError> {
        const OP: &str = "set lbrp port peer";
        let mut state = self.state();
        state.check(OP, lbrp)?;
        set_peer(
            &mut state.lbrps,
            OP,
            lbrp,
            port,
            peer,
            |l| &mut l.ports,
            |p| (p.name.as_str(), &mut p.peer),
        )?;
        state.calls.push(format!("{OP} {lbrp}:{port} {peer}"));
        Ok(())
    }
}

#[async_trait]
impl K8sDispatcherApi for FakeCubeApi {
    async fn create_k8sdispatcher(
        &self,
        dispatcher: &K8sDispatcher,
    ) -> Result<(), ManagementApiError> {
        const OP: &str = "create k8sdispatcher";
        let mut state = self.state();
        state.check(OP, &dispatcher.name)?;
        if state.dispatchers.contains_key(&dispatcher.name) {
            return Err(rejected(OP, dispatcher.name.clone(), 409));
        }
        state
            .dispatchers
            .insert(dispatcher.name.clone(), dispatcher.clone());
        state.calls.push(format!("{OP} {}", dispatcher.name));
        Ok(())
    }

    async fn create_k8sdispatcher_port(
        &self,
        dispatcher: &str,
        port: &K8sDispatcherPort,
    ) -> Result<(), ManagementApiError> {
        const OP: &str = "create k8sdispatcher port";
        let resource = format!("{dispatcher}/ports/{}", port.name);
        let mut state = self.state();
        state.check(OP, &resource)?;
        let found = state
            .dispatchers
            .get_mut(dispatcher)
            .ok_or_else(|| rejected(OP, resource.clone(), 404))?;
        if found.ports.iter().any(|p| p.name == port.name) {
            return Err(rejected(OP, resource, 409));
        }
        found.ports.push(port.clone());
        state.calls.push(format!("{OP} {resource}"));
        Ok(())
    }

    async fn set_k8sdispatcher_port_peer(
        &self,
        dispatcher: &str,
        port: &str,
        peer: &str,
    ) -> Result<(), ManagementApiError> {
        const OP: &str = "set k8sdispatcher port peer";
        let mut state = self.state();
        state.check(OP, dispatcher)?;
        set_peer(
            &mut state.dispatchers,
            OP,
            dispatcher,
            port,
            peer,
            |k| &mut k.ports,
            |p| (p.name.as_str(), &mut p.peer),
        )?;
        state.calls.push(format!("{OP} {dispatcher}:{port} {peer}"));
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::FakeCubeApi;
    use crate::api::{BridgeApi, RouterApi};
    use crate::models::{BridgePort, Router, RouterPort, RouterRoute, Simplebridge};
    use pretty_assertions::assert_eq;

    fn router() -> Router {
        Router {
            name: "r0".into(),
            ports: vec![
                RouterPort {
                    name: "to_br0".into(),
                    ..Default::default()
                },
                RouterPort {
                    name: "to_vxlan0".into(),
                    ..Default::default()
                },
            ],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn wiring_requires_existing_instances_and_ports() {
        let api = FakeCubeApi::default();
        let err = api
            .set_bridge_port_peer("br0", "to_r0", "r0:to_br0")
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(404));
        api.create_bridge(&Simplebridge {
            name: "br0".into(),
            ports: vec![BridgePort {
                name: "to_r0".into(),
                peer: None,
            }],
            ..Default::default()
        })
        .await
        .unwrap();
        assert_eq!(
            api.set_bridge_port_peer("br0", "nope", "r0:to_br0")
                .await
                .unwrap_err()
                .status(),
            Some(404)
        );
        api.set_bridge_port_peer("br0", "to_r0", "r0:to_br0")
            .await
            .unwrap();
        assert_eq!(
            api.bridge("br0").unwrap().ports[0].peer.as_deref(),
            Some("r0:to_br0")
        );
    }

    #[tokio::test]
    async fn router_ports_get_distinct_macs() {
        let api = FakeCubeApi::default();
        api.create_router(&router()).await.unwrap();
        let read = api.read_router("r0").await.unwrap();
        let macs: Vec<_> = read.ports.iter().map(|p| p.mac.unwrap()).collect();
        assert_eq!(macs.len(), 2);
        assert_ne!(macs[0], macs[1]);
        assert_eq!(api.create_router(&router()).await.unwrap_err().status(), Some(409));
    }

    #[tokio::test]
    async fn routes_are_unique_and_need_their_interface() {
        let api = FakeCubeApi::default();
        api.create_router(&router()).await.unwrap();
        let route = RouterRoute {
            network: "10.10.2.0/24".into(),
            nexthop: "10.18.0.2".into(),
            interface: "to_vxlan0".into(),
            pathcost: None,
        };
        api.create_router_route("r0", &route).await.unwrap();
        assert_eq!(
            api.create_router_route("r0", &route).await.unwrap_err().status(),
            Some(409)
        );
        let dangling = RouterRoute {
            interface: "to_lbrp0".into(),
            ..route
        };
        assert_eq!(
            api.create_router_route("r0", &dangling)
                .await
                .unwrap_err()
                .status(),
            Some(404)
        );
        assert_eq!(
            api.calls(),
            vec![
                "create router r0".to_string(),
                "create router route r0/route/10.10.2.0/24/10.18.0.2".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn injected_failures_are_reported() {
        let api = FakeCubeApi::default();
        api.fail("create router");
        assert_eq!(api.create_router(&router()).await.unwrap_err().status(), Some(500));
        assert!(api.router("r0").is_none());
    }
}
