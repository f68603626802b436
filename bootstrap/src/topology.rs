// SPDX-License-Identifier: Apache-2.0
// Copyright Polykube Authors

//! Topology builder.
//!
//! Every node runs the same chain of four network functions:
//!
//! ```text
//!  pods -- bridge -- router -- lbrp -- k8sdispatcher -- external interface
//!                      |
//!                    vxlan
//! ```
//!
//! Building it goes through three steps, each of which requires the previous one:
//! the instances are created, their ports are wired, then the pod gateway mac, which the router
//! only assigns on creation, is read back.

use crate::config::EnvironmentConfig;
use crate::error::BootstrapError;
use crate::resolver::resolve_pod_gateway_mac;
use crate::state::NodeTopologyState;
use cube::models::{
    ArpEntry, BridgePort, K8sDispatcher, K8sDispatcherPort, K8sDispatcherPortType, Lbrp, LbrpPort,
    LbrpPortType, Router, RouterPort, RouterRoute, Simplebridge,
};
use cube::{CubeClientSet, port_peer};
use std::fmt::Display;
use tracing::{debug, error, info};

/// Name of the dispatcher port facing the external interface.
pub const DISPATCHER_FRONTEND_PORT: &str = "to_int";

/// Where a topology stands.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum TopologyStage {
    /// Nothing has been created yet.
    Uncreated,
    /// The four instances exist.
    FunctionsCreated,
    /// Every port has its peer.
    Wired,
    /// The pod gateway mac is known.
    GatewayFinalized,
}

/// The four function types.
#[derive(Copy, Clone, Debug, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum FunctionKind {
    /// L2 bridge.
    Bridge,
    /// L3 router.
    Router,
    /// Load-balancer / reverse proxy.
    Lbrp,
    /// Kubernetes service dispatcher.
    K8sDispatcher,
}

/// The name of the port of one instance facing `peer`.
#[must_use]
pub fn port_to(peer: impl Display) -> String {
    format!("to_{peer}")
}

/// Setting the peer of one port.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WiringStep {
    /// The type of the instance owning the port.
    pub kind: FunctionKind,
    /// The instance owning the port.
    pub instance: String,
    /// The port.
    pub port: String,
    /// The peer: `instance:port`, or the name of a kernel interface.
    pub peer: String,
}

impl WiringStep {
    fn new(kind: FunctionKind, instance: &str, port: String, peer: String) -> Self {
        Self {
            kind,
            instance: instance.to_string(),
            port,
            peer,
        }
    }
}

impl Display for WiringStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {}:{} -> {}",
            self.kind, self.instance, self.port, self.peer
        )
    }
}

/// Every port of the chain and its peer.
#[must_use]
pub fn wiring_plan(config: &EnvironmentConfig, external: &str) -> Vec<WiringStep> {
    use FunctionKind as Kind;
    let names = &config.functions;
    let (br, r, lb, k) = (
        names.bridge.as_str(),
        names.router.as_str(),
        names.lbrp.as_str(),
        names.k8sdispatcher.as_str(),
    );
    vec![
        WiringStep::new(Kind::Bridge, br, port_to(r), port_peer(r, &port_to(br))),
        WiringStep::new(Kind::Router, r, port_to(br), port_peer(br, &port_to(r))),
        WiringStep::new(
            Kind::Router,
            r,
            port_to(&config.vxlan_name),
            config.vxlan_name.to_string(),
        ),
        WiringStep::new(Kind::Router, r, port_to(lb), port_peer(lb, &port_to(r))),
        WiringStep::new(Kind::Lbrp, lb, port_to(r), port_peer(r, &port_to(lb))),
        WiringStep::new(Kind::Lbrp, lb, port_to(k), port_peer(k, &port_to(lb))),
        WiringStep::new(Kind::K8sDispatcher, k, port_to(lb), port_peer(lb, &port_to(k))),
        WiringStep::new(
            Kind::K8sDispatcher,
            k,
            DISPATCHER_FRONTEND_PORT.to_string(),
            external.to_string(),
        ),
    ]
}

/// Apply every step of `plan`, in order.
///
/// # Errors
///
/// Fails with [`BootstrapError::ManagementApi`] on the first refused step, e.g. one referencing
/// an instance or port that does not exist.
pub async fn apply_wiring(
    clients: &CubeClientSet,
    plan: &[WiringStep],
) -> Result<(), BootstrapError> {
    for step in plan {
        debug!("wiring {step}");
        let (instance, port, peer) = (step.instance.as_str(), step.port.as_str(), &step.peer);
        match step.kind {
            FunctionKind::Bridge => {
                clients.bridge.set_bridge_port_peer(instance, port, peer).await?;
            }
            FunctionKind::Router => {
                clients.router.set_router_port_peer(instance, port, peer).await?;
            }
            FunctionKind::Lbrp => clients.lbrp.set_lbrp_port_peer(instance, port, peer).await?,
            FunctionKind::K8sDispatcher => {
                clients
                    .k8sdispatcher
                    .set_k8sdispatcher_port_peer(instance, port, peer)
                    .await?;
            }
        }
    }
    Ok(())
}

/// The bridge pods attach to.
#[must_use]
pub fn bridge_spec(config: &EnvironmentConfig) -> Simplebridge {
    let names = &config.functions;
    Simplebridge {
        name: names.bridge.clone(),
        loglevel: Some(config.cube_log_level),
        ports: vec![BridgePort {
            name: port_to(&names.router),
            peer: None,
        }],
    }
}

/// The router, with the pod gateway, overlay and uplink ports, the default route and the uplink
/// gateway's ARP entry.
#[must_use]
pub fn router_spec(config: &EnvironmentConfig, state: &NodeTopologyState) -> Router {
    let names = &config.functions;
    let uplink = port_to(&names.lbrp);
    let gateway = state.uplink_gateway.address.addr().to_string();
    Router {
        name: names.router.clone(),
        loglevel: Some(config.cube_log_level),
        ports: vec![
            RouterPort {
                name: port_to(&names.bridge),
                ip: Some(state.pod_gateway.address.to_string()),
                mac: state.pod_gateway.mac,
                peer: None,
            },
            RouterPort {
                name: port_to(&config.vxlan_name),
                ..RouterPort::default()
            },
            RouterPort {
                name: uplink.clone(),
                ip: Some(state.external.address.to_string()),
                mac: state.external.mac,
                peer: None,
            },
        ],
        route: vec![RouterRoute {
            network: "0.0.0.0/0".to_string(),
            nexthop: gateway.clone(),
            interface: uplink.clone(),
            pathcost: None,
        }],
        arp_table: vec![ArpEntry {
            address: gateway,
            mac: state.uplink_gateway.mac,
            interface: uplink,
        }],
    }
}

/// The load balancer, backend towards the router and frontend towards the dispatcher.
#[must_use]
pub fn lbrp_spec(config: &EnvironmentConfig) -> Lbrp {
    let names = &config.functions;
    Lbrp {
        name: names.lbrp.clone(),
        loglevel: Some(config.cube_log_level),
        ports: vec![
            LbrpPort {
                name: port_to(&names.router),
                kind: LbrpPortType::Backend,
                peer: None,
            },
            LbrpPort {
                name: port_to(&names.k8sdispatcher),
                kind: LbrpPortType::Frontend,
                peer: None,
            },
        ],
    }
}

/// The dispatcher with its backend port; the frontend port is added once it exists.
#[must_use]
pub fn k8sdispatcher_spec(config: &EnvironmentConfig, state: &NodeTopologyState) -> K8sDispatcher {
    let names = &config.functions;
    K8sDispatcher {
        name: names.k8sdispatcher.clone(),
        loglevel: Some(config.cube_log_level),
        ports: vec![K8sDispatcherPort {
            name: port_to(&names.lbrp),
            kind: K8sDispatcherPortType::Backend,
            peer: None,
        }],
        cluster_ip_subnet: config.dispatcher.cluster_ip_subnet.to_string(),
        client_subnet: state.pod_cidr.to_string(),
        internal_src_ip: config.dispatcher.internal_src_ip.to_string(),
        nodeport_range: config.dispatcher.nodeport_range.to_string(),
    }
}

/// Drives the creation of the function chain of one node.
#[derive(Debug)]
pub struct TopologyBuilder<'a> {
    clients: &'a CubeClientSet,
    config: &'a EnvironmentConfig,
    stage: TopologyStage,
}

impl<'a> TopologyBuilder<'a> {
    /// A builder for a node with nothing created yet.
    #[must_use]
    pub fn new(clients: &'a CubeClientSet, config: &'a EnvironmentConfig) -> Self {
        Self {
            clients,
            config,
            stage: TopologyStage::Uncreated,
        }
    }

    /// The last stage reached.
    #[must_use]
    pub fn stage(&self) -> TopologyStage {
        self.stage
    }

    fn expect(&self, expected: TopologyStage) -> Result<(), BootstrapError> {
        if self.stage == expected {
            Ok(())
        } else {
            Err(BootstrapError::TopologyStage {
                expected,
                actual: self.stage,
            })
        }
    }

    /// Create the four instances, in chain order.
    ///
    /// # Errors
    ///
    /// Fails if instances were already created or a creation is refused.
    pub async fn create_functions(
        &mut self,
        state: &NodeTopologyState,
    ) -> Result<(), BootstrapError> {
        self.expect(TopologyStage::Uncreated)?;
        let (config, clients) = (self.config, self.clients);
        let names = &config.functions;

        info!("creating bridge {}", names.bridge);
        clients.bridge.create_bridge(&bridge_spec(config)).await?;
        info!("creating router {}", names.router);
        clients
            .router
            .create_router(&router_spec(config, state))
            .await?;
        info!("creating lbrp {}", names.lbrp);
        clients.lbrp.create_lbrp(&lbrp_spec(config)).await?;
        info!("creating k8sdispatcher {}", names.k8sdispatcher);
        clients
            .k8sdispatcher
            .create_k8sdispatcher(&k8sdispatcher_spec(config, state))
            .await?;
        clients
            .k8sdispatcher
            .create_k8sdispatcher_port(
                &names.k8sdispatcher,
                &K8sDispatcherPort {
                    name: DISPATCHER_FRONTEND_PORT.to_string(),
                    kind: K8sDispatcherPortType::Frontend,
                    peer: None,
                },
            )
            .await?;
        self.stage = TopologyStage::FunctionsCreated;
        Ok(())
    }

    /// Set the peer of every port.
    ///
    /// # Errors
    ///
    /// Fails if the instances were not created yet or a wiring call is refused.
    pub async fn wire(&mut self, state: &NodeTopologyState) -> Result<(), BootstrapError> {
        self.expect(TopologyStage::FunctionsCreated)?;
        let plan = wiring_plan(self.config, state.external.name.as_ref());
        apply_wiring(self.clients, &plan).await?;
        info!("wired {} ports", plan.len());
        self.stage = TopologyStage::Wired;
        Ok(())
    }

    /// Back-fill the pod gateway mac from the router.
    ///
    /// # Errors
    ///
    /// Fails if the chain is not wired yet, the router cannot be read or the bridge-facing router
    /// port has no mac.
    pub async fn finalize_gateway(
        &mut self,
        state: &mut NodeTopologyState,
    ) -> Result<(), BootstrapError> {
        self.expect(TopologyStage::Wired)?;
        let names = &self.config.functions;
        let mac = resolve_pod_gateway_mac(
            self.clients.router.as_ref(),
            &names.router,
            &port_to(&names.bridge),
            state.pod_gateway.address.addr(),
        )
        .await?;
        state.pod_gateway.mac = Some(mac);
        info!("pod gateway is {}", state.pod_gateway);
        self.stage = TopologyStage::GatewayFinalized;
        Ok(())
    }

    /// Run every remaining step.
    ///
    /// # Errors
    ///
    /// Propagates the first failing step; the stage reached is logged.
    pub async fn build(&mut self, state: &mut NodeTopologyState) -> Result<(), BootstrapError> {
        let result = self.advance(state).await;
        if let Err(e) = &result {
            error!("topology stuck at stage {}: {e}", self.stage);
        }
        result
    }

    async fn advance(&mut self, state: &mut NodeTopologyState) -> Result<(), BootstrapError> {
        if self.stage == TopologyStage::Uncreated {
            self.create_functions(state).await?;
        }
        if self.stage == TopologyStage::FunctionsCreated {
            self.wire(state).await?;
        }
        if self.stage == TopologyStage::Wired {
            self.finalize_gateway(state).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::EnvironmentConfigBuilder;
    use crate::state::{GatewayInfo, InterfaceDescriptor};
    use cube::fake::FakeCubeApi;
    use net::eth::mac::Mac;
    use net::interface::InterfaceIndex;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use tracing_test::traced_test;

    fn config() -> EnvironmentConfig {
        EnvironmentConfigBuilder::default()
            .node_name("worker1")
            .build()
            .unwrap()
    }

    fn state() -> NodeTopologyState {
        NodeTopologyState {
            node: "worker1".into(),
            pod_cidr: "10.10.1.0/24".parse().unwrap(),
            pod_gateway: GatewayInfo::pending("10.10.1.254/24".parse().unwrap()),
            external: InterfaceDescriptor {
                name: "eth0".try_into().unwrap(),
                index: InterfaceIndex::try_new(2).unwrap(),
                address: "192.168.1.11/24".parse().unwrap(),
                mac: Some(Mac([2, 0, 0, 0, 0, 0x11])),
            },
            vtep: "10.18.0.1/16".parse().unwrap(),
            uplink_gateway: GatewayInfo {
                address: "192.168.1.1/24".parse().unwrap(),
                mac: Some(Mac([0x52, 0x54, 0, 0x12, 0x35, 0x02])),
            },
            vxlan: None,
        }
    }

    fn fake() -> (Arc<FakeCubeApi>, CubeClientSet) {
        let api = Arc::new(FakeCubeApi::default());
        let clients = CubeClientSet::from_client(api.clone());
        (api, clients)
    }

    #[test]
    fn plan_wires_the_chain_both_ways() {
        let plan: Vec<String> = wiring_plan(&config(), "eth0")
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(
            plan,
            vec![
                "bridge br0:to_r0 -> r0:to_br0",
                "router r0:to_br0 -> br0:to_r0",
                "router r0:to_vxlan0 -> vxlan0",
                "router r0:to_lbrp0 -> lbrp0:to_r0",
                "lbrp lbrp0:to_r0 -> r0:to_lbrp0",
                "lbrp lbrp0:to_k0 -> k0:to_lbrp0",
                "k8sdispatcher k0:to_lbrp0 -> lbrp0:to_k0",
                "k8sdispatcher k0:to_int -> eth0",
            ]
        );
    }

    #[test]
    fn router_declares_uplink_route_and_arp_entry() {
        let router = router_spec(&config(), &state());
        let uplink = router.port("to_lbrp0").unwrap();
        assert_eq!(uplink.ip.as_deref(), Some("192.168.1.11/24"));
        assert_eq!(uplink.mac, Some(Mac([2, 0, 0, 0, 0, 0x11])));
        assert_eq!(
            router.port("to_br0").unwrap().ip.as_deref(),
            Some("10.10.1.254/24")
        );
        assert_eq!(router.port("to_vxlan0").unwrap().ip, None);
        assert_eq!(router.route[0].network, "0.0.0.0/0");
        assert_eq!(router.route[0].nexthop, "192.168.1.1");
        assert_eq!(router.route[0].interface, "to_lbrp0");
        assert_eq!(router.arp_table[0].address, "192.168.1.1");
        assert_eq!(router.arp_table[0].mac, state().uplink_gateway.mac);
    }

    #[test]
    fn dispatcher_carries_service_settings() {
        let k = k8sdispatcher_spec(&config(), &state());
        assert_eq!(k.cluster_ip_subnet, "11.11.11.0/24");
        assert_eq!(k.client_subnet, "10.10.1.0/24");
        assert_eq!(k.internal_src_ip, "3.3.1.3");
        assert_eq!(k.nodeport_range, "30000-32767");
        assert_eq!(k.ports.len(), 1);
        assert_eq!(k.ports[0].kind, K8sDispatcherPortType::Backend);
    }

    #[tokio::test]
    async fn build_walks_every_stage() {
        let (api, clients) = fake();
        let config = config();
        let mut state = state();
        let mut builder = TopologyBuilder::new(&clients, &config);
        builder.build(&mut state).await.unwrap();
        assert_eq!(builder.stage(), TopologyStage::GatewayFinalized);

        let router = api.router("r0").unwrap();
        let to_br0 = router.port("to_br0").unwrap();
        assert_eq!(state.pod_gateway.mac, to_br0.mac);
        assert!(state.pod_gateway.is_resolved());
        assert_eq!(to_br0.peer.as_deref(), Some("br0:to_r0"));
        let k0 = api.k8sdispatcher("k0").unwrap();
        assert_eq!(k0.ports.len(), 2);
        assert_eq!(
            k0.ports.iter().find(|p| p.name == "to_int").unwrap().peer.as_deref(),
            Some("eth0")
        );

        let calls = api.calls();
        let created = calls
            .iter()
            .rposition(|c| c.starts_with("create"))
            .unwrap();
        let first_wire = calls.iter().position(|c| c.starts_with("set")).unwrap();
        assert!(created < first_wire, "{calls:#?}");
    }

    #[tokio::test]
    async fn steps_must_follow_each_other() {
        let (_api, clients) = fake();
        let config = config();
        let mut state = state();
        let mut builder = TopologyBuilder::new(&clients, &config);
        assert!(matches!(
            builder.wire(&state).await,
            Err(BootstrapError::TopologyStage {
                expected: TopologyStage::FunctionsCreated,
                actual: TopologyStage::Uncreated,
            })
        ));
        assert!(matches!(
            builder.finalize_gateway(&mut state).await,
            Err(BootstrapError::TopologyStage { .. })
        ));
        builder.create_functions(&state).await.unwrap();
        assert!(matches!(
            builder.create_functions(&state).await,
            Err(BootstrapError::TopologyStage { .. })
        ));
    }

    #[tokio::test]
    async fn wiring_uncreated_instances_is_refused() {
        let (api, clients) = fake();
        let plan = wiring_plan(&config(), "eth0");
        for step in &plan {
            assert!(matches!(
                apply_wiring(&clients, std::slice::from_ref(step)).await,
                Err(BootstrapError::ManagementApi(_))
            ));
        }
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn wiring_order_does_not_matter() {
        let (api, clients) = fake();
        let config = config();
        let state = state();
        let mut builder = TopologyBuilder::new(&clients, &config);
        builder.create_functions(&state).await.unwrap();
        let mut plan = wiring_plan(&config, "eth0");
        plan.reverse();
        apply_wiring(&clients, &plan).await.unwrap();
        assert_eq!(
            api.lbrp("lbrp0").unwrap().ports[1].peer.as_deref(),
            Some("k0:to_lbrp0")
        );
        assert_eq!(
            api.bridge("br0").unwrap().ports[0].peer.as_deref(),
            Some("r0:to_br0")
        );
    }

    #[tokio::test]
    #[traced_test]
    async fn failed_creation_stops_the_chain() {
        let (api, clients) = fake();
        api.fail("create lbrp");
        let config = config();
        let mut state = state();
        let mut builder = TopologyBuilder::new(&clients, &config);
        assert!(matches!(
            builder.build(&mut state).await,
            Err(BootstrapError::ManagementApi(_))
        ));
        assert_eq!(builder.stage(), TopologyStage::Uncreated);
        assert!(api.k8sdispatcher("k0").is_none());
        assert!(!state.pod_gateway.is_resolved());
        assert!(logs_contain("topology stuck at stage uncreated"));
    }
}
