// SPDX-License-Identifier: Apache-2.0
// Copyright Polykube Authors

//! Bootstrap of a node's participation in the pod overlay.
//!
//! A run resolves the node addressing, creates the overlay VXLAN device, builds the chain of
//! network functions, writes the CNI configuration and finally makes the pods of every peer node
//! reachable.  Stages run strictly one after the other and the first failure aborts the run.

#![deny(
    unsafe_code,
    missing_docs,
    clippy::all,
    clippy::pedantic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic
)]

pub mod cniconf;
pub mod config;
pub mod error;
pub mod ordinal;
pub mod overlay;
pub mod reachability;
pub mod resolver;
pub mod state;
pub mod topology;

pub use config::EnvironmentConfig;
pub use error::BootstrapError;
pub use state::NodeTopologyState;

use cluster::NodeSource;
use cniconf::CniConfig;
use cube::CubeClientSet;
use interface_manager::NetworkStack;
use ordinal::NodeOrdinals;
use topology::{TopologyBuilder, port_to};
use tracectl::trace_target;
use tracing::info;

trace_target!("bootstrap", LevelFilter::INFO, &["bootstrap"]);

/// Everything a bootstrap run talks to.
pub struct Bootstrap<'a, S: NetworkStack> {
    config: &'a EnvironmentConfig,
    stack: &'a S,
    clients: &'a CubeClientSet,
    nodes: &'a dyn NodeSource,
    ordinals: &'a dyn NodeOrdinals,
}

impl<'a, S: NetworkStack> Bootstrap<'a, S> {
    /// Prepare a run.
    #[must_use]
    pub fn new(
        config: &'a EnvironmentConfig,
        stack: &'a S,
        clients: &'a CubeClientSet,
        nodes: &'a dyn NodeSource,
        ordinals: &'a dyn NodeOrdinals,
    ) -> Self {
        Self {
            config,
            stack,
            clients,
            nodes,
            ordinals,
        }
    }

    /// Bootstrap the node and return what was learned about it.
    ///
    /// # Errors
    ///
    /// Returns the first failure; whatever was created until then is left in place.
    pub async fn run(&self) -> Result<NodeTopologyState, BootstrapError> {
        let config = self.config;
        info!("bootstrapping node {}", config.node_name);

        let node = self.nodes.node(&config.node_name).await?;
        let mut state =
            resolver::resolve_node_addressing(self.stack, &node, config, self.ordinals).await?;

        let vxlan = overlay::create_vxlan_interface(
            self.stack,
            &config.vxlan_name,
            &state.external,
            state.vtep,
        )
        .await?;
        state.vxlan = Some(vxlan.clone());

        TopologyBuilder::new(self.clients, config)
            .build(&mut state)
            .await?;

        let cni = CniConfig::new(config, &state)?;
        cniconf::emit(&config.cni_conf_path, &cni).await?;

        let nodes = self.nodes.nodes().await?;
        let peers =
            reachability::plan_peer_routes(&config.node_name, &nodes, config.vtep_pool, self.ordinals)?;
        reachability::provision(
            self.stack,
            self.clients.router.as_ref(),
            &config.functions.router,
            &vxlan,
            &port_to(&config.vxlan_name),
            &peers,
        )
        .await?;

        info!(
            "node {} bootstrapped: pods {} via {}, vtep {}",
            state.node, state.pod_cidr, state.pod_gateway, state.vtep
        );
        Ok(state)
    }
}
