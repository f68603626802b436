// SPDX-License-Identifier: Apache-2.0
// Copyright Polykube Authors

//! Read-only access to the cluster's node objects.

#![deny(
    unsafe_code,
    missing_docs,
    clippy::all,
    clippy::pedantic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic
)]

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Node;
use kube::api::ListParams;
use kube::config::{InferConfigError, KubeConfigOptions, Kubeconfig, KubeconfigError};
use kube::{Api, Client, Config};
use std::path::Path;
use tracectl::trace_target;
use tracing::{debug, info};

trace_target!("cluster", LevelFilter::INFO, &["kube"]);

/// The node address type naming the address other nodes reach this node on.
pub const INTERNAL_IP: &str = "InternalIP";

/// What this crate needs to know about a cluster node.
///
/// Addresses are kept as the cluster reports them; interpreting them is up to the caller.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClusterNodeInfo {
    /// The node name.
    pub name: String,
    /// The first `InternalIP` address of the node, if any.
    pub internal_ip: Option<String>,
    /// The pod subnet assigned to the node (`spec.podCIDR`), if any.
    pub pod_cidr: Option<String>,
}

impl TryFrom<&Node> for ClusterNodeInfo {
    type Error = ClusterError;

    fn try_from(node: &Node) -> Result<Self, Self::Error> {
        let name = node.metadata.name.clone().ok_or(ClusterError::Unnamed)?;
        let internal_ip = node
            .status
            .as_ref()
            .and_then(|status| status.addresses.as_ref())
            .and_then(|addresses| addresses.iter().find(|a| a.type_ == INTERNAL_IP))
            .map(|a| a.address.clone());
        let pod_cidr = node.spec.as_ref().and_then(|spec| spec.pod_cidr.clone());
        Ok(Self {
            name,
            internal_ip,
            pod_cidr,
        })
    }
}

/// Errors reported while reading cluster metadata.
#[derive(Debug, thiserror::Error)]
pub enum ClusterError {
    /// The kubeconfig file could not be loaded.
    #[error("failed to load kubeconfig: {0}")]
    KubeConfig(#[source] KubeconfigError),
    /// No kubeconfig was given and none could be inferred from the environment.
    #[error("failed to infer cluster configuration: {0}")]
    InferConfig(#[source] InferConfigError),
    /// The client could not be built.
    #[error("failed to build cluster client: {0}")]
    Client(#[source] kube::Error),
    /// A node could not be read.
    #[error("failed to read node {name}: {source}")]
    Get {
        /// The node name.
        name: String,
        /// The underlying error.
        #[source]
        source: kube::Error,
    },
    /// The node list could not be read.
    #[error("failed to list nodes: {0}")]
    List(#[source] kube::Error),
    /// No node with this name exists.
    #[error("node {0} not found")]
    NotFound(String),
    /// The cluster returned a node object without a name.
    #[error("node object has no name")]
    Unnamed,
}

/// A source of cluster node metadata.
#[async_trait]
pub trait NodeSource: Send + Sync {
    /// Read the node called `name`.
    async fn node(&self, name: &str) -> Result<ClusterNodeInfo, ClusterError>;
    /// Read every node of the cluster.
    async fn nodes(&self) -> Result<Vec<ClusterNodeInfo>, ClusterError>;
}

/// [`NodeSource`] backed by the kubernetes API server.
#[derive(Clone)]
pub struct KubeNodeSource {
    nodes: Api<Node>,
}

impl KubeNodeSource {
    /// Connect using the kubeconfig at `kubeconfig`, or the in-cluster / inferred configuration
    /// if none is given.
    ///
    /// # Errors
    ///
    /// Fails if no configuration can be loaded or the client cannot be built.
    pub async fn connect(kubeconfig: Option<&Path>) -> Result<Self, ClusterError> {
        let config = match kubeconfig {
            Some(path) => {
                debug!("loading kubeconfig {}", path.display());
                let kubeconfig = Kubeconfig::read_from(path).map_err(ClusterError::KubeConfig)?;
                Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                    .await
                    .map_err(ClusterError::KubeConfig)?
            }
            None => Config::infer().await.map_err(ClusterError::InferConfig)?,
        };
        info!("using cluster api at {}", config.cluster_url);
        let client = Client::try_from(config).map_err(ClusterError::Client)?;
        Ok(Self {
            nodes: Api::all(client),
        })
    }
}

impl std::fmt::Debug for KubeNodeSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeNodeSource").finish_non_exhaustive()
    }
}

#[async_trait]
impl NodeSource for KubeNodeSource {
    async fn node(&self, name: &str) -> Result<ClusterNodeInfo, ClusterError> {
        let node = self
            .nodes
            .get(name)
            .await
            .map_err(|source| ClusterError::Get {
                name: name.to_string(),
                source,
            })?;
        ClusterNodeInfo::try_from(&node)
    }

    async fn nodes(&self) -> Result<Vec<ClusterNodeInfo>, ClusterError> {
        let list = self
            .nodes
            .list(&ListParams::default())
            .await
            .map_err(ClusterError::List)?;
        debug!("listed {} nodes", list.items.len());
        list.items.iter().map(ClusterNodeInfo::try_from).collect()
    }
}

/// A fixed set of nodes.
#[cfg(any(test, feature = "testing"))]
#[derive(Clone, Debug, Default)]
pub struct StaticNodeSource {
    nodes: Vec<ClusterNodeInfo>,
}

#[cfg(any(test, feature = "testing"))]
impl StaticNodeSource {
    /// Serve `nodes`, in this order.
    #[must_use]
    pub fn new(nodes: Vec<ClusterNodeInfo>) -> Self {
        Self { nodes }
    }
}

#[cfg(any(test, feature = "testing"))]
#[async_trait]
impl NodeSource for StaticNodeSource {
    async fn node(&self, name: &str) -> Result<ClusterNodeInfo, ClusterError> {
        self.nodes
            .iter()
            .find(|n| n.name == name)
            .cloned()
            .ok_or_else(|| ClusterError::NotFound(name.to_string()))
    }

    async fn nodes(&self) -> Result<Vec<ClusterNodeInfo>, ClusterError> {
        Ok(self.nodes.clone())
    }
}
