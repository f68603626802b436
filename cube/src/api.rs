// SPDX-License-Identifier: Apache-2.0
// Copyright Polykube Authors

use crate::error::ManagementApiError;
use crate::models::{
    K8sDispatcher, K8sDispatcherPort, Lbrp, Router, RouterRoute, Simplebridge,
};
use async_trait::async_trait;
use std::sync::Arc;

/// Operations on `simplebridge` instances.
#[async_trait]
pub trait BridgeApi: Send + Sync {
    /// Create a bridge, ports included.
    async fn create_bridge(&self, bridge: &Simplebridge) -> Result<(), ManagementApiError>;
    /// Set the peer of an existing bridge port.
    async fn set_bridge_port_peer(
        &self,
        bridge: &str,
        port: &str,
        peer: &str,
    ) -> Result<(), ManagementApiError>;
}

/// Operations on `router` instances.
#[async_trait]
pub trait RouterApi: Send + Sync {
    /// Create a router, ports, routes and ARP entries included.
    async fn create_router(&self, router: &Router) -> Result<(), ManagementApiError>;
    /// Read back a router, including the MACs assigned to its ports.
    async fn read_router(&self, router: &str) -> Result<Router, ManagementApiError>;
    /// Set the peer of an existing router port.
    async fn set_router_port_peer(
        &self,
        router: &str,
        port: &str,
        peer: &str,
    ) -> Result<(), ManagementApiError>;
    /// Add a static route to an existing router.
    async fn create_router_route(
        &self,
        router: &str,
        route: &RouterRoute,
    ) -> Result<(), ManagementApiError>;
}

/// Operations on `lbrp` instances.
#[async_trait]
pub trait LbrpApi: Send + Sync {
    /// Create a load balancer, ports included.
    async fn create_lbrp(&self, lbrp: &Lbrp) -> Result<(), ManagementApiError>;
    /// Set the peer of an existing load balancer port.
    async fn set_lbrp_port_peer(
        &self,
        lbrp: &str,
        port: &str,
        peer: &str,
    ) -> Result<(), ManagementApiError>;
}

/// Operations on `k8sdispatcher` instances.
#[async_trait]
pub trait K8sDispatcherApi: Send + Sync {
    /// Create a dispatcher with the ports declared in the body.
    async fn create_k8sdispatcher(
        &self,
        dispatcher: &K8sDispatcher,
    ) -> Result<(), ManagementApiError>;
    /// Add a port to an existing dispatcher.
    async fn create_k8sdispatcher_port(
        &self,
        dispatcher: &str,
        port: &K8sDispatcherPort,
    ) -> Result<(), ManagementApiError>;
    /// Set the peer of an existing dispatcher port.
    async fn set_k8sdispatcher_port_peer(
        &self,
        dispatcher: &str,
        port: &str,
        peer: &str,
    ) -> Result<(), ManagementApiError>;
}

/// One client per function type.
///
/// The clients usually share one implementation, but each can be substituted on its own.
#[derive(Clone)]
pub struct CubeClientSet {
    /// Bridge operations.
    pub bridge: Arc<dyn BridgeApi>,
    /// Router operations.
    pub router: Arc<dyn RouterApi>,
    /// Load balancer operations.
    pub lbrp: Arc<dyn LbrpApi>,
    /// Dispatcher operations.
    pub k8sdispatcher: Arc<dyn K8sDispatcherApi>,
}

impl CubeClientSet {
    /// Use `client` for every function type.
    pub fn from_client<C>(client: Arc<C>) -> Self
    where
        C: BridgeApi + RouterApi + LbrpApi + K8sDispatcherApi + 'static,
    {
        Self {
            bridge: client.clone(),
            router: client.clone(),
            lbrp: client.clone(),
            k8sdispatcher: client,
        }
    }
}

impl std::fmt::Debug for CubeClientSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CubeClientSet").finish_non_exhaustive()
    }
}
