// SPDX-License-Identifier: Apache-2.0
// Copyright Polykube Authors

//! HTTP implementation of the management API.

use crate::api::{BridgeApi, K8sDispatcherApi, LbrpApi, RouterApi};
use crate::error::ManagementApiError;
use crate::models::{
    K8sDispatcher, K8sDispatcherPort, Lbrp, PortPeer, Router, RouterRoute, Simplebridge,
};
use async_trait::async_trait;
use reqwest::{Method, Url};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, trace, warn};

/// Client of the management daemon's REST API.
///
/// Resources live at `<base>/<service>/<instance>/...` and every resource path ends with a slash.
#[derive(Clone, Debug)]
pub struct PolycubeClient {
    http: reqwest::Client,
    base: Url,
}

impl PolycubeClient {
    /// Create a client for the API rooted at `base` (e.g. `http://127.0.0.1:9000/polycube/v1`).
    ///
    /// # Errors
    ///
    /// Fails if `base` is not an absolute http(s) URL or the HTTP client cannot be built.
    pub fn new(base: &str) -> Result<Self, ManagementApiError> {
        let parsed = Url::parse(base).map_err(|_| ManagementApiError::BaseUrl(base.to_string()))?;
        if parsed.cannot_be_a_base() || !matches!(parsed.scheme(), "http" | "https") {
            return Err(ManagementApiError::BaseUrl(base.to_string()));
        }
        // transport defaults only: no request or connect timeout
        let http = reqwest::Client::builder()
            .build()
            .map_err(|source| ManagementApiError::Transport {
                operation: "build client",
                resource: base.to_string(),
                source,
            })?;
        Ok(Self { http, base: parsed })
    }

    /// The URL of the resource named by `segments`.
    ///
    /// Each segment is percent-encoded on its own, so a `/` inside a segment (e.g. in a CIDR)
    /// does not split it.
    pub(crate) fn resource(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments).push("");
        }
        url
    }

    async fn send<B: Serialize + Sync + ?Sized>(
        &self,
        method: Method,
        operation: &'static str,
        segments: &[&str],
        body: Option<&B>,
    ) -> Result<reqwest::Response, ManagementApiError> {
        let url = self.resource(segments);
        let resource = url.path().to_string();
        debug!("{operation} {resource}");
        let mut request = self.http.request(method, url);
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request
            .send()
            .await
            .map_err(|source| ManagementApiError::Transport {
                operation,
                resource: resource.clone(),
                source,
            })?;
        let status = response.status();
        if status.is_success() {
            trace!("{operation} {resource}: {status}");
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        warn!("{operation} {resource} rejected: {status} {body}");
        Err(ManagementApiError::Rejected {
            operation,
            resource,
            status: status.as_u16(),
            body,
        })
    }

    async fn write<B: Serialize + Sync + ?Sized>(
        &self,
        method: Method,
        operation: &'static str,
        segments: &[&str],
        body: &B,
    ) -> Result<(), ManagementApiError> {
        self.send(method, operation, segments, Some(body))
            .await
            .map(drop)
    }

    async fn read<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        segments: &[&str],
    ) -> Result<T, ManagementApiError> {
        let response = self
            .send::<()>(Method::GET, operation, segments, None)
            .await?;
        let resource = response.url().path().to_string();
        response
            .json()
            .await
            .map_err(|e| ManagementApiError::Decode {
                operation,
                resource,
                detail: e.to_string(),
            })
    }

    async fn set_peer(
        &self,
        operation: &'static str,
        service: &str,
        instance: &str,
        port: &str,
        peer: &str,
    ) -> Result<(), ManagementApiError> {
        let body = PortPeer {
            peer: peer.to_string(),
        };
        self.write(
            Method::PATCH,
            operation,
            &[service, instance, "ports", port],
            &body,
        )
        .await
    }
}

#[async_trait]
impl BridgeApi for PolycubeClient {
    async fn create_bridge(&self, bridge: &Simplebridge) -> Result<(), ManagementApiError> {
        self.write(
            Method::POST,
            "create bridge",
            &["simplebridge", &bridge.name],
            bridge,
        )
        .await
    }

    async fn set_bridge_port_peer(
        &self,
        bridge: &str,
        port: &str,
        peer: &str,
    ) -> Result<(), ManagementApiError> {
        self.set_peer("set bridge port peer", "simplebridge", bridge, port, peer)
            .await
    }
}

#[async_trait]
impl RouterApi for PolycubeClient {
    async fn create_router(&self, router: &Router) -> Result<(), ManagementApiError> {
        self.write(
            Method::POST,
            "create router",
            &["router", &router.name],
            router,
        )
        .await
    }

    async fn read_router(&self, router: &str) -> Result<Router, ManagementApiError> {
        self.read("read router", &["router", router]).await
    }

    async fn set_router_port_peer(
        &self,
        router: &str,
        port: &str,
        peer: &str,
    ) -> Result<(), ManagementApiError> {
        self.set_peer("set router port peer", "router", router, port, peer)
            .await
    }

    async fn create_router_route(
        &self,
        router: &str,
        route: &RouterRoute,
    ) -> Result<(), ManagementApiError> {
        self.write(
            Method::POST,
            "create router route",
            &["router", router, "route", &route.network, &route.nexthop],
            route,
        )
        .await
    }
}

#[async_trait]
impl LbrpApi for PolycubeClient {
    async fn create_lbrp(&self, lbrp: &Lbrp) -> Result<(), ManagementApiError> {
        self.write(Method::POST, "create lbrp", &["lbrp", &lbrp.name], lbrp)
            .await
    }

    async fn set_lbrp_port_peer(
        &self,
        lbrp: &str,
        port: &str,
        peer: &str,
    ) -> Result<(), ManagementApiError> {
        self.set_peer("set lbrp port peer", "lbrp", lbrp, port, peer)
            .await
    }
}

#[async_trait]
impl K8sDispatcherApi for PolycubeClient {
    async fn create_k8sdispatcher(
        &self,
        dispatcher: &K8sDispatcher,
    ) -> Result<(), ManagementApiError> {
        self.write(
            Method::POST,
            "create k8sdispatcher",
            &["k8sdispatcher", &dispatcher.name],
            dispatcher,
        )
        .await
    }

    async fn create_k8sdispatcher_port(
        &self,
        dispatcher: &str,
        port: &K8sDispatcherPort,
    ) -> Result<(), ManagementApiError> {
        self.write(
            Method::POST,
            "create k8sdispatcher port",
            &["k8sdispatcher", dispatcher, "ports", &port.name],
            port,
        )
        .await
    }

    async fn set_k8sdispatcher_port_peer(
        &self,
        dispatcher: &str,
        port: &str,
        peer: &str,
    ) -> Result<(), ManagementApiError> {
        self.set_peer(
            "set k8sdispatcher port peer",
            "k8sdispatcher",
            dispatcher,
            port,
            peer,
        )
        .await
    }
}
